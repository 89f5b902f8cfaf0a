use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Error, Key, KeyId, KeyWrapper, generate_key, key_id};

// Bound into the sealing of every keyset, so a sealed keyset can't be passed off as a
// wrapped data key (or vice versa)
const SEALED_KEYSET_CONTEXT: &[u8] = b"strong-field::keyset";

/// A set of keys for an [`AuthenticatedEncryptor`](super::AuthenticatedEncryptor).
///
/// One key is the *primary*, which is used for all new encryptions.  Every key in the set
/// (including the primary) can be used for decryption.  This is what makes key rotation
/// painless: [`rotate`](Keyset::rotate) the keyset, and every [`EncryptedField`](super::EncryptedField)
/// will gradually move its values over to the new primary key as they are read and found to be
/// stale.  Once you're confident no ciphertexts remain under the old keys, drop them with
/// [`expire_before`](Keyset::expire_before).
///
/// # Example
///
/// ```rust
/// use strong_field::{AuthenticatedEncryptor, Encryptor, Keyset};
/// # fn main() -> Result<(), strong_field::Error> {
///
/// let mut keyset = Keyset::generate();
/// let old = AuthenticatedEncryptor::from_keyset(&keyset);
/// let ciphertext = old.encrypt(&b"s3kr1t".to_vec(), b"alice")?;
///
/// keyset.rotate();
/// let new = AuthenticatedEncryptor::from_keyset(&keyset);
///
/// // Old ciphertexts are still readable...
/// assert_eq!(b"s3kr1t".to_vec(), new.decrypt(&ciphertext, b"alice")?);
///
/// // ... until the old key is expired
/// keyset.expire_before(chrono::Utc::now() + chrono::TimeDelta::seconds(1));
/// let newest = AuthenticatedEncryptor::from_keyset(&keyset);
/// assert!(newest.decrypt(&ciphertext, b"alice").is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Keyset {
	primary: KeyId,
	entries: Vec<Entry>,
}

#[derive(Clone, Debug)]
struct Entry {
	id: KeyId,
	key: Key,
	created_at: DateTime<Utc>,
}

impl Entry {
	fn new(key: Key, created_at: DateTime<Utc>) -> Self {
		Self {
			id: key_id(&key),
			key,
			created_at,
		}
	}
}

impl Keyset {
	/// Create a keyset containing a single, freshly-generated, primary key.
	#[tracing::instrument(level = "debug")]
	pub fn generate() -> Self {
		Self::from_key(generate_key())
	}

	/// Create a keyset whose only (and therefore primary) key is `key`.
	pub fn from_key(key: impl Into<Key>) -> Self {
		let entry = Entry::new(key.into(), Utc::now());

		Self {
			primary: entry.id,
			entries: vec![entry],
		}
	}

	/// The ID of the key used for new encryptions.
	pub fn primary_id(&self) -> KeyId {
		self.primary
	}

	/// The IDs of every key in the keyset, oldest first.
	pub fn key_ids(&self) -> impl Iterator<Item = KeyId> + '_ {
		self.entries.iter().map(|e| e.id)
	}

	/// Add a decryption-only key to the keyset.  Adding a key that is already present does
	/// nothing.
	#[tracing::instrument(level = "debug", skip(self, key))]
	pub fn add_key(&mut self, key: impl Into<Key>) -> KeyId {
		let entry = Entry::new(key.into(), Utc::now());
		let id = entry.id;

		if self.entries.iter().any(|e| e.id == id) {
			tracing::debug!(key_id=%id, "Key already present");
		} else {
			tracing::debug!(key_id=%id, "Adding decryption key");
			self.entries.push(entry);
		}

		id
	}

	/// Generate a new key and make it the primary.  All previous keys remain available for
	/// decryption.
	#[tracing::instrument(level = "debug", skip(self))]
	pub fn rotate(&mut self) -> KeyId {
		let entry = Entry::new(generate_key(), Utc::now());
		let id = entry.id;

		tracing::debug!(old_key_id=%self.primary, new_key_id=%id, "Rotating primary key");

		self.entries.push(entry);
		self.primary = id;

		id
	}

	/// Remove every non-primary key created before `cutoff`, returning the IDs of the removed keys.
	///
	/// Any ciphertext still encrypted under a removed key will become undecryptable, so make sure
	/// that the re-encryption window of every field using this keyset is comfortably shorter than
	/// the age of the keys you're expiring.
	#[tracing::instrument(level = "debug", skip(self))]
	pub fn expire_before(&mut self, cutoff: DateTime<Utc>) -> Vec<KeyId> {
		let primary = self.primary;
		let mut expired = vec![];

		self.entries.retain(|e| {
			if e.id != primary && e.created_at < cutoff {
				tracing::debug!(key_id=%e.id, created_at=%e.created_at, "Expiring key");
				expired.push(e.id);
				false
			} else {
				true
			}
		});

		expired
	}

	pub(crate) fn primary_key(&self) -> &Key {
		// The primary key can never be removed, so this lookup always succeeds
		self.entries
			.iter()
			.find(|e| e.id == self.primary)
			.map(|e| &e.key)
			.expect("primary key missing from keyset")
	}

	pub(crate) fn keys(&self) -> impl Iterator<Item = (KeyId, &Key)> {
		self.entries.iter().map(|e| (e.id, &e.key))
	}

	/// Serialise the keyset, *including all key material in the clear*.
	///
	/// Only suitable for development, or for feeding into something that will protect it; see
	/// [`seal`](Keyset::seal) for the usual alternative.
	pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
		let stored = StoredKeyset {
			primary: self.primary.as_bytes().to_vec(),
			keys: self
				.entries
				.iter()
				.map(|e| StoredKey {
					material: e.key.expose_secret().to_vec(),
					created_at: e.created_at,
				})
				.collect(),
		};

		let mut v: Vec<u8> = Vec::new();
		ciborium::into_writer(&stored, &mut v)
			.map_err(|e| Error::encoding("keyset", std::io::Error::other(e.to_string())))?;

		Ok(v)
	}

	/// Parse a keyset produced by [`to_bytes`](Keyset::to_bytes).
	pub fn from_bytes(b: &[u8]) -> Result<Self, Error> {
		let stored: StoredKeyset = ciborium::from_reader(b)
			.map_err(|e| Error::invalid_key(format!("malformed keyset: {e}")))?;

		let entries = stored
			.keys
			.iter()
			.map(|k| Ok(Entry::new(Key::try_from(&k.material[..])?, k.created_at)))
			.collect::<Result<Vec<_>, Error>>()?;

		let primary = entries
			.iter()
			.find(|e| e.id.as_bytes()[..] == stored.primary[..])
			.map(|e| e.id)
			.ok_or_else(|| Error::invalid_key("keyset primary key not present in keyset"))?;

		Ok(Self { primary, entries })
	}

	/// Serialise the keyset, encrypted by a remote key-wrapping service.
	#[tracing::instrument(level = "debug", skip(self))]
	pub fn seal(&self, wrapper: &dyn KeyWrapper) -> Result<Vec<u8>, Error> {
		wrapper.wrap(&self.to_bytes()?, SEALED_KEYSET_CONTEXT)
	}

	/// Unseal a keyset produced by [`seal`](Keyset::seal), using the same key-wrapping service.
	#[tracing::instrument(level = "debug", skip(sealed))]
	pub fn open(sealed: &[u8], wrapper: &dyn KeyWrapper) -> Result<Self, Error> {
		use secrecy::ExposeSecret as _;

		let bytes = wrapper.unwrap(sealed, SEALED_KEYSET_CONTEXT)?;

		Self::from_bytes(bytes.expose_secret())
	}
}

#[derive(Deserialize, Serialize)]
struct StoredKeyset {
	#[serde(with = "serde_bytes")]
	primary: Vec<u8>,
	keys: Vec<StoredKey>,
}

#[derive(Deserialize, Serialize)]
struct StoredKey {
	#[serde(with = "serde_bytes")]
	material: Vec<u8>,
	created_at: DateTime<Utc>,
}
