use chacha20poly1305::{
	ChaCha20Poly1305, KeyInit as _,
	aead::{Aead as _, Payload},
};
use ciborium_ll::{Decoder, Encoder, Header};
use rand::RngCore as _;
use std::collections::HashMap;

use super::{Encryptor, Error, Key, KeyId, KeySource, Keyset, envelope::EnvelopeCipher};

/// Encryption of arbitrary bytes with ChaCha20-Poly1305, binding the ciphertext to associated
/// data.
///
/// This is the primary cipher backend.  Every encryption uses a fresh random nonce, and the ID of
/// the encrypting key is embedded in the ciphertext, so that any key in the configured
/// [`Keyset`] can be used for decryption.  The associated data is authenticated but not
/// encrypted; decryption with anything other than the exact associated data used for encryption
/// fails, which stops an attacker with write access to your database from shuffling ciphertexts
/// between records.
///
/// # Example
///
/// ```rust
/// use strong_field::{AuthenticatedEncryptor, Encryptor, Error, Keyset};
/// # fn main() -> Result<(), Error> {
///
/// let encryptor = AuthenticatedEncryptor::from_keyset(&Keyset::generate());
///
/// let ciphertext = encryptor.encrypt(&b"Hello, world!".to_vec(), b"alice")?;
/// assert_eq!(b"Hello, world!".to_vec(), encryptor.decrypt(&ciphertext, b"alice")?);
///
/// // Same ciphertext, different associated data: no dice
/// let result = encryptor.decrypt(&ciphertext, b"mallory");
/// assert!(matches!(result, Err(Error::Decryption)));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct AuthenticatedEncryptor {
	mode: Mode,
}

#[derive(Debug)]
enum Mode {
	Keyset(KeysetCipher),
	Envelope(EnvelopeCipher),
}

impl AuthenticatedEncryptor {
	/// Create a new [`AuthenticatedEncryptor`] from the given key source.
	///
	/// This may call out to a remote key-wrapping service, so do it once, at startup, and share
	/// the result.
	///
	/// # Errors
	///
	/// Fails if a sealed keyset can't be unsealed, or the key-wrapping service refuses to wrap
	/// a fresh data key.  Either way, there's no way to proceed.
	#[tracing::instrument(level = "debug", skip(source), fields(?source))]
	pub fn new(source: KeySource) -> Result<Self, Error> {
		let mode = match source {
			KeySource::Keyset(keyset) => Mode::Keyset(KeysetCipher::new(&keyset)),
			KeySource::SealedKeyset { sealed, wrapper } => {
				let keyset = Keyset::open(&sealed, wrapper.as_ref()).map_err(|e| {
					Error::configuration(format!("could not unseal keyset: {e}"))
				})?;
				Mode::Keyset(KeysetCipher::new(&keyset))
			}
			KeySource::Envelope(wrapper) => Mode::Envelope(
				EnvelopeCipher::new(wrapper)
					.map_err(|e| Error::configuration(format!("could not wrap data key: {e}")))?,
			),
		};

		Ok(Self { mode })
	}

	/// Create a new [`AuthenticatedEncryptor`] that uses a plaintext keyset.
	pub fn from_keyset(keyset: &Keyset) -> Self {
		Self {
			mode: Mode::Keyset(KeysetCipher::new(keyset)),
		}
	}
}

impl Encryptor for AuthenticatedEncryptor {
	type Plaintext = Vec<u8>;
	type Ciphertext = Vec<u8>;

	#[tracing::instrument(level = "debug", skip_all)]
	fn encrypt(&self, plaintext: &Vec<u8>, associated_data: &[u8]) -> Result<Vec<u8>, Error> {
		match &self.mode {
			Mode::Keyset(c) => c.encrypt(plaintext, associated_data),
			Mode::Envelope(c) => c.encrypt(plaintext, associated_data),
		}
	}

	#[tracing::instrument(level = "debug", skip_all)]
	fn decrypt(&self, ciphertext: &Vec<u8>, associated_data: &[u8]) -> Result<Vec<u8>, Error> {
		match &self.mode {
			Mode::Keyset(c) => c.decrypt(ciphertext, associated_data),
			Mode::Envelope(c) => c.decrypt(ciphertext, associated_data),
		}
	}
}

/// The ChaCha20-Poly1305 engine under an [`AuthenticatedEncryptor`]: one key to encrypt with, and
/// any number of keys to decrypt with.
#[derive(Clone, Debug)]
pub(crate) struct KeysetCipher {
	encryption_key: Key,
	encryption_key_id: KeyId,
	decryption_keys: HashMap<KeyId, Key>,
}

impl KeysetCipher {
	#[tracing::instrument(level = "debug", skip_all)]
	pub(crate) fn new(keyset: &Keyset) -> Self {
		let mut key_map: HashMap<KeyId, Key> = HashMap::default();

		for (key_id, key) in keyset.keys() {
			tracing::debug!(%key_id, "Including decryption key");
			key_map.insert(key_id, key.clone());
		}

		tracing::debug!("Encryption key is {}", keyset.primary_id());

		Self {
			encryption_key: keyset.primary_key().clone(),
			encryption_key_id: keyset.primary_id(),
			decryption_keys: key_map,
		}
	}

	pub(crate) fn encrypt(&self, plaintext: &[u8], ctx: &[u8]) -> Result<Vec<u8>, Error> {
		let cipher = ChaCha20Poly1305::new(self.encryption_key.expose_secret().into());
		let mut nonce = [0u8; 12];
		rand::rng().fill_bytes(&mut nonce);

		let aad = aad(ctx, &self.encryption_key_id, &nonce);

		let ciphertext = cipher
			.encrypt(
				(&nonce).into(),
				Payload {
					msg: plaintext,
					aad: &aad,
				},
			)
			.map_err(|_| Error::Encryption)?;
		tracing::debug!(key_id=%self.encryption_key_id, "Encrypting");

		Ciphertext::new(self.encryption_key_id, nonce, ciphertext).to_bytes()
	}

	pub(crate) fn decrypt(&self, ciphertext: &[u8], ctx: &[u8]) -> Result<Vec<u8>, Error> {
		let ciphertext = Ciphertext::try_from(ciphertext)?;

		let Some(key) = self.decryption_keys.get(&ciphertext.key_id) else {
			tracing::debug!(key_id=%ciphertext.key_id, "Decryption key not found");
			return Err(Error::Decryption);
		};

		tracing::debug!(key_id=%ciphertext.key_id, "Decrypting");

		let aad = aad(ctx, &ciphertext.key_id, &ciphertext.nonce);

		let cipher = ChaCha20Poly1305::new(key.expose_secret().into());
		cipher
			.decrypt(
				(&ciphertext.nonce).into(),
				Payload {
					msg: &ciphertext.ciphertext,
					aad: &aad,
				},
			)
			.map_err(|_| Error::Decryption)
	}
}

// The key ID and nonce are bound in too, so neither can be swapped out from under us
fn aad(ctx: &[u8], key_id: &KeyId, nonce: &[u8; 12]) -> Vec<u8> {
	let mut aad = Vec::<u8>::with_capacity(ctx.len() + 28);
	aad.extend_from_slice(ctx);
	aad.extend_from_slice(key_id.as_bytes());
	aad.extend_from_slice(nonce);
	aad
}

// This makes more sense in base64
const CIPHERTEXT_MAGIC: [u8; 3] = [0xb1, 0xb8, 0xf5];

#[derive(Clone, Debug)]
struct Ciphertext {
	key_id: KeyId,
	nonce: [u8; 12],
	ciphertext: Vec<u8>,
}

impl Ciphertext {
	fn new(key_id: KeyId, nonce: [u8; 12], ciphertext: Vec<u8>) -> Self {
		Self {
			key_id,
			nonce,
			ciphertext,
		}
	}

	fn to_bytes(&self) -> Result<Vec<u8>, Error> {
		let mut v: Vec<u8> = Vec::new();

		v.extend_from_slice(&CIPHERTEXT_MAGIC);

		let mut enc = Encoder::from(&mut v);
		enc.push(Header::Array(Some(3)))
			.map_err(|e| Error::encoding("array", e))?;
		self.key_id.encode(&mut enc)?;
		enc.bytes(&self.nonce, None)
			.map_err(|e| Error::encoding("nonce", e))?;
		enc.bytes(&self.ciphertext, None)
			.map_err(|e| Error::encoding("ciphertext", e))?;

		Ok(v)
	}
}

impl TryFrom<&[u8]> for Ciphertext {
	type Error = Error;

	fn try_from(b: &[u8]) -> Result<Self, Self::Error> {
		if b.len() < 21 {
			return Err(Error::invalid_ciphertext("too short"));
		}

		if b[0..3] != CIPHERTEXT_MAGIC {
			tracing::debug!(magic=?CIPHERTEXT_MAGIC, actual=?b[0..3]);
			return Err(Error::invalid_ciphertext("incorrect magic"));
		}

		let mut dec = Decoder::from(&b[3..]);

		let Header::Array(Some(3)) = dec
			.pull()
			.map_err(|e| Error::invalid_ciphertext(format!("array: {e:?}")))?
		else {
			return Err(Error::invalid_ciphertext("expected array"));
		};

		let key_id = KeyId::decode(&mut dec)?;

		let nonce: [u8; 12] = pull_bytes(&mut dec, "nonce")?
			.as_slice()
			.try_into()
			.map_err(|_| Error::invalid_ciphertext("incorrect nonce length"))?;

		let ciphertext = pull_bytes(&mut dec, "ciphertext")?;

		Ok(Self {
			key_id,
			nonce,
			ciphertext,
		})
	}
}

/// Read one (possibly segmented) CBOR bytestring.
pub(crate) fn pull_bytes(dec: &mut Decoder<&[u8]>, element: &str) -> Result<Vec<u8>, Error> {
	let Header::Bytes(len) = dec
		.pull()
		.map_err(|e| Error::invalid_ciphertext(format!("{element} header: {e:?}")))?
	else {
		return Err(Error::invalid_ciphertext(format!("expected {element}")));
	};

	// CBOR's great, until you have to deal with segmented bytestrings...
	let mut segments = dec.bytes(len);
	let mut buf = [0u8; 1024];
	let mut v: Vec<u8> = Vec::new();

	while let Some(mut segment) = segments
		.pull()
		.map_err(|e| Error::invalid_ciphertext(format!("{element}: {e:?}")))?
	{
		while let Some(chunk) = segment
			.pull(&mut buf[..])
			.map_err(|e| Error::invalid_ciphertext(format!("{element}: {e:?}")))?
		{
			v.extend_from_slice(chunk);
		}
	}

	Ok(v)
}
