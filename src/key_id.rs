use super::{Error, Key, kdf};

type Kid = [u8; 16];

/// A stable, non-secret identifier for a [`Key`], embedded in every ciphertext so that the
/// right decryption key can be found without trial decryption.
#[allow(clippy::derived_hash_with_manual_eq)] // k1 == k2 => hash(k1) == hash(k2) will hold
#[derive(Clone, Copy, Debug, Hash, Ord, PartialOrd)]
#[repr(transparent)]
pub struct KeyId(Kid);

impl KeyId {
	pub(crate) fn as_bytes(&self) -> &Kid {
		&self.0
	}

	pub(crate) fn encode(&self, enc: &mut ciborium_ll::Encoder<&mut Vec<u8>>) -> Result<(), Error> {
		enc.bytes(&self.0, None)
			.map_err(|e| Error::encoding("key_id", e))?;
		Ok(())
	}

	pub(crate) fn decode(dec: &mut ciborium_ll::Decoder<&[u8]>) -> Result<Self, Error> {
		let bytes = crate::authenticated::pull_bytes(dec, "key_id")?;

		let key_id: Kid = bytes
			.as_slice()
			.try_into()
			.map_err(|_| Error::invalid_ciphertext("incorrect key_id length"))?;

		Ok(Self(key_id))
	}
}

impl PartialEq for KeyId {
	fn eq(&self, other: &Self) -> bool {
		constant_time_eq::constant_time_eq_n(&self.0, &other.0)
	}
}

impl Eq for KeyId {}

impl std::fmt::Display for KeyId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		for b in &self.0 {
			f.write_fmt(format_args!("{b:02x}"))?;
		}

		Ok(())
	}
}

/// Get a reasonably-unique ID for a key
#[tracing::instrument(level = "trace", skip(key))]
pub(crate) fn key_id(key: &Key) -> KeyId {
	let mut id: Kid = Default::default();

	id.copy_from_slice(&kdf::derive_key(key, b"key_id").expose_secret()[0..16]);

	KeyId(id)
}
