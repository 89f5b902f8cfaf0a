use ciborium_ll::{Decoder, Encoder, Header};
use parking_lot::RwLock;
use secrecy::ExposeSecret as _;
use std::{
	collections::{HashMap, HashSet},
	sync::Arc,
};

use super::{
	Error, Key, KeyWrapper, Keyset, authenticated::KeysetCipher, authenticated::pull_bytes,
	generate_key,
};

const DATA_KEY_CONTEXT: &[u8] = b"strong-field::data_key";

// Upper bound on remembered unwrap rejections; the set is emptied when it fills up
const MAX_REJECTED: usize = 1024;

/// Envelope encryption: data is encrypted locally under a data key, and the data key itself is
/// encrypted ("wrapped") by a remote service and stored alongside each ciphertext.
///
/// Each process generates one data key when it starts, so the remote service is only called once
/// to wrap it.  Ciphertexts produced by *other* processes carry a different wrapped data key,
/// which needs one remote unwrap call the first time it is seen; after that the unwrapped key is
/// kept in memory for the life of the process.
///
/// Wrapped keys that the service definitively rejects are remembered too, so a corrupt or
/// foreign ciphertext doesn't cost a remote call on every read.  Other failures (which may be
/// transient, like a network error) are not remembered.
#[derive(Debug)]
pub(crate) struct EnvelopeCipher {
	wrapper: Arc<dyn KeyWrapper>,
	wrapped_key: Vec<u8>,
	cipher: KeysetCipher,

	unwrapped: RwLock<HashMap<Vec<u8>, Arc<KeysetCipher>>>,
	rejected: RwLock<HashSet<Vec<u8>>>,
}

impl EnvelopeCipher {
	#[tracing::instrument(level = "debug", name = "EnvelopeCipher::new")]
	pub(crate) fn new(wrapper: Arc<dyn KeyWrapper>) -> Result<Self, Error> {
		let data_key = generate_key();
		let wrapped_key = wrapper.wrap(data_key.expose_secret(), DATA_KEY_CONTEXT)?;
		tracing::debug!(wrapped_len = wrapped_key.len(), "Wrapped fresh data key");

		Ok(Self {
			wrapper,
			wrapped_key,
			cipher: KeysetCipher::new(&Keyset::from_key(data_key)),
			unwrapped: RwLock::default(),
			rejected: RwLock::default(),
		})
	}

	pub(crate) fn encrypt(&self, plaintext: &[u8], ctx: &[u8]) -> Result<Vec<u8>, Error> {
		let ciphertext = self
			.cipher
			.encrypt(plaintext, &aad(ctx, &self.wrapped_key))?;

		Ciphertext {
			wrapped_key: self.wrapped_key.clone(),
			ciphertext,
		}
		.to_bytes()
	}

	pub(crate) fn decrypt(&self, ciphertext: &[u8], ctx: &[u8]) -> Result<Vec<u8>, Error> {
		let ciphertext = Ciphertext::try_from(ciphertext)?;
		let aad = aad(ctx, &ciphertext.wrapped_key);

		if ciphertext.wrapped_key == self.wrapped_key {
			return self.cipher.decrypt(&ciphertext.ciphertext, &aad);
		}

		self.cipher_for(&ciphertext.wrapped_key)?
			.decrypt(&ciphertext.ciphertext, &aad)
	}

	fn cipher_for(&self, wrapped_key: &[u8]) -> Result<Arc<KeysetCipher>, Error> {
		if let Some(cipher) = self.unwrapped.read().get(wrapped_key) {
			return Ok(Arc::clone(cipher));
		}

		if self.rejected.read().contains(wrapped_key) {
			tracing::debug!("Data key previously rejected");
			return Err(Error::Decryption);
		}

		tracing::debug!("Unwrapping foreign data key");
		let data_key = self
			.wrapper
			.unwrap(wrapped_key, DATA_KEY_CONTEXT)
			.and_then(|k| Key::try_from(k.expose_secret()))
			.map_err(|e| {
				tracing::debug!(error=%e, "Data key unwrap failed");
				if matches!(
					e,
					Error::Decryption
						| Error::Decoding(_)
						| Error::InvalidCiphertext(_)
						| Error::InvalidKey(_)
				) {
					self.reject(wrapped_key);
				}
				Error::Decryption
			})?;

		let cipher = Arc::new(KeysetCipher::new(&Keyset::from_key(data_key)));

		// Two threads racing to unwrap the same key is harmless; both get equivalent ciphers
		self.unwrapped
			.write()
			.insert(wrapped_key.to_vec(), Arc::clone(&cipher));

		Ok(cipher)
	}

	fn reject(&self, wrapped_key: &[u8]) {
		let mut rejected = self.rejected.write();

		if rejected.len() >= MAX_REJECTED {
			rejected.clear();
		}
		rejected.insert(wrapped_key.to_vec());
	}
}

fn aad(ctx: &[u8], wrapped_key: &[u8]) -> Vec<u8> {
	let mut aad = Vec::<u8>::with_capacity(ctx.len() + wrapped_key.len());
	aad.extend_from_slice(ctx);
	aad.extend_from_slice(wrapped_key);
	aad
}

const CIPHERTEXT_MAGIC: [u8; 3] = [0xb2, 0xde, 0xf5];

#[derive(Clone, Debug)]
struct Ciphertext {
	wrapped_key: Vec<u8>,
	ciphertext: Vec<u8>,
}

impl Ciphertext {
	fn to_bytes(&self) -> Result<Vec<u8>, Error> {
		let mut v: Vec<u8> = Vec::new();

		v.extend_from_slice(&CIPHERTEXT_MAGIC);

		let mut enc = Encoder::from(&mut v);
		enc.push(Header::Array(Some(2)))
			.map_err(|e| Error::encoding("array", e))?;
		enc.bytes(&self.wrapped_key, None)
			.map_err(|e| Error::encoding("wrapped_key", e))?;
		enc.bytes(&self.ciphertext, None)
			.map_err(|e| Error::encoding("ciphertext", e))?;

		Ok(v)
	}
}

impl TryFrom<&[u8]> for Ciphertext {
	type Error = Error;

	fn try_from(b: &[u8]) -> Result<Self, Self::Error> {
		if b.len() < 6 {
			return Err(Error::invalid_ciphertext("too short"));
		}

		if b[0..3] != CIPHERTEXT_MAGIC {
			return Err(Error::invalid_ciphertext("incorrect magic"));
		}

		let mut dec = Decoder::from(&b[3..]);

		let Header::Array(Some(2)) = dec
			.pull()
			.map_err(|e| Error::invalid_ciphertext(format!("array: {e:?}")))?
		else {
			return Err(Error::invalid_ciphertext("expected array"));
		};

		let wrapped_key = pull_bytes(&mut dec, "wrapped_key")?;
		let ciphertext = pull_bytes(&mut dec, "ciphertext")?;

		Ok(Self {
			wrapped_key,
			ciphertext,
		})
	}
}
