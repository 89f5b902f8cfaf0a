//! The retired cipher scheme, kept around so that values written before the move to
//! [`AuthenticatedEncryptor`](super::AuthenticatedEncryptor) can still be read (and, thereby,
//! upgraded).
//!
//! Tokens look like `v1.<base64url(nonce)>.<base64url(ciphertext+tag)>`, encrypted with
//! AES-256-GCM-SIV under a single static key.  There is no associated data.
use aes_gcm_siv::{Aes256GcmSiv, KeyInit as _, Nonce, aead::Aead as _};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore as _;

use super::{Encryptor, Error, Key};

/// Byte length of an AES-GCM-SIV nonce.
const NONCE_LEN: usize = 12;

const VERSION_PREFIX: &str = "v1";

/// Decrypts values written by the retired cipher scheme.
///
/// Only ever used as the fallback of an [`EncryptedField`](super::EncryptedField); the
/// `associated_data` argument is accepted to satisfy [`Encryptor`], and ignored.
#[derive(Clone)]
pub struct LegacyEncryptor {
	cipher: Aes256GcmSiv,
}

impl std::fmt::Debug for LegacyEncryptor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LegacyEncryptor").finish_non_exhaustive()
	}
}

impl LegacyEncryptor {
	pub fn new(key: &Key) -> Self {
		Self {
			cipher: Aes256GcmSiv::new(key.expose_secret().into()),
		}
	}

	/// Decrypt a token into raw bytes.
	#[tracing::instrument(level = "debug", skip_all)]
	pub fn decrypt_bytes(&self, token: &str) -> Result<Vec<u8>, Error> {
		let parts: Vec<&str> = token.splitn(3, '.').collect();
		if parts.len() != 3 || parts[0] != VERSION_PREFIX {
			return Err(Error::invalid_ciphertext("not a legacy token"));
		}

		let nonce = URL_SAFE_NO_PAD
			.decode(parts[1])
			.map_err(|e| Error::decoding(format!("legacy nonce: {e}")))?;
		if nonce.len() != NONCE_LEN {
			return Err(Error::invalid_ciphertext("incorrect nonce length"));
		}

		let ciphertext = URL_SAFE_NO_PAD
			.decode(parts[2])
			.map_err(|e| Error::decoding(format!("legacy ciphertext: {e}")))?;

		self.cipher
			.decrypt(Nonce::from_slice(&nonce), &ciphertext[..])
			.map_err(|_| Error::Decryption)
	}

	/// Produce a legacy token.  Nothing in this crate writes new legacy values; this exists for
	/// migration tooling and tests.
	#[tracing::instrument(level = "debug", skip_all)]
	pub fn encrypt_bytes(&self, plaintext: &[u8]) -> Result<String, Error> {
		let mut nonce = [0u8; NONCE_LEN];
		rand::rng().fill_bytes(&mut nonce);

		let ciphertext = self
			.cipher
			.encrypt(Nonce::from_slice(&nonce), plaintext)
			.map_err(|_| Error::Encryption)?;

		Ok(format!(
			"{}.{}.{}",
			VERSION_PREFIX,
			URL_SAFE_NO_PAD.encode(nonce),
			URL_SAFE_NO_PAD.encode(ciphertext),
		))
	}
}

impl Encryptor for LegacyEncryptor {
	type Plaintext = String;
	type Ciphertext = String;

	fn encrypt(&self, plaintext: &String, _associated_data: &[u8]) -> Result<String, Error> {
		self.encrypt_bytes(plaintext.as_bytes())
	}

	fn decrypt(&self, ciphertext: &String, _associated_data: &[u8]) -> Result<String, Error> {
		String::from_utf8(self.decrypt_bytes(ciphertext)?)
			.map_err(|_| Error::invalid_plaintext("decrypted value is not UTF-8"))
	}
}
