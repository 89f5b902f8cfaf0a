//! Adapters that let a byte-oriented [`Encryptor`] store its ciphertexts in text and JSON
//! columns.
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::{Map, Value};

use super::{Encryptor, Error};

/// The key, in a structured value, whose value is secret.
pub const SECRET_KEY: &str = "secret";

/// Encrypts UTF-8 text, producing base64 text that can live in an ordinary string column.
#[derive(Clone, Debug)]
pub struct TextCodec<E> {
	inner: E,
}

impl<E> TextCodec<E>
where
	E: Encryptor<Plaintext = Vec<u8>, Ciphertext = Vec<u8>>,
{
	pub fn new(inner: E) -> Self {
		Self { inner }
	}

	/// Encrypt arbitrary bytes into base64 text.  Decrypting the result with
	/// [`decrypt`](Encryptor::decrypt) only works if the bytes were valid UTF-8.
	#[tracing::instrument(level = "debug", skip_all)]
	pub fn encrypt_bytes(&self, plaintext: &[u8], associated_data: &[u8]) -> Result<String, Error> {
		let ciphertext = self.inner.encrypt(&plaintext.to_vec(), associated_data)?;

		Ok(STANDARD.encode(ciphertext))
	}

	/// Decrypt base64 text back into bytes, without insisting they be UTF-8.
	#[tracing::instrument(level = "debug", skip_all)]
	pub fn decrypt_bytes(&self, ciphertext: &str, associated_data: &[u8]) -> Result<Vec<u8>, Error> {
		let ciphertext = STANDARD
			.decode(ciphertext)
			.map_err(|e| Error::decoding(e.to_string()))?;

		self.inner.decrypt(&ciphertext, associated_data)
	}
}

impl<E> Encryptor for TextCodec<E>
where
	E: Encryptor<Plaintext = Vec<u8>, Ciphertext = Vec<u8>>,
{
	type Plaintext = String;
	type Ciphertext = String;

	fn encrypt(&self, plaintext: &String, associated_data: &[u8]) -> Result<String, Error> {
		self.encrypt_bytes(plaintext.as_bytes(), associated_data)
	}

	fn decrypt(&self, ciphertext: &String, associated_data: &[u8]) -> Result<String, Error> {
		String::from_utf8(self.decrypt_bytes(ciphertext, associated_data)?)
			.map_err(|_| Error::invalid_plaintext("decrypted value is not UTF-8"))
	}
}

/// Encrypts only the `"secret"` entry of a JSON object, leaving every other entry as-is.
///
/// Useful when a JSON column holds a mix of sensitive and non-sensitive data, and the
/// non-sensitive parts need to remain queryable.  The `"secret"` entry must be a string, and is
/// replaced by its base64 [`TextCodec`] ciphertext.
#[derive(Clone, Debug)]
pub struct StructuredCodec<E> {
	text: TextCodec<E>,
}

impl<E> StructuredCodec<E>
where
	E: Encryptor<Plaintext = Vec<u8>, Ciphertext = Vec<u8>>,
{
	pub fn new(inner: E) -> Self {
		Self {
			text: TextCodec::new(inner),
		}
	}

	fn map_secret(
		value: &Map<String, Value>,
		f: impl FnOnce(&String) -> Result<String, Error>,
	) -> Result<Map<String, Value>, Error> {
		let Some(secret) = value.get(SECRET_KEY) else {
			return Err(Error::invalid_plaintext(format!("no {SECRET_KEY:?} key")));
		};
		let Value::String(secret) = secret else {
			return Err(Error::invalid_plaintext(format!(
				"{SECRET_KEY:?} is not a string"
			)));
		};

		let mut out = value.clone();
		out.insert(SECRET_KEY.to_string(), Value::String(f(secret)?));

		Ok(out)
	}
}

impl<E> Encryptor for StructuredCodec<E>
where
	E: Encryptor<Plaintext = Vec<u8>, Ciphertext = Vec<u8>>,
{
	type Plaintext = Map<String, Value>;
	type Ciphertext = Map<String, Value>;

	#[tracing::instrument(level = "debug", skip_all)]
	fn encrypt(
		&self,
		plaintext: &Map<String, Value>,
		associated_data: &[u8],
	) -> Result<Map<String, Value>, Error> {
		Self::map_secret(plaintext, |s| self.text.encrypt(s, associated_data))
	}

	#[tracing::instrument(level = "debug", skip_all)]
	fn decrypt(
		&self,
		ciphertext: &Map<String, Value>,
		associated_data: &[u8],
	) -> Result<Map<String, Value>, Error> {
		Self::map_secret(ciphertext, |s| self.text.decrypt(s, associated_data))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{AuthenticatedEncryptor, Keyset};
	use serde_json::json;
	use std::sync::Arc;

	fn text() -> TextCodec<AuthenticatedEncryptor> {
		TextCodec::new(AuthenticatedEncryptor::from_keyset(&Keyset::generate()))
	}

	fn object(v: Value) -> Map<String, Value> {
		let Value::Object(m) = v else {
			panic!("not an object: {v}");
		};
		m
	}

	#[test]
	fn text_round_trip() {
		crate::test_support::init();
		let codec = text();

		let ciphertext = codec.encrypt(&"héllo, wörld".to_string(), b"alice").unwrap();

		assert!(STANDARD.decode(&ciphertext).is_ok());
		assert_eq!(
			"héllo, wörld",
			codec.decrypt(&ciphertext, b"alice").unwrap()
		);
	}

	#[test]
	fn text_associated_data_matters() {
		crate::test_support::init();
		let codec = text();

		let ciphertext = codec.encrypt(&"hello".to_string(), b"alice").unwrap();

		let result = codec.decrypt(&ciphertext, b"bob");
		assert!(matches!(result, Err(Error::Decryption)));
	}

	#[test]
	fn text_accepts_bytes() {
		crate::test_support::init();
		let codec = text();

		let ciphertext = codec.encrypt_bytes(b"hello", b"").unwrap();

		assert_eq!("hello", codec.decrypt(&ciphertext, b"").unwrap());
	}

	#[test]
	fn non_utf8_plaintext_is_reported() {
		crate::test_support::init();
		let codec = text();

		let ciphertext = codec.encrypt_bytes(&[0xff, 0xfe], b"").unwrap();

		assert_eq!(vec![0xff, 0xfe], codec.decrypt_bytes(&ciphertext, b"").unwrap());
		assert!(matches!(
			codec.decrypt(&ciphertext, b""),
			Err(Error::InvalidPlaintext(_))
		));
	}

	#[test]
	fn invalid_base64_fails_before_decryption() {
		crate::test_support::init();

		let result = text().decrypt(&"this is not base64!".to_string(), b"");
		assert!(matches!(result, Err(Error::Decoding(_))));
	}

	#[test]
	fn structured_round_trip_leaves_other_keys_alone() {
		crate::test_support::init();
		let codec = StructuredCodec::new(Arc::new(AuthenticatedEncryptor::from_keyset(
			&Keyset::generate(),
		)));
		let plaintext = object(json!({
			"name": "alice",
			"secret": "hunter2",
			"tags": ["a", "b"],
			"nested": {"n": 1},
		}));

		let ciphertext = codec.encrypt(&plaintext, b"alice").unwrap();

		for (k, v) in &plaintext {
			if k == SECRET_KEY {
				assert_ne!(v, &ciphertext[k]);
			} else {
				assert_eq!(v, &ciphertext[k]);
			}
		}
		assert_eq!(plaintext, codec.decrypt(&ciphertext, b"alice").unwrap());
	}

	#[test]
	fn structured_secret_must_be_present_and_textual() {
		crate::test_support::init();
		let codec = StructuredCodec::new(AuthenticatedEncryptor::from_keyset(&Keyset::generate()));

		assert!(matches!(
			codec.encrypt(&object(json!({"name": "alice"})), b""),
			Err(Error::InvalidPlaintext(_))
		));
		assert!(matches!(
			codec.encrypt(&object(json!({"secret": 42})), b""),
			Err(Error::InvalidPlaintext(_))
		));
	}
}
