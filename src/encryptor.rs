use std::{fmt::Debug, sync::Arc};

use super::Error;

/// Core trait that every cipher backend implements so that an
/// [`EncryptedField`](super::EncryptedField) can drive it.
///
/// The plaintext and ciphertext types are backend-specific: a raw
/// [`AuthenticatedEncryptor`](super::AuthenticatedEncryptor) deals in bytes, while a
/// [`TextCodec`](super::TextCodec) takes strings and emits base64 strings that fit in an ordinary
/// text column.
///
/// Implementations must be safe to share between threads, and `encrypt`/`decrypt` must not
/// mutate any observable shared state.
pub trait Encryptor: Debug + Send + Sync {
	type Plaintext;
	type Ciphertext;

	/// Encrypt `plaintext`, binding it to `associated_data`.
	///
	/// # Errors
	///
	/// Will return [`Error::Encryption`] or [`Error::Encoding`] in the (extremely
	/// unlikely) event something goes horribly wrong.
	fn encrypt(
		&self,
		plaintext: &Self::Plaintext,
		associated_data: &[u8],
	) -> Result<Self::Ciphertext, Error>;

	/// Decrypt a ciphertext, validating that it was encrypted with the same `associated_data`.
	///
	/// # Errors
	///
	/// Will return one of the following:
	/// * [`Error::Decryption`] if the ciphertext was encrypted with an unknown key, or
	///   different associated data, or has been tampered with.
	/// * [`Error::Decoding`] or [`Error::InvalidCiphertext`] if the stored value was malformed,
	///   which means that either it was corrupted in storage, or it was never a ciphertext.
	fn decrypt(
		&self,
		ciphertext: &Self::Ciphertext,
		associated_data: &[u8],
	) -> Result<Self::Plaintext, Error>;
}

impl<E: Encryptor + ?Sized> Encryptor for Arc<E> {
	type Plaintext = E::Plaintext;
	type Ciphertext = E::Ciphertext;

	fn encrypt(
		&self,
		plaintext: &Self::Plaintext,
		associated_data: &[u8],
	) -> Result<Self::Ciphertext, Error> {
		(**self).encrypt(plaintext, associated_data)
	}

	fn decrypt(
		&self,
		ciphertext: &Self::Ciphertext,
		associated_data: &[u8],
	) -> Result<Self::Plaintext, Error> {
		(**self).decrypt(ciphertext, associated_data)
	}
}

/// Pass-through "encryptor", for exercising field logic without any cryptography.
#[cfg(test)]
#[derive(Debug)]
pub(crate) struct IdentityEncryptor<T>(std::marker::PhantomData<fn() -> T>);

#[cfg(test)]
impl<T> IdentityEncryptor<T> {
	pub(crate) fn new() -> Self {
		Self(std::marker::PhantomData)
	}
}

#[cfg(test)]
impl<T: Clone + Debug> Encryptor for IdentityEncryptor<T> {
	type Plaintext = T;
	type Ciphertext = T;

	fn encrypt(&self, plaintext: &T, _associated_data: &[u8]) -> Result<T, Error> {
		Ok(plaintext.clone())
	}

	fn decrypt(&self, ciphertext: &T, _associated_data: &[u8]) -> Result<T, Error> {
		Ok(ciphertext.clone())
	}
}
