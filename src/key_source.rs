use secrecy::SecretSlice;
use std::{fmt::Debug, sync::Arc};

use super::{AuthenticatedEncryptor, Encryptor as _, Error, Keyset};

/// A remote key-wrapping service, such as a cloud KMS.
///
/// Only wrapping and unwrapping of (small) key blobs is required; bulk data is always encrypted
/// locally.  Calls to a wrapper may block on the network, so they are made only while
/// constructing an [`AuthenticatedEncryptor`], or the first time an envelope-mode ciphertext from
/// another process is seen.
pub trait KeyWrapper: Debug + Send + Sync {
	/// Encrypt `key` under the service's key-encryption key.
	fn wrap(&self, key: &[u8], associated_data: &[u8]) -> Result<Vec<u8>, Error>;

	/// Recover a key previously passed to [`wrap`](KeyWrapper::wrap).
	///
	/// # Errors
	///
	/// Should return [`Error::Decryption`] if the wrapped blob was not produced by this service
	/// with the same associated data.
	fn unwrap(&self, wrapped: &[u8], associated_data: &[u8]) -> Result<SecretSlice<u8>, Error>;
}

/// Handy for development and testing: any [`AuthenticatedEncryptor`] can stand in for a remote
/// key-wrapping service.
impl KeyWrapper for AuthenticatedEncryptor {
	fn wrap(&self, key: &[u8], associated_data: &[u8]) -> Result<Vec<u8>, Error> {
		self.encrypt(&key.to_vec(), associated_data)
	}

	fn unwrap(&self, wrapped: &[u8], associated_data: &[u8]) -> Result<SecretSlice<u8>, Error> {
		Ok(self.decrypt(&wrapped.to_vec(), associated_data)?.into())
	}
}

/// Where an [`AuthenticatedEncryptor`] gets its key material from.
#[derive(Clone)]
pub enum KeySource {
	/// A keyset held in the clear.  Fine for development; think twice for production.
	Keyset(Keyset),

	/// A keyset that was [sealed](Keyset::seal) by a remote key-wrapping service, and which will
	/// be unsealed once, at construction time.
	SealedKeyset {
		sealed: Vec<u8>,
		wrapper: Arc<dyn KeyWrapper>,
	},

	/// No local keyset at all: a data key is generated locally, wrapped by the remote
	/// service, and the wrapped data key is stored alongside every ciphertext.
	Envelope(Arc<dyn KeyWrapper>),
}

// Sealed keysets are ciphertext; only their size goes in logs
impl std::fmt::Debug for KeySource {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Keyset(keyset) => f.debug_tuple("Keyset").field(&keyset.primary_id()).finish(),
			Self::SealedKeyset { sealed, wrapper } => f
				.debug_struct("SealedKeyset")
				.field("sealed_len", &sealed.len())
				.field("wrapper", wrapper)
				.finish(),
			Self::Envelope(wrapper) => f.debug_tuple("Envelope").field(wrapper).finish(),
		}
	}
}

impl KeySource {
	/// Pick a key source from whatever is available.
	///
	/// * A serialised keyset *and* a wrapper means the keyset is sealed;
	/// * A keyset alone is a plaintext keyset;
	/// * A wrapper alone means envelope mode;
	/// * Neither is a configuration error.
	#[tracing::instrument(level = "debug", skip(keyset))]
	pub fn select(
		keyset: Option<Vec<u8>>,
		wrapper: Option<Arc<dyn KeyWrapper>>,
	) -> Result<Self, Error> {
		match (keyset, wrapper) {
			(Some(sealed), Some(wrapper)) => {
				tracing::debug!("Using sealed keyset");
				Ok(Self::SealedKeyset { sealed, wrapper })
			}
			(Some(keyset), None) => {
				tracing::debug!("Using plaintext keyset");
				let keyset = Keyset::from_bytes(&keyset)
					.map_err(|e| Error::configuration(format!("could not parse keyset: {e}")))?;
				Ok(Self::Keyset(keyset))
			}
			(None, Some(wrapper)) => {
				tracing::debug!("Using envelope encryption");
				Ok(Self::Envelope(wrapper))
			}
			(None, None) => Err(Error::configuration("no encryptor settings provided")),
		}
	}
}
