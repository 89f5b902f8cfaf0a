#[derive(Debug, thiserror::Error, thiserror_ext::Construct)]
#[non_exhaustive]
pub enum Error {
	#[error("configuration error: {0}")]
	Configuration(String),

	#[error("failed to decrypt ciphertext")]
	Decryption,

	#[error("failed to encrypt plaintext")]
	Encryption,

	#[error("stored value is not valid base64: {0}")]
	Decoding(String),

	#[error("ciphertext encoding failure on {element}: {cause}")]
	Encoding {
		element: String,
		cause: std::io::Error,
	},

	#[error("invalid ciphertext: {0}")]
	InvalidCiphertext(String),

	#[error("invalid key: {0}")]
	InvalidKey(String),

	#[error("invalid plaintext: {0}")]
	InvalidPlaintext(String),

	#[error("failed to persist record: {0}")]
	Persistence(#[source] Box<dyn std::error::Error + Send + Sync>),
}
