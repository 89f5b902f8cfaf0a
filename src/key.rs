use secrecy::ExposeSecret as _;

/// A 256-bit key, as used by an [`AuthenticatedEncryptor`](super::AuthenticatedEncryptor) or a
/// [`Keyset`](super::Keyset).
#[derive(Debug)]
pub struct Key(secrecy::SecretBox<[u8; 32]>);

impl Key {
	pub fn new(k: [u8; 32]) -> Self {
		Self(Box::new(k).into())
	}

	pub fn expose_secret(&self) -> &[u8; 32] {
		self.0.expose_secret()
	}
}

impl Clone for Key {
	fn clone(&self) -> Self {
		Self::new(*self.expose_secret())
	}
}

impl From<Box<[u8; 32]>> for Key {
	fn from(k: Box<[u8; 32]>) -> Self {
		Key(k.into())
	}
}

impl From<[u8; 32]> for Key {
	fn from(k: [u8; 32]) -> Self {
		Key::new(k)
	}
}

impl TryFrom<&[u8]> for Key {
	type Error = super::Error;

	fn try_from(k: &[u8]) -> Result<Self, Self::Error> {
		let k: [u8; 32] = k
			.try_into()
			.map_err(|_| super::Error::invalid_key(format!("expected 32 bytes, got {}", k.len())))?;

		Ok(Key::new(k))
	}
}

/// Create a fresh random key.
///
/// You'll usually be loading keys from a [`Keyset`](super::Keyset), but for tests, and for
/// minting a new keyset in the first place, a way to conjure a secure key is handy.
#[tracing::instrument(level = "debug")]
pub fn generate_key() -> Key {
	use rand::RngCore as _;

	let mut k = [0u8; 32];

	rand::rng().fill_bytes(&mut k);

	Box::new(k).into()
}
