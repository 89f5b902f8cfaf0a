use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};

use super::Error;

/// A process-wide, lazily-constructed value, such as an encryptor.
///
/// Constructing an [`AuthenticatedEncryptor`](super::AuthenticatedEncryptor) can involve a round
/// trip to a remote key-wrapping service, so you only want to do it once.  A `Shared` makes
/// sure that at most one construction is ever in flight; if it fails, the error is returned and
/// the next caller gets to try again.
///
/// ```rust
/// use strong_field::{AuthenticatedEncryptor, Keyset, Shared};
///
/// static PRIMARY: Shared<AuthenticatedEncryptor> = Shared::new();
///
/// # fn main() -> Result<(), strong_field::Error> {
/// let a = PRIMARY.get_or_try_init(|| Ok(AuthenticatedEncryptor::from_keyset(&Keyset::generate())))?;
/// let b = PRIMARY.get_or_try_init(|| unreachable!("already constructed"))?;
///
/// assert!(std::sync::Arc::ptr_eq(&a, &b));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Shared<T> {
	value: OnceLock<Arc<T>>,
	init: Mutex<()>,
}

impl<T> Shared<T> {
	pub const fn new() -> Self {
		Self {
			value: OnceLock::new(),
			init: parking_lot::const_mutex(()),
		}
	}

	/// The value, if it has been constructed.
	pub fn get(&self) -> Option<Arc<T>> {
		self.value.get().cloned()
	}

	/// The value, constructing it with `f` if this is the first successful call.
	pub fn get_or_try_init(&self, f: impl FnOnce() -> Result<T, Error>) -> Result<Arc<T>, Error> {
		if let Some(v) = self.value.get() {
			return Ok(Arc::clone(v));
		}

		let _guard = self.init.lock();

		// Someone else may have finished constructing while we waited for the lock
		if let Some(v) = self.value.get() {
			return Ok(Arc::clone(v));
		}

		tracing::debug!(value_type = std::any::type_name::<T>(), "Constructing shared value");
		let v = Arc::new(f()?);

		// Can't fail; we hold the init lock and checked the cell was empty
		let _ = self.value.set(Arc::clone(&v));

		Ok(v)
	}
}

impl<T> Default for Shared<T> {
	fn default() -> Self {
		Self::new()
	}
}
