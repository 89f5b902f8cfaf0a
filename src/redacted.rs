/// A decrypted value, which won't reveal itself unless explicitly asked.
///
/// Both [`Debug`](std::fmt::Debug) and [`Display`](std::fmt::Display) print `<redacted>`, so a
/// stray `{:?}` in a log line or an error message can't leak the secret.  Use
/// [`expose_secret`](secrecy::ExposeSecret::expose_secret) or [`into_inner`](Redacted::into_inner)
/// when you actually need the plaintext.
///
/// ```rust
/// use secrecy::ExposeSecret as _;
/// use strong_field::Redacted;
///
/// let r = Redacted::new("hunter2".to_string());
///
/// assert_eq!("<redacted>", format!("{r}"));
/// assert_eq!("<redacted>", format!("{r:?}"));
/// assert_eq!("hunter2", r.expose_secret());
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Redacted<T>(T);

const MARKER: &str = "<redacted>";

impl<T> Redacted<T> {
	pub fn new(value: T) -> Self {
		Self(value)
	}

	pub fn into_inner(self) -> T {
		self.0
	}
}

impl<T> secrecy::ExposeSecret<T> for Redacted<T> {
	fn expose_secret(&self) -> &T {
		&self.0
	}
}

impl<T> std::fmt::Debug for Redacted<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(MARKER)
	}
}

impl<T> std::fmt::Display for Redacted<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(MARKER)
	}
}
