//! Building encryptors from the environment.
//!
//! Every setting is read from an environment variable prefixed with `STRONG_FIELD_`:
//!
//! * `STRONG_FIELD_KEYSET_FILE`: path to a serialised [`Keyset`](super::Keyset), sealed if a
//!   [`KeyWrapper`] is also supplied;
//! * `STRONG_FIELD_LEGACY_KEY`: base64-encoded 32 byte key for the [`LegacyEncryptor`];
//! * `STRONG_FIELD_REENCRYPTION_WINDOW`: how long a ciphertext stays fresh, like `30d` or
//!   `1d12h` (defaults to `30d`).
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::TimeDelta;
use secrecy::{ExposeSecret as _, SecretString};
use serde::Deserialize;
use std::{path::PathBuf, sync::Arc};

use super::{AuthenticatedEncryptor, Error, Key, KeySource, KeyWrapper, LegacyEncryptor};

const ENV_PREFIX: &str = "STRONG_FIELD";

#[derive(Debug, Deserialize)]
pub struct Config {
	#[serde(default)]
	pub keyset_file: Option<PathBuf>,

	#[serde(default)]
	pub legacy_key: Option<SecretString>,

	#[serde(default = "default_reencryption_window")]
	pub reencryption_window: String,
}

fn default_reencryption_window() -> String {
	"30d".into()
}

impl Config {
	/// Load configuration from `STRONG_FIELD_*` environment variables.
	pub fn from_env() -> Result<Self, Error> {
		Self::from_source(config::Environment::with_prefix(ENV_PREFIX))
	}

	/// Load configuration from any [`config::Source`].
	pub fn from_source(source: impl config::Source + Send + Sync + 'static) -> Result<Self, Error> {
		let c: Config = config::Config::builder()
			.add_source(source)
			.build()
			.and_then(|c| c.try_deserialize())
			.map_err(|e| Error::configuration(e.to_string()))?;

		c.validate()?;
		Ok(c)
	}

	fn validate(&self) -> Result<(), Error> {
		self.window()?;
		self.legacy_encryptor()?;
		Ok(())
	}

	/// The parsed re-encryption window.
	pub fn window(&self) -> Result<TimeDelta, Error> {
		parse_duration(&self.reencryption_window)
	}

	/// Work out where the primary key material comes from.
	///
	/// The key-wrapping service, if any, can't come from the environment; you construct it
	/// yourself and pass it in.
	#[tracing::instrument(level = "debug", skip(wrapper))]
	pub fn key_source(&self, wrapper: Option<Arc<dyn KeyWrapper>>) -> Result<KeySource, Error> {
		let keyset = self
			.keyset_file
			.as_ref()
			.map(|path| {
				std::fs::read(path).map_err(|e| {
					Error::configuration(format!("could not read {}: {e}", path.display()))
				})
			})
			.transpose()?;

		KeySource::select(keyset, wrapper)
	}

	/// Build the primary encryptor.  See [`key_source`](Config::key_source).
	pub fn authenticated_encryptor(
		&self,
		wrapper: Option<Arc<dyn KeyWrapper>>,
	) -> Result<AuthenticatedEncryptor, Error> {
		AuthenticatedEncryptor::new(self.key_source(wrapper)?)
	}

	/// Build the legacy encryptor, if a legacy key is configured.
	pub fn legacy_encryptor(&self) -> Result<Option<LegacyEncryptor>, Error> {
		let Some(key) = &self.legacy_key else {
			return Ok(None);
		};

		let key = STANDARD
			.decode(key.expose_secret())
			.map_err(|_| Error::configuration("legacy key is not valid base64"))?;
		let key = Key::try_from(&key[..])
			.map_err(|e| Error::configuration(format!("legacy key: {e}")))?;

		Ok(Some(LegacyEncryptor::new(&key)))
	}
}

/// Parse a duration like `30d`, `12h`, `1d6h30m` or `90s`.
///
/// Each component is optional, but they must appear in the order days, hours, minutes, seconds.
pub fn parse_duration(s: &str) -> Result<TimeDelta, Error> {
	let invalid = || Error::configuration(format!("invalid duration {s:?}"));

	let mut rest = s.trim();
	if rest.is_empty() {
		return Err(invalid());
	}

	let mut secs: i64 = 0;

	for (unit, unit_secs) in [('d', 86_400i64), ('h', 3_600), ('m', 60), ('s', 1)] {
		let digits = rest
			.find(|c: char| !c.is_ascii_digit())
			.unwrap_or(rest.len());
		if digits == 0 || !rest[digits..].starts_with(unit) {
			continue;
		}

		let n: i64 = rest[..digits].parse().map_err(|_| invalid())?;
		secs = n
			.checked_mul(unit_secs)
			.and_then(|n| secs.checked_add(n))
			.ok_or_else(invalid)?;
		rest = &rest[digits + 1..];
	}

	if !rest.is_empty() {
		return Err(invalid());
	}

	TimeDelta::try_seconds(secs).ok_or_else(invalid)
}
