use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;

use super::{AssociatedData, Encryptor, Error, Record, Redacted, Slot, SlotValue};

/// A shareable handle on any [`Encryptor`] with the given plaintext and ciphertext types.
pub type DynEncryptor<P, C> = Arc<dyn Encryptor<Plaintext = P, Ciphertext = C>>;

/// The default maximum age of a ciphertext before it is re-encrypted.
pub const DEFAULT_REENCRYPTION_WINDOW: TimeDelta = TimeDelta::days(30);

/// Binds one logical plaintext attribute of a [`Record`] to the slots that store it encrypted.
///
/// All access to the plaintext goes through [`get`](EncryptedField::get) (or
/// [`read`](EncryptedField::read), if you want to know what happened along the way) and
/// [`set`](EncryptedField::set).  Along with the ciphertext itself, the field keeps track of when
/// the ciphertext was produced, in a separate timestamp slot.  Whenever a value is read and its
/// ciphertext turns out to be older than the *re-encryption window*, it is re-encrypted and
/// saved.  This means that rotating a [`Keyset`](super::Keyset) takes effect on all your data
/// without a migration: values are re-encrypted under the new key as they are used.
///
/// If a *fallback* encryptor is configured, values that the primary encryptor can't decrypt are
/// handed to the fallback.  Values recovered this way are always considered stale (the fallback
/// isn't expected to stamp them), so they are upgraded to the primary scheme on first read.
///
/// A value that neither encryptor can decrypt is gone for good.  Rather than have it break every
/// future read, the field clears it (and its timestamp) from the record, saves that, and reports
/// [`Read::Cleared`].
///
/// The *associated data* for every encryption comes from another slot of the same record (say,
/// the record's name or ID), binding each ciphertext to its record.  Copying a ciphertext onto a
/// different record makes it undecryptable.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use strong_field::{
/// 	AuthenticatedEncryptor, EncryptedField, Keyset, MemoryRecord, Record, Slot, TextCodec,
/// };
/// use secrecy::ExposeSecret as _;
/// # fn main() -> Result<(), strong_field::Error> {
///
/// let encryptor = Arc::new(TextCodec::new(AuthenticatedEncryptor::from_keyset(&Keyset::generate())));
///
/// let field =
/// 	EncryptedField::<String, String>::new(encryptor, "encrypted_secret", "last_reencryption_time")
/// 	.with_associated_data("name");
///
/// let mut record = MemoryRecord::new().with_slot("name", Slot::Text("alice".to_string()));
/// field.set(&mut record, &"hunter2".to_string())?;
///
/// // Only ciphertext is stored
/// assert_ne!(Slot::Text("hunter2".to_string()), record.slot("encrypted_secret"));
///
/// let secret = field.get(&mut record)?.expect("value was set");
/// assert_eq!("hunter2", secret.expose_secret());
/// assert_eq!("<redacted>", secret.to_string());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct EncryptedField<P, C> {
	encryptor: DynEncryptor<P, C>,
	fallback: Option<DynEncryptor<P, C>>,

	ciphertext_slot: String,
	reencrypted_at_slot: String,
	associated_data_slot: Option<String>,

	reencryption_window: TimeDelta,

	// This is just a way for us to test staleness by fiddling with time in unit tests
	time: Clock,
}

/// What happened when an [`EncryptedField`] was read.
#[derive(Debug)]
pub enum Read<P> {
	/// There was no ciphertext stored.
	Empty,

	/// The ciphertext was decrypted.
	Decrypted {
		value: Redacted<P>,
		source: DecryptedBy,
		/// Whether the value was re-encrypted (and saved) because it was stale.
		reencrypted: bool,
	},

	/// Neither the primary nor the fallback encryptor could decrypt the stored ciphertext, so
	/// it was removed from the record.
	Cleared,
}

impl<P> Read<P> {
	/// The decrypted value, if there was one.
	pub fn into_value(self) -> Option<Redacted<P>> {
		match self {
			Read::Decrypted { value, .. } => Some(value),
			Read::Empty | Read::Cleared => None,
		}
	}
}

/// Which encryptor managed to decrypt a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecryptedBy {
	Primary,
	Fallback,
}

/// Tally of the outcomes of an [`EncryptedField::refresh`] run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Refresh {
	pub empty: usize,
	pub fresh: usize,
	pub reencrypted: usize,
	pub cleared: usize,
	pub failed: usize,
}

impl<P, C> EncryptedField<P, C>
where
	C: SlotValue,
{
	/// Create a new field, storing its ciphertext in `ciphertext_slot` and the time it was
	/// produced in `reencrypted_at_slot`.
	///
	/// There is no fallback, no associated data, and the re-encryption window is
	/// [thirty days](DEFAULT_REENCRYPTION_WINDOW), until you say otherwise.
	pub fn new(
		encryptor: DynEncryptor<P, C>,
		ciphertext_slot: impl Into<String>,
		reencrypted_at_slot: impl Into<String>,
	) -> Self {
		Self {
			encryptor,
			fallback: None,
			ciphertext_slot: ciphertext_slot.into(),
			reencrypted_at_slot: reencrypted_at_slot.into(),
			associated_data_slot: None,
			reencryption_window: DEFAULT_REENCRYPTION_WINDOW,
			#[cfg(not(test))]
			time: Clock,
			#[cfg(test)]
			time: Clock::default(),
		}
	}

	/// Try this encryptor when the primary one can't decrypt a value.
	pub fn with_fallback(mut self, fallback: DynEncryptor<P, C>) -> Self {
		self.fallback = Some(fallback);
		self
	}

	/// Take the associated data for every encryption from the named slot.
	///
	/// The slot must hold bytes, text or a non-negative integer.
	pub fn with_associated_data(mut self, slot: impl Into<String>) -> Self {
		self.associated_data_slot = Some(slot.into());
		self
	}

	pub fn with_reencryption_window(mut self, window: TimeDelta) -> Self {
		self.reencryption_window = window;
		self
	}

	/// Decrypt the field's value from `record`.
	///
	/// Returns `None` if there is no value, or if the value could not be decrypted by either
	/// the primary or the fallback encryptor (in which case it has been cleared; use
	/// [`read`](EncryptedField::read) if you need to tell the difference).
	///
	/// # Errors
	///
	/// * If there's no fallback, whatever error the primary encryptor returned.
	/// * [`Error::Configuration`] if any of the field's slots hold the wrong kind of value.
	/// * Any error from re-encrypting a stale value, or persisting the result.
	pub fn get<R: Record + ?Sized>(&self, record: &mut R) -> Result<Option<Redacted<P>>, Error> {
		Ok(self.read(record)?.into_value())
	}

	/// Decrypt the field's value from `record`, reporting how it went.
	///
	/// See [`get`](EncryptedField::get) for the errors.
	#[tracing::instrument(level = "debug", skip_all, fields(slot = %self.ciphertext_slot))]
	pub fn read<R: Record + ?Sized>(&self, record: &mut R) -> Result<Read<P>, Error> {
		let Some(ciphertext) = C::from_slot(record.slot(&self.ciphertext_slot))? else {
			tracing::debug!("No ciphertext stored");
			return Ok(Read::Empty);
		};
		let reencrypted_at =
			DateTime::<Utc>::from_slot(record.slot(&self.reencrypted_at_slot))?;
		let associated_data = self.associated_data(record)?;

		let (plaintext, source) = match self.encryptor.decrypt(&ciphertext, &associated_data) {
			Ok(plaintext) => (plaintext, DecryptedBy::Primary),
			Err(e) => {
				let Some(fallback) = &self.fallback else {
					tracing::debug!(error=%e, "Decryption failed");
					return Err(e);
				};

				match fallback.decrypt(&ciphertext, &associated_data) {
					Ok(plaintext) => {
						tracing::debug!(primary_error=%e, "Decrypted with fallback");
						(plaintext, DecryptedBy::Fallback)
					}
					Err(fallback_error) => {
						tracing::warn!(primary_error=%e, %fallback_error, "Value cannot be decrypted; clearing it");
						self.clear(record)?;
						return Ok(Read::Cleared);
					}
				}
			}
		};

		let reencrypted = if self.is_stale(reencrypted_at) {
			tracing::debug!(?reencrypted_at, ?source, "Re-encrypting stale value");
			let ciphertext = self.encryptor.encrypt(&plaintext, &associated_data)?;
			self.store(record, ciphertext);
			record
				.persist(&[self.ciphertext_slot.as_str(), self.reencrypted_at_slot.as_str()])
				.map_err(Error::Persistence)?;
			true
		} else {
			false
		};

		Ok(Read::Decrypted {
			value: Redacted::new(plaintext),
			source,
			reencrypted,
		})
	}

	/// Encrypt `plaintext` into `record`.
	///
	/// Like setting any other attribute, this only changes the record in memory; saving it is
	/// up to you.
	#[tracing::instrument(level = "debug", skip_all, fields(slot = %self.ciphertext_slot))]
	pub fn set<R: Record + ?Sized>(&self, record: &mut R, plaintext: &P) -> Result<(), Error> {
		let associated_data = self.associated_data(record)?;
		let ciphertext = self.encryptor.encrypt(plaintext, &associated_data)?;

		self.store(record, ciphertext);

		Ok(())
	}

	/// Read the field on every one of `records`, so that stale values get re-encrypted and
	/// undecryptable ones get cleared.
	///
	/// Handy after rotating a keyset, to hurry things along for records that aren't read very
	/// often.  Failures on individual records are logged and counted, and don't stop the run.
	#[tracing::instrument(level = "debug", skip_all, fields(slot = %self.ciphertext_slot))]
	pub fn refresh<'a, R: Record + ?Sized + 'a>(
		&self,
		records: impl IntoIterator<Item = &'a mut R>,
	) -> Refresh {
		let mut tally = Refresh::default();

		for record in records {
			match self.read(record) {
				Ok(Read::Empty) => tally.empty += 1,
				Ok(Read::Decrypted {
					reencrypted: true, ..
				}) => tally.reencrypted += 1,
				Ok(Read::Decrypted { .. }) => tally.fresh += 1,
				Ok(Read::Cleared) => tally.cleared += 1,
				Err(error) => {
					tracing::warn!(%error, "Refresh failed");
					tally.failed += 1;
				}
			}
		}

		tracing::debug!(?tally, "Refresh complete");
		tally
	}

	fn associated_data<R: Record + ?Sized>(&self, record: &R) -> Result<Vec<u8>, Error> {
		let Some(slot) = &self.associated_data_slot else {
			return Ok(Vec::new());
		};

		Ok(AssociatedData::try_from(record.slot(slot))?.into_bytes())
	}

	fn is_stale(&self, reencrypted_at: Option<DateTime<Utc>>) -> bool {
		match reencrypted_at {
			None => true,
			Some(t) => self.time.now() - t > self.reencryption_window,
		}
	}

	fn store<R: Record + ?Sized>(&self, record: &mut R, ciphertext: C) {
		record.set_slot(&self.ciphertext_slot, ciphertext.into_slot());
		record.set_slot(&self.reencrypted_at_slot, Slot::Timestamp(self.time.now()));
	}

	fn clear<R: Record + ?Sized>(&self, record: &mut R) -> Result<(), Error> {
		record.set_slot(&self.ciphertext_slot, Slot::Null);
		record.set_slot(&self.reencrypted_at_slot, Slot::Null);
		record
			.persist(&[self.ciphertext_slot.as_str(), self.reencrypted_at_slot.as_str()])
			.map_err(Error::Persistence)
	}

	#[cfg(test)]
	fn timewarp(&mut self, d: TimeDelta) {
		self.time.timewarp(d)
	}
}

#[cfg(not(test))]
mod real_clock {
	use chrono::{DateTime, Utc};

	#[derive(Clone, Debug, Default)]
	pub(super) struct Clock;

	impl Clock {
		pub(super) fn now(&self) -> DateTime<Utc> {
			Utc::now()
		}
	}
}


#[cfg(not(test))]
use real_clock::Clock;
#[cfg(test)]
use test_clock::Clock;

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		AuthenticatedEncryptor, Keyset, LegacyEncryptor, MemoryRecord, StructuredCodec,
		TextCodec, encryptor::IdentityEncryptor, generate_key,
	};
	use secrecy::ExposeSecret as _;
	use serde_json::{Map, Value, json};

	const CT: &str = "encrypted_secret";
	const TS: &str = "last_reencryption_time";
	const NAME: &str = "name";

	fn text_codec() -> DynEncryptor<String, String> {
		Arc::new(TextCodec::new(AuthenticatedEncryptor::from_keyset(
			&Keyset::generate(),
		)))
	}

	fn text_field() -> EncryptedField<String, String> {
		EncryptedField::new(text_codec(), CT, TS).with_associated_data(NAME)
	}

	fn alice() -> MemoryRecord {
		MemoryRecord::new().with_slot(NAME, Slot::Text("alice".to_string()))
	}

	fn plaintext(read: Read<String>) -> String {
		read.into_value().expect("no value").into_inner()
	}

	#[test]
	fn empty_record_has_no_value() {
		crate::test_support::init();
		let mut r = alice();

		assert!(matches!(text_field().read(&mut r).unwrap(), Read::Empty));
		assert!(r.persisted().is_empty());
	}

	#[test]
	fn empty_plaintext_is_not_no_value() {
		crate::test_support::init();
		let field = text_field();
		let mut r = alice();

		field.set(&mut r, &String::new()).unwrap();

		assert_eq!(Some(String::new()), field.get(&mut r).unwrap().map(|v| v.into_inner()));
	}

	#[test]
	fn set_stores_ciphertext_and_timestamp_without_persisting() {
		crate::test_support::init();
		let field = text_field();
		let mut r = alice();

		field.set(&mut r, &"hello".to_string()).unwrap();

		let Slot::Text(ciphertext) = r.slot(CT) else {
			panic!("no ciphertext stored");
		};
		assert!(!ciphertext.contains("hello"));
		assert_eq!(Slot::Timestamp(field.time.now()), r.slot(TS));
		assert!(r.persisted().is_empty());
	}

	#[test]
	fn fresh_read_changes_nothing() {
		crate::test_support::init();
		let mut field = text_field();
		let mut r = alice();

		field.set(&mut r, &"hello".to_string()).unwrap();
		let (ct, ts) = (r.slot(CT), r.slot(TS));

		field.timewarp(TimeDelta::days(29));
		let read = field.read(&mut r).unwrap();

		assert!(matches!(
			read,
			Read::Decrypted {
				source: DecryptedBy::Primary,
				reencrypted: false,
				..
			}
		));
		assert_eq!("hello", plaintext(read));
		assert_eq!(ct, r.slot(CT));
		assert_eq!(ts, r.slot(TS));
		assert!(r.persisted().is_empty());
	}

	#[test]
	fn stale_read_reencrypts() {
		crate::test_support::init();
		let mut field = text_field();
		let mut r = alice();

		field.set(&mut r, &"hello".to_string()).unwrap();
		let (ct, ts) = (r.slot(CT), r.slot(TS));

		field.timewarp(TimeDelta::days(31));
		let read = field.read(&mut r).unwrap();

		assert!(matches!(
			read,
			Read::Decrypted {
				reencrypted: true,
				..
			}
		));
		assert_eq!("hello", plaintext(read));
		assert_ne!(ct, r.slot(CT));
		assert_ne!(ts, r.slot(TS));
		assert_eq!(Slot::Timestamp(field.time.now()), r.slot(TS));
		assert_eq!(1, r.persisted().len());
		assert_eq!(
			[CT, TS].iter().map(|s| s.to_string()).collect::<std::collections::BTreeSet<_>>(),
			r.persisted()[0]
		);

		// And now it's fresh again
		assert!(matches!(
			field.read(&mut r).unwrap(),
			Read::Decrypted {
				reencrypted: false,
				..
			}
		));
	}

	#[test]
	fn window_boundary_is_exclusive() {
		crate::test_support::init();
		let mut field =
			EncryptedField::<String, String>::new(Arc::new(IdentityEncryptor::<String>::new()), CT, TS)
			.with_reencryption_window(TimeDelta::hours(1));
		let mut r = MemoryRecord::new();

		field.set(&mut r, &"hello".to_string()).unwrap();

		field.timewarp(TimeDelta::hours(1));
		assert!(matches!(
			field.read(&mut r).unwrap(),
			Read::Decrypted {
				reencrypted: false,
				..
			}
		));

		field.timewarp(TimeDelta::seconds(1));
		assert!(matches!(
			field.read(&mut r).unwrap(),
			Read::Decrypted {
				reencrypted: true,
				..
			}
		));
	}

	#[test]
	fn missing_timestamp_is_stale() {
		crate::test_support::init();
		let field = text_field();
		let mut r = alice();

		field.set(&mut r, &"hello".to_string()).unwrap();
		r.set_slot(TS, Slot::Null);

		let read = field.read(&mut r).unwrap();
		assert!(matches!(
			read,
			Read::Decrypted {
				reencrypted: true,
				..
			}
		));
		assert_eq!(Slot::Timestamp(field.time.now()), r.slot(TS));
	}

	#[test]
	fn undecryptable_without_fallback_is_an_error() {
		crate::test_support::init();
		let mut r = alice();
		text_field().set(&mut r, &"hello".to_string()).unwrap();
		let ct = r.slot(CT);

		// A field with a different key
		let result = text_field().read(&mut r);

		assert!(matches!(result, Err(Error::Decryption)));
		assert_eq!(ct, r.slot(CT));
		assert!(r.persisted().is_empty());
	}

	#[test]
	fn associated_data_binds_value_to_record() {
		crate::test_support::init();
		let field = text_field();
		let mut r = alice();

		field.set(&mut r, &"hello".to_string()).unwrap();
		r.set_slot(NAME, Slot::Text("bob".to_string()));

		assert!(matches!(field.read(&mut r), Err(Error::Decryption)));
	}

	#[test]
	fn integer_associated_data() {
		crate::test_support::init();
		let field = EncryptedField::new(text_codec(), CT, TS).with_associated_data("id");
		let mut r = MemoryRecord::new().with_slot("id", Slot::Integer(1234));

		field.set(&mut r, &"hello".to_string()).unwrap();
		assert_eq!("hello", plaintext(field.read(&mut r).unwrap()));

		r.set_slot("id", Slot::Integer(1235));
		assert!(matches!(field.read(&mut r), Err(Error::Decryption)));
	}

	#[test]
	fn unsuitable_associated_data_is_a_configuration_error() {
		crate::test_support::init();
		let field = EncryptedField::new(text_codec(), CT, TS).with_associated_data("created");
		let mut r = MemoryRecord::new().with_slot("created", Slot::Timestamp(Utc::now()));

		let result = field.set(&mut r, &"hello".to_string());
		assert!(matches!(result, Err(Error::Configuration(_))));
	}

	fn legacy_fallback_field(legacy: &LegacyEncryptor) -> EncryptedField<String, String> {
		text_field().with_fallback(Arc::new(legacy.clone()))
	}

	#[test]
	fn legacy_values_are_upgraded_on_read() {
		crate::test_support::init();
		let legacy = LegacyEncryptor::new(&generate_key());
		let field = legacy_fallback_field(&legacy);
		let mut r = alice().with_slot(CT, Slot::Text(legacy.encrypt_bytes(b"old secret").unwrap()));

		let read = field.read(&mut r).unwrap();
		assert!(matches!(
			read,
			Read::Decrypted {
				source: DecryptedBy::Fallback,
				reencrypted: true,
				..
			}
		));
		assert_eq!("old secret", plaintext(read));

		let Slot::Text(ct) = r.slot(CT) else {
			panic!("ciphertext went missing");
		};
		assert!(!ct.starts_with("v1."));

		// Second read doesn't need the fallback any more
		let read = field.read(&mut r).unwrap();
		assert!(matches!(
			read,
			Read::Decrypted {
				source: DecryptedBy::Primary,
				reencrypted: false,
				..
			}
		));
		assert_eq!("old secret", plaintext(read));
	}

	#[test]
	fn fresh_legacy_values_are_left_alone() {
		crate::test_support::init();
		let legacy = LegacyEncryptor::new(&generate_key());
		let field = legacy_fallback_field(&legacy);
		let token = legacy.encrypt_bytes(b"old secret").unwrap();
		let mut r = alice()
			.with_slot(CT, Slot::Text(token.clone()))
			.with_slot(TS, Slot::Timestamp(field.time.now()));

		let read = field.read(&mut r).unwrap();
		assert!(matches!(
			read,
			Read::Decrypted {
				source: DecryptedBy::Fallback,
				reencrypted: false,
				..
			}
		));
		assert_eq!(Slot::Text(token), r.slot(CT));
	}

	#[test]
	fn undecryptable_with_fallback_is_cleared() {
		crate::test_support::init();
		let field = legacy_fallback_field(&LegacyEncryptor::new(&generate_key()));
		let mut r = alice();
		text_field().set(&mut r, &"hello".to_string()).unwrap();

		assert!(matches!(field.read(&mut r).unwrap(), Read::Cleared));
		assert_eq!(Slot::Null, r.slot(CT));
		assert_eq!(Slot::Null, r.slot(TS));
		assert_eq!(1, r.persisted().len());

		// Once cleared, it's simply empty
		assert!(matches!(field.read(&mut r).unwrap(), Read::Empty));
		assert!(field.get(&mut r).unwrap().is_none());
	}

	#[test]
	fn garbage_with_fallback_is_cleared() {
		crate::test_support::init();
		let field = legacy_fallback_field(&LegacyEncryptor::new(&generate_key()));
		let mut r = alice()
			.with_slot(CT, Slot::Text("not base64, not legacy".to_string()))
			.with_slot(TS, Slot::Timestamp(Utc::now()));

		assert!(field.get(&mut r).unwrap().is_none());
		assert!(r.slot(CT).is_null());
		assert!(r.slot(TS).is_null());
	}

	#[derive(Debug)]
	struct ReadOnly(TextCodec<AuthenticatedEncryptor>);

	impl Encryptor for ReadOnly {
		type Plaintext = String;
		type Ciphertext = String;

		fn encrypt(&self, _plaintext: &String, _associated_data: &[u8]) -> Result<String, Error> {
			Err(Error::Encryption)
		}

		fn decrypt(&self, ciphertext: &String, associated_data: &[u8]) -> Result<String, Error> {
			self.0.decrypt(ciphertext, associated_data)
		}
	}

	#[test]
	fn reencryption_failure_is_not_hidden() {
		crate::test_support::init();
		let keyset = Keyset::generate();
		let writer = EncryptedField::<String, String>::new(
			Arc::new(TextCodec::new(AuthenticatedEncryptor::from_keyset(&keyset))),
			CT,
			TS,
		);
		let reader = EncryptedField::<String, String>::new(
			Arc::new(ReadOnly(TextCodec::new(AuthenticatedEncryptor::from_keyset(
				&keyset,
			)))),
			CT,
			TS,
		);
		let mut r = MemoryRecord::new();

		writer.set(&mut r, &"hello".to_string()).unwrap();
		r.set_slot(TS, Slot::Null);

		assert!(matches!(reader.read(&mut r), Err(Error::Encryption)));
		assert!(r.persisted().is_empty());
	}

	#[derive(Debug, Default)]
	struct BrokenDatabase(MemoryRecord);

	impl Record for BrokenDatabase {
		fn slot(&self, name: &str) -> Slot {
			self.0.slot(name)
		}

		fn set_slot(&mut self, name: &str, value: Slot) {
			self.0.set_slot(name, value)
		}

		fn persist(&mut self, _slots: &[&str]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
			Err("database is on fire".into())
		}
	}

	#[test]
	fn persistence_failure_is_not_hidden() {
		crate::test_support::init();
		let field = EncryptedField::new(text_codec(), CT, TS);
		let mut r = BrokenDatabase::default();

		field.set(&mut r, &"hello".to_string()).unwrap();
		r.set_slot(TS, Slot::Null);

		assert!(matches!(field.read(&mut r), Err(Error::Persistence(_))));
	}

	#[test]
	fn binary_field() {
		crate::test_support::init();
		let field = EncryptedField::<Vec<u8>, Vec<u8>>::new(
			Arc::new(AuthenticatedEncryptor::from_keyset(&Keyset::generate())),
			"binary_encrypted_secret",
			"binary_reencryption_time",
		)
		.with_associated_data(NAME);
		let mut r = alice();

		field.set(&mut r, &vec![0, 1, 2, 255]).unwrap();

		assert!(matches!(r.slot("binary_encrypted_secret"), Slot::Bytes(_)));
		assert_eq!(
			vec![0, 1, 2, 255],
			field.get(&mut r).unwrap().unwrap().into_inner()
		);
	}

	#[test]
	fn structured_field() {
		crate::test_support::init();
		let field = EncryptedField::<Map<String, Value>, Map<String, Value>>::new(
			Arc::new(StructuredCodec::new(AuthenticatedEncryptor::from_keyset(
				&Keyset::generate(),
			))),
			"json_with_encrypted_secret",
			"json_reencryption_time",
		);
		let Value::Object(value) = json!({"name": "alice", "secret": "hunter2"}) else {
			unreachable!()
		};
		let mut r = alice();

		field.set(&mut r, &value).unwrap();

		let Slot::Json(stored) = r.slot("json_with_encrypted_secret") else {
			panic!("not stored as JSON");
		};
		assert_eq!("alice", stored["name"]);
		assert_ne!("hunter2", stored["secret"]);

		assert_eq!(value, field.get(&mut r).unwrap().unwrap().into_inner());
	}

	#[test]
	fn wrongly_typed_ciphertext_slot_is_a_configuration_error() {
		crate::test_support::init();
		let mut r = alice().with_slot(CT, Slot::Bytes(vec![1, 2, 3]));

		assert!(matches!(
			text_field().read(&mut r),
			Err(Error::Configuration(_))
		));
	}

	#[test]
	fn reads_are_redacted() {
		crate::test_support::init();
		let field = text_field();
		let mut r = alice();
		field.set(&mut r, &"hunter2".to_string()).unwrap();

		let read = field.read(&mut r).unwrap();
		assert!(!format!("{read:?}").contains("hunter2"));

		let value = read.into_value().unwrap();
		assert!(!value.to_string().contains("hunter2"));
		assert_eq!("hunter2", value.expose_secret());
	}

	#[test]
	fn refresh_tallies_outcomes() {
		crate::test_support::init();
		let legacy = LegacyEncryptor::new(&generate_key());
		let mut field = legacy_fallback_field(&legacy);

		let mut stale = alice();
		field.set(&mut stale, &"stale".to_string()).unwrap();
		field.timewarp(TimeDelta::days(60));

		let mut fresh = alice();
		field.set(&mut fresh, &"fresh".to_string()).unwrap();

		let mut legacy_value =
			alice().with_slot(CT, Slot::Text(legacy.encrypt_bytes(b"legacy").unwrap()));

		let mut garbage = alice().with_slot(CT, Slot::Text("garbage".to_string()));

		let mut empty = alice();

		let mut misconfigured = MemoryRecord::new()
			.with_slot(NAME, Slot::Json(Value::Null))
			.with_slot(CT, Slot::Text("garbage".to_string()));

		let tally = field.refresh([
			&mut stale,
			&mut fresh,
			&mut legacy_value,
			&mut garbage,
			&mut empty,
			&mut misconfigured,
		]);

		assert_eq!(
			Refresh {
				empty: 1,
				fresh: 1,
				reencrypted: 2,
				cleared: 1,
				failed: 1,
			},
			tally
		);
		assert_eq!("stale", field.get(&mut stale).unwrap().unwrap().into_inner());
	}
}
