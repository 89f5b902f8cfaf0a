use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};

use super::Error;

/// The value of one named attribute of a [`Record`], much as a database column would hold it.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Slot {
	#[default]
	Null,
	Bytes(Vec<u8>),
	Text(String),
	Integer(i64),
	Json(Value),
	Timestamp(DateTime<Utc>),
}

impl Slot {
	pub fn is_null(&self) -> bool {
		matches!(self, Slot::Null)
	}

	fn kind(&self) -> &'static str {
		match self {
			Slot::Null => "null",
			Slot::Bytes(_) => "bytes",
			Slot::Text(_) => "text",
			Slot::Integer(_) => "integer",
			Slot::Json(_) => "json",
			Slot::Timestamp(_) => "timestamp",
		}
	}
}

/// Something with named slots that can be durably saved: typically, a database row.
///
/// An [`EncryptedField`](super::EncryptedField) reads and writes the slots it was configured
/// with, and asks the record to [`persist`](Record::persist) them when a read changes what is
/// stored.
pub trait Record {
	/// The current value of the named slot.  Unknown slots are [`Slot::Null`].
	fn slot(&self, name: &str) -> Slot;

	/// Change the in-memory value of the named slot.
	fn set_slot(&mut self, name: &str, value: Slot);

	/// Durably save the named slots (and only those).
	fn persist(&mut self, slots: &[&str]) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Conversion between a ciphertext type and the [`Slot`] it is stored in.
pub trait SlotValue: Sized {
	fn into_slot(self) -> Slot;

	/// `Ok(None)` for [`Slot::Null`]; an error if the slot holds the wrong kind of value.
	fn from_slot(slot: Slot) -> Result<Option<Self>, Error>;
}

impl SlotValue for Vec<u8> {
	fn into_slot(self) -> Slot {
		Slot::Bytes(self)
	}

	fn from_slot(slot: Slot) -> Result<Option<Self>, Error> {
		match slot {
			Slot::Null => Ok(None),
			Slot::Bytes(b) => Ok(Some(b)),
			other => Err(Error::configuration(format!(
				"expected bytes slot, found {}",
				other.kind()
			))),
		}
	}
}

impl SlotValue for String {
	fn into_slot(self) -> Slot {
		Slot::Text(self)
	}

	fn from_slot(slot: Slot) -> Result<Option<Self>, Error> {
		match slot {
			Slot::Null => Ok(None),
			Slot::Text(s) => Ok(Some(s)),
			other => Err(Error::configuration(format!(
				"expected text slot, found {}",
				other.kind()
			))),
		}
	}
}

impl SlotValue for Map<String, Value> {
	fn into_slot(self) -> Slot {
		Slot::Json(Value::Object(self))
	}

	fn from_slot(slot: Slot) -> Result<Option<Self>, Error> {
		match slot {
			Slot::Null | Slot::Json(Value::Null) => Ok(None),
			Slot::Json(Value::Object(m)) => Ok(Some(m)),
			other => Err(Error::configuration(format!(
				"expected JSON object slot, found {}",
				other.kind()
			))),
		}
	}
}

impl SlotValue for DateTime<Utc> {
	fn into_slot(self) -> Slot {
		Slot::Timestamp(self)
	}

	fn from_slot(slot: Slot) -> Result<Option<Self>, Error> {
		match slot {
			Slot::Null => Ok(None),
			Slot::Timestamp(t) => Ok(Some(t)),
			other => Err(Error::configuration(format!(
				"expected timestamp slot, found {}",
				other.kind()
			))),
		}
	}
}

/// The value that a ciphertext is bound to, taken from another slot of the same record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssociatedData {
	Bytes(Vec<u8>),
	Text(String),
	Integer(u64),
}

impl AssociatedData {
	/// The bytes that are actually fed to the cipher.
	///
	/// Text is UTF-8 encoded, and integers use the shortest big-endian representation (with
	/// zero being a single zero byte).
	pub fn into_bytes(self) -> Vec<u8> {
		match self {
			AssociatedData::Bytes(b) => b,
			AssociatedData::Text(s) => s.into_bytes(),
			AssociatedData::Integer(n) => {
				let bytes = n.to_be_bytes();
				let skip = (n.leading_zeros() / 8).min(7) as usize;
				bytes[skip..].to_vec()
			}
		}
	}
}

impl TryFrom<Slot> for AssociatedData {
	type Error = Error;

	fn try_from(slot: Slot) -> Result<Self, Error> {
		match slot {
			Slot::Bytes(b) => Ok(AssociatedData::Bytes(b)),
			Slot::Text(s) => Ok(AssociatedData::Text(s)),
			Slot::Integer(n) => u64::try_from(n).map(AssociatedData::Integer).map_err(|_| {
				Error::configuration("negative integers cannot be used as associated data")
			}),
			other => Err(Error::configuration(format!(
				"{} slots cannot be used as associated data",
				other.kind()
			))),
		}
	}
}

impl From<&[u8]> for AssociatedData {
	fn from(b: &[u8]) -> Self {
		AssociatedData::Bytes(b.to_vec())
	}
}

impl From<&str> for AssociatedData {
	fn from(s: &str) -> Self {
		AssociatedData::Text(s.to_string())
	}
}

impl From<u64> for AssociatedData {
	fn from(n: u64) -> Self {
		AssociatedData::Integer(n)
	}
}

/// A [`Record`] that lives entirely in memory, and remembers what it was asked to persist.
///
/// Mostly for tests, and for trying things out.
#[derive(Clone, Debug, Default)]
pub struct MemoryRecord {
	slots: HashMap<String, Slot>,
	persisted: Vec<BTreeSet<String>>,
}

impl MemoryRecord {
	pub fn new() -> Self {
		Self::default()
	}

	/// Builder-style [`set_slot`](Record::set_slot).
	pub fn with_slot(mut self, name: &str, value: Slot) -> Self {
		self.set_slot(name, value);
		self
	}

	/// Every [`persist`](Record::persist) call so far, oldest first.
	pub fn persisted(&self) -> &[BTreeSet<String>] {
		&self.persisted
	}
}

impl Record for MemoryRecord {
	fn slot(&self, name: &str) -> Slot {
		self.slots.get(name).cloned().unwrap_or_default()
	}

	fn set_slot(&mut self, name: &str, value: Slot) {
		if value.is_null() {
			self.slots.remove(name);
		} else {
			self.slots.insert(name.to_string(), value);
		}
	}

	fn persist(&mut self, slots: &[&str]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
		self.persisted
			.push(slots.iter().map(|s| s.to_string()).collect());
		Ok(())
	}
}
