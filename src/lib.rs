//! Encrypted fields for database records, with key rotation and lazy re-encryption.
//!
//! An [`EncryptedField`] stores a secret in one slot of a [`Record`] (typically, a column of a
//! database row) as ciphertext, along with a timestamp of when it was last encrypted.  Reading the
//! field decrypts the ciphertext; if it was encrypted too long ago, or with an old encryptor, it is
//! transparently re-encrypted under the current key and the record is saved.  Over time, then,
//! every stored ciphertext migrates to the current key without anyone having to run a bulk job
//! (although [`EncryptedField::refresh`] is there if you want one).
//!
//! The primary encryptor is an [`AuthenticatedEncryptor`], which uses ChaCha20-Poly1305 with keys
//! from a [`Keyset`].  The keyset can be stored in the clear, sealed by a remote [`KeyWrapper`]
//! (such as a cloud KMS), or dispensed with entirely in favour of envelope encryption, where every
//! ciphertext carries its own wrapped data key.  See [`KeySource`] for how to choose.
//!
//! Ciphertexts can be bound to *associated data*, taken from another slot of the same record (the
//! row's primary key is a good choice).  That way, a ciphertext copied from one row into another
//! won't decrypt.
//!
//! To move away from an older scheme, configure a [`LegacyEncryptor`] (or any other
//! [`Encryptor`]) as the field's fallback: values it can decrypt are re-encrypted with the primary
//! encryptor the first time they're read.
//!
//! Decrypted values come back wrapped in [`Redacted`], so they don't end up in logs by accident.
mod authenticated;
mod codec;
mod config;
mod encryptor;
mod envelope;
mod error;
mod field;
mod kdf;
mod key;
mod key_id;
mod key_source;
mod keyset;
mod legacy;
mod record;
mod redacted;
mod shared;

#[cfg(test)]
mod test_support;

pub use authenticated::AuthenticatedEncryptor;
pub use codec::{SECRET_KEY, StructuredCodec, TextCodec};
pub use config::{Config, parse_duration};
pub use encryptor::Encryptor;
pub use error::Error;
pub use field::{
	DEFAULT_REENCRYPTION_WINDOW, DecryptedBy, DynEncryptor, EncryptedField, Read, Refresh,
};
pub use key::{Key, generate_key};
pub use key_id::KeyId;
pub use key_source::{KeySource, KeyWrapper};
pub use keyset::Keyset;
pub use legacy::LegacyEncryptor;
pub use record::{AssociatedData, MemoryRecord, Record, Slot, SlotValue};
pub use redacted::Redacted;
pub use shared::Shared;

use key_id::key_id;
