//! Entry Model
//!
//! Typed views over backend state: a key, its value and the versionstamp of
//! the write that produced it.

use std::fmt;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::backend::RawEntry;
use crate::error::{Result, TkvError};
use crate::key::Key;

/// Length of a versionstamp in bytes
pub const VERSIONSTAMP_LEN: usize = 10;

/// Opaque per-commit version token
///
/// Ten bytes: an 8-byte big-endian commit sequence followed by a 2-byte
/// index within the commit. Later commits always compare greater.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Versionstamp([u8; VERSIONSTAMP_LEN]);

impl Versionstamp {
    /// Build the versionstamp of commit number `sequence`
    pub fn from_sequence(sequence: u64) -> Self {
        let mut raw = [0u8; VERSIONSTAMP_LEN];
        raw[..8].copy_from_slice(&sequence.to_be_bytes());
        Self(raw)
    }

    pub fn from_bytes(raw: [u8; VERSIONSTAMP_LEN]) -> Self {
        Self(raw)
    }

    pub fn as_bytes(&self) -> &[u8; VERSIONSTAMP_LEN] {
        &self.0
    }
}

impl fmt::Display for Versionstamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Versionstamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Versionstamp({})", self)
    }
}

/// A present key with its value and versionstamp
#[derive(Debug, Clone, PartialEq)]
pub struct Entry<K, V> {
    pub key: K,
    pub value: V,
    pub versionstamp: Versionstamp,
}

/// Result of a point read: the key is either present or absent
///
/// Value and versionstamp exist together or not at all.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryMaybe<K, V> {
    Present(Entry<K, V>),
    Absent { key: K },
}

impl<K, V> EntryMaybe<K, V> {
    pub fn key(&self) -> &K {
        match self {
            EntryMaybe::Present(entry) => &entry.key,
            EntryMaybe::Absent { key } => key,
        }
    }

    pub fn value(&self) -> Option<&V> {
        match self {
            EntryMaybe::Present(entry) => Some(&entry.value),
            EntryMaybe::Absent { .. } => None,
        }
    }

    pub fn versionstamp(&self) -> Option<Versionstamp> {
        match self {
            EntryMaybe::Present(entry) => Some(entry.versionstamp),
            EntryMaybe::Absent { .. } => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, EntryMaybe::Present(_))
    }

    pub fn into_value(self) -> Option<V> {
        match self {
            EntryMaybe::Present(entry) => Some(entry.value),
            EntryMaybe::Absent { .. } => None,
        }
    }

    pub fn into_entry(self) -> Option<Entry<K, V>> {
        match self {
            EntryMaybe::Present(entry) => Some(entry),
            EntryMaybe::Absent { .. } => None,
        }
    }
}

impl<K, V> From<Entry<K, V>> for EntryMaybe<K, V> {
    fn from(entry: Entry<K, V>) -> Self {
        EntryMaybe::Present(entry)
    }
}

// =============================================================================
// Value Encoding
// =============================================================================

pub(crate) fn encode_value<V: Serialize>(value: &V) -> Result<Bytes> {
    Ok(Bytes::from(bincode::serialize(value)?))
}

pub(crate) fn decode_value<V: DeserializeOwned>(bytes: &[u8]) -> Result<V> {
    bincode::deserialize(bytes).map_err(|e| TkvError::Serialization(e.to_string()))
}

/// Decode a backend entry into a typed one
pub(crate) fn decode_entry<K: Key, V: DeserializeOwned>(raw: &RawEntry) -> Result<Entry<K, V>> {
    Ok(Entry {
        key: K::decode(&raw.key)?,
        value: decode_value(&raw.value)?,
        versionstamp: raw.versionstamp,
    })
}

/// Pair a known typed key with an optional backend entry
pub(crate) fn entry_maybe<K, V: DeserializeOwned>(
    key: K,
    raw: Option<&RawEntry>,
) -> Result<EntryMaybe<K, V>> {
    match raw {
        Some(raw) => Ok(EntryMaybe::Present(Entry {
            key,
            value: decode_value(&raw.value)?,
            versionstamp: raw.versionstamp,
        })),
        None => Ok(EntryMaybe::Absent { key }),
    }
}
