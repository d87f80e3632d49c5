//! Key segments
//!
//! [`KeyPart`] is the untyped form of a single key segment. Typed key shapes
//! convert to and from it through [`KeySegment`].

use std::cmp::Ordering;
use std::fmt;

use bytes::Bytes;

use crate::error::{Result, TkvError};

/// A single segment of a key
///
/// Ordering across variants: `Bytes < String < Int < Float < Bool`.
/// Within a variant the natural order applies; floats use IEEE 754 total
/// order, so `-0.0 < 0.0` and NaN sorts above infinity.
#[derive(Debug, Clone)]
pub enum KeyPart {
    Bytes(Bytes),
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl KeyPart {
    /// Position of the variant in the cross-type order
    fn rank(&self) -> u8 {
        match self {
            KeyPart::Bytes(_) => 0,
            KeyPart::String(_) => 1,
            KeyPart::Int(_) => 2,
            KeyPart::Float(_) => 3,
            KeyPart::Bool(_) => 4,
        }
    }

    /// Name of the variant, used in decode errors
    pub fn type_name(&self) -> &'static str {
        match self {
            KeyPart::Bytes(_) => "bytes",
            KeyPart::String(_) => "string",
            KeyPart::Int(_) => "int",
            KeyPart::Float(_) => "float",
            KeyPart::Bool(_) => "bool",
        }
    }
}

impl Ord for KeyPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyPart::Bytes(a), KeyPart::Bytes(b)) => a.cmp(b),
            (KeyPart::String(a), KeyPart::String(b)) => a.as_bytes().cmp(b.as_bytes()),
            (KeyPart::Int(a), KeyPart::Int(b)) => a.cmp(b),
            (KeyPart::Float(a), KeyPart::Float(b)) => a.total_cmp(b),
            (KeyPart::Bool(a), KeyPart::Bool(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for KeyPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for KeyPart {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyPart {}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Bytes(b) => {
                write!(f, "0x")?;
                for byte in b.iter() {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            KeyPart::String(s) => write!(f, "{:?}", s),
            KeyPart::Int(i) => write!(f, "{}n", i),
            KeyPart::Float(x) => write!(f, "{}", x),
            KeyPart::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for KeyPart {
    fn from(s: &str) -> Self {
        KeyPart::String(s.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(s: String) -> Self {
        KeyPart::String(s)
    }
}

impl From<i64> for KeyPart {
    fn from(i: i64) -> Self {
        KeyPart::Int(i)
    }
}

impl From<f64> for KeyPart {
    fn from(x: f64) -> Self {
        KeyPart::Float(x)
    }
}

impl From<bool> for KeyPart {
    fn from(b: bool) -> Self {
        KeyPart::Bool(b)
    }
}

impl From<Bytes> for KeyPart {
    fn from(b: Bytes) -> Self {
        KeyPart::Bytes(b)
    }
}

impl From<&[u8]> for KeyPart {
    fn from(b: &[u8]) -> Self {
        KeyPart::Bytes(Bytes::copy_from_slice(b))
    }
}

// =============================================================================
// Typed Segments
// =============================================================================

/// A Rust type usable as one position of a typed key
pub trait KeySegment: Sized + Clone {
    /// Convert to the untyped segment
    fn to_part(&self) -> KeyPart;

    /// Convert back from the untyped segment, failing on a type mismatch
    fn from_part(part: KeyPart) -> Result<Self>;
}

fn type_mismatch(expected: &str, part: &KeyPart) -> TkvError {
    TkvError::KeyDecode(format!(
        "expected {} segment, got {} ({})",
        expected,
        part.type_name(),
        part
    ))
}

impl KeySegment for String {
    fn to_part(&self) -> KeyPart {
        KeyPart::String(self.clone())
    }

    fn from_part(part: KeyPart) -> Result<Self> {
        match part {
            KeyPart::String(s) => Ok(s),
            other => Err(type_mismatch("string", &other)),
        }
    }
}

impl KeySegment for i64 {
    fn to_part(&self) -> KeyPart {
        KeyPart::Int(*self)
    }

    fn from_part(part: KeyPart) -> Result<Self> {
        match part {
            KeyPart::Int(i) => Ok(i),
            other => Err(type_mismatch("int", &other)),
        }
    }
}

impl KeySegment for f64 {
    fn to_part(&self) -> KeyPart {
        KeyPart::Float(*self)
    }

    fn from_part(part: KeyPart) -> Result<Self> {
        match part {
            KeyPart::Float(x) => Ok(x),
            other => Err(type_mismatch("float", &other)),
        }
    }
}

impl KeySegment for bool {
    fn to_part(&self) -> KeyPart {
        KeyPart::Bool(*self)
    }

    fn from_part(part: KeyPart) -> Result<Self> {
        match part {
            KeyPart::Bool(b) => Ok(b),
            other => Err(type_mismatch("bool", &other)),
        }
    }
}

impl KeySegment for Bytes {
    fn to_part(&self) -> KeyPart {
        KeyPart::Bytes(self.clone())
    }

    fn from_part(part: KeyPart) -> Result<Self> {
        match part {
            KeyPart::Bytes(b) => Ok(b),
            other => Err(type_mismatch("bytes", &other)),
        }
    }
}

impl KeySegment for Vec<u8> {
    fn to_part(&self) -> KeyPart {
        KeyPart::Bytes(Bytes::copy_from_slice(self))
    }

    fn from_part(part: KeyPart) -> Result<Self> {
        match part {
            KeyPart::Bytes(b) => Ok(b.to_vec()),
            other => Err(type_mismatch("bytes", &other)),
        }
    }
}

/// Declare a zero-sized key segment that always encodes as a fixed string.
///
/// Literal segments pin a position of the key shape to one value, so a
/// keyspace like `["usersByEmail", email]` becomes `(UsersByEmail, String)`:
///
/// ```
/// use typedkv::key_literal;
///
/// key_literal!(pub UsersByEmail = "usersByEmail");
///
/// type UserKey = (UsersByEmail, String);
/// let key: UserKey = (UsersByEmail, "ada@example.com".to_string());
/// # let _ = key;
/// ```
#[macro_export]
macro_rules! key_literal {
    ($(#[$meta:meta])* $vis:vis $name:ident = $lit:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        $vis struct $name;

        impl $name {
            /// The fixed string this segment encodes as
            pub const LITERAL: &'static str = $lit;
        }

        impl $crate::key::KeySegment for $name {
            fn to_part(&self) -> $crate::key::KeyPart {
                $crate::key::KeyPart::String(::std::string::String::from($lit))
            }

            fn from_part(part: $crate::key::KeyPart) -> $crate::Result<Self> {
                match part {
                    $crate::key::KeyPart::String(ref s) if s == $lit => Ok($name),
                    other => Err($crate::TkvError::KeyDecode(format!(
                        "expected literal {:?}, got {}",
                        $lit, other
                    ))),
                }
            }
        }
    };
}
