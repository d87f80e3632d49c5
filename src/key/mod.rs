//! Key Model
//!
//! Typed tuple keys over ordered byte keys.
//!
//! ## Responsibilities
//! - Define the segment types a key can hold ([`KeyPart`], [`KeySegment`])
//! - Fix the key shape of a keyspace at the type level ([`Key`] on tuples)
//! - Enumerate the valid prefixes of a shape at compile time ([`PrefixOf`])
//! - Encode keys into bytes whose order matches key order ([`codec`])
//!
//! ## Prefixes
//! For a shape `(A, B, C)` the valid prefixes are `(A,)`, `(A, B)` and
//! `(A, B, C)`. The full-length key denotes the singleton range holding only
//! that key. Passing anything else as a prefix is a compile error:
//!
//! ```compile_fail
//! use typedkv::key::PrefixOf;
//!
//! fn takes_prefix<P: PrefixOf<(String, i64)>>(_: P) {}
//! takes_prefix((42i64,));
//! ```

pub mod codec;
mod part;

pub use part::{KeyPart, KeySegment};

use bytes::Bytes;

use crate::error::{Result, TkvError};

/// A typed key shape
///
/// Implemented for tuples of one to six [`KeySegment`]s. The arity and the
/// segment type at each position are fixed by the tuple type.
pub trait Key: Sized + Clone {
    /// Number of segments in the shape
    const ARITY: usize;

    /// Convert to untyped segments, in order
    fn to_parts(&self) -> Vec<KeyPart>;

    /// Rebuild the typed key from untyped segments
    fn from_parts(parts: Vec<KeyPart>) -> Result<Self>;

    /// Encode to ordered key bytes
    fn encode(&self) -> Bytes {
        codec::encode_parts(&self.to_parts())
    }

    /// Decode from ordered key bytes
    fn decode(bytes: &[u8]) -> Result<Self> {
        Self::from_parts(codec::decode_parts(bytes)?)
    }
}

/// Marker for the valid prefixes of the key shape `K`
///
/// Every prefix is itself a (shorter) [`Key`].
pub trait PrefixOf<K: Key>: Key {}

fn next_part(parts: &mut std::vec::IntoIter<KeyPart>, arity: usize) -> Result<KeyPart> {
    parts.next().ok_or(TkvError::KeyShape {
        expected: arity,
        actual: 0,
    })
}

macro_rules! impl_key_tuple {
    ($arity:expr => $($name:ident . $idx:tt),+) => {
        impl<$($name: KeySegment),+> Key for ($($name,)+) {
            const ARITY: usize = $arity;

            fn to_parts(&self) -> Vec<KeyPart> {
                vec![$(self.$idx.to_part()),+]
            }

            fn from_parts(parts: Vec<KeyPart>) -> Result<Self> {
                if parts.len() != $arity {
                    return Err(TkvError::KeyShape {
                        expected: $arity,
                        actual: parts.len(),
                    });
                }
                let mut parts = parts.into_iter();
                Ok(($($name::from_part(next_part(&mut parts, $arity)?)?,)+))
            }
        }
    };
}

impl_key_tuple!(1 => A.0);
impl_key_tuple!(2 => A.0, B.1);
impl_key_tuple!(3 => A.0, B.1, C.2);
impl_key_tuple!(4 => A.0, B.1, C.2, D.3);
impl_key_tuple!(5 => A.0, B.1, C.2, D.3, E.4);
impl_key_tuple!(6 => A.0, B.1, C.2, D.3, E.4, F.5);

macro_rules! impl_prefix_of {
    (($($p:ident),+) of ($($k:ident),+)) => {
        impl<$($k: KeySegment),+> PrefixOf<($($k,)+)> for ($($p,)+) {}
    };
}

impl_prefix_of!((A) of (A));

impl_prefix_of!((A) of (A, B));
impl_prefix_of!((A, B) of (A, B));

impl_prefix_of!((A) of (A, B, C));
impl_prefix_of!((A, B) of (A, B, C));
impl_prefix_of!((A, B, C) of (A, B, C));

impl_prefix_of!((A) of (A, B, C, D));
impl_prefix_of!((A, B) of (A, B, C, D));
impl_prefix_of!((A, B, C) of (A, B, C, D));
impl_prefix_of!((A, B, C, D) of (A, B, C, D));

impl_prefix_of!((A) of (A, B, C, D, E));
impl_prefix_of!((A, B) of (A, B, C, D, E));
impl_prefix_of!((A, B, C) of (A, B, C, D, E));
impl_prefix_of!((A, B, C, D) of (A, B, C, D, E));
impl_prefix_of!((A, B, C, D, E) of (A, B, C, D, E));

impl_prefix_of!((A) of (A, B, C, D, E, F));
impl_prefix_of!((A, B) of (A, B, C, D, E, F));
impl_prefix_of!((A, B, C) of (A, B, C, D, E, F));
impl_prefix_of!((A, B, C, D) of (A, B, C, D, E, F));
impl_prefix_of!((A, B, C, D, E) of (A, B, C, D, E, F));
impl_prefix_of!((A, B, C, D, E, F) of (A, B, C, D, E, F));
