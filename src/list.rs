//! Range Iteration
//!
//! Resolves a [`ListSelector`] into a byte range and walks it lazily, one
//! backend page at a time.
//!
//! ## Selector Resolution
//! ```text
//! prefix(p)            [enc(p), enc(p) ++ 0xFF)
//! prefix_start(p, s)   [enc(s), enc(p) ++ 0xFF)
//! prefix_end(p, e)     [enc(p), enc(e))
//! range(s, e)          [enc(s), enc(e))
//! ```
//! Bounds given alongside a prefix must lie within that prefix; this is not
//! checked.

use std::collections::VecDeque;
use std::fmt;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::backend::{Backend, RawEntry, ScanRequest};
use crate::entry::{decode_entry, Entry};
use crate::error::{Result, TkvError};
use crate::key::codec::prefix_end;
use crate::key::{Key, PrefixOf};

/// A contiguous range of keys of shape `K`
///
/// Built through the constructors, which only accept valid prefixes of `K`.
#[derive(Debug, Clone, PartialEq)]
pub struct ListSelector<K> {
    bounds: SelectorBounds<K>,
}

#[derive(Debug, Clone, PartialEq)]
enum SelectorBounds<K> {
    Prefix(Bytes),
    PrefixStart(Bytes, K),
    PrefixEnd(Bytes, K),
    Range(K, K),
}

impl<K: Key> ListSelector<K> {
    /// All keys starting with `prefix`
    pub fn prefix<P: PrefixOf<K>>(prefix: P) -> Self {
        Self {
            bounds: SelectorBounds::Prefix(prefix.encode()),
        }
    }

    /// Keys starting with `prefix`, from `start` (inclusive)
    pub fn prefix_start<P: PrefixOf<K>>(prefix: P, start: K) -> Self {
        Self {
            bounds: SelectorBounds::PrefixStart(prefix.encode(), start),
        }
    }

    /// Keys starting with `prefix`, up to `end` (exclusive)
    pub fn prefix_end<P: PrefixOf<K>>(prefix: P, end: K) -> Self {
        Self {
            bounds: SelectorBounds::PrefixEnd(prefix.encode(), end),
        }
    }

    /// Keys in `[start, end)`
    pub fn range(start: K, end: K) -> Self {
        Self {
            bounds: SelectorBounds::Range(start, end),
        }
    }
}

/// Half-open byte range `[start, end)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub start: Bytes,
    pub end: Bytes,
}

/// Resolve a selector into the byte range it covers
pub fn resolve_selector<K: Key>(selector: &ListSelector<K>) -> KeyRange {
    match &selector.bounds {
        SelectorBounds::Prefix(prefix) => KeyRange {
            start: prefix.clone(),
            end: prefix_end(prefix),
        },
        SelectorBounds::PrefixStart(prefix, start) => KeyRange {
            start: start.encode(),
            end: prefix_end(prefix),
        },
        SelectorBounds::PrefixEnd(prefix, end) => KeyRange {
            start: prefix.clone(),
            end: end.encode(),
        },
        SelectorBounds::Range(start, end) => KeyRange {
            start: start.encode(),
            end: end.encode(),
        },
    }
}

/// Opaque position inside a listing
///
/// Renders as URL-safe base64 so it can be handed to clients and parsed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListCursor(Bytes);

impl ListCursor {
    pub(crate) fn from_key(key: Bytes) -> Self {
        Self(key)
    }

    pub(crate) fn into_key(self) -> Bytes {
        self.0
    }
}

impl fmt::Display for ListCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&URL_SAFE_NO_PAD.encode(&self.0))
    }
}

impl FromStr for ListCursor {
    type Err = TkvError;

    fn from_str(s: &str) -> Result<Self> {
        let raw = URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|e| TkvError::InvalidCursor(e.to_string()))?;
        Ok(Self(Bytes::from(raw)))
    }
}

/// Options for [`crate::Tkv::list_with`]
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Stop after this many entries
    pub limit: Option<usize>,

    /// Yield entries in descending key order
    pub reverse: bool,

    /// Entries fetched per backend page (store default when `None`)
    pub batch_size: Option<usize>,

    /// Resume after the position returned by [`ListIter::cursor`]
    pub cursor: Option<ListCursor>,
}

/// Lazy, forward-only iterator over the entries of a range
///
/// Pages are fetched on demand; the whole range is never buffered. Once an
/// error has been yielded the iterator is finished.
pub struct ListIter<K, V, B: ?Sized> {
    backend: Arc<B>,
    range: KeyRange,
    reverse: bool,
    batch_size: usize,
    remaining: Option<usize>,
    buffer: VecDeque<RawEntry>,
    last_key: Option<Bytes>,
    exhausted: bool,
    done: bool,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V, B> ListIter<K, V, B>
where
    K: Key,
    V: DeserializeOwned,
    B: Backend + ?Sized,
{
    pub(crate) fn new(backend: Arc<B>, range: KeyRange, options: ListOptions, default_batch: usize) -> Self {
        Self {
            backend,
            range,
            reverse: options.reverse,
            batch_size: options.batch_size.unwrap_or(default_batch).max(1),
            remaining: options.limit,
            buffer: VecDeque::new(),
            last_key: options.cursor.map(ListCursor::into_key),
            exhausted: false,
            done: false,
            _marker: PhantomData,
        }
    }

    /// Position after the last yielded entry
    ///
    /// `None` until an entry has been yielded (or a cursor was supplied).
    pub fn cursor(&self) -> Option<ListCursor> {
        self.last_key.clone().map(ListCursor::from_key)
    }

    /// Fetch the next page into the buffer
    fn fetch_page(&mut self) -> Result<()> {
        let limit = match self.remaining {
            Some(remaining) => remaining.min(self.batch_size),
            None => self.batch_size,
        };

        let request = ScanRequest {
            start: self.range.start.clone(),
            end: self.range.end.clone(),
            after: self.last_key.clone(),
            reverse: self.reverse,
            limit,
        };

        let page = self.backend.scan(&request)?;
        trace!(fetched = page.len(), limit, "list page fetched");

        if page.len() < limit {
            self.exhausted = true;
        }
        self.buffer.extend(page);
        Ok(())
    }
}

impl<K, V, B> Iterator for ListIter<K, V, B>
where
    K: Key,
    V: DeserializeOwned,
    B: Backend + ?Sized,
{
    type Item = Result<Entry<K, V>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining == Some(0) {
            self.done = true;
            return None;
        }

        if self.buffer.is_empty() {
            if self.exhausted {
                self.done = true;
                return None;
            }
            if let Err(e) = self.fetch_page() {
                self.done = true;
                return Some(Err(e));
            }
        }

        let Some(raw) = self.buffer.pop_front() else {
            self.done = true;
            return None;
        };

        self.last_key = Some(raw.key.clone());
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }

        let decoded = decode_entry(&raw);
        if decoded.is_err() {
            self.done = true;
        }
        Some(decoded)
    }
}

impl<K, V, B> FusedIterator for ListIter<K, V, B>
where
    K: Key,
    V: DeserializeOwned,
    B: Backend + ?Sized,
{
}
