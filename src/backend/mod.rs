//! Backend Module
//!
//! The ordered key-value engine the typed layer runs on.
//!
//! ## Responsibilities
//! - Point reads and unconditional writes on raw byte keys
//! - Indivisible check-and-mutate commits keyed by versionstamp
//! - Ordered range scans, resumable from a cursor key
//! - Push subscriptions delivering snapshots of watched keys
//!
//! The typed layer never retries or wraps backend errors; whatever a backend
//! returns reaches the caller unchanged.

mod clock;
mod memory;

pub use clock::{Clock, ManualClock, SystemClock};
pub(crate) use clock::duration_millis;
pub use memory::MemoryBackend;

use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use crossbeam::channel::Receiver;

use crate::atomic::{AtomicOperation, CommitResult};
use crate::entry::Versionstamp;
use crate::error::Result;

/// A present key as stored by the backend
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntry {
    pub key: Bytes,
    pub value: Bytes,
    pub versionstamp: Versionstamp,
}

/// One watched key inside a subscription snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct RawSlot {
    pub key: Bytes,
    pub entry: Option<RawEntry>,
}

/// Receiving end of a backend subscription
///
/// Holds the only strong reference to a liveness token; the backend keeps a
/// [`Weak`] to it and forgets the subscription once this is dropped.
#[derive(Debug)]
pub struct Subscription {
    receiver: Receiver<Vec<RawSlot>>,
    _alive: Arc<()>,
}

impl Subscription {
    /// Wrap `receiver`, returning the handle the backend should keep
    pub fn new(receiver: Receiver<Vec<RawSlot>>) -> (Self, Weak<()>) {
        let alive = Arc::new(());
        let handle = Arc::downgrade(&alive);
        (
            Self {
                receiver,
                _alive: alive,
            },
            handle,
        )
    }

    pub fn receiver(&self) -> &Receiver<Vec<RawSlot>> {
        &self.receiver
    }
}

/// A single page request against the ordered keyspace
///
/// Covers `[start, end)`. `after` is the last key already seen: the page
/// resumes strictly past it in scan direction (above it when scanning
/// forward, below it when `reverse` is set).
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    pub start: Bytes,
    pub end: Bytes,
    pub after: Option<Bytes>,
    pub reverse: bool,
    pub limit: usize,
}

/// An ordered key-value engine with versionstamped writes
pub trait Backend: Send + Sync {
    /// Current entry for `key`, or `None` if absent
    fn get(&self, key: &[u8]) -> Result<Option<RawEntry>>;

    /// Unconditional write
    fn set(&self, key: Bytes, value: Bytes, expire_in: Option<Duration>) -> Result<Versionstamp>;

    /// Unconditional delete; deleting an absent key succeeds
    fn delete(&self, key: Bytes) -> Result<()>;

    /// Evaluate all checks and apply all mutations as one step
    fn commit(&self, op: AtomicOperation) -> Result<CommitResult>;

    /// Up to `limit` present entries of the requested range, in scan order
    fn scan(&self, request: &ScanRequest) -> Result<Vec<RawEntry>>;

    /// Subscribe to `keys`
    ///
    /// The receiver gets the current snapshot immediately, then a new
    /// snapshot of all keys (in input order) after each write that changes
    /// any of them. Expiration is not a write: a watched key whose value
    /// expires is reported absent in the next snapshot caused by a write,
    /// but its expiry alone sends nothing. The receiver disconnects when
    /// the backend closes.
    fn subscribe(&self, keys: Vec<Bytes>) -> Result<Subscription>;
}
