//! Change Notification
//!
//! Typed view over a backend subscription. Each item is a snapshot of every
//! watched key, in the order the keys were passed to [`crate::Tkv::watch`].

use std::marker::PhantomData;
use std::time::Duration;

use crossbeam::channel::{RecvTimeoutError, TryRecvError};
use serde::de::DeserializeOwned;

use crate::backend::{RawSlot, Subscription};
use crate::entry::{entry_maybe, EntryMaybe};
use crate::error::{Result, TkvError};
use crate::key::Key;

/// Current state of all watched keys
pub type WatchSnapshot<K, V> = Vec<EntryMaybe<K, V>>;

/// Long-lived stream of watch snapshots
///
/// The first snapshot reflects the state at subscription time. The stream
/// ends when the backend closes or goes away. Dropping (or closing) the
/// stream unregisters it from the backend.
pub struct WatchStream<K, V> {
    subscription: Subscription,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> WatchStream<K, V>
where
    K: Key,
    V: DeserializeOwned,
{
    pub(crate) fn new(subscription: Subscription) -> Self {
        Self {
            subscription,
            _marker: PhantomData,
        }
    }

    /// Next snapshot if one is already waiting
    ///
    /// `Ok(None)` means nothing is pending; [`TkvError::WatchClosed`] means
    /// nothing ever will be.
    pub fn try_next(&mut self) -> Result<Option<WatchSnapshot<K, V>>> {
        match self.subscription.receiver().try_recv() {
            Ok(slots) => decode_snapshot(slots).map(Some),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TkvError::WatchClosed),
        }
    }

    /// Wait up to `timeout` for the next snapshot
    ///
    /// `Ok(None)` on timeout, [`TkvError::WatchClosed`] once the stream has
    /// ended.
    pub fn next_timeout(&mut self, timeout: Duration) -> Result<Option<WatchSnapshot<K, V>>> {
        match self.subscription.receiver().recv_timeout(timeout) {
            Ok(slots) => decode_snapshot(slots).map(Some),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TkvError::WatchClosed),
        }
    }

    /// Stop watching
    pub fn close(self) {}
}

impl<K, V> Iterator for WatchStream<K, V>
where
    K: Key,
    V: DeserializeOwned,
{
    type Item = Result<WatchSnapshot<K, V>>;

    /// Blocks until the next snapshot; `None` once the backend has closed.
    fn next(&mut self) -> Option<Self::Item> {
        self.subscription.receiver().recv().ok().map(decode_snapshot)
    }
}

fn decode_snapshot<K: Key, V: DeserializeOwned>(slots: Vec<RawSlot>) -> Result<WatchSnapshot<K, V>> {
    slots
        .iter()
        .map(|slot| entry_maybe(K::decode(&slot.key)?, slot.entry.as_ref()))
        .collect()
}
