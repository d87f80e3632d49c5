//! Typed store
//!
//! [`Tkv`] fixes a key shape `K` and a value type `V` over a shared backend
//! handle and exposes the typed operations.
//!
//! ## Concurrency Model
//! - Every call is one fresh backend round trip; nothing is cached.
//! - `atomic_set` / `atomic_delete` are the only race-safe writes: the
//!   versionstamp check and the mutation commit as one backend step.
//! - `atomic_update` reads, runs the updater, then commits with the
//!   versionstamp it read. No lock is held in between; a concurrent write in
//!   that window makes the commit fail with [`CommitResult::CheckFailed`].

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::atomic::{AtomicOperation, CommitResult};
use crate::backend::{Backend, MemoryBackend};
use crate::config::Config;
use crate::entry::{encode_value, entry_maybe, EntryMaybe, Versionstamp};
use crate::error::Result;
use crate::key::Key;
use crate::list::{resolve_selector, ListIter, ListOptions, ListSelector};
use crate::watch::WatchStream;

/// Options for writes that store a value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Remove the value once this much time has passed
    pub expire_in: Option<Duration>,
}

impl SetOptions {
    pub fn expire_in(duration: Duration) -> Self {
        Self {
            expire_in: Some(duration),
        }
    }
}

/// Typed handle over an ordered key-value backend
///
/// `K` is the key shape, for example `(UsersByEmail, String)`; `V` is the
/// type of the values stored at those keys. Cloning is cheap and clones
/// share the backend.
pub struct Tkv<K, V, B: ?Sized = MemoryBackend> {
    backend: Arc<B>,
    list_batch_size: usize,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V, B: ?Sized> Clone for Tkv<K, V, B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            list_batch_size: self.list_batch_size,
            _marker: PhantomData,
        }
    }
}

impl<K, V, B> Tkv<K, V, B>
where
    K: Key,
    V: Serialize + DeserializeOwned,
    B: Backend + ?Sized,
{
    /// Create a store over `backend` with default settings
    pub fn new(backend: Arc<B>) -> Self {
        Self::with_config(backend, &Config::default())
    }

    pub fn with_config(backend: Arc<B>, config: &Config) -> Self {
        Self {
            backend,
            list_batch_size: config.list_batch_size.max(1),
            _marker: PhantomData,
        }
    }

    /// The shared backend handle
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    // =========================================================================
    // Basic Access
    // =========================================================================

    /// Current value and versionstamp of `key`, or the absent form
    pub fn get(&self, key: &K) -> Result<EntryMaybe<K, V>> {
        let raw = self.backend.get(&key.encode())?;
        entry_maybe(key.clone(), raw.as_ref())
    }

    /// Unconditional write
    pub fn set(&self, key: &K, value: &V) -> Result<Versionstamp> {
        self.set_with(key, value, SetOptions::default())
    }

    pub fn set_with(&self, key: &K, value: &V, options: SetOptions) -> Result<Versionstamp> {
        self.backend
            .set(key.encode(), encode_value(value)?, options.expire_in)
    }

    /// Unconditional delete; deleting an absent key is a no-op
    pub fn delete(&self, key: &K) -> Result<()> {
        self.backend.delete(key.encode())
    }

    // =========================================================================
    // Atomic (CAS) Operations
    // =========================================================================

    /// Set `key` iff its stored versionstamp equals `expected`
    ///
    /// `expected = None` requires the key to be absent.
    pub fn atomic_set(&self, key: &K, expected: Option<Versionstamp>, value: &V) -> Result<CommitResult> {
        self.atomic_set_with(key, expected, value, SetOptions::default())
    }

    pub fn atomic_set_with(
        &self,
        key: &K,
        expected: Option<Versionstamp>,
        value: &V,
        options: SetOptions,
    ) -> Result<CommitResult> {
        let raw_key = key.encode();
        let op = AtomicOperation::new()
            .check(raw_key.clone(), expected)
            .set(raw_key, encode_value(value)?, options.expire_in);
        self.backend.commit(op)
    }

    /// Delete `key` iff its stored versionstamp equals `expected`
    pub fn atomic_delete(&self, key: &K, expected: Option<Versionstamp>) -> Result<CommitResult> {
        let raw_key = key.encode();
        let op = AtomicOperation::new()
            .check(raw_key.clone(), expected)
            .delete(raw_key);
        self.backend.commit(op)
    }

    // =========================================================================
    // Read-Modify-Write
    // =========================================================================

    /// Read `key`, transform its value, and commit the result atomically
    ///
    /// The updater receives the current value (`None` if absent). Returning
    /// `Some` sets the new value, returning `None` deletes the key. The
    /// commit is checked against the versionstamp that was read, so a
    /// concurrent write yields [`CommitResult::CheckFailed`]. There is no
    /// retry; see [`Tkv::atomic_update_retrying`].
    pub fn atomic_update<F>(&self, key: &K, updater: F) -> Result<CommitResult>
    where
        F: FnOnce(Option<V>) -> Option<V>,
    {
        let current = self.get(key)?;
        let versionstamp = current.versionstamp();

        match updater(current.into_value()) {
            Some(value) => self.atomic_set(key, versionstamp, &value),
            None => self.atomic_delete(key, versionstamp),
        }
    }

    /// [`Tkv::atomic_update`] that retries on conflict
    ///
    /// Reruns the whole read-update-commit cycle until it commits or
    /// `max_attempts` commits have been rejected, in which case the last
    /// [`CommitResult::CheckFailed`] is returned. The updater may run once
    /// per attempt. Backend errors end the loop immediately.
    pub fn atomic_update_retrying<F>(&self, key: &K, max_attempts: usize, mut updater: F) -> Result<CommitResult>
    where
        F: FnMut(Option<V>) -> Option<V>,
    {
        let max_attempts = max_attempts.max(1);
        let mut result = CommitResult::CheckFailed;

        for attempt in 1..=max_attempts {
            result = self.atomic_update(key, &mut updater)?;
            if result.is_ok() {
                break;
            }
            debug!(attempt, max_attempts, "atomic update conflicted");
        }

        Ok(result)
    }

    // =========================================================================
    // Range Iteration
    // =========================================================================

    /// Iterate over the entries selected by `selector`, in ascending order
    pub fn list(&self, selector: ListSelector<K>) -> ListIter<K, V, B> {
        self.list_with(selector, ListOptions::default())
    }

    pub fn list_with(&self, selector: ListSelector<K>, options: ListOptions) -> ListIter<K, V, B> {
        let range = resolve_selector(&selector);
        ListIter::new(Arc::clone(&self.backend), range, options, self.list_batch_size)
    }

    // =========================================================================
    // Change Notification
    // =========================================================================

    /// Subscribe to changes of `keys`
    pub fn watch(&self, keys: &[K]) -> Result<WatchStream<K, V>> {
        let raw_keys = keys.iter().map(K::encode).collect();
        let subscription = self.backend.subscribe(raw_keys)?;
        Ok(WatchStream::new(subscription))
    }
}
