//! In-memory backend
//!
//! BTreeMap-based ordered store with versionstamped commits.
//!
//! ## Concurrency
//! - `state`: one `parking_lot::RwLock` over the map, the expiry index, the
//!   commit counter, the watcher list and the closed flag. Reads share it;
//!   every write takes it exclusively, so check-then-mutate is serialized
//!   against all other writes and against `close`.
//! - Watch snapshots are built and pushed while the write lock is held. The
//!   channels are unbounded, so pushing never blocks.
//!
//! ## Housekeeping
//! - Expired values are hidden from reads at once and removed from the map
//!   by the next write (or [`MemoryBackend::purge_expired`]).
//! - Watchers whose stream was dropped are forgotten on the next write or
//!   subscription.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use crossbeam::channel::{self, Sender};
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::atomic::{AtomicCheck, AtomicOperation, CommitResult, Mutation, MutationKind};
use crate::config::Config;
use crate::entry::Versionstamp;
use crate::error::{Result, TkvError};

use super::{duration_millis, Backend, Clock, RawEntry, RawSlot, ScanRequest, Subscription, SystemClock};

/// A value alongside its versionstamp and expiration time
#[derive(Debug, Clone)]
struct StoredValue {
    value: Bytes,
    versionstamp: Versionstamp,
    /// `None` means the value never expires
    expire_at: Option<u64>,
}

impl StoredValue {
    fn is_live(&self, now: u64) -> bool {
        self.expire_at.map_or(true, |ts| now < ts)
    }
}

struct Watcher {
    keys: Vec<Bytes>,
    sender: Sender<Vec<RawSlot>>,
    /// Dead once the subscriber drops its stream
    alive: Weak<()>,
}

impl Watcher {
    fn is_alive(&self) -> bool {
        self.alive.strong_count() > 0
    }
}

#[derive(Default)]
struct State {
    data: BTreeMap<Bytes, StoredValue>,
    /// `(expire_at, key)` for every stored value that expires
    expiries: BTreeSet<(u64, Bytes)>,
    /// Sequence number of the last commit
    last_commit: u64,
    watchers: Vec<Watcher>,
    closed: bool,
}

impl State {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(TkvError::BackendClosed);
        }
        Ok(())
    }

    fn live(&self, key: &[u8], now: u64) -> Option<&StoredValue> {
        self.data.get(key).filter(|stored| stored.is_live(now))
    }

    fn raw_entry(&self, key: &Bytes, now: u64) -> Option<RawEntry> {
        self.live(key, now).map(|stored| RawEntry {
            key: key.clone(),
            value: stored.value.clone(),
            versionstamp: stored.versionstamp,
        })
    }

    fn snapshot(&self, keys: &[Bytes], now: u64) -> Vec<RawSlot> {
        keys.iter()
            .map(|key| RawSlot {
                key: key.clone(),
                entry: self.raw_entry(key, now),
            })
            .collect()
    }

    fn checks_pass(&self, checks: &[AtomicCheck], now: u64) -> bool {
        checks.iter().all(|check| {
            let current = self.live(&check.key, now).map(|stored| stored.versionstamp);
            current == check.versionstamp
        })
    }

    fn insert(&mut self, key: Bytes, stored: StoredValue) {
        let expire_at = stored.expire_at;
        if let Some(old) = self.data.insert(key.clone(), stored) {
            self.forget_expiry(key.clone(), &old);
        }
        if let Some(ts) = expire_at {
            self.expiries.insert((ts, key));
        }
    }

    fn remove(&mut self, key: &Bytes) -> Option<StoredValue> {
        let old = self.data.remove(key)?;
        self.forget_expiry(key.clone(), &old);
        Some(old)
    }

    fn forget_expiry(&mut self, key: Bytes, old: &StoredValue) {
        if let Some(ts) = old.expire_at {
            self.expiries.remove(&(ts, key));
        }
    }

    /// Drop every value whose expiration time has passed
    fn evict_expired(&mut self, now: u64) -> usize {
        let mut evicted = 0;
        while let Some((ts, _)) = self.expiries.first() {
            if *ts > now {
                break;
            }
            if let Some((_, key)) = self.expiries.pop_first() {
                self.data.remove(&key);
                evicted += 1;
            }
        }
        evicted
    }

    fn prune_watchers(&mut self) {
        self.watchers.retain(Watcher::is_alive);
    }

    /// Apply mutations under a fresh versionstamp and notify watchers
    fn apply(&mut self, mutations: Vec<Mutation>, now: u64) -> Versionstamp {
        let evicted = self.evict_expired(now);
        if evicted > 0 {
            trace!(evicted, "expired entries evicted");
        }

        self.last_commit += 1;
        let versionstamp = Versionstamp::from_sequence(self.last_commit);

        let mut changed: Vec<Bytes> = Vec::with_capacity(mutations.len());
        for mutation in mutations {
            match mutation.kind {
                MutationKind::Set { value, expire_in } => {
                    let expire_at = expire_in.map(|d| now.saturating_add(duration_millis(d)));
                    self.insert(
                        mutation.key.clone(),
                        StoredValue {
                            value,
                            versionstamp,
                            expire_at,
                        },
                    );
                    changed.push(mutation.key);
                }
                MutationKind::Delete => {
                    if let Some(old) = self.remove(&mutation.key) {
                        if old.is_live(now) {
                            changed.push(mutation.key);
                        }
                    }
                }
            }
        }

        self.prune_watchers();
        if !changed.is_empty() {
            self.notify(&changed, now);
        }

        versionstamp
    }

    fn notify(&mut self, changed: &[Bytes], now: u64) {
        let mut watchers = std::mem::take(&mut self.watchers);
        watchers.retain(|watcher| {
            if !watcher.keys.iter().any(|key| changed.contains(key)) {
                return true;
            }
            // A failed send means the subscriber hung up
            watcher.sender.send(self.snapshot(&watcher.keys, now)).is_ok()
        });
        self.watchers = watchers;
    }
}

/// Ordered in-memory backend
///
/// Useful for tests and embedding; nothing is persisted. Supports
/// expiration through a configurable [`Clock`].
pub struct MemoryBackend {
    config: Config,
    clock: Arc<dyn Clock>,
    state: RwLock<State>,
}

impl MemoryBackend {
    /// Create a backend with default limits and the system clock
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            state: RwLock::new(State::default()),
        }
    }

    /// Replace the clock used for expiration
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Close the backend
    ///
    /// Every later operation fails with [`TkvError::BackendClosed`] and all
    /// open watch streams end. Operations already holding the lock finish
    /// first.
    pub fn close(&self) {
        let mut state = self.state.write();
        state.closed = true;
        let dropped = std::mem::take(&mut state.watchers);
        debug!(watchers = dropped.len(), "memory backend closed");
    }

    pub fn is_closed(&self) -> bool {
        self.state.read().closed
    }

    /// Number of live (present, unexpired) keys
    pub fn entry_count(&self) -> usize {
        let now = self.clock.now_millis();
        self.state
            .read()
            .data
            .values()
            .filter(|stored| stored.is_live(now))
            .count()
    }

    /// Number of values held in memory, including expired ones not yet
    /// evicted
    pub fn stored_count(&self) -> usize {
        self.state.read().data.len()
    }

    /// Number of registered watchers, including dropped ones not yet
    /// pruned
    pub fn watcher_count(&self) -> usize {
        self.state.read().watchers.len()
    }

    /// Remove every expired value now; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let evicted = self.state.write().evict_expired(now);
        debug!(evicted, "expired entries purged");
        evicted
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn check_key(&self, key: &[u8]) -> Result<()> {
        if key.len() > self.config.max_key_size {
            return Err(TkvError::KeyTooLarge {
                size: key.len(),
                max: self.config.max_key_size,
            });
        }
        Ok(())
    }

    fn check_operation(&self, op: &AtomicOperation) -> Result<()> {
        if op.checks.len() > self.config.max_checks {
            return Err(TkvError::TooManyChecks {
                count: op.checks.len(),
                max: self.config.max_checks,
            });
        }
        if op.mutations.len() > self.config.max_mutations {
            return Err(TkvError::TooManyMutations {
                count: op.mutations.len(),
                max: self.config.max_mutations,
            });
        }
        for check in &op.checks {
            self.check_key(&check.key)?;
        }
        for mutation in &op.mutations {
            self.check_key(&mutation.key)?;
            if let MutationKind::Set { value, .. } = &mutation.kind {
                if value.len() > self.config.max_value_size {
                    return Err(TkvError::ValueTooLarge {
                        size: value.len(),
                        max: self.config.max_value_size,
                    });
                }
            }
        }
        Ok(())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MemoryBackend {
    fn get(&self, key: &[u8]) -> Result<Option<RawEntry>> {
        let now = self.clock.now_millis();
        let state = self.state.read();
        state.ensure_open()?;
        Ok(state.live(key, now).map(|stored| RawEntry {
            key: Bytes::copy_from_slice(key),
            value: stored.value.clone(),
            versionstamp: stored.versionstamp,
        }))
    }

    fn set(&self, key: Bytes, value: Bytes, expire_in: Option<Duration>) -> Result<Versionstamp> {
        let op = AtomicOperation::new().set(key, value, expire_in);
        self.check_operation(&op)?;

        let now = self.clock.now_millis();
        let mut state = self.state.write();
        state.ensure_open()?;
        let versionstamp = state.apply(op.mutations, now);
        debug!(%versionstamp, "set committed");
        Ok(versionstamp)
    }

    fn delete(&self, key: Bytes) -> Result<()> {
        let op = AtomicOperation::new().delete(key);
        self.check_operation(&op)?;

        let now = self.clock.now_millis();
        let mut state = self.state.write();
        state.ensure_open()?;
        let versionstamp = state.apply(op.mutations, now);
        debug!(%versionstamp, "delete committed");
        Ok(())
    }

    fn commit(&self, op: AtomicOperation) -> Result<CommitResult> {
        self.check_operation(&op)?;

        let now = self.clock.now_millis();
        let mut state = self.state.write();
        state.ensure_open()?;

        if !state.checks_pass(&op.checks, now) {
            debug!(checks = op.checks.len(), "atomic commit rejected: check failed");
            return Ok(CommitResult::CheckFailed);
        }

        let mutations = op.mutations.len();
        let versionstamp = state.apply(op.mutations, now);
        debug!(%versionstamp, checks = op.checks.len(), mutations, "atomic commit applied");
        Ok(CommitResult::Committed { versionstamp })
    }

    fn scan(&self, request: &ScanRequest) -> Result<Vec<RawEntry>> {
        let mut lower: &[u8] = &request.start;
        let mut lower_inclusive = true;
        let mut upper: &[u8] = &request.end;

        if let Some(after) = request.after.as_deref() {
            if request.reverse {
                if after < upper {
                    upper = after;
                }
            } else if after >= lower {
                lower = after;
                lower_inclusive = false;
            }
        }

        let now = self.clock.now_millis();
        let state = self.state.read();
        state.ensure_open()?;

        if request.limit == 0 || lower >= upper {
            return Ok(Vec::new());
        }

        let lower_bound = if lower_inclusive {
            Bound::Included(lower)
        } else {
            Bound::Excluded(lower)
        };

        let range = state
            .data
            .range::<[u8], _>((lower_bound, Bound::Excluded(upper)));

        let entries = if request.reverse {
            collect_live(range.rev(), now, request.limit)
        } else {
            collect_live(range, now, request.limit)
        };

        trace!(
            entries = entries.len(),
            limit = request.limit,
            reverse = request.reverse,
            "scan page"
        );
        Ok(entries)
    }

    fn subscribe(&self, keys: Vec<Bytes>) -> Result<Subscription> {
        for key in &keys {
            self.check_key(key)?;
        }

        let (sender, receiver) = channel::unbounded();
        let (subscription, alive) = Subscription::new(receiver);
        let now = self.clock.now_millis();
        let mut state = self.state.write();
        state.ensure_open()?;
        state.prune_watchers();

        // The receiver is still in hand, so this cannot fail
        let _ = sender.send(state.snapshot(&keys, now));

        debug!(keys = keys.len(), watchers = state.watchers.len() + 1, "watch subscribed");
        state.watchers.push(Watcher { keys, sender, alive });
        Ok(subscription)
    }
}

fn collect_live<'a>(
    iter: impl Iterator<Item = (&'a Bytes, &'a StoredValue)>,
    now: u64,
    limit: usize,
) -> Vec<RawEntry> {
    iter.filter(|(_, stored)| stored.is_live(now))
        .take(limit)
        .map(|(key, stored)| RawEntry {
            key: key.clone(),
            value: stored.value.clone(),
            versionstamp: stored.versionstamp,
        })
        .collect()
}
