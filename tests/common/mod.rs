//! Shared helpers for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing_subscriber::EnvFilter;

use typedkv::backend::{Backend, RawEntry, ScanRequest, Subscription};
use typedkv::{AtomicOperation, CommitResult, MemoryBackend, TkvError, Versionstamp};

/// Install a test log subscriber (`RUST_LOG=typedkv=debug` to see output)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn memory_backend() -> Arc<MemoryBackend> {
    init_tracing();
    Arc::new(MemoryBackend::new())
}

/// Backend wrapper that counts scan round trips and can be told to fail
pub struct CountingBackend {
    inner: MemoryBackend,
    scans: AtomicUsize,
    fail_scans_after: AtomicUsize,
}

impl CountingBackend {
    pub fn new() -> Self {
        init_tracing();
        Self {
            inner: MemoryBackend::new(),
            scans: AtomicUsize::new(0),
            fail_scans_after: AtomicUsize::new(usize::MAX),
        }
    }

    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    /// Let `count` more scans through, then fail every scan
    pub fn fail_scans_after(&self, count: usize) {
        let done = self.scan_count();
        self.fail_scans_after.store(done + count, Ordering::SeqCst);
    }

    pub fn close(&self) {
        self.inner.close();
    }
}

impl Backend for CountingBackend {
    fn get(&self, key: &[u8]) -> typedkv::Result<Option<RawEntry>> {
        self.inner.get(key)
    }

    fn set(&self, key: Bytes, value: Bytes, expire_in: Option<Duration>) -> typedkv::Result<Versionstamp> {
        self.inner.set(key, value, expire_in)
    }

    fn delete(&self, key: Bytes) -> typedkv::Result<()> {
        self.inner.delete(key)
    }

    fn commit(&self, op: AtomicOperation) -> typedkv::Result<CommitResult> {
        self.inner.commit(op)
    }

    fn scan(&self, request: &ScanRequest) -> typedkv::Result<Vec<RawEntry>> {
        let n = self.scans.fetch_add(1, Ordering::SeqCst);
        if n >= self.fail_scans_after.load(Ordering::SeqCst) {
            return Err(TkvError::BackendClosed);
        }
        self.inner.scan(request)
    }

    fn subscribe(&self, keys: Vec<Bytes>) -> typedkv::Result<Subscription> {
        self.inner.subscribe(keys)
    }
}
