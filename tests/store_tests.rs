//! Tests for the typed store
//!
//! These tests verify:
//! - Basic get/set/delete and the absent-entry form
//! - Compare-and-swap semantics of atomic_set / atomic_delete
//! - Read-modify-write via atomic_update, with and without retry
//! - Expiration of values
//! - Backend failures reaching the caller unchanged

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use typedkv::backend::{Backend, ManualClock};
use typedkv::{
    key_literal, CommitResult, Config, Entry, EntryMaybe, ListSelector, MemoryBackend, SetOptions, Tkv,
    TkvError,
};

use common::memory_backend;

key_literal!(Foo = "foo");
key_literal!(Bar = "bar");
key_literal!(Counters = "counters");

type FooKey = (Foo, String);
type BarKey = (Bar, String);

fn foo(id: &str) -> FooKey {
    (Foo, id.to_string())
}

fn bar(id: &str) -> BarKey {
    (Bar, id.to_string())
}

fn s(value: &str) -> String {
    value.to_string()
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_get_never_written_key_is_absent() {
    let store: Tkv<FooKey, String> = Tkv::new(memory_backend());

    let entry = store.get(&foo("missing")).unwrap();

    assert_eq!(entry, EntryMaybe::Absent { key: foo("missing") });
    assert_eq!(entry.value(), None);
    assert_eq!(entry.versionstamp(), None);
}

#[test]
fn test_set_then_get_returns_value_and_versionstamp() {
    let store: Tkv<FooKey, String> = Tkv::new(memory_backend());

    let versionstamp = store.set(&foo("a"), &s("asd")).unwrap();
    let entry = store.get(&foo("a")).unwrap();

    assert_eq!(
        entry,
        EntryMaybe::Present(Entry {
            key: foo("a"),
            value: s("asd"),
            versionstamp,
        })
    );
}

#[test]
fn test_set_overwrite_bumps_versionstamp() {
    let store: Tkv<FooKey, String> = Tkv::new(memory_backend());

    let first = store.set(&foo("a"), &s("one")).unwrap();
    let second = store.set(&foo("a"), &s("two")).unwrap();

    assert!(second > first);
    assert_eq!(store.get(&foo("a")).unwrap().into_value(), Some(s("two")));
}

#[test]
fn test_delete_nonexistent_key() {
    let store: Tkv<FooKey, String> = Tkv::new(memory_backend());

    // Should not error
    store.delete(&foo("nonexistent")).unwrap();
    assert!(!store.get(&foo("nonexistent")).unwrap().is_present());
}

#[test]
fn test_set_list_delete_scenario() {
    let store: Tkv<FooKey, String> = Tkv::new(memory_backend());

    let vs_a = store.set(&foo("a"), &s("asd")).unwrap();
    let vs_b = store.set(&foo("b"), &s("qwe")).unwrap();

    let entries: Vec<_> = store
        .list(ListSelector::prefix((Foo,)))
        .collect::<typedkv::Result<_>>()
        .unwrap();
    assert_eq!(
        entries,
        vec![
            Entry { key: foo("a"), value: s("asd"), versionstamp: vs_a },
            Entry { key: foo("b"), value: s("qwe"), versionstamp: vs_b },
        ]
    );

    store.delete(&foo("a")).unwrap();
    assert_eq!(store.get(&foo("a")).unwrap(), EntryMaybe::Absent { key: foo("a") });

    let entries: Vec<_> = store
        .list(ListSelector::prefix((Foo,)))
        .collect::<typedkv::Result<_>>()
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].key, foo("b"));
}

#[test]
fn test_structured_values() {
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct User {
        name: String,
        age: u32,
        tags: Vec<String>,
    }

    key_literal!(Users = "usersByEmail");
    let store: Tkv<(Users, String), User> = Tkv::new(memory_backend());

    let ada = User {
        name: s("Ada"),
        age: 36,
        tags: vec![s("admin")],
    };
    store.set(&(Users, s("ada@example.com")), &ada).unwrap();

    let loaded = store.get(&(Users, s("ada@example.com"))).unwrap();
    assert_eq!(loaded.into_value(), Some(ada));
}

#[test]
fn test_stores_share_one_backend() {
    let backend = memory_backend();
    let foos: Tkv<FooKey, String> = Tkv::new(Arc::clone(&backend));
    let bars: Tkv<BarKey, u64> = Tkv::new(Arc::clone(&backend));

    foos.set(&foo("x"), &s("text")).unwrap();
    bars.set(&bar("x"), &7).unwrap();

    assert_eq!(foos.get(&foo("x")).unwrap().into_value(), Some(s("text")));
    assert_eq!(bars.get(&bar("x")).unwrap().into_value(), Some(7));
    assert_eq!(backend.entry_count(), 2);
}

#[test]
fn test_store_over_trait_object() {
    let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
    let store: Tkv<FooKey, String, dyn Backend> = Tkv::new(backend);

    let vs = store.set(&foo("a"), &s("asd")).unwrap();
    assert_eq!(store.get(&foo("a")).unwrap().versionstamp(), Some(vs));
}

// =============================================================================
// Atomic (CAS) Tests
// =============================================================================

#[test]
fn test_atomic_set_requires_absence_with_none() {
    let store: Tkv<BarKey, String> = Tkv::new(memory_backend());

    let created = store.atomic_set(&bar("a"), None, &s("asd")).unwrap();
    assert!(created.is_ok());
    let entry = store.get(&bar("a")).unwrap();
    assert_eq!(entry.versionstamp(), created.versionstamp());
    assert_eq!(entry.into_value(), Some(s("asd")));

    let again = store.atomic_set(&bar("a"), None, &s("asdf")).unwrap();
    assert_eq!(again, CommitResult::CheckFailed);
    assert_eq!(store.get(&bar("a")).unwrap().into_value(), Some(s("asd")));
}

#[test]
fn test_atomic_set_with_foreign_versionstamp_fails() {
    let store: Tkv<BarKey, String> = Tkv::new(memory_backend());

    let a = store.atomic_set(&bar("a"), None, &s("asd")).unwrap();
    let wrong = store.atomic_set(&bar("b"), a.versionstamp(), &s("qwe")).unwrap();

    assert!(!wrong.is_ok());
    assert!(!store.get(&bar("b")).unwrap().is_present());
}

#[test]
fn test_atomic_set_with_stale_versionstamp_fails() {
    let store: Tkv<BarKey, String> = Tkv::new(memory_backend());

    let first = store.atomic_set(&bar("a"), None, &s("asd")).unwrap();
    let second = store.atomic_set(&bar("a"), first.versionstamp(), &s("asdf")).unwrap();
    assert!(second.is_ok());
    assert_eq!(store.get(&bar("a")).unwrap().versionstamp(), second.versionstamp());

    let stale = store.atomic_set(&bar("a"), first.versionstamp(), &s("asdfg")).unwrap();
    assert_eq!(stale, CommitResult::CheckFailed);
    assert_eq!(store.get(&bar("a")).unwrap().into_value(), Some(s("asdf")));
}

#[test]
fn test_atomic_set_after_unconditional_write_fails() {
    let store: Tkv<BarKey, String> = Tkv::new(memory_backend());

    let vs = store.set(&bar("a"), &s("one")).unwrap();
    store.set(&bar("a"), &s("two")).unwrap();

    assert!(!store.atomic_set(&bar("a"), Some(vs), &s("three")).unwrap().is_ok());
}

#[test]
fn test_atomic_delete_then_repeat_fails() {
    let store: Tkv<BarKey, String> = Tkv::new(memory_backend());

    let created = store.atomic_set(&bar("b"), None, &s("qwe")).unwrap();

    let deleted = store.atomic_delete(&bar("b"), created.versionstamp()).unwrap();
    assert!(deleted.is_ok());
    assert!(deleted.versionstamp().is_some());
    assert_eq!(store.get(&bar("b")).unwrap(), EntryMaybe::Absent { key: bar("b") });

    let repeat = store.atomic_delete(&bar("b"), created.versionstamp()).unwrap();
    assert_eq!(repeat, CommitResult::CheckFailed);
}

#[test]
fn test_atomic_delete_absent_key_with_none_succeeds() {
    let store: Tkv<BarKey, String> = Tkv::new(memory_backend());

    let result = store.atomic_delete(&bar("ghost"), None).unwrap();
    assert!(result.is_ok());
}

#[test]
fn test_atomic_scenario_leaves_expected_listing() {
    let store: Tkv<BarKey, String> = Tkv::new(memory_backend());

    let a1 = store.atomic_set(&bar("a"), None, &s("asd")).unwrap();
    let b1 = store.atomic_set(&bar("b"), None, &s("qwe")).unwrap();
    let a2 = store.atomic_set(&bar("a"), a1.versionstamp(), &s("asdf")).unwrap();

    let listed: Vec<_> = store
        .list(ListSelector::prefix((Bar,)))
        .map(|entry| entry.map(|e| (e.key.1, e.value, e.versionstamp)))
        .collect::<typedkv::Result<_>>()
        .unwrap();
    assert_eq!(
        listed,
        vec![
            (s("a"), s("asdf"), a2.versionstamp().unwrap()),
            (s("b"), s("qwe"), b1.versionstamp().unwrap()),
        ]
    );

    assert!(store.atomic_delete(&bar("b"), b1.versionstamp()).unwrap().is_ok());
    assert!(!store.atomic_delete(&bar("a"), a1.versionstamp()).unwrap().is_ok());
    assert!(store.atomic_delete(&bar("a"), a2.versionstamp()).unwrap().is_ok());

    assert_eq!(store.list(ListSelector::prefix((Bar,))).count(), 0);
}

// =============================================================================
// Read-Modify-Write Tests
// =============================================================================

#[test]
fn test_atomic_update_creates_then_deletes() {
    let store: Tkv<BarKey, String> = Tkv::new(memory_backend());

    let created = store
        .atomic_update(&bar("c"), |current| {
            assert_eq!(current, None);
            Some(s("a"))
        })
        .unwrap();
    assert!(created.is_ok());
    assert_eq!(store.get(&bar("c")).unwrap().into_value(), Some(s("a")));

    let removed = store
        .atomic_update(&bar("c"), |current| {
            assert_eq!(current, Some(s("a")));
            None
        })
        .unwrap();
    assert!(removed.is_ok());
    assert!(!store.get(&bar("c")).unwrap().is_present());
}

#[test]
fn test_atomic_update_matches_manual_cas() {
    let backend = memory_backend();
    let store: Tkv<(Counters, String), i64> = Tkv::new(backend);
    let key = (Counters, s("hits"));

    store.set(&key, &41).unwrap();
    let result = store.atomic_update(&key, |v| v.map(|n| n + 1)).unwrap();

    let entry = store.get(&key).unwrap();
    assert_eq!(entry.value(), Some(&42));
    assert_eq!(entry.versionstamp(), result.versionstamp());
}

#[test]
fn test_atomic_update_loses_race_without_retry() {
    let store: Tkv<(Counters, String), i64> = Tkv::new(memory_backend());
    let key = (Counters, s("hits"));
    store.set(&key, &1).unwrap();

    // A competing writer lands between the read and the commit
    let rival = store.clone();
    let result = store
        .atomic_update(&key, |current| {
            rival.set(&(Counters, s("hits")), &100).unwrap();
            current.map(|n| n + 1)
        })
        .unwrap();

    assert_eq!(result, CommitResult::CheckFailed);
    assert_eq!(store.get(&key).unwrap().into_value(), Some(100));
}

#[test]
fn test_atomic_update_retrying_recovers_from_race() {
    let store: Tkv<(Counters, String), i64> = Tkv::new(memory_backend());
    let key = (Counters, s("hits"));
    store.set(&key, &1).unwrap();

    let rival = store.clone();
    let mut calls = 0;
    let result = store
        .atomic_update_retrying(&key, 3, |current| {
            calls += 1;
            if calls == 1 {
                rival.set(&(Counters, s("hits")), &100).unwrap();
            }
            current.map(|n| n + 1)
        })
        .unwrap();

    assert!(result.is_ok());
    assert_eq!(calls, 2);
    assert_eq!(store.get(&key).unwrap().into_value(), Some(101));
}

#[test]
fn test_atomic_update_retrying_gives_up() {
    let store: Tkv<(Counters, String), i64> = Tkv::new(memory_backend());
    let key = (Counters, s("hits"));
    store.set(&key, &0).unwrap();

    let rival = store.clone();
    let mut calls = 0;
    let result = store
        .atomic_update_retrying(&key, 2, |current| {
            calls += 1;
            rival.set(&(Counters, s("hits")), &-1).unwrap();
            current.map(|n| n + 1)
        })
        .unwrap();

    assert_eq!(result, CommitResult::CheckFailed);
    assert_eq!(calls, 2);
}

// =============================================================================
// Expiration Tests
// =============================================================================

#[test]
fn test_expired_value_reads_as_absent() {
    let clock = Arc::new(ManualClock::new(1_000));
    let backend = Arc::new(MemoryBackend::new().with_clock(clock.clone()));
    let store: Tkv<FooKey, String> = Tkv::new(Arc::clone(&backend));

    store
        .set_with(&foo("session"), &s("token"), SetOptions::expire_in(Duration::from_secs(60)))
        .unwrap();
    store.set(&foo("user"), &s("ada")).unwrap();

    clock.advance(Duration::from_secs(59));
    assert!(store.get(&foo("session")).unwrap().is_present());

    clock.advance(Duration::from_secs(1));
    assert!(!store.get(&foo("session")).unwrap().is_present());

    let keys: Vec<_> = store
        .list(ListSelector::prefix((Foo,)))
        .map(|e| e.unwrap().key.1)
        .collect();
    assert_eq!(keys, vec![s("user")]);
    assert_eq!(backend.entry_count(), 1);
}

#[test]
fn test_expired_value_counts_as_absent_for_cas() {
    let clock = Arc::new(ManualClock::new(0));
    let backend = Arc::new(MemoryBackend::new().with_clock(clock.clone()));
    let store: Tkv<FooKey, String> = Tkv::new(backend);

    let created = store
        .atomic_set_with(&foo("lock"), None, &s("held"), SetOptions::expire_in(Duration::from_millis(10)))
        .unwrap();
    assert!(created.is_ok());
    assert!(!store.atomic_set(&foo("lock"), None, &s("mine")).unwrap().is_ok());

    clock.advance(Duration::from_millis(10));
    assert!(!store.atomic_set(&foo("lock"), created.versionstamp(), &s("mine")).unwrap().is_ok());
    assert!(store.atomic_set(&foo("lock"), None, &s("mine")).unwrap().is_ok());
}

#[test]
fn test_expired_entries_are_evicted_from_memory() {
    let clock = Arc::new(ManualClock::new(0));
    let backend = Arc::new(MemoryBackend::new().with_clock(clock.clone()));
    let store: Tkv<FooKey, String> = Tkv::new(Arc::clone(&backend));

    for i in 0..1000 {
        store
            .set_with(&foo(&i.to_string()), &s("v"), SetOptions::expire_in(Duration::from_millis(1)))
            .unwrap();
    }
    clock.advance(Duration::from_secs(10));
    assert_eq!(store.list(ListSelector::prefix((Foo,))).count(), 0);
    assert_eq!(backend.entry_count(), 0);

    store.set(&foo("fresh"), &s("v")).unwrap();
    assert_eq!(backend.stored_count(), 1);
}

#[test]
fn test_purge_expired_without_writes() {
    let clock = Arc::new(ManualClock::new(0));
    let backend = Arc::new(MemoryBackend::new().with_clock(clock.clone()));
    let store: Tkv<FooKey, String> = Tkv::new(Arc::clone(&backend));

    for id in ["a", "b", "c"] {
        store
            .set_with(&foo(id), &s("v"), SetOptions::expire_in(Duration::from_secs(1)))
            .unwrap();
    }
    store.set(&foo("kept"), &s("v")).unwrap();

    clock.advance(Duration::from_secs(1));
    assert_eq!(backend.stored_count(), 4);
    assert_eq!(backend.purge_expired(), 3);
    assert_eq!(backend.stored_count(), 1);
    assert!(store.get(&foo("kept")).unwrap().is_present());
}

#[test]
fn test_far_future_expiry_does_not_wrap() {
    let clock = Arc::new(ManualClock::new(1_000));
    let backend = Arc::new(MemoryBackend::new().with_clock(clock.clone()));
    let store: Tkv<FooKey, String> = Tkv::new(backend);

    let forever = Duration::from_secs(18_446_744_073_709_552);
    store
        .set_with(&foo("long"), &s("v"), SetOptions::expire_in(forever))
        .unwrap();
    clock.advance(Duration::from_secs(1));

    assert!(store.get(&foo("long")).unwrap().is_present());
}

// =============================================================================
// Error Propagation Tests
// =============================================================================

#[test]
fn test_closed_backend_fails_every_operation() {
    let backend = memory_backend();
    let store: Tkv<FooKey, String> = Tkv::new(Arc::clone(&backend));
    store.set(&foo("a"), &s("asd")).unwrap();

    backend.close();

    assert!(matches!(store.get(&foo("a")), Err(TkvError::BackendClosed)));
    assert!(matches!(store.set(&foo("a"), &s("x")), Err(TkvError::BackendClosed)));
    assert!(matches!(store.delete(&foo("a")), Err(TkvError::BackendClosed)));
    assert!(matches!(store.atomic_set(&foo("a"), None, &s("x")), Err(TkvError::BackendClosed)));
    assert!(matches!(store.atomic_delete(&foo("a"), None), Err(TkvError::BackendClosed)));
    assert!(matches!(
        store.atomic_update(&foo("a"), |v| v),
        Err(TkvError::BackendClosed)
    ));
    assert!(matches!(
        store.list(ListSelector::prefix((Foo,))).next(),
        Some(Err(TkvError::BackendClosed))
    ));
    assert!(matches!(store.watch(&[foo("a")]), Err(TkvError::BackendClosed)));
}

#[test]
fn test_oversized_value_is_rejected_unchanged() {
    let config = Config::builder().max_value_size(16).build();
    let backend = Arc::new(MemoryBackend::with_config(config.clone()));
    let store: Tkv<FooKey, String> = Tkv::with_config(backend, &config);

    let err = store.set(&foo("big"), &"x".repeat(64)).unwrap_err();
    assert!(matches!(err, TkvError::ValueTooLarge { max: 16, .. }));

    let err = store.atomic_set(&foo("big"), None, &"x".repeat(64)).unwrap_err();
    assert!(matches!(err, TkvError::ValueTooLarge { max: 16, .. }));
    assert!(!store.get(&foo("big")).unwrap().is_present());
}

#[test]
fn test_oversized_key_is_rejected() {
    let config = Config::builder().max_key_size(8).build();
    let store: Tkv<FooKey, String> = Tkv::new(Arc::new(MemoryBackend::with_config(config)));

    let err = store.set(&foo("a-very-long-identifier"), &s("v")).unwrap_err();
    assert!(matches!(err, TkvError::KeyTooLarge { max: 8, .. }));
}
