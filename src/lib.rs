//! # typedkv
//!
//! Strongly-typed keyspaces over an ordered key-value store:
//! - Tuple keys with a shape fixed at the type level
//! - Compile-time checked prefixes for range listing
//! - Compare-and-swap writes keyed by versionstamp
//! - Read-modify-write without client-side locks
//! - Watch subscriptions delivering snapshots of a set of keys
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Tkv<K, V, B>                             │
//! │   get / set / delete / atomic_* / list / watch               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ typed keys ⇄ ordered bytes (key::codec)
//!                       │ values ⇄ bincode
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                  Backend (trait)                             │
//! │    get / set / delete / commit / scan / subscribe            │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!                       ▼
//!               ┌───────────────┐
//!               │ MemoryBackend │
//!               │ (BTreeMap +   │
//!               │   RwLock)     │
//!               └───────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use typedkv::{key_literal, ListSelector, MemoryBackend, Tkv};
//!
//! key_literal!(Foo = "foo");
//!
//! let backend = Arc::new(MemoryBackend::new());
//! let store: Tkv<(Foo, String), String> = Tkv::new(backend);
//!
//! let versionstamp = store.set(&(Foo, "a".to_string()), &"asd".to_string())?;
//! let entry = store.get(&(Foo, "a".to_string()))?;
//! assert_eq!(entry.versionstamp(), Some(versionstamp));
//!
//! let listed: Vec<_> = store
//!     .list(ListSelector::prefix((Foo,)))
//!     .collect::<typedkv::Result<_>>()?;
//! assert_eq!(listed.len(), 1);
//! # Ok::<(), typedkv::TkvError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod key;
pub mod entry;
pub mod atomic;
pub mod backend;
pub mod list;
pub mod watch;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{TkvError, Result};
pub use config::Config;
pub use key::{Key, KeyPart, KeySegment, PrefixOf};
pub use entry::{Entry, EntryMaybe, Versionstamp};
pub use atomic::{AtomicOperation, CommitResult};
pub use backend::{Backend, MemoryBackend};
pub use list::{ListCursor, ListIter, ListOptions, ListSelector};
pub use watch::{WatchSnapshot, WatchStream};
pub use store::{SetOptions, Tkv};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of typedkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
