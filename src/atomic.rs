//! Atomic operations
//!
//! An [`AtomicOperation`] bundles versionstamp checks with mutations. The
//! backend evaluates every check and applies every mutation as one
//! indivisible step: either all mutations land under a single new
//! versionstamp, or none do and the result is [`CommitResult::CheckFailed`].
//!
//! The typed store only ever builds single-key operations (one check, one
//! mutation); the raw builder accepts more for backends and tests.

use std::time::Duration;

use bytes::Bytes;

use crate::entry::Versionstamp;

/// Precondition: the versionstamp stored at `key` equals `versionstamp`
///
/// `None` means the key must currently be absent.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomicCheck {
    pub key: Bytes,
    pub versionstamp: Option<Versionstamp>,
}

/// A write applied when all checks pass
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub key: Bytes,
    pub kind: MutationKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutationKind {
    /// Store a value, optionally expiring after the given duration
    Set {
        value: Bytes,
        expire_in: Option<Duration>,
    },

    /// Remove the key
    Delete,
}

/// Checks plus mutations, committed together
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AtomicOperation {
    pub checks: Vec<AtomicCheck>,
    pub mutations: Vec<Mutation>,
}

impl AtomicOperation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(mut self, key: Bytes, versionstamp: Option<Versionstamp>) -> Self {
        self.checks.push(AtomicCheck { key, versionstamp });
        self
    }

    pub fn set(mut self, key: Bytes, value: Bytes, expire_in: Option<Duration>) -> Self {
        self.mutations.push(Mutation {
            key,
            kind: MutationKind::Set { value, expire_in },
        });
        self
    }

    pub fn delete(mut self, key: Bytes) -> Self {
        self.mutations.push(Mutation {
            key,
            kind: MutationKind::Delete,
        });
        self
    }
}

/// Outcome of committing an [`AtomicOperation`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitResult {
    /// All checks passed; mutations were applied under `versionstamp`
    Committed { versionstamp: Versionstamp },

    /// At least one check failed; nothing was written
    CheckFailed,
}

impl CommitResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, CommitResult::Committed { .. })
    }

    /// The new versionstamp, if the commit went through
    pub fn versionstamp(&self) -> Option<Versionstamp> {
        match self {
            CommitResult::Committed { versionstamp } => Some(*versionstamp),
            CommitResult::CheckFailed => None,
        }
    }
}
