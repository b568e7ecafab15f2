// ============================================================================
// Transaction State
// ============================================================================
//
// A transaction moves through exactly one transition: Active -> Resolved.
// Vetoed or failed commit/rollback attempts leave it Active.
//
// ============================================================================

use crate::events::TransactionHook;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Generate a new unique transaction ID
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// ```text
/// Active ──commit/rollback──> Resolved
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Resolved,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Resolved => write!(f, "RESOLVED"),
        }
    }
}

/// The two ways a transaction can be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Commit,
    Rollback,
}

impl Resolution {
    /// Resolution applied to a transaction abandoned under the given
    /// autocommit-on-abandon policy
    pub fn for_abandoned(transaction_autocommit: bool) -> Self {
        if transaction_autocommit {
            Resolution::Commit
        } else {
            Resolution::Rollback
        }
    }

    pub fn before_hook(self) -> TransactionHook {
        match self {
            Resolution::Commit => TransactionHook::BeforeCommit,
            Resolution::Rollback => TransactionHook::BeforeRollback,
        }
    }

    pub fn after_hook(self) -> TransactionHook {
        match self {
            Resolution::Commit => TransactionHook::AfterCommit,
            Resolution::Rollback => TransactionHook::AfterRollback,
        }
    }

    pub(crate) fn progressive(self) -> &'static str {
        match self {
            Resolution::Commit => "Committing",
            Resolution::Rollback => "Rolling back",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Commit => write!(f, "commit"),
            Resolution::Rollback => write!(f, "rollback"),
        }
    }
}
