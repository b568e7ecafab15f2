use crate::connection::ConnectionId;
use crate::transaction::TransactionId;
use std::fmt;
use std::hash::Hash;

/// A named notification point that handlers can be attached to
pub trait Hook: Copy + Eq + Hash + fmt::Debug + fmt::Display {
    /// Whether handlers may veto the action this hook precedes
    fn is_cancelable(&self) -> bool;
}

/// Notification points raised by a `Transaction`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionHook {
    BeforeCommit,
    AfterCommit,
    BeforeRollback,
    AfterRollback,
}

impl Hook for TransactionHook {
    fn is_cancelable(&self) -> bool {
        matches!(self, Self::BeforeCommit | Self::BeforeRollback)
    }
}

impl fmt::Display for TransactionHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeforeCommit => write!(f, "before_commit"),
            Self::AfterCommit => write!(f, "after_commit"),
            Self::BeforeRollback => write!(f, "before_rollback"),
            Self::AfterRollback => write!(f, "after_rollback"),
        }
    }
}

/// Notification points raised by a `Connection`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionHook {
    BeforeBeginTransaction,
    AfterBeginTransaction,
}

impl Hook for ConnectionHook {
    fn is_cancelable(&self) -> bool {
        matches!(self, Self::BeforeBeginTransaction)
    }
}

impl fmt::Display for ConnectionHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeforeBeginTransaction => write!(f, "before_begin_transaction"),
            Self::AfterBeginTransaction => write!(f, "after_begin_transaction"),
        }
    }
}

/// Payload handed to every handler of a transaction lifecycle hook.
///
/// The back-references are ids rather than borrows: handlers run while the
/// raising transaction or connection is mutably borrowed. Handlers that need
/// the connection itself should capture a clone of it.
///
/// `is_valid` starts out true. Clearing it from a handler of a cancelable
/// hook vetoes the pending begin, commit or rollback; for informational
/// hooks it is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionEvent {
    connection: Option<ConnectionId>,
    transaction: Option<TransactionId>,
    is_valid: bool,
}

impl TransactionEvent {
    pub fn new(connection: Option<ConnectionId>, transaction: Option<TransactionId>) -> Self {
        Self {
            connection,
            transaction,
            is_valid: true,
        }
    }

    pub fn connection(&self) -> Option<ConnectionId> {
        self.connection
    }

    pub fn transaction(&self) -> Option<TransactionId> {
        self.transaction
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn set_valid(&mut self, valid: bool) {
        self.is_valid = valid;
    }

    /// Veto the pending action
    pub fn invalidate(&mut self) {
        self.is_valid = false;
    }
}

impl Default for TransactionEvent {
    fn default() -> Self {
        Self::new(None, None)
    }
}
