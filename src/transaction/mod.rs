// ============================================================================
// Transaction Lifecycle Module
// ============================================================================
//
// A Transaction is a guard returned by Connection::begin_transaction. It
// sequences the resource's commit/rollback primitives, raises cancelable
// before-hooks and informational after-hooks around them, and resolves
// itself by the connection's autocommit-on-abandon policy when dropped
// while still active.
//
// ============================================================================

pub mod change;
pub mod guard;
pub mod state;

pub use change::Change;
pub use guard::Transaction;
pub use state::{Resolution, TransactionId, TransactionState};
