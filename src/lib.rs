// ============================================================================
// RustMemDB Transactions
// ============================================================================
//
// Transaction lifecycle guard for rustmemodb connections: begin, commit and
// rollback with cancelable before-hooks and informational after-hooks, and
// deterministic resolution of a transaction dropped while still active.
//
// ============================================================================

pub mod connection;
pub mod core;
pub mod events;
pub mod facade;
pub mod storage;
pub mod transaction;

pub use connection::{Connection, ConnectionId, config::ConnectionConfig};
pub use crate::core::{Column, DataType, DbError, Result, Row, Schema, Value};
pub use events::{ConnectionHook, HandlerId, TransactionEvent, TransactionHook};
pub use facade::Database;
pub use storage::{InMemoryStorage, StorageSession, TableSchema, TransactionalResource};
pub use transaction::{Resolution, Transaction, TransactionId, TransactionState};
