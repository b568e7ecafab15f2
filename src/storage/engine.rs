use crate::core::Result;

/// The begin/commit/rollback primitives of an already-transactional backend.
///
/// A `Connection` owns one resource and is the only caller of these methods;
/// `Transaction` sequences them and wraps them in notifications.
pub trait TransactionalResource {
    /// Open a transaction. Fails with `TransactionInProgress` if one is open.
    fn begin(&mut self) -> Result<()>;

    /// Make the open transaction's writes durable.
    ///
    /// On failure the transaction must stay open so the caller can retry or
    /// roll back.
    fn commit(&mut self) -> Result<()>;

    /// Discard the open transaction's writes.
    fn rollback(&mut self) -> Result<()>;

    fn in_transaction(&self) -> bool;
}
