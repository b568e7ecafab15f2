use super::{Resolution, TransactionId, TransactionState};
use crate::connection::Connection;
use crate::core::{DbError, Result};
use crate::events::{EventBus, HandlerId, TransactionEvent, TransactionHook};
use crate::storage::{StorageSession, TransactionalResource};
use log::{debug, error, trace, warn};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// An open transaction on a `Connection`.
///
/// Obtained from [`Connection::begin_transaction`]. Derefs to the owning
/// connection, so writes issued through the guard land in the transaction.
///
/// ```
/// use rustmemodb_tx::{Column, DataType, Database, TableSchema, Value};
///
/// # fn main() -> rustmemodb_tx::Result<()> {
/// let db = Database::new();
/// let conn = db.connect()?;
/// conn.create_table(TableSchema::new(
///     "posts",
///     vec![Column::new("id", DataType::Integer).primary_key()],
/// ))?;
///
/// let mut tx = conn.begin_transaction()?.expect("no handler vetoes the begin");
/// match tx.insert("posts", vec![Value::Integer(10)]) {
///     Ok(()) => tx.commit()?,
///     Err(_) => tx.rollback()?,
/// }
/// assert!(!tx.is_active());
/// # Ok(())
/// # }
/// ```
///
/// # Dropping an active transaction
///
/// If the guard is dropped while still active it calls `commit()` when the
/// connection's `transaction_autocommit` policy is set and `rollback()`
/// otherwise. Failures are logged, never propagated. Before-hook handlers
/// still run during that implicit call, so a handler that vetoes leaves the
/// transaction open on the connection after the guard is gone; the
/// connection reports it via `current_transaction()` until
/// `Connection::close` resolves it.
///
/// When the guard is dropped during a panic, the policy is applied without
/// running any handler.
pub struct Transaction<R: TransactionalResource = StorageSession> {
    connection: Connection<R>,
    id: TransactionId,
    active: Arc<AtomicBool>,
    events: EventBus<TransactionHook>,
}

impl<R: TransactionalResource> Transaction<R> {
    pub(crate) fn new(connection: Connection<R>, id: TransactionId, active: Arc<AtomicBool>) -> Self {
        Self {
            connection,
            id,
            active,
            events: EventBus::new(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> TransactionState {
        if self.is_active() {
            TransactionState::Active
        } else {
            TransactionState::Resolved
        }
    }

    pub fn connection(&self) -> &Connection<R> {
        &self.connection
    }

    pub fn attach_handler<F>(&mut self, hook: TransactionHook, handler: F) -> HandlerId
    where
        F: FnMut(&mut TransactionEvent) + Send + 'static,
    {
        self.events.attach(hook, handler)
    }

    pub fn detach_handler(&mut self, hook: TransactionHook, id: HandlerId) -> bool {
        self.events.detach(hook, id)
    }

    pub fn has_handlers(&self, hook: TransactionHook) -> bool {
        self.events.has_handlers(hook)
    }

    /// Commit the transaction.
    ///
    /// Fails with `InactiveTransaction` if the transaction was already
    /// resolved or the connection is closed. A before-commit veto returns
    /// `Ok(())` with the transaction still active. Errors from the resource
    /// propagate unchanged and also leave it active.
    pub fn commit(&mut self) -> Result<()> {
        self.resolve(Resolution::Commit)
    }

    /// Roll the transaction back. Same contract as [`Transaction::commit`].
    pub fn rollback(&mut self) -> Result<()> {
        self.resolve(Resolution::Rollback)
    }

    fn resolve(&mut self, resolution: Resolution) -> Result<()> {
        if !self.is_active() || !self.connection.is_active() {
            return Err(DbError::InactiveTransaction);
        }

        trace!("{} transaction {}", resolution.progressive(), self.id);
        if !self.approve(resolution.before_hook()) {
            debug!("{} of transaction {} vetoed by a handler", resolution, self.id);
            return Ok(());
        }

        self.connection.finish_transaction(self.id, resolution)?;

        let after = resolution.after_hook();
        if self.events.has_handlers(after) {
            let mut event = self.event();
            self.events.raise(after, &mut event);
        }
        Ok(())
    }

    fn approve(&self, hook: TransactionHook) -> bool {
        if !self.events.has_handlers(hook) {
            return true;
        }
        let mut event = self.event();
        self.events.raise(hook, &mut event)
    }

    fn event(&self) -> TransactionEvent {
        TransactionEvent::new(Some(self.connection.id()), Some(self.id))
    }
}

impl<R: TransactionalResource> Deref for Transaction<R> {
    type Target = Connection<R>;

    fn deref(&self) -> &Self::Target {
        &self.connection
    }
}

impl<R: TransactionalResource> Drop for Transaction<R> {
    fn drop(&mut self) {
        if !self.is_active() {
            return;
        }

        let resolution = Resolution::for_abandoned(self.connection.transaction_autocommit());
        let outcome = if thread::panicking() {
            self.connection.finish_transaction(self.id, resolution)
        } else {
            self.resolve(resolution)
        };
        match outcome {
            Ok(()) if self.is_active() => warn!(
                "Abandoned transaction {} left open: {} was vetoed by a handler",
                self.id, resolution
            ),
            Ok(()) => debug!("Abandoned transaction {} resolved by {}", self.id, resolution),
            Err(err) => error!(
                "Failed to {} abandoned transaction {}: {}",
                resolution, self.id, err
            ),
        }
    }
}

impl<R: TransactionalResource> fmt::Debug for Transaction<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("connection", &self.connection.id())
            .field("state", &self.state())
            .field("events", &self.events)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionConfig;
    use std::sync::Mutex;

    /// Resource that records primitive calls and can be told to fail commits
    #[derive(Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<&'static str>>>,
        fail_commit: Arc<AtomicBool>,
        open: bool,
    }

    impl TransactionalResource for Recorder {
        fn begin(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push("begin");
            self.open = true;
            Ok(())
        }

        fn commit(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push("commit");
            if self.fail_commit.load(Ordering::SeqCst) {
                return Err(DbError::ConstraintViolation("deferred check failed".into()));
            }
            self.open = false;
            Ok(())
        }

        fn rollback(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push("rollback");
            self.open = false;
            Ok(())
        }

        fn in_transaction(&self) -> bool {
            self.open
        }
    }

    fn connection(autocommit: bool) -> (Connection<Recorder>, Arc<Mutex<Vec<&'static str>>>, Arc<AtomicBool>) {
        let recorder = Recorder::default();
        let calls = Arc::clone(&recorder.calls);
        let fail_commit = Arc::clone(&recorder.fail_commit);
        let config = ConnectionConfig::default().transaction_autocommit(autocommit);
        (Connection::new(recorder, config), calls, fail_commit)
    }

    fn begin(conn: &Connection<Recorder>) -> Transaction<Recorder> {
        conn.begin_transaction().unwrap().unwrap()
    }

    #[test]
    fn test_commit_resolves_once() {
        let (conn, calls, _) = connection(false);
        let mut tx = begin(&conn);
        assert!(tx.is_active());
        assert_eq!(tx.state(), TransactionState::Active);

        tx.commit().unwrap();
        assert!(!tx.is_active());
        assert_eq!(tx.state(), TransactionState::Resolved);
        assert!(matches!(tx.commit(), Err(DbError::InactiveTransaction)));
        assert!(matches!(tx.rollback(), Err(DbError::InactiveTransaction)));

        drop(tx);
        assert_eq!(*calls.lock().unwrap(), vec!["begin", "commit"]);
    }

    #[test]
    fn test_vetoed_commit_skips_resource() {
        let (conn, calls, _) = connection(false);
        let mut tx = begin(&conn);
        tx.attach_handler(TransactionHook::BeforeCommit, |event| event.invalidate());

        tx.commit().unwrap();
        assert!(tx.is_active());
        assert_eq!(*calls.lock().unwrap(), vec!["begin"]);

        tx.rollback().unwrap();
        assert!(!tx.is_active());
        assert_eq!(*calls.lock().unwrap(), vec!["begin", "rollback"]);
    }

    #[test]
    fn test_failed_commit_leaves_transaction_active() {
        let (conn, calls, fail_commit) = connection(false);
        let mut tx = begin(&conn);
        fail_commit.store(true, Ordering::SeqCst);

        assert!(tx.commit().unwrap_err().is_constraint_violation());
        assert!(tx.is_active());
        assert_eq!(conn.current_transaction(), Some(tx.id()));

        tx.rollback().unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["begin", "commit", "rollback"]);
    }

    #[test]
    fn test_after_hook_carries_back_references() {
        let (conn, _, _) = connection(false);
        let mut tx = begin(&conn);
        let seen = Arc::new(Mutex::new(None));

        let slot = Arc::clone(&seen);
        tx.attach_handler(TransactionHook::AfterRollback, move |event| {
            *slot.lock().unwrap() = Some((event.connection(), event.transaction()));
        });
        tx.rollback().unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            Some((Some(conn.id()), Some(tx.id())))
        );
    }

    #[test]
    fn test_drop_uses_abandon_policy() {
        let (conn, calls, _) = connection(true);
        drop(begin(&conn));
        assert_eq!(*calls.lock().unwrap(), vec!["begin", "commit"]);

        conn.set_transaction_autocommit(false).unwrap();
        drop(begin(&conn));
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["begin", "commit", "begin", "rollback"]
        );
        assert!(conn.current_transaction().is_none());
    }

    #[test]
    fn test_drop_swallows_resource_failure() {
        let (conn, calls, fail_commit) = connection(true);
        fail_commit.store(true, Ordering::SeqCst);

        let tx = begin(&conn);
        let id = tx.id();
        drop(tx);

        assert_eq!(*calls.lock().unwrap(), vec!["begin", "commit"]);
        assert_eq!(conn.current_transaction(), Some(id));
    }

    #[test]
    fn test_drop_while_unwinding_skips_handlers() {
        let (conn, calls, _) = connection(false);
        let handle = conn.clone();
        let raised = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&raised);
        let outcome = thread::spawn(move || {
            let mut tx = begin(&handle);
            tx.attach_handler(TransactionHook::BeforeRollback, move |event| {
                flag.store(true, Ordering::SeqCst);
                event.invalidate();
            });
            panic!("work failed while {} was open", tx.id());
        })
        .join();

        assert!(outcome.is_err());
        assert!(!raised.load(Ordering::SeqCst));
        assert!(conn.current_transaction().is_none());
        assert_eq!(*calls.lock().unwrap(), vec!["begin", "rollback"]);
    }

    #[test]
    fn test_transaction_can_move_across_threads() {
        let (conn, calls, _) = connection(false);
        let mut tx = begin(&conn);
        tx.attach_handler(TransactionHook::AfterCommit, |_| {});

        let id = thread::spawn(move || {
            tx.commit().unwrap();
            tx.id()
        })
        .join()
        .unwrap();

        assert_ne!(conn.current_transaction(), Some(id));
        assert_eq!(*calls.lock().unwrap(), vec!["begin", "commit"]);
    }

    #[test]
    fn test_closed_connection_makes_transaction_inactive() {
        let (conn, calls, _) = connection(false);
        let mut tx = begin(&conn);

        conn.close().unwrap();
        assert!(!tx.is_active());
        assert!(matches!(tx.commit(), Err(DbError::InactiveTransaction)));
        assert_eq!(*calls.lock().unwrap(), vec!["begin", "rollback"]);
    }

    #[test]
    fn test_deref_reaches_connection() {
        let (conn, _, _) = connection(false);
        let tx = begin(&conn);
        assert_eq!(tx.current_transaction(), Some(tx.id()));
        assert!(!tx.transaction_autocommit());
        assert_eq!(tx.connection().id(), conn.id());
    }
}
