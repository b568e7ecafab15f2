pub mod config;

use crate::core::{DbError, Result, Row, Value};
use crate::events::{ConnectionHook, EventBus, HandlerId, TransactionEvent, raise_handlers};
use crate::storage::{StorageSession, TableSchema, TransactionalResource};
use crate::transaction::{Resolution, Transaction, TransactionId};
pub use config::ConnectionConfig;
use log::{debug, error, trace};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn_{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Active,
    Closed,
}

/// The transaction currently open on a connection. `active` is shared with
/// the `Transaction` guard.
struct TransactionSlot {
    id: TransactionId,
    active: Arc<AtomicBool>,
}

impl TransactionSlot {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

struct ConnectionInner<R: TransactionalResource> {
    id: ConnectionId,
    config: ConnectionConfig,
    state: ConnectionState,
    resource: R,
    current: Option<TransactionSlot>,
    events: EventBus<ConnectionHook>,
}

impl<R: TransactionalResource> ConnectionInner<R> {
    fn current_active(&self) -> Option<TransactionId> {
        self.current
            .as_ref()
            .filter(|slot| slot.is_active())
            .map(|slot| slot.id)
    }

    /// Resolve the open transaction directly against the resource by the
    /// abandon policy. Transaction-level handlers are not consulted. On
    /// failure the transaction stays open.
    fn release_open_transaction(&mut self) -> Result<()> {
        let Some(slot) = self.current.take() else {
            return Ok(());
        };
        if !slot.is_active() {
            return Ok(());
        }

        let resolution = Resolution::for_abandoned(self.config.transaction_autocommit);
        debug!(
            "Connection {} releasing open transaction {} by {}",
            self.id, slot.id, resolution
        );
        let outcome = match resolution {
            Resolution::Commit => self.resource.commit(),
            Resolution::Rollback => self.resource.rollback(),
        };
        if let Err(err) = outcome {
            self.current = Some(slot);
            return Err(err);
        }

        slot.active.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl<R: TransactionalResource> Drop for ConnectionInner<R> {
    fn drop(&mut self) {
        if let Err(err) = self.release_open_transaction() {
            error!("Failed to release transaction while dropping connection {}: {}", self.id, err);
        }
    }
}

/// Database connection handle
///
/// Cheap to clone; clones share the same state and resource. A connection
/// owns one `TransactionalResource` and allows at most one active
/// transaction at a time.
///
/// Lifecycle notifications: `BeforeBeginTransaction` (cancelable) and
/// `AfterBeginTransaction`. Handlers run with no internal lock held, so they
/// may call back into the connection, but must not begin a transaction on
/// it. Concurrent callers on clones run the same handlers; a busy handler is
/// waited for, never skipped. A handler that captures a clone of the
/// connection it is attached to keeps that connection alive.
pub struct Connection<R: TransactionalResource = StorageSession> {
    id: ConnectionId,
    inner: Arc<RwLock<ConnectionInner<R>>>,
}

impl<R: TransactionalResource> Clone for Connection<R> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: TransactionalResource> Connection<R> {
    pub fn new(resource: R, config: ConnectionConfig) -> Self {
        let id = ConnectionId::next();
        let state = if config.auto_open {
            ConnectionState::Active
        } else {
            ConnectionState::Closed
        };

        Self {
            id,
            inner: Arc::new(RwLock::new(ConnectionInner {
                id,
                config,
                state,
                resource,
                current: None,
                events: EventBus::new(),
            })),
        }
    }

    /// Get connection ID
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Check if connection is open. A poisoned connection reports closed.
    pub fn is_active(&self) -> bool {
        self.inner
            .read()
            .map(|inner| inner.state == ConnectionState::Active)
            .unwrap_or(false)
    }

    /// The autocommit-on-abandon policy. A poisoned connection reports
    /// false so abandoned work is rolled back.
    pub fn transaction_autocommit(&self) -> bool {
        self.inner
            .read()
            .map(|inner| inner.config.transaction_autocommit)
            .unwrap_or(false)
    }

    pub fn set_transaction_autocommit(&self, enabled: bool) -> Result<()> {
        self.inner.write()?.config.transaction_autocommit = enabled;
        Ok(())
    }

    pub fn config(&self) -> Result<ConnectionConfig> {
        Ok(self.inner.read()?.config.clone())
    }

    /// The transaction currently active on this connection, if any
    pub fn current_transaction(&self) -> Option<TransactionId> {
        self.inner.read().ok().and_then(|inner| inner.current_active())
    }

    /// Reopen a closed connection
    pub fn open(&self) -> Result<()> {
        let mut inner = self.inner.write()?;
        if inner.state == ConnectionState::Closed {
            trace!("Opening connection {}", self.id);
            inner.state = ConnectionState::Active;
        }
        Ok(())
    }

    /// Close the connection
    ///
    /// An open transaction is first resolved by the `transaction_autocommit`
    /// policy and its guard becomes inactive. If that resolution fails the
    /// error is returned and the connection stays open.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.write()?;
        if inner.state == ConnectionState::Closed {
            return Ok(());
        }

        inner.release_open_transaction()?;
        trace!("Closing connection {}", self.id);
        inner.state = ConnectionState::Closed;
        Ok(())
    }

    pub fn attach_handler<F>(&self, hook: ConnectionHook, handler: F) -> Result<HandlerId>
    where
        F: FnMut(&mut TransactionEvent) + Send + 'static,
    {
        Ok(self.inner.write()?.events.attach(hook, handler))
    }

    /// Detach a handler. A raise already in progress still runs it.
    pub fn detach_handler(&self, hook: ConnectionHook, id: HandlerId) -> Result<bool> {
        Ok(self.inner.write()?.events.detach(hook, id))
    }

    pub fn has_handlers(&self, hook: ConnectionHook) -> bool {
        self.inner
            .read()
            .map(|inner| inner.events.has_handlers(hook))
            .unwrap_or(false)
    }

    /// Begin a new transaction
    ///
    /// Returns `Ok(None)` when a `BeforeBeginTransaction` handler vetoes.
    /// Fails with `ConnectionClosed` on a closed connection and with
    /// `TransactionInProgress` while another transaction is active.
    pub fn begin_transaction(&self) -> Result<Option<Transaction<R>>> {
        let current = {
            let inner = self.inner.read()?;
            if inner.state == ConnectionState::Closed {
                return Err(DbError::ConnectionClosed(self.id.as_u64()));
            }
            inner.current_active()
        };

        let mut event = TransactionEvent::new(Some(self.id), current);
        if !self.raise(ConnectionHook::BeforeBeginTransaction, &mut event)? {
            debug!("Beginning a transaction on {} vetoed by a handler", self.id);
            return Ok(None);
        }

        let (id, active) = {
            let mut inner = self.inner.write()?;
            if inner.state == ConnectionState::Closed {
                return Err(DbError::ConnectionClosed(self.id.as_u64()));
            }
            if let Some(open) = inner.current_active() {
                return Err(DbError::TransactionInProgress(open.to_string()));
            }

            trace!("Starting transaction on {}", self.id);
            inner.resource.begin()?;

            let id = TransactionId::new();
            let active = Arc::new(AtomicBool::new(true));
            inner.current = Some(TransactionSlot {
                id,
                active: Arc::clone(&active),
            });
            (id, active)
        };

        let transaction = Transaction::new(self.clone(), id, active);

        let mut event = TransactionEvent::new(Some(self.id), Some(id));
        self.raise(ConnectionHook::AfterBeginTransaction, &mut event)?;

        Ok(Some(transaction))
    }

    /// Run `f` against the underlying resource. Fails with
    /// `ConnectionClosed` on a closed connection.
    ///
    /// Transaction control belongs to `begin_transaction` and the
    /// `Transaction` guard; `f` should not call the resource's
    /// begin/commit/rollback itself.
    pub fn with_resource<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut R) -> Result<T>,
    {
        let mut inner = self.inner.write()?;
        if inner.state == ConnectionState::Closed {
            return Err(DbError::ConnectionClosed(self.id.as_u64()));
        }
        f(&mut inner.resource)
    }

    /// Commit or roll back transaction `id` on the resource and mark it
    /// resolved. The resource call and the state flip happen under one lock.
    pub(crate) fn finish_transaction(&self, id: TransactionId, resolution: Resolution) -> Result<()> {
        let mut inner = self.inner.write()?;
        let active = match &inner.current {
            Some(slot) if slot.id == id && slot.is_active() => Arc::clone(&slot.active),
            _ => return Err(DbError::InactiveTransaction),
        };

        match resolution {
            Resolution::Commit => inner.resource.commit()?,
            Resolution::Rollback => inner.resource.rollback()?,
        }

        active.store(false, Ordering::SeqCst);
        inner.current = None;
        Ok(())
    }

    /// Raise a connection hook with no lock held.
    ///
    /// Runs the handlers attached when the raise starts. Handlers attached
    /// or detached meanwhile take effect from the next raise.
    fn raise(&self, hook: ConnectionHook, event: &mut TransactionEvent) -> Result<bool> {
        let handlers = self.inner.read()?.events.snapshot(hook);
        Ok(raise_handlers(hook, &handlers, event))
    }
}

/// Data operations against the in-memory store.
///
/// Inside a transaction, writes are buffered and only this connection sees
/// them until commit.
impl Connection<StorageSession> {
    /// Create a table. Applied immediately, even inside a transaction.
    pub fn create_table(&self, schema: TableSchema) -> Result<()> {
        self.with_resource(|session| session.create_table(schema))
    }

    pub fn insert(&self, table: &str, row: Row) -> Result<()> {
        self.with_resource(|session| session.insert(table, row))
    }

    /// Delete rows whose `column` equals `value`, returning how many were removed
    pub fn delete_where(&self, table: &str, column: &str, value: impl Into<Value>) -> Result<usize> {
        let value = value.into();
        self.with_resource(|session| session.delete_where(table, column, value))
    }

    pub fn scan(&self, table: &str) -> Result<Vec<Row>> {
        self.with_resource(|session| session.scan(table))
    }

    pub fn count_where(&self, table: &str, column: &str, value: impl Into<Value>) -> Result<usize> {
        let value = value.into();
        self.with_resource(|session| session.count_where(table, column, &value))
    }

    pub fn row_count(&self, table: &str) -> Result<usize> {
        self.with_resource(|session| session.row_count(table))
    }
}

impl<R: TransactionalResource> fmt::Debug for Connection<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .field("current_transaction", &self.current_transaction())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Column, DataType};
    use crate::storage::InMemoryStorage;
    use std::sync::Mutex;

    fn connection(config: ConnectionConfig) -> Connection {
        let storage = Arc::new(RwLock::new(InMemoryStorage::new()));
        let conn = Connection::new(StorageSession::new(storage), config);
        if conn.is_active() {
            conn.create_table(TableSchema::new(
                "posts",
                vec![
                    Column::new("id", DataType::Integer).primary_key(),
                    Column::new("title", DataType::Text),
                ],
            ))
            .unwrap();
        }
        conn
    }

    fn post(id: i64) -> Row {
        vec![Value::Integer(id), "test post".into()]
    }

    #[test]
    fn test_connection_ids_are_unique() {
        let a = connection(ConnectionConfig::default());
        let b = connection(ConnectionConfig::default());
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
    }

    #[test]
    fn test_auto_open_false_starts_closed() {
        let conn = connection(ConnectionConfig::default().auto_open(false));
        assert!(!conn.is_active());
        assert!(matches!(
            conn.begin_transaction(),
            Err(DbError::ConnectionClosed(_))
        ));
        assert!(matches!(conn.row_count("posts"), Err(DbError::ConnectionClosed(_))));

        conn.open().unwrap();
        assert!(conn.is_active());
    }

    #[test]
    fn test_one_active_transaction_per_connection() {
        let conn = connection(ConnectionConfig::default());
        let mut tx = conn.begin_transaction().unwrap().unwrap();
        assert!(matches!(
            conn.begin_transaction(),
            Err(DbError::TransactionInProgress(_))
        ));

        tx.rollback().unwrap();
        assert!(conn.begin_transaction().unwrap().is_some());
    }

    #[test]
    fn test_close_rolls_back_by_default() {
        let conn = connection(ConnectionConfig::default());
        let tx = conn.begin_transaction().unwrap().unwrap();
        tx.insert("posts", post(100)).unwrap();

        conn.close().unwrap();
        assert!(!tx.is_active());
        assert!(conn.current_transaction().is_none());

        conn.open().unwrap();
        assert_eq!(conn.count_where("posts", "id", 100i64).unwrap(), 0);
    }

    #[test]
    fn test_close_commits_with_autocommit() {
        let conn = connection(ConnectionConfig::default().transaction_autocommit(true));
        let tx = conn.begin_transaction().unwrap().unwrap();
        tx.insert("posts", post(100)).unwrap();
        tx.insert("posts", post(101)).unwrap();

        conn.close().unwrap();
        assert!(!tx.is_active());

        conn.open().unwrap();
        assert_eq!(conn.count_where("posts", "id", 100i64).unwrap(), 1);
        assert_eq!(conn.count_where("posts", "id", 101i64).unwrap(), 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let conn = connection(ConnectionConfig::default());
        conn.close().unwrap();
        conn.close().unwrap();
        assert!(!conn.is_active());
    }

    #[test]
    fn test_before_begin_veto() {
        let conn = connection(ConnectionConfig::default());
        conn.attach_handler(ConnectionHook::BeforeBeginTransaction, |event| {
            event.invalidate()
        })
        .unwrap();

        assert!(conn.begin_transaction().unwrap().is_none());
        assert!(conn.current_transaction().is_none());
    }

    #[test]
    fn test_before_begin_sees_current_transaction() {
        let conn = connection(ConnectionConfig::default());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&seen);
        conn.attach_handler(ConnectionHook::BeforeBeginTransaction, move |event| {
            log.lock().unwrap().push(event.transaction());
            event.invalidate();
        })
        .unwrap();
        assert!(conn.begin_transaction().unwrap().is_none());
        assert_eq!(*seen.lock().unwrap(), vec![None]);
    }

    #[test]
    fn test_handler_may_call_back_into_connection() {
        let conn = connection(ConnectionConfig::default());
        let observed = Arc::new(Mutex::new(None));

        let handle = conn.clone();
        let slot = Arc::clone(&observed);
        conn.attach_handler(ConnectionHook::AfterBeginTransaction, move |_| {
            *slot.lock().unwrap() = handle.current_transaction();
            handle
                .attach_handler(ConnectionHook::AfterBeginTransaction, |_| {})
                .unwrap();
        })
        .unwrap();

        let tx = conn.begin_transaction().unwrap().unwrap();
        assert_eq!(*observed.lock().unwrap(), Some(tx.id()));
        assert!(conn.has_handlers(ConnectionHook::AfterBeginTransaction));
    }

    #[test]
    fn test_handler_detaches_sibling_during_raise() {
        let conn = connection(ConnectionConfig::default());
        let vetoing = conn
            .attach_handler(ConnectionHook::BeforeBeginTransaction, |event| {
                event.invalidate()
            })
            .unwrap();

        let handle = conn.clone();
        let outcome = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&outcome);
        conn.attach_handler(ConnectionHook::BeforeBeginTransaction, move |_| {
            let visible = handle.has_handlers(ConnectionHook::BeforeBeginTransaction);
            let detached = handle
                .detach_handler(ConnectionHook::BeforeBeginTransaction, vetoing)
                .unwrap();
            log.lock().unwrap().push((visible, detached));
        })
        .unwrap();

        // The running raise still includes the vetoing handler
        assert!(conn.begin_transaction().unwrap().is_none());
        assert!(conn.begin_transaction().unwrap().is_some());
        assert_eq!(*outcome.lock().unwrap(), vec![(true, true), (true, false)]);
    }

    #[test]
    fn test_connection_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Connection>();
        assert_send_sync::<ConnectionConfig>();
    }

    #[test]
    fn test_detach_handler() {
        let conn = connection(ConnectionConfig::default());
        let id = conn
            .attach_handler(ConnectionHook::BeforeBeginTransaction, |event| {
                event.invalidate()
            })
            .unwrap();
        assert!(conn.detach_handler(ConnectionHook::BeforeBeginTransaction, id).unwrap());
        assert!(conn.begin_transaction().unwrap().is_some());
    }

    #[test]
    fn test_dropping_last_handle_releases_transaction() {
        let storage = Arc::new(RwLock::new(InMemoryStorage::new()));
        let reader = Connection::new(
            StorageSession::new(Arc::clone(&storage)),
            ConnectionConfig::default(),
        );
        reader
            .create_table(TableSchema::new(
                "posts",
                vec![Column::new("id", DataType::Integer).primary_key()],
            ))
            .unwrap();

        {
            let writer = Connection::new(
                StorageSession::new(storage),
                ConnectionConfig::default().transaction_autocommit(true),
            );
            let mut tx = writer.begin_transaction().unwrap().unwrap();
            tx.attach_handler(crate::events::TransactionHook::BeforeCommit, |event| {
                event.invalidate()
            });
            tx.insert("posts", vec![Value::Integer(1)]).unwrap();
        }

        assert_eq!(reader.row_count("posts").unwrap(), 1);
    }
}
