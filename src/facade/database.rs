use crate::connection::{Connection, config::ConnectionConfig};
use crate::core::Result;
use crate::storage::{InMemoryStorage, StorageSession};
use std::sync::{Arc, RwLock};

/// Shared in-memory database.
///
/// Every connection opened from the same `Database` reads and commits to the
/// same storage; uncommitted writes stay private to their connection.
///
/// # Examples
///
/// ```
/// use rustmemodb_tx::{Column, DataType, Database, TableSchema, Value};
///
/// # fn main() -> rustmemodb_tx::Result<()> {
/// let db = Database::new();
/// let writer = db.connect()?;
/// let reader = db.connect()?;
///
/// writer.create_table(TableSchema::new(
///     "users",
///     vec![Column::new("id", DataType::Integer).primary_key()],
/// ))?;
///
/// let mut tx = writer.begin_transaction()?.expect("begin not vetoed");
/// tx.insert("users", vec![Value::Integer(1)])?;
/// assert_eq!(reader.row_count("users")?, 0);
///
/// tx.commit()?;
/// assert_eq!(reader.row_count("users")?, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    storage: Arc<RwLock<InMemoryStorage>>,
    config: ConnectionConfig,
}

impl Database {
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(InMemoryStorage::new())),
            config: ConnectionConfig::default(),
        }
    }

    /// Create a database whose connections default to `config`
    pub fn with_config(config: ConnectionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            storage: Arc::new(RwLock::new(InMemoryStorage::new())),
            config,
        })
    }

    /// Create a database from a `rustmemodb://` connection string
    pub fn from_url(url: &str) -> Result<Self> {
        Self::with_config(ConnectionConfig::from_url(url)?)
    }

    /// Open a connection with the database's default configuration
    pub fn connect(&self) -> Result<Connection> {
        self.connect_with(self.config.clone())
    }

    /// Open a connection with its own configuration
    pub fn connect_with(&self, config: ConnectionConfig) -> Result<Connection> {
        config.validate()?;
        let session = StorageSession::new(Arc::clone(&self.storage));
        Ok(Connection::new(session, config))
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn table_exists(&self, name: &str) -> Result<bool> {
        Ok(self.storage.read()?.table_exists(name))
    }

    pub fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.storage.read()?.list_tables())
    }

    pub fn drop_table(&self, name: &str) -> Result<()> {
        self.storage.write()?.drop_table(name)
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}
