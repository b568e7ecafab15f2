use super::{InMemoryStorage, Table, TableSchema, TransactionalResource};
use crate::core::{DbError, Result, Row, Value};
use crate::transaction::Change;
use std::sync::{Arc, RwLock};

/// Per-connection view of a shared `InMemoryStorage`.
///
/// Outside a transaction writes go straight to committed state. Inside one
/// they are validated against the session's view and buffered until COMMIT.
/// Only the owning session sees its buffered writes.
#[derive(Debug)]
pub struct StorageSession {
    storage: Arc<RwLock<InMemoryStorage>>,
    pending: Option<Vec<Change>>,
}

impl StorageSession {
    pub fn new(storage: Arc<RwLock<InMemoryStorage>>) -> Self {
        Self {
            storage,
            pending: None,
        }
    }

    /// DDL is applied immediately, even inside a transaction
    pub fn create_table(&mut self, schema: TableSchema) -> Result<()> {
        self.storage.write()?.create_table(schema)
    }

    pub fn insert(&mut self, table: &str, row: Row) -> Result<()> {
        self.write(Change::InsertRow {
            table: table.to_string(),
            row,
        })?;
        Ok(())
    }

    pub fn delete_where(&mut self, table: &str, column: &str, value: Value) -> Result<usize> {
        self.write(Change::DeleteWhere {
            table: table.to_string(),
            column: column.to_string(),
            value,
        })
    }

    pub fn scan(&self, table: &str) -> Result<Vec<Row>> {
        Ok(self.view(table)?.rows().to_vec())
    }

    pub fn count_where(&self, table: &str, column: &str, value: &Value) -> Result<usize> {
        self.view(table)?.count_where(column, value)
    }

    pub fn row_count(&self, table: &str) -> Result<usize> {
        Ok(self.view(table)?.row_count())
    }

    /// Number of writes buffered by the open transaction
    pub fn pending_changes(&self) -> usize {
        self.pending.as_ref().map_or(0, Vec::len)
    }

    fn write(&mut self, change: Change) -> Result<usize> {
        match &mut self.pending {
            Some(pending) => {
                let storage = self.storage.read()?;
                let mut view = storage.table_view(change.table_name(), pending)?;
                let affected = view.apply(&change)?;
                pending.push(change);
                Ok(affected)
            }
            None => self.storage.write()?.apply_change(&change),
        }
    }

    fn view(&self, table: &str) -> Result<Table> {
        let pending = self.pending.as_deref().unwrap_or_default();
        self.storage.read()?.table_view(table, pending)
    }
}

impl TransactionalResource for StorageSession {
    fn begin(&mut self) -> Result<()> {
        if self.pending.is_some() {
            return Err(DbError::TransactionInProgress("session".into()));
        }
        self.pending = Some(Vec::new());
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let pending = self.pending.as_ref().ok_or(DbError::NoActiveTransaction)?;
        self.storage.write()?.apply_changes(pending)?;
        self.pending = None;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.pending.take().ok_or(DbError::NoActiveTransaction)?;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.pending.is_some()
    }
}
