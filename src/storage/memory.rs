use super::{Table, TableSchema};
use crate::core::{DbError, Result};
use crate::transaction::Change;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

/// Committed state shared by every session of a database
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    tables: HashMap<String, Table>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table(&mut self, schema: TableSchema) -> Result<()> {
        let name = schema.name().to_string();

        if self.tables.contains_key(&name) {
            return Err(DbError::TableExists(name));
        }

        self.tables.insert(name, Table::new(schema));
        Ok(())
    }

    pub fn drop_table(&mut self, table_name: &str) -> Result<()> {
        if self.tables.remove(table_name).is_none() {
            return Err(DbError::TableNotFound(table_name.to_string()));
        }
        Ok(())
    }

    pub fn get_table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn list_tables(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    /// Apply a single write directly to committed state
    pub fn apply_change(&mut self, change: &Change) -> Result<usize> {
        let name = change.table_name();
        self.tables
            .get_mut(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))?
            .apply(change)
    }

    /// Apply a batch of writes atomically.
    ///
    /// Touched tables are staged on copies and swapped in only when every
    /// change succeeded, so a failing change leaves committed state intact.
    pub fn apply_changes(&mut self, changes: &[Change]) -> Result<()> {
        let mut staged: HashMap<String, Table> = HashMap::new();

        for change in changes {
            let name = change.table_name();
            let table = match staged.entry(name.to_string()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => entry.insert(self.get_table(name)?.clone()),
            };
            table.apply(change)?;
        }

        self.tables.extend(staged);
        Ok(())
    }

    /// Committed rows of `name` with `pending` writes for that table replayed on top
    pub fn table_view(&self, name: &str, pending: &[Change]) -> Result<Table> {
        let mut view = self.get_table(name)?.clone();
        for change in pending.iter().filter(|c| c.table_name() == name) {
            view.apply(change)?;
        }
        Ok(view)
    }
}
