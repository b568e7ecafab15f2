use crate::core::{Column, DbError, Result, Row, Schema, Value};
use crate::transaction::Change;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    name: String,
    schema: Schema,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            schema: Schema::new(columns),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    schema: TableSchema,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn insert(&mut self, row: Row) -> Result<()> {
        self.validate_row(&row)?;
        self.check_uniqueness(&row)?;
        self.rows.push(row);
        Ok(())
    }

    /// Remove rows whose `column` equals `value`, returning how many were removed
    pub fn delete_where(&mut self, column: &str, value: &Value) -> Result<usize> {
        let idx = self.column_index(column)?;
        let before = self.rows.len();
        self.rows.retain(|row| row[idx] != *value);
        Ok(before - self.rows.len())
    }

    pub fn count_where(&self, column: &str, value: &Value) -> Result<usize> {
        let idx = self.column_index(column)?;
        Ok(self.rows.iter().filter(|row| row[idx] == *value).count())
    }

    /// Apply a buffered write, returning the number of affected rows
    pub fn apply(&mut self, change: &Change) -> Result<usize> {
        match change {
            Change::InsertRow { row, .. } => {
                self.insert(row.clone())?;
                Ok(1)
            }
            Change::DeleteWhere { column, value, .. } => self.delete_where(column, value),
        }
    }

    fn column_index(&self, column: &str) -> Result<usize> {
        self.schema
            .schema()
            .find_column_index(column)
            .ok_or_else(|| DbError::ColumnNotFound(column.to_string(), self.schema.name.clone()))
    }

    fn validate_row(&self, row: &Row) -> Result<()> {
        let columns = self.schema.schema().columns();
        if row.len() != columns.len() {
            return Err(DbError::ExecutionError(format!(
                "Expected {} columns, got {}",
                columns.len(),
                row.len()
            )));
        }
        for (column, value) in columns.iter().zip(row.iter()) {
            column.validate(value)?;
        }
        Ok(())
    }

    fn check_uniqueness(&self, row: &Row) -> Result<()> {
        for (col_idx, column) in self.schema.schema().columns().iter().enumerate() {
            if !column.is_unique_key() {
                continue;
            }
            let value = &row[col_idx];
            if value.is_null() {
                continue;
            }
            if self.rows.iter().any(|existing| existing[col_idx] == *value) {
                return Err(DbError::ConstraintViolation(format!(
                    "Unique constraint violation: Column '{}' in table '{}' already contains value {}",
                    column.name, self.schema.name, value
                )));
            }
        }
        Ok(())
    }
}
