// ============================================================================
// Buffered Writes
// ============================================================================
//
// A Change is a write recorded by a session while a transaction is open.
// Changes are replayed against the shared storage on COMMIT and dropped on
// ROLLBACK.
//
// ============================================================================

use crate::core::{Row, Value};

#[derive(Debug, Clone)]
pub enum Change {
    /// Insert a new row into a table
    InsertRow { table: String, row: Row },

    /// Delete every row whose `column` equals `value`
    DeleteWhere {
        table: String,
        column: String,
        value: Value,
    },
}

impl Change {
    /// Get the table name affected by this change
    pub fn table_name(&self) -> &str {
        match self {
            Change::InsertRow { table, .. } => table,
            Change::DeleteWhere { table, .. } => table,
        }
    }
}
