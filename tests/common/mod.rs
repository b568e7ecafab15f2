#![allow(dead_code)]

use rustmemodb_tx::{
    Column, Connection, ConnectionConfig, DataType, Database, DbError, Result, Row, TableSchema,
    TransactionalResource, Value,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Database with a `posts` table (id primary key, title, create_time, author_id)
pub fn blog() -> Database {
    let db = Database::new();
    let conn = db.connect().unwrap();
    conn.create_table(TableSchema::new(
        "posts",
        vec![
            Column::new("id", DataType::Integer).primary_key(),
            Column::new("title", DataType::Text).not_null(),
            Column::new("create_time", DataType::Integer),
            Column::new("author_id", DataType::Integer),
        ],
    ))
    .unwrap();
    db
}

pub fn post(id: i64) -> Row {
    vec![
        Value::Integer(id),
        Value::from("test post"),
        Value::Integer(11000),
        Value::Integer(1),
    ]
}

pub fn count_posts(conn: &Connection, id: i64) -> usize {
    conn.count_where("posts", "id", id).unwrap()
}

/// Shared call log of a `Recorder`
pub type Calls = Arc<Mutex<Vec<&'static str>>>;

/// Resource that records every primitive call; commits fail while
/// `fail_commit` is set
#[derive(Default)]
pub struct Recorder {
    pub calls: Calls,
    pub fail_commit: Arc<AtomicBool>,
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
            return Err(DbError::ConstraintViolation("deferred constraint failed".into()));
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

pub fn recording_connection(config: ConnectionConfig) -> (Connection<Recorder>, Calls, Arc<AtomicBool>) {
    let recorder = Recorder::default();
    let calls = Arc::clone(&recorder.calls);
    let fail_commit = Arc::clone(&recorder.fail_commit);
    (Connection::new(recorder, config), calls, fail_commit)
}

/// Counter shared with a handler closure
#[derive(Clone, Default)]
pub struct Counter(Arc<Mutex<usize>>);

impl Counter {
    pub fn bump(&self) {
        *self.0.lock().unwrap() += 1;
    }

    pub fn get(&self) -> usize {
        *self.0.lock().unwrap()
    }
}
