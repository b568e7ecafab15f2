pub mod engine;
pub mod memory;
pub mod session;
pub mod table;

pub use engine::TransactionalResource;
pub use memory::InMemoryStorage;
pub use session::StorageSession;
pub use table::{Table, TableSchema};
