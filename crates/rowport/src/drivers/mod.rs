//! Store implementations of the core traits.
//!
//! - [`mysql`]: MySQL/MariaDB source reader and target store
//! - [`memory`]: in-memory store for tests and offline rehearsals

pub mod memory;
pub mod mysql;

pub use memory::MemoryStore;
pub use mysql::{MysqlStore, StoreAccess};
