//! SQLite-backed persistence

pub mod init;
pub mod positions;

pub use init::{init_database, init_memory_database};
pub use positions::SqlitePositionStore;
