pub mod database;
pub mod error;
pub mod memory;
pub mod messages;
pub mod rooms;
pub mod schema;
pub mod sqlite;
pub mod store;

pub use database::Database;
pub use error::StoreError;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::Store;
