mod feeds;
mod items;
mod memory;
mod schema;
mod store;
mod types;

pub use memory::MemoryStore;
pub use schema::Database;
pub use store::{Flag, Store, ALL_ITEMS};
pub use types::{Feed, Field, Item, StorageError, ValidationError, UNASSIGNED_FEED};
