use async_trait::async_trait;

use super::schema::Database;
use super::types::{Feed, Item, StorageError};

/// `limit` value for [`Store::list_items`] meaning "no cap".
pub const ALL_ITEMS: usize = 0;

/// Per-item boolean flags mutated by the toggle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Read,
    Starred,
    Ignored,
}

impl Flag {
    pub(crate) fn column(self) -> &'static str {
        match self {
            Flag::Read => "read",
            Flag::Starred => "starred",
            Flag::Ignored => "ignored",
        }
    }
}

/// Persistence capability shared by the SQLite [`Database`] and the in-memory
/// [`MemoryStore`](super::MemoryStore).
///
/// Both implementations upsert feeds by `link` and items by `(feed_id, link)`.
/// Upserts never touch an existing item's flags.
#[async_trait]
pub trait Store: Send + Sync {
    /// Upsert `feed` and then every item in `items` as one atomic unit.
    ///
    /// On a `link` conflict the feed keeps its id and takes the new title,
    /// description and image. Items are attached to the feed's id regardless of
    /// the `feed_id` they carry. If any item fails, nothing is written.
    async fn create_feed(&self, feed: &Feed, items: &[Item]) -> Result<Feed, StorageError>;

    /// Upsert a single item; on conflict only title and publication date change.
    async fn create_item(&self, item: &Item) -> Result<Item, StorageError>;

    /// Delete a feed and all of its items, returning how many items were removed.
    /// Removing an unknown feed is a no-op.
    async fn remove_feed(&self, id: i64) -> Result<u64, StorageError>;

    async fn get_item(&self, id: i64) -> Result<Item, StorageError>;

    /// Set one flag on one item. Fails with `NotFound` for unknown ids;
    /// setting a flag to its current value succeeds.
    async fn set_flag(&self, id: i64, flag: Flag, value: bool) -> Result<(), StorageError>;

    /// Items ordered by publication date, newest first. [`ALL_ITEMS`] lifts the cap.
    async fn list_items(&self, limit: usize) -> Result<Vec<Item>, StorageError>;

    async fn read_item(&self, id: i64) -> Result<(), StorageError> {
        self.set_flag(id, Flag::Read, true).await
    }

    async fn unread_item(&self, id: i64) -> Result<(), StorageError> {
        self.set_flag(id, Flag::Read, false).await
    }

    async fn star_item(&self, id: i64) -> Result<(), StorageError> {
        self.set_flag(id, Flag::Starred, true).await
    }

    async fn unstar_item(&self, id: i64) -> Result<(), StorageError> {
        self.set_flag(id, Flag::Starred, false).await
    }

    async fn ignore_item(&self, id: i64) -> Result<(), StorageError> {
        self.set_flag(id, Flag::Ignored, true).await
    }

    async fn unignore_item(&self, id: i64) -> Result<(), StorageError> {
        self.set_flag(id, Flag::Ignored, false).await
    }
}

#[async_trait]
impl Store for Database {
    async fn create_feed(&self, feed: &Feed, items: &[Item]) -> Result<Feed, StorageError> {
        self.upsert_feed_with_items(feed, items).await
    }

    async fn create_item(&self, item: &Item) -> Result<Item, StorageError> {
        self.upsert_item(item).await
    }

    async fn remove_feed(&self, id: i64) -> Result<u64, StorageError> {
        self.delete_feed(id).await
    }

    async fn get_item(&self, id: i64) -> Result<Item, StorageError> {
        self.get_item_by_id(id)
            .await?
            .ok_or(StorageError::NotFound { id })
    }

    async fn set_flag(&self, id: i64, flag: Flag, value: bool) -> Result<(), StorageError> {
        self.set_item_flag(id, flag, value).await
    }

    async fn list_items(&self, limit: usize) -> Result<Vec<Item>, StorageError> {
        self.get_items(limit).await
    }
}
