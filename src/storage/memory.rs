use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::store::{Flag, Store, ALL_ITEMS};
use super::types::{stored_precision, Feed, Item, StorageError};

/// In-memory [`Store`] used as the reference implementation in tests.
///
/// Rows live in an arena of id-keyed tables with secondary indexes for the
/// two uniqueness keys. A single mutex serialises writers, so every operation
/// is atomic. The lock is never held across an await point.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

#[derive(Debug, Default)]
struct Tables {
    last_id: i64,
    feeds: BTreeMap<i64, Feed>,
    items: BTreeMap<i64, Item>,
    feed_by_link: HashMap<String, i64>,
    item_by_key: HashMap<(i64, String), i64>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn upsert_item(&mut self, item: &Item) -> Item {
        let key = (item.feed_id, item.link.clone());
        if let Some(&id) = self.item_by_key.get(&key) {
            if let Some(existing) = self.items.get_mut(&id) {
                existing.title = item.title.clone();
                existing.publication_date = stored_precision(item.publication_date);
                return existing.clone();
            }
        }

        let stored = Item {
            id: self.next_id(),
            publication_date: stored_precision(item.publication_date),
            read: false,
            starred: false,
            ignored: false,
            ..item.clone()
        };
        self.item_by_key.insert(key, stored.id);
        self.items.insert(stored.id, stored.clone());
        stored
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        // A panic mid-operation cannot leave a half-applied write: every
        // mutation validates first and then applies infallibly.
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_feed(&self, feed: &Feed, items: &[Item]) -> Result<Feed, StorageError> {
        feed.validate()?;
        let staged: Vec<Item> = items
            .iter()
            .map(|item| {
                let mut item = item.clone();
                // Placeholder id; the real one is known once the feed is upserted.
                item.feed_id = i64::MAX;
                item.validate().map(|()| item)
            })
            .collect::<Result<_, _>>()?;

        let mut tables = self.lock();

        let existing = tables.feed_by_link.get(&feed.link).copied();
        let feed_id = match existing {
            Some(id) => id,
            None => {
                let id = tables.next_id();
                tables.feed_by_link.insert(feed.link.clone(), id);
                id
            }
        };
        let row = Feed {
            id: feed_id,
            items: Vec::new(),
            ..feed.clone()
        };
        tables.feeds.insert(feed_id, row.clone());

        let stored = staged
            .into_iter()
            .map(|mut item| {
                item.feed_id = feed_id;
                tables.upsert_item(&item)
            })
            .collect();

        tracing::debug!(feed_id = feed_id, link = %feed.link, "Feed upserted in memory");
        Ok(Feed {
            items: stored,
            ..row
        })
    }

    async fn create_item(&self, item: &Item) -> Result<Item, StorageError> {
        item.validate()?;
        let mut tables = self.lock();
        if !tables.feeds.contains_key(&item.feed_id) {
            return Err(StorageError::FeedNotFound {
                feed_id: item.feed_id,
            });
        }
        Ok(tables.upsert_item(item))
    }

    async fn remove_feed(&self, id: i64) -> Result<u64, StorageError> {
        let mut tables = self.lock();
        if let Some(feed) = tables.feeds.remove(&id) {
            tables.feed_by_link.remove(&feed.link);
        }

        let doomed: Vec<i64> = tables
            .items
            .values()
            .filter(|item| item.feed_id == id)
            .map(|item| item.id)
            .collect();
        for item_id in &doomed {
            if let Some(item) = tables.items.remove(item_id) {
                tables.item_by_key.remove(&(item.feed_id, item.link));
            }
        }
        Ok(doomed.len() as u64)
    }

    async fn get_item(&self, id: i64) -> Result<Item, StorageError> {
        self.lock()
            .items
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound { id })
    }

    async fn set_flag(&self, id: i64, flag: Flag, value: bool) -> Result<(), StorageError> {
        let mut tables = self.lock();
        let item = tables
            .items
            .get_mut(&id)
            .ok_or(StorageError::NotFound { id })?;
        match flag {
            Flag::Read => item.read = value,
            Flag::Starred => item.starred = value,
            Flag::Ignored => item.ignored = value,
        }
        Ok(())
    }

    async fn list_items(&self, limit: usize) -> Result<Vec<Item>, StorageError> {
        let mut items: Vec<Item> = self.lock().items.values().cloned().collect();
        items.sort_by(|a, b| {
            b.publication_date
                .cmp(&a.publication_date)
                .then(b.id.cmp(&a.id))
        });
        if limit != ALL_ITEMS {
            items.truncate(limit);
        }
        Ok(items)
    }
}
