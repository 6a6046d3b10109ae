//! Behaviour every `Store` implementation must share.
//!
//! Each check is written once against `&dyn Store` and instantiated for both
//! the SQLite `Database` (on a scratch file) and the in-memory `MemoryStore`.

use chrono::{DateTime, Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use rssd::storage::{Feed, Flag, Item, StorageError, Store, ALL_ITEMS};
use std::sync::Arc;

fn base_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

fn feed(n: u32) -> Feed {
    Feed::new(
        &format!("Feed {}", n),
        "Contract test feed",
        &format!("https://feed{}.example.com/rss", n),
        None,
    )
    .unwrap()
}

fn draft(slug: &str, hours_ago: i64) -> Item {
    Item::draft(
        &format!("Item {}", slug),
        &format!("https://example.com/{}", slug),
        Some(base_date() - Duration::hours(hours_ago)),
    )
    .unwrap()
}

async fn create_feed_twice_keeps_one_row(store: &dyn Store) {
    let first = store.create_feed(&feed(1), &[draft("a", 1)]).await.unwrap();

    let mut renamed = feed(1);
    renamed.title = "Renamed".to_string();
    renamed.description = "New description".to_string();
    let second = store.create_feed(&renamed, &[draft("a", 1)]).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.title, "Renamed");
    assert_eq!(first.items[0].id, second.items[0].id);
    assert_eq!(store.list_items(ALL_ITEMS).await.unwrap().len(), 1);
}

async fn create_item_twice_updates_in_place(store: &dyn Store) {
    let stored = store.create_feed(&feed(1), &[]).await.unwrap();
    let original = Item::new(stored.id, "Original", "https://example.com/x", Some(base_date()))
        .unwrap();
    let first = store.create_item(&original).await.unwrap();
    store.star_item(first.id).await.unwrap();
    store.read_item(first.id).await.unwrap();

    let later = base_date() + Duration::days(1);
    let updated = Item::new(stored.id, "Updated", "https://example.com/x", Some(later)).unwrap();
    let second = store.create_item(&updated).await.unwrap();

    assert_eq!(first.id, second.id);
    let fetched = store.get_item(first.id).await.unwrap();
    assert_eq!(fetched.title, "Updated");
    assert_eq!(fetched.publication_date, later);
    assert!(fetched.starred && fetched.read && !fetched.ignored);
    assert_eq!(store.list_items(ALL_ITEMS).await.unwrap().len(), 1);
}

async fn reingesting_feed_keeps_flags(store: &dyn Store) {
    let stored = store.create_feed(&feed(1), &[draft("a", 2)]).await.unwrap();
    let item_id = stored.items[0].id;
    store.ignore_item(item_id).await.unwrap();

    let again = store
        .create_feed(&feed(1), &[draft("a", 0), draft("b", 1)])
        .await
        .unwrap();

    assert_eq!(again.items[0].id, item_id);
    assert!(again.items[0].ignored);
    assert!(!again.items[1].ignored);
}

async fn create_item_for_unknown_feed_fails(store: &dyn Store) {
    let orphan = Item::new(9999, "Orphan", "https://example.com/o", None).unwrap();
    let err = store.create_item(&orphan).await.unwrap_err();
    assert!(matches!(err, StorageError::FeedNotFound { feed_id: 9999 }));
}

async fn create_feed_is_atomic(store: &dyn Store) {
    let mut broken = draft("b", 0);
    broken.link = "   ".to_string();

    let err = store
        .create_feed(&feed(1), &[draft("a", 0), broken])
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::Validation(_)));
    assert!(store.list_items(ALL_ITEMS).await.unwrap().is_empty());
    // A later valid ingest must see a fresh feed, not a half-written one.
    let stored = store.create_feed(&feed(1), &[]).await.unwrap();
    assert!(stored.items.is_empty());
}

async fn remove_feed_deletes_its_items_only(store: &dyn Store) {
    let keep = store.create_feed(&feed(1), &[draft("k", 0)]).await.unwrap();
    let doomed = store
        .create_feed(&feed(2), &[draft("d1", 0), draft("d2", 1)])
        .await
        .unwrap();

    assert_eq!(store.remove_feed(doomed.id).await.unwrap(), 2);

    let remaining = store.list_items(ALL_ITEMS).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].feed_id, keep.id);
    for gone in &doomed.items {
        assert!(matches!(
            store.get_item(gone.id).await,
            Err(StorageError::NotFound { .. })
        ));
    }
}

async fn remove_unknown_feed_is_noop(store: &dyn Store) {
    assert_eq!(store.remove_feed(4242).await.unwrap(), 0);
    assert_eq!(store.remove_feed(4242).await.unwrap(), 0);
}

async fn list_items_sorted_and_capped(store: &dyn Store) {
    store
        .create_feed(&feed(1), &[draft("old", 48), draft("new", 0)])
        .await
        .unwrap();
    store
        .create_feed(&feed(2), &[draft("mid", 24), draft("older", 72)])
        .await
        .unwrap();

    let all = store.list_items(ALL_ITEMS).await.unwrap();
    let titles: Vec<&str> = all.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(titles, vec!["Item new", "Item mid", "Item old", "Item older"]);

    let two = store.list_items(2).await.unwrap();
    assert_eq!(two, all[..2].to_vec());

    let many = store.list_items(100).await.unwrap();
    assert_eq!(many.len(), 4);
}

async fn toggles_set_one_flag_idempotently(store: &dyn Store) {
    let stored = store
        .create_feed(&feed(1), &[draft("a", 0), draft("b", 1)])
        .await
        .unwrap();
    let (a, b) = (stored.items[0].id, stored.items[1].id);

    store.star_item(a).await.unwrap();
    store.star_item(a).await.unwrap();
    let starred = store.get_item(a).await.unwrap();
    assert!(starred.starred && !starred.read && !starred.ignored);
    assert!(!store.get_item(b).await.unwrap().starred);

    store.unstar_item(a).await.unwrap();
    store.unstar_item(a).await.unwrap();
    assert!(!store.get_item(a).await.unwrap().starred);

    store.read_item(b).await.unwrap();
    store.unread_item(b).await.unwrap();
    store.ignore_item(b).await.unwrap();
    store.unignore_item(b).await.unwrap();
    store.ignore_item(b).await.unwrap();
    let flags = store.get_item(b).await.unwrap();
    assert!(!flags.read && flags.ignored && !flags.starred);
}

async fn toggles_on_missing_item_fail(store: &dyn Store) {
    for result in [
        store.read_item(777).await,
        store.unread_item(777).await,
        store.star_item(777).await,
        store.unstar_item(777).await,
        store.ignore_item(777).await,
        store.unignore_item(777).await,
        store.set_flag(777, Flag::Read, true).await,
    ] {
        assert!(matches!(result, Err(StorageError::NotFound { id: 777 })));
    }
    assert!(matches!(
        store.get_item(777).await,
        Err(StorageError::NotFound { id: 777 })
    ));
}

async fn concurrent_create_feed_converges(store: Arc<dyn Store>) {
    let handles: Vec<_> = (0..8)
        .map(|n| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let mut f = feed(1);
                f.title = format!("Writer {}", n);
                store.create_feed(&f, &[draft("shared", 0)]).await
            })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        let stored = handle.await.unwrap().unwrap();
        ids.push((stored.id, stored.items[0].id));
    }

    ids.dedup();
    assert_eq!(ids.len(), 1, "every writer should land on the same rows");
    assert_eq!(store.list_items(ALL_ITEMS).await.unwrap().len(), 1);
}

macro_rules! store_contract {
    ($name:ident, $make:expr) => {
        mod $name {
            use super::*;

            #[tokio::test]
            async fn create_feed_twice_keeps_one_row() {
                let (store, _guard) = $make;
                super::create_feed_twice_keeps_one_row(&*store).await;
            }

            #[tokio::test]
            async fn create_item_twice_updates_in_place() {
                let (store, _guard) = $make;
                super::create_item_twice_updates_in_place(&*store).await;
            }

            #[tokio::test]
            async fn reingesting_feed_keeps_flags() {
                let (store, _guard) = $make;
                super::reingesting_feed_keeps_flags(&*store).await;
            }

            #[tokio::test]
            async fn create_item_for_unknown_feed_fails() {
                let (store, _guard) = $make;
                super::create_item_for_unknown_feed_fails(&*store).await;
            }

            #[tokio::test]
            async fn create_feed_is_atomic() {
                let (store, _guard) = $make;
                super::create_feed_is_atomic(&*store).await;
            }

            #[tokio::test]
            async fn remove_feed_deletes_its_items_only() {
                let (store, _guard) = $make;
                super::remove_feed_deletes_its_items_only(&*store).await;
            }

            #[tokio::test]
            async fn remove_unknown_feed_is_noop() {
                let (store, _guard) = $make;
                super::remove_unknown_feed_is_noop(&*store).await;
            }

            #[tokio::test]
            async fn list_items_sorted_and_capped() {
                let (store, _guard) = $make;
                super::list_items_sorted_and_capped(&*store).await;
            }

            #[tokio::test]
            async fn toggles_set_one_flag_idempotently() {
                let (store, _guard) = $make;
                super::toggles_set_one_flag_idempotently(&*store).await;
            }

            #[tokio::test]
            async fn toggles_on_missing_item_fail() {
                let (store, _guard) = $make;
                super::toggles_on_missing_item_fail(&*store).await;
            }

            #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
            async fn concurrent_create_feed_converges() {
                let (store, _guard) = $make;
                super::concurrent_create_feed_converges(store).await;
            }
        }
    };
}

async fn sqlite_store() -> (Arc<dyn Store>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("contract.db");
    let db = rssd::storage::Database::open(path.to_str().unwrap())
        .await
        .unwrap();
    (Arc::new(db), dir)
}

fn memory_store() -> (Arc<dyn Store>, ()) {
    (Arc::new(rssd::storage::MemoryStore::new()), ())
}

store_contract!(sqlite, sqlite_store().await);
store_contract!(memory, memory_store());
