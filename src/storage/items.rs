use sqlx::{QueryBuilder, SqliteConnection};

use super::schema::Database;
use super::store::{Flag, ALL_ITEMS};
use super::types::{Item, ItemRow, StorageError};

/// Upsert one item on an open connection or transaction.
///
/// Conflicts on `(feed_id, link)` refresh title and publication date only; the
/// returned row carries the stored id and flags.
pub(crate) async fn upsert_item_row(
    conn: &mut SqliteConnection,
    item: &Item,
) -> Result<Item, StorageError> {
    let row = sqlx::query_as::<_, ItemRow>(
        r#"
        INSERT INTO items (feed_id, title, link, publication_date)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(feed_id, link) DO UPDATE SET
            title = excluded.title,
            publication_date = excluded.publication_date
        RETURNING id, feed_id, title, link, publication_date, read, ignored, starred
    "#,
    )
    .bind(item.feed_id)
    .bind(&item.title)
    .bind(&item.link)
    .bind(item.publication_date.timestamp_millis())
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
            StorageError::FeedNotFound {
                feed_id: item.feed_id,
            }
        }
        other => StorageError::from_sqlx(other),
    })?;

    Ok(row.into_item())
}

impl Database {
    // ========================================================================
    // Item Operations
    // ========================================================================

    /// Upsert a single item outside of feed ingestion.
    pub async fn upsert_item(&self, item: &Item) -> Result<Item, StorageError> {
        item.validate()?;
        let mut conn = self.pool.acquire().await.map_err(StorageError::from_sqlx)?;
        upsert_item_row(&mut conn, item).await
    }

    /// Get a single item by its ID.
    pub async fn get_item_by_id(&self, item_id: i64) -> Result<Option<Item>, StorageError> {
        let row = sqlx::query_as::<_, ItemRow>(
            r#"
            SELECT id, feed_id, title, link, publication_date, read, ignored, starred
            FROM items
            WHERE id = ?
        "#,
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ItemRow::into_item))
    }

    /// Items across all feeds, newest first. [`ALL_ITEMS`] returns every row.
    pub async fn get_items(&self, limit: usize) -> Result<Vec<Item>, StorageError> {
        let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
            r#"SELECT id, feed_id, title, link, publication_date, read, ignored, starred
               FROM items ORDER BY publication_date DESC, id DESC"#,
        );

        if limit != ALL_ITEMS {
            let safe_limit: i64 = limit.try_into().unwrap_or(i64::MAX);
            builder.push(" LIMIT ");
            builder.push_bind(safe_limit);
        }

        let rows: Vec<ItemRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(ItemRow::into_item).collect())
    }

    // ========================================================================
    // Item Mutations
    // ========================================================================

    /// Set one flag on one item (idempotent).
    ///
    /// Uses `RETURNING id` so a missing row is reported as `NotFound` while
    /// writing the value the row already has still counts as a match.
    pub async fn set_item_flag(
        &self,
        item_id: i64,
        flag: Flag,
        value: bool,
    ) -> Result<(), StorageError> {
        let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new("UPDATE items SET ");
        builder.push(flag.column());
        builder.push(" = ");
        builder.push_bind(value);
        builder.push(" WHERE id = ");
        builder.push_bind(item_id);
        builder.push(" RETURNING id");

        let updated: Option<i64> = builder
            .build_query_scalar()
            .fetch_optional(&self.pool)
            .await?;

        match updated {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound { id: item_id }),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, Feed, Flag, Item, StorageError, Store, ALL_ITEMS};
    use chrono::{Duration, TimeZone, Utc};

    async fn test_db_with_feed() -> (Database, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let feed = Feed::new("Test Feed", "A feed", "https://feed.example.com/", None).unwrap();
        let stored = db.create_feed(&feed, &[]).await.unwrap();
        (db, stored.id)
    }

    fn test_item(feed_id: i64, slug: &str, days_ago: i64) -> Item {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        Item::new(
            feed_id,
            &format!("Item {}", slug),
            &format!("https://example.com/{}", slug),
            Some(base - Duration::days(days_ago)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_upsert_item_insert() {
        let (db, feed_id) = test_db_with_feed().await;
        let stored = db.upsert_item(&test_item(feed_id, "1", 0)).await.unwrap();

        assert!(stored.id > 0);
        let fetched = db.get_item_by_id(stored.id).await.unwrap().unwrap();
        assert_eq!(fetched, stored);
    }

    #[tokio::test]
    async fn test_upsert_item_preserves_flags() {
        let (db, feed_id) = test_db_with_feed().await;
        let first = db.upsert_item(&test_item(feed_id, "1", 3)).await.unwrap();
        db.set_item_flag(first.id, Flag::Starred, true).await.unwrap();

        let mut newer = test_item(feed_id, "1", 0);
        newer.title = "Updated".to_string();
        let second = db.upsert_item(&newer).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.title, "Updated");
        assert_eq!(second.publication_date, newer.publication_date);
        assert!(second.starred, "Starred flag should survive the upsert");
    }

    #[tokio::test]
    async fn test_upsert_item_unknown_feed() {
        let (db, _) = test_db_with_feed().await;
        let err = db.upsert_item(&test_item(4242, "1", 0)).await.unwrap_err();
        assert!(matches!(err, StorageError::FeedNotFound { feed_id: 4242 }));
    }

    #[tokio::test]
    async fn test_publication_date_round_trips_to_millis() {
        let (db, feed_id) = test_db_with_feed().await;
        let mut item = test_item(feed_id, "1", 0);
        item.publication_date += Duration::milliseconds(123);

        let stored = db.upsert_item(&item).await.unwrap();
        let fetched = db.get_item_by_id(stored.id).await.unwrap().unwrap();
        assert_eq!(
            fetched.publication_date.timestamp_millis(),
            item.publication_date.timestamp_millis()
        );
    }

    #[tokio::test]
    async fn test_get_items_ordering_and_limit() {
        let (db, feed_id) = test_db_with_feed().await;
        for (slug, days_ago) in [("old", 5), ("new", 0), ("mid", 2)] {
            db.upsert_item(&test_item(feed_id, slug, days_ago))
                .await
                .unwrap();
        }

        let all = db.get_items(ALL_ITEMS).await.unwrap();
        let titles: Vec<&str> = all.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["Item new", "Item mid", "Item old"]);

        let capped = db.get_items(2).await.unwrap();
        assert_eq!(capped.len(), 2);
        assert_eq!(capped[0].title, "Item new");
    }

    #[tokio::test]
    async fn test_set_item_flag_each_column() {
        let (db, feed_id) = test_db_with_feed().await;
        let item = db.upsert_item(&test_item(feed_id, "1", 0)).await.unwrap();

        db.set_item_flag(item.id, Flag::Read, true).await.unwrap();
        db.set_item_flag(item.id, Flag::Ignored, true).await.unwrap();

        let fetched = db.get_item_by_id(item.id).await.unwrap().unwrap();
        assert!(fetched.read);
        assert!(fetched.ignored);
        assert!(!fetched.starred);
    }

    #[tokio::test]
    async fn test_set_item_flag_missing_row() {
        let (db, _) = test_db_with_feed().await;
        let err = db.set_item_flag(777, Flag::Read, true).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { id: 777 }));
    }
}
