use sqlx::SqliteConnection;

use super::items::upsert_item_row;
use super::schema::Database;
use super::types::{Feed, Item, StorageError};

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Upsert a feed and its items in a single transaction.
    ///
    /// The feed row is keyed by `link`: a conflict refreshes title, description
    /// and icon but keeps the id. Items are then upserted against that id. If
    /// any item fails the transaction is rolled back, feed write included.
    pub async fn upsert_feed_with_items(
        &self,
        feed: &Feed,
        items: &[Item],
    ) -> Result<Feed, StorageError> {
        feed.validate()?;

        let mut tx = self.pool.begin().await.map_err(StorageError::from_sqlx)?;

        let (feed_id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO feeds (title, description, link, icon)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(link) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                icon = excluded.icon
            RETURNING id
        "#,
        )
        .bind(&feed.title)
        .bind(&feed.description)
        .bind(&feed.link)
        .bind(&feed.image)
        .fetch_one(&mut *tx)
        .await
        .map_err(StorageError::from_sqlx)?;

        let stored = match upsert_items(&mut tx, feed_id, items).await {
            Ok(stored) => stored,
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(
                        error = %rollback_err,
                        "Rollback after failed feed upsert failed"
                    );
                }
                return Err(e);
            }
        };

        tx.commit().await.map_err(StorageError::from_sqlx)?;

        tracing::debug!(
            feed_id = feed_id,
            link = %feed.link,
            items = stored.len(),
            "Feed upserted"
        );

        Ok(Feed {
            id: feed_id,
            title: feed.title.clone(),
            description: feed.description.clone(),
            link: feed.link.clone(),
            image: feed.image.clone(),
            items: stored,
        })
    }

    /// Delete a feed and its items, returns the number of items removed.
    ///
    /// Deleting an unknown id removes nothing and succeeds.
    pub async fn delete_feed(&self, feed_id: i64) -> Result<u64, StorageError> {
        let mut tx = self.pool.begin().await.map_err(StorageError::from_sqlx)?;

        let removed = sqlx::query("DELETE FROM items WHERE feed_id = ?")
            .bind(feed_id)
            .execute(&mut *tx)
            .await
            .map_err(StorageError::from_sqlx)?
            .rows_affected();

        sqlx::query("DELETE FROM feeds WHERE id = ?")
            .bind(feed_id)
            .execute(&mut *tx)
            .await
            .map_err(StorageError::from_sqlx)?;

        tx.commit().await.map_err(StorageError::from_sqlx)?;

        tracing::debug!(feed_id = feed_id, removed = removed, "Feed removed");
        Ok(removed)
    }
}

async fn upsert_items(
    conn: &mut SqliteConnection,
    feed_id: i64,
    items: &[Item],
) -> Result<Vec<Item>, StorageError> {
    let mut stored = Vec::with_capacity(items.len());
    for item in items {
        let mut item = item.clone();
        item.feed_id = feed_id;
        item.validate()?;
        stored.push(upsert_item_row(conn, &item).await?);
    }
    Ok(stored)
}
