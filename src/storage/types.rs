use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Required field names reported by [`ValidationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Title,
    Description,
    Link,
    FeedId,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Field::Title => "title",
            Field::Description => "description",
            Field::Link => "link",
            Field::FeedId => "feed_id",
        })
    }
}

/// A required field was empty or whitespace-only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field} is required")]
pub struct ValidationError {
    pub field: Field,
}

impl ValidationError {
    pub fn required(field: Field) -> Self {
        Self { field }
    }
}

/// Storage errors with user-friendly messages
#[derive(Debug, Error)]
pub enum StorageError {
    /// The targeted row does not exist
    #[error("item {id} not found")]
    NotFound { id: i64 },

    /// An item referenced a feed that does not exist
    #[error("feed {feed_id} not found")]
    FeedNotFound { feed_id: i64 },

    /// A row failed validation before it was written
    #[error("invalid row: {0}")]
    Validation(#[from] ValidationError),

    /// Another process holds the database lock
    #[error("Database is locked by another process. Please close it and try again.")]
    Locked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StorageError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        // SQLITE_CANTOPEN (14): unable to open database file
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return StorageError::Locked;
        }

        StorageError::Database(err)
    }
}

// ============================================================================
// Helper Types
// ============================================================================

/// Feed id carried by items that have not been persisted yet.
pub const UNASSIGNED_FEED: i64 = 0;

/// Row type for item queries (used by sqlx FromRow)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ItemRow {
    pub id: i64,
    pub feed_id: i64,
    pub title: String,
    pub link: String,
    pub publication_date: i64,
    pub read: bool,
    pub ignored: bool,
    pub starred: bool,
}

impl ItemRow {
    pub(crate) fn into_item(self) -> Item {
        Item {
            id: self.id,
            feed_id: self.feed_id,
            title: self.title,
            link: self.link,
            publication_date: DateTime::from_timestamp_millis(self.publication_date)
                .unwrap_or_default(),
            read: self.read,
            starred: self.starred,
            ignored: self.ignored,
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A subscribed source, unique by `link`.
///
/// `items` is only populated while a feed travels through ingestion; once
/// persisted, items live as their own rows keyed by `(feed_id, link)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feed {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub link: String,
    pub image: Option<String>,
    pub items: Vec<Item>,
}

impl Feed {
    /// Build a validated feed. Required fields are trimmed and must be non-empty;
    /// a blank image is treated as absent.
    pub fn new(
        title: &str,
        description: &str,
        link: &str,
        image: Option<&str>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            id: 0,
            title: required(title, Field::Title)?,
            description: required(description, Field::Description)?,
            link: required(link, Field::Link)?,
            image: image
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned),
            items: Vec::new(),
        })
    }

    /// Re-check the invariants a row must satisfy before it is written.
    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        required(&self.title, Field::Title)?;
        required(&self.description, Field::Description)?;
        required(&self.link, Field::Link)?;
        Ok(())
    }
}

/// One entry of a feed, unique by `(feed_id, link)`.
///
/// The `read`, `starred` and `ignored` flags only change through the store's
/// toggle operations; upserts leave them alone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub id: i64,
    pub feed_id: i64,
    pub title: String,
    pub link: String,
    pub publication_date: DateTime<Utc>,
    pub read: bool,
    pub starred: bool,
    pub ignored: bool,
}

/// Dates are persisted as Unix milliseconds; anything finer is dropped.
pub(crate) fn stored_precision(date: DateTime<Utc>) -> DateTime<Utc> {
    date.trunc_subsecs(3)
}

impl Item {
    /// Build a validated item for an existing feed.
    pub fn new(
        feed_id: i64,
        title: &str,
        link: &str,
        publication_date: Option<DateTime<Utc>>,
    ) -> Result<Self, ValidationError> {
        if feed_id == UNASSIGNED_FEED {
            return Err(ValidationError::required(Field::FeedId));
        }
        let mut item = Self::draft(title, link, publication_date)?;
        item.feed_id = feed_id;
        Ok(item)
    }

    /// Build an item whose feed has not been persisted yet.
    ///
    /// `feed_id` stays [`UNASSIGNED_FEED`] until the store assigns it.
    pub fn draft(
        title: &str,
        link: &str,
        publication_date: Option<DateTime<Utc>>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            id: 0,
            feed_id: UNASSIGNED_FEED,
            title: required(title, Field::Title)?,
            link: required(link, Field::Link)?,
            publication_date: stored_precision(
                publication_date
                    .filter(|date| date.timestamp_millis() != 0)
                    .unwrap_or_else(Utc::now),
            ),
            read: false,
            starred: false,
            ignored: false,
        })
    }

    /// Re-check the invariants a row must satisfy before it is written.
    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        if self.feed_id == UNASSIGNED_FEED {
            return Err(ValidationError::required(Field::FeedId));
        }
        required(&self.title, Field::Title)?;
        required(&self.link, Field::Link)?;
        Ok(())
    }
}

fn required(value: &str, field: Field) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::required(field));
    }
    Ok(trimmed.to_owned())
}
