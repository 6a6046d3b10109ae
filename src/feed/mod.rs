//! Feed ingestion: from raw bytes to stored rows.
//!
//! A document flows through four stages:
//!
//! - [`repair`] - optional pre-parse escaping of raw markup inside known tag pairs
//! - [`decoder`] - namespace-tolerant structural decoding into a [`Channel`]
//! - [`normalize`](mod@normalize) - validation into a [`Feed`](crate::storage::Feed),
//!   skipping bad items
//! - [`ingest`] - glue that runs the stages and persists through a
//!   [`Store`](crate::storage::Store)
//!
//! [`fetcher`] downloads documents over HTTP for [`ingest_url`].
//!
//! # Example
//!
//! ```ignore
//! use rssd::feed::{ingest_url, IngestOptions};
//! use rssd::storage::Database;
//!
//! let db = Database::open("rssd.db").await?;
//! let client = reqwest::Client::new();
//! let url = "https://example.com/feed.xml";
//! let ingested = ingest_url(&db, &client, url, &IngestOptions::default()).await?;
//! println!("{} items, {} skipped", ingested.feed.items.len(), ingested.skipped.len());
//! ```

pub mod decoder;
pub mod fetcher;
pub mod ingest;
pub mod normalize;
pub mod repair;

pub use decoder::{decode, decode_bytes, load_file, Channel, DecodeError, DecoderOptions, RawItem};
pub use fetcher::{fetch_feed, FetchError, FetchOptions};
pub use ingest::{ingest_bytes, ingest_file, ingest_url, IngestError, IngestOptions, Ingested};
pub use normalize::{normalize, Normalized, SkipReason, SkippedItem};
pub use repair::{
    escape_element_text, process_element_text, CONTENT_ENCODED_END, CONTENT_ENCODED_START,
};
