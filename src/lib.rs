//! RSS ingestion and storage.
//!
//! Feeds are fetched or loaded, repaired, decoded and normalized by [`feed`],
//! then persisted idempotently through the [`storage::Store`] trait.

pub mod config;
pub mod feed;
pub mod storage;
pub mod util;
