use serde::Serialize;
use std::borrow::Cow;
use std::path::Path;
use thiserror::Error;

use super::decoder::{decode_bytes, DecodeError, DecoderOptions};
use super::fetcher::{fetch_feed, FetchError, FetchOptions};
use super::normalize::{normalize, Normalized, SkippedItem};
use super::repair::{escape_element_text, CONTENT_ENCODED_END, CONTENT_ENCODED_START};
use crate::storage::{Feed, StorageError, Store, ValidationError};
use crate::util::{validate_url, UrlPolicy, UrlValidationError};

/// Any failure that stops a feed from being ingested.
///
/// Nothing is persisted when one of these is returned.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid feed URL: {0}")]
    Url(#[from] UrlValidationError),

    #[error("failed to fetch feed: {0}")]
    Fetch(#[from] FetchError),

    #[error("failed to decode feed: {0}")]
    Decode(#[from] DecodeError),

    #[error("invalid feed: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// How a document is turned into stored rows.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    pub decoder: DecoderOptions,
    pub fetch: FetchOptions,
    /// Escape raw markup inside `<content:encoded>` before decoding.
    pub repair_content_encoded: bool,
    pub url_policy: UrlPolicy,
}

/// The stored feed (with ids and the persisted items) and the items left out.
#[derive(Debug, Clone, Serialize)]
pub struct Ingested {
    pub feed: Feed,
    pub skipped: Vec<SkippedItem>,
}

/// Escape `<content:encoded>` interiors. An unterminated pair fails the
/// document instead of handing a truncated feed to the decoder.
fn repair(bytes: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let text = std::str::from_utf8(bytes)?;
    let repaired = escape_element_text(text, CONTENT_ENCODED_START, CONTENT_ENCODED_END);
    if repaired.is_empty() && !text.is_empty() {
        return Err(DecodeError::UnmatchedTag {
            tag: CONTENT_ENCODED_START.to_string(),
        });
    }
    Ok(repaired.into_bytes())
}

/// Run a feed document through repair, decoding and normalization, then
/// persist it with a single [`Store::create_feed`] call.
pub async fn ingest_bytes<S>(
    store: &S,
    bytes: &[u8],
    options: &IngestOptions,
) -> Result<Ingested, IngestError>
where
    S: Store + ?Sized,
{
    let prepared: Cow<'_, [u8]> = if options.repair_content_encoded {
        Cow::Owned(repair(bytes)?)
    } else {
        Cow::Borrowed(bytes)
    };

    let channel = decode_bytes(&prepared, &options.decoder)?;
    let Normalized { feed, skipped } = normalize(&channel)?;

    let stored = store.create_feed(&feed, &feed.items).await?;

    tracing::info!(
        feed_id = stored.id,
        link = %stored.link,
        items = stored.items.len(),
        skipped = skipped.len(),
        "Feed ingested"
    );

    Ok(Ingested {
        feed: stored,
        skipped,
    })
}

/// Ingest a feed document stored on disk.
pub async fn ingest_file<S>(
    store: &S,
    path: impl AsRef<Path>,
    options: &IngestOptions,
) -> Result<Ingested, IngestError>
where
    S: Store + ?Sized,
{
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await.map_err(DecodeError::Io)?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "Loaded feed file");
    ingest_bytes(store, &bytes, options).await
}

/// Validate `url`, download it and ingest the body.
pub async fn ingest_url<S>(
    store: &S,
    client: &reqwest::Client,
    url: &str,
    options: &IngestOptions,
) -> Result<Ingested, IngestError>
where
    S: Store + ?Sized,
{
    let url = validate_url(url, options.url_policy)?;
    let bytes = fetch_feed(client, url.as_str(), &options.fetch).await?;
    ingest_bytes(store, &bytes, options).await
}
