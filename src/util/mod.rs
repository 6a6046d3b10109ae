//! Utility functions shared by the CLI and the ingest pipeline.
//!
//! - **URL validation**: scheme and host checks applied before a feed is
//!   fetched, so a subscription cannot be pointed at internal services.

mod url_validator;

pub use url_validator::{validate_url, UrlPolicy, UrlValidationError};
