//! Configuration file parser for ~/.config/rssd/config.toml.
//!
//! The config file is optional: a missing or empty file yields
//! `Config::default()`. Unknown keys are accepted but logged as likely typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::{DecoderOptions, FetchOptions, IngestOptions};
use crate::util::UrlPolicy;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {size} bytes (max {max} bytes)")]
    TooLarge { size: u64, max: u64 },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file. Defaults to `rssd.db` in the config directory.
    pub database_path: Option<PathBuf>,

    /// Per-attempt HTTP timeout when fetching a feed.
    pub fetch_timeout_secs: u64,

    /// Largest feed body accepted, in bytes.
    pub max_feed_size: usize,

    /// Retries for rate-limited, failing or truncated downloads.
    pub max_retries: u32,

    /// `User-Agent` header sent with every request.
    pub user_agent: String,

    /// Escape raw markup inside `<content:encoded>` before decoding.
    pub repair_content_encoded: bool,

    /// Namespace URIs treated as the feed's own vocabulary.
    pub default_namespaces: Vec<String>,

    /// Allow feeds on localhost and private network addresses.
    pub allow_private_hosts: bool,

    /// Rows shown by `rssd items` when `--limit` is not given (0 = all).
    pub list_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            fetch_timeout_secs: 30,
            max_feed_size: crate::feed::fetcher::MAX_FEED_SIZE,
            max_retries: 3,
            user_agent: concat!("rssd/", env!("CARGO_PKG_VERSION")).to_string(),
            repair_content_encoded: true,
            default_namespaces: DecoderOptions::default().default_namespaces,
            allow_private_hosts: false,
            list_limit: 50,
        }
    }
}

const KNOWN_KEYS: &[&str] = &[
    "database_path",
    "fetch_timeout_secs",
    "max_feed_size",
    "max_retries",
    "user_agent",
    "repair_content_encoded",
    "default_namespaces",
    "allow_private_hosts",
    "list_limit",
];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge {
                    size: meta.len(),
                    max: Self::MAX_FILE_SIZE,
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        tracing::debug!(?config, "Loaded configuration");
        Ok(config)
    }

    /// Database location, relative to `config_dir` unless configured.
    pub fn database_path(&self, config_dir: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| config_dir.join("rssd.db"))
    }

    /// Pipeline settings derived from this configuration.
    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            decoder: DecoderOptions {
                default_namespaces: self.default_namespaces.clone(),
            },
            fetch: FetchOptions {
                timeout: Duration::from_secs(self.fetch_timeout_secs),
                max_size: self.max_feed_size,
                max_retries: self.max_retries,
                ..FetchOptions::default()
            },
            repair_content_encoded: self.repair_content_encoded,
            url_policy: UrlPolicy {
                allow_private_hosts: self.allow_private_hosts,
            },
        }
    }

    /// HTTP client carrying the configured user agent.
    pub fn http_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .user_agent(self.user_agent.as_str())
            .build()
    }
}

// ============================================================================
// Tests
// ============================================================================
