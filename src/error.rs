//! Typed errors for every stage of a harvest.
//!
//! Each enum maps onto one failure class of the crawl:
//!
//! | Type | Raised by | Handling |
//! |------|-----------|----------|
//! | [`FetchError`] | the fetch collaborator | recorded in the failure ledger, entry stays pending |
//! | [`ExtractError`] | field extraction | recorded in the failure ledger, no artifact written |
//! | [`SitemapError`] | sitemap walking | logged, that branch is skipped |
//! | [`LedgerError`] | frontier / progress / failure / artifact writes | aborts the single write |
//! | [`ConfigError`] | config loading | fatal at startup |

use std::path::PathBuf;
use thiserror::Error;

/// The fetch collaborator could not produce a usable response.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, TLS, timeout or body-read failure.
    #[error("transport error for {url}: {reason}")]
    Transport { url: String, reason: String },

    /// The server answered with a non-success status.
    #[error("HTTP status {status} for {url}")]
    Status { url: String, status: u16 },
}

impl FetchError {
    /// Whether a collaborator-level retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport { .. } => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
        }
    }

    /// The failure description without the URL, as written to the failure
    /// ledger next to the URL it belongs to.
    pub fn reason(&self) -> String {
        match self {
            FetchError::Transport { reason, .. } => reason.clone(),
            FetchError::Status { status, .. } => format!("HTTP status {status}"),
        }
    }
}

/// A fetched page did not yield a complete item.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Title or content missing")]
    MissingField,

    #[error("invalid selector `{selector}`: {reason}")]
    Selector { selector: String, reason: String },
}

/// A sitemap document could not be obtained or understood.
#[derive(Debug, Error)]
pub enum SitemapError {
    #[error("malformed sitemap {url}: {reason}")]
    Malformed { url: String, reason: String },

    #[error("could not fetch sitemap: {0}")]
    Fetch(#[from] FetchError),
}

/// Durable state could not be read or written.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error on {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl LedgerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LedgerError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        LedgerError::Json {
            path: path.into(),
            source,
        }
    }
}

/// The configuration file is unreadable or inconsistent.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid header `{name}`: {reason}")]
    Header { name: String, reason: String },

    #[error("no sitemap URL configured (use --sitemap or `sitemap_url`)")]
    MissingSitemap,
}
