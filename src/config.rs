//! Harvest configuration and on-disk layout.
//!
//! Settings come from an optional YAML file; every field has a default so an
//! empty file (or no file at all) is valid. CLI flags override the file.
//!
//! ```yaml
//! sitemap_url: https://www.cairo360.com/ar/sitemap.xml
//! sitemap_marker: article-sitemap
//! skip_leading_urls: 1
//! title_selector: h2.media-heading
//! content_selector: .article-inner-content
//! headers:
//!   Accept-Language: en-US,en;q=0.5
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Root sitemap index.
    pub sitemap_url: Option<String>,

    /// Case-sensitive substring a child sitemap's `<loc>` must contain.
    pub sitemap_marker: String,

    /// Number of `<url>` entries dropped from the head of every child sitemap.
    pub skip_leading_urls: usize,

    pub title_selector: String,
    pub content_selector: String,

    /// Default request headers sent with every fetch.
    pub headers: BTreeMap<String, String>,

    pub max_retries: usize,
    pub retry_base_delay_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            sitemap_url: None,
            sitemap_marker: "article-sitemap".to_string(),
            skip_leading_urls: 1,
            title_selector: "h2.media-heading".to_string(),
            content_selector: ".article-inner-content".to_string(),
            headers: default_headers(),
            max_retries: 2,
            retry_base_delay_ms: 1000,
            request_timeout_secs: 30,
        }
    }
}

/// Browser-like request headers.
///
/// `Host`, `Connection` and `Accept-Encoding` are left to reqwest: the client
/// derives the first two per request, and it is built without decompression
/// support, so advertising compressed encodings would yield unreadable bodies.
fn default_headers() -> BTreeMap<String, String> {
    [
        (
            "User-Agent",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:127.0) Gecko/20100101 Firefox/127.0",
        ),
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
        ("Accept-Language", "en-US,en;q=0.5"),
        ("Cookie", "wp-wpml_current_language=ar"),
        ("Upgrade-Insecure-Requests", "1"),
        ("Sec-Fetch-Dest", "document"),
        ("Sec-Fetch-Mode", "navigate"),
        ("Sec-Fetch-Site", "cross-site"),
        ("DNT", "1"),
        ("Sec-GPC", "1"),
        ("Priority", "u=1"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl CrawlConfig {
    /// Load from `path`, or fall back to defaults when no path is given.
    #[instrument(level = "info")]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&raw).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }
}

/// Where each piece of durable state lives under the data directory.
#[derive(Debug, Clone)]
pub struct Layout {
    pub root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn frontier(&self) -> PathBuf {
        self.root.join("article_urls.txt")
    }

    pub fn discarded(&self) -> PathBuf {
        self.root.join("discarded_urls.txt")
    }

    pub fn progress(&self) -> PathBuf {
        self.root.join("progress.json")
    }

    pub fn artifacts(&self) -> PathBuf {
        self.root.join("articles")
    }

    pub fn failures(&self) -> PathBuf {
        self.root.join("failures.txt")
    }

    pub fn corpus(&self) -> PathBuf {
        self.root.join("all_articles.json")
    }
}
