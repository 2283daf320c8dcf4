//! Durable progress and failure ledgers.
//!
//! - [`ProgressLedger`]: the set of frontier URLs whose item has been
//!   persisted. Rewritten in full on every mark through a temp file and a
//!   rename, so a crash leaves either the old or the new set on disk.
//! - [`FailureLedger`]: append-only `error: url` lines for operator review.
//!   Never read back by the harvester.
//!
//! The progress ledger is the only authority on whether an entry is done.

use crate::error::LedgerError;
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

#[derive(Debug)]
pub struct ProgressLedger {
    path: PathBuf,
    urls: BTreeSet<String>,
}

impl ProgressLedger {
    /// Load the set of processed URLs.
    ///
    /// # Arguments
    ///
    /// * `path` - Location of `progress.json`; it need not exist yet
    ///
    /// # Returns
    ///
    /// A ledger holding every URL in the file, or an empty one when the file
    /// is missing or blank.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Io`] if the file cannot be read and
    /// [`LedgerError::Json`] if it is not a JSON array of strings. A corrupt
    /// ledger is never silently reset.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let raw = read_optional(&path).await?;
        let urls = if raw.trim().is_empty() {
            BTreeSet::new()
        } else {
            serde_json::from_str::<BTreeSet<String>>(&raw)
                .map_err(|e| LedgerError::json(&path, e))?
        };
        info!(processed = urls.len(), "Opened progress ledger");
        Ok(Self { path, urls })
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls.contains(url)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Record `url` as processed and persist the whole set.
    ///
    /// The file is replaced through a synced temp file and a rename. Marking
    /// a URL that is already present writes nothing.
    ///
    /// # Errors
    ///
    /// Any [`LedgerError`] from serializing or replacing the file. The mark
    /// is then rolled back in memory, so memory and disk still agree.
    pub async fn mark(&mut self, url: &str) -> Result<(), LedgerError> {
        if !self.urls.insert(url.to_string()) {
            return Ok(());
        }

        let result = match serde_json::to_vec_pretty(&self.urls) {
            Ok(bytes) => write_atomic(&self.path, &bytes).await,
            Err(e) => Err(LedgerError::json(&self.path, e)),
        };
        if result.is_err() {
            self.urls.remove(url);
        }
        result
    }
}

#[derive(Debug, Clone)]
pub struct FailureLedger {
    path: PathBuf,
}

impl FailureLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append one `error: url` line.
    ///
    /// # Arguments
    ///
    /// * `url` - The frontier URL that failed
    /// * `error` - Description of the failure; line breaks become spaces
    ///
    /// # Errors
    ///
    /// [`LedgerError::Io`] if the line cannot be appended and synced.
    pub async fn record(&self, url: &str, error: &str) -> Result<(), LedgerError> {
        let error = error.replace(['\r', '\n'], " ");
        let line = format!("{error}: {url}\n");
        append_durably(&self.path, line.as_bytes()).await?;
        debug!(%url, "Recorded failure");
        Ok(())
    }
}

/// Contents of `path`, or an empty string when it does not exist yet.
pub(crate) async fn read_optional(path: &Path) -> Result<String, LedgerError> {
    match fs::read_to_string(path).await {
        Ok(raw) => Ok(raw),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(LedgerError::io(path, e)),
    }
}

/// Append `bytes` and sync them before returning.
pub(crate) async fn append_durably(path: &Path, bytes: &[u8]) -> Result<(), LedgerError> {
    let io = |e| LedgerError::io(path, e);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(io)?;
    file.write_all(bytes).await.map_err(io)?;
    file.flush().await.map_err(io)?;
    file.sync_data().await.map_err(io)?;
    Ok(())
}

/// Replace `path` with `bytes` via a synced sibling temp file and a rename.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), LedgerError> {
    let tmp = temp_sibling(path);
    let io = |e| LedgerError::io(path, e);

    let mut file = fs::File::create(&tmp).await.map_err(io)?;
    file.write_all(bytes).await.map_err(io)?;
    file.flush().await.map_err(io)?;
    file.sync_all().await.map_err(io)?;
    drop(file);

    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(io(e));
    }
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("ledger"));
    name.push(".tmp");
    path.with_file_name(name)
}
