//! Per-index item artifacts.
//!
//! Each persisted [`Item`] lives in `{index}.json`, where `index` is the
//! entry's frontier position. Writes go through a temp file and a rename, so
//! a re-run that overwrites an index never leaves a torn file behind.

use crate::error::LedgerError;
use crate::ledger::write_atomic;
use crate::models::Item;
use crate::utils::to_pretty_json;
use itertools::Itertools;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, instrument};

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{index}.json"))
    }

    /// Write the artifact for `index`, replacing any previous one.
    ///
    /// # Arguments
    ///
    /// * `index` - The entry's frontier index, which names the file
    /// * `item` - The extracted item, stored as pretty-printed JSON
    ///
    /// # Returns
    ///
    /// The path of the written `{index}.json`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Io`] if the directory cannot be created or the file
    /// cannot be replaced; no partial file is left at the final path.
    #[instrument(level = "debug", skip(self, item))]
    pub async fn write(&self, index: usize, item: &Item) -> Result<PathBuf, LedgerError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| LedgerError::io(&self.dir, e))?;

        let path = self.path_for(index);
        let bytes = to_pretty_json(item).map_err(|e| LedgerError::json(&path, e))?;
        write_atomic(&path, &bytes).await?;
        debug!(path = %path.display(), "Saved artifact");
        Ok(path)
    }

    /// Read one artifact back.
    pub async fn read(&self, path: &Path) -> Result<Item, LedgerError> {
        let raw = fs::read(path)
            .await
            .map_err(|e| LedgerError::io(path, e))?;
        serde_json::from_slice(&raw).map_err(|e| LedgerError::json(path, e))
    }

    /// All `{index}.json` files present, sorted by index.
    ///
    /// A missing directory lists as empty.
    ///
    /// Files whose stem is not an index (temp files, stray notes) are ignored.
    pub async fn list(&self) -> Result<Vec<(usize, PathBuf)>, LedgerError> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(LedgerError::io(&self.dir, e)),
        };

        let mut found = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| LedgerError::io(&self.dir, e))?
        {
            let path = entry.path();
            if let Some(index) = artifact_index(&path) {
                found.push((index, path));
            }
        }
        Ok(found.into_iter().sorted_by_key(|(index, _)| *index).collect())
    }
}

fn artifact_index(path: &Path) -> Option<usize> {
    if path.extension()? != "json" {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}
