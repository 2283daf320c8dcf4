//! The combined corpus: all artifacts in one JSON array.
//!
//! Rebuilt from scratch on every run from whatever artifacts exist. Items are
//! ordered by frontier index; gaps left by failed entries are simply absent.

use crate::error::LedgerError;
use crate::ledger::write_atomic;
use crate::models::Item;
use crate::outputs::artifacts::ArtifactStore;
use crate::utils::to_pretty_json;
use std::path::Path;
use tracing::{info, instrument, warn};

#[derive(Debug, Default)]
pub struct Corpus {
    pub items: Vec<Item>,
    /// Artifacts that could not be read or decoded.
    pub skipped: usize,
}

/// Collect every readable artifact, in index order.
#[instrument(level = "info", skip_all, fields(dir = %store.dir().display()))]
pub async fn combine(store: &ArtifactStore) -> Result<Corpus, LedgerError> {
    let mut corpus = Corpus::default();
    for (index, path) in store.list().await? {
        match store.read(&path).await {
            Ok(item) => corpus.items.push(item),
            Err(e) => {
                warn!(index, error = %e, "Skipping unreadable artifact");
                corpus.skipped += 1;
            }
        }
    }
    Ok(corpus)
}

/// Write the corpus as a single JSON array, replacing the previous one.
#[instrument(level = "info", skip(corpus), fields(path = %path.display()))]
pub async fn write_corpus(corpus: &Corpus, path: &Path) -> Result<(), LedgerError> {
    let bytes = to_pretty_json(&corpus.items).map_err(|e| LedgerError::json(path, e))?;
    write_atomic(path, &bytes).await?;
    info!(
        items = corpus.items.len(),
        skipped = corpus.skipped,
        "Wrote combined corpus"
    );
    Ok(())
}
