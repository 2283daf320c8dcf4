//! URL validation and the durable frontier.
//!
//! The frontier is a newline-delimited file of accepted URLs. A URL's line
//! number is its frontier index, so the file is only ever appended to and
//! indices never shift between runs. Rejected candidates go to a separate
//! `reason: url` file for auditing.
//!
//! The in-memory `known` set mirrors the frontier file and is extended only
//! after an append has been synced to disk.

use crate::error::LedgerError;
use crate::ledger::{append_durably, read_optional};
use crate::models::{Candidate, DiscardReason, FrontierEntry};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};
use url::Url;

/// Outcome of validating a single candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept(String),
    Discard(DiscardReason),
}

/// Classify a candidate against the URLs already known.
///
/// First matching rule wins:
/// - missing or blank is `Null`
/// - inner whitespace or control characters, no scheme or no host is `Invalid`
/// - already known is `Duplicate`
/// - anything else is accepted, trimmed
///
/// # Arguments
///
/// * `candidate` - Raw `<loc>` text, `None` when the element was absent
/// * `is_known` - Membership test over the frontier (and the current batch)
///
/// # Returns
///
/// The [`Verdict`]; an accepted URL is exactly the string that gets stored.
pub fn validate(candidate: Option<&str>, is_known: impl Fn(&str) -> bool) -> Verdict {
    let raw = match candidate.map(str::trim) {
        None | Some("") => return Verdict::Discard(DiscardReason::Null),
        Some(raw) => raw,
    };

    // `Url::parse` silently strips tabs and newlines, but the frontier is
    // line-delimited and stores the raw string.
    if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Verdict::Discard(DiscardReason::Invalid);
    }

    match Url::parse(raw) {
        Ok(parsed) if parsed.has_host() => {}
        _ => return Verdict::Discard(DiscardReason::Invalid),
    }

    if is_known(raw) {
        return Verdict::Discard(DiscardReason::Duplicate);
    }
    Verdict::Accept(raw.to_string())
}

/// Tally of one or more [`FrontierStore::ingest`] calls.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub accepted: usize,
    pub null: usize,
    pub invalid: usize,
    pub duplicate: usize,
}

impl IngestReport {
    fn discard(&mut self, reason: DiscardReason) {
        match reason {
            DiscardReason::Null => self.null += 1,
            DiscardReason::Invalid => self.invalid += 1,
            DiscardReason::Duplicate => self.duplicate += 1,
        }
    }

    pub fn merge(&mut self, other: IngestReport) {
        self.accepted += other.accepted;
        self.null += other.null;
        self.invalid += other.invalid;
        self.duplicate += other.duplicate;
    }

    pub fn total(&self) -> usize {
        self.accepted + self.null + self.invalid + self.duplicate
    }
}

#[derive(Debug)]
pub struct FrontierStore {
    frontier_path: PathBuf,
    discarded_path: PathBuf,
    known: HashSet<String>,
    lines: usize,
    torn_tail: bool,
}

impl FrontierStore {
    /// Open the frontier, loading every URL already in it.
    ///
    /// # Arguments
    ///
    /// * `frontier_path` - The line-delimited URL file; it need not exist yet
    /// * `discarded_path` - Where rejected candidates are appended
    ///
    /// # Errors
    ///
    /// [`LedgerError::Io`] if an existing frontier file cannot be read.
    #[instrument(level = "info", skip_all, fields(path = %frontier_path.as_ref().display()))]
    pub async fn open(
        frontier_path: impl AsRef<Path>,
        discarded_path: impl AsRef<Path>,
    ) -> Result<Self, LedgerError> {
        let frontier_path = frontier_path.as_ref().to_path_buf();
        let raw = read_optional(&frontier_path).await?;
        let entries = parse_entries(&raw);
        let known: HashSet<String> = entries.iter().map(|e| e.url.clone()).collect();
        info!(entries = known.len(), "Opened frontier");

        Ok(Self {
            lines: raw.lines().count(),
            torn_tail: !raw.is_empty() && !raw.ends_with('\n'),
            frontier_path,
            discarded_path: discarded_path.as_ref().to_path_buf(),
            known,
        })
    }

    #[cfg(test)]
    pub fn contains(&self, url: &str) -> bool {
        self.known.contains(url)
    }

    /// Number of URLs in the frontier.
    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Durably append already-validated URLs.
    ///
    /// All of `urls` go out in a single write followed by a sync. A torn last
    /// line left by an earlier crash is terminated first.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Io`] on a failed write or sync. The known set is only
    /// extended after success, so on error the store is unchanged in memory.
    pub async fn append(&mut self, urls: &[String]) -> Result<(), LedgerError> {
        if urls.is_empty() {
            return Ok(());
        }

        let mut buf = String::new();
        if self.torn_tail {
            buf.push('\n');
        }
        for url in urls {
            buf.push_str(url);
            buf.push('\n');
        }
        append_durably(&self.frontier_path, buf.as_bytes()).await?;

        self.torn_tail = false;
        self.lines += urls.len();
        self.known.extend(urls.iter().cloned());
        debug!(appended = urls.len(), lines = self.lines, "Appended to frontier");
        Ok(())
    }

    /// Validate a batch of candidates, append the accepted ones and record
    /// the rest in the discarded file.
    ///
    /// Duplicates are detected against the frontier and against earlier
    /// candidates of the same batch.
    ///
    /// # Returns
    ///
    /// Per-rule counts for the batch.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Io`] if either file cannot be appended. Accepted URLs
    /// are written before the discarded records.
    pub async fn ingest(&mut self, candidates: Vec<Candidate>) -> Result<IngestReport, LedgerError> {
        let mut report = IngestReport::default();
        let mut staged: Vec<String> = Vec::new();
        let mut staged_set: HashSet<String> = HashSet::new();
        let mut discarded = String::new();

        for candidate in &candidates {
            let verdict = validate(candidate.as_deref(), |url| {
                self.known.contains(url) || staged_set.contains(url)
            });
            match verdict {
                Verdict::Accept(url) => {
                    staged_set.insert(url.clone());
                    staged.push(url);
                }
                Verdict::Discard(reason) => {
                    report.discard(reason);
                    let raw = single_line(candidate.as_deref().unwrap_or_default());
                    discarded.push_str(&format!("{reason}: {raw}\n"));
                }
            }
        }

        self.append(&staged).await?;
        report.accepted = staged.len();

        if !discarded.is_empty() {
            append_durably(&self.discarded_path, discarded.as_bytes()).await?;
        }
        Ok(report)
    }

    /// The full frontier in stored order.
    #[cfg(test)]
    pub async fn entries(&self) -> Result<Vec<FrontierEntry>, LedgerError> {
        load(&self.frontier_path).await
    }
}

/// Re-read a frontier file from the start.
///
/// # Returns
///
/// Every non-blank line as a [`FrontierEntry`] whose index is its zero-based
/// line number, in file order. A missing file is an empty frontier.
///
/// # Errors
///
/// [`LedgerError::Io`] if the file exists but cannot be read.
pub async fn load(path: impl AsRef<Path>) -> Result<Vec<FrontierEntry>, LedgerError> {
    let raw = read_optional(path.as_ref()).await?;
    Ok(parse_entries(&raw))
}

/// Escape control characters so a raw candidate occupies one record line.
fn single_line(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_control() {
            out.extend(c.escape_default());
        } else {
            out.push(c);
        }
    }
    out
}

fn parse_entries(raw: &str) -> Vec<FrontierEntry> {
    raw.lines()
        .enumerate()
        .filter_map(|(index, line)| {
            let url = line.trim();
            (!url.is_empty()).then(|| FrontierEntry {
                index,
                url: url.to_string(),
            })
        })
        .collect()
}
