//! The fetch → extract → persist loop over the frontier.
//!
//! Fetches run concurrently through `buffer_unordered` and complete in any
//! order. Their outcomes are fanned back into this single loop, which is the
//! only writer of the artifact store and both ledgers, so ledger
//! read-modify-write cycles never interleave.
//!
//! Per entry:
//! 1. fetch; a failure is written to the failure ledger and the entry stays pending
//! 2. extract title and content; a missing field is a failure, nothing is written
//! 3. write the artifact for the entry's frontier index
//! 4. mark the frontier URL in the progress ledger
//! 5. hand the item to the caller
//!
//! Step 3 always precedes step 4: a crash in between leaves the URL pending,
//! and the retry overwrites the same `{index}.json`.

use crate::extract::Extractor;
use crate::fetch::Fetcher;
use crate::ledger::{FailureLedger, ProgressLedger};
use crate::models::{FrontierEntry, Item};
use crate::outputs::artifacts::ArtifactStore;
use crate::utils::truncate_for_log;
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, instrument, warn};

/// Counters for one harvest pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HarvestReport {
    /// Entries already in the progress ledger.
    pub skipped: usize,
    pub dispatched: usize,
    pub succeeded: usize,
    /// Fetch or extraction failures, each recorded in the failure ledger.
    pub failed: usize,
    /// Items whose artifact or progress write failed.
    pub ledger_errors: usize,
}

enum Outcome {
    Extracted(FrontierEntry, Item),
    Failed(FrontierEntry, String),
}

pub struct Harvester<'a, F> {
    fetcher: &'a F,
    extractor: &'a Extractor,
    artifacts: &'a ArtifactStore,
    concurrency: usize,
}

impl<'a, F> Harvester<'a, F>
where
    F: Fetcher,
{
    pub fn new(
        fetcher: &'a F,
        extractor: &'a Extractor,
        artifacts: &'a ArtifactStore,
        concurrency: usize,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            artifacts,
            concurrency: concurrency.max(1),
        }
    }

    /// Process every entry not yet in `progress`, at most `limit` of them.
    ///
    /// Per-entry problems are logged and counted, never returned.
    #[instrument(level = "info", skip_all, fields(entries = entries.len()))]
    pub async fn run(
        &self,
        entries: Vec<FrontierEntry>,
        progress: &mut ProgressLedger,
        failures: &FailureLedger,
        limit: Option<usize>,
        mut emit: impl FnMut(&FrontierEntry, &Item),
    ) -> HarvestReport {
        let mut report = HarvestReport::default();

        let total = entries.len();
        let pending: Vec<FrontierEntry> = entries
            .into_iter()
            .filter(|entry| !progress.contains(&entry.url))
            .collect();
        report.skipped = total - pending.len();

        let batch: Vec<FrontierEntry> = pending
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .collect();
        report.dispatched = batch.len();
        info!(
            total,
            skipped = report.skipped,
            dispatching = report.dispatched,
            concurrency = self.concurrency,
            "Starting harvest"
        );

        let mut outcomes = stream::iter(batch)
            .map(|entry| self.process(entry))
            .buffer_unordered(self.concurrency);

        while let Some(outcome) = outcomes.next().await {
            match outcome {
                Outcome::Extracted(entry, item) => {
                    if let Err(e) = self.artifacts.write(entry.index, &item).await {
                        error!(index = entry.index, url = %entry.url, error = %e, "Failed to save artifact");
                        report.ledger_errors += 1;
                        continue;
                    }
                    if let Err(e) = progress.mark(&entry.url).await {
                        error!(index = entry.index, url = %entry.url, error = %e, "Failed to update progress ledger");
                        report.ledger_errors += 1;
                        continue;
                    }
                    info!(index = entry.index, url = %item.url, "Processed article");
                    report.succeeded += 1;
                    emit(&entry, &item);
                }
                Outcome::Failed(entry, reason) => {
                    warn!(index = entry.index, url = %entry.url, error = %reason, "Article failed");
                    report.failed += 1;
                    if let Err(e) = failures.record(&entry.url, &reason).await {
                        error!(url = %entry.url, error = %e, "Failed to record failure");
                        report.ledger_errors += 1;
                    }
                }
            }
        }

        info!(
            dispatched = report.dispatched,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            ledger_errors = report.ledger_errors,
            processed = progress.len(),
            "Harvest complete"
        );
        report
    }

    async fn process(&self, entry: FrontierEntry) -> Outcome {
        let page = match self.fetcher.fetch(&entry.url).await {
            Ok(page) => page,
            Err(e) => return Outcome::Failed(entry, e.reason()),
        };

        match self.extractor.extract(&page.final_url, &page.body) {
            Ok(item) => {
                debug!(
                    index = entry.index,
                    title = %item.title,
                    content = %truncate_for_log(&item.content, 120),
                    "Extracted article"
                );
                Outcome::Extracted(entry, item)
            }
            Err(e) => Outcome::Failed(entry, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::StubFetcher;
    use crate::frontier;
    use std::path::Path;
    use tempfile::TempDir;

    fn article(title: &str, body: &str) -> String {
        format!(
            r#"<html><body><h2 class="media-heading">{title}</h2>
            <div class="article-inner-content"><p>{body}</p></div></body></html>"#
        )
    }

    fn extractor() -> Extractor {
        Extractor::new("h2.media-heading", ".article-inner-content").unwrap()
    }

    fn entries(urls: &[&str]) -> Vec<FrontierEntry> {
        urls.iter()
            .enumerate()
            .map(|(index, url)| FrontierEntry {
                index,
                url: url.to_string(),
            })
            .collect()
    }

    fn artifact_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .map(|rd| {
                rd.map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    struct Fixture {
        dir: TempDir,
        artifacts: ArtifactStore,
        failures: FailureLedger,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let artifacts = ArtifactStore::new(dir.path().join("articles"));
            let failures = FailureLedger::new(dir.path().join("failures.txt"));
            Self {
                dir,
                artifacts,
                failures,
            }
        }

        async fn progress(&self) -> ProgressLedger {
            ProgressLedger::open(self.dir.path().join("progress.json"))
                .await
                .unwrap()
        }

        fn failure_lines(&self) -> Vec<String> {
            std::fs::read_to_string(self.dir.path().join("failures.txt"))
                .unwrap_or_default()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    #[tokio::test]
    async fn test_success_and_transport_failure() {
        let fx = Fixture::new();
        let fetcher = StubFetcher::new()
            .page("https://x/a", &article("A", "Alpha"))
            .fail("https://x/b", "operation timed out");
        let extractor = extractor();
        let harvester = Harvester::new(&fetcher, &extractor, &fx.artifacts, 4);
        let mut progress = fx.progress().await;
        let mut emitted = Vec::new();

        let report = harvester
            .run(
                entries(&["https://x/a", "https://x/b"]),
                &mut progress,
                &fx.failures,
                None,
                |entry, item| emitted.push((entry.index, item.clone())),
            )
            .await;

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(artifact_names(fx.artifacts.dir()), vec!["0.json"]);
        assert!(progress.contains("https://x/a"));
        assert!(!progress.contains("https://x/b"));

        assert_eq!(
            fx.failure_lines(),
            vec!["operation timed out: https://x/b".to_string()]
        );

        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].0, 0);
        assert_eq!(emitted[0].1.title, "A");
    }

    #[tokio::test]
    async fn test_missing_field_writes_nothing() {
        let fx = Fixture::new();
        let fetcher = StubFetcher::new().page("https://x/a", "<html><h2>no class</h2></html>");
        let extractor = extractor();
        let harvester = Harvester::new(&fetcher, &extractor, &fx.artifacts, 1);
        let mut progress = fx.progress().await;

        let report = harvester
            .run(entries(&["https://x/a"]), &mut progress, &fx.failures, None, |_, _| {})
            .await;

        assert_eq!(report.failed, 1);
        assert!(artifact_names(fx.artifacts.dir()).is_empty());
        assert!(progress.is_empty());
        assert_eq!(
            fx.failure_lines(),
            vec!["Title or content missing: https://x/a".to_string()]
        );
    }

    #[tokio::test]
    async fn test_http_status_failure_line_names_url_once() {
        let fx = Fixture::new();
        let fetcher = StubFetcher::new();
        let extractor = extractor();
        let harvester = Harvester::new(&fetcher, &extractor, &fx.artifacts, 1);
        let mut progress = fx.progress().await;

        harvester
            .run(entries(&["https://x/gone"]), &mut progress, &fx.failures, None, |_, _| {})
            .await;

        assert_eq!(
            fx.failure_lines(),
            vec!["HTTP status 404: https://x/gone".to_string()]
        );
    }

    #[tokio::test]
    async fn test_artifact_write_failure_leaves_url_pending() {
        let fx = Fixture::new();
        // A regular file where the artifacts directory should be.
        std::fs::write(fx.artifacts.dir(), "not a directory").unwrap();

        let fetcher = StubFetcher::new().page("https://x/a", &article("A", "Alpha"));
        let extractor = extractor();
        let harvester = Harvester::new(&fetcher, &extractor, &fx.artifacts, 1);
        let mut progress = fx.progress().await;
        let mut emitted = 0;

        let report = harvester
            .run(entries(&["https://x/a"]), &mut progress, &fx.failures, None, |_, _| {
                emitted += 1
            })
            .await;

        assert_eq!(report.ledger_errors, 1);
        assert_eq!(report.succeeded, 0);
        assert_eq!(emitted, 0);
        assert!(progress.is_empty());
        assert!(!fx.dir.path().join("progress.json").exists());
        assert!(fx.failure_lines().is_empty());

        // The next run retries the entry once the directory is usable.
        std::fs::remove_file(fx.artifacts.dir()).unwrap();
        let mut progress = fx.progress().await;
        let report = harvester
            .run(entries(&["https://x/a"]), &mut progress, &fx.failures, None, |_, _| {})
            .await;
        assert_eq!(report.succeeded, 1);
        assert!(progress.contains("https://x/a"));
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let fx = Fixture::new();
        let fetcher = StubFetcher::new()
            .page("https://x/a", &article("A", "Alpha"))
            .page("https://x/b", &article("B", "Beta"));
        let extractor = extractor();
        let harvester = Harvester::new(&fetcher, &extractor, &fx.artifacts, 2);
        let frontier = entries(&["https://x/a", "https://x/b"]);

        let mut progress = fx.progress().await;
        harvester
            .run(frontier.clone(), &mut progress, &fx.failures, None, |_, _| {})
            .await;
        let progress_before = std::fs::read(fx.dir.path().join("progress.json")).unwrap();
        let calls_before = fetcher.calls().len();

        let mut progress = fx.progress().await;
        let report = harvester
            .run(frontier, &mut progress, &fx.failures, None, |_, _| {})
            .await;

        assert_eq!(report.skipped, 2);
        assert_eq!(report.dispatched, 0);
        assert_eq!(fetcher.calls().len(), calls_before);
        assert_eq!(
            std::fs::read(fx.dir.path().join("progress.json")).unwrap(),
            progress_before
        );
        assert_eq!(artifact_names(fx.artifacts.dir()), vec!["0.json", "1.json"]);
        assert!(fx.failure_lines().is_empty());
    }

    #[tokio::test]
    async fn test_resume_overwrites_unmarked_artifact() {
        let fx = Fixture::new();
        // Simulate a crash after the artifact write but before the mark.
        fx.artifacts
            .write(
                0,
                &Item {
                    url: "https://x/a".into(),
                    title: "Stale".into(),
                    content: "Stale".into(),
                },
            )
            .await
            .unwrap();

        let fetcher = StubFetcher::new().page("https://x/a", &article("Fresh", "Body"));
        let extractor = extractor();
        let harvester = Harvester::new(&fetcher, &extractor, &fx.artifacts, 1);
        let mut progress = fx.progress().await;
        harvester
            .run(entries(&["https://x/a"]), &mut progress, &fx.failures, None, |_, _| {})
            .await;

        assert_eq!(artifact_names(fx.artifacts.dir()), vec!["0.json"]);
        let item = fx
            .artifacts
            .read(&fx.artifacts.path_for(0))
            .await
            .unwrap();
        assert_eq!(item.title, "Fresh");
        assert!(progress.contains("https://x/a"));
    }

    #[tokio::test]
    async fn test_indices_come_from_the_frontier_file() {
        let fx = Fixture::new();
        let frontier_path = fx.dir.path().join("article_urls.txt");
        std::fs::write(&frontier_path, "https://x/a\nhttps://x/b\nhttps://x/c\n").unwrap();
        std::fs::write(
            fx.dir.path().join("progress.json"),
            r#"["https://x/a", "https://x/b"]"#,
        )
        .unwrap();

        let fetcher = StubFetcher::new().page("https://x/c", &article("C", "Gamma"));
        let extractor = extractor();
        let harvester = Harvester::new(&fetcher, &extractor, &fx.artifacts, 1);
        let mut progress = fx.progress().await;
        let report = harvester
            .run(
                frontier::load(&frontier_path).await.unwrap(),
                &mut progress,
                &fx.failures,
                None,
                |_, _| {},
            )
            .await;

        assert_eq!(report.succeeded, 1);
        assert_eq!(artifact_names(fx.artifacts.dir()), vec!["2.json"]);
        assert_eq!(fetcher.calls(), vec!["https://x/c".to_string()]);
    }

    #[tokio::test]
    async fn test_limit_caps_dispatch() {
        let fx = Fixture::new();
        let fetcher = StubFetcher::new()
            .page("https://x/a", &article("A", "Alpha"))
            .page("https://x/b", &article("B", "Beta"))
            .page("https://x/c", &article("C", "Gamma"));
        let extractor = extractor();
        let harvester = Harvester::new(&fetcher, &extractor, &fx.artifacts, 3);
        let mut progress = fx.progress().await;

        let report = harvester
            .run(
                entries(&["https://x/a", "https://x/b", "https://x/c"]),
                &mut progress,
                &fx.failures,
                Some(2),
                |_, _| {},
            )
            .await;

        assert_eq!(report.dispatched, 2);
        assert_eq!(progress.len(), 2);
        assert!(!progress.contains("https://x/c"));
    }

    #[tokio::test]
    async fn test_repeated_failures_are_appended() {
        let fx = Fixture::new();
        let fetcher = StubFetcher::new().fail("https://x/b", "connection refused");
        let extractor = extractor();
        let harvester = Harvester::new(&fetcher, &extractor, &fx.artifacts, 1);

        for _ in 0..2 {
            let mut progress = fx.progress().await;
            harvester
                .run(entries(&["https://x/b"]), &mut progress, &fx.failures, None, |_, _| {})
                .await;
        }
        assert_eq!(fx.failure_lines().len(), 2);
    }
}
