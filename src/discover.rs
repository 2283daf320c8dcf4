//! Sitemap discovery: walk the index and grow the frontier.

use crate::fetch::Fetcher;
use crate::frontier::{FrontierStore, IngestReport};
use crate::sitemap::SitemapWalker;
use futures::StreamExt;
use std::pin::pin;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub candidates: IngestReport,
    pub sitemaps: usize,
    pub sitemaps_failed: usize,
    /// Batches lost because the frontier or discarded file could not be written.
    pub ledger_errors: usize,
}

/// Whether discovery has to walk the sitemap index.
///
/// A non-empty frontier means an earlier run already discovered, so the walk
/// is skipped unless `force` asks for rediscovery. Rediscovery is safe because
/// already-known URLs are discarded as duplicates.
pub fn should_walk(frontier: &FrontierStore, force: bool) -> bool {
    force || frontier.is_empty()
}

/// Walk `index_url` and feed every child sitemap's candidates through
/// validation into `frontier`, one batch per child sitemap.
#[instrument(level = "info", skip(walker, frontier))]
pub async fn discover<F>(
    walker: &SitemapWalker<'_, F>,
    index_url: &str,
    frontier: &mut FrontierStore,
) -> DiscoveryReport
where
    F: Fetcher,
{
    let mut report = DiscoveryReport::default();
    let mut batches = pin!(walker.walk(index_url));

    while let Some(batch) = batches.next().await {
        let batch = match batch {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, "Skipping sitemap");
                report.sitemaps_failed += 1;
                continue;
            }
        };

        report.sitemaps += 1;
        match frontier.ingest(batch.candidates).await {
            Ok(ingested) => {
                info!(
                    sitemap = %batch.sitemap_url,
                    accepted = ingested.accepted,
                    discarded = ingested.total() - ingested.accepted,
                    "Ingested sitemap"
                );
                report.candidates.merge(ingested);
            }
            Err(e) => {
                error!(sitemap = %batch.sitemap_url, error = %e, "Failed to persist frontier batch");
                report.ledger_errors += 1;
            }
        }
    }

    info!(
        sitemaps = report.sitemaps,
        sitemaps_failed = report.sitemaps_failed,
        accepted = report.candidates.accepted,
        null = report.candidates.null,
        invalid = report.candidates.invalid,
        duplicate = report.candidates.duplicate,
        frontier = frontier.len(),
        "Discovery complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::StubFetcher;
    use tempfile::TempDir;

    const INDEX: &str = r#"<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
        <sitemap><loc>https://x/article-sitemap1.xml</loc></sitemap>
        <sitemap><loc>https://x/article-sitemap2.xml</loc></sitemap>
    </sitemapindex>"#;

    const GOOD: &str = r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
        <url><loc>https://x/articles</loc></url>
        <url><loc>https://x/a</loc></url>
        <url><loc>https://x/b</loc></url>
        <url><loc>https://x/a</loc></url>
        <url></url>
    </urlset>"#;

    async fn open_frontier(dir: &TempDir) -> FrontierStore {
        FrontierStore::open(
            dir.path().join("article_urls.txt"),
            dir.path().join("discarded_urls.txt"),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_malformed_child_does_not_stop_siblings() {
        let dir = TempDir::new().unwrap();
        let fetcher = StubFetcher::new()
            .page("https://x/sitemap.xml", INDEX)
            .page("https://x/article-sitemap1.xml", "<urlset><url><loc>oops</url>")
            .page("https://x/article-sitemap2.xml", GOOD);
        let walker = SitemapWalker::new(&fetcher, "article-sitemap", 1);
        let mut frontier = open_frontier(&dir).await;

        let report = discover(&walker, "https://x/sitemap.xml", &mut frontier).await;

        assert_eq!(report.sitemaps, 1);
        assert_eq!(report.sitemaps_failed, 1);
        assert_eq!(report.candidates.accepted, 2);
        assert_eq!(report.candidates.duplicate, 1);
        assert_eq!(report.candidates.null, 1);

        let raw = std::fs::read_to_string(dir.path().join("article_urls.txt")).unwrap();
        assert_eq!(raw, "https://x/a\nhttps://x/b\n");
        let discarded = std::fs::read_to_string(dir.path().join("discarded_urls.txt")).unwrap();
        assert_eq!(discarded, "Duplicate: https://x/a\nNull: \n");
    }

    #[tokio::test]
    async fn test_existing_frontier_skips_walk_unless_forced() {
        let dir = TempDir::new().unwrap();
        let frontier = open_frontier(&dir).await;
        assert!(should_walk(&frontier, false));
        assert!(should_walk(&frontier, true));

        std::fs::write(dir.path().join("article_urls.txt"), "https://x/a\n").unwrap();
        let frontier = open_frontier(&dir).await;
        assert!(!should_walk(&frontier, false));
        assert!(should_walk(&frontier, true));
    }

    #[tokio::test]
    async fn test_empty_frontier_file_still_walks() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("article_urls.txt"), "\n\n").unwrap();
        let frontier = open_frontier(&dir).await;
        assert!(should_walk(&frontier, false));
    }

    #[tokio::test]
    async fn test_rediscovery_adds_no_duplicates() {
        let dir = TempDir::new().unwrap();
        let fetcher = StubFetcher::new()
            .page("https://x/sitemap.xml", INDEX)
            .page("https://x/article-sitemap1.xml", GOOD)
            .page("https://x/article-sitemap2.xml", GOOD);
        let walker = SitemapWalker::new(&fetcher, "article-sitemap", 1);

        let mut frontier = open_frontier(&dir).await;
        discover(&walker, "https://x/sitemap.xml", &mut frontier).await;
        let mut frontier = open_frontier(&dir).await;
        let report = discover(&walker, "https://x/sitemap.xml", &mut frontier).await;

        assert_eq!(report.candidates.accepted, 0);
        let raw = std::fs::read_to_string(dir.path().join("article_urls.txt")).unwrap();
        assert_eq!(raw.lines().count(), 2);
    }
}
