//! Command-line interface definitions.
//!
//! Global options select where state lives and how hard to hit the site;
//! the subcommand selects which stages run.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Resumable sitemap-driven article harvester.
///
/// # Examples
///
/// ```sh
/// # Full pass: discover (first time only), harvest, combine
/// sitemap_harvest -d ./data --sitemap https://www.cairo360.com/ar/sitemap.xml
///
/// # Only build the frontier
/// sitemap_harvest -d ./data discover
///
/// # Harvest at most 10 pending articles, then stop
/// sitemap_harvest -d ./data --limit 10 harvest
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Directory holding the frontier, ledgers and articles
    #[arg(short, long, env = "HARVEST_DATA_DIR", default_value = ".")]
    pub data_dir: PathBuf,

    /// Optional path to a YAML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Root sitemap index URL (overrides the config file)
    #[arg(long, env = "HARVEST_SITEMAP_URL")]
    pub sitemap: Option<String>,

    /// Maximum number of article fetches in flight
    #[arg(long, env = "HARVEST_CONCURRENCY", default_value_t = 16)]
    pub concurrency: usize,

    /// Dispatch at most this many pending articles in this run
    #[arg(long)]
    pub limit: Option<usize>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Walk the sitemap index and append new article URLs to the frontier
    Discover,
    /// Fetch and persist every frontier entry not yet processed
    Harvest,
    /// Merge all article files into one JSON array
    Combine,
    /// Discover (if needed), harvest, then combine
    Run {
        /// Walk the sitemaps even if a frontier already exists
        #[arg(long)]
        rediscover: bool,
    },
}

impl Cli {
    /// The subcommand to run; a bare invocation is a full `run`.
    pub fn command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or(Command::Run { rediscover: false })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["sitemap_harvest"]);
        assert_eq!(cli.data_dir, PathBuf::from("."));
        assert_eq!(cli.concurrency, 16);
        assert_eq!(cli.limit, None);
        assert_eq!(cli.command(), Command::Run { rediscover: false });
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from([
            "sitemap_harvest",
            "-d",
            "/tmp/harvest",
            "-c",
            "/tmp/harvest.yaml",
            "--limit",
            "10",
            "harvest",
        ]);

        assert_eq!(cli.data_dir, PathBuf::from("/tmp/harvest"));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/harvest.yaml")));
        assert_eq!(cli.limit, Some(10));
        assert_eq!(cli.command(), Command::Harvest);
    }

    #[test]
    fn test_cli_run_rediscover() {
        let cli = Cli::parse_from([
            "sitemap_harvest",
            "--sitemap",
            "https://example.com/sitemap.xml",
            "run",
            "--rediscover",
        ]);
        assert_eq!(cli.sitemap.as_deref(), Some("https://example.com/sitemap.xml"));
        assert_eq!(cli.command(), Command::Run { rediscover: true });
    }
}
