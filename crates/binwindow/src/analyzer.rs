//! Run pipeline
//!
//! ```text
//! catalog ─▶ locate ─▶ extract ─▶ dedup ─▶ Report
//! ```
//!
//! Catalog failures and an empty selection end the run. Files that fail to
//! probe or extract only land in the report's skip list.

use crate::common::{
    CatalogClient, EventStreamClient, FileTimeRange, Result, RunConfig, ScanError, SkippedFile,
};
use crate::dedup::deduplicate;
use crate::extractor::EventExtractor;
use crate::locator::FileLocator;
use crate::mysql::{MySqlCatalog, MySqlStreamClient};
use crate::orchestrator::ScanOrchestrator;
use crate::report::Report;
use std::sync::Arc;
use tracing::{debug, info};

/// Probed range of one file and whether it overlaps the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeListing {
    pub range: FileTimeRange,
    pub overlaps: bool,
}

/// Result of [`WindowAnalyzer::list_ranges`].
#[derive(Debug, Clone, Default)]
pub struct RangeReport {
    pub files: Vec<RangeListing>,
    pub skipped: Vec<SkippedFile>,
}

impl RangeReport {
    /// One line per file: name, size, estimated range, verdict.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for listing in &self.files {
            out.push_str(&format!(
                "{}\t{}\t{}\t{}\n",
                listing.range.file_name,
                listing.range.size_bytes,
                crate::locator::describe(&listing.range),
                if listing.overlaps { "in range" } else { "-" }
            ));
        }
        for skipped in &self.skipped {
            out.push_str(&format!("{}\tskipped: {}\n", skipped.file, skipped.reason));
        }
        out
    }
}

/// Ties the collaborators and the run configuration together.
pub struct WindowAnalyzer {
    config: RunConfig,
    catalog: Arc<dyn CatalogClient>,
    orchestrator: ScanOrchestrator,
}

impl WindowAnalyzer {
    pub fn new(
        config: RunConfig,
        catalog: Arc<dyn CatalogClient>,
        client: Arc<dyn EventStreamClient>,
    ) -> Self {
        let orchestrator = ScanOrchestrator::new(
            FileLocator::new(client.clone(), config.locator.clone()),
            EventExtractor::new(client, config.extractor.clone()),
            config.workers,
            config.retry.clone(),
        );
        Self {
            config,
            catalog,
            orchestrator,
        }
    }

    /// Analyzer backed by the MySQL server in `config`.
    pub fn mysql(config: RunConfig) -> Self {
        let catalog = Arc::new(MySqlCatalog::new(config.connection.clone()));
        let client = Arc::new(MySqlStreamClient::new(config.connection.clone()));
        Self::new(config, catalog, client)
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Locate, extract and deduplicate the window's events.
    pub async fn run(&self) -> Result<Report> {
        self.config.validate()?;
        let window = self.config.window;
        info!("Analyzing {} with {} workers", window, self.config.workers);

        let files = self.catalog.list_log_files().await?;
        debug!("{} log files listed", files.len());
        if files.is_empty() {
            return Err(ScanError::NoFilesInRange);
        }

        let located = self.orchestrator.locate(&files, &window).await;
        if located.selected.is_empty() {
            return Err(ScanError::NoFilesInRange);
        }
        info!(
            "{} candidate files: {}",
            located.selected.len(),
            located
                .selected
                .iter()
                .map(|r| r.file_name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let candidates: Vec<_> = located.selected.iter().map(|r| r.descriptor()).collect();
        let extracted = self.orchestrator.extract(&candidates, &window).await;

        let deduped = deduplicate(extracted.events);
        info!(
            "{} unique events, {} duplicates removed",
            deduped.events.len(),
            deduped.removed
        );

        let mut skipped = located.skipped;
        skipped.extend(extracted.skipped);
        Ok(Report::new(&window, deduped.events, deduped.removed, skipped))
    }

    /// Probe every listed file and report its estimated range.
    pub async fn list_ranges(&self) -> Result<RangeReport> {
        self.config.validate()?;
        let window = self.config.window;
        let files = self.catalog.list_log_files().await?;
        let (ranges, skipped) = self.orchestrator.probe_all(&files).await;
        let locator = self.orchestrator.locator();
        let files = ranges
            .into_iter()
            .map(|range| RangeListing {
                overlaps: locator.is_in_time_range(&range, &window),
                range,
            })
            .collect();
        Ok(RangeReport { files, skipped })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ConnectionConfig, TimeWindow};
    use crate::memory::{MemoryCatalog, MemoryStreamClient};

    fn config(start: &str, end: &str) -> RunConfig {
        RunConfig::new(
            ConnectionConfig::default(),
            TimeWindow::parse(start, end).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_catalog_failure_is_fatal() {
        let analyzer = WindowAnalyzer::new(
            config("2024-03-01 00:00:00", "2024-03-01 01:00:00"),
            Arc::new(MemoryCatalog::failing("Access denied")),
            Arc::new(MemoryStreamClient::new()),
        );
        assert!(matches!(analyzer.run().await, Err(ScanError::Catalog(_))));
    }

    #[tokio::test]
    async fn test_empty_catalog_is_no_files_in_range() {
        let analyzer = WindowAnalyzer::new(
            config("2024-03-01 00:00:00", "2024-03-01 01:00:00"),
            Arc::new(MemoryCatalog::new(vec![])),
            Arc::new(MemoryStreamClient::new()),
        );
        assert!(matches!(analyzer.run().await, Err(ScanError::NoFilesInRange)));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut cfg = config("2024-03-01 00:00:00", "2024-03-01 01:00:00");
        cfg.connection.host = String::new();
        let analyzer = WindowAnalyzer::new(
            cfg,
            Arc::new(MemoryCatalog::new(vec![])),
            Arc::new(MemoryStreamClient::new()),
        );
        assert!(matches!(analyzer.run().await, Err(ScanError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_ranges_uses_the_run_probe_budget() {
        let start = crate::common::parse_time("2024-03-01 00:00:00")
            .unwrap()
            .timestamp() as u32;
        let events = (0..3)
            .map(|i| {
                crate::memory::scripted_event(
                    start + i * 60,
                    104 + i * 100,
                    100,
                    crate::common::EventPayload::Other,
                )
            })
            .collect();
        // Each event takes 1.5s to arrive: past the pool budget, inside the standalone one.
        let client = Arc::new(
            MemoryStreamClient::new()
                .with_file("bin.000001", 304, events)
                .with_event_delay(std::time::Duration::from_millis(1500)),
        );

        for (workers, expect_known) in [(1, true), (3, false)] {
            let analyzer = WindowAnalyzer::new(
                config("2024-03-01 00:00:00", "2024-03-01 01:00:00").with_workers(workers),
                Arc::new(client.catalog()),
                client.clone(),
            );
            let listing = analyzer.list_ranges().await.unwrap();
            assert_eq!(listing.files.len(), 1);
            assert_eq!(
                listing.files[0].range.start_time.is_some(),
                expect_known,
                "workers = {}",
                workers
            );
        }
    }

    #[test]
    fn test_range_report_render() {
        let report = RangeReport {
            files: vec![RangeListing {
                range: FileTimeRange {
                    file_name: "bin.000001".into(),
                    size_bytes: 1024,
                    start_time: None,
                    end_time: None,
                },
                overlaps: true,
            }],
            skipped: vec![],
        };
        assert_eq!(report.render(), "bin.000001\t1024\t? ~ ?\tin range\n");
    }
}
