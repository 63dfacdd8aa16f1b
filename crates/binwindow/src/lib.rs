//! # binwindow - time-window extraction for MySQL binary logs
//!
//! Finds the binary log files that can hold events from a wall-clock window,
//! extracts those events as approximate SQL statements, removes duplicate
//! observations and renders a time-ordered report.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐        ┌──────────────────────────────────────────────┐
//! │ CatalogClient│──list─▶│ ScanOrchestrator                              │
//! └──────────────┘        │                                              │
//!                         │  FileLocator ── probe head/tail, overlap,    │
//!                         │    (pool)        early stop                  │
//!                         │        │                                     │
//!                         │        ▼ candidate files                     │
//!                         │  EventExtractor ── window filter, budgets,   │
//!                         │    (pool)          statement building        │
//!                         └───────────────────────┬──────────────────────┘
//!                                                 │ ChangeEvents
//!                                                 ▼
//!                                   deduplicate ─▶ Report (text / JSON)
//! ```
//!
//! Both the locator and extractor read through [`EventStreamClient`], so the
//! pipeline runs unchanged against a MySQL server ([`mysql`]) or scripted
//! in-memory files ([`memory`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # async fn example() -> anyhow::Result<()> {
//! use binwindow::{ConnectionConfig, RunConfig, TimeWindow, WindowAnalyzer};
//!
//! let connection = ConnectionConfig::new("127.0.0.1", "repl").with_password("secret");
//! let window = TimeWindow::parse("2024-03-01 12:00:00", "2024-03-01 13:00:00")?;
//! let config = RunConfig::new(connection, window).with_workers(4);
//!
//! let report = WindowAnalyzer::mysql(config).run().await?;
//! print!("{}", report.render_text());
//! # Ok(())
//! # }
//! ```

pub mod analyzer;
pub mod common;
pub mod dedup;
pub mod extractor;
pub mod formatter;
pub mod locator;
pub mod memory;
pub mod mysql;
pub mod orchestrator;
pub mod report;

pub use analyzer::{RangeListing, RangeReport, WindowAnalyzer};
pub use common::{
    CatalogClient, ChangeEvent, ChangeKind, ConnectionConfig, ErrorCategory, EventStream,
    EventStreamClient, ExtractorConfig, FileTimeRange, LocatorConfig, LogFileDescriptor,
    OutputFormat, Result, RetryPolicy, RunConfig, ScanError, SkippedFile, TimeWindow,
};
pub use dedup::{deduplicate, DedupOutcome};
pub use extractor::EventExtractor;
pub use locator::FileLocator;
pub use orchestrator::ScanOrchestrator;
pub use report::Report;
