//! # Shared types
//!
//! - [`ScanError`] - Error classification and the per-file [`SkippedFile`] record
//! - [`RunConfig`] - Immutable run settings and tuning constants
//! - [`RetryPolicy`] - Fixed-backoff retry for probes
//! - Data model: [`LogFileDescriptor`], [`FileTimeRange`], [`LogEvent`], [`ChangeEvent`]
//! - Collaborator seams: [`CatalogClient`], [`EventStreamClient`], [`EventStream`]

mod config;
mod error;
mod event;
mod retry;
mod traits;

pub use config::{
    format_time, parse_time, ConnectionConfig, ExtractorConfig, LocatorConfig, OutputFormat,
    RunConfig, TimeWindow, TIME_FORMAT,
};
pub use error::{ErrorCategory, Result, ScanError, ScanPhase, SkippedFile};
pub use event::{
    ChangeEvent, ChangeKind, EventPayload, FileTimeRange, LogEvent, LogEventHeader,
    LogFileDescriptor, RowBatch, Value,
};
pub use retry::{RetryPolicy, RetryPolicyBuilder};
pub use traits::{CatalogClient, EventStream, EventStreamClient};
