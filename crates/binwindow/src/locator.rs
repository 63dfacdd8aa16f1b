//! Time-range file locator
//!
//! A log file's time span is not known until it is read. The locator reads a
//! short head of the file and then samples a little further, which is enough
//! to tell whether the file can hold events from the requested window.
//!
//! ```text
//!   offset 4
//!      │
//!      ▼
//!   ┌──────────── head ────────────┬──────── tail samples ────────┐
//!   │ up to head_events events      │ up to tail_samples stamped   │ ─ ─ ▶ rest unread
//!   │ first stamp → start_time      │ events, last → end_time      │
//!   └───────────────────────────────┴──────────────────────────────┘
//!          either phase stops at the probe deadline, end of stream,
//!          or the first event that starts past the file's size
//! ```

use crate::common::{
    EventStream, EventStreamClient, FileTimeRange, LocatorConfig, LogEvent, LogFileDescriptor,
    Result, ScanError, TimeWindow,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

/// First event offset in every log file, just past the magic header.
pub const LOG_START_OFFSET: u32 = 4;

/// Estimates file ranges and decides which files to extract.
#[derive(Clone)]
pub struct FileLocator {
    client: Arc<dyn EventStreamClient>,
    config: LocatorConfig,
}

impl std::fmt::Debug for FileLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLocator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FileLocator {
    pub fn new(client: Arc<dyn EventStreamClient>, config: LocatorConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    /// Estimate the time range of `file` within `budget`.
    ///
    /// Running out of budget or hitting a read error is not a failure: the
    /// bounds seen so far are returned. Only failing to open the stream is.
    pub async fn probe(&self, file: &LogFileDescriptor, budget: Duration) -> Result<FileTimeRange> {
        let deadline = Instant::now() + budget;
        let mut stream = timeout_at(deadline, self.client.open_stream(file, LOG_START_OFFSET))
            .await
            .map_err(|_| {
                ScanError::timeout(format!(
                    "opening {} took longer than {:?}",
                    file.name, budget
                ))
            })??;

        let mut range = FileTimeRange::unknown(file);

        for _ in 0..self.config.head_events {
            let Some(event) = next_before(&mut *stream, deadline, file).await else {
                return Ok(finish(range));
            };
            if event.header.crosses_boundary(file.size_bytes) {
                debug!("{}: head reached the next file", file.name);
                return Ok(finish(range));
            }
            if let Some(ts) = event.header.datetime() {
                range.start_time.get_or_insert(ts);
                range.end_time = Some(ts);
            }
        }

        let mut sampled = 0;
        while sampled < self.config.tail_samples {
            let Some(event) = next_before(&mut *stream, deadline, file).await else {
                break;
            };
            if event.header.crosses_boundary(file.size_bytes) {
                debug!("{}: tail sampling reached the next file", file.name);
                break;
            }
            if let Some(ts) = event.header.datetime() {
                range.end_time = Some(ts);
                sampled += 1;
            }
        }

        Ok(finish(range))
    }

    /// Whether a file with `range` may hold events from `window`.
    ///
    /// Unknown bounds and implausibly wide estimates are kept. Otherwise the
    /// window is widened by the range buffer on both sides and the file is
    /// dropped only if it ends before or starts after the widened window.
    pub fn is_in_time_range(&self, range: &FileTimeRange, window: &TimeWindow) -> bool {
        match (range.start_time, range.end_time) {
            (None, None) => return true,
            (Some(start), Some(end)) if end - start > self.config.wide_range => return true,
            _ => {}
        }

        let earliest = window.start() - self.config.range_buffer;
        let latest = window.end() + self.config.range_buffer;
        if range.end_time.is_some_and(|end| end < earliest) {
            return false;
        }
        if range.start_time.is_some_and(|start| start > latest) {
            return false;
        }
        true
    }

    /// Whether nothing after this file can overlap the window.
    pub fn starts_after(&self, range: &FileTimeRange, window: &TimeWindow) -> bool {
        range.start_time.is_some_and(|start| start > window.end())
    }

    /// Pick the overlapping files from ranges sorted by file name, stopping
    /// after the first file that starts past the window.
    pub fn select(&self, ranges: &[FileTimeRange], window: &TimeWindow) -> Vec<FileTimeRange> {
        let mut selected = Vec::new();
        for range in ranges {
            let overlaps = self.is_in_time_range(range, window);
            debug!(
                "{}: {} (estimated {})",
                range.file_name,
                if overlaps { "candidate" } else { "outside window" },
                describe(range)
            );
            if overlaps {
                selected.push(range.clone());
            }
            if self.starts_after(range, window) {
                debug!("{} starts after the window, stopping", range.file_name);
                break;
            }
        }
        selected
    }
}

/// Next event before `deadline`; `None` on end of stream, error or timeout.
async fn next_before(
    stream: &mut dyn EventStream,
    deadline: Instant,
    file: &LogFileDescriptor,
) -> Option<LogEvent> {
    match timeout_at(deadline, stream.next_event()).await {
        Ok(Ok(event)) => event,
        Ok(Err(e)) => {
            debug!("{}: read error during probe: {}", file.name, e);
            None
        }
        Err(_) => {
            debug!("{}: probe budget spent", file.name);
            None
        }
    }
}

fn finish(range: FileTimeRange) -> FileTimeRange {
    debug!("{}: estimated {}", range.file_name, describe(&range));
    range
}

/// `start ~ end` with `?` for unknown bounds.
pub fn describe(range: &FileTimeRange) -> String {
    let fmt = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| crate::common::format_time(&t))
            .unwrap_or_else(|| "?".to_string())
    };
    format!("{} ~ {}", fmt(range.start_time), fmt(range.end_time))
}
