//! In-memory collaborators
//!
//! Scripted log files served through the same seams as the MySQL adapters.
//! A stream opened on one file runs on into the files after it, the way a
//! server dump follows rotation, so boundary handling is exercised too.

use crate::common::{
    CatalogClient, EventPayload, EventStream, EventStreamClient, LogEvent, LogEventHeader,
    LogFileDescriptor, Result, ScanError,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Build a scripted event. The type code follows the payload kind.
pub fn scripted_event(
    timestamp: u32,
    end_offset: u32,
    event_length: u32,
    payload: EventPayload,
) -> LogEvent {
    use crate::mysql::decoder::event_type;

    let type_code = match &payload {
        EventPayload::Query { .. } => event_type::QUERY,
        EventPayload::RowInsert(_) => event_type::WRITE_ROWS_V2,
        EventPayload::RowUpdate(_) => event_type::UPDATE_ROWS_V2,
        EventPayload::RowDelete(_) => event_type::DELETE_ROWS_V2,
        EventPayload::Other => event_type::XID,
    };
    LogEvent {
        header: LogEventHeader {
            timestamp,
            origin_id: 1,
            end_offset,
            event_length,
            type_code,
        },
        payload,
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Fixed file listing.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    files: Vec<LogFileDescriptor>,
    failure: Option<String>,
}

impl MemoryCatalog {
    pub fn new(files: Vec<LogFileDescriptor>) -> Self {
        Self {
            files,
            failure: None,
        }
    }

    /// A catalog whose listing always fails.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            files: Vec::new(),
            failure: Some(message.into()),
        }
    }
}

#[async_trait]
impl CatalogClient for MemoryCatalog {
    async fn list_log_files(&self) -> Result<Vec<LogFileDescriptor>> {
        match &self.failure {
            Some(msg) => Err(ScanError::catalog(msg.clone())),
            None => Ok(self.files.clone()),
        }
    }
}

// ============================================================================
// Streams
// ============================================================================

#[derive(Debug, Clone)]
struct ScriptedFile {
    descriptor: LogFileDescriptor,
    events: Vec<LogEvent>,
}

/// Serves scripted events, with optional failures and per-event delays.
#[derive(Debug, Default)]
pub struct MemoryStreamClient {
    files: Vec<ScriptedFile>,
    event_delay: Duration,
    /// Remaining failing opens per file.
    open_failures: Mutex<HashMap<String, u32>>,
    opens: Mutex<HashMap<String, usize>>,
}

impl MemoryStreamClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file. Files are kept in name order whatever order they are added in.
    pub fn with_file(
        mut self,
        name: impl Into<String>,
        size_bytes: i64,
        events: Vec<LogEvent>,
    ) -> Self {
        self.files.push(ScriptedFile {
            descriptor: LogFileDescriptor::new(name, size_bytes),
            events,
        });
        self.files
            .sort_by(|a, b| a.descriptor.name.cmp(&b.descriptor.name));
        self
    }

    /// Sleep this long before handing out each event.
    pub fn with_event_delay(mut self, delay: Duration) -> Self {
        self.event_delay = delay;
        self
    }

    /// Make the next `times` opens of `file` fail with a connection error.
    pub fn fail_opens(self, file: impl Into<String>, times: u32) -> Self {
        self.open_failures.lock().insert(file.into(), times);
        self
    }

    /// Make every open of `file` fail with a connection error.
    pub fn fail_opens_always(self, file: impl Into<String>) -> Self {
        self.fail_opens(file, u32::MAX)
    }

    /// Descriptors for every scripted file, in name order.
    pub fn descriptors(&self) -> Vec<LogFileDescriptor> {
        self.files.iter().map(|f| f.descriptor.clone()).collect()
    }

    /// A catalog listing exactly the scripted files.
    pub fn catalog(&self) -> MemoryCatalog {
        MemoryCatalog::new(self.descriptors())
    }

    /// How many times `file` has been opened, failed attempts included.
    pub fn open_count(&self, file: &str) -> usize {
        self.opens.lock().get(file).copied().unwrap_or(0)
    }
}

#[async_trait]
impl EventStreamClient for MemoryStreamClient {
    async fn open_stream(
        &self,
        file: &LogFileDescriptor,
        offset: u32,
    ) -> Result<Box<dyn EventStream>> {
        *self.opens.lock().entry(file.name.clone()).or_insert(0) += 1;

        {
            let mut failures = self.open_failures.lock();
            if let Some(remaining) = failures.get_mut(&file.name) {
                if *remaining > 0 {
                    *remaining = remaining.saturating_sub(1);
                    return Err(ScanError::connection(format!(
                        "scripted failure opening {}",
                        file.name
                    )));
                }
            }
        }

        let Some(index) = self
            .files
            .iter()
            .position(|f| f.descriptor.name == file.name)
        else {
            return Err(ScanError::stream(format!(
                "Could not find first log file name in binary log index file: {}",
                file.name
            )));
        };

        let mut events: VecDeque<LogEvent> = self.files[index]
            .events
            .iter()
            .filter(|e| e.header.end_offset.saturating_sub(e.header.event_length) >= offset)
            .cloned()
            .collect();
        for next in &self.files[index + 1..] {
            events.extend(next.events.iter().cloned());
        }

        Ok(Box::new(MemoryEventStream {
            events,
            delay: self.event_delay,
        }))
    }
}

struct MemoryEventStream {
    events: VecDeque<LogEvent>,
    delay: Duration,
}

#[async_trait]
impl EventStream for MemoryEventStream {
    async fn next_event(&mut self) -> Result<Option<LogEvent>> {
        if self.events.is_empty() {
            return Ok(None);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.events.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(ts: u32, end: u32) -> LogEvent {
        scripted_event(
            ts,
            end,
            100,
            EventPayload::Query {
                schema: "db".into(),
                query: "DROP TABLE t".into(),
            },
        )
    }

    #[tokio::test]
    async fn test_catalog_lists_files_in_name_order() {
        let client = MemoryStreamClient::new()
            .with_file("bin.000002", 500, vec![])
            .with_file("bin.000001", 500, vec![]);
        let files = client.catalog().list_log_files().await.unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["bin.000001", "bin.000002"]);
    }

    #[tokio::test]
    async fn test_failing_catalog() {
        let err = MemoryCatalog::failing("denied")
            .list_log_files()
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Catalog(_)));
    }

    #[tokio::test]
    async fn test_stream_runs_into_next_file() {
        let client = MemoryStreamClient::new()
            .with_file("bin.000001", 300, vec![query(10, 200), query(11, 300)])
            .with_file("bin.000002", 300, vec![query(12, 200)]);
        let desc = LogFileDescriptor::new("bin.000001", 300);
        let mut stream = client.open_stream(&desc, 4).await.unwrap();

        let mut stamps = Vec::new();
        while let Some(event) = stream.next_event().await.unwrap() {
            stamps.push(event.header.timestamp);
        }
        assert_eq!(stamps, vec![10, 11, 12]);
    }

    #[tokio::test]
    async fn test_scripted_open_failures() {
        let client = MemoryStreamClient::new()
            .with_file("bin.000001", 300, vec![query(10, 200)])
            .fail_opens("bin.000001", 2);
        let desc = LogFileDescriptor::new("bin.000001", 300);

        assert!(client.open_stream(&desc, 4).await.is_err());
        assert!(client.open_stream(&desc, 4).await.is_err());
        assert!(client.open_stream(&desc, 4).await.is_ok());
        assert_eq!(client.open_count("bin.000001"), 3);
    }

    #[tokio::test]
    async fn test_unknown_file() {
        let client = MemoryStreamClient::new();
        let desc = LogFileDescriptor::new("bin.000009", 300);
        assert!(matches!(
            client.open_stream(&desc, 4).await,
            Err(ScanError::Stream(_))
        ));
    }
}
