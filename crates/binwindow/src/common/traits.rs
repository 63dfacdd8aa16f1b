//! Collaborator traits
//!
//! The scan engine only talks to the server through these seams, so the
//! locator and extractor can be driven by the MySQL adapter or by scripted
//! in-memory data.

use crate::common::{LogEvent, LogFileDescriptor, Result};
use async_trait::async_trait;

/// Lists the log files available on the server.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// All log files, in the order the server reports them.
    async fn list_log_files(&self) -> Result<Vec<LogFileDescriptor>>;
}

/// Opens event streams over log files.
///
/// Every call opens an independent stream with its own connection; streams
/// are never shared between jobs.
#[async_trait]
pub trait EventStreamClient: Send + Sync {
    /// Start streaming `file` from byte `offset`.
    async fn open_stream(
        &self,
        file: &LogFileDescriptor,
        offset: u32,
    ) -> Result<Box<dyn EventStream>>;
}

/// A forward-only stream of decoded events.
///
/// The stream may run past the end of the requested file into its
/// successor; callers use [`LogEventHeader::crosses_boundary`] to notice.
///
/// [`LogEventHeader::crosses_boundary`]: crate::common::LogEventHeader::crosses_boundary
#[async_trait]
pub trait EventStream: Send {
    /// Next event, or `None` once the server has nothing more to send.
    async fn next_event(&mut self) -> Result<Option<LogEvent>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{EventPayload, LogEventHeader};

    struct CountdownStream {
        remaining: u32,
    }

    #[async_trait]
    impl EventStream for CountdownStream {
        async fn next_event(&mut self) -> Result<Option<LogEvent>> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            Ok(Some(LogEvent {
                header: LogEventHeader {
                    timestamp: 1_700_000_000 + self.remaining,
                    origin_id: 1,
                    end_offset: 100,
                    event_length: 50,
                    type_code: 2,
                },
                payload: EventPayload::Other,
            }))
        }
    }

    #[tokio::test]
    async fn test_boxed_stream_drains() {
        let mut stream: Box<dyn EventStream> = Box::new(CountdownStream { remaining: 3 });
        let mut seen = 0;
        while let Some(event) = stream.next_event().await.unwrap() {
            assert_eq!(event.payload, EventPayload::Other);
            seen += 1;
        }
        assert_eq!(seen, 3);
    }
}
