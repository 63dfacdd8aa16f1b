//! Data model shared by the locator, extractor and writer
//!
//! ```text
//! LogFileDescriptor ──probe──▶ FileTimeRange ──select──▶ candidate files
//!        │
//!        └──stream──▶ LogEvent ──extract──▶ ChangeEvent ──dedup──▶ report
//! ```

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use std::fmt;

// ============================================================================
// Log files
// ============================================================================

/// A binary log file as listed by the server catalog.
///
/// Names carry a monotonically increasing numeric suffix, so ordering by
/// name is ordering by age.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct LogFileDescriptor {
    pub name: String,
    pub size_bytes: i64,
}

impl LogFileDescriptor {
    pub fn new(name: impl Into<String>, size_bytes: i64) -> Self {
        Self {
            name: name.into(),
            size_bytes,
        }
    }
}

/// Estimated wall-clock span of a log file. `None` bounds are unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileTimeRange {
    pub file_name: String,
    pub size_bytes: i64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl FileTimeRange {
    /// A range with nothing known about it yet.
    pub fn unknown(file: &LogFileDescriptor) -> Self {
        Self {
            file_name: file.name.clone(),
            size_bytes: file.size_bytes,
            start_time: None,
            end_time: None,
        }
    }

    pub fn descriptor(&self) -> LogFileDescriptor {
        LogFileDescriptor::new(self.file_name.clone(), self.size_bytes)
    }
}

// ============================================================================
// Raw stream events
// ============================================================================

/// Header fields common to every stream event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogEventHeader {
    /// Seconds since the Unix epoch; zero for synthetic events.
    pub timestamp: u32,
    /// Server id of the origin server.
    pub origin_id: u32,
    /// Byte offset just past this event in its file.
    pub end_offset: u32,
    /// Total event length in bytes, header included.
    pub event_length: u32,
    /// Raw event type code.
    pub type_code: u8,
}

impl LogEventHeader {
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        if self.timestamp == 0 {
            return None;
        }
        Utc.timestamp_opt(i64::from(self.timestamp), 0).single()
    }

    /// True when this event starts beyond a file of `size_bytes`, i.e. the
    /// stream has rotated into the next file.
    pub fn crosses_boundary(&self, size_bytes: i64) -> bool {
        let end = i64::from(self.end_offset);
        let len = i64::from(self.event_length);
        end > size_bytes && len > 0 && end - len > size_bytes
    }
}

/// Decoded row images for one row event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowBatch {
    pub schema: String,
    pub table: String,
    /// One entry per row. For updates the entries alternate before/after.
    pub rows: Vec<Vec<Value>>,
}

impl RowBatch {
    /// `schema.table`, or the bare table name without a schema.
    pub fn qualified_name(&self) -> String {
        if self.schema.is_empty() {
            self.table.clone()
        } else {
            format!("{}.{}", self.schema, self.table)
        }
    }
}

/// Kind-specific payload of a stream event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Query { schema: String, query: String },
    RowInsert(RowBatch),
    RowUpdate(RowBatch),
    RowDelete(RowBatch),
    Other,
}

/// One event read from a log stream.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub header: LogEventHeader,
    pub payload: EventPayload,
}

/// A decoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(NaiveDateTime),
    /// Exact numeric rendered as text, e.g. a DECIMAL column.
    Decimal(String),
}

// ============================================================================
// Extracted records
// ============================================================================

/// Kind of an extracted change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Query,
    Insert,
    Update,
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Query => write!(f, "QUERY"),
            ChangeKind::Insert => write!(f, "INSERT"),
            ChangeKind::Update => write!(f, "UPDATE"),
            ChangeKind::Delete => write!(f, "DELETE"),
        }
    }
}

/// A change event inside the requested window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: ChangeKind,
    pub database: String,
    pub statement: String,
    pub origin_id: u32,
    pub log_position: u32,
    pub source_file: String,
}

impl ChangeEvent {
    /// Key under which repeated observations of the same event collide.
    pub fn dedup_key(&self) -> (u32, DateTime<Utc>) {
        (self.log_position, self.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(end_offset: u32, event_length: u32) -> LogEventHeader {
        LogEventHeader {
            timestamp: 1_700_000_000,
            origin_id: 1,
            end_offset,
            event_length,
            type_code: 2,
        }
    }

    #[test]
    fn test_crosses_boundary() {
        // Event starting past the file size belongs to the next file.
        assert!(header(1200, 100).crosses_boundary(1000));
        // Event straddling the recorded size is still this file's.
        assert!(!header(1050, 100).crosses_boundary(1000));
        assert!(!header(900, 100).crosses_boundary(1000));
        // Zero-length artificial events never count.
        assert!(!header(5000, 0).crosses_boundary(1000));
    }

    #[test]
    fn test_header_datetime() {
        let mut h = header(0, 0);
        assert_eq!(
            h.datetime(),
            Some(Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap())
        );
        h.timestamp = 0;
        assert_eq!(h.datetime(), None);
    }

    #[test]
    fn test_qualified_name() {
        let batch = RowBatch {
            schema: "shop".into(),
            table: "orders".into(),
            rows: vec![],
        };
        assert_eq!(batch.qualified_name(), "shop.orders");

        let bare = RowBatch {
            table: "orders".into(),
            ..Default::default()
        };
        assert_eq!(bare.qualified_name(), "orders");
    }

    #[test]
    fn test_change_kind_display() {
        assert_eq!(ChangeKind::Query.to_string(), "QUERY");
        assert_eq!(ChangeKind::Delete.to_string(), "DELETE");
        assert_eq!(
            serde_json::to_string(&ChangeKind::Update).unwrap(),
            "\"UPDATE\""
        );
    }
}
