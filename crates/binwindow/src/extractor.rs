//! Event extraction
//!
//! Streams one file from its start and turns the events inside the window
//! into [`ChangeEvent`]s with an approximate SQL statement each. Row images
//! carry no column names, so columns are written as `col_N` (1-based).

use crate::common::{
    ChangeEvent, ChangeKind, EventPayload, EventStreamClient, ExtractorConfig, LogEvent,
    LogFileDescriptor, RowBatch, ScanError, ScanPhase, SkippedFile, TimeWindow, Value,
};
use crate::formatter::{format_row, format_value};
use crate::locator::LOG_START_OFFSET;
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

/// Statement prefixes that carry no change of their own.
const NOISE_PREFIXES: &[&str] = &[
    "begin",
    "commit",
    "rollback",
    "set timestamp",
    "set autocommit",
    "#",
    "/*!",
];

/// Conditions shown in a DELETE before the rest are elided.
const MAX_DELETE_CONDITIONS: usize = 3;

/// Extracts window events from single files.
#[derive(Clone)]
pub struct EventExtractor {
    client: Arc<dyn EventStreamClient>,
    config: ExtractorConfig,
}

impl std::fmt::Debug for EventExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventExtractor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl EventExtractor {
    pub fn new(client: Arc<dyn EventStreamClient>, config: ExtractorConfig) -> Self {
        Self { client, config }
    }

    /// Collect the change events of `file` that fall inside `window`.
    ///
    /// Only a stream that cannot be opened skips the file. A read error or an
    /// exhausted budget ends the file with what was collected.
    pub async fn extract(
        &self,
        file: &LogFileDescriptor,
        window: &TimeWindow,
    ) -> std::result::Result<Vec<ChangeEvent>, SkippedFile> {
        let deadline = Instant::now() + self.config.file_budget;
        let mut stream = match timeout_at(deadline, self.client.open_stream(file, LOG_START_OFFSET))
            .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(SkippedFile::new(&file.name, ScanPhase::Extract, &e)),
            Err(_) => {
                let e = ScanError::timeout(format!("opening {}", file.name));
                return Err(SkippedFile::new(&file.name, ScanPhase::Extract, &e));
            }
        };

        let mut records = Vec::new();
        let mut in_window = 0usize;
        let mut read = 0usize;

        while in_window < self.config.max_events {
            let event = match timeout_at(deadline, stream.next_event()).await {
                Ok(Ok(Some(event))) => event,
                Ok(Ok(None)) => break,
                Ok(Err(e)) => {
                    debug!("{}: read error, keeping events so far: {}", file.name, e);
                    break;
                }
                Err(_) => {
                    debug!(
                        "{}: budget of {:?} spent",
                        file.name, self.config.file_budget
                    );
                    break;
                }
            };
            read += 1;

            let Some(ts) = event.header.datetime() else {
                continue;
            };
            if ts < window.start() {
                continue;
            }
            if ts > window.end() {
                debug!("{}: passed the end of the window", file.name);
                break;
            }

            if let Some(record) = to_change_event(&event, &file.name) {
                records.push(record);
            }
            in_window += 1;
        }

        debug!(
            "{}: {} events read, {} in window, {} records",
            file.name,
            read,
            in_window,
            records.len()
        );
        Ok(records)
    }
}

/// Convert one in-window event; `None` for kinds that produce no record.
pub fn to_change_event(event: &LogEvent, source_file: &str) -> Option<ChangeEvent> {
    let timestamp = event.header.datetime()?;
    let (kind, database, statement) = match &event.payload {
        EventPayload::Query { schema, query } => {
            if is_noise_query(query) {
                return None;
            }
            (ChangeKind::Query, schema.clone(), query.clone())
        }
        EventPayload::RowInsert(batch) => {
            (ChangeKind::Insert, batch.schema.clone(), insert_statement(batch))
        }
        EventPayload::RowUpdate(batch) => {
            (ChangeKind::Update, batch.schema.clone(), update_statement(batch))
        }
        EventPayload::RowDelete(batch) => {
            (ChangeKind::Delete, batch.schema.clone(), delete_statement(batch))
        }
        EventPayload::Other => return None,
    };

    Some(ChangeEvent {
        timestamp,
        kind,
        database,
        statement,
        origin_id: event.header.origin_id,
        log_position: event.header.end_offset,
        source_file: source_file.to_string(),
    })
}

/// Transaction control, session settings, comments and empty statements.
pub fn is_noise_query(query: &str) -> bool {
    let normalized = query.trim().to_lowercase();
    normalized.is_empty() || NOISE_PREFIXES.iter().any(|p| normalized.starts_with(p))
}

fn more_rows(extra: usize) -> String {
    if extra > 0 {
        format!(" /* and {} more rows */", extra)
    } else {
        String::new()
    }
}

pub fn insert_statement(batch: &RowBatch) -> String {
    let values = match batch.rows.first() {
        Some(row) if !row.is_empty() => {
            format!("({}){}", format_row(row), more_rows(batch.rows.len() - 1))
        }
        _ => "(...)".to_string(),
    };
    format!("INSERT INTO {} VALUES {}", batch.qualified_name(), values)
}

/// Rows alternate before/after; only the first pair is spelled out.
pub fn update_statement(batch: &RowBatch) -> String {
    let pairs = batch.rows.len() / 2;
    let set = match (batch.rows.first(), batch.rows.get(1)) {
        (Some(before), Some(after)) => {
            let changes: Vec<String> = before
                .iter()
                .zip(after)
                .enumerate()
                .filter(|(_, (b, a))| b != a)
                .map(|(i, (b, a))| {
                    format!("col_{}={} (was {})", i + 1, format_value(a), format_value(b))
                })
                .collect();
            let mut set = if changes.is_empty() {
                "/* no visible changes */".to_string()
            } else {
                changes.join(", ")
            };
            set.push_str(&more_rows(pairs.saturating_sub(1)));
            set
        }
        _ => "...".to_string(),
    };
    format!("UPDATE {} SET {}", batch.qualified_name(), set)
}

/// Non-null columns of the first row become the WHERE clause.
pub fn delete_statement(batch: &RowBatch) -> String {
    let condition = match batch.rows.first() {
        Some(row) if !row.is_empty() => {
            let conditions: Vec<String> = row
                .iter()
                .enumerate()
                .filter(|(_, v)| !matches!(v, Value::Null))
                .map(|(i, v)| format!("col_{}={}", i + 1, format_value(v)))
                .collect();
            let mut condition = if conditions.is_empty() {
                "/* all columns NULL */".to_string()
            } else if conditions.len() > MAX_DELETE_CONDITIONS {
                format!(
                    "{} /* ... */",
                    conditions[..MAX_DELETE_CONDITIONS].join(" AND ")
                )
            } else {
                conditions.join(" AND ")
            };
            condition.push_str(&more_rows(batch.rows.len() - 1));
            condition
        }
        _ => "...".to_string(),
    };
    format!("DELETE FROM {} WHERE {}", batch.qualified_name(), condition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{parse_time, ExtractorConfig};
    use crate::memory::{scripted_event, MemoryStreamClient};
    use std::time::Duration;

    fn batch(rows: Vec<Vec<Value>>) -> RowBatch {
        RowBatch {
            schema: "db".into(),
            table: "t".into(),
            rows,
        }
    }

    #[test]
    fn test_noise_queries() {
        for q in [
            "BEGIN",
            "  commit ",
            "ROLLBACK",
            "SET TIMESTAMP=1709294400",
            "set autocommit=1",
            "# at 1234",
            "/*!80016 SET @@session.default_table_encryption=0*/",
            "",
            "   ",
        ] {
            assert!(is_noise_query(q), "{:?} should be skipped", q);
        }
        assert!(!is_noise_query("ALTER TABLE t ADD COLUMN c INT"));
        assert!(!is_noise_query("SET NAMES utf8mb4"));
    }

    #[test]
    fn test_insert_statement() {
        let b = batch(vec![vec![Value::Int(1), Value::Text("a".into())]]);
        assert_eq!(insert_statement(&b), "INSERT INTO db.t VALUES (1, 'a')");

        let b = batch(vec![vec![Value::Int(1)], vec![Value::Int(2)], vec![Value::Int(3)]]);
        assert_eq!(
            insert_statement(&b),
            "INSERT INTO db.t VALUES (1) /* and 2 more rows */"
        );

        assert_eq!(insert_statement(&batch(vec![])), "INSERT INTO db.t VALUES (...)");
    }

    #[test]
    fn test_insert_without_schema() {
        let b = RowBatch {
            table: "t".into(),
            rows: vec![vec![Value::Null]],
            ..Default::default()
        };
        assert_eq!(insert_statement(&b), "INSERT INTO t VALUES (NULL)");
    }

    #[test]
    fn test_update_statement() {
        let b = batch(vec![
            vec![Value::Int(5), Value::Text("x".into())],
            vec![Value::Null, Value::Text("x".into())],
        ]);
        assert_eq!(update_statement(&b), "UPDATE db.t SET col_1=NULL (was 5)");

        let b = batch(vec![
            vec![Value::Int(1)],
            vec![Value::Int(1)],
            vec![Value::Int(2)],
            vec![Value::Int(3)],
        ]);
        assert_eq!(
            update_statement(&b),
            "UPDATE db.t SET /* no visible changes */ /* and 1 more rows */"
        );

        assert_eq!(
            update_statement(&batch(vec![vec![Value::Int(1)]])),
            "UPDATE db.t SET ..."
        );
    }

    #[test]
    fn test_update_compares_bytes_by_content() {
        let b = batch(vec![
            vec![Value::Bytes(b"abc".to_vec()), Value::Int(1)],
            vec![Value::Bytes(b"abc".to_vec()), Value::Int(2)],
        ]);
        assert_eq!(update_statement(&b), "UPDATE db.t SET col_2=2 (was 1)");
    }

    #[test]
    fn test_delete_statement() {
        let b = batch(vec![vec![Value::Int(7), Value::Null, Value::Text("z".into())]]);
        assert_eq!(
            delete_statement(&b),
            "DELETE FROM db.t WHERE col_1=7 AND col_3='z'"
        );

        let b = batch(vec![vec![
            Value::Int(1),
            Value::Int(2),
            Value::Int(3),
            Value::Int(4),
        ]]);
        assert_eq!(
            delete_statement(&b),
            "DELETE FROM db.t WHERE col_1=1 AND col_2=2 AND col_3=3 /* ... */"
        );

        let b = batch(vec![vec![Value::Null], vec![Value::Int(1)]]);
        assert_eq!(
            delete_statement(&b),
            "DELETE FROM db.t WHERE /* all columns NULL */ /* and 1 more rows */"
        );

        assert_eq!(delete_statement(&batch(vec![])), "DELETE FROM db.t WHERE ...");
    }

    #[test]
    fn test_to_change_event() {
        let event = scripted_event(
            1_709_294_400,
            500,
            80,
            EventPayload::Query {
                schema: "shop".into(),
                query: "TRUNCATE TABLE carts".into(),
            },
        );
        let record = to_change_event(&event, "bin.000003").unwrap();
        assert_eq!(record.kind, ChangeKind::Query);
        assert_eq!(record.database, "shop");
        assert_eq!(record.statement, "TRUNCATE TABLE carts");
        assert_eq!(record.log_position, 500);
        assert_eq!(record.source_file, "bin.000003");

        let other = scripted_event(1_709_294_400, 600, 31, EventPayload::Other);
        assert!(to_change_event(&other, "bin.000003").is_none());
    }

    fn extractor(client: MemoryStreamClient, config: ExtractorConfig) -> EventExtractor {
        EventExtractor::new(Arc::new(client), config)
    }

    fn insert_at(ts: u32, end: u32) -> LogEvent {
        scripted_event(
            ts,
            end,
            100,
            EventPayload::RowInsert(batch(vec![vec![Value::Int(i64::from(end))]])),
        )
    }

    #[tokio::test]
    async fn test_extract_filters_by_window() {
        let window = TimeWindow::parse("2024-03-01 12:00:00", "2024-03-01 12:10:00").unwrap();
        let s = parse_time("2024-03-01 12:00:00").unwrap().timestamp() as u32;
        let events = vec![
            insert_at(s - 1, 200),
            insert_at(s, 300),
            insert_at(s + 600, 400),
            insert_at(s + 601, 500),
            insert_at(s + 10, 600),
        ];
        let client = MemoryStreamClient::new().with_file("bin.000001", 10_000, events);
        let records = extractor(client, ExtractorConfig::default())
            .extract(&LogFileDescriptor::new("bin.000001", 10_000), &window)
            .await
            .unwrap();

        // Stops at the first event past the window; the late-stamped one after it is not read.
        let positions: Vec<u32> = records.iter().map(|r| r.log_position).collect();
        assert_eq!(positions, vec![300, 400]);
        assert!(records.iter().all(|r| window.contains(r.timestamp)));
    }

    #[tokio::test]
    async fn test_extract_event_budget() {
        let window = TimeWindow::parse("2024-03-01 12:00:00", "2024-03-01 13:00:00").unwrap();
        let s = parse_time("2024-03-01 12:00:00").unwrap().timestamp() as u32;
        let events = (0..20).map(|i| insert_at(s + i, 200 + i * 100)).collect();
        let client = MemoryStreamClient::new().with_file("bin.000001", 10_000, events);
        let config = ExtractorConfig {
            max_events: 5,
            ..Default::default()
        };
        let records = extractor(client, config)
            .extract(&LogFileDescriptor::new("bin.000001", 10_000), &window)
            .await
            .unwrap();
        assert_eq!(records.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extract_time_budget_keeps_partial_result() {
        let window = TimeWindow::parse("2024-03-01 12:00:00", "2024-03-01 13:00:00").unwrap();
        let s = parse_time("2024-03-01 12:00:00").unwrap().timestamp() as u32;
        let events = (0..10).map(|i| insert_at(s + i, 200 + i * 100)).collect();
        let client = MemoryStreamClient::new()
            .with_file("bin.000001", 10_000, events)
            .with_event_delay(Duration::from_secs(1));
        let config = ExtractorConfig {
            file_budget: Duration::from_millis(3500),
            ..Default::default()
        };
        let records = extractor(client, config)
            .extract(&LogFileDescriptor::new("bin.000001", 10_000), &window)
            .await
            .unwrap();
        assert_eq!(records.len(), 3);
    }

    #[tokio::test]
    async fn test_extract_open_failure_skips_file() {
        let window = TimeWindow::parse("2024-03-01 12:00:00", "2024-03-01 13:00:00").unwrap();
        let client = MemoryStreamClient::new()
            .with_file("bin.000001", 10_000, vec![])
            .fail_opens_always("bin.000001");
        let skipped = extractor(client, ExtractorConfig::default())
            .extract(&LogFileDescriptor::new("bin.000001", 10_000), &window)
            .await
            .unwrap_err();
        assert_eq!(skipped.file, "bin.000001");
        assert_eq!(skipped.phase, ScanPhase::Extract);
    }
}
