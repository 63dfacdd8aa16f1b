//! Test harness for pipeline integration tests
//!
//! Builds scripted log files for the in-memory collaborators. Each file gets
//! its own offset range, so a stream that runs on into the next file shows
//! offsets past the file's size, the same way a growing server log does.
#![allow(dead_code)]

use binwindow::common::{parse_time, EventPayload, LogEvent, RowBatch, Value};
use binwindow::memory::{scripted_event, MemoryStreamClient};
use binwindow::{ConnectionConfig, RetryPolicy, RunConfig, TimeWindow, WindowAnalyzer};
use std::sync::{Arc, Once};
use std::time::Duration;

static INIT: Once = Once::new();

/// Initialize test logging (idempotent)
pub fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("binwindow=debug".parse().unwrap()),
            )
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Offset span reserved for each scripted file.
pub const FILE_SPAN: u32 = 100_000;
/// Bytes per scripted event.
pub const EVENT_LEN: u32 = 100;

pub fn stamp(s: &str) -> u32 {
    parse_time(s).unwrap().timestamp() as u32
}

pub fn rows(schema: &str, table: &str, rows: Vec<Vec<Value>>) -> RowBatch {
    RowBatch {
        schema: schema.into(),
        table: table.into(),
        rows,
    }
}

/// One scripted file: `(timestamp, payload)` pairs laid out back to back.
pub struct FileScript {
    pub name: String,
    pub events: Vec<(u32, EventPayload)>,
}

impl FileScript {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            events: Vec::new(),
        }
    }

    pub fn event(mut self, at: &str, payload: EventPayload) -> Self {
        self.events.push((stamp(at), payload));
        self
    }

    /// `count` single-row inserts `step` seconds apart from `first`.
    pub fn inserts(mut self, first: &str, count: u32, step: u32) -> Self {
        let base = stamp(first);
        for i in 0..count {
            let batch = rows("db", "t", vec![vec![Value::UInt(u64::from(i))]]);
            self.events.push((base + i * step, EventPayload::RowInsert(batch)));
        }
        self
    }
}

/// Serve `scripts` in order; the n-th file owns offsets `[n * FILE_SPAN, ...)`.
pub fn scripted_client(scripts: Vec<FileScript>) -> MemoryStreamClient {
    let mut client = MemoryStreamClient::new();
    for (n, script) in scripts.into_iter().enumerate() {
        let base = n as u32 * FILE_SPAN + 4;
        let events: Vec<LogEvent> = script
            .events
            .into_iter()
            .enumerate()
            .map(|(i, (ts, payload))| {
                scripted_event(ts, base + (i as u32 + 1) * EVENT_LEN, EVENT_LEN, payload)
            })
            .collect();
        let size = i64::from(base + events.len() as u32 * EVENT_LEN);
        client = client.with_file(script.name, size, events);
    }
    client
}

/// `count` files an hour apart, each with ten inserts a minute apart.
pub fn hourly_files(first_hour: &str, count: u32) -> MemoryStreamClient {
    let first = parse_time(first_hour).unwrap();
    let scripts = (0..count)
        .map(|n| {
            let start = first + chrono::Duration::hours(i64::from(n));
            FileScript::new(&format!("mysql-bin.{:06}", n + 1)).inserts(
                &binwindow::common::format_time(&start),
                10,
                60,
            )
        })
        .collect();
    scripted_client(scripts)
}

pub fn run_config(start: &str, end: &str, workers: usize) -> RunConfig {
    RunConfig::new(
        ConnectionConfig::new("localhost", "test"),
        TimeWindow::parse(start, end).unwrap(),
    )
    .with_workers(workers)
    .with_retry(
        RetryPolicy::builder()
            .max_attempts(10)
            .backoff(Duration::from_millis(1))
            .build(),
    )
}

pub fn analyzer(client: Arc<MemoryStreamClient>, config: RunConfig) -> WindowAnalyzer {
    let catalog = Arc::new(client.catalog());
    WindowAnalyzer::new(config, catalog, client)
}
