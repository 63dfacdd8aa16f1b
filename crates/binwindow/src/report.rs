//! Report rendering
//!
//! Records are ordered by timestamp (stable, so same-second records keep
//! their dedup order) and written as a mysqlbinlog-style text listing or as a
//! JSON document.

use crate::common::{format_time, ChangeEvent, OutputFormat, Result, SkippedFile, TimeWindow};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// Header timestamp format: `#240301 12:00:00`.
const EVENT_TIME_FORMAT: &str = "%y%m%d %H:%M:%S";

/// Everything the writer needs from a run.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub window: WindowBounds,
    pub total_events: usize,
    pub duplicates_removed: usize,
    pub skipped_files: Vec<SkippedFile>,
    pub events: Vec<ChangeEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WindowBounds {
    pub start: String,
    pub end: String,
}

impl Report {
    /// Build a report, sorting `events` by timestamp.
    pub fn new(
        window: &TimeWindow,
        mut events: Vec<ChangeEvent>,
        duplicates_removed: usize,
        skipped_files: Vec<SkippedFile>,
    ) -> Self {
        events.sort_by_key(|e| e.timestamp);
        Self {
            window: WindowBounds {
                start: format_time(&window.start()),
                end: format_time(&window.end()),
            },
            total_events: events.len(),
            duplicates_removed,
            skipped_files,
            events,
        }
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str("# Binary Log Analysis Results\n");
        out.push_str(&format!(
            "# Time Range: {} ~ {}\n",
            self.window.start, self.window.end
        ));
        out.push_str(&format!("# Total Events: {}\n\n", self.total_events));

        for event in &self.events {
            out.push_str(&format!("# at {}\n", event.log_position));
            out.push_str(&format!(
                "#{} server id {}  end_log_pos {}\n",
                event.timestamp.format(EVENT_TIME_FORMAT),
                event.origin_id,
                event.log_position
            ));
            out.push_str(&format!("# Binary Log File: {}\n", event.source_file));
            if !event.database.is_empty() {
                out.push_str(&format!("use {};\n", event.database));
            }
            out.push_str(&format!("{};\n\n", event.statement));
        }
        out
    }

    pub fn render_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Text => Ok(self.render_text()),
            OutputFormat::Json => self.render_json(),
        }
    }

    /// Write to `path`, or stdout when `None`.
    pub fn write(&self, format: OutputFormat, path: Option<&Path>) -> Result<()> {
        let rendered = self.render(format)?;
        match path {
            Some(path) => {
                let mut out = BufWriter::new(File::create(path)?);
                out.write_all(rendered.as_bytes())?;
                out.flush()?;
                debug!("Report written to {}", path.display());
            }
            None => {
                let stdout = std::io::stdout();
                let mut out = stdout.lock();
                out.write_all(rendered.as_bytes())?;
                out.flush()?;
            }
        }
        Ok(())
    }

    /// One-line run summary for stderr.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} unique events, {} duplicates removed",
            self.total_events, self.duplicates_removed
        );
        if !self.skipped_files.is_empty() {
            let skipped: Vec<String> = self.skipped_files.iter().map(|s| s.to_string()).collect();
            line.push_str(&format!(
                ", {} files skipped ({})",
                skipped.len(),
                skipped.join("; ")
            ));
        }
        line
    }
}
