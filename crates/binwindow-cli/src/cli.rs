//! Command-line arguments
//!
//! Flags mirror the classic tool (`-H -P -u -p -s -e -o -v -w`); every
//! connection setting can also come from a `BINWINDOW_*` variable.

use binwindow::{ConnectionConfig, LocatorConfig, OutputFormat, Result, RunConfig, TimeWindow};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Extract the MySQL binary log events of a time window
///
/// Finds the binary log files that can hold events between START and END,
/// reads them over the replication protocol and prints the events as
/// approximate SQL statements in time order.
#[derive(Parser, Debug)]
#[command(name = "binwindow")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    // ============ Connection ============
    /// MySQL host
    #[arg(short = 'H', long, default_value = "localhost", env = "BINWINDOW_HOST")]
    pub host: String,

    /// MySQL port
    #[arg(short = 'P', long, default_value = "3306", env = "BINWINDOW_PORT")]
    pub port: u16,

    /// MySQL user with REPLICATION SLAVE and REPLICATION CLIENT privileges
    #[arg(short, long, default_value = "root", env = "BINWINDOW_USER")]
    pub user: String,

    /// MySQL password
    #[arg(short, long, default_value = "", env = "BINWINDOW_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// First replica server id used by stream connections
    #[arg(long, default_value = "100", env = "BINWINDOW_SERVER_ID")]
    pub server_id: u32,

    // ============ Window ============
    /// Window start (YYYY-MM-DD HH:MM:SS, UTC)
    #[arg(short, long, alias = "start-time")]
    pub start: String,

    /// Window end (YYYY-MM-DD HH:MM:SS, UTC)
    #[arg(short, long, alias = "end-time")]
    pub end: String,

    // ============ Output ============
    /// Write the report to this file instead of stdout
    #[arg(short, long, env = "BINWINDOW_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Report format
    #[arg(long, value_enum, default_value = "text", env = "BINWINDOW_FORMAT")]
    pub format: Format,

    /// Probe every file and print its estimated range instead of extracting
    #[arg(long)]
    pub list_ranges: bool,

    /// Debug logging on stderr
    #[arg(short, long)]
    pub verbose: bool,

    // ============ Tuning ============
    /// Parallel workers; 0 or 1 probes files strictly one after another
    #[arg(short, long, default_value = "3", env = "BINWINDOW_WORKERS")]
    pub workers: usize,

    /// Hours of slack around the window before a file is excluded
    #[arg(long, default_value = "6", env = "BINWINDOW_RANGE_BUFFER_HOURS")]
    pub range_buffer_hours: u32,

    /// Estimated file spans wider than this many hours are always scanned
    #[arg(long, default_value = "24", env = "BINWINDOW_WIDE_RANGE_HOURS")]
    pub wide_range_hours: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Json,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Text => OutputFormat::Text,
            Format::Json => OutputFormat::Json,
        }
    }
}

impl Cli {
    /// Validate the arguments into a run configuration.
    pub fn to_run_config(&self) -> Result<RunConfig> {
        let window = TimeWindow::parse(&self.start, &self.end)?;
        let connection = ConnectionConfig::new(self.host.clone(), self.user.clone())
            .with_port(self.port)
            .with_password(self.password.clone())
            .with_server_id_base(self.server_id);
        let locator = LocatorConfig {
            range_buffer: chrono::Duration::hours(i64::from(self.range_buffer_hours)),
            wide_range: chrono::Duration::hours(i64::from(self.wide_range_hours)),
            ..Default::default()
        };

        let mut config = RunConfig::new(connection, window)
            .with_format(self.format.into())
            .with_workers(self.workers)
            .with_verbose(self.verbose)
            .with_locator(locator);
        if let Some(path) = &self.output {
            config = config.with_output(path.clone());
        }
        config.validate()?;
        Ok(config)
    }

    /// Default log filter when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "binwindow=debug,binwindow_cli=debug"
        } else {
            "warn"
        }
    }
}
