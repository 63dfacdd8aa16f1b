//! Run configuration
//!
//! A [`RunConfig`] is built once from operator input and passed by reference
//! to every stage. Nothing in it changes after the run starts.

use super::error::{Result, ScanError};
use super::retry::RetryPolicy;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Wall-clock format accepted on input and used in report headers.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse `YYYY-MM-DD HH:MM:SS` as a UTC instant.
pub fn parse_time(input: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(input.trim(), TIME_FORMAT).map_err(|e| {
        ScanError::invalid_time(format!(
            "'{}' ({}); expected YYYY-MM-DD HH:MM:SS",
            input, e
        ))
    })?;
    Ok(Utc.from_utc_datetime(&naive))
}

pub fn format_time(time: &DateTime<Utc>) -> String {
    time.format(TIME_FORMAT).to_string()
}

// ============================================================================
// Window
// ============================================================================

/// Requested extraction window. Both bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(ScanError::InvalidWindow {
                start: format_time(&start),
                end: format_time(&end),
            });
        }
        Ok(Self { start, end })
    }

    /// Parse both bounds from operator input.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_time(start)?, parse_time(end)?)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        self.start <= time && time <= self.end
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ~ {}",
            format_time(&self.start),
            format_time(&self.end)
        )
    }
}

// ============================================================================
// Connection
// ============================================================================

/// Server connection settings.
#[derive(Clone)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    /// First replica server id handed out to stream connections. Each stream
    /// takes the next id so concurrent dumps never collide on the server.
    pub server_id_base: u32,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("server_id_base", &self.server_id_base)
            .finish()
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: None,
            server_id_base: 100,
        }
    }
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            ..Default::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the password. An empty string means no password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        let password = password.into();
        self.password = if password.is_empty() {
            None
        } else {
            Some(password)
        };
        self
    }

    pub fn with_server_id_base(mut self, base: u32) -> Self {
        self.server_id_base = base;
        self
    }

    /// `mysql://` URL for the catalog client, credentials percent-encoded.
    pub fn url(&self) -> Result<String> {
        let mut url = Url::parse(&format!("mysql://{}:{}", self.host, self.port))
            .map_err(|e| ScanError::config(format!("Invalid host {}: {}", self.host, e)))?;
        url.set_username(&self.user)
            .map_err(|_| ScanError::config("Host does not accept a user name"))?;
        url.set_password(self.password.as_deref())
            .map_err(|_| ScanError::config("Host does not accept a password"))?;
        Ok(url.into())
    }
}

// ============================================================================
// Tuning
// ============================================================================

/// Heuristics used to estimate and classify file time ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorConfig {
    /// Events read from the head of a file.
    pub head_events: usize,
    /// Timestamped events sampled after the head.
    pub tail_samples: usize,
    /// Wall-clock budget for one probe inside the worker pool.
    pub probe_budget: Duration,
    /// Wall-clock budget for a probe run one file at a time.
    pub standalone_probe_budget: Duration,
    /// Estimated spans wider than this are treated as unreliable.
    pub wide_range: chrono::Duration,
    /// Slack added to both ends of the window before excluding a file.
    pub range_buffer: chrono::Duration,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            head_events: 50,
            tail_samples: 50,
            probe_budget: Duration::from_secs(1),
            standalone_probe_budget: Duration::from_secs(5),
            wide_range: chrono::Duration::hours(24),
            range_buffer: chrono::Duration::hours(6),
        }
    }
}

/// Per-file extraction budgets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorConfig {
    pub file_budget: Duration,
    /// Maximum in-window events kept per file.
    pub max_events: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            file_budget: Duration::from_secs(60),
            max_events: 10_000,
        }
    }
}

/// Report encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(ScanError::config(format!(
                "unknown output format '{}', expected text or json",
                other
            ))),
        }
    }
}

// ============================================================================
// Run
// ============================================================================

/// Everything a run needs.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub connection: ConnectionConfig,
    pub window: TimeWindow,
    /// Report destination; `None` writes to stdout.
    pub output: Option<PathBuf>,
    pub format: OutputFormat,
    /// Worker count. `<= 1` selects the sequential path.
    pub workers: usize,
    pub verbose: bool,
    pub locator: LocatorConfig,
    pub extractor: ExtractorConfig,
    pub retry: RetryPolicy,
}

impl RunConfig {
    pub fn new(connection: ConnectionConfig, window: TimeWindow) -> Self {
        Self {
            connection,
            window,
            output: None,
            format: OutputFormat::Text,
            workers: 3,
            verbose: false,
            locator: LocatorConfig::default(),
            extractor: ExtractorConfig::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_locator(mut self, locator: LocatorConfig) -> Self {
        self.locator = locator;
        self
    }

    pub fn with_extractor(mut self, extractor: ExtractorConfig) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Reject settings no run can work with.
    pub fn validate(&self) -> Result<()> {
        if self.connection.host.trim().is_empty() {
            return Err(ScanError::config("host must not be empty"));
        }
        if self.connection.user.trim().is_empty() {
            return Err(ScanError::config("user must not be empty"));
        }
        if self.locator.head_events == 0 {
            return Err(ScanError::config("head_events must be at least 1"));
        }
        if self.extractor.max_events == 0 {
            return Err(ScanError::config("max_events must be at least 1"));
        }
        if self.locator.range_buffer < chrono::Duration::zero()
            || self.locator.wide_range < chrono::Duration::zero()
        {
            return Err(ScanError::config("range heuristics must not be negative"));
        }
        Ok(())
    }
}
