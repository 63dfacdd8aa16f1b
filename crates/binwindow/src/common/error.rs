//! Error types for window scans
//!
//! Errors are classified so the orchestrator can tell transient failures
//! (worth another attempt) from fatal ones, and so per-file failures can be
//! reported without aborting the run.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Error categories for logging and exit reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Invalid operator input (time format, window, worker count)
    Configuration,
    /// Connection, timeout and socket failures
    Network,
    /// Server-side rejections (authentication, catalog query)
    Database,
    /// Malformed replication stream data
    Protocol,
    /// Report encoding
    Serialization,
    /// Other/unknown errors
    Other,
}

/// Errors raised while locating and extracting window events
#[derive(Error, Debug)]
pub enum ScanError {
    /// Time string does not match `YYYY-MM-DD HH:MM:SS`
    #[error("Invalid time format: {0}")]
    InvalidTime(String),

    /// Window start after window end
    #[error("Start time {start} is after end time {end}")]
    InvalidWindow { start: String, end: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Could not reach or keep a connection to the server
    #[error("Connection error: {0}")]
    Connection(String),

    /// Server rejected the credentials
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Listing log files failed
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Replication stream returned an error or could not be started
    #[error("Stream error: {0}")]
    Stream(String),

    /// Event bytes could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Operation exceeded its deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// No log file overlaps the requested window
    #[error("No binary log files found in the specified time range")]
    NoFilesInRange,

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ScanError {
    pub fn invalid_time(msg: impl Into<String>) -> Self {
        Self::InvalidTime(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn catalog(msg: impl Into<String>) -> Self {
        Self::Catalog(msg.into())
    }

    pub fn stream(msg: impl Into<String>) -> Self {
        Self::Stream(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Whether another attempt at the same operation could succeed.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout(_) => true,

            // Server-side stream errors are usually "too many connections"
            // or a replica id clash, both of which clear up.
            Self::Stream(_) => true,

            Self::Io(e) => {
                use std::io::ErrorKind;
                matches!(
                    e.kind(),
                    ErrorKind::ConnectionReset
                        | ErrorKind::ConnectionAborted
                        | ErrorKind::ConnectionRefused
                        | ErrorKind::TimedOut
                        | ErrorKind::UnexpectedEof
                        | ErrorKind::Interrupted
                )
            }

            Self::InvalidTime(_)
            | Self::InvalidWindow { .. }
            | Self::Config(_)
            | Self::Auth(_)
            | Self::Catalog(_)
            | Self::Decode(_)
            | Self::NoFilesInRange
            | Self::Json(_)
            | Self::Other(_) => false,
        }
    }

    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidTime(_) | Self::InvalidWindow { .. } | Self::Config(_) => {
                ErrorCategory::Configuration
            }
            Self::Connection(_) | Self::Timeout(_) | Self::Io(_) => ErrorCategory::Network,
            Self::Auth(_) | Self::Catalog(_) | Self::NoFilesInRange => ErrorCategory::Database,
            Self::Stream(_) | Self::Decode(_) => ErrorCategory::Protocol,
            Self::Json(_) => ErrorCategory::Serialization,
            Self::Other(_) => ErrorCategory::Other,
        }
    }

    /// Stable short code for logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidTime(_) => "invalid_time",
            Self::InvalidWindow { .. } => "invalid_window",
            Self::Config(_) => "config_error",
            Self::Connection(_) => "connection_error",
            Self::Auth(_) => "auth_failed",
            Self::Catalog(_) => "catalog_error",
            Self::Stream(_) => "stream_error",
            Self::Decode(_) => "decode_error",
            Self::Timeout(_) => "timeout",
            Self::NoFilesInRange => "no_files_in_range",
            Self::Json(_) => "json_error",
            Self::Io(_) => "io_error",
            Self::Other(_) => "unknown",
        }
    }
}

/// Result type for scan operations
pub type Result<T> = std::result::Result<T, ScanError>;

/// Which stage of the pipeline gave up on a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    Probe,
    Extract,
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanPhase::Probe => write!(f, "probe"),
            ScanPhase::Extract => write!(f, "extract"),
        }
    }
}

/// A file left out of the run, with the reason.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{file}: {phase} failed: {reason}")]
pub struct SkippedFile {
    pub file: String,
    pub phase: ScanPhase,
    pub reason: String,
}

impl SkippedFile {
    pub fn new(file: impl Into<String>, phase: ScanPhase, err: &ScanError) -> Self {
        Self {
            file: file.into(),
            phase,
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ScanError::stream("Could not find first log file name in binary log index file");
        assert!(err.to_string().contains("Stream error"));
        assert!(err.to_string().contains("first log file"));

        let err = ScanError::InvalidWindow {
            start: "2024-01-02 00:00:00".into(),
            end: "2024-01-01 00:00:00".into(),
        };
        assert_eq!(
            err.to_string(),
            "Start time 2024-01-02 00:00:00 is after end time 2024-01-01 00:00:00"
        );
    }

    #[test]
    fn test_error_is_retriable() {
        assert!(ScanError::connection("reset by peer").is_retriable());
        assert!(ScanError::timeout("30s").is_retriable());
        assert!(ScanError::stream("Too many connections").is_retriable());
        assert!(
            ScanError::Io(std::io::Error::from(std::io::ErrorKind::ConnectionReset))
                .is_retriable()
        );

        assert!(!ScanError::auth("Access denied").is_retriable());
        assert!(!ScanError::config("workers").is_retriable());
        assert!(!ScanError::decode("short read").is_retriable());
        assert!(!ScanError::NoFilesInRange.is_retriable());
        assert!(
            !ScanError::Io(std::io::Error::from(std::io::ErrorKind::PermissionDenied))
                .is_retriable()
        );
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            ScanError::invalid_time("x").category(),
            ErrorCategory::Configuration
        );
        assert_eq!(ScanError::timeout("x").category(), ErrorCategory::Network);
        assert_eq!(ScanError::auth("x").category(), ErrorCategory::Database);
        assert_eq!(ScanError::decode("x").category(), ErrorCategory::Protocol);
        assert_eq!(ScanError::other("x").category(), ErrorCategory::Other);
    }

    #[test]
    fn test_error_code() {
        assert_eq!(ScanError::NoFilesInRange.error_code(), "no_files_in_range");
        assert_eq!(ScanError::timeout("x").error_code(), "timeout");
        assert_eq!(ScanError::config("x").error_code(), "config_error");
    }

    #[test]
    fn test_skipped_file_display() {
        let skipped = SkippedFile::new(
            "mysql-bin.000007",
            ScanPhase::Probe,
            &ScanError::connection("refused"),
        );
        assert_eq!(
            skipped.to_string(),
            "mysql-bin.000007: probe failed: Connection error: refused"
        );
    }
}
