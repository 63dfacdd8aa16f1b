//! Binary log listing via `SHOW BINARY LOGS`

use crate::common::{CatalogClient, ConnectionConfig, LogFileDescriptor, Result, ScanError};
use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{from_value_opt, Conn, Opts, OptsBuilder, Value as SqlValue};
use tracing::{debug, warn};

/// Lists log files over a regular client connection.
#[derive(Debug, Clone)]
pub struct MySqlCatalog {
    config: ConnectionConfig,
}

impl MySqlCatalog {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    async fn connect(&self) -> Result<Conn> {
        let opts = Opts::from_url(&self.config.url()?)
            .map_err(|e| ScanError::config(format!("Invalid MySQL connection settings: {}", e)))?;
        let opts = OptsBuilder::from_opts(opts).prefer_socket(false);
        Conn::new(opts)
            .await
            .map_err(|e| ScanError::connection(format!("Failed to connect to MySQL: {}", e)))
    }
}

#[async_trait]
impl CatalogClient for MySqlCatalog {
    async fn list_log_files(&self) -> Result<Vec<LogFileDescriptor>> {
        let mut conn = self.connect().await?;
        let rows: Vec<mysql_async::Row> = conn
            .query("SHOW BINARY LOGS")
            .await
            .map_err(|e| ScanError::catalog(format!("SHOW BINARY LOGS failed: {}", e)))?;

        let files = rows
            .into_iter()
            .map(|row| {
                let values: Vec<SqlValue> = row
                    .unwrap_raw()
                    .into_iter()
                    .map(|v| v.unwrap_or(SqlValue::NULL))
                    .collect();
                parse_log_row(&values)
            })
            .collect::<Result<Vec<_>>>()?;

        if let Err(e) = conn.disconnect().await {
            warn!("Failed to close catalog connection: {}", e);
        }
        debug!("Server lists {} binary log files", files.len());
        Ok(files)
    }
}

/// One row of `SHOW BINARY LOGS`: name, size and, on 8.0, an `Encrypted`
/// column that is ignored.
fn parse_log_row(values: &[SqlValue]) -> Result<LogFileDescriptor> {
    let [name, size, ..] = values else {
        return Err(ScanError::catalog(format!(
            "SHOW BINARY LOGS returned {} columns, expected at least 2",
            values.len()
        )));
    };
    let name: String = from_value_opt(name.clone())
        .map_err(|e| ScanError::catalog(format!("bad log name: {}", e)))?;
    let size: i64 = from_value_opt(size.clone())
        .map_err(|e| ScanError::catalog(format!("bad size for {}: {}", name, e)))?;
    Ok(LogFileDescriptor::new(name, size))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> SqlValue {
        SqlValue::Bytes(s.as_bytes().to_vec())
    }

    #[test]
    fn test_two_column_row() {
        let row = [text("mysql-bin.000001"), text("1024")];
        assert_eq!(
            parse_log_row(&row).unwrap(),
            LogFileDescriptor::new("mysql-bin.000001", 1024)
        );
    }

    #[test]
    fn test_three_column_row() {
        let row = [text("binlog.000042"), SqlValue::Int(157), text("No")];
        assert_eq!(
            parse_log_row(&row).unwrap(),
            LogFileDescriptor::new("binlog.000042", 157)
        );
    }

    #[test]
    fn test_short_row_is_an_error() {
        assert!(matches!(
            parse_log_row(&[text("binlog.000001")]),
            Err(ScanError::Catalog(_))
        ));
    }

    #[test]
    fn test_non_numeric_size_is_an_error() {
        assert!(parse_log_row(&[text("binlog.000001"), text("big")]).is_err());
    }
}
