//! Event streams over a replication connection
//!
//! Each [`MySqlStreamClient::open_stream`] call opens a fresh connection and
//! registers it with its own replica server id, so any number of streams can
//! run against the same server at once.

use crate::common::{
    ConnectionConfig, EventStream, EventStreamClient, LogEvent, LogFileDescriptor, Result,
    ScanError,
};
use crate::mysql::decoder::BinlogDecoder;
use crate::mysql::protocol::{ReplicationConnection, WireError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, trace};

/// Opens non-blocking binlog dumps.
#[derive(Debug)]
pub struct MySqlStreamClient {
    config: ConnectionConfig,
    next_id: AtomicU32,
}

impl MySqlStreamClient {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            next_id: AtomicU32::new(0),
        }
    }

    /// Replica id for the next stream.
    fn allocate_server_id(&self) -> u32 {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.config.server_id_base.wrapping_add(n)
    }
}

#[async_trait]
impl EventStreamClient for MySqlStreamClient {
    async fn open_stream(
        &self,
        file: &LogFileDescriptor,
        offset: u32,
    ) -> Result<Box<dyn EventStream>> {
        let server_id = self.allocate_server_id();
        debug!(
            "Opening stream on {} at {} (server_id={})",
            file.name, offset, server_id
        );

        let mut conn = ReplicationConnection::connect(
            &self.config.host,
            self.config.port,
            &self.config.user,
            self.config.password.as_deref(),
        )
        .await
        .map_err(classify)?;

        conn.negotiate_checksum().await.map_err(classify)?;
        conn.register_replica(server_id).await.map_err(classify)?;
        conn.start_dump(server_id, &file.name, offset, true)
            .await
            .map_err(classify)?;

        Ok(Box::new(MySqlEventStream {
            conn,
            decoder: BinlogDecoder::new(),
            finished: false,
        }))
    }
}

/// A running dump with its decoder state.
pub struct MySqlEventStream {
    conn: ReplicationConnection,
    decoder: BinlogDecoder,
    finished: bool,
}

#[async_trait]
impl EventStream for MySqlEventStream {
    async fn next_event(&mut self) -> Result<Option<LogEvent>> {
        if self.finished {
            return Ok(None);
        }
        let Some(raw) = self.conn.next_event().await.map_err(classify)? else {
            self.finished = true;
            return Ok(None);
        };
        let event = self
            .decoder
            .decode(&raw)
            .map_err(|e| ScanError::decode(format!("{:#}", e)))?;
        trace!(
            "Event type {} at {} (ts={})",
            event.header.type_code,
            event.header.end_offset,
            event.header.timestamp
        );
        Ok(Some(event))
    }
}

/// Map a protocol failure onto the scan error taxonomy.
pub(crate) fn classify(err: anyhow::Error) -> ScanError {
    if let Some(wire) = err.downcast_ref::<WireError>() {
        return match wire {
            WireError::AuthRejected(msg) => ScanError::auth(msg.clone()),
            WireError::Server { .. } => ScanError::stream(wire.to_string()),
        };
    }
    let message = format!("{:#}", err);
    if err.chain().any(|cause| cause.is::<std::io::Error>()) {
        return ScanError::connection(message);
    }
    if message.contains("timeout") {
        return ScanError::timeout(message);
    }
    ScanError::stream(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_server_ids_are_unique_per_stream() {
        let client = MySqlStreamClient::new(ConnectionConfig::default().with_server_id_base(500));
        let ids: Vec<u32> = (0..4).map(|_| client.allocate_server_id()).collect();
        assert_eq!(ids, vec![500, 501, 502, 503]);
    }

    #[test]
    fn test_classify_auth() {
        let err = anyhow::Error::new(WireError::AuthRejected("Access denied".into()));
        assert!(matches!(classify(err), ScanError::Auth(_)));
    }

    #[test]
    fn test_classify_server_error() {
        let err = anyhow::Error::new(WireError::Server {
            code: 1236,
            message: "Could not find first log file".into(),
        });
        let scan = classify(err);
        assert!(matches!(scan, ScanError::Stream(_)));
        assert!(scan.is_retriable());
    }

    #[test]
    fn test_classify_io_in_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = Err::<(), _>(io).context("failed to connect").unwrap_err();
        assert!(matches!(classify(err), ScanError::Connection(_)));
    }

    #[test]
    fn test_classify_timeout() {
        let err = anyhow::anyhow!("connection timeout after 30s connecting to db:3306");
        assert!(matches!(classify(err), ScanError::Timeout(_)));
    }
}
