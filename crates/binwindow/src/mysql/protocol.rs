//! MySQL replication wire protocol
//!
//! Just enough of the client/server protocol to stream a binary log:
//! - Handshake and authentication (mysql_native_password, caching_sha2_password)
//! - COM_QUERY for session variables
//! - COM_REGISTER_SLAVE
//! - COM_BINLOG_DUMP, optionally non-blocking so the server ends the stream
//!   at the newest event instead of waiting for more

use anyhow::{bail, Context, Result};
use bytes::{BufMut, Bytes, BytesMut};
use sha1::{Digest, Sha1};
use sha2::Sha256;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

/// TCP connect timeout
pub const CONNECTION_TIMEOUT_SECS: u64 = 30;
/// Maximum payload of a single packet; longer payloads are split.
const MAX_PACKET_SIZE: usize = 16_777_215;
/// Longest user name the server accepts.
const MAX_USER_LENGTH: usize = 32;
/// utf8mb4_general_ci
const CHARSET_UTF8MB4: u8 = 45;

const COM_QUERY: u8 = 0x03;
const COM_BINLOG_DUMP: u8 = 0x12;
const COM_REGISTER_SLAVE: u8 = 0x15;
/// Return EOF instead of blocking at the end of the newest log.
const BINLOG_DUMP_NON_BLOCK: u16 = 0x01;

/// Client capability flags
pub mod capability {
    pub const LONG_PASSWORD: u32 = 0x0000_0001;
    pub const PROTOCOL_41: u32 = 0x0000_0200;
    pub const TRANSACTIONS: u32 = 0x0000_2000;
    pub const SECURE_CONNECTION: u32 = 0x0000_8000;
    pub const PLUGIN_AUTH: u32 = 0x0008_0000;
    pub const DEPRECATE_EOF: u32 = 0x0100_0000;
}

/// Server replies that callers classify differently from I/O failures.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("access denied: {0}")]
    AuthRejected(String),
    #[error("server error {code}: {message}")]
    Server { code: u16, message: String },
}

impl WireError {
    /// Parse an ERR packet (first byte 0xFF).
    fn from_err_packet(packet: &[u8]) -> Self {
        let (code, message) = parse_err_packet(packet);
        WireError::Server { code, message }
    }
}

fn parse_err_packet(packet: &[u8]) -> (u16, String) {
    let code = match packet {
        [_, lo, hi, ..] => u16::from_le_bytes([*lo, *hi]),
        _ => 0,
    };
    // With PROTOCOL_41 a '#' and five-byte SQL state precede the message.
    let message_at = if packet.get(3) == Some(&b'#') { 9 } else { 3 };
    let message = packet
        .get(message_at..)
        .map(|m| String::from_utf8_lossy(m).into_owned())
        .unwrap_or_default();
    (code, message)
}

// ============================================================================
// Handshake
// ============================================================================

/// Initial greeting from the server
#[derive(Debug, Clone)]
pub struct Greeting {
    pub server_version: String,
    pub connection_id: u32,
    pub capabilities: u32,
    pub scramble: Vec<u8>,
    pub auth_plugin: String,
}

impl Greeting {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor { rest: data };

        let protocol = cursor.take(1)?[0];
        if protocol != 10 {
            bail!("unsupported handshake protocol version {}", protocol);
        }

        let server_version = cursor.take_cstr().context("unterminated server version")?;
        let connection_id = u32::from_le_bytes(cursor.take(4)?.try_into()?);
        let mut scramble = cursor.take(8)?.to_vec();
        cursor.take(1)?; // filler
        let caps_low = u16::from_le_bytes(cursor.take(2)?.try_into()?);
        cursor.take(1)?; // character set
        cursor.take(2)?; // status flags
        let caps_high = u16::from_le_bytes(cursor.take(2)?.try_into()?);
        let capabilities = (u32::from(caps_high) << 16) | u32::from(caps_low);
        let auth_data_len = cursor.take(1)?[0] as usize;
        cursor.take(10)?; // reserved

        if capabilities & capability::SECURE_CONNECTION != 0 {
            let part2 = cursor.take(auth_data_len.saturating_sub(8).max(13))?;
            let end = part2.iter().position(|&b| b == 0).unwrap_or(part2.len());
            scramble.extend_from_slice(&part2[..end]);
        }

        let auth_plugin = if capabilities & capability::PLUGIN_AUTH != 0 {
            // Some servers omit the trailing NUL on the plugin name.
            cursor
                .take_cstr()
                .unwrap_or_else(|_| String::from_utf8_lossy(cursor.rest).into_owned())
        } else {
            "mysql_native_password".to_string()
        };

        Ok(Self {
            server_version,
            connection_id,
            capabilities,
            scramble,
            auth_plugin,
        })
    }
}

struct Cursor<'a> {
    rest: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.rest.len() < n {
            bail!("truncated handshake packet");
        }
        let (head, tail) = self.rest.split_at(n);
        self.rest = tail;
        Ok(head)
    }

    fn take_cstr(&mut self) -> Result<String> {
        let end = self
            .rest
            .iter()
            .position(|&b| b == 0)
            .context("missing NUL terminator")?;
        let s = String::from_utf8_lossy(&self.rest[..end]).into_owned();
        self.rest = &self.rest[end + 1..];
        Ok(s)
    }
}

// ============================================================================
// Connection
// ============================================================================

/// An authenticated connection that can be turned into a binlog stream.
pub struct ReplicationConnection {
    stream: BufReader<TcpStream>,
    sequence_id: u8,
    server_version: String,
    connection_id: u32,
}

impl std::fmt::Debug for ReplicationConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationConnection")
            .field("server_version", &self.server_version)
            .field("connection_id", &self.connection_id)
            .finish_non_exhaustive()
    }
}

impl ReplicationConnection {
    /// Connect and authenticate.
    pub async fn connect(host: &str, port: u16, user: &str, password: Option<&str>) -> Result<Self> {
        if user.is_empty() || user.len() > MAX_USER_LENGTH || user.contains('\0') {
            bail!("invalid user name '{}'", user);
        }

        let addr = format!("{}:{}", host, port);
        debug!("Connecting to MySQL at {}", addr);

        let tcp = match timeout(
            Duration::from_secs(CONNECTION_TIMEOUT_SECS),
            TcpStream::connect(&addr),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(e).with_context(|| format!("failed to connect to {}", addr)),
            Err(_) => bail!(
                "connection timeout after {}s connecting to {}",
                CONNECTION_TIMEOUT_SECS,
                addr
            ),
        };
        tcp.set_nodelay(true)?;

        let mut conn = Self {
            stream: BufReader::new(tcp),
            sequence_id: 0,
            server_version: String::new(),
            connection_id: 0,
        };

        let greeting_bytes = conn.read_packet().await?;
        if greeting_bytes.first() == Some(&0xFF) {
            return Err(WireError::from_err_packet(&greeting_bytes).into());
        }
        let greeting = Greeting::parse(&greeting_bytes).context("failed to parse handshake")?;
        conn.server_version = greeting.server_version.clone();
        conn.connection_id = greeting.connection_id;
        debug!(
            "Connected to MySQL {} (connection_id={}, plugin={})",
            greeting.server_version, greeting.connection_id, greeting.auth_plugin
        );

        conn.authenticate(user, password, &greeting).await?;
        Ok(conn)
    }

    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    pub fn connection_id(&self) -> u32 {
        self.connection_id
    }

    /// Read one logical packet, joining continuation packets.
    async fn read_packet(&mut self) -> Result<Vec<u8>> {
        let mut payload = Vec::new();
        loop {
            let mut header = [0u8; 4];
            self.stream.read_exact(&mut header).await?;
            let len = usize::from(header[0])
                | (usize::from(header[1]) << 8)
                | (usize::from(header[2]) << 16);
            self.sequence_id = header[3].wrapping_add(1);

            let start = payload.len();
            payload.resize(start + len, 0);
            self.stream.read_exact(&mut payload[start..]).await?;
            if len < MAX_PACKET_SIZE {
                return Ok(payload);
            }
        }
    }

    async fn write_packet(&mut self, data: &[u8]) -> Result<()> {
        if data.len() >= MAX_PACKET_SIZE {
            bail!("packet too large: {} bytes", data.len());
        }
        let mut packet = BytesMut::with_capacity(4 + data.len());
        packet.put_uint_le(data.len() as u64, 3);
        packet.put_u8(self.sequence_id);
        packet.put_slice(data);

        let writer = self.stream.get_mut();
        writer.write_all(&packet).await?;
        writer.flush().await?;
        self.sequence_id = self.sequence_id.wrapping_add(1);
        Ok(())
    }

    /// Start a new command exchange.
    async fn send_command(&mut self, data: &[u8]) -> Result<()> {
        self.sequence_id = 0;
        self.write_packet(data).await
    }

    async fn authenticate(
        &mut self,
        user: &str,
        password: Option<&str>,
        greeting: &Greeting,
    ) -> Result<()> {
        let flags = capability::PROTOCOL_41
            | capability::SECURE_CONNECTION
            | capability::LONG_PASSWORD
            | capability::TRANSACTIONS
            | capability::PLUGIN_AUTH
            | capability::DEPRECATE_EOF;

        let plugin = match greeting.auth_plugin.as_str() {
            "mysql_native_password" | "caching_sha2_password" => greeting.auth_plugin.as_str(),
            other => {
                warn!("Unknown auth plugin {}, trying mysql_native_password", other);
                "mysql_native_password"
            }
        };
        let auth = scramble_for(plugin, password, &greeting.scramble)?;

        let mut response = BytesMut::with_capacity(64 + user.len() + auth.len());
        response.put_u32_le(flags);
        response.put_u32_le(MAX_PACKET_SIZE as u32);
        response.put_u8(CHARSET_UTF8MB4);
        response.put_slice(&[0u8; 23]);
        response.put_slice(user.as_bytes());
        response.put_u8(0);
        response.put_u8(auth.len() as u8);
        response.put_slice(&auth);
        response.put_slice(plugin.as_bytes());
        response.put_u8(0);

        self.write_packet(&response).await?;
        self.finish_auth(plugin, password).await
    }

    /// Follow the server through auth switches and fast-auth results.
    async fn finish_auth(&mut self, plugin: &str, password: Option<&str>) -> Result<()> {
        let mut plugin = plugin.to_string();
        loop {
            let reply = self.read_packet().await?;
            match reply.first() {
                Some(0x00) => {
                    debug!("Authentication successful");
                    return Ok(());
                }
                Some(0xFF) => {
                    let (_, message) = parse_err_packet(&reply);
                    return Err(WireError::AuthRejected(message).into());
                }
                Some(0xFE) => {
                    let body = &reply[1..];
                    let name_end = body.iter().position(|&b| b == 0).unwrap_or(body.len());
                    plugin = String::from_utf8_lossy(&body[..name_end]).into_owned();
                    let mut salt = body.get(name_end + 1..).unwrap_or_default().to_vec();
                    if salt.last() == Some(&0) {
                        salt.pop();
                    }
                    debug!("Auth switch to plugin: {}", plugin);
                    let auth = scramble_for(&plugin, password, &salt)?;
                    self.write_packet(&auth).await?;
                }
                Some(0x01) if plugin == "caching_sha2_password" => match reply.get(1) {
                    // Fast auth succeeded; the OK packet follows.
                    Some(0x03) => continue,
                    Some(0x04) => bail!(
                        "caching_sha2_password full authentication requires a secure connection; \
                         log in once with a TLS client to populate the server cache"
                    ),
                    _ => bail!("unexpected caching_sha2_password reply"),
                },
                Some(other) => bail!("unexpected auth reply: 0x{:02X}", other),
                None => bail!("empty auth reply"),
            }
        }
    }

    /// Run a statement that returns no rows.
    pub async fn query(&mut self, sql: &str) -> Result<()> {
        let mut packet = BytesMut::with_capacity(sql.len() + 1);
        packet.put_u8(COM_QUERY);
        packet.put_slice(sql.as_bytes());
        self.send_command(&packet).await?;

        let reply = self.read_packet().await?;
        match reply.first() {
            Some(0x00) => Ok(()),
            Some(0xFF) => Err(WireError::from_err_packet(&reply).into()),
            _ => bail!("unexpected result set for '{}'", sql),
        }
    }

    /// Tell the server we understand its checksum setting, so it sends
    /// events with their checksums instead of refusing the dump.
    pub async fn negotiate_checksum(&mut self) -> Result<()> {
        if let Err(e) = self
            .query("SET @source_binlog_checksum = @@global.binlog_checksum")
            .await
        {
            debug!("source_binlog_checksum rejected ({}), trying master_", e);
            self.query("SET @master_binlog_checksum = @@global.binlog_checksum")
                .await?;
        }
        Ok(())
    }

    pub async fn register_replica(&mut self, server_id: u32) -> Result<()> {
        let mut packet = BytesMut::with_capacity(18);
        packet.put_u8(COM_REGISTER_SLAVE);
        packet.put_u32_le(server_id);
        packet.put_u8(0); // hostname
        packet.put_u8(0); // user
        packet.put_u8(0); // password
        packet.put_u16_le(0); // port
        packet.put_u32_le(0); // replication rank
        packet.put_u32_le(0); // source id
        self.send_command(&packet).await?;

        let reply = self.read_packet().await?;
        match reply.first() {
            Some(0x00) => {
                debug!("Registered as replica with server_id={}", server_id);
                Ok(())
            }
            Some(0xFF) => Err(WireError::from_err_packet(&reply).into()),
            _ => bail!("unexpected reply to COM_REGISTER_SLAVE"),
        }
    }

    /// Ask the server to stream `file` from `position`.
    pub async fn start_dump(
        &mut self,
        server_id: u32,
        file: &str,
        position: u32,
        non_blocking: bool,
    ) -> Result<()> {
        let mut packet = BytesMut::with_capacity(file.len() + 11);
        packet.put_u8(COM_BINLOG_DUMP);
        packet.put_u32_le(position);
        packet.put_u16_le(if non_blocking { BINLOG_DUMP_NON_BLOCK } else { 0 });
        packet.put_u32_le(server_id);
        packet.put_slice(file.as_bytes());
        self.send_command(&packet).await?;
        debug!("Started binlog dump from {}:{}", file, position);
        Ok(())
    }

    /// Next raw event from a running dump; `None` once the server sends EOF.
    pub async fn next_event(&mut self) -> Result<Option<Bytes>> {
        let packet = self.read_packet().await?;
        match packet.first() {
            None => Ok(None),
            Some(0x00) => Ok(Some(Bytes::from(packet).slice(1..))),
            Some(0xFE) => {
                debug!("Received EOF in binlog stream");
                Ok(None)
            }
            Some(0xFF) => Err(WireError::from_err_packet(&packet).into()),
            Some(other) => bail!("unexpected binlog packet marker 0x{:02X}", other),
        }
    }
}

fn scramble_for(plugin: &str, password: Option<&str>, salt: &[u8]) -> Result<Vec<u8>> {
    match plugin {
        "mysql_native_password" => Ok(scramble_native(password, salt)),
        "caching_sha2_password" => Ok(scramble_sha2(password, salt)),
        other => bail!("unsupported auth plugin: {}", other),
    }
}

/// SHA1(password) XOR SHA1(salt + SHA1(SHA1(password)))
fn scramble_native(password: Option<&str>, salt: &[u8]) -> Vec<u8> {
    let Some(pwd) = password.filter(|p| !p.is_empty()) else {
        return Vec::new();
    };
    let stage1 = Sha1::digest(pwd.as_bytes());
    let stage2 = Sha1::digest(stage1);
    let mut hasher = Sha1::new();
    hasher.update(salt);
    hasher.update(stage2);
    let stage3 = hasher.finalize();
    stage1.iter().zip(stage3.iter()).map(|(a, b)| a ^ b).collect()
}

/// SHA256(password) XOR SHA256(SHA256(SHA256(password)) + salt)
fn scramble_sha2(password: Option<&str>, salt: &[u8]) -> Vec<u8> {
    let Some(pwd) = password.filter(|p| !p.is_empty()) else {
        return Vec::new();
    };
    let hash1 = Sha256::digest(pwd.as_bytes());
    let hash2 = Sha256::digest(hash1);
    let mut hasher = Sha256::new();
    hasher.update(hash2);
    hasher.update(salt);
    let hash3 = hasher.finalize();
    hash1.iter().zip(hash3.iter()).map(|(a, b)| a ^ b).collect()
}
