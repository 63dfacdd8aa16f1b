//! MySQL binlog event decoder
//!
//! Turns raw event bytes into [`LogEvent`]s. Only the event kinds the
//! extractor cares about are decoded in full:
//! - FORMAT_DESCRIPTION_EVENT (checksum detection)
//! - TABLE_MAP_EVENT (cached by table id)
//! - WRITE/UPDATE/DELETE_ROWS_EVENT (v1 and v2)
//! - QUERY_EVENT
//!
//! Everything else becomes [`EventPayload::Other`]. A payload that fails to
//! decode also becomes `Other`, keeping the header so probes still see the
//! timestamp; only a malformed header is an error.

use crate::common::{EventPayload, LogEvent, LogEventHeader, RowBatch, Value};
use crate::mysql::json::json_to_text;
use anyhow::{bail, Context, Result};
use bytes::Buf;
use chrono::{DateTime, NaiveDate};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Binlog event type codes used by the decoder.
pub mod event_type {
    pub const QUERY: u8 = 2;
    pub const ROTATE: u8 = 4;
    pub const FORMAT_DESCRIPTION: u8 = 15;
    pub const XID: u8 = 16;
    pub const TABLE_MAP: u8 = 19;
    pub const WRITE_ROWS_V1: u8 = 23;
    pub const UPDATE_ROWS_V1: u8 = 24;
    pub const DELETE_ROWS_V1: u8 = 25;
    pub const WRITE_ROWS_V2: u8 = 30;
    pub const UPDATE_ROWS_V2: u8 = 31;
    pub const DELETE_ROWS_V2: u8 = 32;
}

/// MySQL column types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Decimal,
    Tiny,
    Short,
    Long,
    Float,
    Double,
    Null,
    Timestamp,
    LongLong,
    Int24,
    Date,
    Time,
    DateTime,
    Year,
    NewDate,
    Varchar,
    Bit,
    Timestamp2,
    DateTime2,
    Time2,
    Json,
    NewDecimal,
    Enum,
    Set,
    TinyBlob,
    MediumBlob,
    LongBlob,
    Blob,
    VarString,
    String,
    Geometry,
    Unknown(u8),
}

impl ColumnType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => ColumnType::Decimal,
            1 => ColumnType::Tiny,
            2 => ColumnType::Short,
            3 => ColumnType::Long,
            4 => ColumnType::Float,
            5 => ColumnType::Double,
            6 => ColumnType::Null,
            7 => ColumnType::Timestamp,
            8 => ColumnType::LongLong,
            9 => ColumnType::Int24,
            10 => ColumnType::Date,
            11 => ColumnType::Time,
            12 => ColumnType::DateTime,
            13 => ColumnType::Year,
            14 => ColumnType::NewDate,
            15 => ColumnType::Varchar,
            16 => ColumnType::Bit,
            17 => ColumnType::Timestamp2,
            18 => ColumnType::DateTime2,
            19 => ColumnType::Time2,
            245 => ColumnType::Json,
            246 => ColumnType::NewDecimal,
            247 => ColumnType::Enum,
            248 => ColumnType::Set,
            249 => ColumnType::TinyBlob,
            250 => ColumnType::MediumBlob,
            251 => ColumnType::LongBlob,
            252 => ColumnType::Blob,
            253 => ColumnType::VarString,
            254 => ColumnType::String,
            255 => ColumnType::Geometry,
            other => ColumnType::Unknown(other),
        }
    }
}

/// Column layout of a table, from a TABLE_MAP event.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMap {
    pub table_id: u64,
    pub schema: String,
    pub table: String,
    pub column_types: Vec<ColumnType>,
    pub column_metadata: Vec<u16>,
}

// ============================================================================
// Payload reader
// ============================================================================

/// Bounds-checked little-endian reader over an event payload.
struct PayloadReader<'a> {
    data: &'a [u8],
}

impl<'a> PayloadReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn remaining(&self) -> usize {
        self.data.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.data.len() < n {
            bail!(
                "truncated event: need {} bytes, {} remaining",
                n,
                self.data.len()
            );
        }
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Ok(head)
    }

    fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.data)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?.get_u8())
    }

    fn u16_le(&mut self) -> Result<u16> {
        Ok(self.take(2)?.get_u16_le())
    }

    fn u32_le(&mut self) -> Result<u32> {
        Ok(self.take(4)?.get_u32_le())
    }

    fn u64_le(&mut self) -> Result<u64> {
        Ok(self.take(8)?.get_u64_le())
    }

    fn uint_le(&mut self, n: usize) -> Result<u64> {
        Ok(self.take(n)?.get_uint_le(n))
    }

    fn uint_be(&mut self, n: usize) -> Result<u64> {
        Ok(self.take(n)?.get_uint(n))
    }

    /// Length-encoded integer.
    fn packed_int(&mut self) -> Result<u64> {
        match self.u8()? {
            first @ 0..=250 => Ok(u64::from(first)),
            251 => Ok(0),
            252 => self.uint_le(2),
            253 => self.uint_le(3),
            254 => self.u64_le(),
            other => bail!("invalid packed integer prefix: {}", other),
        }
    }
}

// ============================================================================
// Decoder
// ============================================================================

/// Stateful decoder for one replication stream.
///
/// Holds the checksum setting from the last FORMAT_DESCRIPTION event and
/// the table maps seen so far; row events are decoded against them.
#[derive(Debug, Default)]
pub struct BinlogDecoder {
    tables: HashMap<u64, TableMap>,
    checksum: bool,
}

impl BinlogDecoder {
    /// Common header size
    pub const HEADER_SIZE: usize = 19;

    pub fn new() -> Self {
        Self::default()
    }

    /// Whether events carry a trailing CRC32.
    pub fn has_checksum(&self) -> bool {
        self.checksum
    }

    pub fn table(&self, table_id: u64) -> Option<&TableMap> {
        self.tables.get(&table_id)
    }

    /// Parse the common header.
    pub fn parse_header(data: &[u8]) -> Result<LogEventHeader> {
        if data.len() < Self::HEADER_SIZE {
            bail!("event too short: {} bytes", data.len());
        }
        let mut r = PayloadReader::new(&data[..Self::HEADER_SIZE]);
        let timestamp = r.u32_le()?;
        let type_code = r.u8()?;
        let origin_id = r.u32_le()?;
        let event_length = r.u32_le()?;
        let end_offset = r.u32_le()?;
        Ok(LogEventHeader {
            timestamp,
            origin_id,
            end_offset,
            event_length,
            type_code,
        })
    }

    /// Decode one event.
    pub fn decode(&mut self, data: &[u8]) -> Result<LogEvent> {
        let header = Self::parse_header(data)?;
        let body = &data[Self::HEADER_SIZE..];

        if header.type_code == event_type::FORMAT_DESCRIPTION {
            self.checksum = format_description_has_checksum(body);
            debug!("Format description: checksum={}", self.checksum);
            return Ok(LogEvent {
                header,
                payload: EventPayload::Other,
            });
        }

        let body = if self.checksum && body.len() >= 4 {
            &body[..body.len() - 4]
        } else {
            body
        };

        let payload = match self.decode_payload(header.type_code, body) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(
                    "Undecodable event type {} at {}: {:#}",
                    header.type_code, header.end_offset, e
                );
                EventPayload::Other
            }
        };

        Ok(LogEvent { header, payload })
    }

    fn decode_payload(&mut self, type_code: u8, body: &[u8]) -> Result<EventPayload> {
        use event_type::*;

        trace!("Decoding event type {}, {} bytes", type_code, body.len());

        match type_code {
            QUERY => decode_query(body),
            TABLE_MAP => {
                let map = decode_table_map(body)?;
                self.tables.insert(map.table_id, map);
                Ok(EventPayload::Other)
            }
            WRITE_ROWS_V1 | WRITE_ROWS_V2 => Ok(EventPayload::RowInsert(
                self.decode_rows(body, type_code == WRITE_ROWS_V2, false)?,
            )),
            UPDATE_ROWS_V1 | UPDATE_ROWS_V2 => Ok(EventPayload::RowUpdate(
                self.decode_rows(body, type_code == UPDATE_ROWS_V2, true)?,
            )),
            DELETE_ROWS_V1 | DELETE_ROWS_V2 => Ok(EventPayload::RowDelete(
                self.decode_rows(body, type_code == DELETE_ROWS_V2, false)?,
            )),
            _ => Ok(EventPayload::Other),
        }
    }

    fn decode_rows(&self, body: &[u8], v2: bool, is_update: bool) -> Result<RowBatch> {
        let mut r = PayloadReader::new(body);
        let table_id = r.uint_le(6)?;
        r.skip(2)?; // flags
        if v2 {
            let extra_len = r.u16_le()? as usize;
            r.skip(extra_len.saturating_sub(2))?;
        }

        let column_count = r.packed_int()? as usize;
        if column_count == 0 {
            bail!("rows event for table id {} has no columns", table_id);
        }
        let bitmap_len = column_count.div_ceil(8);
        let present = r.take(bitmap_len)?;
        let present_after = if is_update {
            r.take(bitmap_len)?
        } else {
            present
        };

        let table = self
            .tables
            .get(&table_id)
            .with_context(|| format!("rows event for unknown table id {}", table_id))?;
        if table.column_types.len() < column_count {
            bail!(
                "table {}.{} maps {} columns, rows event has {}",
                table.schema,
                table.table,
                table.column_types.len(),
                column_count
            );
        }

        let mut rows = Vec::new();
        while r.remaining() > 0 {
            let before = r.remaining();
            rows.push(decode_row(&mut r, table, column_count, present)?);
            if is_update {
                rows.push(decode_row(&mut r, table, column_count, present_after)?);
            }
            // An empty row image consumes nothing; trailing bytes are garbage.
            if r.remaining() == before {
                bail!(
                    "rows event for {}.{} has {} undecodable trailing bytes",
                    table.schema,
                    table.table,
                    before
                );
            }
        }

        Ok(RowBatch {
            schema: table.schema.clone(),
            table: table.table.clone(),
            rows,
        })
    }
}

/// Checksum algorithm of a FORMAT_DESCRIPTION event. The algorithm byte sits
/// just before the trailing CRC32 on servers that support checksums.
fn format_description_has_checksum(body: &[u8]) -> bool {
    // binlog version (2) + server version (50) + create timestamp (4) + header length (1)
    const FIXED: usize = 57;
    if body.len() < FIXED + 5 {
        return false;
    }
    let version = String::from_utf8_lossy(&body[2..52]);
    let version = version.trim_end_matches('\0');
    server_supports_checksum(version) && body[body.len() - 5] == 1
}

/// Checksums exist since MySQL 5.6.1 and MariaDB 5.3.
fn server_supports_checksum(version: &str) -> bool {
    let mut parts = version.split(|c: char| !c.is_ascii_digit());
    let mut next = || parts.next().and_then(|p| p.parse::<u32>().ok());
    let (Some(major), Some(minor), patch) = (next(), next(), next()) else {
        return true;
    };
    if version.contains("MariaDB") {
        return (major, minor) >= (5, 3);
    }
    (major, minor, patch.unwrap_or(0)) >= (5, 6, 1)
}

fn decode_table_map(body: &[u8]) -> Result<TableMap> {
    let mut r = PayloadReader::new(body);
    let table_id = r.uint_le(6)?;
    r.skip(2)?; // flags

    let schema_len = r.u8()? as usize;
    let schema = String::from_utf8_lossy(r.take(schema_len)?).into_owned();
    r.skip(1)?;
    let table_len = r.u8()? as usize;
    let table = String::from_utf8_lossy(r.take(table_len)?).into_owned();
    r.skip(1)?;

    let column_count = r.packed_int()? as usize;
    let column_types: Vec<ColumnType> = r
        .take(column_count)?
        .iter()
        .map(|&t| ColumnType::from_u8(t))
        .collect();

    let metadata_len = r.packed_int()? as usize;
    let mut meta = PayloadReader::new(r.take(metadata_len)?);
    let column_metadata = column_types
        .iter()
        .map(|t| read_column_metadata(&mut meta, *t))
        .collect::<Result<Vec<_>>>()?;

    Ok(TableMap {
        table_id,
        schema,
        table,
        column_types,
        column_metadata,
    })
}

fn read_column_metadata(r: &mut PayloadReader<'_>, column_type: ColumnType) -> Result<u16> {
    let meta = match column_type {
        ColumnType::Float
        | ColumnType::Double
        | ColumnType::TinyBlob
        | ColumnType::MediumBlob
        | ColumnType::LongBlob
        | ColumnType::Blob
        | ColumnType::Json
        | ColumnType::Geometry
        | ColumnType::Time2
        | ColumnType::DateTime2
        | ColumnType::Timestamp2 => u16::from(r.u8()?),
        ColumnType::Varchar | ColumnType::VarString | ColumnType::Bit => r.u16_le()?,
        // Stored high byte first: (real type, length) or (precision, scale).
        ColumnType::NewDecimal | ColumnType::String | ColumnType::Enum | ColumnType::Set => {
            r.uint_be(2)? as u16
        }
        _ => 0,
    };
    Ok(meta)
}

fn decode_query(body: &[u8]) -> Result<EventPayload> {
    let mut r = PayloadReader::new(body);
    r.skip(4)?; // thread id
    r.skip(4)?; // execution time
    let schema_len = r.u8()? as usize;
    r.skip(2)?; // error code
    let status_len = r.u16_le()? as usize;
    r.skip(status_len)?;
    let schema = String::from_utf8_lossy(r.take(schema_len)?).into_owned();
    r.skip(1)?;
    let query = String::from_utf8_lossy(r.rest()).into_owned();
    Ok(EventPayload::Query { schema, query })
}

// ============================================================================
// Row images
// ============================================================================

fn decode_row(
    r: &mut PayloadReader<'_>,
    table: &TableMap,
    column_count: usize,
    present: &[u8],
) -> Result<Vec<Value>> {
    let present_count: usize = present.iter().map(|b| b.count_ones() as usize).sum();
    let nulls = r.take(present_count.div_ceil(8))?;

    let mut row = Vec::with_capacity(column_count);
    let mut null_idx = 0;
    for col in 0..column_count {
        // Columns missing from a partial image read as NULL.
        if !bit_set(present, col) {
            row.push(Value::Null);
            continue;
        }
        let is_null = bit_set(nulls, null_idx);
        null_idx += 1;
        if is_null {
            row.push(Value::Null);
            continue;
        }
        row.push(decode_column(
            r,
            table.column_types[col],
            table.column_metadata[col],
        )?);
    }
    Ok(row)
}

fn bit_set(bitmap: &[u8], idx: usize) -> bool {
    bitmap
        .get(idx / 8)
        .is_some_and(|byte| byte & (1 << (idx % 8)) != 0)
}

fn text_or_bytes(bytes: &[u8]) -> Value {
    match std::str::from_utf8(bytes) {
        Ok(s) => Value::Text(s.to_string()),
        Err(_) => Value::Bytes(bytes.to_vec()),
    }
}

const ZERO_DATETIME: &str = "0000-00-00 00:00:00";

fn decode_column(r: &mut PayloadReader<'_>, column_type: ColumnType, meta: u16) -> Result<Value> {
    let value = match column_type {
        ColumnType::Tiny => Value::Int(i64::from(r.u8()? as i8)),
        ColumnType::Short => Value::Int(i64::from(r.u16_le()? as i16)),
        ColumnType::Int24 => {
            let raw = r.uint_le(3)? as u32;
            // Sign-extend from 24 bits.
            Value::Int(i64::from(((raw << 8) as i32) >> 8))
        }
        ColumnType::Long => Value::Int(i64::from(r.u32_le()? as i32)),
        ColumnType::LongLong => Value::Int(r.u64_le()? as i64),
        ColumnType::Float => Value::Float(f64::from(f32::from_bits(r.u32_le()?))),
        ColumnType::Double => Value::Float(f64::from_bits(r.u64_le()?)),
        ColumnType::Null => Value::Null,
        ColumnType::Year => match r.u8()? {
            0 => Value::Int(0),
            y => Value::Int(1900 + i64::from(y)),
        },
        ColumnType::Date | ColumnType::NewDate => {
            let packed = r.uint_le(3)?;
            Value::Text(format!(
                "{:04}-{:02}-{:02}",
                (packed >> 9) & 0x7fff,
                (packed >> 5) & 0x0f,
                packed & 0x1f
            ))
        }
        ColumnType::Time => {
            let packed = r.uint_le(3)?;
            Value::Text(format!(
                "{:02}:{:02}:{:02}",
                packed / 10000,
                (packed / 100) % 100,
                packed % 100
            ))
        }
        ColumnType::Time2 => decode_time2(r, meta as u8)?,
        ColumnType::DateTime => {
            let packed = r.u64_le()?;
            let date = packed / 1_000_000;
            let time = packed % 1_000_000;
            datetime_value(
                (date / 10000) as i32,
                ((date / 100) % 100) as u32,
                (date % 100) as u32,
                (time / 10000) as u32,
                ((time / 100) % 100) as u32,
                (time % 100) as u32,
                0,
            )
        }
        ColumnType::DateTime2 => {
            let packed = r.uint_be(5)?;
            let micros = read_fraction(r, meta as u8)?;
            let ym = (packed >> 22) & 0x1ffff;
            datetime_value(
                (ym / 13) as i32,
                (ym % 13) as u32,
                ((packed >> 17) & 0x1f) as u32,
                ((packed >> 12) & 0x1f) as u32,
                ((packed >> 6) & 0x3f) as u32,
                (packed & 0x3f) as u32,
                micros,
            )
        }
        ColumnType::Timestamp => epoch_value(i64::from(r.u32_le()?), 0),
        ColumnType::Timestamp2 => {
            let secs = r.uint_be(4)?;
            let micros = read_fraction(r, meta as u8)?;
            epoch_value(secs as i64, micros)
        }
        ColumnType::Varchar | ColumnType::VarString => {
            let len = if meta < 256 {
                r.u8()? as usize
            } else {
                r.u16_le()? as usize
            };
            text_or_bytes(r.take(len)?)
        }
        ColumnType::String => decode_string(r, meta)?,
        ColumnType::Enum => Value::Int(r.uint_le(usize::from(meta & 0xff).clamp(1, 2))? as i64),
        ColumnType::Set => Value::Int(r.uint_le(usize::from(meta & 0xff).clamp(1, 8))? as i64),
        ColumnType::Bit => {
            let nbits = usize::from(meta >> 8) * 8 + usize::from(meta & 0xff);
            let len = nbits.div_ceil(8);
            let bytes = r.take(len)?;
            Value::UInt(bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
        }
        ColumnType::NewDecimal => {
            Value::Decimal(decode_decimal(r, usize::from(meta >> 8), usize::from(meta & 0xff))?)
        }
        ColumnType::TinyBlob
        | ColumnType::MediumBlob
        | ColumnType::LongBlob
        | ColumnType::Blob
        | ColumnType::Geometry => {
            let len = r.uint_le(usize::from(meta).clamp(1, 4))? as usize;
            Value::Bytes(r.take(len)?.to_vec())
        }
        ColumnType::Json => {
            let len = r.uint_le(usize::from(meta).clamp(1, 4))? as usize;
            Value::Text(json_to_text(r.take(len)?))
        }
        ColumnType::Decimal | ColumnType::Unknown(_) => {
            bail!("unsupported column type {:?}", column_type)
        }
    };
    Ok(value)
}

/// CHAR, ENUM and SET all travel as STRING with the real type in the
/// metadata. Lengths over 255 borrow two bits from the type byte.
fn decode_string(r: &mut PayloadReader<'_>, meta: u16) -> Result<Value> {
    let byte0 = (meta >> 8) as u8;
    let byte1 = (meta & 0xff) as u16;
    let (real_type, max_len) = if byte0 != 0 && byte0 & 0x30 != 0x30 {
        (
            byte0 | 0x30,
            byte1 | ((u16::from(byte0 & 0x30) ^ 0x30) << 4),
        )
    } else {
        (byte0, byte1)
    };

    match ColumnType::from_u8(real_type) {
        ColumnType::Enum => Ok(Value::Int(r.uint_le(usize::from(max_len).clamp(1, 2))? as i64)),
        ColumnType::Set => Ok(Value::Int(r.uint_le(usize::from(max_len).clamp(1, 8))? as i64)),
        _ => {
            let len = if max_len < 256 {
                r.u8()? as usize
            } else {
                r.u16_le()? as usize
            };
            Ok(text_or_bytes(r.take(len)?))
        }
    }
}

/// Fractional seconds for TIME2/DATETIME2/TIMESTAMP2, in microseconds.
fn read_fraction(r: &mut PayloadReader<'_>, fsp: u8) -> Result<u32> {
    let fsp = fsp.min(6);
    let bytes = usize::from(fsp).div_ceil(2);
    if bytes == 0 {
        return Ok(0);
    }
    let raw = r.uint_be(bytes)? as u32;
    // Stored with an even number of digits.
    Ok(raw * 10u32.pow(6 - 2 * bytes as u32))
}

fn decode_time2(r: &mut PayloadReader<'_>, fsp: u8) -> Result<Value> {
    let packed = r.uint_be(3)? as i64 - 0x80_0000;
    let micros = read_fraction(r, fsp)?;
    let negative = packed < 0;
    let value = packed.unsigned_abs();
    let hours = (value >> 12) & 0x3ff;
    let minutes = (value >> 6) & 0x3f;
    let seconds = value & 0x3f;
    let sign = if negative { "-" } else { "" };
    let text = if micros > 0 {
        format!(
            "{}{:02}:{:02}:{:02}.{:06}",
            sign, hours, minutes, seconds, micros
        )
    } else {
        format!("{}{:02}:{:02}:{:02}", sign, hours, minutes, seconds)
    };
    Ok(Value::Text(text))
}

fn datetime_value(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
    micros: u32,
) -> Value {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_micro_opt(hour, minute, second, micros))
        .map(Value::Timestamp)
        .unwrap_or_else(|| {
            if year == 0 && month == 0 && day == 0 {
                Value::Text(ZERO_DATETIME.to_string())
            } else {
                Value::Text(format!(
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                    year, month, day, hour, minute, second
                ))
            }
        })
}

fn epoch_value(secs: i64, micros: u32) -> Value {
    if secs == 0 {
        return Value::Text(ZERO_DATETIME.to_string());
    }
    DateTime::from_timestamp(secs, micros * 1000)
        .map(|t| Value::Timestamp(t.naive_utc()))
        .unwrap_or(Value::Int(secs))
}

/// DECIMAL values: groups of nine digits in four big-endian bytes, with a
/// shorter leading and trailing group; negative values are bit-inverted and
/// the sign lives in the top bit.
fn decode_decimal(r: &mut PayloadReader<'_>, precision: usize, scale: usize) -> Result<String> {
    const DIG2BYTES: [usize; 10] = [0, 1, 1, 2, 2, 3, 3, 4, 4, 4];
    if precision == 0 || scale > precision {
        bail!("invalid decimal precision {} scale {}", precision, scale);
    }

    let intg = precision - scale;
    let (int_words, int_lead) = (intg / 9, intg % 9);
    let (frac_words, frac_tail) = (scale / 9, scale % 9);
    let size = DIG2BYTES[int_lead] + int_words * 4 + frac_words * 4 + DIG2BYTES[frac_tail];

    let mut bytes = r.take(size)?.to_vec();
    let negative = bytes[0] & 0x80 == 0;
    bytes[0] ^= 0x80;
    if negative {
        for b in bytes.iter_mut() {
            *b = !*b;
        }
    }

    let mut digits = PayloadReader::new(&bytes);
    let mut int_part = String::new();
    if int_lead > 0 {
        int_part.push_str(&digits.uint_be(DIG2BYTES[int_lead])?.to_string());
    }
    for _ in 0..int_words {
        int_part.push_str(&format!("{:09}", digits.uint_be(4)?));
    }
    let int_part = int_part.trim_start_matches('0');

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(if int_part.is_empty() { "0" } else { int_part });

    if scale > 0 {
        out.push('.');
        for _ in 0..frac_words {
            out.push_str(&format!("{:09}", digits.uint_be(4)?));
        }
        if frac_tail > 0 {
            let v = digits.uint_be(DIG2BYTES[frac_tail])?;
            out.push_str(&format!("{:0width$}", v, width = frac_tail));
        }
    }
    Ok(out)
}
