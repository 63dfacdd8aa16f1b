//! Binary JSON column values
//!
//! JSON columns arrive in the server's binary document format: a type tag
//! followed by either a scalar or a container with key/value entry tables.
//! Small scalars live inline in the entry table; everything else is stored
//! at an offset relative to the start of the enclosing container.

use anyhow::{bail, Context, Result};
use serde_json::{Map, Number, Value as Json};

const SMALL_OBJECT: u8 = 0x00;
const LARGE_OBJECT: u8 = 0x01;
const SMALL_ARRAY: u8 = 0x02;
const LARGE_ARRAY: u8 = 0x03;
const LITERAL: u8 = 0x04;
const INT16: u8 = 0x05;
const UINT16: u8 = 0x06;
const INT32: u8 = 0x07;
const UINT32: u8 = 0x08;
const INT64: u8 = 0x09;
const UINT64: u8 = 0x0a;
const DOUBLE: u8 = 0x0b;
const STRING: u8 = 0x0c;
const OPAQUE: u8 = 0x0f;

/// Render a JSON column as compact JSON text.
///
/// Documents that are not valid binary JSON are returned as lossy UTF-8,
/// which covers servers that log JSON columns as plain text.
pub fn json_to_text(data: &[u8]) -> String {
    if data.is_empty() {
        return "null".to_string();
    }
    match decode_document(data) {
        Ok(doc) => doc.to_string(),
        Err(_) => String::from_utf8_lossy(data).into_owned(),
    }
}

/// Decode a complete binary JSON document.
pub fn decode_document(data: &[u8]) -> Result<Json> {
    let (&tag, body) = data.split_first().context("empty JSON document")?;
    decode_value(tag, body)
}

fn decode_value(tag: u8, body: &[u8]) -> Result<Json> {
    let json = match tag {
        SMALL_OBJECT => decode_container(body, false, true)?,
        LARGE_OBJECT => decode_container(body, true, true)?,
        SMALL_ARRAY => decode_container(body, false, false)?,
        LARGE_ARRAY => decode_container(body, true, false)?,
        LITERAL => match read_uint(body, 0, 1)? {
            0x01 => Json::Bool(true),
            0x02 => Json::Bool(false),
            _ => Json::Null,
        },
        INT16 => Json::from(i16::from_le_bytes(fixed(body, 0)?)),
        UINT16 => Json::from(u16::from_le_bytes(fixed(body, 0)?)),
        INT32 => Json::from(i32::from_le_bytes(fixed(body, 0)?)),
        UINT32 => Json::from(u32::from_le_bytes(fixed(body, 0)?)),
        INT64 => Json::from(i64::from_le_bytes(fixed(body, 0)?)),
        UINT64 => Json::from(u64::from_le_bytes(fixed(body, 0)?)),
        DOUBLE => {
            let v = f64::from_le_bytes(fixed(body, 0)?);
            Number::from_f64(v).map(Json::Number).unwrap_or(Json::Null)
        }
        STRING => {
            let (len, prefix) = read_var_len(body)?;
            Json::String(String::from_utf8_lossy(slice(body, prefix, len)?).into_owned())
        }
        OPAQUE => {
            // One byte of column type, then a length-prefixed blob.
            let rest = body.get(1..).context("truncated opaque value")?;
            let (len, prefix) = read_var_len(rest)?;
            Json::String(String::from_utf8_lossy(slice(rest, prefix, len)?).into_owned())
        }
        other => bail!("unknown binary JSON type 0x{:02x}", other),
    };
    Ok(json)
}

fn decode_container(body: &[u8], large: bool, is_object: bool) -> Result<Json> {
    let width = if large { 4 } else { 2 };
    let count = read_uint(body, 0, width)?;
    let keys_at = 2 * width;
    let key_entry = width + 2;
    let value_entry = 1 + width;
    let values_at = if is_object {
        count
            .checked_mul(key_entry)
            .and_then(|n| n.checked_add(keys_at))
            .context("JSON key table overflow")?
    } else {
        keys_at
    };

    let mut values = Vec::with_capacity(count.min(body.len()));
    for i in 0..count {
        let entry = values_at + i * value_entry;
        let tag = read_uint(body, entry, 1)? as u8;
        values.push(decode_entry(body, tag, entry + 1, large)?);
    }

    if !is_object {
        return Ok(Json::Array(values));
    }

    let mut map = Map::new();
    for (i, value) in values.into_iter().enumerate() {
        let entry = keys_at + i * key_entry;
        let key_offset = read_uint(body, entry, width)?;
        let key_len = read_uint(body, entry + width, 2)?;
        let key = String::from_utf8_lossy(slice(body, key_offset, key_len)?).into_owned();
        map.insert(key, value);
    }
    Ok(Json::Object(map))
}

fn decode_entry(container: &[u8], tag: u8, at: usize, large: bool) -> Result<Json> {
    let width = if large { 4 } else { 2 };
    let inline =
        matches!(tag, LITERAL | INT16 | UINT16) || (large && matches!(tag, INT32 | UINT32));
    if inline {
        return decode_value(tag, slice(container, at, width)?);
    }
    let offset = read_uint(container, at, width)?;
    let rest = container
        .get(offset..)
        .with_context(|| format!("JSON value offset {} out of bounds", offset))?;
    decode_value(tag, rest)
}

fn slice(data: &[u8], at: usize, len: usize) -> Result<&[u8]> {
    at.checked_add(len)
        .and_then(|end| data.get(at..end))
        .with_context(|| format!("truncated JSON: need {} bytes at offset {}", len, at))
}

fn fixed<const N: usize>(data: &[u8], at: usize) -> Result<[u8; N]> {
    let mut out = [0u8; N];
    out.copy_from_slice(slice(data, at, N)?);
    Ok(out)
}

/// Little-endian unsigned integer of `width` bytes.
fn read_uint(data: &[u8], at: usize, width: usize) -> Result<usize> {
    Ok(slice(data, at, width)?
        .iter()
        .rev()
        .fold(0usize, |acc, &b| (acc << 8) | b as usize))
}

/// Length prefix of 1 to 5 bytes, seven bits per byte, high bit continues.
fn read_var_len(data: &[u8]) -> Result<(usize, usize)> {
    let mut len = 0usize;
    for (i, &b) in data.iter().take(5).enumerate() {
        len |= ((b & 0x7f) as usize) << (7 * i);
        if b & 0x80 == 0 {
            return Ok((len, i + 1));
        }
    }
    bail!("truncated JSON length prefix")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_literals() {
        assert_eq!(decode_document(&[LITERAL, 0x00]).unwrap(), Json::Null);
        assert_eq!(decode_document(&[LITERAL, 0x01]).unwrap(), json!(true));
        assert_eq!(decode_document(&[LITERAL, 0x02]).unwrap(), json!(false));
    }

    #[test]
    fn test_scalars() {
        assert_eq!(decode_document(&[INT16, 0xff, 0xff]).unwrap(), json!(-1));
        assert_eq!(decode_document(&[UINT16, 0x2a, 0x00]).unwrap(), json!(42));
        let mut double = vec![DOUBLE];
        double.extend_from_slice(&2.5f64.to_le_bytes());
        assert_eq!(decode_document(&double).unwrap(), json!(2.5));
    }

    #[test]
    fn test_string() {
        assert_eq!(
            decode_document(&[STRING, 0x03, b'a', b'b', b'c']).unwrap(),
            json!("abc")
        );
    }

    #[test]
    #[rustfmt::skip]
    fn test_small_object_with_inline_value() {
        // {"a": 1}: count, size, key entry (offset, len), value entry (tag, inline), key bytes
        let doc = [
            SMALL_OBJECT,
            0x01, 0x00,
            0x0c, 0x00,
            0x0b, 0x00, 0x01, 0x00,
            INT16, 0x01, 0x00,
            b'a',
        ];
        assert_eq!(decode_document(&doc).unwrap(), json!({"a": 1}));
    }

    #[test]
    #[rustfmt::skip]
    fn test_small_array_with_offset_value() {
        // [7, "x"]: the string sits at offset 10 of the container
        let doc = [
            SMALL_ARRAY,
            0x02, 0x00,
            0x0c, 0x00,
            INT16, 0x07, 0x00,
            STRING, 0x0a, 0x00,
            0x01, b'x',
        ];
        assert_eq!(decode_document(&doc).unwrap(), json!([7, "x"]));
    }

    #[test]
    fn test_truncated_document_is_an_error() {
        assert!(decode_document(&[INT64, 0x01]).is_err());
        assert!(decode_document(&[SMALL_ARRAY, 0x05, 0x00, 0x00, 0x00]).is_err());
        assert!(decode_document(&[]).is_err());
    }

    #[test]
    fn test_json_to_text_falls_back_to_plain_text() {
        assert_eq!(json_to_text(b""), "null");
        assert_eq!(json_to_text(&[LITERAL, 0x01]), "true");
        // 0x7b is '{', not a known type tag
        assert_eq!(json_to_text(br#"{"k":1}"#), r#"{"k":1}"#);
    }
}
