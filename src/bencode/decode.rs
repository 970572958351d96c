//! Bencode decoder
//!
//! A recursive-descent parser over a byte slice. Every parse function advances
//! a shared cursor, so the caller always knows exactly how many bytes a value
//! occupied and where its next sibling starts.

use tracing::trace;

use crate::bencode::value::{BencodeDict, BencodeValue};
use crate::error::{Result, TorrentError};

/// Nesting limit for lists and dictionaries
const MAX_DEPTH: usize = 256;

/// Decode one value from the start of `input`.
///
/// Returns the value and the number of bytes it occupied. Trailing bytes are
/// left untouched.
pub fn decode(input: &[u8]) -> Result<(BencodeValue, usize)> {
    decode_at(input, 0)
}

/// Decode one value starting at `start`, returning the value and the offset
/// one past its last byte.
pub fn decode_at(input: &[u8], start: usize) -> Result<(BencodeValue, usize)> {
    if input.is_empty() {
        return Err(TorrentError::malformed_input("empty input"));
    }

    let mut idx = start;
    let value = parse_value(input, &mut idx, 0)?;
    trace!("Decoded {} spanning bytes {}..{}", value.kind(), start, idx);
    Ok((value, idx))
}

/// Decode a buffer that must contain exactly one value.
pub fn decode_all(input: &[u8]) -> Result<BencodeValue> {
    let (value, end) = decode(input)?;
    if end != input.len() {
        return Err(TorrentError::malformed_input_at(
            format!("{} trailing bytes after value", input.len() - end),
            end,
        ));
    }
    Ok(value)
}

fn parse_value(data: &[u8], idx: &mut usize, depth: usize) -> Result<BencodeValue> {
    if depth > MAX_DEPTH {
        return Err(TorrentError::malformed_input_at("nesting too deep", *idx));
    }

    let Some(&marker) = data.get(*idx) else {
        return Err(TorrentError::malformed_input_at("unexpected end of input", *idx));
    };

    match marker {
        b'i' => parse_integer(data, idx),
        b'l' => parse_list(data, idx, depth),
        b'd' => parse_dict(data, idx, depth),
        b'0'..=b'9' => parse_byte_string(data, idx).map(BencodeValue::ByteString),
        other => Err(TorrentError::malformed_input_at(
            format!("unrecognized marker byte 0x{:02x}", other),
            *idx,
        )),
    }
}

fn parse_integer(data: &[u8], idx: &mut usize) -> Result<BencodeValue> {
    let start = *idx + 1;
    let end = data[start..]
        .iter()
        .position(|&b| b == b'e')
        .map(|p| start + p)
        .ok_or_else(|| TorrentError::malformed_input_at("unterminated integer", *idx))?;

    let digits = &data[start..end];
    let (negative, body) = match digits.split_first() {
        Some((b'-', rest)) => (true, rest),
        _ => (false, digits),
    };

    if body.is_empty() {
        return Err(TorrentError::malformed_input_at("integer has no digits", start));
    }
    if let Some(pos) = body.iter().position(|b| !b.is_ascii_digit()) {
        let offset = end - body.len() + pos;
        return Err(TorrentError::malformed_input_at("non-digit character in integer", offset));
    }
    if body.len() > 1 && body[0] == b'0' {
        return Err(TorrentError::malformed_input_at("integer has a leading zero", start));
    }
    if negative && body == b"0" {
        return Err(TorrentError::malformed_input_at("negative zero is not allowed", start));
    }

    // Only ASCII sign and digits remain at this point
    let text = std::str::from_utf8(digits)
        .map_err(|_| TorrentError::malformed_input_at("integer is not ASCII", start))?;
    let value: i64 = text
        .parse()
        .map_err(|_| TorrentError::malformed_input_at("integer out of 64-bit range", start))?;

    *idx = end + 1;
    Ok(BencodeValue::Integer(value))
}

fn parse_byte_string(data: &[u8], idx: &mut usize) -> Result<Vec<u8>> {
    let start = *idx;
    let mut colon = start;
    while colon < data.len() && data[colon].is_ascii_digit() {
        colon += 1;
    }

    if colon == start {
        return Err(TorrentError::malformed_input_at("byte string length missing", start));
    }
    if colon >= data.len() || data[colon] != b':' {
        return Err(TorrentError::malformed_input_at(
            "byte string length not terminated by ':'",
            colon,
        ));
    }
    if colon - start > 1 && data[start] == b'0' {
        return Err(TorrentError::malformed_input_at(
            "byte string length has a leading zero",
            start,
        ));
    }

    let len_str = std::str::from_utf8(&data[start..colon])
        .map_err(|_| TorrentError::malformed_input_at("byte string length is not ASCII", start))?;
    let length: usize = len_str
        .parse()
        .map_err(|_| TorrentError::malformed_input_at("byte string length too large", start))?;

    let body_start = colon + 1;
    let remaining = data.len() - body_start;
    if length > remaining {
        return Err(TorrentError::malformed_input_at(
            format!("declared length {} exceeds remaining {} bytes", length, remaining),
            start,
        ));
    }

    *idx = body_start + length;
    Ok(data[body_start..*idx].to_vec())
}

fn parse_list(data: &[u8], idx: &mut usize, depth: usize) -> Result<BencodeValue> {
    let start = *idx;
    *idx += 1;
    let mut list = Vec::new();

    loop {
        match data.get(*idx) {
            None => return Err(TorrentError::malformed_input_at("unterminated list", start)),
            Some(b'e') => {
                *idx += 1;
                return Ok(BencodeValue::List(list));
            }
            Some(_) => list.push(parse_value(data, idx, depth + 1)?),
        }
    }
}

fn parse_dict(data: &[u8], idx: &mut usize, depth: usize) -> Result<BencodeValue> {
    let start = *idx;
    *idx += 1;
    let mut dict = BencodeDict::new();

    loop {
        match data.get(*idx) {
            None => return Err(TorrentError::malformed_input_at("unterminated dictionary", start)),
            Some(b'e') => {
                *idx += 1;
                return Ok(BencodeValue::Dictionary(dict));
            }
            Some(b) if !b.is_ascii_digit() => {
                return Err(TorrentError::malformed_input_at(
                    "dictionary key must be a byte string",
                    *idx,
                ));
            }
            Some(_) => {}
        }

        let key_pos = *idx;
        let key = parse_byte_string(data, idx)?;

        match data.get(*idx) {
            None | Some(b'e') => {
                return Err(TorrentError::malformed_input_at("dictionary key without value", key_pos));
            }
            Some(_) => {}
        }

        let value = parse_value(data, idx, depth + 1)?;
        if dict.insert(key, value).is_some() {
            return Err(TorrentError::malformed_input_at("duplicate dictionary key", key_pos));
        }
    }
}
