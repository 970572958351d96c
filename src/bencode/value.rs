//! Bencode value model
//!
//! [`BencodeValue`] is the tagged union every decoded document is made of.
//! Byte strings are raw bytes and may not be valid UTF-8. Dictionaries are
//! keyed by raw bytes and kept in a `BTreeMap`, so iteration (and therefore
//! encoding) always follows ascending byte order of the keys.

use std::collections::BTreeMap;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::error::{Result, TorrentError};

/// Bencode dictionary keyed by raw byte strings
pub type BencodeDict = BTreeMap<Vec<u8>, BencodeValue>;

/// Bencode value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BencodeValue {
    /// Length-prefixed raw bytes
    ByteString(Vec<u8>),
    /// Signed 64-bit integer
    Integer(i64),
    /// Ordered list of values
    List(Vec<BencodeValue>),
    /// Mapping from unique byte-string keys to values
    Dictionary(BencodeDict),
}

impl BencodeValue {
    /// Variant name used in type mismatch errors
    pub fn kind(&self) -> &'static str {
        match self {
            BencodeValue::ByteString(_) => "byte string",
            BencodeValue::Integer(_) => "integer",
            BencodeValue::List(_) => "list",
            BencodeValue::Dictionary(_) => "dictionary",
        }
    }

    pub fn as_bytes(&self) -> Result<&[u8]> {
        match self {
            BencodeValue::ByteString(b) => Ok(b),
            other => Err(TorrentError::type_mismatch("byte string", other.kind())),
        }
    }

    /// Returns the byte string as UTF-8 text
    pub fn as_str(&self) -> Result<&str> {
        let bytes = self.as_bytes()?;
        std::str::from_utf8(bytes)
            .map_err(|_| TorrentError::type_mismatch("UTF-8 string", "non UTF-8 byte string"))
    }

    pub fn as_integer(&self) -> Result<i64> {
        match self {
            BencodeValue::Integer(i) => Ok(*i),
            other => Err(TorrentError::type_mismatch("integer", other.kind())),
        }
    }

    pub fn as_list(&self) -> Result<&[BencodeValue]> {
        match self {
            BencodeValue::List(l) => Ok(l),
            other => Err(TorrentError::type_mismatch("list", other.kind())),
        }
    }

    pub fn as_dict(&self) -> Result<&BencodeDict> {
        match self {
            BencodeValue::Dictionary(d) => Ok(d),
            other => Err(TorrentError::type_mismatch("dictionary", other.kind())),
        }
    }

    /// Look up a key if this value is a dictionary
    pub fn get(&self, key: &[u8]) -> Option<&BencodeValue> {
        match self {
            BencodeValue::Dictionary(d) => d.get(key),
            _ => None,
        }
    }
}

impl From<&str> for BencodeValue {
    fn from(value: &str) -> Self {
        BencodeValue::ByteString(value.as_bytes().to_vec())
    }
}

impl From<&[u8]> for BencodeValue {
    fn from(value: &[u8]) -> Self {
        BencodeValue::ByteString(value.to_vec())
    }
}

impl From<Vec<u8>> for BencodeValue {
    fn from(value: Vec<u8>) -> Self {
        BencodeValue::ByteString(value)
    }
}

impl From<i64> for BencodeValue {
    fn from(value: i64) -> Self {
        BencodeValue::Integer(value)
    }
}

impl From<Vec<BencodeValue>> for BencodeValue {
    fn from(value: Vec<BencodeValue>) -> Self {
        BencodeValue::List(value)
    }
}

impl From<BencodeDict> for BencodeValue {
    fn from(value: BencodeDict) -> Self {
        BencodeValue::Dictionary(value)
    }
}

/// JSON-style rendering for the `decode` command.
///
/// Byte strings become strings (lossy UTF-8), dictionaries become maps in
/// key order.
impl Serialize for BencodeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            BencodeValue::ByteString(b) => serializer.serialize_str(&String::from_utf8_lossy(b)),
            BencodeValue::Integer(i) => serializer.serialize_i64(*i),
            BencodeValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            BencodeValue::Dictionary(dict) => {
                let mut map = serializer.serialize_map(Some(dict.len()))?;
                for (key, value) in dict {
                    map.serialize_entry(&String::from_utf8_lossy(key), value)?;
                }
                map.end()
            }
        }
    }
}
