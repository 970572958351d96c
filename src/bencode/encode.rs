//! Bencode encoder
//!
//! Produces the canonical form: integers without leading zeros and
//! dictionary keys in ascending byte order. Canonical output is what makes
//! info-hash computation stable.

use bytes::BufMut;

use crate::bencode::value::BencodeValue;

/// Encode a value into a fresh buffer
pub fn encode(value: &BencodeValue) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_into(value, &mut buf);
    buf
}

/// Append the encoding of `value` to `buf`
pub fn encode_into<B: BufMut>(value: &BencodeValue, buf: &mut B) {
    match value {
        BencodeValue::ByteString(bytes) => put_byte_string(bytes, buf),
        BencodeValue::Integer(i) => {
            buf.put_u8(b'i');
            buf.put_slice(i.to_string().as_bytes());
            buf.put_u8(b'e');
        }
        BencodeValue::List(items) => {
            buf.put_u8(b'l');
            for item in items {
                encode_into(item, buf);
            }
            buf.put_u8(b'e');
        }
        BencodeValue::Dictionary(dict) => {
            // BTreeMap iterates keys in ascending byte order
            buf.put_u8(b'd');
            for (key, value) in dict {
                put_byte_string(key, buf);
                encode_into(value, buf);
            }
            buf.put_u8(b'e');
        }
    }
}

fn put_byte_string<B: BufMut>(bytes: &[u8], buf: &mut B) {
    buf.put_slice(bytes.len().to_string().as_bytes());
    buf.put_u8(b':');
    buf.put_slice(bytes);
}
