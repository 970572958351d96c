//! Bencode codec
//!
//! Decoding and canonical encoding of the bencode format used by torrent
//! metadata files and tracker responses.

pub mod decode;
pub mod encode;
pub mod value;

pub use decode::{decode, decode_all, decode_at};
pub use encode::{encode, encode_into};
pub use value::{BencodeDict, BencodeValue};
