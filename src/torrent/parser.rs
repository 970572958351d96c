//! Torrent file parser
//!
//! Handles parsing of .torrent files and extracting metadata.

use std::path::Path;

use tracing::{debug, error, info, trace, warn};

use crate::bencode::{self, BencodeDict, BencodeValue};
use crate::error::{Result, TorrentError};
use crate::torrent::info::TorrentInfo;

/// Parser for .torrent files
pub struct TorrentParser;

impl TorrentParser {
    /// Parse a .torrent file from bytes
    pub fn parse_bytes(data: &[u8]) -> Result<TorrentInfo> {
        info!("Parsing torrent file from {} bytes", data.len());
        trace!("Torrent data (first 100 bytes): {:?}", &data[..data.len().min(100)]);

        let (root, consumed) = bencode::decode(data)?;
        if consumed != data.len() {
            warn!("Ignoring {} trailing bytes after torrent dictionary", data.len() - consumed);
        }

        let root_dict = root
            .as_dict()
            .map_err(|_| TorrentError::invalid_torrent(format!("top-level value is a {}, not a dictionary", root.kind())))?;

        Self::convert_to_torrent_info(root_dict)
    }

    /// Parse a .torrent file from a file path
    pub async fn parse_file(path: &Path) -> Result<TorrentInfo> {
        info!("Loading torrent file from: {}", path.display());

        let data = tokio::fs::read(path).await.map_err(|e| {
            error!("Failed to read torrent file '{}': {}", path.display(), e);
            TorrentError::storage_error_full("Failed to read torrent file", path.display().to_string(), e.to_string())
        })?;

        debug!("Read {} bytes from torrent file", data.len());
        Self::parse_bytes(&data)
    }

    fn convert_to_torrent_info(root: &BencodeDict) -> Result<TorrentInfo> {
        let announce = required(root, b"announce", "announce")?
            .as_str()
            .map_err(|e| mistyped("announce", e))?
            .to_string();

        let announce_list = Self::collect_announce_list(root, &announce);

        let info_value = required(root, b"info", "info")?;
        let info_dict = info_value.as_dict().map_err(|e| mistyped("info", e))?;

        let total_length = positive_integer(info_dict, b"length", "info.length")?;
        let name = String::from_utf8_lossy(
            required(info_dict, b"name", "info.name")?
                .as_bytes()
                .map_err(|e| mistyped("info.name", e))?,
        )
        .to_string();
        let piece_length = positive_integer(info_dict, b"piece length", "info.piece length")?;
        // Block offsets inside a piece travel as u32 on the wire
        if piece_length > u32::MAX as u64 {
            error!("Piece length {} does not fit a 32-bit block offset", piece_length);
            return Err(TorrentError::invalid_torrent_field(
                format!("piece length {} exceeds {}", piece_length, u32::MAX),
                "info.piece length",
            ));
        }

        let pieces_bytes = required(info_dict, b"pieces", "info.pieces")?
            .as_bytes()
            .map_err(|e| mistyped("info.pieces", e))?;
        let piece_hashes = TorrentInfo::parse_piece_hashes(pieces_bytes)?;

        let expected = TorrentInfo::expected_piece_count(total_length, piece_length);
        if piece_hashes.len() as u64 != expected {
            error!(
                "Torrent declares {} piece hashes but lengths imply {}",
                piece_hashes.len(),
                expected
            );
            return Err(TorrentError::invalid_torrent_field(
                format!("{} hashes for {} pieces", piece_hashes.len(), expected),
                "info.pieces",
            ));
        }

        // Hash the decoded sub-dictionary itself, re-encoded canonically
        let info_hash = TorrentInfo::generate_info_hash(&bencode::encode(info_value));

        info!("Successfully parsed torrent: {} ({} pieces)", name, piece_hashes.len());
        debug!("Info hash: {}", hex::encode(info_hash));
        Ok(TorrentInfo {
            announce,
            announce_list,
            name,
            piece_length,
            total_length,
            piece_hashes,
            info_hash,
        })
    }

    /// Flatten the optional `announce-list` tiers behind the primary URL
    fn collect_announce_list(root: &BencodeDict, announce: &str) -> Vec<String> {
        let mut announce_list = vec![announce.to_string()];
        let Some(tiers) = root.get(b"announce-list".as_slice()) else {
            return announce_list;
        };

        let Ok(tiers) = tiers.as_list() else {
            warn!("Ignoring announce-list that is not a list");
            return announce_list;
        };

        for tier in tiers {
            let Ok(urls) = tier.as_list() else {
                warn!("Ignoring announce-list tier that is not a list");
                continue;
            };
            for url in urls.iter().filter_map(|u| u.as_str().ok()) {
                if !announce_list.iter().any(|known| known == url) {
                    announce_list.push(url.to_string());
                }
            }
        }

        announce_list
    }
}

fn required<'a>(dict: &'a BencodeDict, key: &[u8], field: &str) -> Result<&'a BencodeValue> {
    dict.get(key)
        .ok_or_else(|| TorrentError::invalid_torrent_field("missing required key", field))
}

fn mistyped(field: &str, err: TorrentError) -> TorrentError {
    TorrentError::invalid_torrent_field(err.to_string(), field)
}

fn positive_integer(dict: &BencodeDict, key: &[u8], field: &str) -> Result<u64> {
    let value = required(dict, key, field)?
        .as_integer()
        .map_err(|e| mistyped(field, e))?;
    if value <= 0 {
        return Err(TorrentError::invalid_torrent_field(
            format!("must be positive, got {}", value),
            field,
        ));
    }
    Ok(value as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info_dict(length: i64, piece_length: i64, pieces: Vec<u8>) -> BencodeDict {
        let mut info = BencodeDict::new();
        info.insert(b"length".to_vec(), BencodeValue::Integer(length));
        info.insert(b"name".to_vec(), BencodeValue::from("sample.txt"));
        info.insert(b"piece length".to_vec(), BencodeValue::Integer(piece_length));
        info.insert(b"pieces".to_vec(), BencodeValue::ByteString(pieces));
        info
    }

    fn torrent_bytes(info: BencodeDict) -> Vec<u8> {
        let mut root = BencodeDict::new();
        root.insert(b"announce".to_vec(), BencodeValue::from("http://tracker.example.com/announce"));
        root.insert(b"info".to_vec(), BencodeValue::Dictionary(info));
        bencode::encode(&BencodeValue::Dictionary(root))
    }

    fn expect_invalid(data: &[u8]) {
        match TorrentParser::parse_bytes(data) {
            Err(TorrentError::InvalidTorrentFile { .. }) => {}
            other => panic!("expected InvalidTorrentFile, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_single_file() {
        let pieces: Vec<u8> = (0..60).collect();
        let data = torrent_bytes(info_dict(600, 256, pieces));
        let info = TorrentParser::parse_bytes(&data).unwrap();

        assert_eq!(info.announce, "http://tracker.example.com/announce");
        assert_eq!(info.announce_list, vec![info.announce.clone()]);
        assert_eq!(info.name, "sample.txt");
        assert_eq!(info.total_length, 600);
        assert_eq!(info.piece_length, 256);
        assert_eq!(info.piece_count(), 3);
        assert_eq!(info.piece_hashes[1][0], 20);
        assert_eq!(info.piece_len(2), Some(88));
    }

    #[test]
    fn test_info_hash_is_sha1_of_info_dict() {
        let info = info_dict(20, 20, vec![7u8; 20]);
        let expected = TorrentInfo::generate_info_hash(&bencode::encode(&BencodeValue::Dictionary(info.clone())));
        let parsed = TorrentParser::parse_bytes(&torrent_bytes(info)).unwrap();
        assert_eq!(parsed.info_hash, expected);
    }

    #[test]
    fn test_info_hash_is_deterministic() {
        let data = torrent_bytes(info_dict(40, 20, vec![9u8; 40]));
        let first = TorrentParser::parse_bytes(&data).unwrap();
        let second = TorrentParser::parse_bytes(&data).unwrap();
        assert_eq!(first.info_hash, second.info_hash);
    }

    #[test]
    fn test_info_hash_ignores_source_key_order() {
        let sorted = b"d8:announce3:url4:infod6:lengthi20e4:name1:a12:piece lengthi20e6:pieces20:aaaaaaaaaaaaaaaaaaaaee";
        let unsorted = b"d4:infod6:pieces20:aaaaaaaaaaaaaaaaaaaa4:name1:a12:piece lengthi20e6:lengthi20ee8:announce3:urle";
        let a = TorrentParser::parse_bytes(sorted).unwrap();
        let b = TorrentParser::parse_bytes(unsorted).unwrap();
        assert_eq!(a.info_hash, b.info_hash);
    }

    #[test]
    fn test_announce_list() {
        let mut root = BencodeDict::new();
        root.insert(b"announce".to_vec(), BencodeValue::from("http://a/announce"));
        root.insert(
            b"announce-list".to_vec(),
            BencodeValue::List(vec![
                BencodeValue::List(vec![BencodeValue::from("http://a/announce"), BencodeValue::from("http://b/announce")]),
                BencodeValue::List(vec![BencodeValue::from("udp://c:80")]),
                BencodeValue::Integer(3),
            ]),
        );
        root.insert(b"info".to_vec(), BencodeValue::Dictionary(info_dict(20, 20, vec![0u8; 20])));
        let info = TorrentParser::parse_bytes(&bencode::encode(&BencodeValue::Dictionary(root))).unwrap();
        assert_eq!(info.announce_list, vec!["http://a/announce", "http://b/announce", "udp://c:80"]);
    }

    #[test]
    fn test_top_level_must_be_dict() {
        expect_invalid(b"l4:spame");
        expect_invalid(b"i3e");
    }

    #[test]
    fn test_malformed_bencode_is_reported_as_such() {
        assert!(matches!(
            TorrentParser::parse_bytes(b"d8:announce"),
            Err(TorrentError::MalformedInput { .. })
        ));
    }

    #[test]
    fn test_missing_keys() {
        for key in [b"length".as_slice(), b"name", b"piece length", b"pieces"] {
            let mut info = info_dict(20, 20, vec![0u8; 20]);
            info.remove(key);
            expect_invalid(&torrent_bytes(info));
        }

        let mut root = BencodeDict::new();
        root.insert(b"info".to_vec(), BencodeValue::Dictionary(info_dict(20, 20, vec![0u8; 20])));
        expect_invalid(&bencode::encode(&BencodeValue::Dictionary(root)));

        let mut root = BencodeDict::new();
        root.insert(b"announce".to_vec(), BencodeValue::from("http://a"));
        expect_invalid(&bencode::encode(&BencodeValue::Dictionary(root)));
    }

    #[test]
    fn test_wrong_variants() {
        let mut info = info_dict(20, 20, vec![0u8; 20]);
        info.insert(b"length".to_vec(), BencodeValue::from("20"));
        expect_invalid(&torrent_bytes(info));

        let mut info = info_dict(20, 20, vec![0u8; 20]);
        info.insert(b"pieces".to_vec(), BencodeValue::Integer(0));
        expect_invalid(&torrent_bytes(info));

        let mut root = BencodeDict::new();
        root.insert(b"announce".to_vec(), BencodeValue::from("http://a"));
        root.insert(b"info".to_vec(), BencodeValue::List(vec![]));
        expect_invalid(&bencode::encode(&BencodeValue::Dictionary(root)));
    }

    #[test]
    fn test_pieces_not_multiple_of_20() {
        expect_invalid(&torrent_bytes(info_dict(20, 20, vec![0u8; 19])));
    }

    #[test]
    fn test_piece_count_must_match_lengths() {
        expect_invalid(&torrent_bytes(info_dict(41, 20, vec![0u8; 40])));
        expect_invalid(&torrent_bytes(info_dict(20, 20, vec![0u8; 40])));
    }

    #[test]
    fn test_non_positive_lengths() {
        expect_invalid(&torrent_bytes(info_dict(0, 20, vec![])));
        expect_invalid(&torrent_bytes(info_dict(20, 0, vec![0u8; 20])));
        expect_invalid(&torrent_bytes(info_dict(-20, 20, vec![0u8; 20])));
    }

    #[test]
    fn test_piece_length_must_fit_block_offsets() {
        let huge = 1i64 << 33;
        expect_invalid(&torrent_bytes(info_dict(huge, huge, vec![0u8; 20])));

        let largest = u32::MAX as i64;
        let info = TorrentParser::parse_bytes(&torrent_bytes(info_dict(largest, largest, vec![0u8; 20]))).unwrap();
        assert_eq!(info.piece_count(), 1);
    }
}
