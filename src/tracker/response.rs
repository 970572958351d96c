//! Tracker response decoding
//!
//! Decodes the bencoded body returned by an HTTP announce and splits the
//! compact `peers` string into peer addresses.

use tracing::{debug, warn};

use crate::bencode::{self, BencodeDict};
use crate::error::{Result, TorrentError};
use crate::peer::{PeerAddress, COMPACT_PEER_LEN};

/// Decoded announce response
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AnnounceResponse {
    /// Seconds the tracker asks us to wait before the next announce
    pub interval: Option<u64>,
    pub min_interval: Option<u64>,
    /// Number of seeders
    pub complete: Option<u64>,
    /// Number of leechers
    pub incomplete: Option<u64>,
    pub warning_message: Option<String>,
    /// Peers in the order the tracker listed them
    pub peers: Vec<PeerAddress>,
}

impl AnnounceResponse {
    /// Decode a tracker response body
    pub fn from_bytes(body: &[u8]) -> Result<Self> {
        let value = bencode::decode_all(body).map_err(|e| e.with_context("tracker response"))?;
        let dict = value.as_dict().map_err(|_| {
            TorrentError::malformed_input(format!(
                "tracker response must be a dictionary, got {}",
                value.kind()
            ))
        })?;

        if let Some(reason) = dict.get(b"failure reason".as_slice()) {
            let reason = String::from_utf8_lossy(reason.as_bytes()?).into_owned();
            warn!("Tracker refused announce: {}", reason);
            return Err(TorrentError::transport_error(format!("tracker failure: {}", reason)));
        }

        let warning_message = dict
            .get(b"warning message".as_slice())
            .and_then(|v| v.as_bytes().ok())
            .map(|b| String::from_utf8_lossy(b).into_owned());
        if let Some(warning) = &warning_message {
            warn!("Tracker warning: {}", warning);
        }

        let peers_value = dict
            .get(b"peers".as_slice())
            .ok_or_else(|| TorrentError::malformed_input("tracker response has no peers"))?;
        let peers = parse_compact_peers(peers_value.as_bytes()?)?;

        let response = Self {
            interval: optional_count(dict, b"interval"),
            min_interval: optional_count(dict, b"min interval"),
            complete: optional_count(dict, b"complete"),
            incomplete: optional_count(dict, b"incomplete"),
            warning_message,
            peers,
        };
        debug!(
            "Tracker returned {} peers (interval {:?})",
            response.peers.len(),
            response.interval
        );
        Ok(response)
    }
}

fn optional_count(dict: &BencodeDict, key: &[u8]) -> Option<u64> {
    dict.get(key)
        .and_then(|v| v.as_integer().ok())
        .and_then(|n| u64::try_from(n).ok())
}

/// Split a compact peer string into 6-byte records
pub fn parse_compact_peers(bytes: &[u8]) -> Result<Vec<PeerAddress>> {
    if bytes.len() % COMPACT_PEER_LEN != 0 {
        return Err(TorrentError::malformed_input(format!(
            "compact peer list length {} is not a multiple of {}",
            bytes.len(),
            COMPACT_PEER_LEN
        )));
    }

    bytes
        .chunks_exact(COMPACT_PEER_LEN)
        .map(PeerAddress::from_compact)
        .collect()
}
