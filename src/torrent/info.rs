//! Torrent information structures
//!
//! Provides high-level information about a single-file torrent and the piece
//! geometry derived from it.

use sha1::{Digest, Sha1};

use crate::error::{Result, TorrentError};
use crate::storage::piece;

/// Size of a SHA-1 digest
pub const HASH_LEN: usize = 20;

/// High-level torrent information
///
/// Built once by [`crate::TorrentParser`] and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentInfo {
    /// Primary tracker announce URL
    pub announce: String,
    /// All tracker URLs from `announce-list`, primary first, deduplicated
    pub announce_list: Vec<String>,
    /// Suggested file name
    pub name: String,
    /// Size of each piece in bytes (the last piece may be shorter)
    pub piece_length: u64,
    /// Size of the file in bytes
    pub total_length: u64,
    /// SHA-1 digest of every piece, in piece order
    pub piece_hashes: Vec<[u8; HASH_LEN]>,
    /// SHA-1 digest of the canonically encoded `info` dictionary
    pub info_hash: [u8; HASH_LEN],
}

impl TorrentInfo {
    /// Get number of pieces in torrent
    pub fn piece_count(&self) -> usize {
        self.piece_hashes.len()
    }

    /// Number of pieces implied by the lengths, `ceil(total_length / piece_length)`
    pub fn expected_piece_count(total_length: u64, piece_length: u64) -> u64 {
        if piece_length == 0 {
            return 0;
        }
        total_length.div_ceil(piece_length)
    }

    /// Length in bytes of the piece at `index`.
    ///
    /// Every piece is `piece_length` long except the last one, which holds
    /// whatever remains of the file. Returns `None` for an index past the end.
    pub fn piece_len(&self, index: u32) -> Option<u64> {
        let index = index as u64;
        if index >= self.piece_count() as u64 {
            return None;
        }
        let start = index * self.piece_length;
        Some(self.piece_length.min(self.total_length - start))
    }

    /// Number of block requests needed for the piece at `index`
    pub fn num_blocks(&self, index: u32) -> Option<u32> {
        self.piece_len(index).map(piece::num_blocks)
    }

    /// Length of block `block` of the piece at `index`
    pub fn block_len(&self, index: u32, block: u32) -> Option<u32> {
        self.piece_len(index)
            .and_then(|len| piece::block_len(len, block))
    }

    /// Get piece hash for a specific piece index
    pub fn piece_hash(&self, index: u32) -> Option<&[u8; HASH_LEN]> {
        self.piece_hashes.get(index as usize)
    }

    /// Get byte range of a piece within the file
    pub fn piece_range(&self, index: u32) -> Option<(u64, u64)> {
        let len = self.piece_len(index)?;
        let start = index as u64 * self.piece_length;
        Some((start, start + len))
    }

    /// Get info hash as a hex string
    pub fn info_hash_hex(&self) -> String {
        hex::encode(self.info_hash)
    }

    /// Piece hashes as hex strings, in order
    pub fn piece_hashes_hex(&self) -> Vec<String> {
        self.piece_hashes.iter().map(hex::encode).collect()
    }

    /// Generate info hash from canonical info dictionary bytes
    pub fn generate_info_hash(info_dict_bytes: &[u8]) -> [u8; HASH_LEN] {
        let mut hasher = Sha1::new();
        hasher.update(info_dict_bytes);
        hasher.finalize().into()
    }

    /// Split the concatenated `pieces` field into 20-byte digests
    pub fn parse_piece_hashes(pieces_bytes: &[u8]) -> Result<Vec<[u8; HASH_LEN]>> {
        if pieces_bytes.len() % HASH_LEN != 0 {
            return Err(TorrentError::invalid_torrent_field(
                format!("length must be a multiple of 20, got {}", pieces_bytes.len()),
                "info.pieces",
            ));
        }

        Ok(pieces_bytes
            .chunks_exact(HASH_LEN)
            .map(|chunk| {
                let mut hash = [0u8; HASH_LEN];
                hash.copy_from_slice(chunk);
                hash
            })
            .collect())
    }
}
