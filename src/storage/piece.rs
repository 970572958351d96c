//! Piece assembly module
//!
//! Block geometry for a piece and a buffer that assembles received blocks
//! and checks the result against the piece's SHA-1 digest.

use sha1::{Digest, Sha1};
use tracing::{debug, trace, warn};

use crate::error::{Result, TorrentError};

/// Size of every block request except possibly the last one of a piece
pub const BLOCK_SIZE: u32 = 16 * 1024;

/// Number of blocks needed to cover a piece of `piece_len` bytes
pub fn num_blocks(piece_len: u64) -> u32 {
    piece_len.div_ceil(BLOCK_SIZE as u64) as u32
}

/// Length of block `block` within a piece of `piece_len` bytes.
///
/// Only the final block can be shorter than [`BLOCK_SIZE`]. Returns `None`
/// for a block past the end of the piece.
pub fn block_len(piece_len: u64, block: u32) -> Option<u32> {
    let start = block as u64 * BLOCK_SIZE as u64;
    if start >= piece_len {
        return None;
    }
    Some((piece_len - start).min(BLOCK_SIZE as u64) as u32)
}

/// A single block request within a piece
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRequest {
    pub index: u32,
    pub begin: u32,
    pub length: u32,
}

/// Requests covering the whole piece, in ascending offset order
pub fn block_requests(index: u32, piece_len: u64) -> impl Iterator<Item = BlockRequest> {
    (0..num_blocks(piece_len)).filter_map(move |block| {
        let length = block_len(piece_len, block)?;
        let begin = u32::try_from(block as u64 * BLOCK_SIZE as u64).ok()?;
        Some(BlockRequest { index, begin, length })
    })
}

/// Buffer for one piece being assembled from blocks
#[derive(Debug, Clone)]
pub struct PieceBuffer {
    index: u32,
    data: Vec<u8>,
    received: Vec<bool>,
    received_bytes: u64,
}

impl PieceBuffer {
    pub fn new(index: u32, piece_len: u64) -> Self {
        Self {
            index,
            data: vec![0u8; piece_len as usize],
            received: vec![false; num_blocks(piece_len) as usize],
            received_bytes: 0,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Copy a received block into place.
    ///
    /// The block must start on a block boundary, have exactly the expected
    /// length and not have been received before.
    pub fn insert(&mut self, begin: u32, block: &[u8]) -> Result<()> {
        if begin % BLOCK_SIZE != 0 {
            return Err(TorrentError::unexpected_message(format!(
                "block offset {} of piece {} is not a multiple of {}",
                begin, self.index, BLOCK_SIZE
            )));
        }

        let slot = (begin / BLOCK_SIZE) as usize;
        let expected = block_len(self.data.len() as u64, slot as u32).ok_or_else(|| {
            TorrentError::unexpected_message(format!(
                "block offset {} is past the end of piece {} ({} bytes)",
                begin,
                self.index,
                self.data.len()
            ))
        })?;

        if block.len() != expected as usize {
            warn!(
                "Piece {} block at {} has {} bytes, expected {}",
                self.index,
                begin,
                block.len(),
                expected
            );
            return Err(TorrentError::unexpected_message(format!(
                "block at offset {} of piece {} has {} bytes, expected {}",
                begin,
                self.index,
                block.len(),
                expected
            )));
        }

        if self.received[slot] {
            return Err(TorrentError::unexpected_message(format!(
                "duplicate block at offset {} of piece {}",
                begin, self.index
            )));
        }

        let start = begin as usize;
        self.data[start..start + block.len()].copy_from_slice(block);
        self.received[slot] = true;
        self.received_bytes += block.len() as u64;
        trace!(
            "Piece {}: stored block at {} ({}/{} bytes)",
            self.index,
            begin,
            self.received_bytes,
            self.data.len()
        );
        Ok(())
    }

    /// Whether every block has been received
    pub fn is_complete(&self) -> bool {
        self.received.iter().all(|&r| r)
    }

    /// Offsets of blocks not yet received
    pub fn missing_offsets(&self) -> Vec<u32> {
        self.received
            .iter()
            .enumerate()
            .filter(|(_, &r)| !r)
            .map(|(slot, _)| slot as u32 * BLOCK_SIZE)
            .collect()
    }

    /// SHA-1 digest of the current contents
    pub fn digest(&self) -> [u8; 20] {
        let mut hasher = Sha1::new();
        hasher.update(&self.data);
        hasher.finalize().into()
    }

    /// Check the assembled piece against its expected digest
    pub fn verify(&self, expected: &[u8; 20]) -> Result<()> {
        let actual = self.digest();
        if actual != *expected {
            warn!("Piece {} failed hash verification", self.index);
            return Err(TorrentError::piece_hash_mismatch(self.index, expected, &actual));
        }
        debug!("Piece {} verified", self.index);
        Ok(())
    }

    /// Take the assembled bytes, failing if any block is missing
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        if !self.is_complete() {
            return Err(TorrentError::short_read(format!(
                "piece {} is missing blocks at offsets {:?}",
                self.index,
                self.missing_offsets()
            )));
        }
        Ok(self.data)
    }
}
