//! Storage module
//!
//! Piece assembly, the per-peer download loop and the output writer.

pub mod download;
pub mod file;
pub mod piece;

// Re-export download types
pub use download::PieceDownloader;

// Re-export piece types
pub use piece::{block_len, block_requests, num_blocks, BlockRequest, PieceBuffer, BLOCK_SIZE};

pub use file::write_output;
