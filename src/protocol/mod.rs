//! BitTorrent protocol module
//!
//! Implements the handshake and message framing of the peer wire protocol.

pub mod handshake;
pub mod message;
pub mod wire;

// Re-export main types
pub use handshake::{Handshake, HANDSHAKE_LEN, PROTOCOL_LENGTH, PROTOCOL_STRING};
pub use message::{Message, MessageId};
pub use wire::{BitTorrentWire, WireProtocol, MAX_FRAME_LEN};
