//! Peer module
//!
//! Peer addresses, the session state machine and live peer sessions.

pub mod connection;
pub mod state;

// Re-export main types
pub use connection::{PeerSession, SessionTimeouts};
pub use state::{bitfield_has_piece, PeerAddress, SessionState, COMPACT_PEER_LEN};
