//! Peer state module
//!
//! Defines peer addresses and the session state machine.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;

use tracing::debug;

use crate::error::{Result, TorrentError};

/// Size of one compact peer record: 4 address octets and a big-endian port
pub const COMPACT_PEER_LEN: usize = 6;

/// IPv4 address and port of a remote peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerAddress {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl PeerAddress {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Build an address from a 6-byte compact tracker record
    pub fn from_compact(record: &[u8]) -> Result<Self> {
        if record.len() != COMPACT_PEER_LEN {
            return Err(TorrentError::malformed_input(format!(
                "compact peer record must be {} bytes, got {}",
                COMPACT_PEER_LEN,
                record.len()
            )));
        }
        let ip = Ipv4Addr::new(record[0], record[1], record[2], record[3]);
        let port = u16::from_be_bytes([record[4], record[5]]);
        Ok(Self { ip, port })
    }

    /// Encode as a 6-byte compact record
    pub fn to_compact(&self) -> [u8; COMPACT_PEER_LEN] {
        let mut record = [0u8; COMPACT_PEER_LEN];
        record[..4].copy_from_slice(&self.ip.octets());
        record[4..].copy_from_slice(&self.port.to_be_bytes());
        record
    }

    /// Resolve a `host:port` string, accepting host names as well as literals
    pub async fn resolve(host_port: &str) -> Result<Self> {
        if let Ok(addr) = host_port.parse::<PeerAddress>() {
            return Ok(addr);
        }

        debug!("Resolving peer address: {}", host_port);
        let candidates = tokio::net::lookup_host(host_port).await.map_err(|e| {
            TorrentError::config_error_with_field(format!("cannot resolve peer address: {}", e), host_port)
        })?;

        candidates
            .filter_map(|addr| match addr {
                SocketAddr::V4(v4) => Some(Self::new(*v4.ip(), v4.port())),
                SocketAddr::V6(_) => None,
            })
            .next()
            .ok_or_else(|| TorrentError::config_error_with_field("no IPv4 address for peer", host_port))
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }
}

impl FromStr for PeerAddress {
    type Err = TorrentError;

    /// Parse an `a.b.c.d:port` literal
    fn from_str(s: &str) -> Result<Self> {
        let addr: SocketAddrV4 = s.parse()?;
        Ok(Self::new(*addr.ip(), addr.port()))
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl From<SocketAddrV4> for PeerAddress {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(*addr.ip(), addr.port())
    }
}

/// Represents the state of a peer session.
///
/// A downloading session moves strictly forward through these states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum SessionState {
    /// No connection
    #[default]
    Disconnected,
    /// Handshake exchanged
    Connected,
    /// The peer announced which pieces it has
    BitfieldReceived,
    /// We told the peer we want data
    Interested,
    /// The peer allows us to request blocks
    Unchoked,
    /// At least one block request has been sent
    Active,
}

impl SessionState {
    /// Check if block requests may be sent
    pub fn can_request(&self) -> bool {
        matches!(self, SessionState::Unchoked | SessionState::Active)
    }
}

/// Check if a bitfield has the bit for `piece_index` set
pub fn bitfield_has_piece(bitfield: &[u8], piece_index: usize) -> bool {
    let byte_index = piece_index / 8;
    let bit_index = 7 - (piece_index % 8);
    bitfield
        .get(byte_index)
        .is_some_and(|byte| (byte >> bit_index) & 1 == 1)
}
