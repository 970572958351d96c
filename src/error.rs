//! Error types for the torrent client
//!
//! Every fallible operation in the library returns [`TorrentError`]. The
//! variants follow the failure domains of the client: bencode syntax, torrent
//! metadata, the peer wire protocol, and the tracker/connection transport.

use std::fmt;

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, TorrentError>;

/// Error type for torrent operations
#[derive(Debug, Clone)]
pub enum TorrentError {
    /// Bad bencode syntax
    MalformedInput {
        message: String,
        position: Option<usize>,
    },

    /// Missing or mistyped metadata keys
    InvalidTorrentFile {
        message: String,
        field: Option<String>,
    },

    /// A decoded value was not the variant the caller asked for
    TypeMismatch {
        expected: String,
        found: String,
    },

    /// The peer handshake could not be completed
    HandshakeFailed {
        message: String,
        peer: Option<String>,
        source: Option<String>,
    },

    /// The peer sent a message that is not valid in the current state
    UnexpectedMessage {
        message: String,
        peer: Option<String>,
    },

    /// A Piece message carried a different piece index than requested
    IndexMismatch {
        expected: u32,
        received: u32,
    },

    /// The connection closed in the middle of a frame or transfer
    ShortRead {
        message: String,
        peer: Option<String>,
    },

    /// An assembled piece does not hash to the digest in the metadata
    PieceHashMismatch {
        index: u32,
        expected: String,
        actual: String,
    },

    /// A connect or read deadline expired
    PeerTimeout {
        message: String,
        peer: Option<String>,
    },

    /// Tracker or connection failure
    TransportError {
        message: String,
        address: Option<String>,
        source: Option<String>,
    },

    /// Configuration errors
    ConfigError {
        message: String,
        field: Option<String>,
    },

    /// Output file errors
    StorageError {
        message: String,
        path: Option<String>,
        source: Option<String>,
    },
}

impl TorrentError {
    /// Create a new MalformedInput error
    pub fn malformed_input(message: impl Into<String>) -> Self {
        TorrentError::MalformedInput {
            message: message.into(),
            position: None,
        }
    }

    /// Create a new MalformedInput error at a byte offset
    pub fn malformed_input_at(message: impl Into<String>, position: usize) -> Self {
        TorrentError::MalformedInput {
            message: message.into(),
            position: Some(position),
        }
    }

    /// Create a new InvalidTorrentFile error
    pub fn invalid_torrent(message: impl Into<String>) -> Self {
        TorrentError::InvalidTorrentFile {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new InvalidTorrentFile error naming the offending key
    pub fn invalid_torrent_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        TorrentError::InvalidTorrentFile {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        TorrentError::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create a new HandshakeFailed error
    pub fn handshake_failed(message: impl Into<String>) -> Self {
        TorrentError::HandshakeFailed {
            message: message.into(),
            peer: None,
            source: None,
        }
    }

    /// Create a new HandshakeFailed error with peer and source
    pub fn handshake_failed_full(
        message: impl Into<String>,
        peer: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        TorrentError::HandshakeFailed {
            message: message.into(),
            peer: Some(peer.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new UnexpectedMessage error
    pub fn unexpected_message(message: impl Into<String>) -> Self {
        TorrentError::UnexpectedMessage {
            message: message.into(),
            peer: None,
        }
    }

    /// Create a new UnexpectedMessage error with peer address
    pub fn unexpected_message_from(message: impl Into<String>, peer: impl Into<String>) -> Self {
        TorrentError::UnexpectedMessage {
            message: message.into(),
            peer: Some(peer.into()),
        }
    }

    pub fn index_mismatch(expected: u32, received: u32) -> Self {
        TorrentError::IndexMismatch { expected, received }
    }

    /// Create a new ShortRead error
    pub fn short_read(message: impl Into<String>) -> Self {
        TorrentError::ShortRead {
            message: message.into(),
            peer: None,
        }
    }

    /// Create a new ShortRead error with peer address
    pub fn short_read_from(message: impl Into<String>, peer: impl Into<String>) -> Self {
        TorrentError::ShortRead {
            message: message.into(),
            peer: Some(peer.into()),
        }
    }

    pub fn piece_hash_mismatch(index: u32, expected: &[u8; 20], actual: &[u8; 20]) -> Self {
        TorrentError::PieceHashMismatch {
            index,
            expected: hex::encode(expected),
            actual: hex::encode(actual),
        }
    }

    /// Create a new PeerTimeout error with peer address
    pub fn peer_timeout(message: impl Into<String>, peer: impl Into<String>) -> Self {
        TorrentError::PeerTimeout {
            message: message.into(),
            peer: Some(peer.into()),
        }
    }

    /// Create a new TransportError
    pub fn transport_error(message: impl Into<String>) -> Self {
        TorrentError::TransportError {
            message: message.into(),
            address: None,
            source: None,
        }
    }

    /// Create a new TransportError with address and source
    pub fn transport_error_full(
        message: impl Into<String>,
        address: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        TorrentError::TransportError {
            message: message.into(),
            address: Some(address.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new ConfigError
    pub fn config_error(message: impl Into<String>) -> Self {
        TorrentError::ConfigError {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new ConfigError with field
    pub fn config_error_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        TorrentError::ConfigError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new StorageError with path and source
    pub fn storage_error_full(
        message: impl Into<String>,
        path: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        TorrentError::StorageError {
            message: message.into(),
            path: Some(path.into()),
            source: Some(source.into()),
        }
    }

    /// Whether the error is fatal only for the peer that caused it.
    ///
    /// The caller may retry the same operation against another peer.
    pub fn is_peer_error(&self) -> bool {
        matches!(
            self,
            TorrentError::HandshakeFailed { .. }
                | TorrentError::UnexpectedMessage { .. }
                | TorrentError::IndexMismatch { .. }
                | TorrentError::ShortRead { .. }
                | TorrentError::PieceHashMismatch { .. }
                | TorrentError::PeerTimeout { .. }
                | TorrentError::TransportError { address: Some(_), .. }
        )
    }

    /// Attach the remote peer address to errors raised below the session layer
    pub fn with_peer(mut self, addr: impl Into<String>) -> Self {
        let addr = addr.into();
        match &mut self {
            TorrentError::HandshakeFailed { peer, .. }
            | TorrentError::UnexpectedMessage { peer, .. }
            | TorrentError::ShortRead { peer, .. }
            | TorrentError::PeerTimeout { peer, .. } => {
                peer.get_or_insert(addr);
            }
            TorrentError::TransportError { address, .. } => {
                address.get_or_insert(addr);
            }
            _ => {}
        }
        self
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let ctx = context.into();
        let chain = |source: &mut Option<String>| {
            *source = Some(
                source
                    .as_ref()
                    .map_or_else(|| ctx.clone(), |s| format!("{}: {}", s, ctx)),
            );
        };
        match &mut self {
            TorrentError::HandshakeFailed { source, .. } => chain(source),
            TorrentError::TransportError { source, .. } => chain(source),
            TorrentError::StorageError { source, .. } => chain(source),
            TorrentError::MalformedInput { message, .. }
            | TorrentError::InvalidTorrentFile { message, .. }
            | TorrentError::UnexpectedMessage { message, .. }
            | TorrentError::ShortRead { message, .. }
            | TorrentError::PeerTimeout { message, .. }
            | TorrentError::ConfigError { message, .. } => {
                *message = format!("{} ({})", message, ctx);
            }
            _ => {}
        }
        self
    }
}

impl fmt::Display for TorrentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TorrentError::MalformedInput { message, position } => match position {
                Some(pos) => write!(f, "Malformed input: {} (at byte {})", message, pos),
                None => write!(f, "Malformed input: {}", message),
            },
            TorrentError::InvalidTorrentFile { message, field } => match field {
                Some(field) => write!(f, "Invalid torrent file: {} (field: {})", message, field),
                None => write!(f, "Invalid torrent file: {}", message),
            },
            TorrentError::TypeMismatch { expected, found } => {
                write!(f, "Type mismatch: expected {}, found {}", expected, found)
            }
            TorrentError::HandshakeFailed { message, peer, source } => match (peer, source) {
                (Some(p), Some(s)) => write!(f, "Handshake failed: {} (peer: {}, source: {})", message, p, s),
                (Some(p), None) => write!(f, "Handshake failed: {} (peer: {})", message, p),
                (None, Some(s)) => write!(f, "Handshake failed: {} (source: {})", message, s),
                (None, None) => write!(f, "Handshake failed: {}", message),
            },
            TorrentError::UnexpectedMessage { message, peer } => match peer {
                Some(p) => write!(f, "Unexpected message: {} (peer: {})", message, p),
                None => write!(f, "Unexpected message: {}", message),
            },
            TorrentError::IndexMismatch { expected, received } => {
                write!(f, "Piece index mismatch: expected {}, got {}", expected, received)
            }
            TorrentError::ShortRead { message, peer } => match peer {
                Some(p) => write!(f, "Short read: {} (peer: {})", message, p),
                None => write!(f, "Short read: {}", message),
            },
            TorrentError::PieceHashMismatch { index, expected, actual } => write!(
                f,
                "Piece {} failed verification: expected {}, got {}",
                index, expected, actual
            ),
            TorrentError::PeerTimeout { message, peer } => match peer {
                Some(p) => write!(f, "Peer timeout: {} (peer: {})", message, p),
                None => write!(f, "Peer timeout: {}", message),
            },
            TorrentError::TransportError { message, address, source } => match (address, source) {
                (Some(a), Some(s)) => write!(f, "Transport error: {} (address: {}, source: {})", message, a, s),
                (Some(a), None) => write!(f, "Transport error: {} (address: {})", message, a),
                (None, Some(s)) => write!(f, "Transport error: {} (source: {})", message, s),
                (None, None) => write!(f, "Transport error: {}", message),
            },
            TorrentError::ConfigError { message, field } => match field {
                Some(field) => write!(f, "Config error: {} (field: {})", message, field),
                None => write!(f, "Config error: {}", message),
            },
            TorrentError::StorageError { message, path, source } => match (path, source) {
                (Some(p), Some(s)) => write!(f, "Storage error: {} (path: {}, source: {})", message, p, s),
                (Some(p), None) => write!(f, "Storage error: {} (path: {})", message, p),
                (None, Some(s)) => write!(f, "Storage error: {} (source: {})", message, s),
                (None, None) => write!(f, "Storage error: {}", message),
            },
        }
    }
}

impl std::error::Error for TorrentError {}

impl From<std::io::Error> for TorrentError {
    fn from(err: std::io::Error) -> Self {
        TorrentError::StorageError {
            message: err.to_string(),
            path: None,
            source: Some(err.kind().to_string()),
        }
    }
}

impl From<reqwest::Error> for TorrentError {
    fn from(err: reqwest::Error) -> Self {
        TorrentError::TransportError {
            message: "HTTP request failed".to_string(),
            address: None,
            source: Some(err.to_string()),
        }
    }
}

impl From<std::net::AddrParseError> for TorrentError {
    fn from(err: std::net::AddrParseError) -> Self {
        TorrentError::config_error(format!("Failed to parse address: {}", err))
    }
}

impl From<tokio::time::error::Elapsed> for TorrentError {
    fn from(_err: tokio::time::error::Elapsed) -> Self {
        TorrentError::PeerTimeout {
            message: "Operation timed out".to_string(),
            peer: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_input_display() {
        let err = TorrentError::malformed_input_at("unterminated integer", 3);
        assert_eq!(err.to_string(), "Malformed input: unterminated integer (at byte 3)");
    }

    #[test]
    fn test_invalid_torrent_field() {
        let err = TorrentError::invalid_torrent_field("missing key", "info.pieces");
        assert!(err.to_string().contains("Invalid torrent file"));
        assert!(err.to_string().contains("info.pieces"));
    }

    #[test]
    fn test_index_mismatch_display() {
        let err = TorrentError::index_mismatch(3, 4);
        assert_eq!(err.to_string(), "Piece index mismatch: expected 3, got 4");
    }

    #[test]
    fn test_peer_errors_are_retryable() {
        assert!(TorrentError::handshake_failed("short reply").is_peer_error());
        assert!(TorrentError::unexpected_message("choke").is_peer_error());
        assert!(TorrentError::index_mismatch(0, 1).is_peer_error());
        assert!(TorrentError::short_read("eof").is_peer_error());
        assert!(TorrentError::piece_hash_mismatch(0, &[0; 20], &[1; 20]).is_peer_error());
        assert!(TorrentError::peer_timeout("read", "127.0.0.1:6881").is_peer_error());
        assert!(TorrentError::transport_error_full("refused", "127.0.0.1:6881", "os error").is_peer_error());
    }

    #[test]
    fn test_file_errors_are_not_retryable() {
        assert!(!TorrentError::malformed_input("bad").is_peer_error());
        assert!(!TorrentError::invalid_torrent("bad").is_peer_error());
        assert!(!TorrentError::transport_error("tracker down").is_peer_error());
    }

    #[test]
    fn test_with_peer_makes_transport_error_peer_scoped() {
        let err = TorrentError::transport_error("connection reset");
        assert!(!err.is_peer_error());
        let err = err.with_peer("10.0.0.1:51413");
        assert!(err.is_peer_error());
        assert!(err.to_string().contains("10.0.0.1:51413"));
    }

    #[test]
    fn test_with_peer_keeps_existing_address() {
        let err = TorrentError::short_read_from("eof", "1.1.1.1:1").with_peer("2.2.2.2:2");
        assert!(err.to_string().contains("1.1.1.1:1"));
        assert!(!err.to_string().contains("2.2.2.2:2"));
    }

    #[test]
    fn test_with_context() {
        let err = TorrentError::handshake_failed("short reply").with_context("while connecting");
        assert!(err.to_string().contains("while connecting"));

        let err = TorrentError::short_read("eof").with_context("piece 2");
        assert!(err.to_string().contains("piece 2"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: TorrentError = io_err.into();
        assert!(matches!(err, TorrentError::StorageError { .. }));
    }

    #[test]
    fn test_from_addr_parse_error() {
        let addr_err = "invalid:address".parse::<std::net::SocketAddr>().unwrap_err();
        let err: TorrentError = addr_err.into();
        assert!(matches!(err, TorrentError::ConfigError { .. }));
    }
}
