//! mybittorrent
//!
//! A minimal BitTorrent client: bencode codec, torrent metadata, HTTP tracker
//! announce, the peer wire protocol and single-peer piece download.

pub mod bencode;
pub mod cli;
pub mod error;
pub mod peer;
pub mod protocol;
pub mod storage;
pub mod torrent;
pub mod tracker;

pub use error::{Result, TorrentError};

pub use bencode::{BencodeDict, BencodeValue};
pub use cli::{CliArgs, Command, Config};
pub use peer::{PeerAddress, PeerSession, SessionState, SessionTimeouts};
pub use protocol::{Handshake, Message, MessageId};
pub use storage::{PieceBuffer, PieceDownloader};
pub use torrent::{TorrentInfo, TorrentParser};
pub use tracker::{AnnounceResponse, TrackerClient, TrackerTransport};
