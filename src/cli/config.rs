//! CLI configuration module
//!
//! Runtime configuration built once from the command line, including the
//! local peer id used for every tracker and peer exchange.

use std::time::Duration;

use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::debug;

use crate::cli::args::CliArgs;
use crate::error::{Result, TorrentError};
use crate::peer::SessionTimeouts;
use crate::storage::PieceDownloader;

/// Prefix of generated peer ids: client code `MB`, version 0001
pub const PEER_ID_PREFIX: &[u8; 8] = b"-MB0001-";

/// Configuration for the BitTorrent client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Local peer id, generated once per process
    pub peer_id: [u8; 20],
    /// Port reported to the tracker
    pub port: u16,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Block requests in flight per piece
    pub pipeline: usize,
    /// Verify pieces against their SHA-1 digest
    pub verify: bool,
    /// Verbose output
    pub verbose: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Config {
    /// Create configuration from CLI arguments
    pub fn from_args(args: &CliArgs) -> Self {
        let peer_id = generate_peer_id();
        debug!("Generated peer id: {}", String::from_utf8_lossy(&peer_id));

        Self {
            peer_id,
            port: args.port,
            connect_timeout: Duration::from_secs(args.connect_timeout),
            read_timeout: Duration::from_secs(args.read_timeout),
            pipeline: args.pipeline,
            verify: !args.no_verify,
            verbose: args.verbose,
            quiet: args.quiet,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(TorrentError::config_error_with_field("port cannot be 0", "port"));
        }

        if self.connect_timeout.is_zero() {
            return Err(TorrentError::config_error_with_field(
                "timeout must be at least 1 second",
                "connect_timeout",
            ));
        }

        if self.read_timeout.is_zero() {
            return Err(TorrentError::config_error_with_field(
                "timeout must be at least 1 second",
                "read_timeout",
            ));
        }

        if self.pipeline == 0 {
            return Err(TorrentError::config_error_with_field(
                "pipeline must be at least 1",
                "pipeline",
            ));
        }

        Ok(())
    }

    pub fn session_timeouts(&self) -> SessionTimeouts {
        SessionTimeouts {
            connect: self.connect_timeout,
            read: self.read_timeout,
        }
    }

    /// Piece downloader configured with the verification and pipeline settings
    pub fn downloader(&self) -> PieceDownloader {
        PieceDownloader::new(self.verify, self.pipeline)
    }
}

/// Generate a peer id of the form `-MB0001-` followed by 12 random characters
pub fn generate_peer_id() -> [u8; 20] {
    let mut peer_id = [0u8; 20];
    peer_id[..8].copy_from_slice(PEER_ID_PREFIX);
    for (slot, byte) in peer_id[8..]
        .iter_mut()
        .zip(rand::thread_rng().sample_iter(&Alphanumeric))
    {
        *slot = byte;
    }
    peer_id
}
