//! CLI arguments module
//!
//! Defines command-line argument parsing using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI arguments for the BitTorrent client
#[derive(Debug, Parser)]
#[command(name = "mybittorrent")]
#[command(about = "A minimal single-peer BitTorrent client", long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Port reported to the tracker
    #[arg(long, global = true, default_value_t = 6881)]
    pub port: u16,

    /// Seconds to wait for a TCP connection to a peer
    #[arg(long, global = true, value_name = "SECS", default_value_t = 10)]
    pub connect_timeout: u64,

    /// Seconds to wait for each message from a peer
    #[arg(long, global = true, value_name = "SECS", default_value_t = 30)]
    pub read_timeout: u64,

    /// Block requests kept in flight per piece
    #[arg(long, global = true, value_name = "N", default_value_t = 1)]
    pub pipeline: usize,

    /// Skip SHA-1 verification of downloaded pieces
    #[arg(long, global = true)]
    pub no_verify: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Decode a bencoded value and print it as JSON
    Decode {
        #[arg(value_name = "BENCODED")]
        value: String,
    },

    /// Print tracker URL, length, info hash and piece hashes
    Info {
        #[arg(value_name = "TORRENT_FILE")]
        torrent: PathBuf,
    },

    /// List the peers returned by the tracker
    Peers {
        #[arg(value_name = "TORRENT_FILE")]
        torrent: PathBuf,
    },

    /// Handshake with a peer and print its peer id
    Handshake {
        #[arg(value_name = "TORRENT_FILE")]
        torrent: PathBuf,
        /// Peer address as host:port
        #[arg(value_name = "PEER")]
        peer: String,
    },

    /// Download a single piece
    #[command(name = "download_piece")]
    DownloadPiece {
        /// Output file
        #[arg(short, long, value_name = "PATH")]
        output: PathBuf,
        #[arg(value_name = "TORRENT_FILE")]
        torrent: PathBuf,
        #[arg(value_name = "PIECE_INDEX")]
        index: u32,
    },

    /// Download the whole file
    Download {
        /// Output file
        #[arg(short, long, value_name = "PATH")]
        output: PathBuf,
        #[arg(value_name = "TORRENT_FILE")]
        torrent: PathBuf,
    },
}

impl CliArgs {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Get the log level based on verbosity settings
    pub fn log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::ERROR
        } else {
            tracing::Level::WARN
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let args = CliArgs::try_parse_from(["mybittorrent", "info", "sample.torrent"]).unwrap();

        assert_eq!(args.port, 6881);
        assert_eq!(args.connect_timeout, 10);
        assert_eq!(args.read_timeout, 30);
        assert_eq!(args.pipeline, 1);
        assert!(!args.no_verify);
        assert_eq!(args.log_level(), tracing::Level::WARN);
        assert_eq!(args.command, Command::Info { torrent: PathBuf::from("sample.torrent") });
    }

    #[test]
    fn test_decode() {
        let args = CliArgs::try_parse_from(["mybittorrent", "decode", "5:hello"]).unwrap();
        assert_eq!(args.command, Command::Decode { value: "5:hello".to_string() });
    }

    #[test]
    fn test_download_piece() {
        let args = CliArgs::try_parse_from([
            "mybittorrent",
            "download_piece",
            "-o",
            "/tmp/test-piece-0",
            "sample.torrent",
            "0",
        ])
        .unwrap();

        assert_eq!(
            args.command,
            Command::DownloadPiece {
                output: PathBuf::from("/tmp/test-piece-0"),
                torrent: PathBuf::from("sample.torrent"),
                index: 0,
            }
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = CliArgs::try_parse_from([
            "mybittorrent",
            "download",
            "-o",
            "out.bin",
            "sample.torrent",
            "--pipeline",
            "5",
            "--verbose",
        ])
        .unwrap();

        assert_eq!(args.pipeline, 5);
        assert_eq!(args.log_level(), tracing::Level::DEBUG);
    }

    #[test]
    fn test_handshake_args() {
        let args = CliArgs::try_parse_from(["mybittorrent", "handshake", "sample.torrent", "127.0.0.1:6881"]).unwrap();
        assert_eq!(
            args.command,
            Command::Handshake {
                torrent: PathBuf::from("sample.torrent"),
                peer: "127.0.0.1:6881".to_string(),
            }
        );
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(CliArgs::try_parse_from(["mybittorrent"]).is_err());
        assert!(CliArgs::try_parse_from(["mybittorrent", "download_piece", "sample.torrent", "0"]).is_err());
        assert!(CliArgs::try_parse_from(["mybittorrent", "download_piece", "-o", "x", "sample.torrent", "-1"]).is_err());
        assert!(CliArgs::try_parse_from(["mybittorrent", "--verbose", "--quiet", "info", "a"]).is_err());
    }
}
