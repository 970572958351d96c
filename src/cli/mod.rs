//! CLI module
//!
//! Command-line interface for the BitTorrent client.

pub mod args;
pub mod commands;
pub mod config;

pub use args::{CliArgs, Command};
pub use commands::run;
pub use config::{generate_peer_id, Config};
