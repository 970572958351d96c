//! Tracker module
//!
//! HTTP announce requests and compact peer list decoding.

pub mod client;
pub mod response;

pub use client::{announce_url, HttpTransport, TrackerClient, TrackerTransport, HTTP_TIMEOUT};
pub use response::{parse_compact_peers, AnnounceResponse};
