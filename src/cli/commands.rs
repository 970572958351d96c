//! CLI command handlers
//!
//! Each subcommand loads what it needs, talks to the tracker or a peer, and
//! returns the text to print on stdout.

use std::future::Future;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::bencode;
use crate::cli::args::{CliArgs, Command};
use crate::cli::config::Config;
use crate::error::TorrentError;
use crate::peer::{PeerAddress, PeerSession};
use crate::storage::write_output;
use crate::torrent::{TorrentInfo, TorrentParser};
use crate::tracker::{TrackerClient, HTTP_TIMEOUT};

/// Run the selected subcommand and return its stdout output
pub async fn run(args: &CliArgs, config: &Config) -> Result<String> {
    debug!("Running command: {:?}", args.command);
    match &args.command {
        Command::Decode { value } => render_decode(value),
        Command::Info { torrent } => Ok(render_info(&load_torrent(torrent).await?)),
        Command::Peers { torrent } => {
            let info = load_torrent(torrent).await?;
            let peers = discover_peers(&info, config).await?;
            Ok(render_peers(&peers))
        }
        Command::Handshake { torrent, peer } => {
            let info = load_torrent(torrent).await?;
            let remote = PeerAddress::resolve(peer)
                .await
                .with_context(|| format!("Invalid peer address '{}'", peer))?;
            let peer_id = handshake(remote, &info, config).await?;
            Ok(format!("Peer ID: {}", peer_id))
        }
        Command::DownloadPiece { output, torrent, index } => {
            let info = load_torrent(torrent).await?;
            let peers = discover_peers(&info, config).await?;
            let piece = download_piece_from(&peers, &info, config, *index)
                .await
                .with_context(|| format!("Failed to download piece {}", index))?;
            write_output(output, &piece).await.context("Failed to write piece")?;
            Ok(format!("Piece {} downloaded to {}.", index, output.display()))
        }
        Command::Download { output, torrent } => {
            let info = load_torrent(torrent).await?;
            let peers = discover_peers(&info, config).await?;
            let file = download_file_from(&peers, &info, config)
                .await
                .with_context(|| format!("Failed to download {}", info.name))?;
            write_output(output, &file).await.context("Failed to write file")?;
            Ok(format!("Downloaded {} to {}.", torrent.display(), output.display()))
        }
    }
}

/// Render a bencoded string as JSON
pub fn render_decode(input: &str) -> Result<String> {
    let value = bencode::decode_all(input.as_bytes()).context("Failed to decode bencoded value")?;
    serde_json::to_string(&value).context("Failed to render JSON")
}

/// Render the torrent summary printed by `info`
pub fn render_info(info: &TorrentInfo) -> String {
    let mut lines = vec![
        format!("Tracker URL: {}", info.announce),
        format!("Length: {}", info.total_length),
        format!("Info Hash: {}", info.info_hash_hex()),
        format!("Piece Length: {}", info.piece_length),
        "Piece Hashes:".to_string(),
    ];
    lines.extend(info.piece_hashes_hex());
    lines.join("\n")
}

/// One `ip:port` per line
pub fn render_peers(peers: &[PeerAddress]) -> String {
    peers.iter().map(PeerAddress::to_string).collect::<Vec<_>>().join("\n")
}

async fn load_torrent(path: &Path) -> Result<TorrentInfo> {
    let info = TorrentParser::parse_file(path)
        .await
        .with_context(|| format!("Failed to load torrent file '{}'", path.display()))?;
    info!("Loaded torrent: {} ({} pieces)", info.name, info.piece_count());
    Ok(info)
}

async fn discover_peers(info: &TorrentInfo, config: &Config) -> Result<Vec<PeerAddress>> {
    let client = TrackerClient::http(HTTP_TIMEOUT)?;
    let peers = client
        .announce(info, &config.peer_id, config.port)
        .await
        .context("Tracker announce failed")?;
    info!("Tracker returned {} peers", peers.len());
    Ok(peers)
}

/// Handshake with one peer and return its peer id in hex
pub async fn handshake(remote: PeerAddress, info: &TorrentInfo, config: &Config) -> crate::Result<String> {
    let session = PeerSession::connect(remote, info.info_hash, config.peer_id, config.session_timeouts()).await?;
    let peer_id = session.peer_id_hex();
    session.close().await?;
    Ok(peer_id)
}

/// Download one piece, trying peers in order until one delivers it
pub async fn download_piece_from(
    peers: &[PeerAddress],
    info: &TorrentInfo,
    config: &Config,
    index: u32,
) -> crate::Result<Vec<u8>> {
    let downloader = config.downloader();
    try_peers(peers, |remote| async move {
        let mut session =
            PeerSession::connect(remote, info.info_hash, config.peer_id, config.session_timeouts()).await?;
        let result = downloader.fetch_piece(&mut session, info, index).await;
        session.close().await?;
        result
    })
    .await
}

/// Download the whole file from the first peer able to deliver all of it
pub async fn download_file_from(
    peers: &[PeerAddress],
    info: &TorrentInfo,
    config: &Config,
) -> crate::Result<Vec<u8>> {
    let downloader = config.downloader();
    try_peers(peers, |remote| async move {
        let mut session =
            PeerSession::connect(remote, info.info_hash, config.peer_id, config.session_timeouts()).await?;
        let result = downloader.fetch_file(&mut session, info).await;
        session.close().await?;
        result
    })
    .await
}

/// Run `attempt` against each peer in turn.
///
/// Moves on only when the error is fatal for that peer alone; any other
/// error is returned immediately.
pub async fn try_peers<T, F, Fut>(peers: &[PeerAddress], mut attempt: F) -> crate::Result<T>
where
    F: FnMut(PeerAddress) -> Fut,
    Fut: Future<Output = crate::Result<T>>,
{
    let mut last_error = None;
    for (position, remote) in peers.iter().enumerate() {
        match attempt(*remote).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_peer_error() => {
                warn!("Peer {} ({}/{}) failed: {}", remote, position + 1, peers.len(), e);
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| TorrentError::transport_error("tracker returned no peers")))
}
