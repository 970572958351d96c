//! Download module
//!
//! Drives the request/response loop for pieces on a single peer session and
//! assembles verified piece buffers.

use std::collections::HashMap;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, trace, warn};

use crate::error::{Result, TorrentError};
use crate::peer::PeerSession;
use crate::protocol::Message;
use crate::storage::piece::{block_requests, PieceBuffer};
use crate::torrent::TorrentInfo;

/// Downloads pieces from one peer session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PieceDownloader {
    /// Check each piece against its SHA-1 digest
    verify: bool,
    /// Maximum number of outstanding block requests
    pipeline: usize,
}

impl Default for PieceDownloader {
    fn default() -> Self {
        Self {
            verify: true,
            pipeline: 1,
        }
    }
}

impl PieceDownloader {
    /// Create a downloader; a pipeline depth of 0 is treated as 1
    pub fn new(verify: bool, pipeline: usize) -> Self {
        Self {
            verify,
            pipeline: pipeline.max(1),
        }
    }

    pub fn verify(&self) -> bool {
        self.verify
    }

    pub fn pipeline(&self) -> usize {
        self.pipeline
    }

    /// Download one piece and return exactly `piece_len(index)` bytes.
    ///
    /// Runs the bitfield, interested and unchoke steps first if the session
    /// has not been through them yet.
    pub async fn fetch_piece<S>(
        &self,
        session: &mut PeerSession<S>,
        info: &TorrentInfo,
        index: u32,
    ) -> Result<Vec<u8>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let piece_len = info.piece_len(index).ok_or_else(|| {
            error!("Piece index {} out of range ({} pieces)", index, info.piece_count());
            TorrentError::config_error_with_field(
                format!("piece index {} out of range, torrent has {} pieces", index, info.piece_count()),
                "piece_index",
            )
        })?;

        session.prepare_download().await?;

        let peer = session.remote().to_string();
        info!("Downloading piece {} ({} bytes) from {}", index, piece_len, peer);

        let mut buffer = PieceBuffer::new(index, piece_len);
        let mut pending = block_requests(index, piece_len);
        // Outstanding requests keyed by (piece index, block offset)
        let mut in_flight: HashMap<(u32, u32), u32> = HashMap::with_capacity(self.pipeline);

        loop {
            while in_flight.len() < self.pipeline {
                let Some(request) = pending.next() else { break };
                session.request_block(request.index, request.begin, request.length).await?;
                in_flight.insert((request.index, request.begin), request.length);
            }

            if in_flight.is_empty() {
                break;
            }

            match session.receive_typed_message().await? {
                Message::Piece { index: received, begin, block } => {
                    if received != index {
                        warn!("Peer {} sent piece {} while piece {} was requested", peer, received, index);
                        return Err(TorrentError::index_mismatch(index, received));
                    }
                    if in_flight.remove(&(received, begin)).is_none() {
                        return Err(TorrentError::unexpected_message_from(
                            format!("unrequested block at offset {} of piece {}", begin, index),
                            peer,
                        ));
                    }
                    trace!("Piece {}: received block at {} ({} bytes)", index, begin, block.len());
                    buffer.insert(begin, &block).map_err(|e| e.with_peer(peer.clone()))?;
                }
                other => {
                    error!("Peer {} sent {} while blocks were outstanding", peer, other.name());
                    return Err(TorrentError::unexpected_message_from(
                        format!("expected Piece, received {}", other.name()),
                        peer,
                    ));
                }
            }
        }

        if self.verify {
            let expected = info.piece_hash(index).ok_or_else(|| {
                TorrentError::invalid_torrent_field(format!("no hash for piece {}", index), "info.pieces")
            })?;
            buffer.verify(expected)?;
        } else {
            debug!("Skipping hash verification of piece {}", index);
        }

        let data = buffer.into_bytes()?;
        info!("Piece {} complete", index);
        Ok(data)
    }

    /// Download every piece in order and return the whole file
    pub async fn fetch_file<S>(&self, session: &mut PeerSession<S>, info: &TorrentInfo) -> Result<Vec<u8>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let piece_count = info.piece_count() as u32;
        info!(
            "Downloading {} ({} bytes, {} pieces) from {}",
            info.name,
            info.total_length,
            piece_count,
            session.remote()
        );

        let mut file = Vec::with_capacity(info.total_length as usize);
        for index in 0..piece_count {
            let piece = self.fetch_piece(session, info, index).await?;
            file.extend_from_slice(&piece);
            debug!("Downloaded {}/{} pieces ({} bytes)", index + 1, piece_count, file.len());
        }

        if file.len() as u64 != info.total_length {
            return Err(TorrentError::short_read_from(
                format!("assembled {} bytes, expected {}", file.len(), info.total_length),
                session.remote().to_string(),
            ));
        }
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::connection::tests::{connected_session, recv, send};
    use crate::protocol::{BitTorrentWire, WireProtocol};
    use sha1::{Digest, Sha1};
    use std::time::Duration;
    use tokio::io::{AsyncWriteExt, DuplexStream};

    fn sample_data(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn torrent_for(data: &[u8], piece_length: u64) -> TorrentInfo {
        let piece_hashes = data
            .chunks(piece_length as usize)
            .map(|chunk| {
                let mut hasher = Sha1::new();
                hasher.update(chunk);
                hasher.finalize().into()
            })
            .collect();
        TorrentInfo {
            announce: "http://tracker.example.com/announce".to_string(),
            announce_list: Vec::new(),
            name: "sample.bin".to_string(),
            piece_length,
            total_length: data.len() as u64,
            piece_hashes,
            info_hash: [0xab; 20],
        }
    }

    async fn unchoke(peer: &mut DuplexStream) {
        send(peer, Message::Bitfield { bitfield: vec![0xff] }).await;
        assert_eq!(recv(peer).await, Message::Interested);
        send(peer, Message::Unchoke).await;
    }

    /// Answer block requests from `data`, passing each reply through `tamper`
    async fn serve(mut peer: DuplexStream, data: Vec<u8>, piece_length: u64, tamper: fn(Message) -> Message) {
        unchoke(&mut peer).await;
        while let Ok(message) = BitTorrentWire.read_message(&mut peer).await {
            if let Message::Request { index, begin, length } = message {
                assert!(length <= 16384);
                let start = index as usize * piece_length as usize + begin as usize;
                let block = data[start..start + length as usize].to_vec();
                let reply = tamper(Message::Piece { index, begin, block });
                if peer.write_all(&reply.serialize()).await.is_err() {
                    break;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_fetch_short_last_piece() {
        let data = sample_data(40000);
        let info = torrent_for(&data, 32768);
        let (mut session, peer) = connected_session().await;
        tokio::spawn(serve(peer, data.clone(), 32768, |m| m));

        let piece = PieceDownloader::default().fetch_piece(&mut session, &info, 1).await.unwrap();
        assert_eq!(piece.len(), 7232);
        assert_eq!(piece, data[32768..]);
    }

    #[tokio::test]
    async fn test_fetch_file_in_order() {
        let data = sample_data(70000);
        let info = torrent_for(&data, 32768);
        assert_eq!(info.piece_count(), 3);
        let (mut session, peer) = connected_session().await;
        tokio::spawn(serve(peer, data.clone(), 32768, |m| m));

        let file = PieceDownloader::default().fetch_file(&mut session, &info).await.unwrap();
        assert_eq!(file, data);
    }

    #[tokio::test]
    async fn test_pipelined_replies_out_of_order() {
        let data = sample_data(40000);
        let info = torrent_for(&data, 65536);
        let (mut session, mut peer) = connected_session().await;
        let server = tokio::spawn(async move {
            unchoke(&mut peer).await;
            let mut requests = Vec::new();
            for _ in 0..3 {
                match recv(&mut peer).await {
                    Message::Request { index, begin, length } => requests.push((index, begin, length)),
                    other => panic!("unexpected {:?}", other),
                }
            }
            for (index, begin, length) in requests.into_iter().rev() {
                let start = begin as usize;
                let block = data[start..start + length as usize].to_vec();
                send(&mut peer, Message::Piece { index, begin, block }).await;
            }
            (peer, data)
        });

        let piece = PieceDownloader::new(true, 4).fetch_piece(&mut session, &info, 0).await.unwrap();
        let (_peer, data) = server.await.unwrap();
        assert_eq!(piece, data);
    }

    #[tokio::test]
    async fn test_default_keeps_one_request_in_flight() {
        let data = sample_data(40000);
        let info = torrent_for(&data, 65536);
        let (mut session, mut peer) = connected_session().await;
        let server = tokio::spawn(async move {
            unchoke(&mut peer).await;
            let mut offsets = Vec::new();
            for _ in 0..3 {
                let Message::Request { index, begin, length } = recv(&mut peer).await else {
                    panic!("expected a Request");
                };
                // Nothing else may arrive until this block is answered
                let early = tokio::time::timeout(Duration::from_millis(100), recv(&mut peer)).await;
                assert!(early.is_err(), "second request sent before the first block arrived");

                offsets.push(begin);
                let start = begin as usize;
                let block = data[start..start + length as usize].to_vec();
                send(&mut peer, Message::Piece { index, begin, block }).await;
            }
            (peer, offsets)
        });

        let piece = PieceDownloader::default().fetch_piece(&mut session, &info, 0).await.unwrap();
        let (_peer, offsets) = server.await.unwrap();
        assert_eq!(offsets, vec![0, 16384, 32768]);
        assert_eq!(piece.len(), 40000);
    }

    #[tokio::test]
    async fn test_index_mismatch() {
        let data = sample_data(40000);
        let info = torrent_for(&data, 16384);
        let (mut session, peer) = connected_session().await;
        tokio::spawn(serve(peer, data, 16384, |m| match m {
            Message::Piece { index, begin, block } => Message::Piece { index: index + 1, begin, block },
            other => other,
        }));

        let err = PieceDownloader::default().fetch_piece(&mut session, &info, 0).await.unwrap_err();
        assert!(matches!(err, TorrentError::IndexMismatch { expected: 0, received: 1 }));
        assert!(err.is_peer_error());
    }

    #[tokio::test]
    async fn test_non_piece_reply_is_unexpected() {
        let data = sample_data(20000);
        let info = torrent_for(&data, 32768);
        let (mut session, peer) = connected_session().await;
        tokio::spawn(serve(peer, data, 32768, |_| Message::Have { piece_index: 0 }));

        let result = PieceDownloader::default().fetch_piece(&mut session, &info, 0).await;
        assert!(matches!(result, Err(TorrentError::UnexpectedMessage { .. })));
    }

    #[tokio::test]
    async fn test_connection_closed_mid_piece() {
        let data = sample_data(20000);
        let info = torrent_for(&data, 32768);
        let (mut session, mut peer) = connected_session().await;
        tokio::spawn(async move {
            unchoke(&mut peer).await;
            let _ = recv(&mut peer).await;
            // dropped without answering
        });

        let result = PieceDownloader::default().fetch_piece(&mut session, &info, 0).await;
        assert!(matches!(result, Err(TorrentError::ShortRead { .. })));
    }

    #[tokio::test]
    async fn test_hash_mismatch() {
        let data = sample_data(20000);
        let info = torrent_for(&data, 32768);
        let (mut session, peer) = connected_session().await;
        let corrupt = |m: Message| match m {
            Message::Piece { index, begin, mut block } => {
                block[0] ^= 0xff;
                Message::Piece { index, begin, block }
            }
            other => other,
        };
        tokio::spawn(serve(peer, data, 32768, corrupt));

        let err = PieceDownloader::default().fetch_piece(&mut session, &info, 0).await.unwrap_err();
        assert!(matches!(err, TorrentError::PieceHashMismatch { index: 0, .. }));
    }

    #[tokio::test]
    async fn test_no_verify_accepts_corrupt_piece() {
        let data = sample_data(100);
        let info = torrent_for(&data, 32768);
        let (mut session, peer) = connected_session().await;
        let corrupt = |m: Message| match m {
            Message::Piece { index, begin, mut block } => {
                block[0] ^= 0xff;
                Message::Piece { index, begin, block }
            }
            other => other,
        };
        tokio::spawn(serve(peer, data.clone(), 32768, corrupt));

        let piece = PieceDownloader::new(false, 1).fetch_piece(&mut session, &info, 0).await.unwrap();
        assert_eq!(piece.len(), 100);
        assert_ne!(piece, data);
        assert_eq!(piece[1..], data[1..]);
    }

    #[tokio::test]
    async fn test_choke_instead_of_bitfield() {
        let data = sample_data(100);
        let info = torrent_for(&data, 32768);
        let (mut session, mut peer) = connected_session().await;
        send(&mut peer, Message::Choke).await;

        let result = PieceDownloader::default().fetch_piece(&mut session, &info, 0).await;
        assert!(matches!(result, Err(TorrentError::UnexpectedMessage { .. })));
    }

    #[tokio::test]
    async fn test_piece_index_out_of_range() {
        let data = sample_data(100);
        let info = torrent_for(&data, 32768);
        let (mut session, _peer) = connected_session().await;

        let result = PieceDownloader::default().fetch_piece(&mut session, &info, 1).await;
        assert!(matches!(result, Err(TorrentError::ConfigError { .. })));
    }

    #[test]
    fn test_zero_pipeline_is_sequential() {
        assert_eq!(PieceDownloader::new(true, 0).pipeline(), 1);
        assert!(PieceDownloader::default().verify());
    }
}
