//! Wire protocol utilities
//!
//! Async reading and writing of handshakes and length-prefixed frames over any
//! byte stream.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{trace, warn};

use super::handshake::HANDSHAKE_LEN;
use super::{Handshake, Message};
use crate::error::{Result, TorrentError};

/// Largest frame accepted from a peer (a 16 KiB block plus headers fits easily)
pub const MAX_FRAME_LEN: usize = 1 << 21;

/// WireProtocol trait for protocol utilities
#[allow(async_fn_in_trait)]
pub trait WireProtocol {
    /// Read a complete message from the stream
    async fn read_message<R: AsyncRead + Unpin>(&mut self, reader: &mut R) -> Result<Message>;

    /// Write a message to the stream, returning the number of bytes written
    async fn write_message<W: AsyncWrite + Unpin>(&mut self, writer: &mut W, message: &Message) -> Result<usize>;

    /// Read a handshake from the stream
    async fn read_handshake<R: AsyncRead + Unpin>(&mut self, reader: &mut R) -> Result<Handshake>;

    /// Write a handshake to the stream
    async fn write_handshake<W: AsyncWrite + Unpin>(&mut self, writer: &mut W, handshake: &Handshake) -> Result<()>;
}

/// Default implementation of WireProtocol
#[derive(Debug, Default, Clone, Copy)]
pub struct BitTorrentWire;

impl WireProtocol for BitTorrentWire {
    async fn read_message<R: AsyncRead + Unpin>(&mut self, reader: &mut R) -> Result<Message> {
        let mut length_buf = [0u8; 4];
        reader
            .read_exact(&mut length_buf)
            .await
            .map_err(|e| io_error(e, "reading frame length"))?;
        let length = u32::from_be_bytes(length_buf) as usize;

        // A zero length is a keep-alive: there is no id byte to read
        if length == 0 {
            trace!("Read keep-alive frame");
            return Ok(Message::KeepAlive);
        }

        if length > MAX_FRAME_LEN {
            warn!("Peer announced a {} byte frame", length);
            return Err(TorrentError::unexpected_message(format!(
                "frame of {} bytes exceeds limit of {}",
                length, MAX_FRAME_LEN
            )));
        }

        let mut body = vec![0u8; length];
        reader
            .read_exact(&mut body)
            .await
            .map_err(|e| io_error(e, "reading frame body"))?;
        trace!("Read frame: id={} length={}", body[0], length);

        Message::from_parts(body[0], &body[1..])
    }

    async fn write_message<W: AsyncWrite + Unpin>(&mut self, writer: &mut W, message: &Message) -> Result<usize> {
        let serialized = message.serialize();
        writer
            .write_all(&serialized)
            .await
            .map_err(|e| io_error(e, "writing frame"))?;
        writer.flush().await.map_err(|e| io_error(e, "flushing frame"))?;
        trace!("Wrote {} frame ({} bytes)", message.name(), serialized.len());
        Ok(serialized.len())
    }

    async fn read_handshake<R: AsyncRead + Unpin>(&mut self, reader: &mut R) -> Result<Handshake> {
        let mut reply = [0u8; HANDSHAKE_LEN];
        reader.read_exact(&mut reply).await.map_err(|e| {
            TorrentError::handshake_failed(format!("failed to read {} byte reply", HANDSHAKE_LEN))
                .with_context(e.to_string())
        })?;
        Handshake::deserialize(&reply)
    }

    async fn write_handshake<W: AsyncWrite + Unpin>(&mut self, writer: &mut W, handshake: &Handshake) -> Result<()> {
        let serialized = handshake.serialize();
        let send = async {
            writer.write_all(&serialized).await?;
            writer.flush().await
        };
        send.await.map_err(|e| {
            TorrentError::handshake_failed("failed to send handshake").with_context(e.to_string())
        })
    }
}

/// Map an I/O failure on a peer stream to the protocol error taxonomy
fn io_error(err: io::Error, action: &str) -> TorrentError {
    match err.kind() {
        io::ErrorKind::UnexpectedEof => {
            TorrentError::short_read(format!("connection closed while {}", action))
        }
        _ => TorrentError::transport_error(format!("I/O error while {}: {}", action, err)),
    }
}
