//! Peer session module
//!
//! Owns the byte stream to a single peer and walks it through the
//! handshake, bitfield, interested and unchoke steps before block requests.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::error::{Result, TorrentError};
use crate::peer::state::{bitfield_has_piece, PeerAddress, SessionState};
use crate::protocol::{BitTorrentWire, Handshake, Message, MessageId, WireProtocol};

/// Connect and read deadlines for one peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimeouts {
    pub connect: Duration,
    pub read: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            read: Duration::from_secs(30),
        }
    }
}

/// A handshaken connection to one peer
pub struct PeerSession<S = TcpStream> {
    remote: PeerAddress,
    peer_id: [u8; 20],
    stream: S,
    wire: BitTorrentWire,
    state: SessionState,
    bitfield: Vec<u8>,
    last_message: Option<MessageId>,
    read_timeout: Duration,
}

impl PeerSession<TcpStream> {
    /// Open a TCP connection to `remote` and perform the handshake
    pub async fn connect(
        remote: PeerAddress,
        info_hash: [u8; 20],
        local_peer_id: [u8; 20],
        timeouts: SessionTimeouts,
    ) -> Result<Self> {
        info!("Connecting to peer: {}", remote);

        let stream = timeout(timeouts.connect, TcpStream::connect(remote.socket_addr()))
            .await
            .map_err(|_| {
                warn!("Connection timeout to {}", remote);
                TorrentError::peer_timeout("connect timed out", remote.to_string())
            })?
            .map_err(|e| {
                error!("Failed to connect to {}: {}", remote, e);
                TorrentError::transport_error_full("failed to connect", remote.to_string(), e.to_string())
            })?;

        debug!("TCP connection established with {}", remote);
        Self::handshake(stream, remote, info_hash, local_peer_id, timeouts.read).await
    }
}

impl<S> PeerSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Exchange handshakes over an open stream.
    ///
    /// On failure the stream is dropped, which releases the connection.
    pub async fn handshake(
        mut stream: S,
        remote: PeerAddress,
        info_hash: [u8; 20],
        local_peer_id: [u8; 20],
        read_timeout: Duration,
    ) -> Result<Self> {
        info!("Performing handshake with peer: {}", remote);
        let mut wire = BitTorrentWire;

        let ours = Handshake::new(info_hash, local_peer_id);
        timeout(read_timeout, wire.write_handshake(&mut stream, &ours))
            .await
            .map_err(|_| TorrentError::handshake_failed_full("not sent", remote.to_string(), "write timed out"))?
            .map_err(|e| e.with_peer(remote.to_string()))?;

        let theirs = timeout(read_timeout, wire.read_handshake(&mut stream))
            .await
            .map_err(|_| TorrentError::handshake_failed_full("no reply", remote.to_string(), "read timed out"))?
            .map_err(|e| e.with_peer(remote.to_string()))?;

        theirs
            .validate(&info_hash)
            .map_err(|e| e.with_peer(remote.to_string()))?;

        info!("Handshake completed with {} (peer id {})", remote, hex::encode(theirs.peer_id));
        Ok(Self {
            remote,
            peer_id: theirs.peer_id,
            stream,
            wire,
            state: SessionState::Connected,
            bitfield: Vec::new(),
            last_message: None,
            read_timeout,
        })
    }

    /// Send a message to the peer, returning the number of bytes written
    pub async fn send_message(&mut self, message: &Message) -> Result<usize> {
        if self.state == SessionState::Disconnected {
            return Err(TorrentError::transport_error_full(
                "cannot send on a closed session",
                self.remote.to_string(),
                message.name(),
            ));
        }

        debug!("Sending {} message to peer: {}", message.name(), self.remote);
        self.wire
            .write_message(&mut self.stream, message)
            .await
            .map_err(|e| e.with_peer(self.remote.to_string()))
    }

    /// Receive the next message, including keep-alives
    pub async fn receive_message(&mut self) -> Result<Message> {
        let deadline = Instant::now() + self.read_timeout;
        self.receive_before(deadline).await
    }

    /// Receive the next message that is not a keep-alive.
    ///
    /// Keep-alives do not extend the read timeout.
    pub async fn receive_typed_message(&mut self) -> Result<Message> {
        let deadline = Instant::now() + self.read_timeout;
        loop {
            match self.receive_before(deadline).await? {
                Message::KeepAlive => trace!("Skipping keep-alive from {}", self.remote),
                message => return Ok(message),
            }
        }
    }

    async fn receive_before(&mut self, deadline: Instant) -> Result<Message> {
        let message = match timeout_at(deadline, self.wire.read_message(&mut self.stream)).await {
            Ok(result) => result.map_err(|e| e.with_peer(self.remote.to_string()))?,
            Err(_) => {
                warn!("Receive message timeout from peer: {}", self.remote);
                return Err(TorrentError::peer_timeout("receive timed out", self.remote.to_string()));
            }
        };

        if let Some(id) = message.message_id() {
            self.last_message = Some(id);
        }
        trace!("Received {} message from peer: {}", message.name(), self.remote);
        Ok(message)
    }

    /// Expect the peer's bitfield as its first message
    pub async fn await_bitfield(&mut self) -> Result<()> {
        self.expect_state(SessionState::Connected, "await bitfield")?;

        match self.receive_typed_message().await? {
            Message::Bitfield { bitfield } => {
                debug!("Peer {} sent a {} byte bitfield", self.remote, bitfield.len());
                self.bitfield = bitfield;
                self.state = SessionState::BitfieldReceived;
                Ok(())
            }
            other => Err(self.protocol_violation("Bitfield", &other)),
        }
    }

    /// Tell the peer we want to download
    pub async fn send_interested(&mut self) -> Result<()> {
        self.expect_state(SessionState::BitfieldReceived, "send interested")?;
        self.send_message(&Message::Interested).await?;
        self.state = SessionState::Interested;
        Ok(())
    }

    /// Expect the peer to unchoke us after we declared interest
    pub async fn await_unchoke(&mut self) -> Result<()> {
        self.expect_state(SessionState::Interested, "await unchoke")?;

        match self.receive_typed_message().await? {
            Message::Unchoke => {
                debug!("Peer {} unchoked us", self.remote);
                self.state = SessionState::Unchoked;
                Ok(())
            }
            other => Err(self.protocol_violation("Unchoke", &other)),
        }
    }

    /// Run the bitfield, interested and unchoke steps.
    ///
    /// Does nothing if the session is already past them.
    pub async fn prepare_download(&mut self) -> Result<()> {
        if self.state.can_request() {
            return Ok(());
        }
        self.await_bitfield().await?;
        self.send_interested().await?;
        self.await_unchoke().await?;
        info!("Peer {} is ready to serve requests", self.remote);
        Ok(())
    }

    /// Request one block of a piece
    pub async fn request_block(&mut self, index: u32, begin: u32, length: u32) -> Result<()> {
        if !self.state.can_request() {
            return Err(TorrentError::unexpected_message_from(
                format!("cannot request blocks in state {:?}", self.state),
                self.remote.to_string(),
            ));
        }

        trace!("Requesting piece {} block {} ({} bytes) from {}", index, begin, length, self.remote);
        self.send_message(&Message::Request { index, begin, length }).await?;
        self.state = SessionState::Active;
        Ok(())
    }

    /// Close the connection
    pub async fn close(mut self) -> Result<()> {
        info!("Closing connection to peer: {}", self.remote);
        self.state = SessionState::Disconnected;
        if let Err(e) = self.stream.shutdown().await {
            // The stream is dropped regardless, so the socket is released
            debug!("Shutdown of {} reported: {}", self.remote, e);
        }
        Ok(())
    }

    /// Whether the peer's bitfield advertises a piece
    pub fn has_piece(&self, piece_index: u32) -> bool {
        bitfield_has_piece(&self.bitfield, piece_index as usize)
    }

    pub fn remote(&self) -> PeerAddress {
        self.remote
    }

    /// Peer ID learned from the handshake reply
    pub fn peer_id(&self) -> [u8; 20] {
        self.peer_id
    }

    pub fn peer_id_hex(&self) -> String {
        hex::encode(self.peer_id)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Type of the last typed message read from the peer
    pub fn last_message(&self) -> Option<MessageId> {
        self.last_message
    }

    fn expect_state(&self, wanted: SessionState, action: &str) -> Result<()> {
        if self.state != wanted {
            return Err(TorrentError::unexpected_message_from(
                format!("cannot {} in state {:?}", action, self.state),
                self.remote.to_string(),
            ));
        }
        Ok(())
    }

    fn protocol_violation(&self, expected: &str, received: &Message) -> TorrentError {
        error!(
            "Peer {} sent {} while we expected {} (state {:?})",
            self.remote,
            received.name(),
            expected,
            self.state
        );
        TorrentError::unexpected_message_from(
            format!("expected {}, received {}", expected, received.name()),
            self.remote.to_string(),
        )
    }
}
