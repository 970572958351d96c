//! BitTorrent protocol messages
//!
//! Defines the message types a minimal downloading client exchanges with a
//! peer. A frame on the wire is `u32_be(length) || u8(id) || payload`, where
//! `length` counts the id byte; a zero length is a keep-alive with no id.

use bytes::{Buf, BufMut, BytesMut};
use tracing::{debug, error, trace};

use crate::error::{Result, TorrentError};

/// BitTorrent message IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
}

impl TryFrom<u8> for MessageId {
    type Error = TorrentError;

    fn try_from(value: u8) -> Result<Self> {
        trace!("Converting byte to MessageId: {}", value);
        match value {
            0 => Ok(MessageId::Choke),
            1 => Ok(MessageId::Unchoke),
            2 => Ok(MessageId::Interested),
            3 => Ok(MessageId::NotInterested),
            4 => Ok(MessageId::Have),
            5 => Ok(MessageId::Bitfield),
            6 => Ok(MessageId::Request),
            7 => Ok(MessageId::Piece),
            8 => Ok(MessageId::Cancel),
            _ => {
                error!("Invalid message ID: {}", value);
                Err(TorrentError::unexpected_message(format!("unknown message id {}", value)))
            }
        }
    }
}

/// BitTorrent protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have { piece_index: u32 },
    Bitfield { bitfield: Vec<u8> },
    Request { index: u32, begin: u32, length: u32 },
    Piece { index: u32, begin: u32, block: Vec<u8> },
    Cancel { index: u32, begin: u32, length: u32 },
}

impl Message {
    /// Get the message ID (returns None for KeepAlive)
    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            Message::Choke => Some(MessageId::Choke),
            Message::Unchoke => Some(MessageId::Unchoke),
            Message::Interested => Some(MessageId::Interested),
            Message::NotInterested => Some(MessageId::NotInterested),
            Message::Have { .. } => Some(MessageId::Have),
            Message::Bitfield { .. } => Some(MessageId::Bitfield),
            Message::Request { .. } => Some(MessageId::Request),
            Message::Piece { .. } => Some(MessageId::Piece),
            Message::Cancel { .. } => Some(MessageId::Cancel),
            Message::KeepAlive => None,
        }
    }

    /// Short name for logs and error messages
    pub fn name(&self) -> String {
        match self.message_id() {
            Some(id) => format!("{:?}", id),
            None => "KeepAlive".to_string(),
        }
    }

    /// Get the message length (excluding the length prefix)
    pub fn length(&self) -> u32 {
        match self {
            Message::KeepAlive => 0,
            Message::Choke | Message::Unchoke | Message::Interested | Message::NotInterested => 1,
            Message::Have { .. } => 5,
            Message::Bitfield { bitfield } => 1 + bitfield.len() as u32,
            Message::Request { .. } | Message::Cancel { .. } => 13,
            Message::Piece { block, .. } => 9 + block.len() as u32,
        }
    }

    /// Payload bytes following the id byte
    pub fn payload(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        match self {
            Message::KeepAlive
            | Message::Choke
            | Message::Unchoke
            | Message::Interested
            | Message::NotInterested => {}
            Message::Have { piece_index } => buf.put_u32(*piece_index),
            Message::Bitfield { bitfield } => buf.put_slice(bitfield),
            Message::Request { index, begin, length } | Message::Cancel { index, begin, length } => {
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_u32(*length);
            }
            Message::Piece { index, begin, block } => {
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_slice(block);
            }
        }
        buf.to_vec()
    }

    /// Serialize the message to bytes (including length prefix)
    pub fn serialize(&self) -> Vec<u8> {
        trace!("Serializing message: {}", self.name());
        let mut buf = BytesMut::with_capacity(4 + self.length() as usize);
        buf.put_u32(self.length());
        if let Some(id) = self.message_id() {
            buf.put_u8(id as u8);
            buf.put_slice(&self.payload());
        }
        buf.to_vec()
    }

    /// Build a message from its id byte and payload
    pub fn from_parts(id: u8, payload: &[u8]) -> Result<Self> {
        let message_id = MessageId::try_from(id)?;
        let mut buf = payload;

        let expect_len = |wanted: usize| -> Result<()> {
            if payload.len() != wanted {
                error!("{:?} payload has {} bytes, expected {}", message_id, payload.len(), wanted);
                return Err(TorrentError::unexpected_message(format!(
                    "{:?} payload has {} bytes, expected {}",
                    message_id,
                    payload.len(),
                    wanted
                )));
            }
            Ok(())
        };

        let message = match message_id {
            MessageId::Choke => {
                expect_len(0)?;
                Message::Choke
            }
            MessageId::Unchoke => {
                expect_len(0)?;
                Message::Unchoke
            }
            MessageId::Interested => {
                expect_len(0)?;
                Message::Interested
            }
            MessageId::NotInterested => {
                expect_len(0)?;
                Message::NotInterested
            }
            MessageId::Have => {
                expect_len(4)?;
                Message::Have { piece_index: buf.get_u32() }
            }
            MessageId::Bitfield => Message::Bitfield { bitfield: payload.to_vec() },
            MessageId::Request => {
                expect_len(12)?;
                Message::Request { index: buf.get_u32(), begin: buf.get_u32(), length: buf.get_u32() }
            }
            MessageId::Piece => {
                if payload.len() < 8 {
                    error!("Piece message too short: expected at least 8 bytes, got {}", payload.len());
                    return Err(TorrentError::unexpected_message(format!(
                        "Piece payload has {} bytes, expected at least 8",
                        payload.len()
                    )));
                }
                let index = buf.get_u32();
                let begin = buf.get_u32();
                Message::Piece { index, begin, block: buf.to_vec() }
            }
            MessageId::Cancel => {
                expect_len(12)?;
                Message::Cancel { index: buf.get_u32(), begin: buf.get_u32(), length: buf.get_u32() }
            }
        };

        debug!("Parsed {} message ({} payload bytes)", message.name(), payload.len());
        Ok(message)
    }
}
