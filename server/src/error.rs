//! Error taxonomy. Each of these is handled where it occurs; none of them
//! is allowed to take down the tick loop.

use crate::client_manager::ConnId;
use shared::SeatId;
use thiserror::Error;

/// Bad bytes from a peer. The frame or message is dropped; only an
/// unrecoverable framing error closes the connection.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("handshake request is malformed")]
    MalformedHandshake,
    #[error("handshake request is not a websocket upgrade")]
    NotUpgrade,
    #[error("handshake request has no Sec-WebSocket-Key")]
    MissingKey,
    #[error("handshake headers exceed {0} bytes")]
    HandshakeTooLarge(usize),
    #[error("frame payload of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: u64, max: usize },
    #[error("text frame is not valid UTF-8")]
    InvalidUtf8,
    #[error("malformed message: {0}")]
    MalformedJson(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Whether the byte stream can still be trusted after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::MalformedHandshake
                | ProtocolError::NotUpgrade
                | ProtocolError::MissingKey
                | ProtocolError::HandshakeTooLarge(_)
                | ProtocolError::FrameTooLarge { .. }
        )
    }
}

/// Why a socket stopped being served.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("peer closed the connection")]
    Closed,
    #[error("handshake not completed in time")]
    HandshakeTimeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("Server is full (4/4 players). Please try again later.")]
    ServerFull,
    #[error("Nickname \"{0}\" is already taken. Please choose a different name.")]
    DuplicateNickname(String),
    #[error("connection already holds a seat")]
    AlreadyJoined,
    #[error("connection {0} is not registered")]
    UnknownConnection(ConnId),
}

/// A single player's update went wrong. The player is reset and the tick
/// carries on with everyone else.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationFault {
    #[error("player {seat} reached non-finite position ({x}, {y})")]
    NonFinitePosition { seat: SeatId, x: f32, y: f32 },
    #[error("player {seat} is outside the grid at ({x}, {y})")]
    OffGrid { seat: SeatId, x: f32, y: f32 },
}
