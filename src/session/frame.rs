//! Frame classification and close codes

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes};
use bytes::Bytes;

/// Close code sent when a non-binary data frame is received
pub const CLOSE_INVALID_MESSAGE_TYPE: u16 = 4400;

/// Close code sent when the gateway is at its session limit
pub const CLOSE_TOO_MANY_CONNECTIONS: u16 = 4429;

/// A received WebSocket message, classified once on arrival
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Binary payload to relay
    Binary(Bytes),
    /// Peer started the close handshake
    Close(Option<CloseFrame>),
    /// Ping or pong, answered by the WebSocket layer itself
    Control,
    /// A data frame of a kind the gateway does not accept
    Unsupported(&'static str),
}

impl From<Message> for Frame {
    fn from(message: Message) -> Self {
        match message {
            Message::Binary(payload) => Frame::Binary(payload),
            Message::Close(frame) => Frame::Close(frame),
            Message::Ping(_) | Message::Pong(_) => Frame::Control,
            Message::Text(_) => Frame::Unsupported("text"),
        }
    }
}

/// Build a close message with an application status code
pub fn close_message(code: u16, reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: Utf8Bytes::from_static(reason),
    }))
}

/// Close message refusing a connection over the session limit
pub fn too_many_connections() -> Message {
    close_message(CLOSE_TOO_MANY_CONNECTIONS, "Too many connections")
}

/// Close message answering a non-binary frame
pub fn invalid_message_type() -> Message {
    close_message(CLOSE_INVALID_MESSAGE_TYPE, "Invalid message type")
}
