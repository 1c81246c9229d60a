//! Message model and connection seams for full-duplex transports.
//!
//! The relay engine never touches a socket directly. It is handed a
//! [`Connection`], splits it into an exclusively-owned reader and writer
//! pair, and speaks in [`Message`] units. Any transport able to deliver
//! discrete binary and close messages can implement these traits; the
//! built-in [`framed`] implementation runs over any async byte stream.

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};

pub mod framed;

/// Kind of a transport message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// Opaque payload bytes to relay.
    Binary,
    /// A close request carrying an encoded [`CloseReason`].
    Close,
}

/// One receive/send unit at the transport's message boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Message kind.
    pub kind: MessageKind,
    /// Payload bytes (for close messages, the encoded reason).
    pub payload: Bytes,
    /// Whether this is the final part of a transport-fragmented payload.
    pub is_final: bool,
}

impl Message {
    /// A complete binary message.
    #[must_use]
    pub fn binary(payload: Bytes) -> Self {
        Self {
            kind: MessageKind::Binary,
            payload,
            is_final: true,
        }
    }

    /// A binary message flagged as an incomplete fragment.
    #[must_use]
    pub fn binary_partial(payload: Bytes) -> Self {
        Self {
            kind: MessageKind::Binary,
            payload,
            is_final: false,
        }
    }

    /// A close message carrying `reason`.
    #[must_use]
    pub fn close(reason: &CloseReason) -> Self {
        Self {
            kind: MessageKind::Close,
            payload: reason.encode(),
            is_final: true,
        }
    }

    /// Whether this message is a close request.
    #[must_use]
    pub fn is_close(&self) -> bool { self.kind == MessageKind::Close }
}

/// Close status codes used by the relay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseCode {
    /// Orderly end of the session.
    Normal,
    /// A payload exceeded the configured maximum.
    MessageTooBig,
    /// The session ended on an internal fault.
    Internal,
}

impl CloseCode {
    /// Numeric status carried on the wire.
    #[must_use]
    pub fn as_u16(self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::MessageTooBig => 1009,
            Self::Internal => 1011,
        }
    }

    /// Map a wire status back to a code, if recognized.
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1000 => Some(Self::Normal),
            1009 => Some(Self::MessageTooBig),
            1011 => Some(Self::Internal),
            _ => None,
        }
    }
}

/// Status code plus human-readable reason sent in a close handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseReason {
    /// Close status code.
    pub code: CloseCode,
    /// Human-readable explanation.
    pub reason: String,
}

impl CloseReason {
    /// An orderly close with an empty reason.
    #[must_use]
    pub fn normal() -> Self {
        Self {
            code: CloseCode::Normal,
            reason: String::new(),
        }
    }

    /// An oversize-payload close with the configured reason string.
    #[must_use]
    pub fn too_big(reason: &str) -> Self {
        Self {
            code: CloseCode::MessageTooBig,
            reason: reason.to_owned(),
        }
    }

    /// Encode as a close payload: status code followed by UTF-8 reason.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(2 + self.reason.len());
        buf.put_u16(self.code.as_u16());
        buf.put_slice(self.reason.as_bytes());
        buf.freeze()
    }

    /// Decode a close payload produced by [`encode`](Self::encode).
    ///
    /// Returns `None` when the payload is too short, the status is
    /// unrecognized, or the reason is not UTF-8.
    #[must_use]
    pub fn decode(mut payload: Bytes) -> Option<Self> {
        if payload.len() < 2 {
            return None;
        }
        let code = CloseCode::from_u16(payload.get_u16())?;
        let reason = String::from_utf8(payload.to_vec()).ok()?;
        Some(Self { code, reason })
    }
}

/// Receiving side of a full-duplex message connection.
#[async_trait]
pub trait MessageReader: Send {
    /// Receive the next message.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the transport faults; an orderly stream
    /// end without a close message surfaces as `UnexpectedEof`.
    async fn recv(&mut self) -> std::io::Result<Message>;
}

/// Sending side of a full-duplex message connection.
#[async_trait]
pub trait MessageWriter: Send {
    /// Send one message.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the transport faults.
    async fn send(&mut self, message: Message) -> std::io::Result<()>;

    /// Send a close message carrying `reason`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the transport faults.
    async fn close(&mut self, reason: CloseReason) -> std::io::Result<()> {
        self.send(Message::close(&reason)).await
    }
}

/// An upgraded full-duplex message connection.
///
/// Splitting hands out exclusively-owned halves: most transports forbid
/// concurrent receives or concurrent sends from multiple callers, so the
/// type system enforces one reader and one writer per connection.
pub trait Connection: Send + 'static {
    /// Reader half type.
    type Reader: MessageReader + 'static;
    /// Writer half type.
    type Writer: MessageWriter + 'static;

    /// Split into independently-owned reader and writer halves.
    fn split(self) -> (Self::Reader, Self::Writer);
}
