//! Length-delimited framed implementation of the transport seams.
//!
//! Frames are `tokio_util`'s length-delimited format (4-byte big-endian
//! prefix). The first payload byte carries the message kind and a final
//! flag; the remainder is the message payload. This is the host framing
//! the relay server speaks once a connection has been upgraded.
//!
//! The reader can be given a receive window: a frame larger than the
//! window is delivered as successive receive units, final-flagged only on
//! the last, the way a transport drains a large message through a
//! fixed-size buffer.

use std::io;

use bytes::{BufMut, Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use super::{Connection, Message, MessageKind, MessageReader, MessageWriter};

/// Kind nibble for binary messages.
const KIND_BINARY: u8 = 0x1;
/// Kind nibble for close messages.
const KIND_CLOSE: u8 = 0x8;
/// Flag bit marking the final fragment of a payload.
const FLAG_FINAL: u8 = 0x80;

/// Compute the frame-length ceiling for a configured relay buffer size.
///
/// The transport limit sits well above the relay's maximum payload so an
/// oversize message still arrives intact and the engine can answer it
/// with a proper close handshake instead of a framing error.
#[must_use]
pub fn frame_limit_for(buffer_size: usize) -> usize {
    buffer_size.saturating_mul(2).max(1024).saturating_add(1)
}

/// Message connection over any async byte stream.
#[derive(Debug)]
pub struct FramedConnection<S> {
    stream: S,
    frame_limit: usize,
    receive_window: usize,
}

impl<S> FramedConnection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wrap `stream`, accepting frames up to `frame_limit` bytes.
    ///
    /// The receive window defaults to the frame limit, so whole frames
    /// are delivered as single messages.
    #[must_use]
    pub fn new(stream: S, frame_limit: usize) -> Self {
        Self {
            stream,
            frame_limit,
            receive_window: frame_limit,
        }
    }

    /// Deliver binary payloads in receive units of at most `window` bytes.
    ///
    /// A frame larger than the window arrives as successive messages
    /// with the completeness flag clear on all but the last — the model
    /// of a receiver draining a large message through a fixed buffer.
    #[must_use]
    pub fn with_receive_window(mut self, window: usize) -> Self {
        self.receive_window = window.max(1);
        self
    }

    fn codec(&self) -> LengthDelimitedCodec {
        LengthDelimitedCodec::builder()
            .max_frame_length(self.frame_limit)
            .new_codec()
    }
}

impl<S> Connection for FramedConnection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    type Reader = FramedReader<S>;
    type Writer = FramedWriter<S>;

    fn split(self) -> (Self::Reader, Self::Writer) {
        let codec = self.codec();
        let (read, write) = tokio::io::split(self.stream);
        (
            FramedReader {
                inner: FramedRead::new(read, codec.clone()),
                receive_window: self.receive_window,
                pending: None,
            },
            FramedWriter {
                inner: FramedWrite::new(write, codec),
            },
        )
    }
}

/// Reading half of a [`FramedConnection`].
pub struct FramedReader<S> {
    inner: FramedRead<ReadHalf<S>, LengthDelimitedCodec>,
    receive_window: usize,
    /// Remainder of a frame being delivered window by window, with the
    /// frame's own completeness flag.
    pending: Option<(Bytes, bool)>,
}

impl<S> FramedReader<S> {
    fn next_window(&mut self, mut payload: Bytes, frame_final: bool) -> Message {
        if payload.len() <= self.receive_window {
            return Message {
                kind: MessageKind::Binary,
                payload,
                is_final: frame_final,
            };
        }
        let unit = payload.split_to(self.receive_window);
        self.pending = Some((payload, frame_final));
        Message::binary_partial(unit)
    }
}

#[async_trait::async_trait]
impl<S> MessageReader for FramedReader<S>
where
    S: AsyncRead + Send,
{
    async fn recv(&mut self) -> io::Result<Message> {
        if let Some((payload, frame_final)) = self.pending.take() {
            return Ok(self.next_window(payload, frame_final));
        }
        let frame = self
            .inner
            .next()
            .await
            .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))??
            .freeze();
        let message = decode_frame(&frame)?;
        match message.kind {
            MessageKind::Close => Ok(message),
            MessageKind::Binary => Ok(self.next_window(message.payload, message.is_final)),
        }
    }
}

/// Writing half of a [`FramedConnection`].
pub struct FramedWriter<S> {
    inner: FramedWrite<WriteHalf<S>, LengthDelimitedCodec>,
}

#[async_trait::async_trait]
impl<S> MessageWriter for FramedWriter<S>
where
    S: AsyncWrite + Send,
{
    async fn send(&mut self, message: Message) -> io::Result<()> {
        self.inner.send(encode_frame(&message)).await
    }
}

fn encode_frame(message: &Message) -> Bytes {
    let kind = match message.kind {
        MessageKind::Binary => KIND_BINARY,
        MessageKind::Close => KIND_CLOSE,
    };
    let flags = if message.is_final { FLAG_FINAL } else { 0 };
    let mut buf = BytesMut::with_capacity(1 + message.payload.len());
    buf.put_u8(kind | flags);
    buf.put_slice(&message.payload);
    buf.freeze()
}

fn decode_frame(frame: &Bytes) -> io::Result<Message> {
    let Some(&header) = frame.first() else {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "empty frame"));
    };
    let kind = match header & 0x0f {
        KIND_BINARY => MessageKind::Binary,
        KIND_CLOSE => MessageKind::Close,
        other => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown message kind {other:#x}"),
            ));
        }
    };
    Ok(Message {
        kind,
        payload: frame.slice(1..),
        is_final: header & FLAG_FINAL != 0,
    })
}
