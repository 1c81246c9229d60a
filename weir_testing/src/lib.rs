//! In-memory transports and drive helpers for `weir` integration tests.
//!
//! Connections run over `tokio::io::duplex` streams wrapped in the framed
//! transport, so tests exercise the same wire format as the TCP server
//! without opening sockets.

use bytes::Bytes;
use tokio::io::DuplexStream;
use weir::transport::{
    CloseReason,
    Connection,
    Message,
    MessageKind,
    MessageReader,
    MessageWriter,
    framed::{FramedConnection, FramedReader, FramedWriter, frame_limit_for},
};

/// In-memory stream capacity, large enough that the duplex buffer never
/// interferes with the relay's own backpressure in tests.
const DUPLEX_CAPACITY: usize = 256 * 1024;

/// Create a connected (server, client) pair of framed connections sized
/// for `buffer_size` relay payloads.
///
/// The server side receives through a `buffer_size` window, matching how
/// the relay server configures upgraded connections; the client side
/// receives whole frames.
#[must_use]
pub fn memory_pair(
    buffer_size: usize,
) -> (
    FramedConnection<DuplexStream>,
    FramedConnection<DuplexStream>,
) {
    let (server, client) = tokio::io::duplex(DUPLEX_CAPACITY);
    let limit = frame_limit_for(buffer_size);
    (
        FramedConnection::new(server, limit).with_receive_window(buffer_size),
        FramedConnection::new(client, limit),
    )
}

/// Client half for driving a relay engine under test.
///
/// All helpers panic on transport errors: a broken in-memory stream is a
/// test bug, not a condition to handle.
pub struct TestClient {
    reader: FramedReader<DuplexStream>,
    writer: FramedWriter<DuplexStream>,
}

impl TestClient {
    /// Split `conn` into a test client.
    #[must_use]
    pub fn new(conn: FramedConnection<DuplexStream>) -> Self {
        let (reader, writer) = conn.split();
        Self { reader, writer }
    }

    /// Send one complete binary message.
    ///
    /// # Panics
    ///
    /// Panics if the transport faults.
    pub async fn send_binary(&mut self, payload: &[u8]) {
        self.writer
            .send(Message::binary(Bytes::copy_from_slice(payload)))
            .await
            .expect("send binary message");
    }

    /// Send a normal close message.
    ///
    /// # Panics
    ///
    /// Panics if the transport faults.
    pub async fn send_close(&mut self) {
        self.writer
            .close(CloseReason::normal())
            .await
            .expect("send close message");
    }

    /// Receive the next message.
    ///
    /// # Errors
    ///
    /// Propagates transport faults for tests asserting on them.
    pub async fn recv(&mut self) -> std::io::Result<Message> { self.reader.recv().await }

    /// Receive the next message, expecting binary; returns its payload.
    ///
    /// # Panics
    ///
    /// Panics if the transport faults or the message is not binary.
    pub async fn recv_binary(&mut self) -> Bytes {
        let message = self.reader.recv().await.expect("receive message");
        assert_eq!(message.kind, MessageKind::Binary, "expected binary message");
        message.payload
    }

    /// Receive the next message, expecting a close; returns its reason.
    ///
    /// # Panics
    ///
    /// Panics if the transport faults or the message is not a close.
    pub async fn recv_close(&mut self) -> CloseReason {
        let message = self.reader.recv().await.expect("receive message");
        assert!(message.is_close(), "expected close message");
        CloseReason::decode(message.payload).expect("well-formed close payload")
    }

    /// Collect binary payloads until a close arrives; returns the
    /// payloads and the close reason.
    ///
    /// # Panics
    ///
    /// Panics if the transport faults or a close payload is malformed.
    pub async fn collect_until_close(&mut self) -> (Vec<Bytes>, CloseReason) {
        let mut payloads = Vec::new();
        loop {
            let message = self.reader.recv().await.expect("receive message");
            if message.is_close() {
                let reason =
                    CloseReason::decode(message.payload).expect("well-formed close payload");
                return (payloads, reason);
            }
            payloads.push(message.payload);
        }
    }
}
