//! Upgrade negotiation performed before a relay session starts.
//!
//! The engine itself only ever sees an upgraded [`Connection`]; this
//! module supplies the thin glue in front of it. A client opens the
//! exchange with a length-prefixed, bincode-encoded preamble naming its
//! subprotocol preferences in order; the server answers with the selected
//! subprotocol (or none) and both sides switch to the framed message
//! transport.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

use crate::transport::{
    Connection,
    framed::{FramedConnection, frame_limit_for},
};

/// Upper bound on the encoded preamble, mirroring the frame-limit idea:
/// a handshake should never need more.
const MAX_PREAMBLE_LEN: usize = 1024;

/// Client preamble: subprotocol names in preference order.
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct UpgradeRequest {
    /// Requested subprotocols, most preferred first.
    pub subprotocols: Vec<String>,
}

/// Server answer: the selected subprotocol, if any.
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct UpgradeResponse {
    /// Negotiated subprotocol, or `None` when nothing matched.
    pub subprotocol: Option<String>,
}

/// Pick the first requested subprotocol the server supports.
///
/// Preference order is the client's; the first mutual entry wins. A
/// non-empty request that matches nothing logs a warning and selects
/// none — the connection still proceeds without a subprotocol.
#[must_use]
pub fn select_subprotocol<'a>(requested: &'a [String], supported: &[String]) -> Option<&'a str> {
    let selected = requested
        .iter()
        .find(|candidate| supported.iter().any(|name| name == *candidate));
    if selected.is_none() && !requested.is_empty() {
        warn!(?requested, ?supported, "no mutually supported subprotocol");
    }
    selected.map(String::as_str)
}

/// Negotiates the upgrade from a raw accepted stream to a message
/// connection.
#[async_trait]
pub trait Negotiator<S>: Send + Sync
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Connection type produced by a successful upgrade.
    type Conn: Connection;

    /// Run the server side of the handshake on `stream`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the stream faults or the preamble is
    /// malformed; the caller drops the connection without starting a
    /// session.
    async fn negotiate(&self, stream: S) -> io::Result<(Self::Conn, Option<String>)>;
}

/// Built-in negotiator speaking the bincode preamble exchange.
pub struct PreambleNegotiator {
    supported: Vec<String>,
    frame_limit: usize,
    receive_window: usize,
}

impl PreambleNegotiator {
    /// Create a negotiator advertising `supported` subprotocols and
    /// producing framed connections sized for `buffer_size` payloads:
    /// the receive window matches the relay buffer, while the frame limit
    /// leaves headroom so an oversize payload still arrives for a proper
    /// close handshake.
    #[must_use]
    pub fn new(supported: Vec<String>, buffer_size: usize) -> Self {
        Self {
            supported,
            frame_limit: frame_limit_for(buffer_size),
            receive_window: buffer_size,
        }
    }
}

#[async_trait]
impl<S> Negotiator<S> for PreambleNegotiator
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    type Conn = FramedConnection<S>;

    async fn negotiate(&self, mut stream: S) -> io::Result<(Self::Conn, Option<String>)> {
        let request: UpgradeRequest = read_preamble(&mut stream).await?;
        let subprotocol = select_subprotocol(&request.subprotocols, &self.supported)
            .map(str::to_owned);
        let response = UpgradeResponse {
            subprotocol: subprotocol.clone(),
        };
        write_preamble(&mut stream, &response).await?;
        let conn =
            FramedConnection::new(stream, self.frame_limit).with_receive_window(self.receive_window);
        Ok((conn, subprotocol))
    }
}

/// Run the client side of the handshake: send preferences, read the
/// server's selection, and wrap the stream in the framed transport.
///
/// # Errors
///
/// Returns an I/O error when the stream faults or the server's answer is
/// malformed.
pub async fn request_upgrade<S>(
    mut stream: S,
    subprotocols: &[String],
    buffer_size: usize,
) -> io::Result<(FramedConnection<S>, Option<String>)>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let request = UpgradeRequest {
        subprotocols: subprotocols.to_vec(),
    };
    write_preamble(&mut stream, &request).await?;
    let response: UpgradeResponse = read_preamble(&mut stream).await?;
    let conn = FramedConnection::new(stream, frame_limit_for(buffer_size))
        .with_receive_window(buffer_size);
    Ok((conn, response.subprotocol))
}

async fn read_preamble<S, T>(stream: &mut S) -> io::Result<T>
where
    S: AsyncRead + Send + Unpin,
    T: bincode::Decode<()>,
{
    let mut len_bytes = [0u8; 2];
    stream.read_exact(&mut len_bytes).await?;
    let len = usize::from(u16::from_be_bytes(len_bytes));
    if len > MAX_PREAMBLE_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "handshake preamble too long",
        ));
    }
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    let config = bincode::config::standard()
        .with_big_endian()
        .with_fixed_int_encoding();
    let (value, consumed) = bincode::decode_from_slice(&buf, config)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;
    if consumed != len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "trailing bytes after handshake preamble",
        ));
    }
    Ok(value)
}

async fn write_preamble<S, T>(stream: &mut S, value: &T) -> io::Result<()>
where
    S: AsyncWrite + Send + Unpin,
    T: bincode::Encode,
{
    let config = bincode::config::standard()
        .with_big_endian()
        .with_fixed_int_encoding();
    let encoded = bincode::encode_to_vec(value, config)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;
    let len = u16::try_from(encoded.len()).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidData, "handshake preamble too long")
    })?;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(&encoded).await?;
    stream.flush().await
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tracing_test::traced_test;

    use super::{Negotiator, PreambleNegotiator, request_upgrade, select_subprotocol};

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    #[rstest]
    #[case(&["x", "y"], &["y", "z"], Some("y"))]
    #[case(&["y", "x"], &["x", "y"], Some("y"))]
    #[case(&["a"], &["y"], None)]
    #[case(&[], &["y"], None)]
    fn first_match_wins(
        #[case] requested: &[&str],
        #[case] supported: &[&str],
        #[case] expected: Option<&str>,
    ) {
        let requested = names(requested);
        let supported = names(supported);
        assert_eq!(select_subprotocol(&requested, &supported), expected);
    }

    #[traced_test]
    #[test]
    fn failed_negotiation_logs_a_warning() {
        let requested = names(&["a"]);
        let supported = names(&["y"]);
        assert_eq!(select_subprotocol(&requested, &supported), None);
        assert!(logs_contain("no mutually supported subprotocol"));
    }

    #[rstest]
    #[tokio::test]
    async fn preamble_exchange_agrees_on_subprotocol() {
        let (server_stream, client_stream) = tokio::io::duplex(4096);
        let negotiator = PreambleNegotiator::new(names(&["y", "z"]), 1024);

        let server = tokio::spawn(async move { negotiator.negotiate(server_stream).await });
        let (_conn, negotiated) = request_upgrade(client_stream, &names(&["x", "y"]), 1024)
            .await
            .unwrap();
        assert_eq!(negotiated.as_deref(), Some("y"));

        let (_server_conn, server_side) = server.await.unwrap().unwrap();
        assert_eq!(server_side.as_deref(), Some("y"));
    }

    #[rstest]
    #[tokio::test]
    async fn garbage_preamble_is_rejected() {
        use tokio::io::AsyncWriteExt;

        let (server_stream, mut client_stream) = tokio::io::duplex(4096);
        let negotiator = PreambleNegotiator::new(Vec::new(), 1024);

        let server = tokio::spawn(async move { negotiator.negotiate(server_stream).await });
        // Declared length far beyond the preamble bound.
        client_stream.write_all(&u16::MAX.to_be_bytes()).await.unwrap();
        let err = server.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
