//! End-to-end tests for the direct relay mode.

use tokio::io::DuplexStream;
use tokio::task::JoinHandle;
use tokio::time::{Duration, timeout};
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;
use weir::{
    RelayConfig, RelayCounters, RelayError, RelayMode,
    transport::{CloseCode, framed::FramedConnection},
};
use weir_testing::{TestClient, memory_pair};

fn direct_config(buffer_size: usize) -> RelayConfig {
    RelayConfig {
        mode: RelayMode::Direct,
        buffer_size,
        report_every: 0,
        ..RelayConfig::default()
    }
}

fn spawn_direct(
    conn: FramedConnection<DuplexStream>,
    shutdown: CancellationToken,
    config: RelayConfig,
) -> JoinHandle<Result<(), RelayError>> {
    tokio::spawn(async move {
        let mut counters = RelayCounters::new(config.report_every);
        weir::run_direct(conn, shutdown, &config, &mut counters).await
    })
}

#[tokio::test]
async fn echoes_each_message_verbatim() {
    let (server, client) = memory_pair(64);
    let engine = spawn_direct(server, CancellationToken::new(), direct_config(64));
    let mut client = TestClient::new(client);

    for payload in [&b"one"[..], &b"two"[..], &b"three"[..]] {
        client.send_binary(payload).await;
        assert_eq!(&client.recv_binary().await[..], payload);
    }

    client.send_close().await;
    let close = client.recv_close().await;
    assert_eq!(close.code, CloseCode::Normal);
    engine.await.unwrap().unwrap();
}

#[tokio::test]
async fn oversize_message_closes_without_echo() {
    // Maximum size 10, client sends an 11-byte message: the server must
    // answer with a "too big" close and echo nothing.
    let (server, client) = memory_pair(10);
    let engine = spawn_direct(server, CancellationToken::new(), direct_config(10));
    let mut client = TestClient::new(client);

    client.send_binary(&[0u8; 11]).await;
    let close = client.recv_close().await;
    assert_eq!(close.code, CloseCode::MessageTooBig);
    assert_eq!(close.reason, "message too big");
    engine.await.unwrap().unwrap();
}

#[tokio::test]
async fn boundary_size_message_still_echoes() {
    let (server, client) = memory_pair(10);
    let engine = spawn_direct(server, CancellationToken::new(), direct_config(10));
    let mut client = TestClient::new(client);

    client.send_binary(&[7u8; 10]).await;
    assert_eq!(&client.recv_binary().await[..], &[7u8; 10]);

    client.send_close().await;
    client.recv_close().await;
    engine.await.unwrap().unwrap();
}

#[tokio::test]
async fn close_request_ends_the_session() {
    let (server, client) = memory_pair(64);
    let engine = spawn_direct(server, CancellationToken::new(), direct_config(64));
    let mut client = TestClient::new(client);

    client.send_close().await;
    let close = client.recv_close().await;
    assert_eq!(close.code, CloseCode::Normal);
    timeout(Duration::from_secs(1), engine)
        .await
        .expect("engine must terminate after a close request")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn cancellation_unwinds_the_loop() {
    let (server, client) = memory_pair(64);
    let shutdown = CancellationToken::new();
    let engine = spawn_direct(server, shutdown.clone(), direct_config(64));
    let _client = TestClient::new(client);

    shutdown.cancel();
    timeout(Duration::from_secs(1), engine)
        .await
        .expect("engine must observe cancellation")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn peer_disconnect_is_suppressed() {
    let (server, client) = memory_pair(64);
    let engine = spawn_direct(server, CancellationToken::new(), direct_config(64));
    drop(client);

    // A vanished peer is teardown noise, not a session error.
    timeout(Duration::from_secs(1), engine)
        .await
        .expect("engine must terminate on peer disconnect")
        .unwrap()
        .unwrap();
}

#[traced_test]
#[tokio::test]
async fn malformed_record_is_logged_but_still_echoed() {
    let mut config = direct_config(64);
    config.decode_records = true;
    let (server, client) = memory_pair(64);
    let engine = spawn_direct(server, CancellationToken::new(), config);
    let mut client = TestClient::new(client);

    // 0x80 opens a varint key that never terminates.
    client.send_binary(&[0x80]).await;
    assert_eq!(&client.recv_binary().await[..], &[0x80]);
    assert!(logs_contain("record decode failed"));

    client.send_close().await;
    client.recv_close().await;
    engine.await.unwrap().unwrap();
}

#[traced_test]
#[tokio::test]
async fn valid_record_decodes_quietly() {
    let mut config = direct_config(64);
    config.decode_records = true;
    let (server, client) = memory_pair(64);
    let engine = spawn_direct(server, CancellationToken::new(), config);
    let mut client = TestClient::new(client);

    // Field 1, length-delimited, 4-byte name.
    client.send_binary(b"\x0a\x04echo").await;
    assert_eq!(&client.recv_binary().await[..], b"\x0a\x04echo");
    assert!(!logs_contain("record decode failed"));

    client.send_close().await;
    client.recv_close().await;
    engine.await.unwrap().unwrap();
}
