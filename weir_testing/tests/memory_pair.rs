//! Sanity checks for the in-memory transport helpers.

use weir::transport::{Connection, Message, MessageReader, MessageWriter};
use weir_testing::{TestClient, memory_pair};

#[tokio::test]
async fn helpers_speak_the_framed_wire_format() {
    let (server, client) = memory_pair(1024);
    let (mut server_rx, mut server_tx) = server.split();
    let mut client = TestClient::new(client);

    client.send_binary(b"ping").await;
    let received = server_rx.recv().await.unwrap();
    assert_eq!(&received.payload[..], b"ping");

    server_tx.send(Message::binary(received.payload)).await.unwrap();
    assert_eq!(&client.recv_binary().await[..], b"ping");

    client.send_close().await;
    let close = server_rx.recv().await.unwrap();
    assert!(close.is_close());
}
