//! Record decoding across chunk and message boundaries.

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;
use weir::{BytePipe, RelayConfig, RelayMode, decode_record};
use weir_testing::{TestClient, memory_pair};

/// Field 1, length-delimited: `name = "boundary"`.
const RECORD: &[u8] = b"\x0a\x08boundary";

#[tokio::test]
async fn window_spanning_two_writes_decodes_like_a_flat_buffer() {
    let flat = decode_record(RECORD).unwrap();

    for split in 1..RECORD.len() {
        let (head, tail) = RECORD.split_at(split);
        let (mut writer, mut reader) = BytePipe::new(64);
        writer.write(Bytes::copy_from_slice(head)).await.unwrap();
        writer.write(Bytes::copy_from_slice(tail)).await.unwrap();
        writer.complete();

        let window = reader.read().await;
        assert!(window.completed);
        assert_eq!(window.buffer.segments().count(), 2);
        let decoded = decode_record(window.buffer.cursor()).unwrap();
        assert_eq!(decoded, flat, "split at {split}");
    }
}

#[traced_test]
#[tokio::test]
async fn record_split_across_messages_decodes_inside_one_chunk() {
    // Chunk size equals the record length, so the two fragments are
    // reassembled into a single segmented chunk before decoding.
    let chunk_size = RECORD.len();
    let config = RelayConfig {
        mode: RelayMode::Staged,
        buffer_size: chunk_size,
        decode_records: true,
        report_every: 0,
        ..RelayConfig::default()
    };
    let (server, client) = memory_pair(chunk_size);
    let engine =
        tokio::spawn(
            async move { weir::run_staged(server, CancellationToken::new(), &config).await },
        );
    let mut client = TestClient::new(client);

    let (head, tail) = RECORD.split_at(3);
    client.send_binary(head).await;
    client.send_binary(tail).await;
    client.send_close().await;

    let (payloads, _) = client.collect_until_close().await;
    let joined: Vec<u8> = payloads.concat();
    assert_eq!(joined, RECORD);
    assert!(!logs_contain("record decode failed"));
    engine.await.unwrap().unwrap();
}

#[traced_test]
#[tokio::test]
async fn undecodable_chunk_is_still_forwarded() {
    let config = RelayConfig {
        mode: RelayMode::Staged,
        buffer_size: 4,
        decode_records: true,
        report_every: 0,
        ..RelayConfig::default()
    };
    let (server, client) = memory_pair(4);
    let engine =
        tokio::spawn(
            async move { weir::run_staged(server, CancellationToken::new(), &config).await },
        );
    let mut client = TestClient::new(client);

    // An unterminated varint key: every chunk of this fails to decode.
    client.send_binary(&[0x80, 0x80, 0x80, 0x80]).await;
    client.send_close().await;

    let (payloads, _) = client.collect_until_close().await;
    let joined: Vec<u8> = payloads.concat();
    assert_eq!(joined, vec![0x80, 0x80, 0x80, 0x80]);
    assert!(logs_contain("record decode failed"));
    engine.await.unwrap().unwrap();
}
