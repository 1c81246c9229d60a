//! Staged relay: producer and consumer tasks over the bounded pipe.
//!
//! The producer receives transport messages and writes their bytes into
//! the pipe; the consumer slices fixed-size chunks from the pipe —
//! irrespective of the original message boundaries — and forwards each
//! chunk's underlying segments back outbound. The two tasks share
//! nothing but the pipe and the session cancellation token. The pipe's
//! capacity enforces that an overeager producer cannot outrun a slower
//! consumer beyond a bounded amount of buffered data.

use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::{
    config::RelayConfig,
    counters::RelayCounters,
    error::{RelayError, is_teardown_fault},
    metrics::{self, Direction},
    pipe::{BytePipe, PipeClosed, PipeReader, PipeWriter},
    relay::decode_advisory,
    segmented::SegmentedBytes,
    transport::{CloseReason, Connection, Message, MessageReader, MessageWriter},
};

/// Drive staged mode to completion.
///
/// Spawns the producer and consumer tasks, joins them, and performs the
/// final close handshake with the producer's recorded reason (normal, or
/// the configured "too big" string after an oversize payload). A fault in
/// either task cancels the session token; pipe completion signals release
/// the partner task so neither side deadlocks.
///
/// # Errors
///
/// Returns the first non-teardown fault from either task, or
/// [`RelayError::Aborted`] when a task panicked.
pub async fn run_staged<C: Connection>(
    conn: C,
    shutdown: CancellationToken,
    config: &RelayConfig,
) -> Result<(), RelayError> {
    let (reader, writer) = conn.split();
    let (pipe_writer, pipe_reader) = BytePipe::new(config.buffer_size);

    let producer = tokio::spawn(produce(
        reader,
        pipe_writer,
        shutdown.clone(),
        config.buffer_size,
        config.oversize_reason.clone(),
    ));
    let consumer = tokio::spawn(consume(
        writer,
        pipe_reader,
        shutdown.clone(),
        config.buffer_size,
        config.decode_records,
        RelayCounters::new(config.report_every),
    ));

    let (produced, consumed) = tokio::join!(producer, consumer);

    let mut fault = None;
    let close_reason = match produced {
        Ok(Ok(reason)) => reason,
        Ok(Err(err)) => {
            fault = Some(err);
            None
        }
        Err(join_err) => {
            shutdown.cancel();
            error!(%join_err, "producer task aborted");
            fault = Some(RelayError::Aborted(join_err.to_string()));
            None
        }
    };

    let writer = match consumed {
        Ok((writer, Ok(()))) => Some(writer),
        Ok((_, Err(err))) => {
            if fault.is_none() {
                fault = Some(err);
            } else {
                error!(%err, "consumer fault");
            }
            None
        }
        Err(join_err) => {
            shutdown.cancel();
            error!(%join_err, "consumer task aborted");
            if fault.is_none() {
                fault = Some(RelayError::Aborted(join_err.to_string()));
            }
            None
        }
    };

    if let (Some(reason), Some(mut writer)) = (close_reason, writer)
        && let Err(err) = writer.close(reason).await
    {
        debug!(%err, "close handshake suppressed");
    }

    match fault {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Receive transport messages and feed their bytes into the pipe.
///
/// Returns the close reason teardown should send, or `None` after a
/// transport fault (silent disconnect). Always completes the pipe on
/// exit so the consumer can drain and terminate.
async fn produce<R>(
    mut reader: R,
    mut pipe: PipeWriter,
    shutdown: CancellationToken,
    chunk_size: usize,
    oversize_reason: String,
) -> Result<Option<CloseReason>, RelayError>
where
    R: MessageReader + 'static,
{
    let outcome = loop {
        let message = tokio::select! {
            biased;
            () = shutdown.cancelled() => break Ok(Some(CloseReason::normal())),
            received = reader.recv() => match received {
                Ok(message) => message,
                Err(err) if is_teardown_fault(&err) => {
                    debug!(%err, "transport closed during receive");
                    break Ok(None);
                }
                Err(err) => {
                    error!(%err, "producer receive fault");
                    shutdown.cancel();
                    break Err(RelayError::Transport(err));
                }
            },
        };

        metrics::inc_messages(Direction::Inbound);
        if message.is_close() {
            break Ok(Some(CloseReason::normal()));
        }
        if message.payload.len() > chunk_size {
            metrics::inc_oversize_closes();
            break Ok(Some(CloseReason::too_big(&oversize_reason)));
        }

        let committed = tokio::select! {
            biased;
            () = shutdown.cancelled() => break Ok(Some(CloseReason::normal())),
            committed = pipe.write(message.payload) => committed,
        };
        if let Err(PipeClosed) = committed {
            // The consumer already finished; nothing more can be relayed.
            break Ok(Some(CloseReason::normal()));
        }
    };
    pipe.complete();
    outcome
}

/// Slice fixed-size chunks from the pipe and forward them outbound.
///
/// The writer half is handed back so the supervisor can run the final
/// close handshake after both tasks have finished.
async fn consume<W>(
    mut writer: W,
    mut pipe: PipeReader,
    shutdown: CancellationToken,
    chunk_size: usize,
    decode_records: bool,
    mut counters: RelayCounters,
) -> (W, Result<(), RelayError>)
where
    W: MessageWriter + 'static,
{
    let result = loop {
        let window = tokio::select! {
            biased;
            () = shutdown.cancelled() => break Ok(()),
            window = pipe.read() => window,
        };

        let mut buffer = window.buffer;
        let examined = buffer.len();
        let mut consumed = 0;
        let mut send_fault = None;

        while buffer.len() >= chunk_size {
            let chunk = buffer.split_to(chunk_size);
            match forward_chunk(&mut writer, &chunk, decode_records, &mut counters).await {
                Ok(()) => consumed += chunk_size,
                Err(err) => {
                    send_fault = Some(err);
                    break;
                }
            }
        }
        if send_fault.is_none() && window.completed && !buffer.is_empty() {
            // Final short chunk: the stream ended below a full chunk.
            let len = buffer.len();
            let chunk = buffer.split_to(len);
            match forward_chunk(&mut writer, &chunk, decode_records, &mut counters).await {
                Ok(()) => consumed += len,
                Err(err) => send_fault = Some(err),
            }
        }
        pipe.advance(consumed, examined);

        if let Some(err) = send_fault {
            if is_teardown_fault(&err) {
                debug!(%err, "transport closed during forward");
                break Ok(());
            }
            error!(%err, "consumer send fault");
            shutdown.cancel();
            break Err(RelayError::Transport(err));
        }
        if window.completed {
            break Ok(());
        }
    };
    // Dropping the reader signals reader-done, releasing a blocked writer.
    drop(pipe);
    (writer, result)
}

/// Forward one resolved chunk: advisory decode, counter bump, then every
/// underlying segment as a separate complete binary message — the
/// chunk's internal segmentation is preserved on the wire.
async fn forward_chunk<W>(
    writer: &mut W,
    chunk: &SegmentedBytes,
    decode_records: bool,
    counters: &mut RelayCounters,
) -> std::io::Result<()>
where
    W: MessageWriter,
{
    counters.on_message();
    if decode_records {
        decode_advisory(chunk.cursor());
    }
    metrics::inc_chunks();
    for segment in chunk.segments() {
        writer.send(Message::binary(segment.clone())).await?;
        metrics::inc_messages(Direction::Outbound);
    }
    Ok(())
}
