//! Direct per-message relay loop.

use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::{
    config::RelayConfig,
    counters::RelayCounters,
    error::{RelayError, is_teardown_fault},
    metrics::{self, Direction},
    relay::decode_advisory,
    transport::{CloseReason, Connection, Message, MessageReader, MessageWriter},
};

/// Drive direct mode to completion: one message in, one echo out.
///
/// Every received unit bumps `counters` (the timer starts on the first
/// one). With record decoding enabled the payload is decoded as advisory
/// diagnostics; faults are logged, never fatal. A close request ends the
/// loop; a payload above the configured buffer size — or a receive unit
/// that filled the buffer without completing its message — ends it with a
/// "too big" close instead of an echo. Teardown always attempts a close
/// handshake and suppresses transport faults while doing so.
///
/// # Errors
///
/// Returns [`RelayError::Transport`] for I/O faults outside normal
/// teardown; expected teardown noise (resets, truncated streams) is
/// logged and swallowed.
pub async fn run_direct<C: Connection>(
    conn: C,
    shutdown: CancellationToken,
    config: &RelayConfig,
    counters: &mut RelayCounters,
) -> Result<(), RelayError> {
    let (mut reader, mut writer) = conn.split();
    let max_payload = config.buffer_size;
    let mut close_reason = Some(CloseReason::normal());
    let mut fault = None;

    loop {
        let message = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            received = reader.recv() => match received {
                Ok(message) => message,
                Err(err) if is_teardown_fault(&err) => {
                    debug!(%err, "transport closed during receive");
                    close_reason = None;
                    break;
                }
                Err(err) => {
                    error!(%err, "receive fault");
                    shutdown.cancel();
                    close_reason = None;
                    fault = Some(RelayError::Transport(err));
                    break;
                }
            },
        };

        counters.on_message();
        metrics::inc_messages(Direction::Inbound);
        if config.decode_records {
            decode_advisory(&message.payload[..]);
        }
        if message.is_close() {
            break;
        }
        // Oversize: either a whole payload above the maximum, or a unit
        // that filled the receive buffer without completing its message.
        let oversize = message.payload.len() > max_payload
            || (!message.is_final && message.payload.len() >= max_payload);
        if oversize {
            metrics::inc_oversize_closes();
            close_reason = Some(CloseReason::too_big(&config.oversize_reason));
            break;
        }

        match writer.send(Message::binary(message.payload)).await {
            Ok(()) => metrics::inc_messages(Direction::Outbound),
            Err(err) if is_teardown_fault(&err) => {
                debug!(%err, "transport closed during send");
                close_reason = None;
                break;
            }
            Err(err) => {
                error!(%err, "send fault");
                shutdown.cancel();
                close_reason = None;
                fault = Some(RelayError::Transport(err));
                break;
            }
        }
    }

    if let Some(reason) = close_reason
        && let Err(err) = writer.close(reason).await
    {
        debug!(%err, "close handshake suppressed");
    }

    match fault {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
