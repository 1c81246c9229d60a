//! Accept loop and session supervision for the relay server.
//!
//! One independent session per accepted connection, tracked by a
//! [`TaskTracker`] and cancelled through a per-session child of the
//! server's [`CancellationToken`]. Panics in a session task are caught,
//! logged, and isolated — one session's failure never affects others.

use std::{
    any::Any,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use futures::{Future, FutureExt};
use log::warn;
use tokio::{
    net::{TcpListener, TcpStream},
    time::{Duration, sleep, timeout},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info};

use crate::{
    config::{RelayConfig, RelayMode},
    counters::RelayCounters,
    handshake::{Negotiator, PreambleNegotiator},
    metrics,
    relay::{run_direct, run_staged},
    session::{SessionHandle, SessionId, SessionRegistry},
};

/// Ceiling on the upgrade handshake, so a silent client can neither pin
/// a session task nor stall server shutdown.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause after a failed accept before retrying.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Relay server: accepts connections, negotiates upgrades, and runs one
/// relay session per connection.
pub struct RelayServer {
    config: RelayConfig,
    supported_subprotocols: Vec<String>,
    registry: Arc<SessionRegistry>,
}

impl RelayServer {
    /// Create a server with the given engine configuration.
    #[must_use]
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            supported_subprotocols: Vec::new(),
            registry: Arc::new(SessionRegistry::default()),
        }
    }

    /// Advertise `subprotocols` during upgrade negotiation.
    #[must_use]
    pub fn with_subprotocols(mut self, subprotocols: Vec<String>) -> Self {
        self.supported_subprotocols = subprotocols;
        self
    }

    /// Shared handle to the live-session registry.
    #[must_use]
    pub fn registry(&self) -> Arc<SessionRegistry> { Arc::clone(&self.registry) }

    /// Run the server until a Ctrl+C signal is received.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the accept loop faults irrecoverably.
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        self.serve_with_shutdown(listener, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
    }

    /// Run the server until `shutdown` resolves, then cancel every live
    /// session and drain their tasks before returning.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the accept loop faults irrecoverably.
    pub async fn serve_with_shutdown<S>(
        self,
        listener: TcpListener,
        shutdown: S,
    ) -> std::io::Result<()>
    where
        S: Future<Output = ()> + Send,
    {
        let token = CancellationToken::new();
        let tracker = TaskTracker::new();
        let negotiator = Arc::new(PreambleNegotiator::new(
            self.supported_subprotocols.clone(),
            self.config.buffer_size,
        ));
        let next_id = AtomicU64::new(0);

        info!(addr = ?listener.local_addr().ok(), "relay server listening");
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let id = SessionId::new(next_id.fetch_add(1, Ordering::Relaxed));
                        self.spawn_session(
                            stream,
                            id,
                            Arc::clone(&negotiator),
                            token.child_token(),
                            &tracker,
                        );
                    }
                    Err(err) => {
                        // Transient accept failures (fd exhaustion, aborted
                        // connections) must not spin the loop.
                        warn!("accept failed: error={err}");
                        sleep(ACCEPT_RETRY_DELAY).await;
                    }
                },
            }
        }

        token.cancel();
        self.registry.cancel_all();
        tracker.close();
        tracker.wait().await;
        Ok(())
    }

    fn spawn_session(
        &self,
        stream: TcpStream,
        id: SessionId,
        negotiator: Arc<PreambleNegotiator>,
        token: CancellationToken,
        tracker: &TaskTracker,
    ) {
        let peer_addr = match stream.peer_addr() {
            Ok(addr) => Some(addr),
            Err(err) => {
                warn!("failed to retrieve peer address: error={err}");
                None
            }
        };
        let config = self.config.clone();
        let registry = Arc::clone(&self.registry);
        tracker.spawn(async move {
            metrics::inc_sessions();
            let fut = std::panic::AssertUnwindSafe(run_session(
                stream, peer_addr, id, config, negotiator, registry, token,
            ))
            .catch_unwind();
            let outcome = fut.await;
            metrics::dec_sessions();
            if let Err(panic) = outcome {
                metrics::inc_session_panics();
                let panic_msg = describe_panic(panic.as_ref());
                error!(panic = %panic_msg, ?peer_addr, "session task panicked");
            }
        });
    }
}

async fn run_session(
    stream: TcpStream,
    peer_addr: Option<SocketAddr>,
    id: SessionId,
    config: RelayConfig,
    negotiator: Arc<PreambleNegotiator>,
    registry: Arc<SessionRegistry>,
    token: CancellationToken,
) {
    let (conn, subprotocol) = tokio::select! {
        () = token.cancelled() => return,
        negotiated = timeout(HANDSHAKE_TIMEOUT, negotiator.negotiate(stream)) => {
            match negotiated {
                Ok(Ok(upgraded)) => upgraded,
                Ok(Err(err)) => {
                    warn!("upgrade handshake failed: error={err}, peer_addr={peer_addr:?}");
                    return;
                }
                Err(_) => {
                    warn!("upgrade handshake timed out: peer_addr={peer_addr:?}");
                    return;
                }
            }
        }
    };
    debug!(%id, ?peer_addr, ?subprotocol, "session upgraded");

    let handle = Arc::new(SessionHandle::new(id, token.clone()));
    registry.insert(&handle);
    let outcome = match config.mode {
        RelayMode::Direct => {
            let mut counters = RelayCounters::new(config.report_every);
            run_direct(conn, token, &config, &mut counters).await
        }
        RelayMode::Staged => run_staged(conn, token, &config).await,
    };
    registry.remove(&handle.id());

    match outcome {
        Ok(()) => debug!(%id, "session completed"),
        Err(err) => error!(%id, %err, "session failed"),
    }
}

/// Render a panic payload for logging.
///
/// String payloads are shown verbatim; anything else falls back to a
/// placeholder, matching what `panic!` can actually carry.
fn describe_panic(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::describe_panic;

    #[test]
    fn panic_payload_rendering() {
        assert_eq!(describe_panic(&"boom"), "boom");
        assert_eq!(describe_panic(&String::from("kapow")), "kapow");
        assert_eq!(describe_panic(&5_u32), "non-string panic payload");
    }
}
