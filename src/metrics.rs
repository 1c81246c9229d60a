//! Metric names and recording helpers for the relay.
//!
//! Thin wrappers over the [`metrics`](https://docs.rs/metrics) facade;
//! the binary installs a Prometheus exporter when the `metrics` feature
//! is enabled.

use metrics::{counter, gauge};

/// Name of the gauge tracking active relay sessions.
pub const SESSIONS_ACTIVE: &str = "weir_sessions_active";
/// Name of the counter tracking relayed messages.
pub const MESSAGES_RELAYED: &str = "weir_messages_relayed_total";
/// Name of the counter tracking forwarded staged chunks.
pub const CHUNKS_FORWARDED: &str = "weir_chunks_forwarded_total";
/// Name of the counter tracking advisory record-decode faults.
pub const DECODE_FAULTS: &str = "weir_decode_faults_total";
/// Name of the counter tracking oversize-payload closes.
pub const OVERSIZE_CLOSES: &str = "weir_oversize_closes_total";
/// Name of the counter tracking panicking session tasks.
pub const SESSION_PANICS: &str = "weir_session_panics_total";

/// Direction label attached to the relayed-messages counter.
#[derive(Clone, Copy)]
pub enum Direction {
    /// Messages received from a client.
    Inbound,
    /// Messages echoed back to a client.
    Outbound,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the active sessions gauge.
pub fn inc_sessions() { gauge!(SESSIONS_ACTIVE).increment(1.0); }

/// Decrement the active sessions gauge.
pub fn dec_sessions() { gauge!(SESSIONS_ACTIVE).decrement(1.0); }

/// Record a relayed message for the given direction.
pub fn inc_messages(direction: Direction) {
    counter!(MESSAGES_RELAYED, "direction" => direction.as_str()).increment(1);
}

/// Record a forwarded staged chunk.
pub fn inc_chunks() { counter!(CHUNKS_FORWARDED).increment(1); }

/// Record an advisory record-decode fault.
pub fn inc_decode_faults() { counter!(DECODE_FAULTS).increment(1); }

/// Record an oversize-payload close.
pub fn inc_oversize_closes() { counter!(OVERSIZE_CLOSES).increment(1); }

/// Record a panicking session task.
pub fn inc_session_panics() { counter!(SESSION_PANICS).increment(1); }
