//! Dual-mode streaming relay engine.
//!
//! Both modes echo whatever a connection sends back to it and enforce the
//! configured maximum payload size. [`direct`] pairs every received
//! message with one outbound echo; [`staged`] decouples arrival
//! boundaries from processing boundaries by pumping received bytes
//! through a bounded pipe and re-slicing them into fixed-size chunks.
//!
//! The engine is handed an upgraded connection and a cancellation token
//! by its caller and owns the connection until the session ends.

use bytes::Buf;
use tracing::{trace, warn};

use crate::{metrics, record::decode_record};

pub mod direct;
pub mod staged;

pub use direct::run_direct;
pub use staged::run_staged;

/// Advisory record decode: never affects forwarding.
///
/// Successful decodes are traced; faults are counted and logged, and the
/// bytes are relayed regardless.
pub(crate) fn decode_advisory<B: Buf>(buf: B) {
    match decode_record(buf) {
        Ok(record) => {
            trace!(name = record.name.as_deref().unwrap_or_default(), "record decoded");
        }
        Err(err) => {
            metrics::inc_decode_faults();
            warn!(%err, "record decode failed");
        }
    }
}
