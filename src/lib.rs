#![doc(html_root_url = "https://docs.rs/weir/latest")]
//! Public API for the `weir` relay library.
//!
//! This crate provides a dual-mode echo relay engine for message-oriented
//! full-duplex transports: a direct per-message mode and a staged mode
//! that rechunks the byte stream through a bounded, backpressured pipe.
//! Connection acceptance and upgrade negotiation are thin glue around the
//! engine; any transport implementing the [`transport`] seams can drive
//! it.

pub mod config;
pub use config::{RelayConfig, RelayMode};
pub mod counters;
pub mod error;
pub use error::RelayError;
pub mod handshake;
pub mod metrics;
pub mod pipe;
pub mod record;
pub mod relay;
pub mod segmented;
pub mod server;
pub mod session;
pub mod transport;

pub use counters::RelayCounters;
pub use handshake::{PreambleNegotiator, select_subprotocol};
pub use pipe::{BytePipe, PipeClosed, PipeReader, PipeWriter, ReadWindow};
pub use record::{Record, RecordError, decode_record};
pub use relay::{run_direct, run_staged};
pub use segmented::SegmentedBytes;
pub use server::RelayServer;
pub use session::{SessionHandle, SessionId, SessionRegistry};
pub use transport::{CloseCode, CloseReason, Connection, Message, MessageKind};
