//! Canonical error types for relay sessions.
//!
//! Protocol violations (oversize payloads) are not errors — they end a
//! session through the close handshake. The variants here cover the
//! faults that remain after teardown-expected transport noise has been
//! suppressed.

use std::io;

/// Fault that ended a relay session abnormally.
#[derive(Debug)]
pub enum RelayError {
    /// Transport-level I/O fault outside normal teardown.
    Transport(io::Error),
    /// The upgrade handshake failed before the engine started.
    Handshake(io::Error),
    /// A relay task aborted abnormally (panic or forced abort).
    Aborted(String),
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(err) => write!(f, "transport fault: {err}"),
            Self::Handshake(err) => write!(f, "handshake failed: {err}"),
            Self::Aborted(reason) => write!(f, "relay task aborted: {reason}"),
        }
    }
}

impl std::error::Error for RelayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(err) | Self::Handshake(err) => Some(err),
            Self::Aborted(_) => None,
        }
    }
}

/// Whether an I/O fault is expected noise during connection teardown.
///
/// Resets and truncated streams are routine when a peer departs; they are
/// logged at debug level and never surfaced to the session's caller.
#[must_use]
pub fn is_teardown_fault(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotConnected
    )
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::{RelayError, is_teardown_fault};

    #[test]
    fn teardown_kinds_are_recognized() {
        assert!(is_teardown_fault(&io::Error::from(io::ErrorKind::ConnectionReset)));
        assert!(is_teardown_fault(&io::Error::from(io::ErrorKind::UnexpectedEof)));
        assert!(!is_teardown_fault(&io::Error::from(io::ErrorKind::InvalidData)));
    }

    #[test]
    fn display_names_the_fault() {
        let err = RelayError::Transport(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(err.to_string().starts_with("transport fault"));
    }
}
