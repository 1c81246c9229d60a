//! Relay configuration surface.
//!
//! One size knob governs the whole session: `buffer_size` is the maximum
//! accepted payload, the staged chunk size, and the pipe capacity. The
//! remaining options select the relay mode, advisory record decoding, the
//! oversize close reason, and the diagnostic reporting cadence.

use std::{io, path::Path};

use serde::Deserialize;

/// Default buffer/chunk size: 1 MiB.
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Load-test preset buffer/chunk size: 1 GiB.
pub const LOAD_TEST_BUFFER_SIZE: usize = 1024 * 1024 * 1024;

/// Default cadence for the diagnostic timing line.
pub const DEFAULT_REPORT_EVERY: u64 = 100_000;

const DEFAULT_OVERSIZE_REASON: &str = "message too big";

/// Flow-control discipline for a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayMode {
    /// One message in, one echo out.
    Direct,
    /// Producer/consumer rechunking through the bounded pipe.
    Staged,
}

/// Options recognized by the relay engine.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Flow-control discipline.
    pub mode: RelayMode,
    /// Maximum payload size, staged chunk size, and pipe capacity.
    pub buffer_size: usize,
    /// Decode each relayed unit as a record (advisory diagnostics).
    pub decode_records: bool,
    /// Reason string sent with an oversize close.
    pub oversize_reason: String,
    /// Emit a timing line every this many relayed units; 0 disables.
    pub report_every: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            mode: RelayMode::Direct,
            buffer_size: DEFAULT_BUFFER_SIZE,
            decode_records: false,
            oversize_reason: DEFAULT_OVERSIZE_REASON.to_string(),
            report_every: DEFAULT_REPORT_EVERY,
        }
    }
}

impl RelayConfig {
    /// The 1 GiB load-test preset applied to this configuration.
    #[must_use]
    pub fn with_load_test_buffer(mut self) -> Self {
        self.buffer_size = LOAD_TEST_BUFFER_SIZE;
        self
    }

    /// Parse a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns the underlying TOML error for malformed input.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> { toml::from_str(text) }

    /// Load a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))
    }
}
