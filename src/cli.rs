//! Command line interface for the relay server binary.
//!
//! Self-contained so the build script can include it for man page
//! generation; flag values are mapped onto the library configuration in
//! `main`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Relay mode selected on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// One message in, one echo out.
    Direct,
    /// Rechunk through the bounded pipe.
    Staged,
}

/// Command line arguments for the `weir` binary.
#[derive(Debug, Parser)]
#[command(name = "weir", version, about = "Backpressured echo relay server")]
pub struct Cli {
    /// Address to listen on.
    #[arg(short, long, default_value = "127.0.0.1:9230")]
    pub listen: String,

    /// Relay mode (defaults to the configuration file's choice, else direct).
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Buffer/chunk size in bytes (also the maximum payload size).
    #[arg(long, conflicts_with = "load_test")]
    pub buffer_size: Option<usize>,

    /// Use the 1 GiB load-test buffer preset.
    #[arg(long)]
    pub load_test: bool,

    /// Decode each relayed unit as a record (diagnostic).
    #[arg(long)]
    pub decode_records: bool,

    /// Emit a timing line every N relayed units (0 disables).
    #[arg(long)]
    pub report_every: Option<u64>,

    /// Supported subprotocols, comma separated.
    #[arg(long, value_delimiter = ',')]
    pub subprotocol: Vec<String>,

    /// TOML configuration file; command line flags override its values.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}
