//! Relay server binary.
//!
//! Parses CLI arguments, merges them over an optional TOML configuration
//! file, and runs the relay server until Ctrl+C.

mod cli;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use weir::{RelayConfig, RelayMode, RelayServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Structured logging for the standalone binary; embedders install
    // their own subscriber.
    tracing_subscriber::fmt::init();

    #[cfg(feature = "metrics")]
    if let Err(err) = metrics_exporter_prometheus::PrometheusBuilder::new().install() {
        tracing::warn!(%err, "failed to install Prometheus metrics exporter");
    }

    let args = cli::Cli::parse();
    let mut config = match &args.config {
        Some(path) => RelayConfig::from_file(path)?,
        None => RelayConfig::default(),
    };
    if let Some(mode) = args.mode {
        config.mode = match mode {
            cli::ModeArg::Direct => RelayMode::Direct,
            cli::ModeArg::Staged => RelayMode::Staged,
        };
    }
    if args.load_test {
        config = config.with_load_test_buffer();
    }
    if let Some(size) = args.buffer_size {
        config.buffer_size = size;
    }
    if let Some(every) = args.report_every {
        config.report_every = every;
    }
    if args.decode_records {
        config.decode_records = true;
    }

    let listener = TcpListener::bind(&args.listen).await?;
    info!(
        addr = %listener.local_addr()?,
        mode = ?config.mode,
        buffer_size = config.buffer_size,
        "starting relay server"
    );
    RelayServer::new(config)
        .with_subprotocols(args.subprotocol)
        .serve(listener)
        .await?;
    Ok(())
}
