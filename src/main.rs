//! yxorp gateway
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────────┐
//!                        │                       GATEWAY                        │
//!   plaintext :80  ──────┼─▶┌────────┐                                          │
//!                        │  │  net   │──▶┌──────────┐   ┌────────────┐          │
//!   TLS :443  ───────────┼─▶│listener│   │   http   │──▶│ dispatcher │          │
//!                        │  └───┬────┘   │  server  │   └─────┬──────┘          │
//!                        │      ▼        └──────────┘         │                 │
//!                        │  ┌────────┐                 /pki/  │  other paths    │
//!                        │  │  tls   │ ◀─ OCSP cache          ▼        ▼        │
//!                        │  │terminat│ ◀─ session store   ┌──────┐ ┌────────┐   │
//!                        │  └────────┘                    │ auth │ │routing │   │
//!                        │                                └──────┘ └───┬────┘   │
//!                        │                                             ▼        │
//!                        │                                  forward / tunnel ───┼──▶ Backend
//!                        │                                                      │
//!                        │  config · observability · admin · lifecycle          │
//!                        └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use yxorp::config::load_config;
use yxorp::observability::{logging, metrics};
use yxorp::Gateway;

#[derive(Parser)]
#[command(name = "yxorp")]
#[command(about = "TLS-terminating HTTP/WebSocket gateway", long_about = None)]
struct Cli {
    /// Server configuration file (TOML).
    #[arg(short, long, default_value = "conf/proxyconf.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("yxorp: {}: {}", cli.config.display(), e);
            return ExitCode::FAILURE;
        }
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), config = %cli.config.display(), "yxorp starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let gateway = match Gateway::start(&config).await {
        Ok(gateway) => gateway,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    gateway.run_until_signalled().await;
    tracing::info!("Shutdown complete");
    ExitCode::SUCCESS
}
