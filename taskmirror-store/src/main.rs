//! `TaskMirror` store server -- reference ordered document store.
//!
//! An axum WebSocket server holding the authoritative task collection. It
//! resolves server-timestamp markers, applies add/delete requests, and
//! pushes a full ordered snapshot to every subscriber after each change.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:9100
//! cargo run --bin taskmirror-store
//!
//! # Run on custom address
//! cargo run --bin taskmirror-store -- --bind 127.0.0.1:8080
//!
//! # Or via environment variable
//! STORE_ADDR=127.0.0.1:8080 cargo run --bin taskmirror-store
//! ```

use std::sync::Arc;

use clap::Parser;
use taskmirror_store::config::{StoreCliArgs, StoreConfig};
use taskmirror_store::server::{self, StoreState};

#[tokio::main]
async fn main() {
    let cli = StoreCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match StoreConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing with the resolved log level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting taskmirror store server");

    let state = Arc::new(StoreState::new());

    match server::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "store server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "store server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start store server");
            std::process::exit(1);
        }
    }
}
