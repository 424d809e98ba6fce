//! Gatehouse Front End Server
//!
//! Serves agent heartbeat streams (gRPC) and the plain-HTTP API on a single
//! port.
//!
//! ## Configuration
//! All configuration is done via environment variables:
//!
//! - `GATEHOUSE_ADDR`: Server bind address (default: 0.0.0.0:3025)
//! - `GATEHOUSE_LOG_FORMAT`: `text` or `json` (default: text)
//! - `GATEHOUSE_SHUTDOWN_TIMEOUT_SECS`: Drain timeout on shutdown (default: 30)
//! - `AUDIT_LOG_BACKEND`: `file` or `memory` (default: file)
//! - `AUDIT_LOG_PATH`: Audit log file (default: ./data/audit.jsonl)
//! - `AUDIT_LOG_SYNC`: fsync every audit append (default: true)
//!
//! ## Example Usage
//! ```bash
//! GATEHOUSE_ADDR=127.0.0.1:3025 cargo run -p gatehouse-server
//!
//! curl http://127.0.0.1:3025/healthz
//! curl 'http://127.0.0.1:3025/v1/events?order=desc&limit=10'
//! ```
//!
//! ## Logging
//! Logging is controlled via the `RUST_LOG` environment variable:
//! ```bash
//! RUST_LOG=gatehouse_server=debug cargo run -p gatehouse-server
//! ```

use std::sync::Arc;

use gatehouse_server::shutdown::{shutdown_signal, DrainOutcome};
use gatehouse_server::{
    init_logging, ApiConfig, FrontEndServer, GracefulShutdown, LogSink, ServerConfig,
    ShutdownHandle, Telemetry,
};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env()?;
    init_logging(config.log_format);

    tracing::info!(
        addr = %config.listen_addr,
        audit = ?config.audit.backend,
        "Starting Gatehouse front end"
    );

    let audit_log = gatehouse_events::open(config.audit.clone()).await?;
    let server = FrontEndServer::new(
        ApiConfig::new(audit_log),
        Arc::new(LogSink),
        Telemetry::auth_grpc(),
    );

    let listener = TcpListener::bind(config.listen_addr).await?;

    let handle = ShutdownHandle::new();
    let trigger = handle.clone();
    tokio::spawn(async move {
        let signal = shutdown_signal().await;
        trigger.trigger(signal);
    });

    let mut stop_accepting = handle.clone();
    let serving = server.serve(listener, async move {
        stop_accepting.wait().await;
    });

    let (outcome, result) = GracefulShutdown::with_timeout(config.shutdown_timeout)
        .drain(handle, serving)
        .await;

    if let Some(result) = result {
        result?;
    }

    match outcome {
        DrainOutcome::Completed => tracing::info!("Server shut down gracefully"),
        DrainOutcome::TimedOut => tracing::warn!("Server shut down with connections still open"),
    }

    Ok(())
}
