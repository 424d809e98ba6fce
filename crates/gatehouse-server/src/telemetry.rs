//! Logging setup and the component span handed to server parts.

use std::net::SocketAddr;
use tracing::Span;
use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;

/// Component name of the auth server's gRPC front end.
pub const COMPONENT_AUTH_GRPC: &str = "auth:grpc";

/// Logging context passed explicitly to the front-end server and the
/// handlers it builds.
///
/// Every event logged under [`span`](Self::span) carries the `component`
/// field.
#[derive(Debug, Clone)]
pub struct Telemetry {
    component: &'static str,
    span: Span,
}

impl Telemetry {
    pub fn new(component: &'static str) -> Self {
        Self {
            component,
            span: tracing::info_span!("gatehouse", component),
        }
    }

    /// Telemetry for the auth server's gRPC front end.
    pub fn auth_grpc() -> Self {
        Self::new(COMPONENT_AUTH_GRPC)
    }

    pub fn component(&self) -> &'static str {
        self.component
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Child span covering one heartbeat stream.
    pub fn heartbeat_span(&self, peer: Option<SocketAddr>) -> Span {
        tracing::debug_span!(parent: &self.span, "heartbeat_stream", peer = ?peer)
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::auth_grpc()
    }
}

/// Install the global tracing subscriber.
///
/// The filter comes from `RUST_LOG` and falls back to `info`.
pub fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
