//! Prometheus text exposition for the front end's HTTP router.

use axum::{
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus::{Encoder, TextEncoder};

use crate::metrics::{self, REGISTRY};

/// Encode every registered metric family.
///
/// Returns the content type to serve alongside the encoded bytes.
pub fn encode() -> prometheus::Result<(String, Vec<u8>)> {
    metrics::init();

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok((encoder.format_type().to_string(), buffer))
}

/// `GET /metrics`
pub async fn metrics_handler() -> Response {
    match encode() {
        Ok((content_type, body)) => {
            (StatusCode::OK, [(CONTENT_TYPE, content_type)], body).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to encode metrics: {}", e),
            )
                .into_response()
        }
    }
}

/// Router exposing `/metrics`, mergeable into a router with any state.
pub fn create_metrics_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/metrics", get(metrics_handler))
}
