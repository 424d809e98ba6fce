//! Plain-HTTP API
//!
//! Served on the same listener as gRPC; the multiplexer sends every
//! non-gRPC request here.
//!
//! | Route | Description |
//! |---|---|
//! | `GET /healthz` | Liveness probe |
//! | `GET /v1/events` | Query the audit log (`start`, `end`, `order`, `limit`, `session_id`) |
//! | `POST /v1/events` | Append an audit entry |
//! | `GET /metrics` | Prometheus metrics |

use axum::{
    body::Body,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use gatehouse_events::{AuditEntry, AuditLog, AuditLogError, EventId, Filter};
use gatehouse_observability::metrics::AUDIT_OPERATIONS_TOTAL;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;

/// Shared state of the HTTP handlers
#[derive(Clone)]
pub struct ApiConfig {
    pub audit_log: Arc<dyn AuditLog>,
}

impl ApiConfig {
    pub fn new(audit_log: Arc<dyn AuditLog>) -> Self {
        Self { audit_log }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    AuditLog(#[from] AuditLogError),

    #[error("{0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::AuditLog(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
            "code": status.as_u16()
        });

        (
            status,
            [("content-type", "application/json")],
            Body::from(body.to_string()),
        )
            .into_response()
    }
}

/// Body of `POST /v1/events`
#[derive(Debug, Deserialize)]
pub struct NewEvent {
    pub schema: String,
    #[serde(default)]
    pub parent: Option<EventId>,
    /// Defaults to the time the request is handled
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// Build the plain-HTTP router.
pub fn create_router(config: ApiConfig) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/v1/events", get(query_events).post(append_event))
        .with_state(config)
        .merge(gatehouse_observability::exporter::create_metrics_router())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "ok"
}

fn record(operation: &str, ok: bool) {
    AUDIT_OPERATIONS_TOTAL
        .with_label_values(&[operation, if ok { "ok" } else { "error" }])
        .inc();
}

async fn query_events(
    State(config): State<ApiConfig>,
    Query(filter): Query<Filter>,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    let result = config.audit_log.query(&filter).await;
    record("query", result.is_ok());

    let entries = result.map_err(|e| {
        tracing::warn!(error = %e, "Audit query failed");
        e
    })?;
    Ok(Json(entries))
}

async fn append_event(
    State(config): State<ApiConfig>,
    Json(event): Json<NewEvent>,
) -> Result<(StatusCode, Json<AuditEntry>), ApiError> {
    if event.schema.trim().is_empty() {
        return Err(ApiError::BadRequest("schema must not be empty".to_string()));
    }

    let entry = AuditEntry {
        id: EventId::new(),
        parent: event.parent,
        schema: event.schema,
        time: event.time.unwrap_or_else(Utc::now),
        properties: event.properties,
    };

    let result = config.audit_log.append(entry.clone()).await;
    record("append", result.is_ok());

    if let Err(e) = result {
        tracing::warn!(error = %e, schema = %entry.schema, "Audit append failed");
        return Err(e.into());
    }

    tracing::info!(target: "AUDIT", id = %entry.id, schema = %entry.schema, "Audit entry recorded");
    Ok((StatusCode::CREATED, Json(entry)))
}
