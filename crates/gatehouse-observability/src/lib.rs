//! Gatehouse Observability
//!
//! Prometheus metrics for the auth server front end.
//!
//! # Usage
//!
//! ```no_run
//! use gatehouse_observability::{exporter, metrics};
//!
//! // Register metrics once at startup
//! metrics::init();
//!
//! // Serve them next to the HTTP API
//! let metrics_router: axum::Router = exporter::create_metrics_router();
//! ```

pub mod exporter;
pub mod metrics;

pub use metrics::{init, REGISTRY};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_init_is_safe() {
        init();
        init();
        let _registry = &*REGISTRY;
    }
}
