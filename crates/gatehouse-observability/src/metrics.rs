use lazy_static::lazy_static;
use prometheus::{IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Once;

static INIT: Once = Once::new();

lazy_static! {
    /// Global Prometheus metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Dispatch Metrics
    // ============================================================================

    /// Requests routed by the protocol multiplexer
    pub static ref REQUESTS_DISPATCHED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("gatehouse_requests_dispatched_total", "Total requests dispatched by protocol"),
        &["protocol"] // grpc, http
    ).expect("metric can be created");

    /// Requests whose downstream handler returned an error
    pub static ref HANDLER_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("gatehouse_handler_errors_total", "Total downstream handler errors"),
        &["protocol"]
    ).expect("metric can be created");

    // ============================================================================
    // Heartbeat Metrics
    // ============================================================================

    /// Heartbeat events received
    pub static ref HEARTBEATS_RECEIVED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("gatehouse_heartbeats_received_total", "Total heartbeat events received"),
        &["kind"] // node, proxy, unspecified
    ).expect("metric can be created");

    /// Heartbeat streams currently open
    pub static ref HEARTBEAT_STREAMS_ACTIVE: IntGauge = IntGauge::new(
        "gatehouse_heartbeat_streams_active",
        "Heartbeat streams currently open"
    ).expect("metric can be created");

    /// Heartbeat streams closed, by outcome
    pub static ref HEARTBEAT_STREAMS_CLOSED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("gatehouse_heartbeat_streams_closed_total", "Total heartbeat streams closed"),
        &["outcome"] // clean, error, reset, panic
    ).expect("metric can be created");

    // ============================================================================
    // Audit Metrics
    // ============================================================================

    /// Audit log operations
    pub static ref AUDIT_OPERATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("gatehouse_audit_operations_total", "Total audit log operations"),
        &["operation", "result"] // append|query, ok|error
    ).expect("metric can be created");
}

/// Register all metrics with the global registry. Safe to call repeatedly.
pub fn init() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(REQUESTS_DISPATCHED_TOTAL.clone()))
            .expect("requests_dispatched_total can be registered");
        REGISTRY
            .register(Box::new(HANDLER_ERRORS_TOTAL.clone()))
            .expect("handler_errors_total can be registered");

        REGISTRY
            .register(Box::new(HEARTBEATS_RECEIVED_TOTAL.clone()))
            .expect("heartbeats_received_total can be registered");
        REGISTRY
            .register(Box::new(HEARTBEAT_STREAMS_ACTIVE.clone()))
            .expect("heartbeat_streams_active can be registered");
        REGISTRY
            .register(Box::new(HEARTBEAT_STREAMS_CLOSED_TOTAL.clone()))
            .expect("heartbeat_streams_closed_total can be registered");

        REGISTRY
            .register(Box::new(AUDIT_OPERATIONS_TOTAL.clone()))
            .expect("audit_operations_total can be registered");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_show_up_in_registry() {
        init();
        REQUESTS_DISPATCHED_TOTAL.with_label_values(&["grpc"]).inc();

        let names: Vec<String> = REGISTRY
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"gatehouse_requests_dispatched_total".to_string()));
    }

    #[test]
    fn test_gauge_tracks_open_streams() {
        init();
        let before = HEARTBEAT_STREAMS_ACTIVE.get();
        HEARTBEAT_STREAMS_ACTIVE.inc();
        HEARTBEAT_STREAMS_ACTIVE.dec();
        assert_eq!(HEARTBEAT_STREAMS_ACTIVE.get(), before);
    }
}
