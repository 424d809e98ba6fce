//! Heartbeat Stream Handler
//!
//! Consumes one agent's heartbeat channel. The handler receives events in a
//! loop until the stream ends or fails:
//!
//! ```text
//!            event
//!          ┌───────┐
//!          ▼       │
//!       ┌──────┐───┘   end of stream   ┌──────────────┐
//!       │ Open │──────────────────────▶│ Closed-Clean │  Ok(summary)
//!       └──────┘                       └──────────────┘
//!          │       receive error       ┌──────────────┐
//!          └──────────────────────────▶│ Closed-Error │  Err(status)
//!                                      └──────────────┘
//! ```
//!
//! Each event is handed to the [`HeartbeatSink`] before the next receive is
//! issued, so a slow sink backpressures the agent through HTTP/2 flow
//! control. The handler never times out on its own; it relies on the
//! transport to eventually end or fail the stream.
//!
//! With an audit log attached, each stream is given a session id and records
//! one [`AuthAttempt`]: on its first accepted heartbeat, or as a failed attempt
//! when the sink rejects one. Audit failures are logged and never end the
//! stream.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use gatehouse_events::{log_event, AuditLog, AuthAttempt, EventId};
use gatehouse_observability::metrics::{
    AUDIT_OPERATIONS_TOTAL, HEARTBEATS_RECEIVED_TOTAL, HEARTBEAT_STREAMS_ACTIVE,
    HEARTBEAT_STREAMS_CLOSED_TOTAL,
};
use gatehouse_proto::{AgentKind, Heartbeat};
use std::net::SocketAddr;
use std::sync::Arc;
use tonic::Status;
use tracing::{debug, info, warn, Instrument};

use crate::telemetry::Telemetry;

/// Receives every heartbeat accepted by the handler.
///
/// Returning an error terminates the agent's stream with that status.
#[async_trait]
pub trait HeartbeatSink: Send + Sync + 'static {
    async fn record(&self, peer: Option<SocketAddr>, heartbeat: &Heartbeat) -> Result<(), Status>;
}

/// Default sink: accepts every heartbeat and only logs it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl HeartbeatSink for LogSink {
    async fn record(&self, peer: Option<SocketAddr>, heartbeat: &Heartbeat) -> Result<(), Status> {
        info!(
            peer = ?peer,
            agent_id = %heartbeat.agent_id,
            kind = kind_label(heartbeat.kind()),
            "Agent heartbeat"
        );
        Ok(())
    }
}

/// What a cleanly closed stream delivered.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StreamSummary {
    /// Events accepted by the sink
    pub events: u64,
}

/// Runs the receive loop for heartbeat streams.
///
/// Cheap to clone; one clone runs per stream and clones share nothing
/// mutable except the sink, which must synchronize itself.
#[derive(Clone)]
pub struct HeartbeatHandler {
    sink: Arc<dyn HeartbeatSink>,
    audit: Option<Arc<dyn AuditLog>>,
    telemetry: Telemetry,
}

impl HeartbeatHandler {
    pub fn new(sink: Arc<dyn HeartbeatSink>, telemetry: Telemetry) -> Self {
        Self {
            sink,
            audit: None,
            telemetry,
        }
    }

    /// Record one auth attempt per stream in `log`.
    pub fn with_audit(mut self, log: Arc<dyn AuditLog>) -> Self {
        self.audit = Some(log);
        self
    }

    /// Receive events from `stream` until it ends or fails.
    ///
    /// `None` from the stream is a clean close and yields `Ok`; an `Err`
    /// item is returned unchanged and ends the loop.
    pub async fn run<S>(&self, peer: Option<SocketAddr>, stream: S) -> Result<StreamSummary, Status>
    where
        S: Stream<Item = Result<Heartbeat, Status>> + Send,
    {
        let span = self.telemetry.heartbeat_span(peer);
        self.receive(peer, stream).instrument(span).await
    }

    async fn receive<S>(&self, peer: Option<SocketAddr>, stream: S) -> Result<StreamSummary, Status>
    where
        S: Stream<Item = Result<Heartbeat, Status>> + Send,
    {
        let mut stream = std::pin::pin!(stream);
        let mut open = OpenStream::new();
        let mut summary = StreamSummary::default();
        let session = EventId::new().to_string();

        loop {
            match stream.next().await {
                Some(Ok(event)) => {
                    let kind = event.kind();
                    debug!(
                        agent_id = %event.agent_id,
                        kind = kind_label(kind),
                        hostname = %event.hostname,
                        addr = %event.addr,
                        timestamp_ms = event.timestamp_ms,
                        "Received event"
                    );
                    HEARTBEATS_RECEIVED_TOTAL
                        .with_label_values(&[kind_label(kind)])
                        .inc();

                    if let Err(status) = self.sink.record(peer, &event).await {
                        debug!(
                            agent_id = %event.agent_id,
                            error = %status,
                            "Heartbeat rejected"
                        );
                        let attempt = AuthAttempt::new(&session, &event.agent_id);
                        self.audit(attempt.failed(status.message())).await;
                        open.close("error");
                        return Err(status);
                    }
                    if summary.events == 0 {
                        self.audit(AuthAttempt::new(&session, &event.agent_id))
                            .await;
                    }
                    summary.events += 1;
                }
                None => {
                    debug!(events = summary.events, "Connection closed");
                    open.close("clean");
                    return Ok(summary);
                }
                Some(Err(status)) => {
                    debug!(
                        events = summary.events,
                        error = %status,
                        "Failed to receive event"
                    );
                    open.close("error");
                    return Err(status);
                }
            }
        }
    }

    async fn audit(&self, attempt: AuthAttempt) {
        let Some(log) = &self.audit else {
            return;
        };
        let result = log_event(log.as_ref(), None, &attempt).await;
        AUDIT_OPERATIONS_TOTAL
            .with_label_values(&["append", if result.is_ok() { "ok" } else { "error" }])
            .inc();
        if let Err(e) = result {
            warn!(error = %e, user = %attempt.user, "Failed to audit heartbeat stream");
        }
    }
}

fn kind_label(kind: AgentKind) -> &'static str {
    match kind {
        AgentKind::Node => "node",
        AgentKind::Proxy => "proxy",
        AgentKind::Unspecified => "unspecified",
    }
}

/// Keeps the open-streams gauge and the close counter accurate even when
/// the stream future is dropped mid-receive by a connection reset, or
/// unwinds out of a panicking sink.
struct OpenStream {
    outcome: Option<&'static str>,
}

impl OpenStream {
    fn new() -> Self {
        HEARTBEAT_STREAMS_ACTIVE.inc();
        OpenStream { outcome: None }
    }

    fn close(&mut self, outcome: &'static str) {
        self.outcome = Some(outcome);
    }
}

impl Drop for OpenStream {
    fn drop(&mut self) {
        HEARTBEAT_STREAMS_ACTIVE.dec();
        let outcome = match self.outcome {
            Some(outcome) => outcome,
            None if std::thread::panicking() => "panic",
            None => "reset",
        };
        HEARTBEAT_STREAMS_CLOSED_TOTAL
            .with_label_values(&[outcome])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use gatehouse_events::{Filter, MemoryLog, SESSION_ID};
    use std::time::Duration;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<String>>,
        reject: Option<&'static str>,
    }

    #[async_trait]
    impl HeartbeatSink for RecordingSink {
        async fn record(
            &self,
            _peer: Option<SocketAddr>,
            heartbeat: &Heartbeat,
        ) -> Result<(), Status> {
            if self.reject == Some(heartbeat.agent_id.as_str()) {
                return Err(Status::permission_denied("unknown agent"));
            }
            self.seen.lock().await.push(heartbeat.agent_id.clone());
            Ok(())
        }
    }

    fn beat(agent_id: &str) -> Heartbeat {
        Heartbeat {
            agent_id: agent_id.to_string(),
            kind: AgentKind::Node as i32,
            hostname: format!("{}.example.com", agent_id),
            addr: "10.0.0.1:3022".to_string(),
            timestamp_ms: 1_700_000_000_000,
            ..Default::default()
        }
    }

    fn handler(sink: Arc<RecordingSink>) -> HeartbeatHandler {
        HeartbeatHandler::new(sink, Telemetry::auth_grpc())
    }

    #[tokio::test]
    async fn test_clean_close_after_n_events() {
        let sink = Arc::new(RecordingSink::default());
        let events = stream::iter(vec![Ok(beat("a")), Ok(beat("b")), Ok(beat("c"))]);

        let summary = handler(sink.clone()).run(None, events).await.unwrap();

        assert_eq!(summary.events, 3);
        assert_eq!(*sink.seen.lock().await, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_empty_stream_is_clean() {
        let sink = Arc::new(RecordingSink::default());
        let events = stream::iter(Vec::<Result<Heartbeat, Status>>::new());

        let summary = handler(sink).run(None, events).await.unwrap();
        assert_eq!(summary, StreamSummary { events: 0 });
    }

    #[tokio::test]
    async fn test_receive_error_is_returned_unchanged() {
        let sink = Arc::new(RecordingSink::default());
        let events = stream::iter(vec![
            Ok(beat("a")),
            Ok(beat("b")),
            Err(Status::data_loss("connection reset by peer")),
            Ok(beat("never")),
        ]);

        let status = handler(sink.clone()).run(None, events).await.unwrap_err();

        assert_eq!(status.code(), tonic::Code::DataLoss);
        assert_eq!(status.message(), "connection reset by peer");
        assert_eq!(*sink.seen.lock().await, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_sink_error_terminates_stream() {
        let sink = Arc::new(RecordingSink {
            reject: Some("rogue"),
            ..Default::default()
        });
        let events = stream::iter(vec![Ok(beat("a")), Ok(beat("rogue")), Ok(beat("b"))]);

        let status = handler(sink.clone()).run(None, events).await.unwrap_err();

        assert_eq!(status.code(), tonic::Code::PermissionDenied);
        assert_eq!(*sink.seen.lock().await, vec!["a"]);
    }

    #[tokio::test]
    async fn test_events_processed_in_arrival_order() {
        let sink = Arc::new(RecordingSink::default());
        let ids: Vec<String> = (0..100).map(|i| format!("agent-{}", i)).collect();
        let events = stream::iter(ids.iter().map(|id| Ok(beat(id))).collect::<Vec<_>>());

        let summary = handler(sink.clone()).run(None, events).await.unwrap();

        assert_eq!(summary.events, 100);
        assert_eq!(*sink.seen.lock().await, ids);
    }

    #[tokio::test]
    async fn test_log_sink_accepts_everything() {
        let handler = HeartbeatHandler::new(Arc::new(LogSink), Telemetry::auth_grpc());
        let events = stream::iter(vec![Ok(beat("a")), Ok(beat("b"))]);

        let summary = handler.run(None, events).await.unwrap();
        assert_eq!(summary.events, 2);
    }

    fn closed_count(outcome: &str) -> u64 {
        HEARTBEAT_STREAMS_CLOSED_TOTAL
            .with_label_values(&[outcome])
            .get()
    }

    #[tokio::test]
    async fn test_dropped_stream_counts_as_reset() {
        let sink = Arc::new(RecordingSink::default());
        let events = stream::iter(vec![Ok(beat("a"))]).chain(stream::pending());
        let before = closed_count("reset");

        let result =
            tokio::time::timeout(Duration::from_millis(50), handler(sink.clone()).run(None, events))
                .await;

        assert!(result.is_err(), "stream never ends on its own");
        assert!(closed_count("reset") >= before + 1);
        assert_eq!(*sink.seen.lock().await, vec!["a"]);
    }

    #[tokio::test]
    async fn test_first_heartbeat_is_audited_once() {
        let log = Arc::new(MemoryLog::new());
        let handler = handler(Arc::new(RecordingSink::default())).with_audit(log.clone());
        let events = stream::iter(vec![Ok(beat("a")), Ok(beat("a")), Ok(beat("a"))]);

        handler.run(None, events).await.unwrap();

        let entries = log.query(&Filter::default()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].schema, "auth.attempt");
        assert_eq!(entries[0].property("user"), Some("a"));
        assert_eq!(entries[0].property("success"), Some("true"));
        assert!(entries[0].property(SESSION_ID).is_some());
    }

    #[tokio::test]
    async fn test_rejected_heartbeat_is_audited_as_failure() {
        let log = Arc::new(MemoryLog::new());
        let sink = Arc::new(RecordingSink {
            reject: Some("rogue"),
            ..Default::default()
        });
        let handler = handler(sink).with_audit(log.clone());
        let events = stream::iter(vec![Ok(beat("rogue"))]);

        handler.run(None, events).await.unwrap_err();

        let entries = log.query(&Filter::default()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].property("user"), Some("rogue"));
        assert_eq!(entries[0].property("success"), Some("false"));
        assert_eq!(entries[0].property("error"), Some("unknown agent"));
    }

    #[tokio::test]
    async fn test_each_stream_gets_its_own_session() {
        let log = Arc::new(MemoryLog::new());
        let handler = handler(Arc::new(RecordingSink::default())).with_audit(log.clone());

        handler.run(None, stream::iter(vec![Ok(beat("a"))])).await.unwrap();
        handler.run(None, stream::iter(vec![Ok(beat("a"))])).await.unwrap();

        let entries = log.query(&Filter::default()).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_ne!(entries[0].session_id(), entries[1].session_id());
    }
}
