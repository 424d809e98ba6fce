//! Gatehouse Protocol Buffer Definitions
//!
//! gRPC service definitions and message types exchanged between the auth
//! server front end and its registered agents (nodes and proxies).
//!
//! ## Services
//!
//! - **AuthService**
//!   - `ConnectHeartbeat`: long-lived bidirectional stream; agents send
//!     [`Heartbeat`] messages, the server only returns a terminal status.
//!
//! ## Usage
//!
//! ### Client-side (agent)
//!
//! ```ignore
//! use gatehouse_proto::{auth_service_client::AuthServiceClient, AgentKind, Heartbeat};
//!
//! let mut client = AuthServiceClient::connect("http://localhost:3025").await?;
//!
//! let beats = tokio_stream::iter(vec![Heartbeat {
//!     agent_id: "node-1".to_string(),
//!     kind: AgentKind::Node as i32,
//!     ..Default::default()
//! }]);
//!
//! let mut status = client.connect_heartbeat(beats).await?.into_inner();
//! assert!(status.message().await?.is_none());
//! ```
//!
//! ### Server-side
//!
//! ```ignore
//! use gatehouse_proto::auth_service_server::{AuthService, AuthServiceServer};
//! ```

tonic::include_proto!("gatehouse");

/// Fully qualified gRPC service name, as it appears in request paths.
pub const AUTH_SERVICE_NAME: &str = "gatehouse.AuthService";

/// Request path of the heartbeat method.
pub const CONNECT_HEARTBEAT_PATH: &str = "/gatehouse.AuthService/ConnectHeartbeat";
