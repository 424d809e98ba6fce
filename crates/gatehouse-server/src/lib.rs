//! Gatehouse Front End
//!
//! One listener for the auth server: gRPC from agents and plain HTTP from
//! everything else.
//!
//! - [`mux`]: per-request protocol classification and dispatch
//! - [`heartbeat`]: receive loop for agent heartbeat streams
//! - [`services`]: the `AuthService` gRPC implementation
//! - [`api`]: plain-HTTP routes (health, audit events, metrics)
//! - [`server`]: wires the above into a [`FrontEndServer`]
//!
//! ## Usage
//!
//! ```ignore
//! use gatehouse_server::{ApiConfig, FrontEndServer, LogSink, Telemetry};
//!
//! let audit_log = gatehouse_events::open(config.audit).await?;
//! let server = FrontEndServer::new(
//!     ApiConfig::new(audit_log),
//!     Arc::new(LogSink),
//!     Telemetry::auth_grpc(),
//! );
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3025").await?;
//! server.serve(listener, shutdown_signal_future).await?;
//! ```

pub mod api;
pub mod config;
pub mod heartbeat;
pub mod mux;
pub mod server;
pub mod services;
pub mod shutdown;
pub mod telemetry;

pub use api::{create_router, ApiConfig, ApiError};
pub use config::{ConfigError, LogFormat, ServerConfig};
pub use heartbeat::{HeartbeatHandler, HeartbeatSink, LogSink, StreamSummary};
pub use mux::{Multiplexer, Protocol};
pub use server::{FrontEnd, FrontEndServer};
pub use services::AuthGrpcService;
pub use shutdown::{GracefulShutdown, ShutdownHandle, ShutdownSignal};
pub use telemetry::{init_logging, Telemetry};
