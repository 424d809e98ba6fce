//! Front-End Server
//!
//! Assembles the gRPC routes and the plain-HTTP router behind one
//! [`Multiplexer`] and serves it on a single listener.

use axum::{Router, ServiceExt as _};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tonic::service::Routes;
use tower::ServiceBuilder;
use tower_http::catch_panic::{CatchPanic, CatchPanicLayer, DefaultResponseForPanic};
use tracing::info;

use gatehouse_proto::auth_service_server::AuthServiceServer;

use crate::api::{create_router, ApiConfig};
use crate::heartbeat::{HeartbeatHandler, HeartbeatSink};
use crate::mux::Multiplexer;
use crate::services::AuthGrpcService;
use crate::telemetry::Telemetry;

pub type GrpcRoutes = CatchPanic<Routes, DefaultResponseForPanic>;
pub type HttpRouter = CatchPanic<Router, DefaultResponseForPanic>;

/// Combined service handed to the listener
pub type FrontEnd = Multiplexer<GrpcRoutes, HttpRouter>;

/// gRPC and plain HTTP on one port
///
/// Heartbeat streams record their auth attempts in the API's audit log.
/// The routing tables are built once in [`new`](Self::new) and never change;
/// every connection works on clones.
pub struct FrontEndServer {
    service: FrontEnd,
    telemetry: Telemetry,
}

impl FrontEndServer {
    pub fn new(api: ApiConfig, heartbeats: Arc<dyn HeartbeatSink>, telemetry: Telemetry) -> Self {
        gatehouse_observability::init();

        let handler = HeartbeatHandler::new(heartbeats, telemetry.clone())
            .with_audit(api.audit_log.clone());

        let http = ServiceBuilder::new()
            .layer(CatchPanicLayer::new())
            .service(create_router(api));

        let grpc = ServiceBuilder::new()
            .layer(CatchPanicLayer::new())
            .service(Routes::new(AuthServiceServer::new(AuthGrpcService::new(handler))));

        Self {
            service: Multiplexer::new(grpc, http),
            telemetry,
        }
    }

    /// A clone of the combined service, for embedding or driving with
    /// `tower::ServiceExt::oneshot`.
    pub fn multiplexer(&self) -> FrontEnd {
        self.service.clone()
    }

    /// Accept connections on `listener` until `shutdown` completes.
    ///
    /// Once `shutdown` fires no new connections are accepted; the returned
    /// future finishes after the open ones close. Callers that need a bound
    /// on that wait use [`GracefulShutdown::drain`](crate::shutdown::GracefulShutdown::drain).
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(
            parent: self.telemetry.span(),
            addr = ?listener.local_addr().ok(),
            "Front end listening (gRPC + HTTP)"
        );

        axum::serve(
            listener,
            self.service
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
    }
}
