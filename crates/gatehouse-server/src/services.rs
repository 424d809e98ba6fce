use crate::heartbeat::HeartbeatHandler;
use axum::extract::ConnectInfo;
use futures::{future, stream, FutureExt, Stream, StreamExt};
use gatehouse_proto::auth_service_server::AuthService;
use gatehouse_proto::{Heartbeat, HeartbeatAck};
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, error, Instrument};

pub type HeartbeatAckStream = Pin<Box<dyn Stream<Item = Result<HeartbeatAck, Status>> + Send>>;

/// gRPC service of the auth server front end
///
/// Only heartbeat ingestion is exposed here. Each call gets its own receive
/// loop; the service itself holds no per-connection state.
#[derive(Clone)]
pub struct AuthGrpcService {
    heartbeats: HeartbeatHandler,
}

impl AuthGrpcService {
    pub fn new(heartbeats: HeartbeatHandler) -> Self {
        Self { heartbeats }
    }
}

/// Remote address of the caller, when the transport recorded one.
fn peer_addr<T>(request: &Request<T>) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
        .or_else(|| request.remote_addr())
}

#[tonic::async_trait]
impl AuthService for AuthGrpcService {
    type ConnectHeartbeatStream = HeartbeatAckStream;

    #[tracing::instrument(skip(self, request))]
    async fn connect_heartbeat(
        &self,
        request: Request<Streaming<Heartbeat>>,
    ) -> Result<Response<Self::ConnectHeartbeatStream>, Status> {
        let peer = peer_addr(&request);
        debug!(peer = ?peer, "Heartbeat stream opened");

        let handler = self.heartbeats.clone();
        let events = request.into_inner();

        // No acks are ever sent. The stream stays silent until the receive
        // loop finishes and then yields its error, if any, as the trailers.
        // The loop runs while the response body is polled, outside the
        // service future, so a panic there is caught here.
        let outcome = AssertUnwindSafe(async move { handler.run(peer, events).await })
            .catch_unwind()
            .map(move |result| {
                result.unwrap_or_else(|_| {
                    error!(peer = ?peer, "Heartbeat handler panicked");
                    Err(Status::internal("heartbeat handler panicked"))
                })
            })
            .in_current_span();
        let acks = stream::once(outcome)
            .filter_map(|result| future::ready(result.err().map(Err::<HeartbeatAck, Status>)));

        Ok(Response::new(Box::pin(acks)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_addr_prefers_connect_info() {
        let addr: SocketAddr = "10.1.2.3:40000".parse().unwrap();
        let mut request = Request::new(());
        request.extensions_mut().insert(ConnectInfo(addr));
        assert_eq!(peer_addr(&request), Some(addr));
    }

    #[test]
    fn test_peer_addr_missing() {
        let request = Request::new(());
        assert_eq!(peer_addr(&request), None);
    }
}
