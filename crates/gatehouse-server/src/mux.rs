//! Protocol Multiplexer
//!
//! Every inbound request on the shared listener passes through
//! [`Multiplexer`], which decides from transport metadata alone whether it
//! is gRPC or plain HTTP and forwards it, unmodified, to the matching
//! service.
//!
//! ## Classification
//!
//! A request is gRPC if and only if it arrived over HTTP/2 **and** its
//! `content-type` header contains `application/grpc`
//! (see <https://grpc.io/blog/coreos>). The version check runs first; any
//! other combination is plain HTTP. Classification is per request and keeps
//! no state between requests.
//!
//! ## Failures
//!
//! The multiplexer itself never fails. A downstream service error is
//! logged and turned into a `500` for that request only.

use axum::body::Body;
use bytes::Bytes;
use futures::future::BoxFuture;
use gatehouse_observability::metrics::{HANDLER_ERRORS_TOTAL, REQUESTS_DISPATCHED_TOTAL};
use http::header::CONTENT_TYPE;
use http::{Request, Response, StatusCode, Version};
use std::convert::Infallible;
use std::fmt;
use std::task::{Context, Poll};
use tower::{Service, ServiceExt};
use tracing::{trace, warn};

/// Media-type token that marks gRPC traffic.
pub const GRPC_CONTENT_TYPE: &str = "application/grpc";

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Wire protocol of an inbound request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Grpc,
    Http,
}

impl Protocol {
    /// Classify a request from its HTTP version and `content-type` header.
    pub fn classify<B>(request: &Request<B>) -> Self {
        if request.version() != Version::HTTP_2 {
            return Protocol::Http;
        }

        let is_grpc = request
            .headers()
            .get(CONTENT_TYPE)
            .is_some_and(|value| contains(value.as_bytes(), GRPC_CONTENT_TYPE.as_bytes()));

        if is_grpc {
            Protocol::Grpc
        } else {
            Protocol::Http
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Grpc => "grpc",
            Protocol::Http => "http",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

/// Routes each request to the gRPC service `G` or the HTTP service `H`.
///
/// Both services are cloned per request, so the multiplexer holds no locks
/// and requests on different connections are dispatched fully in parallel.
#[derive(Debug, Clone)]
pub struct Multiplexer<G, H> {
    grpc: G,
    http: H,
}

impl<G, H> Multiplexer<G, H> {
    pub fn new(grpc: G, http: H) -> Self {
        Self { grpc, http }
    }
}

impl<G, H, GB, HB> Service<Request<Body>> for Multiplexer<G, H>
where
    G: Service<Request<Body>, Response = Response<GB>> + Clone + Send + 'static,
    G::Error: Into<BoxError>,
    G::Future: Send + 'static,
    GB: http_body::Body<Data = Bytes> + Send + 'static,
    GB::Error: Into<BoxError>,
    H: Service<Request<Body>, Response = Response<HB>> + Clone + Send + 'static,
    H::Error: Into<BoxError>,
    H::Future: Send + 'static,
    HB: http_body::Body<Data = Bytes> + Send + 'static,
    HB::Error: Into<BoxError>,
{
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response<Body>, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Readiness is checked on the chosen service in `dispatch`.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let protocol = Protocol::classify(&request);
        REQUESTS_DISPATCHED_TOTAL
            .with_label_values(&[protocol.as_str()])
            .inc();
        trace!(
            %protocol,
            version = ?request.version(),
            path = %request.uri().path(),
            "Dispatching request"
        );

        match protocol {
            Protocol::Grpc => Box::pin(dispatch(self.grpc.clone(), request, protocol)),
            Protocol::Http => Box::pin(dispatch(self.http.clone(), request, protocol)),
        }
    }
}

async fn dispatch<S, B>(
    service: S,
    request: Request<Body>,
    protocol: Protocol,
) -> Result<Response<Body>, Infallible>
where
    S: Service<Request<Body>, Response = Response<B>>,
    S::Error: Into<BoxError>,
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    match service.oneshot(request).await {
        Ok(response) => Ok(response.map(Body::new)),
        Err(e) => {
            let error: BoxError = e.into();
            HANDLER_ERRORS_TOTAL
                .with_label_values(&[protocol.as_str()])
                .inc();
            warn!(%protocol, error = %error, "Request handler failed");
            Ok(handler_failure())
        }
    }
}

fn handler_failure() -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}
