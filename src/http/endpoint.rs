//! Infallible request endpoints.

use axum::extract::Request;
use axum::response::Response;
use futures::future::BoxFuture;
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Future returned by an endpoint.
pub type BoxResponseFuture = BoxFuture<'static, Response>;

/// Something that turns a request into exactly one response.
///
/// Endpoints cannot fail: every error has already been mapped to a response
/// by the time a value leaves an endpoint.
pub trait Endpoint: Send + Sync + 'static {
    fn call(&self, request: Request) -> BoxResponseFuture;
}

impl<F, Fut> Endpoint for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn call(&self, request: Request) -> BoxResponseFuture {
        Box::pin((self)(request))
    }
}

/// A composed endpoint shared across concurrently handled requests.
pub type SharedEndpoint = Arc<dyn Endpoint>;

/// Adapts a [`SharedEndpoint`] to a `tower::Service` so it can be mounted
/// on an axum router.
#[derive(Clone)]
pub struct EndpointService(SharedEndpoint);

impl EndpointService {
    pub fn new(endpoint: SharedEndpoint) -> Self {
        Self(endpoint)
    }
}

impl tower::Service<Request> for EndpointService {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let response = self.0.call(request);
        Box::pin(async move { Ok(response.await) })
    }
}
