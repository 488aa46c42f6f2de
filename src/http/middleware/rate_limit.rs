//! Rate Limiting Middleware
//!
//! Gates requests through a per-client rate limiter keyed by the resolved
//! client IP address. Denied requests get an empty 429; requests whose client
//! cannot be identified get an empty 500 rather than sharing a fallback
//! bucket.

use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use futures::future::{self, FutureExt};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{Middleware, Next};
use crate::http::endpoint::BoxResponseFuture;
use crate::identity::IdentityResolver;
use crate::ratelimit::RateLimiterBackend;

/// Middleware admitting at most the configured rate per client.
pub struct RateLimitMiddleware<R: RateLimiterBackend + ?Sized> {
    limiter: Arc<R>,
    resolver: IdentityResolver,
}

impl<R: RateLimiterBackend + ?Sized> RateLimitMiddleware<R> {
    pub fn new(limiter: Arc<R>, resolver: IdentityResolver) -> Self {
        Self { limiter, resolver }
    }
}

impl<R: RateLimiterBackend + ?Sized + 'static> Middleware for RateLimitMiddleware<R> {
    fn handle(&self, request: Request, next: Next) -> BoxResponseFuture {
        let identity = match self.resolver.identity(&request) {
            Ok(identity) => identity,
            Err(err) => {
                warn!(
                    error = %err,
                    path = %request.uri().path(),
                    "Rejecting request from unidentifiable client"
                );
                return reply(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };

        if !self.limiter.admit(&identity) {
            debug!(client_ip = %identity, "Rate limit exceeded");
            return reply(StatusCode::TOO_MANY_REQUESTS);
        }

        next.run(request)
    }
}

fn reply(status: StatusCode) -> BoxResponseFuture {
    future::ready(status.into_response()).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Endpoint, MiddlewareChain, SharedEndpoint};
    use crate::ratelimit::{LimiterConfig, LimiterRegistry};
    use axum::body::{to_bytes, Body};
    use axum::extract::ConnectInfo;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn setup() -> (Arc<LimiterRegistry>, Arc<AtomicUsize>, SharedEndpoint) {
        let registry = Arc::new(LimiterRegistry::new(LimiterConfig::new(Duration::from_secs(60))));
        let hits = Arc::new(AtomicUsize::new(0));

        let mut chain = MiddlewareChain::new();
        chain.push(RateLimitMiddleware::new(
            registry.clone(),
            IdentityResolver::default(),
        ));

        let counter = hits.clone();
        let endpoint = chain.build(Arc::new(move |_request: Request| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { StatusCode::OK.into_response() }
        }));

        (registry, hits, endpoint)
    }

    fn request_from(ip: &str) -> Request {
        Request::builder()
            .uri("/")
            .header("X-Real-IP", ip)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_second_request_is_rejected() {
        let (registry, hits, endpoint) = setup();

        let first = endpoint.call(request_from("203.0.113.5")).await;
        let second = endpoint.call(request_from("203.0.113.5")).await;

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = to_bytes(second.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(registry.contains("203.0.113.5"));
    }

    #[tokio::test]
    async fn test_clients_are_limited_independently() {
        let (_registry, hits, endpoint) = setup();

        let a = endpoint.call(request_from("203.0.113.5")).await;
        let b = endpoint.call(request_from("198.51.100.9")).await;

        assert_eq!(a.status(), StatusCode::OK);
        assert_eq!(b.status(), StatusCode::OK);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_peer_address_is_used_without_headers() {
        let (registry, _hits, endpoint) = setup();

        let mut request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let peer: SocketAddr = "192.0.2.10:40000".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));

        let response = endpoint.call(request).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(registry.contains("192.0.2.10"));
    }

    #[tokio::test]
    async fn test_unidentifiable_client_is_rejected() {
        let (registry, hits, endpoint) = setup();

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = endpoint.call(request).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(registry.is_empty());
    }
}
