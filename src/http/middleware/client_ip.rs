//! Client IP logging context.

use axum::extract::Request;
use tracing::{field, info_span, Instrument};

use super::{Middleware, Next};
use crate::http::endpoint::BoxResponseFuture;
use crate::identity::IdentityResolver;

/// Runs the rest of the chain inside a `request` span carrying the method,
/// path and resolved client IP, so every event logged while handling the
/// request is attributed to its client.
///
/// Requests whose client cannot be identified still proceed; the span simply
/// has no `client_ip`.
pub struct ClientIpSpan {
    resolver: IdentityResolver,
}

impl ClientIpSpan {
    pub fn new(resolver: IdentityResolver) -> Self {
        Self { resolver }
    }
}

impl Middleware for ClientIpSpan {
    fn handle(&self, request: Request, next: Next) -> BoxResponseFuture {
        let span = info_span!(
            "request",
            method = %request.method(),
            path = %request.uri().path(),
            client_ip = field::Empty,
        );
        if let Ok(ip) = self.resolver.resolve(&request) {
            span.record("client_ip", field::display(ip));
        }

        Box::pin(next.run(request).instrument(span))
    }
}
