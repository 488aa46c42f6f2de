//! Middleware composition.
//!
//! A [`MiddlewareChain`] is an ordered list of [`Middleware`] wrappers. The
//! first wrapper pushed is the outermost one: it sees the request first and
//! the response last. [`MiddlewareChain::build`] folds the wrappers around a
//! terminal endpoint once, at setup time, producing a single shared endpoint
//! that is never re-wrapped per request.
//!
//! Contains middleware for:
//! - Per-client rate limiting
//! - Client IP logging context

mod client_ip;
mod rate_limit;

pub use client_ip::ClientIpSpan;
pub use rate_limit::RateLimitMiddleware;

use axum::extract::Request;
use std::future::Future;
use std::sync::Arc;

use super::endpoint::{BoxResponseFuture, Endpoint, SharedEndpoint};

/// The remainder of the chain, handed to each wrapper.
#[derive(Clone)]
pub struct Next {
    inner: SharedEndpoint,
}

impl Next {
    /// Run the rest of the chain.
    pub fn run(self, request: Request) -> BoxResponseFuture {
        self.inner.call(request)
    }
}

/// A request-intercepting wrapper.
///
/// A wrapper may inspect or modify the request, call `next.run` to continue,
/// and inspect or modify the response. It may also short-circuit by returning
/// a response without calling `next` at all.
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, request: Request, next: Next) -> BoxResponseFuture;
}

impl<F, Fut> Middleware for F
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = axum::response::Response> + Send + 'static,
{
    fn handle(&self, request: Request, next: Next) -> BoxResponseFuture {
        Box::pin((self)(request, next))
    }
}

/// A wrapper bound to the endpoint it wraps.
struct Wrapped {
    middleware: Arc<dyn Middleware>,
    next: Next,
}

impl Endpoint for Wrapped {
    fn call(&self, request: Request) -> BoxResponseFuture {
        self.middleware.handle(request, self.next.clone())
    }
}

/// Ordered list of middleware wrappers.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    layers: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a wrapper. It runs inside every wrapper already pushed.
    pub fn push<M: Middleware>(&mut self, middleware: M) {
        self.layers.push(Arc::new(middleware));
    }

    /// Number of wrappers in the chain.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Fold the wrappers around `terminal`, innermost last.
    pub fn build(&self, terminal: SharedEndpoint) -> SharedEndpoint {
        self.layers.iter().rev().fold(terminal, |inner, middleware| -> SharedEndpoint {
            Arc::new(Wrapped {
                middleware: middleware.clone(),
                next: Next { inner },
            })
        })
    }
}
