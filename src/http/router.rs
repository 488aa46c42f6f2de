//! Route registration over an axum router.

use tracing::debug;

use super::endpoint::{EndpointService, SharedEndpoint};
use super::handler::{dispatch, Handler};
use super::middleware::{Middleware, MiddlewareChain};

/// Binds exact paths to handlers wrapped in the configured middleware.
///
/// Each route is composed when it is added, using the middleware registered
/// so far. Middleware registered after a route was added does not apply to
/// that route:
///
/// ```ignore
/// let router = Router::new()
///     .add("/health", health)            // no middleware
///     .use_middleware(rate_limit)
///     .add("/api", api);                 // rate limited
/// ```
pub struct Router {
    inner: axum::Router,
    chain: MiddlewareChain,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            inner: axum::Router::new(),
            chain: MiddlewareChain::new(),
        }
    }

    /// Append a wrapper for routes added from now on.
    pub fn use_middleware<M: Middleware>(mut self, middleware: M) -> Self {
        self.chain.push(middleware);
        self
    }

    /// Bind a fallible handler to `path` for every method.
    ///
    /// # Panics
    ///
    /// Panics if `path` is empty, does not start with `/`, or is already
    /// bound (as axum does).
    pub fn add<H: Handler>(self, path: &str, handler: H) -> Self {
        self.add_endpoint(path, dispatch(handler))
    }

    /// Bind an infallible endpoint to `path` through the current chain.
    pub fn add_endpoint(mut self, path: &str, endpoint: SharedEndpoint) -> Self {
        debug!(path = %path, middleware = self.chain.len(), "Registering route");

        let composed = self.chain.build(endpoint);
        self.inner = self.inner.route_service(path, EndpointService::new(composed));
        self
    }

    /// Consume the router, yielding the underlying axum router.
    pub fn into_axum(self) -> axum::Router {
        self.inner
    }
}
