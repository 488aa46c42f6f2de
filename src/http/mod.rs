//! HTTP plumbing: endpoints, error dispatch, middleware and routing.

mod endpoint;
mod handler;
pub mod middleware;
mod router;

pub use endpoint::{BoxResponseFuture, Endpoint, EndpointService, SharedEndpoint};
pub use handler::{dispatch, Handler, HandlerError};
pub use middleware::{ClientIpSpan, Middleware, MiddlewareChain, Next, RateLimitMiddleware};
pub use router::Router;
