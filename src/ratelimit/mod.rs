//! Per-client rate limiting and state management.

mod backend;
mod bucket;
mod limiter;
mod registry;
mod sweeper;

pub use backend::RateLimiterBackend;
pub use bucket::TokenBucket;
pub use limiter::{ClientRateLimiter, LimiterConfig};
pub use registry::{ClientLimiterState, LimiterRegistry};
pub use sweeper::Sweeper;
