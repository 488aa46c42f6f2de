//! Admission trait for abstracting over limiter handles.

/// Trait for rate limiter implementations.
///
/// This trait abstracts over the bare `LimiterRegistry` and the
/// `ClientRateLimiter` that owns a background sweeper, so the rate limit
/// middleware can work with either.
pub trait RateLimiterBackend: Send + Sync {
    /// Decide whether the client identified by `identity` may proceed.
    ///
    /// Implementations must not block on I/O.
    fn admit(&self, identity: &str) -> bool;
}
