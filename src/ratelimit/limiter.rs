//! Client rate limiter with an owned background sweeper.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::backend::RateLimiterBackend;
use super::registry::LimiterRegistry;
use super::sweeper::Sweeper;
use crate::error::{RatekeeperError, Result};

/// Default minimum interval between admitted requests per client.
const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
/// Default burst capacity.
const DEFAULT_BURST: u32 = 1;
/// Sweep period as a multiple of the interval.
const SWEEP_INTERVAL_FACTOR: u32 = 5;
/// Idle timeout as a multiple of the interval.
const IDLE_TIMEOUT_FACTOR: u32 = 10;

/// Configuration for per-client rate limiting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterConfig {
    /// Time to accrue one token
    pub interval: Duration,
    /// Maximum tokens a client can hold
    pub burst: u32,
    /// How often idle clients are swept (defaults to `5 * interval`)
    pub sweep_interval: Option<Duration>,
    /// How long a client may stay idle before eviction (defaults to `10 * interval`)
    pub idle_timeout: Option<Duration>,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

impl LimiterConfig {
    /// Create a configuration admitting one request per `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            burst: DEFAULT_BURST,
            sweep_interval: None,
            idle_timeout: None,
        }
    }

    pub fn with_burst(mut self, burst: u32) -> Self {
        self.burst = burst;
        self
    }

    pub fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = Some(sweep_interval);
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = Some(idle_timeout);
        self
    }

    /// Effective sweep period.
    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
            .unwrap_or_else(|| self.interval.saturating_mul(SWEEP_INTERVAL_FACTOR))
    }

    /// Effective idle timeout.
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
            .unwrap_or_else(|| self.interval.saturating_mul(IDLE_TIMEOUT_FACTOR))
    }

    /// Reject configurations that cannot be enforced.
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(RatekeeperError::Config(
                "rate limit interval must be greater than zero".to_string(),
            ));
        }
        if self.burst == 0 {
            return Err(RatekeeperError::Config(
                "rate limit burst must be at least 1".to_string(),
            ));
        }
        if self.sweep_interval().is_zero() {
            return Err(RatekeeperError::Config(
                "sweep interval must be greater than zero".to_string(),
            ));
        }
        if self.idle_timeout().is_zero() {
            return Err(RatekeeperError::Config(
                "idle timeout must be greater than zero".to_string(),
            ));
        }
        // Eviction resets a bucket to full; it must not precede a full refill.
        let refill = self.interval.saturating_mul(self.burst);
        if self.idle_timeout() < refill {
            return Err(RatekeeperError::Config(format!(
                "idle timeout ({:?}) must be at least interval * burst ({:?})",
                self.idle_timeout(),
                refill
            )));
        }
        Ok(())
    }
}

/// A per-client rate limiter that owns its registry's sweeper.
///
/// Starting the limiter spawns the sweeper; shutting it down (or dropping
/// it) stops the sweeper. The registry itself is shared, so callers can
/// inspect it independently of the limiter's lifetime.
pub struct ClientRateLimiter {
    registry: Arc<LimiterRegistry>,
    sweeper: Sweeper,
}

impl ClientRateLimiter {
    /// Validate `config`, create a registry and start sweeping it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: LimiterConfig) -> Result<Self> {
        config.validate()?;

        info!(
            interval = ?config.interval,
            burst = config.burst,
            sweep_interval = ?config.sweep_interval(),
            idle_timeout = ?config.idle_timeout(),
            "Starting client rate limiter"
        );

        let registry = Arc::new(LimiterRegistry::new(config));
        let sweeper = Sweeper::spawn(registry.clone());

        Ok(Self { registry, sweeper })
    }

    /// Decide whether `identity` may proceed right now.
    pub fn admit(&self, identity: &str) -> bool {
        self.registry.admit(identity)
    }

    /// The underlying registry.
    pub fn registry(&self) -> &Arc<LimiterRegistry> {
        &self.registry
    }

    /// The policy this limiter enforces.
    pub fn config(&self) -> &LimiterConfig {
        self.registry.config()
    }

    /// Stop the background sweeper and wait for it to exit.
    pub async fn shutdown(&self) {
        self.sweeper.shutdown().await;
    }
}

impl RateLimiterBackend for ClientRateLimiter {
    fn admit(&self, identity: &str) -> bool {
        ClientRateLimiter::admit(self, identity)
    }
}
