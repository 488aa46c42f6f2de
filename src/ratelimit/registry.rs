//! Per-client limiter state management.

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::backend::RateLimiterBackend;
use super::bucket::TokenBucket;
use super::limiter::LimiterConfig;

/// Limiter state tracked for a single client identity.
#[derive(Debug, Clone)]
pub struct ClientLimiterState {
    /// Token bucket gating this client's requests
    bucket: TokenBucket,
    /// Most recent admitted-or-denied request from this client
    last_seen: Instant,
}

impl ClientLimiterState {
    fn new(config: &LimiterConfig, now: Instant) -> Self {
        Self {
            bucket: TokenBucket::new(config.interval, config.burst, now),
            last_seen: now,
        }
    }

    /// Record an observation and try to consume a token.
    fn observe(&mut self, now: Instant) -> bool {
        if now > self.last_seen {
            self.last_seen = now;
        }
        self.bucket.try_acquire(now)
    }

    /// The client's token bucket.
    pub fn bucket(&self) -> &TokenBucket {
        &self.bucket
    }

    /// When this client was last observed.
    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }
}

/// Registry mapping client identities to their limiter state.
///
/// The map is sharded by identity hash. Every operation on an entry holds its
/// shard's write lock for the whole read-modify-write, so concurrent calls for
/// the same identity are totally ordered against the token state and against
/// eviction. This struct is thread-safe and can be shared across tasks.
pub struct LimiterRegistry {
    /// Limiter state indexed by client identity
    clients: DashMap<String, ClientLimiterState>,
    /// Policy applied to every client
    config: LimiterConfig,
}

impl LimiterRegistry {
    /// Create an empty registry.
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            clients: DashMap::new(),
            config,
        }
    }

    /// Decide whether `identity` may proceed right now.
    pub fn admit(&self, identity: &str) -> bool {
        self.admit_at(identity, Instant::now())
    }

    /// Decide whether `identity` may proceed at `now`.
    ///
    /// Creates the client's state on first sight, refreshes its last-seen
    /// time whether or not the request is admitted, and consumes one token if
    /// one is available.
    pub fn admit_at(&self, identity: &str, now: Instant) -> bool {
        let mut created = false;
        let admitted = match self.clients.get_mut(identity) {
            Some(mut state) => state.observe(now),
            None => {
                // Another caller may have inserted between the lookup and here;
                // `entry` re-checks under the shard lock.
                let mut state = self.clients.entry(identity.to_owned()).or_insert_with(|| {
                    created = true;
                    ClientLimiterState::new(&self.config, now)
                });
                state.observe(now)
            }
        };

        // Log only once the shard lock is released.
        if created {
            debug!(
                identity = %identity,
                interval = ?self.config.interval,
                burst = self.config.burst,
                "Tracking new client"
            );
        }
        trace!(identity = %identity, admitted, "Admission decision");
        admitted
    }

    /// Evict clients idle for longer than the configured idle timeout.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Evict clients whose last-seen time is more than the idle timeout
    /// before `now`. Returns the number of evicted clients.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let idle_timeout = self.config.idle_timeout();
        let mut evicted = Vec::new();

        self.clients.retain(|identity, state| {
            let idle = now.saturating_duration_since(state.last_seen);
            let keep = idle <= idle_timeout;
            if !keep {
                evicted.push(identity.clone());
            }
            keep
        });

        for identity in &evicted {
            trace!(identity = %identity, "Evicted idle client");
        }
        evicted.len()
    }

    /// Number of tracked clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no clients are tracked.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Whether `identity` currently has state in the registry.
    pub fn contains(&self, identity: &str) -> bool {
        self.clients.contains_key(identity)
    }

    /// When `identity` was last observed, if it is tracked.
    pub fn last_seen(&self, identity: &str) -> Option<Instant> {
        self.clients.get(identity).map(|state| state.last_seen)
    }

    /// Copy of the state tracked for `identity`.
    pub fn snapshot(&self, identity: &str) -> Option<ClientLimiterState> {
        self.clients.get(identity).map(|state| state.value().clone())
    }

    /// Fractional tokens held by `identity` as of its last observation.
    pub fn tokens(&self, identity: &str) -> Option<f64> {
        self.clients.get(identity).map(|state| state.bucket.tokens())
    }

    /// The policy applied by this registry.
    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Drop all tracked clients.
    pub fn clear(&self) {
        self.clients.clear();
    }
}

impl RateLimiterBackend for LimiterRegistry {
    fn admit(&self, identity: &str) -> bool {
        LimiterRegistry::admit(self, identity)
    }
}
