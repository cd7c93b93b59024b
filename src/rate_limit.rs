//! Per-source politeness throttling.
//!
//! [`RateLimiter::wait`] suspends the caller until the configured minimum
//! interval has passed since the previous call for the same key. Each key owns
//! an async mutex that stays locked across the wait *and* the timestamp update,
//! so concurrent workers hitting the same source are strictly serialized.
//! Keys never share state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{Instant, sleep};
use tracing::debug;

/// Default minimum spacing between two requests to the same source.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(1);

type Slot = Arc<AsyncMutex<Option<Instant>>>;

#[derive(Debug)]
pub struct RateLimiter {
    default_interval: Duration,
    intervals: HashMap<String, Duration>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}

impl RateLimiter {
    pub fn new(default_interval: Duration) -> Self {
        Self {
            default_interval,
            intervals: HashMap::new(),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Override the interval for one key.
    pub fn with_interval(mut self, key: impl Into<String>, interval: Duration) -> Self {
        self.intervals.insert(key.into(), interval);
        self
    }

    pub fn interval_for(&self, key: &str) -> Duration {
        self.intervals
            .get(key)
            .copied()
            .unwrap_or(self.default_interval)
    }

    /// Block until `key` may issue another request, then mark it as used.
    pub async fn wait(&self, key: &str) {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(key.to_string()).or_default())
        };

        let mut last = slot.lock().await;
        if let Some(previous) = *last {
            let interval = self.interval_for(key);
            let elapsed = previous.elapsed();
            if elapsed < interval {
                let delay = interval - elapsed;
                debug!(key, ?delay, "Rate limiting");
                sleep(delay).await;
            }
        }
        *last = Some(Instant::now());
    }
}
