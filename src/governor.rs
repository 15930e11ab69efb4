/// Rate-limit governor
///
/// Suspends the worker until the platform's rate-limit window has reset.
/// Nothing else runs in the lane while it waits.

use chrono::Utc;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone)]
pub struct RateLimitGovernor {
    max_wait: Duration,
}

impl RateLimitGovernor {
    pub fn new(max_wait: Duration) -> Self {
        Self { max_wait }
    }

    /// Time to wait at unix second `now` for a window resetting at `reset_at`.
    ///
    /// Reset times have whole-second resolution, so a pending reset waits one
    /// extra second to be sure the window has turned over.
    pub fn wait_duration(&self, reset_at: i64, now: i64) -> Duration {
        if reset_at < now {
            return Duration::ZERO;
        }
        let secs = (reset_at - now + 1) as u64;
        Duration::from_secs(secs).min(self.max_wait)
    }

    pub async fn await_reset(&self, reset_at: i64) {
        let wait = self.wait_duration(reset_at, Utc::now().timestamp());
        if wait.is_zero() {
            return;
        }

        log::warn!("Rate limit hit. Waiting {} seconds for reset...", wait.as_secs());
        sleep(wait).await;
        log::info!("Rate limit window passed. Resuming...");
    }
}

impl Default for RateLimitGovernor {
    fn default() -> Self {
        Self::new(Duration::from_secs(16 * 60))
    }
}
