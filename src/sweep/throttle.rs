//! Throttle / backoff controller
//!
//! Paces activations so the host never sees a burst of rapid clicks:
//! randomized spacing between items, a cooldown every `batch_size` visits,
//! escalating backoff after consecutive load misses, and a full pause while
//! the page is in the background.
//!
//! One controller is shared by every sweep in the process, so the miss
//! counter carries over from one sweep to the next.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::host::HostPage;
use crate::infrastructure::config::ThrottleConfig;

#[derive(Debug)]
pub struct ThrottleController {
    config: ThrottleConfig,
    consecutive_misses: AtomicU32,
}

impl ThrottleController {
    pub const fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            consecutive_misses: AtomicU32::new(0),
        }
    }

    /// Base delay plus uniform jitter in `[0, jitter]`
    pub fn inter_item_delay(&self) -> Duration {
        let jitter = if self.config.jitter_ms == 0 {
            0
        } else {
            fastrand::u64(0..=self.config.jitter_ms)
        };
        self.config.base_delay() + Duration::from_millis(jitter)
    }

    /// Records a load miss, returns the new consecutive count
    pub fn on_miss(&self) -> u32 {
        self.consecutive_misses.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn on_success(&self) {
        self.consecutive_misses.store(0, Ordering::SeqCst);
    }

    pub fn consecutive_misses(&self) -> u32 {
        self.consecutive_misses.load(Ordering::SeqCst)
    }

    /// `None` below the threshold, otherwise `misses × step` capped at the ceiling
    pub fn backoff_delay(&self, misses: u32) -> Option<Duration> {
        if misses < self.config.miss_threshold.max(1) {
            return None;
        }
        let step = self.config.backoff_step_ms.saturating_mul(u64::from(misses));
        Some(Duration::from_millis(step).min(self.config.max_backoff()))
    }

    /// Sleeps out the backoff when the threshold is reached, then resets the counter
    pub async fn maybe_backoff(&self) -> Option<Duration> {
        let misses = self.consecutive_misses();
        let delay = self.backoff_delay(misses)?;
        warn!(
            "⏳ {} consecutive load failures, backing off for {}ms",
            misses,
            delay.as_millis()
        );
        sleep(delay).await;
        self.consecutive_misses.store(0, Ordering::SeqCst);
        Some(delay)
    }

    /// Whether a cooldown is owed after `visits` activations
    pub const fn cooldown_due(&self, visits: u32) -> bool {
        self.config.batch_size > 0 && visits > 0 && visits % self.config.batch_size == 0
    }

    pub async fn batch_cooldown(&self) -> Duration {
        let pause = self.config.batch_cooldown();
        info!(
            "☕ Batch of {} visits done, cooling down for {}ms",
            self.config.batch_size,
            pause.as_millis()
        );
        sleep(pause).await;
        pause
    }

    /// Blocks while the page is in the background; returns the time spent waiting
    pub async fn pause_if_hidden(&self, page: &dyn HostPage) -> Duration {
        let started = Instant::now();
        if page.is_foreground().await {
            return Duration::ZERO;
        }

        debug!("Page hidden, pausing sweep");
        while !page.is_foreground().await {
            sleep(self.config.hidden_poll()).await;
        }
        let waited = started.elapsed();
        debug!("Page visible again after {}ms", waited.as_millis());
        waited
    }
}

impl Default for ThrottleController {
    fn default() -> Self {
        Self::new(ThrottleConfig::default())
    }
}
