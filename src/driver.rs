//! Trigger driver
//!
//! Decides when sweeps and classification passes run: on startup, when the
//! settings change, on a periodic tick and when the host navigates into the
//! jobs area. Sweeps are spawned so the driver keeps serving its triggers
//! while one runs.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::classify::CardFilter;
use crate::domain::{FilterSettings, ItemKey, LiveSettings, SettingsSource, SweepOutcome};
use crate::host::HostPage;
use crate::infrastructure::config::{DriverConfig, SelectorConfig, SweepConfig};
use crate::sweep::{ProgressSink, SweepContext, SweepOrchestrator};

/// Whether `url` points into the jobs area
pub fn is_jobs_url(url: &str, marker: &str) -> bool {
    Url::parse(url).map_or_else(|_| url.contains(marker), |parsed| parsed.path().contains(marker))
}

/// Polls until the skeleton placeholder is gone and job cards are present.
/// Returns `false` on timeout; callers proceed either way.
pub async fn wait_for_feed(
    page: &dyn HostPage,
    selectors: &SelectorConfig,
    config: &DriverConfig,
) -> bool {
    let skeleton = format!(".{}", selectors.skeleton_class);

    for attempt in 1..=config.feed_wait_attempts {
        sleep(config.feed_wait_interval()).await;

        let loading = page
            .query_all(&skeleton)
            .await
            .is_ok_and(|found| !found.is_empty());
        let mut has_cards = false;
        for selector in &config.loaded_selectors {
            if page.query_all(selector).await.is_ok_and(|found| !found.is_empty()) {
                has_cards = true;
                break;
            }
        }

        if has_cards && !loading {
            info!("✅ Jobs loaded after {} checks", attempt);
            return true;
        }
        debug!(
            "⏳ Waiting for jobs to load... (attempt {}/{})",
            attempt, config.feed_wait_attempts
        );
    }

    warn!("⚠️ Timeout waiting for jobs to load, filtering anyway");
    false
}

pub struct FeedDriver {
    page: Arc<dyn HostPage>,
    settings: Arc<LiveSettings>,
    filter: CardFilter,
    orchestrator: Arc<SweepOrchestrator>,
    config: Arc<SweepConfig>,
    /// Last periodic trigger and the unverified jobs it was for
    last_retrigger: Mutex<Option<(Instant, Vec<ItemKey>)>>,
}

impl FeedDriver {
    pub fn new(
        page: Arc<dyn HostPage>,
        settings: Arc<LiveSettings>,
        sink: Arc<dyn ProgressSink>,
        config: SweepConfig,
    ) -> Self {
        let ctx = SweepContext::new(page.clone(), settings.clone(), sink, config);
        let filter = CardFilter::new(page.clone(), ctx.config.selectors.clone());
        let config = ctx.config.clone();
        Self {
            page,
            settings,
            filter,
            orchestrator: Arc::new(SweepOrchestrator::new(ctx)),
            config,
            last_retrigger: Mutex::new(None),
        }
    }

    pub fn orchestrator(&self) -> Arc<SweepOrchestrator> {
        Arc::clone(&self.orchestrator)
    }

    pub const fn filter(&self) -> &CardFilter {
        &self.filter
    }

    /// Serves triggers until `shutdown` fires. `navigation` carries the new
    /// URL each time the host navigates.
    pub async fn run(&self, mut navigation: mpsc::Receiver<String>, shutdown: CancellationToken) {
        let mut settings_rx = self.settings.subscribe();

        let mut ticker = interval(self.config.driver.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        if self.on_jobs_page().await {
            info!("📍 On jobs page, starting filter initialization");
            tokio::select! {
                () = shutdown.cancelled() => {}
                () = self.refresh_feed() => {}
            }
        } else {
            info!("📍 Not on jobs page yet, waiting for navigation");
        }

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    self.orchestrator.shutdown();
                    info!("🛑 Feed driver stopped");
                    break;
                }
                changed = settings_rx.changed() => {
                    if changed.is_err() {
                        warn!("Settings channel closed, stopping feed driver");
                        break;
                    }
                    let settings = *settings_rx.borrow_and_update();
                    self.on_settings_changed(settings).await;
                }
                _ = ticker.tick() => self.on_tick().await,
                Some(url) = navigation.recv() => {
                    tokio::select! {
                        () = shutdown.cancelled() => debug!("Navigation to {} interrupted", url),
                        () = self.on_navigation(&url) => {}
                    }
                }
            }
        }
    }

    /// Starts a sweep on its own task
    pub fn trigger_sweep(&self) -> JoinHandle<SweepOutcome> {
        debug!("Sweep triggered");
        self.orchestrator.spawn()
    }

    async fn on_jobs_page(&self) -> bool {
        is_jobs_url(&self.page.current_url().await, &self.config.driver.jobs_path_marker)
    }

    /// Waits for the feed, classifies every card and starts a sweep
    async fn refresh_feed(&self) {
        wait_for_feed(self.page.as_ref(), &self.config.selectors, &self.config.driver).await;
        let summary = self.filter.apply_all(self.settings.current()).await;
        info!(
            "✅ Filtering complete: {} hidden, {} visible",
            summary.hidden, summary.visible
        );
        self.trigger_sweep();
    }

    async fn on_settings_changed(&self, settings: FilterSettings) {
        info!("⚙️ Settings updated, re-filtering all jobs");
        self.filter.reset_all().await;
        if !settings.any_enabled() {
            info!("All filters are off, every job stays visible");
            return;
        }
        let summary = self.filter.apply_all(settings).await;
        info!(
            "✅ Re-filtering complete: {} hidden, {} visible",
            summary.hidden, summary.visible
        );
        if settings.hide_reposted && self.on_jobs_page().await {
            self.trigger_sweep();
        }
    }

    async fn on_tick(&self) {
        if !self.on_jobs_page().await {
            return;
        }
        let settings = self.settings.current();
        self.filter.apply_unfiltered(settings).await;

        if !settings.hide_reposted || self.orchestrator.is_running() {
            return;
        }
        let unverified = self.orchestrator.unverified_keys().await;
        if unverified.is_empty() {
            return;
        }
        if self.claim_retrigger(unverified) {
            debug!("Unverified jobs on the page, triggering sweep");
            self.trigger_sweep();
        }
    }

    /// Same unverified jobs as the last periodic sweep: wait out the cooldown
    fn claim_retrigger(&self, unverified: Vec<ItemKey>) -> bool {
        let mut last = self
            .last_retrigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let cooldown = self.config.driver.retrigger_cooldown();
        if let Some((at, keys)) = last.as_ref() {
            if *keys == unverified && now.duration_since(*at) < cooldown {
                debug!("{} jobs still unverified, periodic retry cooling down", keys.len());
                return false;
            }
        }
        *last = Some((now, unverified));
        true
    }

    async fn on_navigation(&self, url: &str) {
        if !is_jobs_url(url, &self.config.driver.jobs_path_marker) {
            return;
        }
        info!("🔄 Navigated to jobs page, re-initializing filters");
        sleep(self.config.driver.navigation_settle()).await;
        self.refresh_feed().await;
    }
}
