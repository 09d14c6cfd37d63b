//! Sweep orchestrator
//!
//! `Idle → Running → (Cancelled | Completed)`. One session at a time; a
//! trigger that arrives while a session runs is dropped, not queued.
//!
//! Per item: scroll into view, activate, wait for the panel to show the
//! item's title, then read the panel description for the repost marker.
//! Items whose panel never loads are retried in later rounds.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::progress::ProgressSink;
use super::registry::{CatalogEntry, ItemCatalog, ItemRegistry};
use super::throttle::ThrottleController;
use super::waiter::DetailLoadWaiter;
use crate::domain::{
    FeedItem, ItemKey, ItemStatus, SettingsSource, SweepOutcome, SweepReport, SweepSession,
    SweepStatus,
};
use crate::host::{HostError, HostPage, SurfaceId};
use crate::infrastructure::config::SweepConfig;

/// Everything a sweep needs from the outside
#[derive(Clone)]
pub struct SweepContext {
    pub page: Arc<dyn HostPage>,
    pub settings: Arc<dyn SettingsSource>,
    pub sink: Arc<dyn ProgressSink>,
    pub throttle: Arc<ThrottleController>,
    pub config: Arc<SweepConfig>,
}

impl SweepContext {
    /// Context with a fresh throttle built from `config`
    pub fn new(
        page: Arc<dyn HostPage>,
        settings: Arc<dyn SettingsSource>,
        sink: Arc<dyn ProgressSink>,
        config: SweepConfig,
    ) -> Self {
        let throttle = Arc::new(ThrottleController::new(config.throttle.clone()));
        Self {
            page,
            settings,
            sink,
            throttle,
            config: Arc::new(config),
        }
    }
}

#[derive(Debug)]
struct RunState {
    status: SweepStatus,
    /// Token of the running session, or of the next one while idle
    token: CancellationToken,
    /// Spawned runs that have not reached the status check yet
    pending: usize,
}

pub struct SweepOrchestrator {
    ctx: SweepContext,
    registry: ItemRegistry,
    waiter: DetailLoadWaiter,
    /// Parent of every session token
    lifetime: CancellationToken,
    state: Mutex<RunState>,
    /// Definitive outcome per key, across sessions
    settled: RwLock<HashMap<ItemKey, ItemStatus>>,
}

/// Releases `Running` however the session future ends
struct SessionGuard<'a> {
    orchestrator: &'a SweepOrchestrator,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.orchestrator.lock_state();
        if state.status.is_running() {
            warn!("Sweep ended without finishing, marking it cancelled");
            state.status = SweepStatus::Cancelled;
        }
        state.token = self.orchestrator.lifetime.child_token();
    }
}

impl SweepOrchestrator {
    pub fn new(ctx: SweepContext) -> Self {
        let registry = ItemRegistry::new(ctx.page.clone(), ctx.config.selectors.clone());
        let waiter = DetailLoadWaiter::new(
            ctx.page.clone(),
            &ctx.config.selectors,
            ctx.config.waiter.clone(),
        );
        let lifetime = CancellationToken::new();
        let state = RunState {
            status: SweepStatus::Idle,
            token: lifetime.child_token(),
            pending: 0,
        };
        Self {
            ctx,
            registry,
            waiter,
            lifetime,
            state: Mutex::new(state),
            settled: RwLock::new(HashMap::new()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> SweepStatus {
        self.lock_state().status
    }

    pub fn is_running(&self) -> bool {
        self.status().is_running()
    }

    /// Stops the running session at its next checkpoint. A run that was
    /// spawned but has not started yet is cancelled before its first item.
    pub fn request_cancel(&self) {
        let state = self.lock_state();
        if state.status.is_running() || state.pending > 0 {
            state.token.cancel();
        } else {
            debug!("No sweep in progress, cancel ignored");
        }
    }

    /// Cancels the running session and every later one
    pub fn shutdown(&self) {
        info!("Sweep orchestrator shutting down");
        self.lifetime.cancel();
    }

    /// Runs the sweep on its own task
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<SweepOutcome> {
        self.lock_state().pending += 1;
        let this = Arc::clone(self);
        tokio::spawn(async move { this.start(true).await })
    }

    /// Runs one sweep to completion or cancellation
    pub async fn run(&self) -> SweepOutcome {
        self.start(false).await
    }

    async fn start(&self, spawned: bool) -> SweepOutcome {
        let token = {
            let mut state = self.lock_state();
            if spawned {
                state.pending = state.pending.saturating_sub(1);
            }
            if !self.ctx.settings.current().hide_reposted {
                debug!("Reposted filter is off, sweep skipped");
                self.discard_stale_cancel(&mut state);
                return SweepOutcome::Disabled;
            }
            if state.status.is_running() {
                info!("Scan already in progress, trigger ignored");
                return SweepOutcome::AlreadyRunning;
            }
            state.status = SweepStatus::Running;
            state.token.clone()
        };
        let _guard = SessionGuard { orchestrator: self };

        let report = self.sweep(&token).await;
        self.lock_state().status = report.status;

        let message = report.message();
        if report.is_cancelled() {
            info!("🛑 {}", message);
        } else {
            info!("✅ {} (session {})", message, report.session_id);
        }
        self.ctx.sink.on_finish(&message);

        SweepOutcome::Finished(report)
    }

    /// A cancel aimed at runs that never started must not hit the next one
    fn discard_stale_cancel(&self, state: &mut RunState) {
        if !state.status.is_running() && state.pending == 0 && state.token.is_cancelled() {
            state.token = self.lifetime.child_token();
        }
    }

    /// Last definitive outcome recorded for `key`
    pub async fn verified_status(&self, key: &ItemKey) -> ItemStatus {
        self.settled
            .read()
            .await
            .get(key)
            .copied()
            .unwrap_or_default()
    }

    /// Eligible items on the page that no sweep has settled yet
    pub async fn unverified_keys(&self) -> Vec<ItemKey> {
        let catalog = self.registry.collect().await;
        let settled: HashSet<ItemKey> = self.settled.read().await.keys().cloned().collect();
        let mut keys = Vec::new();
        for entry in catalog.iter() {
            if !settled.contains(&entry.key) && self.is_eligible(entry).await {
                keys.push(entry.key.clone());
            }
        }
        keys
    }

    async fn sweep(&self, token: &CancellationToken) -> SweepReport {
        if !self.should_continue(token) {
            return SweepSession::new(Vec::new()).into_report(SweepStatus::Cancelled);
        }
        let catalog = self.registry.collect().await;
        let queue = self.snapshot(&catalog).await;
        let mut session = SweepSession::new(queue);

        info!(
            "🚀 Sweep {} started: {} jobs to check ({} unkeyed surfaces ignored)",
            session.id,
            session.progress.total,
            catalog.unkeyed()
        );
        self.ctx.sink.on_start(session.progress.total);

        let max_rounds = self.ctx.config.rounds.max_rounds.max(1);
        for round in 1..=max_rounds {
            session.round = round;
            let queue = std::mem::take(&mut session.queue);
            let remaining = queue.len();

            for (position, mut item) in queue.into_iter().enumerate() {
                if !self.should_continue(token) {
                    return session.into_report(SweepStatus::Cancelled);
                }
                if !self.still_eligible(&item).await {
                    debug!("Item {} detached or already flagged, skipping", item.key);
                    continue;
                }

                session.mark_attempted(&item.key);
                session.visits += 1;

                item.status = match self.visit(&item).await {
                    Ok(status) => status,
                    Err(e) => {
                        warn!("Error checking job {}: {}", item.key, e);
                        ItemStatus::Unknown
                    }
                };
                if item.status == ItemStatus::Unknown {
                    self.register_miss(&item).await;
                    session.missed.push(item);
                } else {
                    self.ctx.throttle.on_success();
                    if item.is_flagged() && self.apply_flag(&item).await {
                        session.record_found();
                    }
                    self.settle(&item).await;
                }
                self.ctx
                    .sink
                    .on_update(session.progress.processed, session.progress.found);

                self.ctx.throttle.pause_if_hidden(self.ctx.page.as_ref()).await;
                sleep(self.ctx.throttle.inter_item_delay()).await;

                if position + 1 < remaining && self.ctx.throttle.cooldown_due(session.visits) {
                    self.ctx.throttle.batch_cooldown().await;
                    if !self.should_continue(token) {
                        return session.into_report(SweepStatus::Cancelled);
                    }
                }
            }

            if session.missed.is_empty() || round == max_rounds {
                break;
            }
            info!(
                "🔁 Round {} left {} jobs unverified, retrying",
                round,
                session.missed.len()
            );
            sleep(self.ctx.config.rounds.inter_round_delay()).await;
            session.start_retry_round();
        }

        if !session.missed.is_empty() {
            let keys: Vec<&str> = session.missed.iter().map(|item| item.key.as_str()).collect();
            warn!(
                "⚠️ {} jobs could not be verified after {} rounds: {:?}",
                keys.len(),
                session.round,
                keys
            );
        }
        session.into_report(SweepStatus::Completed)
    }

    /// Eligible items of a fresh scan, in discovery order
    async fn snapshot(&self, catalog: &ItemCatalog) -> Vec<FeedItem> {
        let mut queue = Vec::new();
        for entry in catalog.iter() {
            if !self.is_eligible(entry).await {
                continue;
            }
            let title = match self.waiter.title_fragment(entry.canonical).await {
                Ok(title) => title,
                Err(e) => {
                    debug!("No title for {}: {}", entry.key, e);
                    continue;
                }
            };
            queue.push(FeedItem {
                key: entry.key.clone(),
                canonical: entry.canonical,
                surfaces: entry.surfaces.clone(),
                title,
                status: ItemStatus::Unknown,
            });
        }
        queue
    }

    async fn is_eligible(&self, entry: &CatalogEntry) -> bool {
        let page = &self.ctx.page;
        let selectors = &self.ctx.config.selectors;

        if !page.is_attached(entry.canonical).await {
            return false;
        }
        match page.visibility(entry.canonical).await {
            Ok(visibility) if visibility.is_visible() => {}
            _ => return false,
        }
        if page
            .has_class(entry.canonical, &selectors.skeleton_class)
            .await
            .unwrap_or(true)
        {
            return false;
        }
        !self.any_flagged(&entry.surfaces).await
    }

    async fn still_eligible(&self, item: &FeedItem) -> bool {
        self.ctx.page.is_attached(item.canonical).await && !self.any_flagged(&item.surfaces).await
    }

    async fn any_flagged(&self, surfaces: &[SurfaceId]) -> bool {
        let attribute = &self.ctx.config.selectors.flag_attribute;
        for surface in surfaces {
            if let Ok(Some(value)) = self.ctx.page.attribute(*surface, attribute).await {
                if value == "true" {
                    return true;
                }
            }
        }
        false
    }

    fn should_continue(&self, token: &CancellationToken) -> bool {
        !token.is_cancelled() && self.ctx.settings.current().hide_reposted
    }

    /// `Unknown` when the panel never showed the item
    async fn visit(&self, item: &FeedItem) -> Result<ItemStatus, HostError> {
        let page = &self.ctx.page;
        page.scroll_into_view(item.canonical).await?;
        page.activate(item.canonical).await?;

        if !self.waiter.wait_for_match(&item.title).await {
            debug!("Detail panel did not load for {}", item.key);
            return Ok(ItemStatus::Unknown);
        }

        if self.panel_shows_marker().await {
            Ok(ItemStatus::VerifiedFlagged)
        } else {
            Ok(ItemStatus::VerifiedClear)
        }
    }

    async fn panel_shows_marker(&self) -> bool {
        let selectors = &self.ctx.config.selectors;
        for selector in &selectors.panel_description_selectors {
            match self.ctx.page.query_text(selector).await {
                Ok(Some(text)) if text.contains(&selectors.flag_marker) => return true,
                Ok(_) => {}
                Err(e) => debug!("Description selector {} failed: {}", selector, e),
            }
        }
        false
    }

    /// Marks and hides every surface of the item in one step
    async fn apply_flag(&self, item: &FeedItem) -> bool {
        match self
            .ctx
            .page
            .flag_surfaces(&item.surfaces, &self.ctx.config.selectors.flag_attribute)
            .await
        {
            Ok(0) => {
                debug!("Job {} vanished before it could be hidden", item.key);
                false
            }
            Ok(count) => {
                info!("🙈 Hid reposted job {} ({} surfaces)", item.key, count);
                true
            }
            Err(e) => {
                warn!("Failed to hide job {}: {}", item.key, e);
                false
            }
        }
    }

    async fn register_miss(&self, item: &FeedItem) {
        let misses = self.ctx.throttle.on_miss();
        debug!("Miss on {} ({} in a row)", item.key, misses);
        self.ctx.throttle.maybe_backoff().await;
    }

    async fn settle(&self, item: &FeedItem) {
        self.settled
            .write()
            .await
            .insert(item.key.clone(), item.status);
    }
}
