//! Filter settings and the live read accessor the sweep consults
//!
//! Settings can change at any moment (the popup writes them while a sweep is
//! running), so nothing takes a snapshot: every checkpoint calls
//! [`SettingsSource::current`].

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

/// User-chosen predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSettings {
    pub hide_applied: bool,
    pub hide_promoted: bool,
    pub hide_reposted: bool,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            hide_applied: true,
            hide_promoted: true,
            hide_reposted: true,
        }
    }
}

impl FilterSettings {
    #[must_use]
    pub const fn any_enabled(&self) -> bool {
        self.hide_applied || self.hide_promoted || self.hide_reposted
    }
}

/// Live read accessor
pub trait SettingsSource: Send + Sync {
    fn current(&self) -> FilterSettings;
}

/// Which toggles flipped between two settings values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SettingsChange {
    pub applied: Option<bool>,
    pub promoted: Option<bool>,
    pub reposted: Option<bool>,
}

impl SettingsChange {
    #[must_use]
    pub fn between(old: FilterSettings, new: FilterSettings) -> Self {
        let flip = |a: bool, b: bool| (a != b).then_some(b);
        Self {
            applied: flip(old.hide_applied, new.hide_applied),
            promoted: flip(old.hide_promoted, new.hide_promoted),
            reposted: flip(old.hide_reposted, new.hide_reposted),
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.applied.is_none() && self.promoted.is_none() && self.reposted.is_none()
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "ON" } else { "OFF" }
}

/// [`SettingsSource`] backed by a `watch` channel
#[derive(Debug)]
pub struct LiveSettings {
    tx: watch::Sender<FilterSettings>,
}

impl LiveSettings {
    #[must_use]
    pub fn new(initial: FilterSettings) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Replaces the current settings and reports what changed. Subscribers
    /// are only notified when a toggle actually flipped.
    pub fn update(&self, next: FilterSettings) -> SettingsChange {
        let previous = *self.tx.borrow();
        let change = SettingsChange::between(previous, next);
        if change.is_empty() {
            debug!("Settings unchanged");
            return change;
        }
        self.tx.send_replace(next);
        if let Some(enabled) = change.applied {
            info!("🔄 Hide Applied Jobs: {}", on_off(enabled));
        }
        if let Some(enabled) = change.promoted {
            info!("🔄 Hide Promoted Jobs: {}", on_off(enabled));
        }
        if let Some(enabled) = change.reposted {
            info!("🔄 Hide Reposted Jobs: {}", on_off(enabled));
        }
        change
    }

    /// Receiver notified on every effective `update`
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<FilterSettings> {
        self.tx.subscribe()
    }
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self::new(FilterSettings::default())
    }
}

impl SettingsSource for LiveSettings {
    fn current(&self) -> FilterSettings {
        *self.tx.borrow()
    }
}
