//! Job Feed Filter - hides applied, promoted and reposted postings in a job feed
//!
//! Cards are classified from their own content by [`classify`]. Reposted
//! status only shows in the shared detail panel, so [`sweep`] visits each
//! posting, waits for the panel to load it, and flags the reposted ones.
//! [`driver`] decides when either of them runs.

// Module declarations
pub mod classify;
pub mod domain;
pub mod driver;
pub mod host;
pub mod infrastructure;
pub mod sweep;

pub use classify::{CardFilter, FilterSummary, HideReason, should_hide};
pub use domain::{
    FeedItem, FilterSettings, ItemKey, ItemStatus, LiveSettings, SettingsChange, SettingsSource,
    SweepOutcome, SweepReport, SweepStatus,
};
pub use driver::{FeedDriver, is_jobs_url, wait_for_feed};
pub use host::{HostError, HostPage, MemoryPage, SurfaceId, Visibility};
pub use infrastructure::{SettingsStore, SweepConfig};
pub use sweep::{
    BroadcastProgressSink, ProgressEvent, ProgressSink, SweepContext, SweepOrchestrator,
    ThrottleController, TracingProgressSink,
};
