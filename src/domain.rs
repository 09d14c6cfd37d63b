//! Domain module - feed items, filter settings and sweep sessions
//!
//! Pure data: nothing here talks to the host page.

pub mod item;
pub mod session;
pub mod settings;

pub use item::{FeedItem, ItemKey, ItemStatus};
pub use session::{SweepOutcome, SweepProgress, SweepReport, SweepSession, SweepStatus};
pub use settings::{FilterSettings, LiveSettings, SettingsChange, SettingsSource};
