//! # Verification Sweep
//!
//! Visits every visible, not-yet-flagged posting one at a time, drives the
//! shared detail panel to load it, and flags the posting (all of its
//! surfaces) when the panel says it was reposted.
//!
//! Leaves first: [`registry`] discovers and deduplicates items,
//! [`waiter`] observes the detail panel, [`throttle`] paces the whole thing,
//! [`orchestrator`] runs the state machine and [`progress`] reports it.

pub mod orchestrator;
pub mod progress;
pub mod registry;
pub mod throttle;
pub mod waiter;

pub use orchestrator::{SweepContext, SweepOrchestrator};
pub use progress::{
    BroadcastProgressSink, ProgressEvent, ProgressReducer, ProgressSink, ProgressSnapshot,
    TracingProgressSink,
};
pub use registry::{CatalogEntry, ItemCatalog, ItemRegistry};
pub use throttle::ThrottleController;
pub use waiter::{DetailLoadWaiter, normalize_text, titles_match};
