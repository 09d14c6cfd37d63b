//! Progress sink
//!
//! Sweeps publish `start(total)`, `update(processed, found)` after each
//! processed item, and `finish(message)`. Sinks are fire-and-forget:
//! publishing never blocks the sweep and never fails it.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

pub trait ProgressSink: Send + Sync {
    fn on_start(&self, total: usize);
    fn on_update(&self, processed: usize, found: usize);
    fn on_finish(&self, message: &str);
}

/// Writes progress to the log only
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn on_start(&self, total: usize) {
        info!("🔍 Checking {} jobs for reposted status", total);
    }

    fn on_update(&self, processed: usize, found: usize) {
        debug!("Progress {} processed, {} reposted", processed, found);
    }

    fn on_finish(&self, message: &str) {
        info!("✅ {}", message);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProgressEvent {
    Started { total: usize },
    Updated { processed: usize, found: usize },
    Finished { message: String },
}

/// Fans progress out to any number of observers (overlay UI, tests, ...)
#[derive(Debug, Clone)]
pub struct BroadcastProgressSink {
    tx: broadcast::Sender<ProgressEvent>,
}

impl BroadcastProgressSink {
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<ProgressEvent>) {
        let (tx, rx) = broadcast::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    fn publish(&self, event: ProgressEvent) {
        // 구독자가 없으면 그냥 버림
        let _ = self.tx.send(event);
    }
}

impl ProgressSink for BroadcastProgressSink {
    fn on_start(&self, total: usize) {
        self.publish(ProgressEvent::Started { total });
    }

    fn on_update(&self, processed: usize, found: usize) {
        self.publish(ProgressEvent::Updated { processed, found });
    }

    fn on_finish(&self, message: &str) {
        self.publish(ProgressEvent::Finished {
            message: message.to_string(),
        });
    }
}

/// Compact view of the latest sweep, for the overlay
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub total: usize,
    pub processed: usize,
    pub found: usize,
    pub percentage: f64,
    pub finished: bool,
    pub last_message: Option<String>,
}

/// Folds a [`ProgressEvent`] stream into a [`ProgressSnapshot`]
#[derive(Debug, Default)]
pub struct ProgressReducer {
    snapshot: Option<ProgressSnapshot>,
}

impl ProgressReducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started { total } => {
                self.snapshot = Some(ProgressSnapshot {
                    total: *total,
                    ..ProgressSnapshot::default()
                });
            }
            ProgressEvent::Updated { processed, found } => {
                let snapshot = self.snapshot.get_or_insert_with(ProgressSnapshot::default);
                snapshot.processed = *processed;
                snapshot.found = *found;
                snapshot.percentage = percentage(*processed, snapshot.total);
            }
            ProgressEvent::Finished { message } => {
                let snapshot = self.snapshot.get_or_insert_with(ProgressSnapshot::default);
                snapshot.finished = true;
                snapshot.last_message = Some(message.clone());
            }
        }
    }

    pub fn snapshot(&self) -> Option<ProgressSnapshot> {
        self.snapshot.clone()
    }
}

#[allow(clippy::cast_precision_loss)]
fn percentage(processed: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (processed as f64 / total as f64 * 100.0).min(100.0)
}
