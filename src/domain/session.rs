//! Sweep session state and its terminal report

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::item::{FeedItem, ItemKey};

/// Orchestrator state machine: `Idle → Running → (Cancelled | Completed)`.
/// A finished state accepts a new run just like `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SweepStatus {
    #[default]
    Idle,
    Running,
    Cancelled,
    Completed,
}

impl SweepStatus {
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }
}

/// Counters published to the progress sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SweepProgress {
    pub total: usize,
    pub processed: usize,
    pub found: usize,
}

/// One run of the orchestrator
#[derive(Debug)]
pub struct SweepSession {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Items to visit in the current round
    pub queue: Vec<FeedItem>,
    pub round: u32,
    pub progress: SweepProgress,
    /// Items that missed in the current round
    pub missed: Vec<FeedItem>,
    /// Activations issued so far, retries included
    pub visits: u32,
    attempted: HashSet<ItemKey>,
}

impl SweepSession {
    #[must_use]
    pub fn new(queue: Vec<FeedItem>) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            progress: SweepProgress {
                total: queue.len(),
                ..SweepProgress::default()
            },
            queue,
            round: 0,
            missed: Vec::new(),
            visits: 0,
            attempted: HashSet::new(),
        }
    }

    /// Counts `key` as processed the first time it is attempted in this
    /// session. Returns whether this was the first attempt.
    pub fn mark_attempted(&mut self, key: &ItemKey) -> bool {
        let first = self.attempted.insert(key.clone());
        if first {
            self.progress.processed += 1;
        }
        first
    }

    pub fn record_found(&mut self) {
        self.progress.found += 1;
    }

    /// Moves this round's misses into the queue for the next round
    pub fn start_retry_round(&mut self) -> usize {
        self.queue = std::mem::take(&mut self.missed);
        self.queue.len()
    }

    #[must_use]
    pub fn into_report(self, status: SweepStatus) -> SweepReport {
        SweepReport {
            session_id: self.id,
            status,
            total: self.progress.total,
            processed: self.progress.processed,
            found: self.progress.found,
            unverified: self.missed.into_iter().map(|item| item.key).collect(),
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

/// Terminal report of a sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub session_id: Uuid,
    pub status: SweepStatus,
    pub total: usize,
    pub processed: usize,
    pub found: usize,
    /// Keys still unverifiable after the last round
    pub unverified: Vec<ItemKey>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SweepReport {
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.status, SweepStatus::Cancelled)
    }

    /// Message handed to the progress sink at the end of the sweep
    #[must_use]
    pub fn message(&self) -> String {
        match self.status {
            SweepStatus::Cancelled => format!(
                "Scan cancelled after {}/{} jobs ({} reposted hidden)",
                self.processed, self.total, self.found
            ),
            _ if self.unverified.is_empty() => {
                format!("Scan complete: {} reposted jobs hidden", self.found)
            }
            _ => format!(
                "Scan complete: {} reposted jobs hidden, {} could not be verified",
                self.found,
                self.unverified.len()
            ),
        }
    }
}

/// Result of asking the orchestrator to sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    /// The reposted predicate is off
    Disabled,
    /// Another session is running; the trigger was dropped
    AlreadyRunning,
    Finished(SweepReport),
}

impl SweepOutcome {
    #[must_use]
    pub const fn report(&self) -> Option<&SweepReport> {
        match self {
            Self::Finished(report) => Some(report),
            _ => None,
        }
    }
}
