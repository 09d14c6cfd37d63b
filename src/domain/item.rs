//! Logical feed items and their identity keys

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::host::SurfaceId;

/// Stable identifier of a posting, shared by all of its surfaces
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemKey(String);

impl ItemKey {
    /// Returns `None` for blank input; such surfaces cannot be re-identified
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Verification state of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ItemStatus {
    #[default]
    Unknown,
    VerifiedClear,
    VerifiedFlagged,
}

/// One logical posting as seen by a sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub key: ItemKey,
    /// Surface that gets scrolled to and activated
    pub canonical: SurfaceId,
    /// Every known surface, canonical included, in discovery order
    pub surfaces: Vec<SurfaceId>,
    /// Title fragment used for weak identity matching against the detail panel
    pub title: String,
    pub status: ItemStatus,
}

impl FeedItem {
    #[must_use]
    pub fn is_flagged(&self) -> bool {
        self.status == ItemStatus::VerifiedFlagged
    }
}
