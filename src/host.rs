//! # Host Page Interface
//!
//! The job feed lives in a document owned by somebody else. Everything the
//! filter and the sweep need from it goes through [`HostPage`]: selector
//! queries, attribute/text reads, visibility, activation and the two
//! mutations we are allowed to make (hiding and flagging surfaces).
//!
//! Handles are non-owning. The host may destroy any element at any time, so
//! every call that takes a [`SurfaceId`] may answer [`HostError::Detached`].

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod memory;

pub use memory::{DetailFixture, MemoryPage, PanelLayout};

/// Opaque, copyable reference to one rendered element of the host document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SurfaceId(pub u32);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

/// Host-side failures
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostError {
    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("{0} is no longer attached to the document")]
    Detached(SurfaceId),

    #[error("Host unavailable: {0}")]
    Unavailable(String),
}

/// Computed-style subset used for eligibility decisions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Visibility {
    pub display_none: bool,
    pub visibility_hidden: bool,
    pub opacity: f32,
}

impl Visibility {
    pub const SHOWN: Self = Self {
        display_none: false,
        visibility_hidden: false,
        opacity: 1.0,
    };

    #[must_use]
    pub fn is_visible(&self) -> bool {
        !self.display_none && !self.visibility_hidden && self.opacity > 0.0
    }
}

impl Default for Visibility {
    fn default() -> Self {
        Self::SHOWN
    }
}

/// Page inspection, activation and visibility collaborator.
///
/// Implementations must tolerate concurrent readers; the sweep itself only
/// ever drives one activation at a time.
#[async_trait]
pub trait HostPage: Send + Sync {
    /// Location of the hosting page
    async fn current_url(&self) -> String;

    /// All elements matching `selector`, in document order
    async fn query_all(&self, selector: &str) -> Result<Vec<SurfaceId>, HostError>;

    /// Text of the first element matching `selector` anywhere in the document
    async fn query_text(&self, selector: &str) -> Result<Option<String>, HostError>;

    async fn text_content(&self, surface: SurfaceId) -> Result<String, HostError>;

    /// Text of the first descendant of `surface` matching `selector`.
    /// `Some("")` means the descendant exists but carries no text.
    async fn text_within(
        &self,
        surface: SurfaceId,
        selector: &str,
    ) -> Result<Option<String>, HostError>;

    async fn attribute(&self, surface: SurfaceId, name: &str) -> Result<Option<String>, HostError>;

    /// Attribute `name` of the first descendant of `surface` matching `selector`
    async fn attribute_within(
        &self,
        surface: SurfaceId,
        selector: &str,
        name: &str,
    ) -> Result<Option<String>, HostError>;

    async fn has_class(&self, surface: SurfaceId, class: &str) -> Result<bool, HostError>;

    async fn set_attribute(
        &self,
        surface: SurfaceId,
        name: &str,
        value: &str,
    ) -> Result<(), HostError>;

    async fn remove_attribute(&self, surface: SurfaceId, name: &str) -> Result<(), HostError>;

    async fn is_attached(&self, surface: SurfaceId) -> bool;

    async fn visibility(&self, surface: SurfaceId) -> Result<Visibility, HostError>;

    /// Forces every attached surface in `surfaces` hidden (or drops the override)
    async fn set_hidden(&self, surfaces: &[SurfaceId], hidden: bool) -> Result<(), HostError>;

    /// Sets `attribute="true"` and hides every attached surface in one host
    /// step, so duplicates never disagree. Returns how many were flagged.
    async fn flag_surfaces(
        &self,
        surfaces: &[SurfaceId],
        attribute: &str,
    ) -> Result<usize, HostError>;

    async fn scroll_into_view(&self, surface: SurfaceId) -> Result<(), HostError>;

    /// Single synthetic activation; the host updates the detail panel later
    async fn activate(&self, surface: SurfaceId) -> Result<(), HostError>;

    /// Whether the hosting tab is the user's foreground tab
    async fn is_foreground(&self) -> bool;
}
