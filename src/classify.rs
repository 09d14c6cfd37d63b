//! Card classification
//!
//! The cheap pass that runs before (and between) sweeps: every card is
//! judged from its own text and attributes, no panel activation involved.
//! Cards hidden here never reach the sweep because they are no longer
//! visible.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::domain::FilterSettings;
use crate::host::{HostError, HostPage, SurfaceId};
use crate::infrastructure::config::SelectorConfig;
use crate::sweep::ItemRegistry;

pub const FILTERED_ATTRIBUTE: &str = "data-filtered";
pub const HIDDEN_BY_FILTER_ATTRIBUTE: &str = "data-hidden-by-filter";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HideReason {
    Applied,
    Promoted,
    Reposted,
}

impl fmt::Display for HideReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Applied => "applied",
            Self::Promoted => "promoted",
            Self::Reposted => "reposted",
        };
        f.write_str(label)
    }
}

/// First enabled predicate the card satisfies, in applied → promoted → reposted order
pub async fn should_hide(
    page: &dyn HostPage,
    surface: SurfaceId,
    selectors: &SelectorConfig,
    settings: FilterSettings,
) -> Result<Option<HideReason>, HostError> {
    let text = page.text_content(surface).await?;
    if text.trim().is_empty() {
        return Ok(None);
    }

    if settings.hide_applied {
        for selector in &selectors.applied_state_selectors {
            if let Some(state) = page.text_within(surface, selector).await? {
                if state.contains("Applied") {
                    return Ok(Some(HideReason::Applied));
                }
            }
        }
        if text.contains("Applied") && text.contains("ago") {
            return Ok(Some(HideReason::Applied));
        }
    }

    if settings.hide_promoted
        && (text.contains("Promoted")
            || text.contains("Sponsored")
            || page
                .attribute_within(surface, &selectors.promoted_selector, "data-promoted")
                .await?
                .is_some())
    {
        return Ok(Some(HideReason::Promoted));
    }

    if settings.hide_reposted
        && (text.contains(&selectors.flag_marker)
            || page
                .attribute(surface, &selectors.flag_attribute)
                .await?
                .is_some_and(|value| value == "true"))
    {
        return Ok(Some(HideReason::Reposted));
    }

    Ok(None)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterSummary {
    pub hidden: usize,
    pub visible: usize,
}

/// Hides and unhides cards according to the current settings
#[derive(Clone)]
pub struct CardFilter {
    page: Arc<dyn HostPage>,
    registry: ItemRegistry,
    selectors: SelectorConfig,
}

impl CardFilter {
    pub fn new(page: Arc<dyn HostPage>, selectors: SelectorConfig) -> Self {
        let registry = ItemRegistry::new(page.clone(), selectors.clone());
        Self {
            page,
            registry,
            selectors,
        }
    }

    /// Re-evaluates every card from scratch
    pub async fn apply_all(&self, settings: FilterSettings) -> FilterSummary {
        let cards = self.cards().await;
        for card in &cards {
            let _ = self.page.remove_attribute(*card, FILTERED_ATTRIBUTE).await;
        }
        let summary = self.filter_cards(&cards, settings).await;
        debug!(
            "Filter pass: {} hidden, {} visible",
            summary.hidden, summary.visible
        );
        summary
    }

    /// Only cards that have not been evaluated yet
    pub async fn apply_unfiltered(&self, settings: FilterSettings) -> FilterSummary {
        let mut fresh = Vec::new();
        for card in self.cards().await {
            if let Ok(None) = self.page.attribute(card, FILTERED_ATTRIBUTE).await {
                fresh.push(card);
            }
        }
        if fresh.is_empty() {
            return FilterSummary::default();
        }
        debug!("🆕 {} new job cards found", fresh.len());
        self.filter_cards(&fresh, settings).await
    }

    /// Strips filter markers and visibility overrides from every card
    pub async fn reset_all(&self) -> usize {
        let cards = self.cards().await;
        let mut reset = 0;
        for card in &cards {
            let cleared = self.page.remove_attribute(*card, FILTERED_ATTRIBUTE).await.is_ok()
                && self
                    .page
                    .remove_attribute(*card, HIDDEN_BY_FILTER_ATTRIBUTE)
                    .await
                    .is_ok();
            if cleared && self.page.set_hidden(&[*card], false).await.is_ok() {
                reset += 1;
            }
        }
        info!("🔄 Reset {} job cards", reset);
        reset
    }

    async fn cards(&self) -> Vec<SurfaceId> {
        let mut cards = Vec::new();
        for surface in self.registry.discover().await {
            match self
                .page
                .has_class(surface, &self.selectors.skeleton_class)
                .await
            {
                Ok(false) => cards.push(surface),
                Ok(true) => {}
                Err(e) => debug!("Skipping {}: {}", surface, e),
            }
        }
        cards
    }

    async fn filter_cards(&self, cards: &[SurfaceId], settings: FilterSettings) -> FilterSummary {
        let mut summary = FilterSummary::default();
        for card in cards {
            match self.filter_card(*card, settings).await {
                Ok(true) => summary.hidden += 1,
                Ok(false) => summary.visible += 1,
                Err(e) => debug!("Could not filter {}: {}", card, e),
            }
        }
        summary
    }

    async fn filter_card(
        &self,
        card: SurfaceId,
        settings: FilterSettings,
    ) -> Result<bool, HostError> {
        self.page.set_attribute(card, FILTERED_ATTRIBUTE, "true").await?;

        match should_hide(self.page.as_ref(), card, &self.selectors, settings).await? {
            Some(reason) => {
                debug!("Hiding {} ({})", card, reason);
                self.page.set_hidden(&[card], true).await?;
                self.page
                    .set_attribute(card, HIDDEN_BY_FILTER_ATTRIBUTE, "true")
                    .await?;
                Ok(true)
            }
            None => {
                self.page.set_hidden(&[card], false).await?;
                self.page
                    .remove_attribute(card, HIDDEN_BY_FILTER_ATTRIBUTE)
                    .await?;
                Ok(false)
            }
        }
    }
}
