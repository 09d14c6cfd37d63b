//! Detail-load waiter
//!
//! The detail panel is shared by every card and updates asynchronously after
//! a card is activated. Titles are the only identity signal the panel exposes,
//! so matching is a weak substring test in either direction.

use std::sync::Arc;

use tokio::time::sleep;
use tracing::debug;

use crate::host::{HostError, HostPage, SurfaceId};
use crate::infrastructure::config::{SelectorConfig, WaiterConfig};

/// Collapses whitespace runs, trims and lowercases
#[must_use]
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Substring containment either way, on normalized text
#[must_use]
pub fn titles_match(expected: &str, shown: &str) -> bool {
    let expected = normalize_text(expected);
    let shown = normalize_text(shown);
    if expected.is_empty() || shown.is_empty() {
        return false;
    }
    shown.contains(&expected) || expected.contains(&shown)
}

pub struct DetailLoadWaiter {
    page: Arc<dyn HostPage>,
    card_title_selectors: Vec<String>,
    panel_title_selectors: Vec<String>,
    config: WaiterConfig,
}

impl DetailLoadWaiter {
    pub fn new(page: Arc<dyn HostPage>, selectors: &SelectorConfig, config: WaiterConfig) -> Self {
        Self {
            page,
            card_title_selectors: selectors.card_title_selectors.clone(),
            panel_title_selectors: selectors.panel_title_selectors.clone(),
            config,
        }
    }

    /// Title text of a card; falls back to the whole card text
    pub async fn title_fragment(&self, surface: SurfaceId) -> Result<String, HostError> {
        for selector in &self.card_title_selectors {
            if let Some(text) = self.page.text_within(surface, selector).await? {
                let text = text.trim();
                if !text.is_empty() {
                    return Ok(text.to_string());
                }
            }
        }
        Ok(self.page.text_content(surface).await?.trim().to_string())
    }

    /// Title currently rendered in the detail panel, if any
    pub async fn panel_title(&self) -> Option<String> {
        for selector in &self.panel_title_selectors {
            match self.page.query_text(selector).await {
                Ok(Some(text)) if !text.trim().is_empty() => return Some(text),
                Ok(_) => {}
                Err(e) => debug!("Panel title selector {} failed: {}", selector, e),
            }
        }
        None
    }

    /// Polls the panel until it shows `title` or the attempts run out.
    ///
    /// An empty title matches immediately. Such items proceed unverified
    /// against whatever the panel happens to show.
    pub async fn wait_for_match(&self, title: &str) -> bool {
        if normalize_text(title).is_empty() {
            debug!("Empty card title, skipping panel match");
            return true;
        }

        for attempt in 1..=self.config.max_attempts {
            sleep(self.config.poll_interval()).await;
            if let Some(shown) = self.panel_title().await {
                if titles_match(title, &shown) {
                    debug!("Panel matched '{}' on attempt {}", title.trim(), attempt);
                    return true;
                }
            }
        }

        debug!(
            "Panel never showed '{}' after {} attempts",
            title.trim(),
            self.config.max_attempts
        );
        false
    }
}
