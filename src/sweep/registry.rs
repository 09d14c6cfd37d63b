//! Item registry
//!
//! Scans the host document with an ordered net of selectors and groups the
//! surfaces it finds by posting id. The same element is usually matched by
//! several selectors (wrapper `li`, inner card `div`, ...): every selector is
//! run, but a surface is recorded once.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};
use url::Url;

use crate::domain::ItemKey;
use crate::host::{HostPage, SurfaceId};
use crate::infrastructure::config::SelectorConfig;

static JOB_VIEW_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/jobs/view/(?:[^/?#]*?-)?(\d+)").expect("job view pattern is a valid regex")
});

static LINK_BASE: Lazy<Option<Url>> = Lazy::new(|| Url::parse("https://www.linkedin.com/").ok());

/// Numeric posting id from a job link, absolute or relative
pub fn parse_job_id(href: &str) -> Option<ItemKey> {
    if let Some(caps) = JOB_VIEW_PATH.captures(href) {
        return caps.get(1).and_then(|m| ItemKey::new(m.as_str()));
    }

    let url = Url::parse(href)
        .ok()
        .or_else(|| LINK_BASE.as_ref().and_then(|base| base.join(href).ok()))?;
    url.query_pairs()
        .find(|(name, _)| name == "currentJobId")
        .filter(|(_, value)| !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()))
        .and_then(|(_, value)| ItemKey::new(value))
}

/// All surfaces of one posting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub key: ItemKey,
    pub canonical: SurfaceId,
    /// Canonical included, in discovery order
    pub surfaces: Vec<SurfaceId>,
    canonical_preferred: bool,
}

/// Result of one scan: key → canonical surface and key → all surfaces.
/// Iteration follows discovery order.
#[derive(Debug, Clone, Default)]
pub struct ItemCatalog {
    entries: Vec<CatalogEntry>,
    index: HashMap<ItemKey, usize>,
    unkeyed: usize,
}

impl ItemCatalog {
    fn insert(&mut self, key: ItemKey, surface: SurfaceId, preferred: bool) {
        if let Some(&pos) = self.index.get(&key) {
            let entry = &mut self.entries[pos];
            entry.surfaces.push(surface);
            if preferred && !entry.canonical_preferred {
                entry.canonical = surface;
                entry.canonical_preferred = true;
            }
            return;
        }

        self.index.insert(key.clone(), self.entries.len());
        self.entries.push(CatalogEntry {
            key,
            canonical: surface,
            surfaces: vec![surface],
            canonical_preferred: preferred,
        });
    }

    #[must_use]
    pub fn canonical(&self, key: &ItemKey) -> Option<SurfaceId> {
        self.entry(key).map(|entry| entry.canonical)
    }

    /// Every surface known for `key`, canonical included
    #[must_use]
    pub fn surfaces(&self, key: &ItemKey) -> &[SurfaceId] {
        self.entry(key).map_or(&[], |entry| entry.surfaces.as_slice())
    }

    /// Surfaces of `key` other than the canonical one
    #[must_use]
    pub fn duplicates(&self, key: &ItemKey) -> Vec<SurfaceId> {
        self.entry(key)
            .map(|entry| {
                entry
                    .surfaces
                    .iter()
                    .copied()
                    .filter(|surface| *surface != entry.canonical)
                    .collect()
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn entry(&self, key: &ItemKey) -> Option<&CatalogEntry> {
        self.index.get(key).map(|&pos| &self.entries[pos])
    }

    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Surfaces seen without an extractable key
    #[must_use]
    pub const fn unkeyed(&self) -> usize {
        self.unkeyed
    }
}

/// Discovers and deduplicates feed items
#[derive(Clone)]
pub struct ItemRegistry {
    page: Arc<dyn HostPage>,
    selectors: SelectorConfig,
}

impl ItemRegistry {
    pub fn new(page: Arc<dyn HostPage>, selectors: SelectorConfig) -> Self {
        Self { page, selectors }
    }

    /// Every distinct surface matched by the selector net, in discovery order
    pub async fn discover(&self) -> Vec<SurfaceId> {
        let mut seen = HashSet::new();
        let mut surfaces = Vec::new();

        for selector in &self.selectors.surface_selectors {
            let found = match self.page.query_all(selector).await {
                Ok(found) => found,
                Err(e) => {
                    warn!("Error with selector {}: {}", selector, e);
                    continue;
                }
            };
            debug!("Selector {} matched {} surfaces", selector, found.len());
            surfaces.extend(found.into_iter().filter(|surface| seen.insert(*surface)));
        }

        surfaces
    }

    /// Scans the document and groups surfaces by item key
    pub async fn collect(&self) -> ItemCatalog {
        let mut catalog = ItemCatalog::default();

        for (scan_index, surface) in self.discover().await.into_iter().enumerate() {
            let attribute = &self.selectors.scan_index_attribute;
            if let Err(e) = self
                .page
                .set_attribute(surface, attribute, &scan_index.to_string())
                .await
            {
                debug!("Could not tag {}: {}", surface, e);
            }

            match self.extract_key(surface).await {
                Some(key) => {
                    let preferred = self.is_preferred_wrapper(surface).await;
                    catalog.insert(key, surface, preferred);
                }
                None => catalog.unkeyed += 1,
            }
        }

        debug!(
            "📋 Registry: {} items, {} unkeyed surfaces",
            catalog.len(),
            catalog.unkeyed
        );
        catalog
    }

    /// Identity attribute first, then the id embedded in a job link
    pub async fn extract_key(&self, surface: SurfaceId) -> Option<ItemKey> {
        for attribute in &self.selectors.identity_attributes {
            if let Ok(Some(value)) = self.page.attribute(surface, attribute).await {
                if let Some(key) = ItemKey::new(value) {
                    return Some(key);
                }
            }
        }

        for selector in &self.selectors.link_selectors {
            match self.page.attribute_within(surface, selector, "href").await {
                Ok(Some(href)) => {
                    if let Some(key) = parse_job_id(&href) {
                        return Some(key);
                    }
                }
                Ok(None) => {}
                Err(e) => debug!("Link lookup {} on {} failed: {}", selector, surface, e),
            }
        }

        None
    }

    async fn is_preferred_wrapper(&self, surface: SurfaceId) -> bool {
        matches!(
            self.page
                .attribute(surface, &self.selectors.preferred_wrapper_attribute)
                .await,
            Ok(Some(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryPage;
    use rstest::rstest;

    #[rstest]
    #[case("/jobs/view/4012345678/", Some("4012345678"))]
    #[case("https://www.linkedin.com/jobs/view/4012345678/?refId=abc", Some("4012345678"))]
    #[case("/jobs/view/backend-engineer-at-acme-3999/", Some("3999"))]
    #[case("/jobs/search/?currentJobId=3981&keywords=rust", Some("3981"))]
    #[case("/jobs/search/?currentJobId=&keywords=rust", None)]
    #[case("/company/acme/", None)]
    fn test_parse_job_id(#[case] href: &str, #[case] expected: Option<&str>) {
        assert_eq!(parse_job_id(href).as_ref().map(ItemKey::as_str), expected);
    }

    const NESTED: &str = r#"
        <ul>
          <li data-occludable-job-id="11" class="jobs-search-results__list-item">
            <div class="job-card-container" data-job-id="11">
              <a href="/jobs/view/11/">Rust Developer</a>
            </div>
          </li>
          <li class="jobs-search-results__list-item">
            <div class="job-card-container"><a href="/jobs/search/?currentJobId=12">Go Developer</a></div>
          </li>
          <li class="jobs-search-results__list-item"><span>No link at all</span></li>
        </ul>"#;

    fn registry(page: Arc<MemoryPage>) -> ItemRegistry {
        ItemRegistry::new(page, SelectorConfig::default())
    }

    #[tokio::test]
    async fn test_nested_wrappers_share_one_entry() {
        let page = Arc::new(MemoryPage::new(NESTED));
        let catalog = registry(page.clone()).collect().await;

        let key = ItemKey::new("11").unwrap();
        let wrapper = page.find("data-occludable-job-id", "11").unwrap();
        assert_eq!(catalog.canonical(&key), Some(wrapper));
        assert_eq!(catalog.surfaces(&key).len(), 2);
        assert_eq!(catalog.duplicates(&key).len(), 1);
        assert_ne!(catalog.duplicates(&key)[0], wrapper);
    }

    #[tokio::test]
    async fn test_link_fallback_and_unkeyed_surfaces() {
        let page = Arc::new(MemoryPage::new(NESTED));
        let catalog = registry(page).collect().await;

        assert_eq!(catalog.len(), 2);
        assert!(catalog.entry(&ItemKey::new("12").unwrap()).is_some());
        // the second li and its inner card resolve to 12; the third li has nothing
        assert_eq!(catalog.unkeyed(), 1);
    }

    #[tokio::test]
    async fn test_scan_index_is_tagged() {
        let page = Arc::new(MemoryPage::new(NESTED));
        let registry = registry(page.clone());
        let discovered = registry.discover().await;
        registry.collect().await;

        let first = discovered[0];
        assert_eq!(page.attribute_now(first, "data-sweep-index").as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn test_broken_selector_does_not_abort_scan() {
        let page = Arc::new(MemoryPage::new(NESTED));
        let mut selectors = SelectorConfig::default();
        selectors.surface_selectors.insert(0, "li[[[".to_string());
        let catalog = ItemRegistry::new(page, selectors).collect().await;
        assert_eq!(catalog.len(), 2);
    }

    proptest::proptest! {
        #[test]
        fn prop_one_entry_per_distinct_key(keys in proptest::collection::vec(0u8..12, 1..30)) {
            let cards: String = keys
                .iter()
                .map(|k| {
                    format!(
                        r#"<li class="jobs-search-results-list__list-item" data-job-id="{}">x</li>"#,
                        5000 + u32::from(*k)
                    )
                })
                .collect();
            let page = Arc::new(MemoryPage::new(format!("<ul>{cards}</ul>")));
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let catalog = runtime.block_on(registry(page).collect());

            let distinct: std::collections::HashSet<_> = keys.iter().collect();
            proptest::prop_assert_eq!(catalog.len(), distinct.len());
            let recorded: usize = catalog.iter().map(|entry| entry.surfaces.len()).sum();
            proptest::prop_assert_eq!(recorded, keys.len());
            for entry in catalog.iter() {
                proptest::prop_assert!(entry.surfaces.contains(&entry.canonical));
            }
        }
    }
}
