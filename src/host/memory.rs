//! In-memory host page
//!
//! Serves a static HTML snapshot of a job feed (parsed with `scraper`) plus a
//! simulated detail panel. Mutations (attributes, visibility overrides,
//! detachment) are kept in an overlay keyed by [`SurfaceId`]; the snapshot
//! itself is never rewritten, so selectors only ever see the original
//! attributes.
//!
//! Surface ids are element positions in document order, which is stable
//! because the snapshot is re-parsed from the same source on every call.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tokio::time::Instant;

use super::{HostError, HostPage, SurfaceId, Visibility};

/// Detail-panel content served when a given item is activated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailFixture {
    pub title: String,
    pub description: String,
    /// Time between activation and the panel showing this item
    pub latency: Duration,
    /// Number of leading activations that never load (simulated misses)
    pub failures: u32,
}

impl DetailFixture {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            latency: Duration::from_millis(300),
            failures: 0,
        }
    }

    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    #[must_use]
    pub const fn failing(mut self, failures: u32) -> Self {
        self.failures = failures;
        self
    }

    /// Never loads, whatever the number of attempts
    #[must_use]
    pub const fn unresponsive(mut self) -> Self {
        self.failures = u32::MAX;
        self
    }
}

/// Selectors under which the simulated panel answers `query_text`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelLayout {
    pub title_selector: String,
    pub description_selector: String,
}

impl Default for PanelLayout {
    fn default() -> Self {
        Self {
            title_selector: ".job-details-jobs-unified-top-card__job-title".to_string(),
            description_selector: ".job-details-jobs-unified-top-card__primary-description-container"
                .to_string(),
        }
    }
}

/// One recorded activation
#[derive(Debug, Clone)]
pub struct ActivationRecord {
    pub surface: SurfaceId,
    pub key: Option<String>,
    pub at: Instant,
}

#[derive(Debug, Default)]
struct PanelState {
    shown: Option<DetailFixture>,
    pending: Option<(DetailFixture, Instant)>,
}

#[derive(Debug)]
struct PageState {
    url: String,
    foreground: bool,
    attributes: HashMap<(SurfaceId, String), Option<String>>,
    hidden: HashSet<SurfaceId>,
    detached: HashSet<SurfaceId>,
    fixtures: HashMap<String, DetailFixture>,
    load_attempts: HashMap<String, u32>,
    panel: PanelState,
    activations: Vec<ActivationRecord>,
    scrolls: u32,
    /// Upcoming activations that fail with a host error
    activation_faults: u32,
}

/// Element index of one parse of the snapshot
struct Document<'a> {
    elements: Vec<ElementRef<'a>>,
}

impl<'a> Document<'a> {
    fn index(html: &'a Html) -> Self {
        let elements = html
            .tree
            .root()
            .descendants()
            .filter_map(ElementRef::wrap)
            .collect();
        Self { elements }
    }

    fn element(&self, surface: SurfaceId) -> Option<ElementRef<'a>> {
        self.elements.get(surface.0 as usize).copied()
    }

    fn surface_of(&self, element: ElementRef<'_>) -> Option<SurfaceId> {
        self.elements
            .iter()
            .position(|e| e.id() == element.id())
            .and_then(|pos| u32::try_from(pos).ok())
            .map(SurfaceId)
    }

    fn is_attached(&self, surface: SurfaceId, detached: &HashSet<SurfaceId>) -> bool {
        let Some(element) = self.element(surface) else {
            return false;
        };
        if detached.contains(&surface) {
            return false;
        }
        !element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .filter_map(|ancestor| self.surface_of(ancestor))
            .any(|ancestor| detached.contains(&ancestor))
    }
}

fn parse_selector(selector: &str) -> Result<Selector, HostError> {
    Selector::parse(selector).map_err(|e| HostError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>()
}

/// In-memory [`HostPage`] over an HTML snapshot
#[derive(Debug)]
pub struct MemoryPage {
    source: String,
    layout: PanelLayout,
    state: Mutex<PageState>,
}

impl MemoryPage {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            source: html.into(),
            layout: PanelLayout::default(),
            state: Mutex::new(PageState {
                url: "https://www.linkedin.com/jobs/search/".to_string(),
                foreground: true,
                attributes: HashMap::new(),
                hidden: HashSet::new(),
                detached: HashSet::new(),
                fixtures: HashMap::new(),
                load_attempts: HashMap::new(),
                panel: PanelState::default(),
                activations: Vec::new(),
                scrolls: 0,
                activation_faults: 0,
            }),
        }
    }

    #[must_use]
    pub fn with_layout(mut self, layout: PanelLayout) -> Self {
        self.layout = layout;
        self
    }

    #[must_use]
    pub fn with_url(self, url: impl Into<String>) -> Self {
        self.state().url = url.into();
        self
    }

    #[must_use]
    pub fn with_detail(self, key: impl Into<String>, fixture: DetailFixture) -> Self {
        self.set_detail(key, fixture);
        self
    }

    pub fn set_detail(&self, key: impl Into<String>, fixture: DetailFixture) {
        self.state().fixtures.insert(key.into(), fixture);
    }

    pub fn navigate(&self, url: impl Into<String>) {
        self.state().url = url.into();
    }

    pub fn set_foreground(&self, foreground: bool) {
        self.state().foreground = foreground;
    }

    /// Simulates the host removing an element (and its subtree)
    pub fn detach(&self, surface: SurfaceId) {
        self.state().detached.insert(surface);
    }

    /// The next `count` activations fail with [`HostError::Unavailable`]
    pub fn fail_activations(&self, count: u32) {
        self.state().activation_faults = count;
    }

    pub fn activations(&self) -> Vec<ActivationRecord> {
        self.state().activations.clone()
    }

    pub fn activated_keys(&self) -> Vec<String> {
        self.state()
            .activations
            .iter()
            .filter_map(|record| record.key.clone())
            .collect()
    }

    pub fn scroll_count(&self) -> u32 {
        self.state().scrolls
    }

    pub fn is_hidden(&self, surface: SurfaceId) -> bool {
        self.state().hidden.contains(&surface)
    }

    /// Current attribute value, overlay included
    pub fn attribute_now(&self, surface: SurfaceId, name: &str) -> Option<String> {
        let state = self.state();
        self.with_document(|doc| Self::read_attribute(&state, doc, surface, name))
    }

    /// First surface whose snapshot attribute `name` equals `value`
    pub fn find(&self, name: &str, value: &str) -> Option<SurfaceId> {
        self.with_document(|doc| {
            doc.elements
                .iter()
                .position(|e| e.value().attr(name) == Some(value))
                .and_then(|pos| u32::try_from(pos).ok())
                .map(SurfaceId)
        })
    }

    fn state(&self) -> MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_document<R>(&self, f: impl FnOnce(&Document<'_>) -> R) -> R {
        let html = Html::parse_document(&self.source);
        let doc = Document::index(&html);
        f(&doc)
    }

    fn read_attribute(
        state: &PageState,
        doc: &Document<'_>,
        surface: SurfaceId,
        name: &str,
    ) -> Option<String> {
        if let Some(overlay) = state.attributes.get(&(surface, name.to_string())) {
            return overlay.clone();
        }
        doc.element(surface)
            .and_then(|e| e.value().attr(name).map(str::to_string))
    }

    fn attached_element<'a>(
        state: &PageState,
        doc: &Document<'a>,
        surface: SurfaceId,
    ) -> Result<ElementRef<'a>, HostError> {
        if !doc.is_attached(surface, &state.detached) {
            return Err(HostError::Detached(surface));
        }
        doc.element(surface).ok_or(HostError::Detached(surface))
    }

    fn promote_pending(state: &mut PageState) {
        let now = Instant::now();
        let ready = state
            .panel
            .pending
            .as_ref()
            .is_some_and(|(_, ready_at)| *ready_at <= now);
        if ready {
            state.panel.shown = state.panel.pending.take().map(|(fixture, _)| fixture);
        }
    }

    fn fixture_key(state: &PageState, element: ElementRef<'_>) -> Option<String> {
        element
            .descendants()
            .filter_map(ElementRef::wrap)
            .flat_map(|node| node.value().attrs().map(|(_, value)| value))
            .find_map(|value| {
                state
                    .fixtures
                    .keys()
                    .find(|key| {
                        value == key.as_str()
                            || value.contains(&format!("/{key}/"))
                            || value.ends_with(&format!("/{key}"))
                            || value.contains(&format!("={key}"))
                    })
                    .cloned()
            })
    }
}

fn parse_style(style: &str) -> Visibility {
    let compact: String = style
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    let mut visibility = Visibility::SHOWN;
    for declaration in compact.split(';') {
        let Some((property, value)) = declaration.split_once(':') else {
            continue;
        };
        let value = value.trim_end_matches("!important");
        match property {
            "display" => visibility.display_none = value == "none",
            "visibility" => visibility.visibility_hidden = value == "hidden",
            "opacity" => visibility.opacity = value.parse().unwrap_or(1.0),
            _ => {}
        }
    }
    visibility
}

#[async_trait]
impl HostPage for MemoryPage {
    async fn current_url(&self) -> String {
        self.state().url.clone()
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<SurfaceId>, HostError> {
        let selector = parse_selector(selector)?;
        let state = self.state();
        Ok(self.with_document(|doc| {
            doc.elements
                .iter()
                .filter(|e| selector.matches(e))
                .filter_map(|e| doc.surface_of(*e))
                .filter(|surface| doc.is_attached(*surface, &state.detached))
                .collect()
        }))
    }

    async fn query_text(&self, selector: &str) -> Result<Option<String>, HostError> {
        let mut state = self.state();
        Self::promote_pending(&mut state);
        if selector == self.layout.title_selector {
            return Ok(state.panel.shown.as_ref().map(|f| f.title.clone()));
        }
        if selector == self.layout.description_selector {
            return Ok(state.panel.shown.as_ref().map(|f| f.description.clone()));
        }
        let parsed = parse_selector(selector)?;
        Ok(self.with_document(|doc| {
            doc.elements
                .iter()
                .filter(|e| parsed.matches(e))
                .find(|e| {
                    doc.surface_of(**e)
                        .is_some_and(|s| doc.is_attached(s, &state.detached))
                })
                .map(|e| element_text(*e))
        }))
    }

    async fn text_content(&self, surface: SurfaceId) -> Result<String, HostError> {
        let state = self.state();
        self.with_document(|doc| Self::attached_element(&state, doc, surface).map(element_text))
    }

    async fn text_within(
        &self,
        surface: SurfaceId,
        selector: &str,
    ) -> Result<Option<String>, HostError> {
        let parsed = parse_selector(selector)?;
        let state = self.state();
        self.with_document(|doc| {
            let element = Self::attached_element(&state, doc, surface)?;
            Ok(element.select(&parsed).next().map(element_text))
        })
    }

    async fn attribute(&self, surface: SurfaceId, name: &str) -> Result<Option<String>, HostError> {
        let state = self.state();
        self.with_document(|doc| {
            Self::attached_element(&state, doc, surface)?;
            Ok(Self::read_attribute(&state, doc, surface, name))
        })
    }

    async fn attribute_within(
        &self,
        surface: SurfaceId,
        selector: &str,
        name: &str,
    ) -> Result<Option<String>, HostError> {
        let parsed = parse_selector(selector)?;
        let state = self.state();
        self.with_document(|doc| {
            let element = Self::attached_element(&state, doc, surface)?;
            Ok(element
                .select(&parsed)
                .next()
                .and_then(|found| doc.surface_of(found))
                .and_then(|found| Self::read_attribute(&state, doc, found, name)))
        })
    }

    async fn has_class(&self, surface: SurfaceId, class: &str) -> Result<bool, HostError> {
        let state = self.state();
        self.with_document(|doc| {
            let element = Self::attached_element(&state, doc, surface)?;
            Ok(element.value().classes().any(|c| c == class))
        })
    }

    async fn set_attribute(
        &self,
        surface: SurfaceId,
        name: &str,
        value: &str,
    ) -> Result<(), HostError> {
        let mut state = self.state();
        let attached = self.with_document(|doc| doc.is_attached(surface, &state.detached));
        if !attached {
            return Err(HostError::Detached(surface));
        }
        state
            .attributes
            .insert((surface, name.to_string()), Some(value.to_string()));
        Ok(())
    }

    async fn remove_attribute(&self, surface: SurfaceId, name: &str) -> Result<(), HostError> {
        let mut state = self.state();
        let attached = self.with_document(|doc| doc.is_attached(surface, &state.detached));
        if !attached {
            return Err(HostError::Detached(surface));
        }
        state.attributes.insert((surface, name.to_string()), None);
        Ok(())
    }

    async fn is_attached(&self, surface: SurfaceId) -> bool {
        let state = self.state();
        self.with_document(|doc| doc.is_attached(surface, &state.detached))
    }

    async fn visibility(&self, surface: SurfaceId) -> Result<Visibility, HostError> {
        let state = self.state();
        self.with_document(|doc| {
            Self::attached_element(&state, doc, surface)?;
            if state.hidden.contains(&surface) {
                return Ok(Visibility {
                    display_none: true,
                    ..Visibility::SHOWN
                });
            }
            Ok(Self::read_attribute(&state, doc, surface, "style")
                .map_or(Visibility::SHOWN, |style| parse_style(&style)))
        })
    }

    async fn set_hidden(&self, surfaces: &[SurfaceId], hidden: bool) -> Result<(), HostError> {
        let mut state = self.state();
        let attached: Vec<SurfaceId> = self.with_document(|doc| {
            surfaces
                .iter()
                .copied()
                .filter(|s| doc.is_attached(*s, &state.detached))
                .collect()
        });
        for surface in attached {
            if hidden {
                state.hidden.insert(surface);
            } else {
                state.hidden.remove(&surface);
            }
        }
        Ok(())
    }

    async fn flag_surfaces(
        &self,
        surfaces: &[SurfaceId],
        attribute: &str,
    ) -> Result<usize, HostError> {
        let mut state = self.state();
        let attached: Vec<SurfaceId> = self.with_document(|doc| {
            surfaces
                .iter()
                .copied()
                .filter(|s| doc.is_attached(*s, &state.detached))
                .collect()
        });
        for surface in &attached {
            state
                .attributes
                .insert((*surface, attribute.to_string()), Some("true".to_string()));
            state.hidden.insert(*surface);
        }
        Ok(attached.len())
    }

    async fn scroll_into_view(&self, surface: SurfaceId) -> Result<(), HostError> {
        let mut state = self.state();
        let attached = self.with_document(|doc| doc.is_attached(surface, &state.detached));
        if !attached {
            return Err(HostError::Detached(surface));
        }
        state.scrolls += 1;
        Ok(())
    }

    async fn activate(&self, surface: SurfaceId) -> Result<(), HostError> {
        let mut state = self.state();
        let key = self.with_document(|doc| {
            Self::attached_element(&state, doc, surface).map(|e| Self::fixture_key(&state, e))
        })?;
        if state.activation_faults > 0 {
            state.activation_faults -= 1;
            return Err(HostError::Unavailable(format!("click on {surface} was rejected")));
        }
        let now = Instant::now();
        state.activations.push(ActivationRecord {
            surface,
            key: key.clone(),
            at: now,
        });

        let Some(key) = key else {
            return Ok(());
        };
        let attempt = {
            let counter = state.load_attempts.entry(key.clone()).or_insert(0);
            *counter += 1;
            *counter
        };
        if let Some(fixture) = state.fixtures.get(&key).cloned() {
            if attempt > fixture.failures {
                let ready_at = now + fixture.latency;
                state.panel.pending = Some((fixture, ready_at));
            }
        }
        Ok(())
    }

    async fn is_foreground(&self) -> bool {
        self.state().foreground
    }
}
