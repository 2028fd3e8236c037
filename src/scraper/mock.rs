//! In-memory renderer and transport doubles for pipeline tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

use super::browser::{Renderer, RendererFactory};
use super::http_client::ListingTransport;
use super::Locator;
use crate::error::{ScrapeError, ScrapeResult};

/// One product page as a renderer would see it
#[derive(Debug, Clone, Default)]
pub struct ScriptedPage {
    texts: HashMap<Locator, Vec<String>>,
    clickable: HashSet<Locator>,
    on_click: HashMap<Locator, Vec<(Locator, Vec<String>)>>,
    source: String,
    panic_on: Option<Locator>,
    navigation_error: Option<String>,
}

impl ScriptedPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(self, locator: Locator, text: &str) -> Self {
        self.texts(locator, &[text])
    }

    pub fn texts(mut self, locator: Locator, texts: &[&str]) -> Self {
        self.texts
            .insert(locator, texts.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn clickable(mut self, locator: Locator) -> Self {
        self.clickable.insert(locator);
        self
    }

    /// Replace the texts under `target` once `control` is clicked
    pub fn on_click(mut self, control: Locator, target: Locator, texts: &[&str]) -> Self {
        self.on_click
            .entry(control)
            .or_default()
            .push((target, texts.iter().map(|t| t.to_string()).collect()));
        self
    }

    pub fn source(mut self, html: &str) -> Self {
        self.source = html.to_string();
        self
    }

    pub fn panic_on(mut self, locator: Locator) -> Self {
        self.panic_on = Some(locator);
        self
    }

    pub fn fail_navigation(mut self, reason: &str) -> Self {
        self.navigation_error = Some(reason.to_string());
        self
    }
}

#[derive(Default)]
struct Counters {
    opened: AtomicUsize,
    closed: AtomicUsize,
    clicks: AtomicUsize,
}

pub struct ScriptedRenderer {
    pages: Arc<HashMap<String, ScriptedPage>>,
    current: Mutex<Option<ScriptedPage>>,
    counters: Arc<Counters>,
}

impl ScriptedRenderer {
    fn current(&self) -> ScrapeResult<ScriptedPage> {
        self.current
            .lock()
            .map_err(|_| ScrapeError::renderer("scripted page lock poisoned"))?
            .clone()
            .ok_or_else(|| ScrapeError::renderer("no page loaded"))
    }

    fn check_panic(&self, locator: &Locator) {
        let page = self.current.lock().ok().and_then(|p| p.clone());
        if let Some(page) = page {
            if page.panic_on.as_ref() == Some(locator) {
                panic!("scripted panic at {}", locator);
            }
        }
    }

    fn timeout(locator: &Locator, timeout: Duration) -> ScrapeError {
        ScrapeError::WaitTimeout {
            locator: locator.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    async fn navigate(&self, url: &Url) -> ScrapeResult<()> {
        let page = self
            .pages
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| ScrapeError::Navigation {
                url: url.to_string(),
                reason: "no scripted page".to_string(),
            })?;

        if let Some(reason) = &page.navigation_error {
            return Err(ScrapeError::Navigation {
                url: url.to_string(),
                reason: reason.clone(),
            });
        }

        if let Ok(mut current) = self.current.lock() {
            *current = Some(page);
        }
        Ok(())
    }

    async fn wait_for_text(&self, locator: &Locator, timeout: Duration) -> ScrapeResult<String> {
        self.check_panic(locator);
        let page = self.current()?;
        page.texts
            .get(locator)
            .and_then(|texts| texts.first())
            .map(|text| text.trim().to_string())
            .ok_or_else(|| Self::timeout(locator, timeout))
    }

    async fn wait_for_clickable(&self, locator: &Locator, timeout: Duration) -> ScrapeResult<()> {
        self.check_panic(locator);
        if self.current()?.clickable.contains(locator) {
            Ok(())
        } else {
            Err(Self::timeout(locator, timeout))
        }
    }

    async fn scroll_into_view(&self, locator: &Locator) -> ScrapeResult<()> {
        let page = self.current()?;
        if page.clickable.contains(locator) || page.texts.contains_key(locator) {
            Ok(())
        } else {
            Err(ScrapeError::renderer(format!("no such element: {}", locator)))
        }
    }

    async fn click(&self, locator: &Locator) -> ScrapeResult<()> {
        self.check_panic(locator);
        let mut guard = self
            .current
            .lock()
            .map_err(|_| ScrapeError::renderer("scripted page lock poisoned"))?;
        let page = guard
            .as_mut()
            .ok_or_else(|| ScrapeError::renderer("no page loaded"))?;

        if !page.clickable.contains(locator) {
            return Err(ScrapeError::renderer(format!("element not interactable: {}", locator)));
        }

        if let Some(effects) = page.on_click.get(locator).cloned() {
            for (target, texts) in effects {
                page.texts.insert(target, texts);
            }
        }
        self.counters.clicks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn texts(&self, locator: &Locator) -> ScrapeResult<Vec<String>> {
        self.check_panic(locator);
        Ok(self.current()?.texts.get(locator).cloned().unwrap_or_default())
    }

    async fn page_source(&self) -> ScrapeResult<String> {
        Ok(self.current()?.source)
    }

    async fn close(&self) -> ScrapeResult<()> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out scripted renderers sharing one page table and one set of counters
pub struct ScriptedFactory {
    pages: Arc<HashMap<String, ScriptedPage>>,
    counters: Arc<Counters>,
    fail_open: bool,
}

impl ScriptedFactory {
    pub fn new(pages: Vec<(&str, ScriptedPage)>) -> Self {
        Self {
            pages: Arc::new(
                pages
                    .into_iter()
                    .map(|(url, page)| (url.to_string(), page))
                    .collect(),
            ),
            counters: Arc::new(Counters::default()),
            fail_open: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn opened_count(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn closed_count(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    pub fn click_count(&self) -> usize {
        self.counters.clicks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RendererFactory for ScriptedFactory {
    async fn open(&self) -> ScrapeResult<Box<dyn Renderer>> {
        if self.fail_open {
            return Err(ScrapeError::SessionStart {
                message: "scripted factory refuses sessions".to_string(),
            });
        }
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedRenderer {
            pages: Arc::clone(&self.pages),
            current: Mutex::new(None),
            counters: Arc::clone(&self.counters),
        }))
    }
}

/// Listing transport returning one canned response
pub struct StaticTransport {
    response: ScrapeResult<String>,
    requests: Mutex<Vec<String>>,
}

impl StaticTransport {
    pub fn ok(html: &str) -> Self {
        Self {
            response: Ok(html.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn err(error: ScrapeError) -> Self {
        Self {
            response: Err(error),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ListingTransport for StaticTransport {
    async fn fetch_listing(&self, url: &Url) -> ScrapeResult<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_string());
        }
        self.response.clone()
    }
}

/// Listing markup with one grid holding the given hrefs
pub fn listing_html(hrefs: &[&str]) -> String {
    let anchors: String = hrefs
        .iter()
        .map(|href| format!(r#"<a href="{}"><span>item</span></a>"#, href))
        .collect();
    format!(
        r#"<html><body><header><a href="/home">Inicio</a></header><div data-testid="product-list-grid">{}</div></body></html>"#,
        anchors
    )
}
