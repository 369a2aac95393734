//! Scripted browser used by unit tests in place of Chrome.

use crate::config::Identity;
use crate::error::BrowseError;
use crate::scrapers::traits::{BrowserPage, BrowserSession, ScrollPosition, SessionFactory};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type NavigateHook = Arc<dyn Fn(&str) + Send + Sync>;

/// What the fake site serves
#[derive(Clone, Default)]
pub struct PageScript {
    /// Successive index-page snapshots per URL; the last one repeats
    pub index_scans: HashMap<String, Vec<String>>,
    /// Number of scroll steps after which the load-more button is in view
    pub load_more_after: Option<usize>,
    /// Detail-page HTML per URL
    pub details: HashMap<String, String>,
    /// URLs whose navigation times out
    pub unreachable: HashSet<String>,
    /// Number of initial `content()` calls on index pages that fail
    pub content_failures: usize,
    /// Called on every navigation, before it resolves
    pub on_navigate: Option<NavigateHook>,
    /// How long a click waits before reporting the element missing
    pub click_delay: Duration,
}

#[derive(Debug, Default, Clone)]
pub struct FakeLog {
    pub navigations: Vec<String>,
    pub opened: usize,
    pub closed: usize,
}

#[derive(Clone)]
pub struct FakeSession {
    script: Arc<PageScript>,
    log: Arc<Mutex<FakeLog>>,
    page_failures: Arc<AtomicUsize>,
}

impl FakeSession {
    pub fn new(script: PageScript) -> Self {
        Self {
            script: Arc::new(script),
            log: Arc::new(Mutex::new(FakeLog::default())),
            page_failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_page_failures(self, count: usize) -> Self {
        self.page_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn log(&self) -> FakeLog {
        self.log.lock().unwrap().clone()
    }

    /// Detail pages that were navigated to, in order
    pub fn detail_visits(&self) -> Vec<String> {
        self.log()
            .navigations
            .into_iter()
            .filter(|url| url.contains("/v/"))
            .collect()
    }

    pub fn page(&self) -> FakePage {
        FakePage {
            script: self.script.clone(),
            log: self.log.clone(),
            current: RefCell::new(None),
            scrolls: Cell::new(0),
            content_calls: Cell::new(0),
            closed: Cell::new(false),
        }
    }
}

impl BrowserSession for FakeSession {
    type Page = FakePage;

    fn new_page(&self) -> Result<FakePage, BrowseError> {
        let remaining = self.page_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.page_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(BrowseError::Session("tab refused".to_string()));
        }
        self.log.lock().unwrap().opened += 1;
        Ok(self.page())
    }
}

pub struct FakeSessionFactory {
    pub session: Option<FakeSession>,
}

impl SessionFactory for FakeSessionFactory {
    type Session = FakeSession;

    fn open(&self, _identity: &Identity) -> Result<FakeSession, BrowseError> {
        self.session
            .clone()
            .ok_or_else(|| BrowseError::Session("chrome not installed".to_string()))
    }
}

pub struct FakePage {
    script: Arc<PageScript>,
    log: Arc<Mutex<FakeLog>>,
    current: RefCell<Option<String>>,
    scrolls: Cell<usize>,
    content_calls: Cell<usize>,
    closed: Cell<bool>,
}

impl FakePage {
    fn current(&self) -> String {
        self.current.borrow().clone().unwrap_or_default()
    }
}

impl BrowserPage for FakePage {
    fn navigate(&self, url: &str, _timeout: Duration) -> Result<(), BrowseError> {
        self.log.lock().unwrap().navigations.push(url.to_string());
        if let Some(hook) = &self.script.on_navigate {
            hook(url);
        }
        if self.script.unreachable.contains(url) {
            return Err(BrowseError::Navigation {
                url: url.to_string(),
                reason: "timed out".to_string(),
            });
        }
        *self.current.borrow_mut() = Some(url.to_string());
        Ok(())
    }

    fn wait_for(&self, selector: &str, _timeout: Duration) -> Result<(), BrowseError> {
        let html = self.content()?;
        let parsed = scraper::Selector::parse(selector)
            .map_err(|e| BrowseError::Script(e.to_string()))?;
        if scraper::Html::parse_document(&html)
            .select(&parsed)
            .next()
            .is_some()
        {
            Ok(())
        } else {
            Err(BrowseError::ElementTimeout {
                selector: selector.to_string(),
            })
        }
    }

    fn click(&self, selector: &str, _timeout: Duration) -> Result<(), BrowseError> {
        if !self.script.click_delay.is_zero() {
            std::thread::sleep(self.script.click_delay);
        }
        Err(BrowseError::ElementTimeout {
            selector: selector.to_string(),
        })
    }

    fn scroll_by(&self, pixels: u32) -> Result<ScrollPosition, BrowseError> {
        self.scrolls.set(self.scrolls.get() + 1);
        Ok(ScrollPosition {
            offset: self.scrolls.get() as u64 * pixels as u64,
            viewport_height: 1080,
            document_height: 1200,
        })
    }

    fn content(&self) -> Result<String, BrowseError> {
        let url = self.current();
        if let Some(html) = self.script.details.get(&url) {
            return Ok(html.clone());
        }

        let call = self.content_calls.get();
        self.content_calls.set(call + 1);
        if call < self.script.content_failures {
            return Err(BrowseError::NotReady("document still loading".to_string()));
        }

        let scans = self.script.index_scans.get(&url);
        let snapshot = scans
            .and_then(|scans| {
                let scan = self.scrolls.get().saturating_sub(1);
                scans.get(scan.min(scans.len().saturating_sub(1)))
            })
            .cloned()
            .unwrap_or_else(|| "<html><body></body></html>".to_string());
        Ok(snapshot)
    }

    fn is_in_viewport(&self, _selector: &str) -> Result<bool, BrowseError> {
        Ok(self
            .script
            .load_more_after
            .is_some_and(|after| self.scrolls.get() >= after))
    }

    fn close(&self) {
        if !self.closed.replace(true) {
            self.log.lock().unwrap().closed += 1;
        }
    }
}

/// Index page HTML with one card per `(title, price, href)`
pub fn index_html(cards: &[(&str, &str, &str)]) -> String {
    let body: String = cards
        .iter()
        .map(|(title, price, href)| {
            format!(
                r#"<a href="{href}"><article><div class="kt-post-card__body"><h2>{title}</h2><div class="kt-post-card__description">{price}</div></div></article></a>"#
            )
        })
        .collect();
    format!("<html><body><div class=\"post-list\">{body}</div></body></html>")
}
