use crate::config::Identity;
use crate::error::BrowseError;
use crate::scrapers::traits::{BrowserPage, BrowserSession, ScrollPosition, SessionFactory};
use anyhow::{Context, Result};
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde::Deserialize;
use std::ffi::OsStr;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Flags that soften the automation fingerprint and keep cross-origin
/// assets from breaking the rendered page
const EVASION_ARGS: &[&str] = &[
    "--disable-setuid-sandbox",
    "--disable-web-security",
    "--disable-features=VizDisplayCompositor",
    "--disable-blink-features=AutomationControlled",
    "--incognito",
];

const VIEWPORT_CHECK: &str = r#"
(() => {
    const el = document.querySelector(__SELECTOR__);
    if (!el) return false;
    const style = window.getComputedStyle(el);
    const rect = el.getBoundingClientRect();
    return style.display !== 'none'
        && style.visibility !== 'hidden'
        && rect.top >= 0
        && rect.bottom <= window.innerHeight;
})()
"#;

/// Launches headless Chrome sessions
#[derive(Debug, Default, Clone, Copy)]
pub struct ChromeLauncher;

impl SessionFactory for ChromeLauncher {
    type Session = ChromeSession;

    fn open(&self, identity: &Identity) -> Result<ChromeSession, BrowseError> {
        ChromeSession::launch(identity).map_err(|e| BrowseError::Session(format!("{e:#}")))
    }
}

/// Browser-backed session. Dropping it shuts the Chrome process down.
pub struct ChromeSession {
    browser: Browser,
    identity: Identity,
}

impl ChromeSession {
    pub fn launch(identity: &Identity) -> Result<Self> {
        info!(
            headless = identity.headless,
            width = identity.viewport_width,
            height = identity.viewport_height,
            "Launching Chrome..."
        );

        let mut args: Vec<&OsStr> = EVASION_ARGS.iter().map(OsStr::new).collect();
        args.extend(identity.extra_args.iter().map(OsStr::new));

        let options = LaunchOptions::default_builder()
            .headless(identity.headless)
            .sandbox(false)
            .window_size(Some((identity.viewport_width, identity.viewport_height)))
            .path(identity.chrome_path.clone())
            .idle_browser_timeout(Duration::from_secs(300))
            .args(args)
            .build()
            .context("Failed to build launch options")?;

        let browser = Browser::new(options).context("Failed to launch Chrome browser")?;

        Ok(Self {
            browser,
            identity: identity.clone(),
        })
    }
}

impl BrowserSession for ChromeSession {
    type Page = ChromePage;

    fn new_page(&self) -> Result<ChromePage, BrowseError> {
        let tab = self
            .browser
            .new_tab()
            .map_err(|e| BrowseError::Session(e.to_string()))?;

        tab.set_user_agent(&self.identity.user_agent, None, None)
            .map_err(|e| BrowseError::Script(e.to_string()))?;

        if self.identity.stealth {
            tab.enable_stealth_mode()
                .map_err(|e| BrowseError::Script(e.to_string()))?;
        }

        Ok(ChromePage { tab })
    }
}

/// A single Chrome tab
pub struct ChromePage {
    tab: Arc<Tab>,
}

#[derive(Deserialize)]
struct RawScroll {
    offset: f64,
    viewport: f64,
    height: f64,
}

impl ChromePage {
    fn evaluate_value(&self, js: &str) -> Result<serde_json::Value, BrowseError> {
        let result = self
            .tab
            .evaluate(js, false)
            .map_err(|e| BrowseError::Script(e.to_string()))?;
        Ok(result.value.unwrap_or(serde_json::Value::Null))
    }
}

impl BrowserPage for ChromePage {
    fn navigate(&self, url: &str, timeout: Duration) -> Result<(), BrowseError> {
        debug!(url, "Navigating");
        self.tab.set_default_timeout(timeout);
        self.tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map(|_| ())
            .map_err(|e| BrowseError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }

    fn wait_for(&self, selector: &str, timeout: Duration) -> Result<(), BrowseError> {
        self.tab
            .wait_for_element_with_custom_timeout(selector, timeout)
            .map(|_| ())
            .map_err(|_| BrowseError::ElementTimeout {
                selector: selector.to_string(),
            })
    }

    fn click(&self, selector: &str, timeout: Duration) -> Result<(), BrowseError> {
        let element = self
            .tab
            .wait_for_element_with_custom_timeout(selector, timeout)
            .map_err(|_| BrowseError::ElementTimeout {
                selector: selector.to_string(),
            })?;
        element
            .click()
            .map(|_| ())
            .map_err(|e| BrowseError::Script(e.to_string()))
    }

    fn scroll_by(&self, pixels: u32) -> Result<ScrollPosition, BrowseError> {
        let js = format!(
            "(() => {{ window.scrollBy(0, {pixels}); return JSON.stringify({{ \
             offset: window.scrollY, viewport: window.innerHeight, \
             height: document.body ? document.body.scrollHeight : 0 }}); }})()"
        );
        let value = self.evaluate_value(&js)?;
        let raw = value
            .as_str()
            .ok_or_else(|| BrowseError::NotReady("scroll metrics unavailable".to_string()))?;
        let scroll: RawScroll =
            serde_json::from_str(raw).map_err(|e| BrowseError::Script(e.to_string()))?;

        Ok(ScrollPosition {
            offset: scroll.offset.max(0.0) as u64,
            viewport_height: scroll.viewport.max(0.0) as u64,
            document_height: scroll.height.max(0.0) as u64,
        })
    }

    fn content(&self) -> Result<String, BrowseError> {
        self.tab
            .get_content()
            .map_err(|e| BrowseError::NotReady(e.to_string()))
    }

    fn is_in_viewport(&self, selector: &str) -> Result<bool, BrowseError> {
        let quoted =
            serde_json::to_string(selector).map_err(|e| BrowseError::Script(e.to_string()))?;
        let js = VIEWPORT_CHECK.replace("__SELECTOR__", &quoted);
        Ok(self.evaluate_value(&js)?.as_bool().unwrap_or(false))
    }

    fn close(&self) {
        if let Err(e) = self.tab.close(true) {
            debug!(error = %e, "Tab already closed");
        }
    }
}

/// A page that is closed when it goes out of scope, whatever the exit path
pub struct ScopedPage<P: BrowserPage> {
    page: P,
}

impl<P: BrowserPage> ScopedPage<P> {
    pub fn new(page: P) -> Self {
        Self { page }
    }
}

impl<P: BrowserPage> Deref for ScopedPage<P> {
    type Target = P;

    fn deref(&self) -> &P {
        &self.page
    }
}

impl<P: BrowserPage> Drop for ScopedPage<P> {
    fn drop(&mut self) {
        self.page.close();
    }
}

/// Open a page, retrying once before giving up on the unit of work
pub fn open_page<S: BrowserSession>(session: &S) -> Result<ScopedPage<S::Page>, BrowseError> {
    match session.new_page() {
        Ok(page) => Ok(ScopedPage::new(page)),
        Err(first) => {
            warn!(error = %first, "Opening page failed, retrying once");
            session.new_page().map(ScopedPage::new)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::fake::{FakeSession, PageScript};

    #[test]
    fn scoped_page_closes_on_drop() {
        let session = FakeSession::new(PageScript::default());
        {
            let page = open_page(&session).unwrap();
            page.navigate("https://divar.ir/s/karaj/buy-apartment", Duration::from_secs(1))
                .unwrap();
        }
        let log = session.log();
        assert_eq!(log.opened, 1);
        assert_eq!(log.closed, 1);
    }

    #[test]
    fn open_page_retries_once() {
        let session = FakeSession::new(PageScript::default()).with_page_failures(1);
        assert!(open_page(&session).is_ok());

        let session = FakeSession::new(PageScript::default()).with_page_failures(2);
        assert!(matches!(open_page(&session), Err(BrowseError::Session(_))));
        assert_eq!(session.log().opened, 0);
    }

    #[test]
    fn scroll_position_detects_bottom() {
        let pos = ScrollPosition {
            offset: 1000,
            viewport_height: 800,
            document_height: 1800,
        };
        assert!(pos.at_bottom());
        assert!(!ScrollPosition {
            offset: 0,
            ..pos
        }
        .at_bottom());
    }
}
