use crate::config::Identity;
use crate::error::BrowseError;
use std::thread;
use std::time::Duration;

/// Scroll state reported after each scroll step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScrollPosition {
    pub offset: u64,
    pub viewport_height: u64,
    pub document_height: u64,
}

impl ScrollPosition {
    pub fn at_bottom(&self) -> bool {
        self.offset + self.viewport_height >= self.document_height
    }
}

/// One tab of a browsing session.
///
/// Everything the discoverer and extractor need from a live page goes
/// through this trait, so both can be driven by scripted pages in tests.
pub trait BrowserPage {
    /// Load `url` and wait for navigation to settle within `timeout`
    fn navigate(&self, url: &str, timeout: Duration) -> Result<(), BrowseError>;

    /// Block until an element matching `selector` exists
    fn wait_for(&self, selector: &str, timeout: Duration) -> Result<(), BrowseError>;

    fn click(&self, selector: &str, timeout: Duration) -> Result<(), BrowseError>;

    /// Scroll the window down by `pixels`
    fn scroll_by(&self, pixels: u32) -> Result<ScrollPosition, BrowseError>;

    /// Rendered HTML of the whole document
    fn content(&self) -> Result<String, BrowseError>;

    /// True when an element matching `selector` is present, not hidden,
    /// and lies fully inside the visible viewport
    fn is_in_viewport(&self, selector: &str) -> Result<bool, BrowseError>;

    /// Release the tab. Must be safe to call on an already-closed page.
    fn close(&self);

    /// Scroll step by step until the bottom is reached or `max_steps` run out
    fn scroll_to_bottom(
        &self,
        step: u32,
        pause: Duration,
        max_steps: usize,
    ) -> Result<(), BrowseError> {
        for _ in 0..max_steps {
            if self.scroll_by(step)?.at_bottom() {
                break;
            }
            thread::sleep(pause);
        }
        Ok(())
    }
}

/// An open browsing session that hands out pages
pub trait BrowserSession: Send + 'static {
    type Page: BrowserPage;

    fn new_page(&self) -> Result<Self::Page, BrowseError>;
}

/// Opens sessions with a given identity
pub trait SessionFactory: Send + Sync + 'static {
    type Session: BrowserSession;

    fn open(&self, identity: &Identity) -> Result<Self::Session, BrowseError>;
}
