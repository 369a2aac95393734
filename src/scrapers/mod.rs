pub mod browser;
pub mod detail;
pub mod frontier;
pub mod traits;
pub mod types;

#[cfg(test)]
pub(crate) mod fake;

pub use browser::{open_page, ChromeLauncher};
pub use detail::extract_listing;
pub use frontier::discover;
pub use traits::{BrowserSession, SessionFactory};

use scraper::ElementRef;

/// Text content of an element, trimmed. Empty text yields `None`.
pub(crate) fn inner_text(element: ElementRef<'_>) -> Option<String> {
    let text = element.text().collect::<String>();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
