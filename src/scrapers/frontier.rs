use crate::config::Timing;
use crate::error::BrowseError;
use crate::models::ListingReference;
use crate::scrapers::inner_text;
use crate::scrapers::traits::BrowserPage;
use crate::scrapers::types::selectors;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::sync::LazyLock;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

/// Attempts per scan before discovery gives up on the page
pub const SCAN_ATTEMPTS: usize = 3;
const SCAN_RETRY_PAUSE: Duration = Duration::from_millis(250);
const OVERLAY_WAIT: Duration = Duration::from_secs(5);

static CARD: LazyLock<Selector> = LazyLock::new(|| Selector::parse(selectors::POST_CARD).unwrap());
static CARD_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(selectors::POST_CARD_TITLE).unwrap());
static CARD_DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(selectors::POST_CARD_DESCRIPTION).unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The load-more button scrolled into view
    LoadMoreVisible,
    BudgetExhausted,
    /// The page could not be scanned within [`SCAN_ATTEMPTS`]
    ScanFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrontierState {
    Loading,
    Scanning,
    Continuing,
    Terminated(StopReason),
}

/// Listing references keyed by URL, kept in order of first discovery.
/// A later sighting of the same URL replaces the earlier one in place.
#[derive(Debug, Default)]
pub struct Frontier {
    order: Vec<ListingReference>,
    positions: HashMap<String, usize>,
}

impl Frontier {
    /// Merge a scan; returns how many URLs were new
    pub fn merge(&mut self, scan: Vec<ListingReference>) -> usize {
        let mut added = 0;
        for reference in scan {
            match self.positions.get(&reference.url) {
                Some(&pos) => self.order[pos] = reference,
                None => {
                    self.positions.insert(reference.url.clone(), self.order.len());
                    self.order.push(reference);
                    added += 1;
                }
            }
        }
        added
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn into_references(self) -> Vec<ListingReference> {
        self.order
    }
}

#[derive(Debug)]
pub struct FrontierOutcome {
    pub references: Vec<ListingReference>,
    pub stop: StopReason,
    pub scans: usize,
    pub elapsed: Duration,
}

/// Scroll an index page until the load-more button shows up or the time
/// budget runs out, collecting every listing card seen on the way. The
/// budget starts once the page is loaded, and at least one scan always runs.
///
/// Only a failure to load the index page itself is an error; a page that
/// stops answering mid-scan yields whatever was collected.
pub fn discover<P: BrowserPage>(
    page: &P,
    index_url: &str,
    timing: &Timing,
) -> Result<FrontierOutcome, BrowseError> {
    let base = Url::parse(index_url).map_err(|e| BrowseError::Navigation {
        url: index_url.to_string(),
        reason: e.to_string(),
    })?;

    let budget = timing.frontier_budget();
    let mut started = Instant::now();
    let mut frontier = Frontier::default();
    let mut scans = 0;
    let mut state = FrontierState::Loading;

    loop {
        state = match state {
            FrontierState::Loading => {
                page.navigate(index_url, timing.page_load_timeout())?;
                dismiss_overlay(page);
                started = Instant::now();
                FrontierState::Scanning
            }
            FrontierState::Scanning if scans > 0 && started.elapsed() >= budget => {
                FrontierState::Terminated(StopReason::BudgetExhausted)
            }
            FrontierState::Scanning => {
                if let Err(e) = page.scroll_by(timing.scroll_increment_px) {
                    debug!(error = %e, "Scroll step failed");
                }
                thread::sleep(timing.page_load_delay());

                match scan_with_retry(page, &base) {
                    Some(cards) => {
                        scans += 1;
                        let seen = cards.len();
                        let added = frontier.merge(cards);
                        debug!(scan = scans, seen, added, total = frontier.len(), "Scanned index page");

                        if page.is_in_viewport(selectors::LOAD_MORE).unwrap_or(false) {
                            FrontierState::Terminated(StopReason::LoadMoreVisible)
                        } else {
                            FrontierState::Continuing
                        }
                    }
                    None => FrontierState::Terminated(StopReason::ScanFailed),
                }
            }
            FrontierState::Continuing => FrontierState::Scanning,
            FrontierState::Terminated(stop) => {
                let elapsed = started.elapsed();
                if frontier.is_empty() {
                    warn!(url = index_url, ?stop, "No listing cards found on index page");
                }
                info!(
                    url = index_url,
                    found = frontier.len(),
                    scans,
                    ?stop,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Frontier discovery finished"
                );
                return Ok(FrontierOutcome {
                    references: frontier.into_references(),
                    stop,
                    scans,
                    elapsed,
                });
            }
        };
    }
}

fn dismiss_overlay<P: BrowserPage>(page: &P) {
    match page.click(selectors::MAP_OVERLAY_CLOSE, OVERLAY_WAIT) {
        Ok(()) => debug!("Map overlay closed"),
        Err(_) => debug!("Map overlay not present"),
    }
}

fn scan_with_retry<P: BrowserPage>(page: &P, base: &Url) -> Option<Vec<ListingReference>> {
    for attempt in 1..=SCAN_ATTEMPTS {
        match page.content() {
            Ok(html) => return Some(parse_cards(&html, base)),
            Err(e) => {
                debug!(attempt, error = %e, "Index scan failed");
                if attempt < SCAN_ATTEMPTS {
                    thread::sleep(SCAN_RETRY_PAUSE);
                }
            }
        }
    }
    None
}

/// Listing cards on an index page. Cards without an enclosing link are skipped.
pub fn parse_cards(html: &str, base: &Url) -> Vec<ListingReference> {
    let document = Html::parse_document(html);

    document
        .select(&CARD)
        .filter_map(|card| {
            let href = card
                .ancestors()
                .filter_map(ElementRef::wrap)
                .find(|el| el.value().name() == "a")?
                .value()
                .attr("href")?;
            let url = base.join(href).ok()?;

            Some(ListingReference {
                title: card
                    .select(&CARD_TITLE)
                    .next()
                    .and_then(inner_text)
                    .unwrap_or_default(),
                price_text: card
                    .select(&CARD_DESCRIPTION)
                    .next()
                    .and_then(inner_text)
                    .unwrap_or_default(),
                url: url.to_string(),
            })
        })
        .collect()
}
