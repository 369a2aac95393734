use crate::config::{CityConfig, Identity, ListingTypeConfig, RunConfig};
use crate::error::{CrawlError, ExtractionError};
use crate::output::{pair_key, run_stamp, OutputWriter, PairResult, RunResults};
use crate::scrapers::{discover, extract_listing, open_page, BrowserSession, SessionFactory};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    /// Claimed by `start` while the browser session opens
    Starting,
    Running,
    Stopped,
}

/// Outcome of a finished run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub stopped: bool,
    pub extracted: usize,
    pub skipped: usize,
    pub totals_by_pair: BTreeMap<String, usize>,
    pub artifacts: Vec<PathBuf>,
    pub finished_at: DateTime<Utc>,
}

/// Pollable view of the orchestrator
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    pub state: RunState,
    /// True while a run is starting or in progress
    pub running: bool,
    pub last_activity: Option<DateTime<Utc>>,
    pub output_dir: PathBuf,
    pub stop_requested: bool,
    /// `city:type` currently being crawled
    pub current_pair: Option<String>,
    pub extracted: usize,
    pub skipped: usize,
    pub last_report: Option<RunReport>,
    pub last_error: Option<String>,
}

impl RunStatus {
    fn idle(output_dir: PathBuf) -> Self {
        Self {
            state: RunState::Idle,
            running: false,
            last_activity: None,
            output_dir,
            stop_requested: false,
            current_pair: None,
            extracted: 0,
            skipped: 0,
            last_report: None,
            last_error: None,
        }
    }

    fn set_state(&mut self, state: RunState) {
        self.state = state;
        self.running = matches!(state, RunState::Starting | RunState::Running);
    }
}

type Worker = JoinHandle<Result<RunReport, CrawlError>>;

/// Drives crawl runs over the (city × type) matrix, one at a time.
///
/// `start` opens the browser session on the caller's thread, so a browser
/// that cannot launch is reported to the caller; the run itself proceeds on
/// a worker thread. `stop` only raises a flag that the worker checks between
/// listings and between pairs.
pub struct Orchestrator<F: SessionFactory> {
    factory: Arc<F>,
    identity: Identity,
    status: Arc<Mutex<RunStatus>>,
    cancel: Arc<AtomicBool>,
    worker: Arc<Mutex<Option<Worker>>>,
    last_stamp: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl<F: SessionFactory> Clone for Orchestrator<F> {
    fn clone(&self) -> Self {
        Self {
            factory: self.factory.clone(),
            identity: self.identity.clone(),
            status: self.status.clone(),
            cancel: self.cancel.clone(),
            worker: self.worker.clone(),
            last_stamp: self.last_stamp.clone(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Stamp for a run starting at `now`, strictly after the previous one even
/// when both fall in the same millisecond
fn next_stamp(last: &mut Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let at = match *last {
        Some(prev) if now.timestamp_millis() <= prev.timestamp_millis() => {
            prev + chrono::Duration::milliseconds(1)
        }
        _ => now,
    };
    *last = Some(at);
    run_stamp(at)
}

impl<F: SessionFactory> Orchestrator<F> {
    pub fn new(factory: F, identity: Identity, output_dir: PathBuf) -> Self {
        Self {
            factory: Arc::new(factory),
            identity,
            status: Arc::new(Mutex::new(RunStatus::idle(output_dir))),
            cancel: Arc::new(AtomicBool::new(false)),
            worker: Arc::new(Mutex::new(None)),
            last_stamp: Arc::new(Mutex::new(None)),
        }
    }

    pub fn start(&self, config: RunConfig) -> Result<(), CrawlError> {
        config.validate()?;

        // Claim the orchestrator, then open the session without holding the lock
        let previous_state = {
            let mut status = lock(&self.status);
            if status.running {
                return Err(CrawlError::AlreadyRunning);
            }
            let previous = status.state;
            status.set_state(RunState::Starting);
            status.stop_requested = false;
            self.cancel.store(false, Ordering::SeqCst);
            previous
        };

        // The previous worker has already published its final state
        if let Some(previous) = lock(&self.worker).take() {
            let _ = previous.join();
        }

        let session = match self.factory.open(&self.identity) {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "Could not open browser session");
                let mut status = lock(&self.status);
                status.set_state(previous_state);
                status.last_error = Some(e.to_string());
                return Err(CrawlError::SessionUnavailable(e));
            }
        };

        let stamp = next_stamp(&mut lock(&self.last_stamp), Utc::now());
        {
            let mut status = lock(&self.status);
            let last_report = status.last_report.take();
            let stop_requested = status.stop_requested;
            *status = RunStatus {
                last_activity: Some(Utc::now()),
                stop_requested,
                last_report,
                ..RunStatus::idle(config.output_dir.clone())
            };
            status.set_state(RunState::Running);
        }

        info!(
            cities = config.cities.len(),
            types = config.listing_types.len(),
            max_per_type = config.max_per_type,
            %stamp,
            "Starting crawl run"
        );

        let run = Run {
            session,
            config,
            stamp,
            status: self.status.clone(),
            cancel: self.cancel.clone(),
        };

        let mut worker = lock(&self.worker);
        match thread::Builder::new()
            .name("crawl-run".to_string())
            .spawn(move || run.execute())
        {
            Ok(handle) => {
                *worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Could not spawn crawl worker");
                let mut status = lock(&self.status);
                status.set_state(previous_state);
                status.last_error = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Request a cooperative stop. Always succeeds.
    pub fn stop(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        let mut status = lock(&self.status);
        if status.running {
            info!("Stop requested, finishing current listing");
            status.stop_requested = true;
        }
    }

    pub fn status(&self) -> RunStatus {
        lock(&self.status).clone()
    }

    /// Block until the current run finishes. `None` when nothing was started.
    pub fn wait(&self) -> Option<Result<RunReport, CrawlError>> {
        let handle = lock(&self.worker).take()?;
        Some(handle.join().unwrap_or_else(|_| {
            let mut status = lock(&self.status);
            status.set_state(RunState::Idle);
            status.last_error = Some(CrawlError::WorkerPanicked.to_string());
            Err(CrawlError::WorkerPanicked)
        }))
    }
}

/// State owned by the worker thread for one run
struct Run<S: BrowserSession> {
    session: S,
    config: RunConfig,
    /// Suffix of every artifact this run writes
    stamp: String,
    status: Arc<Mutex<RunStatus>>,
    cancel: Arc<AtomicBool>,
}

impl<S: BrowserSession> Run<S> {
    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn touch(&self, update: impl FnOnce(&mut RunStatus)) {
        let mut status = lock(&self.status);
        update(&mut status);
        status.last_activity = Some(Utc::now());
    }

    fn execute(self) -> Result<RunReport, CrawlError> {
        let mut results = RunResults::default();
        let mut first = true;

        'pairs: for city in &self.config.cities {
            for listing_type in &self.config.listing_types {
                if self.cancelled() {
                    info!("Run stopped between pairs");
                    break 'pairs;
                }
                if !first {
                    thread::sleep(self.config.timing.page_load_delay());
                }
                first = false;

                let pair = self.crawl_pair(city, listing_type);
                info!(
                    city = %pair.city,
                    listing_type = %pair.listing_type,
                    discovered = pair.discovered,
                    attempted = pair.attempted,
                    extracted = pair.records.len(),
                    skipped = pair.skipped,
                    "✅ Pair finished"
                );
                results.pairs.push(pair);
            }
        }
        results.stopped = self.cancelled();

        let writer = OutputWriter::new(
            &self.config.output_dir,
            &self.config.file_prefix,
            self.config.output,
            &self.stamp,
        );
        let written = writer.write(&results);

        let mut status = lock(&self.status);
        status.set_state(if results.stopped {
            RunState::Stopped
        } else {
            RunState::Idle
        });
        status.current_pair = None;
        status.last_activity = Some(Utc::now());

        match written {
            Ok(artifacts) => {
                let report = RunReport {
                    stopped: results.stopped,
                    extracted: results.total_records(),
                    skipped: results.total_skipped(),
                    totals_by_pair: results.totals_by_pair(),
                    artifacts,
                    finished_at: Utc::now(),
                };
                info!(
                    extracted = report.extracted,
                    skipped = report.skipped,
                    stopped = report.stopped,
                    "🏁 Crawl run finished"
                );
                status.last_report = Some(report.clone());
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "Failed to write run output");
                status.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn crawl_pair(&self, city: &CityConfig, listing_type: &ListingTypeConfig) -> PairResult {
        let timing = &self.config.timing;
        let index_url = self.config.index_url(city, listing_type);
        self.touch(|s| s.current_pair = Some(pair_key(&city.name, &listing_type.name)));
        info!(city = %city.name, listing_type = %listing_type.name, url = %index_url, "Discovering listings");

        let mut references = match open_page(&self.session) {
            Ok(page) => match discover(&*page, &index_url, timing) {
                Ok(outcome) => {
                    debug!(
                        stop = ?outcome.stop,
                        scans = outcome.scans,
                        elapsed_ms = outcome.elapsed.as_millis() as u64,
                        "Index scrolled"
                    );
                    outcome.references
                }
                Err(e) => {
                    warn!(url = %index_url, error = %e, "Index page unavailable");
                    Vec::new()
                }
            },
            Err(e) => {
                warn!(url = %index_url, error = %e, "Could not open a page for the index");
                Vec::new()
            }
        };

        let discovered = references.len();
        references.truncate(self.config.max_per_type);

        let mut pair = PairResult {
            city: city.name.clone(),
            listing_type: listing_type.name.clone(),
            discovered,
            attempted: 0,
            skipped: 0,
            records: Vec::new(),
        };

        for (i, reference) in references.iter().enumerate() {
            if self.cancelled() {
                info!(remaining = references.len() - i, "Run stopped between listings");
                break;
            }
            if i > 0 {
                thread::sleep(timing.ad_process_delay());
            }

            info!(n = i + 1, total = references.len(), url = %reference.url, "📥 Processing listing");
            pair.attempted += 1;

            let outcome = open_page(&self.session)
                .map_err(ExtractionError::PageUnavailable)
                .and_then(|page| {
                    extract_listing(&*page, reference, &city.name, listing_type, timing)
                });

            match outcome {
                Ok(record) => {
                    pair.records.push(record);
                    self.touch(|s| s.extracted += 1);
                }
                Err(e) => {
                    warn!(url = %reference.url, error = %e, "⚠️ Skipping listing");
                    pair.skipped += 1;
                    self.touch(|s| s.skipped += 1);
                }
            }
        }

        pair
    }
}
