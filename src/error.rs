use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the browser layer (session and page operations)
#[derive(Debug, Error)]
pub enum BrowseError {
    #[error("browser session unavailable: {0}")]
    Session(String),

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("timed out waiting for `{selector}`")]
    ElementTimeout { selector: String },

    #[error("page script failed: {0}")]
    Script(String),

    #[error("page not ready: {0}")]
    NotReady(String),
}

/// Outcome of a failed per-listing extraction. Never escapes the run loop.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("page unavailable: {0}")]
    PageUnavailable(#[source] BrowseError),

    #[error("listing exceeded its {budget_ms}ms processing budget")]
    Timeout { budget_ms: u64 },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("at least one city is required")]
    NoCities,

    #[error("at least one listing type is required")]
    NoListingTypes,

    #[error("`{0}` must be greater than zero")]
    NotPositive(&'static str),

    #[error("unknown city `{0}`")]
    UnknownCity(String),

    #[error("unknown listing type `{0}`")]
    UnknownListingType(String),

    #[error("invalid base url: {0}")]
    BaseUrl(#[from] url::ParseError),

    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed settings file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors surfaced to callers of the run orchestrator
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("session unavailable: {0}")]
    SessionUnavailable(#[source] BrowseError),

    #[error("a crawl run is already in progress")]
    AlreadyRunning,

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),

    #[error("failed to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("crawl worker panicked")]
    WorkerPanicked,
}

/// Errors from the artifact store and the importer
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid file name `{0}`")]
    InvalidName(String),

    #[error("file `{0}` not found")]
    NotFound(String),

    #[error("unrecognized artifact format in `{0}`")]
    UnknownFormat(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
