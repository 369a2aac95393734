use crate::error::StoreError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info, warn};

/// What an output file holds, derived from its name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactKind {
    Individual { city: String, listing_type: String },
    Combined,
    Summary,
    Unknown,
}

impl ArtifactKind {
    /// Value reported as `type`: the listing type for individual files
    pub fn label(&self) -> &str {
        match self {
            ArtifactKind::Individual { listing_type, .. } => listing_type,
            ArtifactKind::Combined => "combined",
            ArtifactKind::Summary => "summary",
            ArtifactKind::Unknown => "unknown",
        }
    }

    pub fn city(&self) -> Option<&str> {
        match self {
            ArtifactKind::Individual { city, .. } => Some(city),
            _ => None,
        }
    }
}

/// Classify `<prefix>_<city>_<type>_<stamp>.json`, `<prefix>_combined_<stamp>.json`
/// and `<prefix>_summary_<stamp>.json`. The stamp never contains `_`.
pub fn classify(name: &str, prefix: &str) -> ArtifactKind {
    let Some(rest) = name
        .strip_suffix(".json")
        .and_then(|n| n.strip_prefix(prefix))
        .and_then(|n| n.strip_prefix('_'))
    else {
        return ArtifactKind::Unknown;
    };
    let Some((body, _stamp)) = rest.rsplit_once('_') else {
        return ArtifactKind::Unknown;
    };

    match body {
        "combined" => ArtifactKind::Combined,
        "summary" => ArtifactKind::Summary,
        _ => match body.rsplit_once('_') {
            Some((city, listing_type)) if !city.is_empty() && !listing_type.is_empty() => {
                ArtifactKind::Individual {
                    city: city.to_string(),
                    listing_type: listing_type.to_string(),
                }
            }
            _ => ArtifactKind::Unknown,
        },
    }
}

/// `1536` -> `1.5 KB`
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{value:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", UNITS[unit])
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
    pub size_formatted: String,
    pub modified: DateTime<Utc>,
    #[serde(rename = "type")]
    pub file_type: String,
    pub city: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
    pub items_per_page: usize,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl Pagination {
    fn new(page: usize, limit: usize, total_items: usize) -> Self {
        let total_pages = total_items.div_ceil(limit);
        Self {
            current_page: page,
            total_pages,
            total_items,
            items_per_page: limit,
            has_next_page: page < total_pages,
            has_prev_page: page > 1,
        }
    }
}

/// One page of `items`. Pages are 1-based; zero is read as 1.
fn paginate<T>(items: Vec<T>, page: usize, limit: usize) -> (Vec<T>, Pagination) {
    let page = page.max(1);
    let limit = limit.max(1);
    let pagination = Pagination::new(page, limit, items.len());
    let slice = items
        .into_iter()
        .skip((page - 1).saturating_mul(limit))
        .take(limit)
        .collect();
    (slice, pagination)
}

#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    pub file_type: Option<String>,
    pub city: Option<String>,
}

impl FileFilter {
    fn matches(&self, entry: &FileEntry) -> bool {
        self.file_type
            .as_deref()
            .map_or(true, |t| entry.file_type == t)
            && self
                .city
                .as_deref()
                .map_or(true, |c| entry.city.as_deref() == Some(c))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListing {
    pub files: Vec<FileEntry>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileContent {
    pub name: String,
    /// A page of records, or the whole document when it is not a list
    pub data: Value,
    pub pagination: Pagination,
}

const RECENT_FILES: usize = 10;

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlStats {
    pub total_files: usize,
    pub total_ads: usize,
    /// Listings per city, then per listing type
    pub cities: BTreeMap<String, BTreeMap<String, usize>>,
    pub last_crawl: Option<DateTime<Utc>>,
    pub recent_files: Vec<FileEntry>,
}

/// Read-side admin over the output directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    prefix: String,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    /// Path of `name` inside the store. Names that could escape it are rejected.
    fn resolve(&self, name: &str) -> Result<PathBuf, StoreError> {
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(self.dir.join(name))
    }

    /// Every JSON artifact, newest first. A missing directory holds nothing.
    async fn entries(&self) -> Result<Vec<FileEntry>, StoreError> {
        let mut entries = Vec::new();

        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(dir = %self.dir.display(), "Output directory does not exist yet");
                return Ok(entries);
            }
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(".json") {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }

            let kind = classify(&name, &self.prefix);
            entries.push(FileEntry {
                size: metadata.len(),
                size_formatted: format_size(metadata.len()),
                modified: metadata.modified().map(DateTime::<Utc>::from)?,
                file_type: kind.label().to_string(),
                city: kind.city().map(str::to_string),
                name,
            });
        }

        entries.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.name.cmp(&b.name)));
        Ok(entries)
    }

    /// JSON artifacts, newest first
    pub async fn list_files(
        &self,
        filter: &FileFilter,
        page: usize,
        limit: usize,
    ) -> Result<FileListing, StoreError> {
        let mut entries = self.entries().await?;
        entries.retain(|e| filter.matches(e));

        let (files, pagination) = paginate(entries, page, limit);
        Ok(FileListing { files, pagination })
    }

    /// Totals over the individual files: listings per city and type, the
    /// time of the latest artifact, and the most recent files
    pub async fn stats(&self) -> Result<CrawlStats, StoreError> {
        let entries = self.entries().await?;
        let mut stats = CrawlStats {
            total_files: entries.len(),
            last_crawl: entries.first().map(|e| e.modified),
            ..CrawlStats::default()
        };

        for entry in &entries {
            let ArtifactKind::Individual { city, listing_type } = classify(&entry.name, &self.prefix)
            else {
                continue;
            };
            let count = match self.read_json(&entry.name).await {
                Ok(Value::Array(records)) => records.len(),
                Ok(_) => continue,
                Err(e) => {
                    warn!(file = %entry.name, error = %e, "Skipping unreadable output file");
                    continue;
                }
            };

            stats.total_ads += count;
            *stats
                .cities
                .entry(city)
                .or_default()
                .entry(listing_type)
                .or_default() += count;
        }

        stats.recent_files = entries.into_iter().take(RECENT_FILES).collect();
        Ok(stats)
    }

    pub async fn read_json(&self, name: &str) -> Result<Value, StoreError> {
        let path = self.resolve(name)?;
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&raw)?)
    }

    /// Paged records of one file, optionally narrowed by a case-insensitive
    /// search over title, location and description
    pub async fn file_content(
        &self,
        name: &str,
        page: usize,
        limit: usize,
        search: Option<&str>,
    ) -> Result<FileContent, StoreError> {
        let items = match self.read_json(name).await? {
            Value::Array(items) => items,
            data => {
                return Ok(FileContent {
                    name: name.to_string(),
                    data,
                    pagination: Pagination::new(1, 1, 1),
                })
            }
        };

        let items = match search.map(str::trim).filter(|s| !s.is_empty()) {
            Some(term) => {
                let term = term.to_lowercase();
                items
                    .into_iter()
                    .filter(|item| matches_search(item, &term))
                    .collect()
            }
            None => items,
        };

        let (items, pagination) = paginate(items, page, limit);
        Ok(FileContent {
            name: name.to_string(),
            data: Value::Array(items),
            pagination,
        })
    }

    pub async fn delete_file(&self, name: &str) -> Result<(), StoreError> {
        let path = self.resolve(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!(file = name, "🗑️ Deleted output file");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

fn matches_search(item: &Value, term: &str) -> bool {
    ["title", "location", "description"].iter().any(|field| {
        item.get(field)
            .and_then(Value::as_str)
            .is_some_and(|text| text.to_lowercase().contains(term))
    })
}
