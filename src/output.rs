use crate::config::OutputOptions;
use crate::error::CrawlError;
use crate::models::ListingRecord;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Records and counters collected for one (city, type) pair
#[derive(Debug, Clone)]
pub struct PairResult {
    pub city: String,
    pub listing_type: String,
    /// References found by frontier discovery, before the cap
    pub discovered: usize,
    pub attempted: usize,
    pub skipped: usize,
    pub records: Vec<ListingRecord>,
}

impl PairResult {
    pub fn key(&self) -> String {
        pair_key(&self.city, &self.listing_type)
    }
}

pub fn pair_key(city: &str, listing_type: &str) -> String {
    format!("{city}:{listing_type}")
}

/// Everything a run produced, in configuration order
#[derive(Debug, Clone, Default)]
pub struct RunResults {
    pub pairs: Vec<PairResult>,
    pub stopped: bool,
}

impl RunResults {
    pub fn total_records(&self) -> usize {
        self.pairs.iter().map(|p| p.records.len()).sum()
    }

    pub fn total_skipped(&self) -> usize {
        self.pairs.iter().map(|p| p.skipped).sum()
    }

    pub fn totals_by_city(&self) -> BTreeMap<String, usize> {
        let mut totals = BTreeMap::new();
        for pair in &self.pairs {
            *totals.entry(pair.city.clone()).or_default() += pair.records.len();
        }
        totals
    }

    pub fn totals_by_type(&self) -> BTreeMap<String, usize> {
        let mut totals = BTreeMap::new();
        for pair in &self.pairs {
            *totals.entry(pair.listing_type.clone()).or_default() += pair.records.len();
        }
        totals
    }

    pub fn totals_by_pair(&self) -> BTreeMap<String, usize> {
        self.pairs
            .iter()
            .map(|pair| (pair.key(), pair.records.len()))
            .collect()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub generated_at: DateTime<Utc>,
    pub stopped: bool,
    pub total_records: usize,
    pub total_skipped: usize,
    pub totals_by_city: BTreeMap<String, usize>,
    pub totals_by_type: BTreeMap<String, usize>,
    pub totals_by_pair: BTreeMap<String, usize>,
}

impl Summary {
    pub fn from_results(results: &RunResults) -> Self {
        Self {
            generated_at: Utc::now(),
            stopped: results.stopped,
            total_records: results.total_records(),
            total_skipped: results.total_skipped(),
            totals_by_city: results.totals_by_city(),
            totals_by_type: results.totals_by_type(),
            totals_by_pair: results.totals_by_pair(),
        }
    }
}

/// Suffix shared by every artifact of one run, down to the millisecond.
/// Contains no `_`.
pub fn run_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H-%M-%S-%3f").to_string()
}

/// Writes the artifacts of one run. Paths depend only on the run stamp,
/// so writing again replaces the previous content.
pub struct OutputWriter {
    dir: PathBuf,
    prefix: String,
    options: OutputOptions,
    stamp: String,
}

impl OutputWriter {
    pub fn new(dir: &Path, prefix: &str, options: OutputOptions, stamp: &str) -> Self {
        Self {
            dir: dir.to_path_buf(),
            prefix: prefix.to_string(),
            options,
            stamp: stamp.to_string(),
        }
    }

    pub fn individual_path(&self, city: &str, listing_type: &str) -> PathBuf {
        self.dir
            .join(format!("{}_{city}_{listing_type}_{}.json", self.prefix, self.stamp))
    }

    pub fn combined_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}_combined_{}.json", self.prefix, self.stamp))
    }

    pub fn summary_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}_summary_{}.json", self.prefix, self.stamp))
    }

    /// Write every enabled artifact; returns the paths written
    pub fn write(&self, results: &RunResults) -> Result<Vec<PathBuf>, CrawlError> {
        fs::create_dir_all(&self.dir)?;
        let mut written = Vec::new();

        if self.options.individual {
            for pair in &results.pairs {
                let path = self.individual_path(&pair.city, &pair.listing_type);
                write_json(&path, &pair.records)?;
                info!(
                    path = %path.display(),
                    count = pair.records.len(),
                    "💾 Saved {} {} listings",
                    pair.city,
                    pair.listing_type
                );
                written.push(path);
            }
        }

        if self.options.combined {
            // { <type>: { <city>: [records] } }
            let mut combined: BTreeMap<&str, BTreeMap<&str, &[ListingRecord]>> = BTreeMap::new();
            for pair in &results.pairs {
                combined
                    .entry(pair.listing_type.as_str())
                    .or_default()
                    .insert(pair.city.as_str(), &pair.records);
            }
            let path = self.combined_path();
            write_json(&path, &combined)?;
            info!(path = %path.display(), count = results.total_records(), "💾 Saved combined file");
            written.push(path);
        }

        if self.options.summary {
            let path = self.summary_path();
            write_json(&path, &Summary::from_results(results))?;
            info!(path = %path.display(), "💾 Saved summary");
            written.push(path);
        }

        Ok(written)
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), CrawlError> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::rent_record;
    use serde_json::Value;

    fn results() -> RunResults {
        RunResults {
            pairs: vec![
                PairResult {
                    city: "karaj".to_string(),
                    listing_type: "rent".to_string(),
                    discovered: 5,
                    attempted: 3,
                    skipped: 1,
                    records: vec![
                        rent_record("karaj", "https://divar.ir/v/a/1"),
                        rent_record("karaj", "https://divar.ir/v/a/2"),
                    ],
                },
                PairResult {
                    city: "tehran".to_string(),
                    listing_type: "rent".to_string(),
                    discovered: 0,
                    attempted: 0,
                    skipped: 0,
                    records: Vec::new(),
                },
            ],
            stopped: false,
        }
    }

    #[test]
    fn stamp_keeps_milliseconds() {
        let at = DateTime::parse_from_rfc3339("2025-08-06T10:34:15.042Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(run_stamp(at), "2025-08-06T10-34-15-042");
    }

    fn read(path: &Path) -> Value {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn individual_and_summary_without_combined() {
        let dir = tempfile::tempdir().unwrap();
        let options = OutputOptions {
            individual: true,
            combined: false,
            summary: true,
        };
        let writer = OutputWriter::new(dir.path(), "divar", options, "2025-08-06T10-34-15-042");

        let written = writer.write(&results()).unwrap();

        assert_eq!(written.len(), 3);
        assert!(!writer.combined_path().exists());

        let karaj = read(&writer.individual_path("karaj", "rent"));
        assert_eq!(karaj.as_array().unwrap().len(), 2);
        assert_eq!(karaj[0]["city"], "karaj");

        let tehran = read(&writer.individual_path("tehran", "rent"));
        assert_eq!(tehran, Value::Array(Vec::new()));

        let summary = read(&writer.summary_path());
        assert_eq!(summary["totalRecords"], 2);
        assert_eq!(summary["totalSkipped"], 1);
        assert_eq!(summary["totalsByCity"]["karaj"], 2);
        assert_eq!(summary["totalsByCity"]["tehran"], 0);
        assert_eq!(summary["totalsByType"]["rent"], 2);
        assert_eq!(summary["totalsByPair"]["karaj:rent"], 2);
    }

    #[test]
    fn combined_groups_by_type_then_city() {
        let dir = tempfile::tempdir().unwrap();
        let options = OutputOptions {
            individual: false,
            combined: true,
            summary: false,
        };
        let writer = OutputWriter::new(dir.path(), "divar", options, "stamp");

        let written = writer.write(&results()).unwrap();
        assert_eq!(written, vec![writer.combined_path()]);

        let combined = read(&writer.combined_path());
        let karaj = combined["rent"]["karaj"].as_array().unwrap();
        assert_eq!(karaj.len(), 2);
        assert_eq!(karaj[1]["listingType"], "rent");
        assert_eq!(karaj[1]["sourceUrl"], "https://divar.ir/v/a/2");
        assert_eq!(combined["rent"]["tehran"], Value::Array(Vec::new()));
    }

    #[test]
    fn rewriting_a_run_replaces_its_files() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(dir.path(), "divar", OutputOptions::default(), "stamp");

        writer.write(&results()).unwrap();
        let mut fewer = results();
        fewer.pairs[0].records.truncate(1);
        fewer.stopped = true;
        writer.write(&fewer).unwrap();

        let karaj = read(&writer.individual_path("karaj", "rent"));
        assert_eq!(karaj.as_array().unwrap().len(), 1);
        assert_eq!(read(&writer.summary_path())["stopped"], true);
    }
}
