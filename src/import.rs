use crate::error::StoreError;
use crate::models::ListingRecord;
use crate::store::ArtifactStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Destination for imported listings
#[async_trait]
pub trait ListingSink: Send + Sync {
    async fn store(&self, record: &ListingRecord) -> Result<()>;

    /// Name used in logs
    fn name(&self) -> &'static str;
}

/// Posts each record as JSON to the backend's import endpoint
pub struct HttpSink {
    client: Client,
    endpoint: String,
}

impl HttpSink {
    pub fn new(backend_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/api/properties/import", backend_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl ListingSink for HttpSink {
    async fn store(&self, record: &ListingRecord) -> Result<()> {
        debug!(
            url = %record.source_url,
            kind = ?record.pricing.kind(),
            endpoint = %self.endpoint,
            "Posting listing"
        );
        self.client
            .post(&self.endpoint)
            .json(record)
            .send()
            .await
            .context("Failed to reach backend")?
            .error_for_status()
            .context("Backend rejected listing")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "backend"
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub filename: String,
    pub imported: usize,
    pub errors: usize,
}

/// Records of an individual file (`[records]`) or a combined file
/// (`{ type: { city: [records] } }`), still as raw JSON
fn raw_records(name: &str, data: Value) -> Result<Vec<Value>, StoreError> {
    let unknown = || StoreError::UnknownFormat(name.to_string());

    match data {
        Value::Array(items) => Ok(items),
        Value::Object(by_type) => {
            let mut items = Vec::new();
            for (_, by_city) in by_type {
                let Value::Object(by_city) = by_city else {
                    return Err(unknown());
                };
                for (_, records) in by_city {
                    let Value::Array(records) = records else {
                        return Err(unknown());
                    };
                    items.extend(records);
                }
            }
            Ok(items)
        }
        _ => Err(unknown()),
    }
}

/// Hand every record of an output file to `sink`. Malformed records and
/// rejected ones are counted as errors; the import carries on.
pub async fn import_file<S: ListingSink + ?Sized>(
    store: &ArtifactStore,
    name: &str,
    sink: &S,
) -> Result<ImportSummary, StoreError> {
    let data = store.read_json(name).await?;
    let items = raw_records(name, data)?;
    info!(file = name, count = items.len(), sink = sink.name(), "🔄 Starting import");

    let mut summary = ImportSummary {
        filename: name.to_string(),
        imported: 0,
        errors: 0,
    };

    for (i, item) in items.into_iter().enumerate() {
        let record: ListingRecord = match serde_json::from_value(item) {
            Ok(record) => record,
            Err(e) => {
                warn!(file = name, index = i, error = %e, "Skipping malformed record");
                summary.errors += 1;
                continue;
            }
        };

        match sink.store(&record).await {
            Ok(()) => summary.imported += 1,
            Err(e) => {
                warn!(url = %record.source_url, error = %e, "Import failed");
                summary.errors += 1;
            }
        }
    }

    info!(
        file = name,
        imported = summary.imported,
        errors = summary.errors,
        "✅ Import finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::rent_record;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        stored: Mutex<Vec<String>>,
        reject: Option<String>,
    }

    #[async_trait]
    impl ListingSink for RecordingSink {
        async fn store(&self, record: &ListingRecord) -> Result<()> {
            if self.reject.as_deref() == Some(record.source_url.as_str()) {
                anyhow::bail!("duplicate listing");
            }
            self.stored.lock().unwrap().push(record.source_url.clone());
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    fn record(url: &str) -> Value {
        serde_json::to_value(rent_record("karaj", url)).unwrap()
    }

    async fn store_with(name: &str, value: Value) -> (tempfile::TempDir, ArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join(name), value.to_string())
            .await
            .unwrap();
        let store = ArtifactStore::new(dir.path(), "divar");
        (dir, store)
    }

    #[tokio::test]
    async fn imports_individual_file_and_counts_failures() {
        let name = "divar_karaj_rent_x.json";
        let (_dir, store) = store_with(
            name,
            json!([record("u1"), { "title": "no url" }, record("u2"), record("u3")]),
        )
        .await;
        let sink = RecordingSink {
            reject: Some("u2".to_string()),
            ..Default::default()
        };

        let summary = import_file(&store, name, &sink).await.unwrap();

        assert_eq!(
            summary,
            ImportSummary {
                filename: name.to_string(),
                imported: 2,
                errors: 2,
            }
        );
        assert_eq!(*sink.stored.lock().unwrap(), vec!["u1", "u3"]);
    }

    #[tokio::test]
    async fn imports_combined_file() {
        let name = "divar_combined_x.json";
        let (_dir, store) = store_with(
            name,
            json!({
                "rent": { "karaj": [record("r1")], "tehran": [] },
                "sale": { "tehran": [record("s1"), record("s2")] },
            }),
        )
        .await;
        let sink = RecordingSink::default();

        let summary = import_file(&store, name, &sink).await.unwrap();
        assert_eq!(summary.imported, 3);
        assert_eq!(summary.errors, 0);
    }

    #[tokio::test]
    async fn empty_combined_file_imports_nothing() {
        let name = "divar_combined_x.json";
        let (_dir, store) = store_with(name, json!({})).await;
        let sink = RecordingSink::default();

        let summary = import_file(&store, name, &sink).await.unwrap();
        assert_eq!(summary.imported, 0);
        assert_eq!(summary.errors, 0);
        assert!(sink.stored.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn summary_files_are_not_importable() {
        let name = "divar_summary_x.json";
        let (_dir, store) = store_with(name, json!({ "totalRecords": 3, "stopped": false })).await;

        let err = import_file(&store, name, &RecordingSink::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownFormat(n) if n == name));
    }

    #[test]
    fn endpoint_ignores_trailing_slash() {
        let sink = HttpSink::new("http://localhost:3001/").unwrap();
        assert_eq!(sink.endpoint, "http://localhost:3001/api/properties/import");
    }
}
