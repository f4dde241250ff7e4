use crate::domain::{DateKey, FeatureKey};
use crate::job::error::{ExtractionFailure, FailureStage};
use crate::storage::files::{reset_dir, write_compact_json, write_pretty_json};
use crate::storage::RawLayout;
use crate::store::{RemoteStore, HISTORICAL_PRICES_PATH};
use serde_json::{json, Map, Value};
use std::path::PathBuf;

pub const NO_DATA_FOR_DATE: &str = "No data found for this date in Firebase.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStatus {
    /// The feature's record was written.
    Saved,
    /// Nothing is stored for the date; an error document was written instead.
    NoDataForDate,
    /// The date exists but the feature is missing or empty; an error document was written.
    NoDataForFeature,
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub path: PathBuf,
    pub status: ExtractionStatus,
}

/// Pulls one date's record for one feature and replaces `<root>/<FEATURE>/<date>/` with it.
///
/// The target directory is wiped before anything else happens, so no file from an earlier run
/// survives even when this run fails.
pub async fn run_extraction(
    store: &dyn RemoteStore,
    date: &DateKey,
    feature: &FeatureKey,
    layout: &RawLayout,
) -> Result<Extraction, ExtractionFailure> {
    let target_dir = layout.target_dir(feature, date);
    let target_file = layout.target_file(feature, date);

    reset_dir(&target_dir)
        .await
        .map_err(|e| ExtractionFailure::from_anyhow(FailureStage::Filesystem, &e))?;

    store
        .connect()
        .await
        .map_err(|e| ExtractionFailure::from_anyhow(FailureStage::Connect, &e))?;

    let path = format!("{HISTORICAL_PRICES_PATH}/{date}");
    let day = store
        .get(&path)
        .await
        .map_err(|e| ExtractionFailure::from_anyhow(FailureStage::RemoteRead, &e))?;

    let (document, status) = match day {
        None => {
            tracing::info!(%date, "no data stored for date");
            (
                json!({ "error": NO_DATA_FOR_DATE }),
                ExtractionStatus::NoDataForDate,
            )
        }
        Some(Value::Object(mut features)) => {
            match features
                .remove(feature.as_str())
                .filter(|record| !is_empty_record(record))
            {
                Some(record) => {
                    let mut doc = Map::new();
                    doc.insert(feature.to_string(), record);
                    (Value::Object(doc), ExtractionStatus::Saved)
                }
                None => {
                    tracing::info!(%date, %feature, "no data stored for feature");
                    (
                        json!({ "error": format!("No data found for feature '{feature}' on {date}.") }),
                        ExtractionStatus::NoDataForFeature,
                    )
                }
            }
        }
        Some(other) => {
            return Err(ExtractionFailure::new(
                FailureStage::UnexpectedShape,
                format!(
                    "expected an object of features at {path}, got {}",
                    json_kind(&other)
                ),
            ));
        }
    };

    // Records are indented; the error documents stay on one line.
    let written = match status {
        ExtractionStatus::Saved => write_pretty_json(&target_file, &document).await,
        _ => write_compact_json(&target_file, &document).await,
    };
    written.map_err(|e| ExtractionFailure::from_anyhow(FailureStage::Filesystem, &e))?;

    tracing::info!(
        %date,
        %feature,
        ?status,
        path = %target_file.display(),
        "extraction saved"
    );

    Ok(Extraction {
        path: target_file,
        status,
    })
}

// Missing-or-falsy: an empty container, empty string, false, or zero counts as no data.
fn is_empty_record(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

pub(crate) fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use serde_json::json;

    struct BrokenStore {
        connect_ok: bool,
    }

    #[async_trait::async_trait]
    impl RemoteStore for BrokenStore {
        fn store_name(&self) -> &'static str {
            "broken"
        }

        async fn connect(&self) -> anyhow::Result<()> {
            anyhow::ensure!(self.connect_ok, "failed to parse service account credentials");
            Ok(())
        }

        async fn get(&self, _path: &str) -> anyhow::Result<Option<Value>> {
            anyhow::bail!("firebase read HTTP 503 Service Unavailable")
        }
    }

    fn prices() -> InMemoryStore {
        InMemoryStore::new(json!({
            "historical_prices": {
                "2025-10-14": {
                    "GC": {"Close": 2000.0, "Open": 1990.0},
                    "SI": {"Close": 24.0, "Open": 23.5},
                    "PL": {}
                }
            }
        }))
    }

    fn keys(date: &str, feature: &str) -> (DateKey, FeatureKey) {
        (
            DateKey::parse(date).unwrap(),
            FeatureKey::parse(feature).unwrap(),
        )
    }

    fn read_json(path: &std::path::Path) -> Value {
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn saves_record_and_clears_stale_files() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = RawLayout::new(tmp.path());
        let (date, feature) = keys("2025-10-14", "GC");

        let target_dir = layout.target_dir(&feature, &date);
        std::fs::create_dir_all(&target_dir).unwrap();
        std::fs::write(target_dir.join("old_file.txt"), "old data").unwrap();

        let out = run_extraction(&prices(), &date, &feature, &layout)
            .await
            .unwrap();

        assert_eq!(out.status, ExtractionStatus::Saved);
        assert_eq!(out.path, target_dir.join("2025-10-14.json"));
        assert!(!target_dir.join("old_file.txt").exists());
        assert_eq!(std::fs::read_dir(&target_dir).unwrap().count(), 1);

        let saved = read_json(&out.path);
        assert_eq!(saved, json!({"GC": {"Close": 2000.0, "Open": 1990.0}}));
    }

    #[tokio::test]
    async fn lower_case_feature_lands_in_the_same_place() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = RawLayout::new(tmp.path());

        let (date, lower) = keys("2025-10-14", "gc");
        let (_, upper) = keys("2025-10-14", "GC");

        let a = run_extraction(&prices(), &date, &lower, &layout)
            .await
            .unwrap();
        let a_content = std::fs::read(&a.path).unwrap();
        let b = run_extraction(&prices(), &date, &upper, &layout)
            .await
            .unwrap();

        assert_eq!(a.path, b.path);
        assert_eq!(a_content, std::fs::read(&b.path).unwrap());
        assert!(read_json(&b.path).get("GC").is_some());
    }

    #[tokio::test]
    async fn missing_date_writes_error_document() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = RawLayout::new(tmp.path());
        let (date, feature) = keys("2025-01-01", "GC");

        let out = run_extraction(&prices(), &date, &feature, &layout)
            .await
            .unwrap();

        assert_eq!(out.status, ExtractionStatus::NoDataForDate);
        assert_eq!(
            std::fs::read(&out.path).unwrap(),
            br#"{"error": "No data found for this date in Firebase."}"#.to_vec()
        );
    }

    #[tokio::test]
    async fn missing_or_empty_feature_writes_feature_error() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = RawLayout::new(tmp.path());

        for name in ["HG", "PL"] {
            let (date, feature) = keys("2025-10-14", name);
            let out = run_extraction(&prices(), &date, &feature, &layout)
                .await
                .unwrap();

            assert_eq!(out.status, ExtractionStatus::NoDataForFeature);
            assert_eq!(
                read_json(&out.path),
                json!({"error": format!("No data found for feature '{name}' on 2025-10-14.")})
            );
        }
    }

    #[tokio::test]
    async fn connect_failure_is_reported_after_reset() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = RawLayout::new(tmp.path());
        let (date, feature) = keys("2025-10-14", "GC");

        let target_dir = layout.target_dir(&feature, &date);
        std::fs::create_dir_all(&target_dir).unwrap();
        std::fs::write(target_dir.join("2025-10-14.json"), "{}").unwrap();

        let err = run_extraction(&BrokenStore { connect_ok: false }, &date, &feature, &layout)
            .await
            .unwrap_err();

        assert_eq!(err.stage, FailureStage::Connect);
        assert!(target_dir.is_dir());
        assert_eq!(std::fs::read_dir(&target_dir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn read_failure_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = RawLayout::new(tmp.path());
        let (date, feature) = keys("2025-10-14", "GC");

        let err = run_extraction(&BrokenStore { connect_ok: true }, &date, &feature, &layout)
            .await
            .unwrap_err();

        assert_eq!(err.stage, FailureStage::RemoteRead);
        assert!(err.to_string().contains("503"));
        assert!(!layout.target_file(&feature, &date).exists());
    }

    #[tokio::test]
    async fn non_object_day_is_a_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = RawLayout::new(tmp.path());
        let store = InMemoryStore::new(json!({"historical_prices": {"2025-10-14": [1, 2]}}));
        let (date, feature) = keys("2025-10-14", "GC");

        let err = run_extraction(&store, &date, &feature, &layout)
            .await
            .unwrap_err();
        assert_eq!(err.stage, FailureStage::UnexpectedShape);
    }

    #[test]
    fn falsy_values_count_as_empty() {
        assert!(is_empty_record(&json!(null)));
        assert!(is_empty_record(&json!({})));
        assert!(is_empty_record(&json!([])));
        assert!(is_empty_record(&json!("")));
        assert!(is_empty_record(&json!(0)));
        assert!(is_empty_record(&json!(false)));
        assert!(!is_empty_record(&json!({"Close": 0.0})));
        assert!(!is_empty_record(&json!(1.5)));
    }
}
