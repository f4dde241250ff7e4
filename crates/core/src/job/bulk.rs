use crate::domain::{DateKey, FeatureKey};
use crate::job::error::{ExtractionFailure, FailureStage};
use crate::job::single::json_kind;
use crate::storage::files::{reset_dir, write_pretty_json};
use crate::storage::RawLayout;
use crate::store::{RemoteStore, HISTORICAL_PRICES_PATH};
use anyhow::Context;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::PathBuf;

/// Pulls every date and feature and writes them under `<root>/ALL_HISTORICAL_DATA/`.
///
/// Returns an empty list when the remote tree is absent. Files written before a failure are left
/// in place; the next run's reset removes them.
pub async fn run_extraction_all(
    store: &dyn RemoteStore,
    layout: &RawLayout,
) -> Result<Vec<PathBuf>, ExtractionFailure> {
    let bulk_dir = layout.bulk_dir();
    reset_dir(&bulk_dir)
        .await
        .map_err(|e| ExtractionFailure::from_anyhow(FailureStage::Filesystem, &e))?;

    store
        .connect()
        .await
        .map_err(|e| ExtractionFailure::from_anyhow(FailureStage::Connect, &e))?;

    let tree = store
        .get(HISTORICAL_PRICES_PATH)
        .await
        .map_err(|e| ExtractionFailure::from_anyhow(FailureStage::RemoteRead, &e))?;

    let Some(tree) = tree else {
        tracing::info!("no historical data stored");
        return Ok(Vec::new());
    };
    let dates = match tree {
        Value::Object(dates) => dates,
        other => {
            return Err(ExtractionFailure::new(
                FailureStage::UnexpectedShape,
                format!(
                    "expected an object of dates at {HISTORICAL_PRICES_PATH}, got {}",
                    json_kind(&other)
                ),
            ));
        }
    };

    let mut saved = Vec::new();
    let mut written = HashSet::new();
    for (raw_date, features) in dates {
        let features = match features {
            Value::Object(features) => features,
            other => {
                return Err(ExtractionFailure::new(
                    FailureStage::UnexpectedShape,
                    format!(
                        "expected an object of features for {raw_date}, got {}",
                        json_kind(&other)
                    ),
                ));
            }
        };
        let date = DateKey::parse(&raw_date)
            .map_err(|e| ExtractionFailure::from_anyhow(FailureStage::UnexpectedShape, &e))?;

        for (raw_feature, record) in features {
            let feature = FeatureKey::parse(&raw_feature)
                .map_err(|e| ExtractionFailure::from_anyhow(FailureStage::UnexpectedShape, &e))?;
            let path = write_record(layout, &date, &feature, record)
                .await
                .map_err(|e| ExtractionFailure::from_anyhow(FailureStage::Filesystem, &e))?;
            if written.insert(path.clone()) {
                saved.push(path);
            } else {
                // Keys differing only by case share one file; the later record wins.
                tracing::warn!(
                    %date,
                    raw_feature = %raw_feature,
                    path = %path.display(),
                    "feature key collides after normalization; file overwritten"
                );
            }
        }
    }

    tracing::info!(
        files = saved.len(),
        dir = %bulk_dir.display(),
        "bulk extraction saved"
    );
    Ok(saved)
}

async fn write_record(
    layout: &RawLayout,
    date: &DateKey,
    feature: &FeatureKey,
    record: Value,
) -> anyhow::Result<PathBuf> {
    let dir = layout.bulk_feature_dir(feature);
    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let path = layout.bulk_file(feature, date);
    let mut doc = Map::new();
    doc.insert(feature.to_string(), record);
    write_pretty_json(&path, &Value::Object(doc)).await?;
    Ok(path)
}
