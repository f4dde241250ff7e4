use crate::domain::{DateKey, FeatureKey};
use anyhow::Context;
use std::path::{Path, PathBuf};

/// Directory under the raw root that holds the bulk job's output.
pub const BULK_DIR_NAME: &str = "ALL_HISTORICAL_DATA";

/// The bulk directory name is not a valid feature: it would nest single-target output
/// inside the bulk tree.
pub fn is_reserved_feature(feature: &FeatureKey) -> bool {
    feature.as_str() == BULK_DIR_NAME
}

/// On-disk layout of extracted files:
///
/// ```text
/// <root>/<FEATURE>/<date>/<date>.json
/// <root>/ALL_HISTORICAL_DATA/<FEATURE>/<date>.json
/// ```
#[derive(Debug, Clone)]
pub struct RawLayout {
    root: PathBuf,
}

impl RawLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn target_dir(&self, feature: &FeatureKey, date: &DateKey) -> PathBuf {
        self.root.join(feature.as_str()).join(date.as_str())
    }

    pub fn target_file(&self, feature: &FeatureKey, date: &DateKey) -> PathBuf {
        self.target_dir(feature, date).join(date.file_name())
    }

    pub fn bulk_dir(&self) -> PathBuf {
        self.root.join(BULK_DIR_NAME)
    }

    pub fn bulk_feature_dir(&self, feature: &FeatureKey) -> PathBuf {
        self.bulk_dir().join(feature.as_str())
    }

    pub fn bulk_file(&self, feature: &FeatureKey, date: &DateKey) -> PathBuf {
        self.bulk_feature_dir(feature).join(date.file_name())
    }

    /// Finds a previously saved file, preferring the single-target tree over the bulk tree.
    pub async fn locate(
        &self,
        feature: &FeatureKey,
        date: &DateKey,
    ) -> anyhow::Result<Option<PathBuf>> {
        for candidate in [self.target_file(feature, date), self.bulk_file(feature, date)] {
            let exists = tokio::fs::try_exists(&candidate)
                .await
                .with_context(|| format!("failed to stat {}", candidate.display()))?;
            if exists {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }
}
