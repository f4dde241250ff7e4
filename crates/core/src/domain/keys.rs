use anyhow::ensure;
use std::fmt;

/// Calendar date (`YYYY-MM-DD`) used as a remote path segment and as a local
/// directory/file name. The date is passed through without calendar checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DateKey(String);

/// Ticker-like commodity identifier, always stored upper-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeatureKey(String);

impl DateKey {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        validate_segment("date", raw)?;
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn file_name(&self) -> String {
        format!("{}.json", self.0)
    }
}

impl FeatureKey {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        validate_segment("feature", raw)?;
        Ok(Self(raw.to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Keys end up as path segments on disk, so anything that could escape the raw root is rejected.
fn validate_segment(what: &str, raw: &str) -> anyhow::Result<()> {
    ensure!(!raw.is_empty(), "{what} must be non-empty");
    ensure!(
        raw != "." && raw != "..",
        "{what} must not be a relative path component (got {raw:?})"
    );
    ensure!(
        !raw.contains(['/', '\\']),
        "{what} must not contain path separators (got {raw:?})"
    );
    Ok(())
}
