use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    /// Credentials could not be loaded or parsed.
    Connect,
    /// Transport, HTTP, or decoding error while reading the remote store.
    RemoteRead,
    /// The remote value exists but is not shaped as date -> feature -> record.
    UnexpectedShape,
    /// Local directory reset or file write failed.
    Filesystem,
}

impl FailureStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::RemoteRead => "remote_read",
            Self::UnexpectedShape => "unexpected_shape",
            Self::Filesystem => "filesystem",
        }
    }
}

/// Why an extraction job produced no result. "No data" is not a failure; see
/// [`crate::job::ExtractionStatus`].
#[derive(Debug, Clone)]
pub struct ExtractionFailure {
    pub stage: FailureStage,
    pub detail: String,
}

impl ExtractionFailure {
    pub fn new(stage: FailureStage, err: impl fmt::Display) -> Self {
        Self {
            stage,
            detail: err.to_string(),
        }
    }

    pub(crate) fn from_anyhow(stage: FailureStage, err: &anyhow::Error) -> Self {
        Self {
            stage,
            detail: format!("{err:#}"),
        }
    }
}

impl fmt::Display for ExtractionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "extraction failed (stage={}): {}",
            self.stage.as_str(),
            self.detail
        )
    }
}

impl std::error::Error for ExtractionFailure {}
