pub mod bulk;
pub mod error;
pub mod extractor;
pub mod single;

pub use bulk::run_extraction_all;
pub use error::{ExtractionFailure, FailureStage};
pub use extractor::Extractor;
pub use single::{run_extraction, Extraction, ExtractionStatus};
