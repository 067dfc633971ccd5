use std::path::PathBuf;

use thiserror::Error;

/// Failure taxonomy for the extraction pipeline.
///
/// Fatal variants (`MissingCredential`, `SchemaParse`, `TextSource`) abort
/// the run; the remaining variants are contained at table granularity by the
/// document loop.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("GEMINI_GIGA environment variable not set")]
    MissingCredential,

    #[error("failed to parse schema source {path}: {reason}")]
    SchemaParse { path: PathBuf, reason: String },

    #[error("no extractable text in {0}")]
    TextSource(PathBuf),

    #[error("table '{0}' is not defined in the loaded schema")]
    UnknownTable(String),

    #[error("extraction call failed for table '{table}': {reason}")]
    ExtractionFailed { table: String, reason: String },

    #[error("failed to write rows for table '{table}': {source}")]
    StorageWrite {
        table: String,
        #[source]
        source: std::io::Error,
    },
}
