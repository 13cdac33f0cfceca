use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading source files.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("IO error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid record in {} line {line}: {source}", .path.display())]
    Json {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("No record found in {}", .0.display())]
    EmptyFile(PathBuf),

    #[error("Timestamp {0} ms is out of range")]
    TimestampOutOfRange(i64),
}
