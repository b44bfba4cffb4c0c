// Error kinds the pipeline needs to tell apart
use std::path::PathBuf;

/// Fatal for the whole project run.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration for `{project}`: {source}")]
    Load {
        project: String,
        #[source]
        source: config::ConfigError,
    },
    #[error("invalid configuration for `{project}`: {message}")]
    Invalid { project: String, message: String },
}

/// Recoverable, scoped to a single static input file.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("unexpected header: {0}")]
    Header(String),
    #[error("line {line}: {message}")]
    Record { line: usize, message: String },
    #[error("malformed row: {0}")]
    MalformedRow(String),
}

/// Outcome of a failed single-row insert.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InsertError {
    #[error("duplicate key: {0}")]
    Duplicate(String),
    #[error("insert failed: {0}")]
    Failed(String),
}
