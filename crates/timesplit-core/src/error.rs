// crates/timesplit-core/src/error.rs

use thiserror::Error;
use timesplit_parser::ParserError;

use crate::validation::RangeViolation;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("CSV input rejected: {0}")]
    Parser(#[from] ParserError),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Batch worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error("Worker pool admission closed: {0}")]
    PoolClosed(#[from] tokio::sync::AcquireError),

    #[error("Invalid ingest options: {0}")]
    InvalidOptions(String),

    #[error("Ingestion was cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum PartitionError {
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Augmented file has no '{0}' column")]
    MissingTimestampColumn(&'static str),

    #[error("Partition worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error("Partitioning was cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Partition(#[from] PartitionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Range validation failed: {0}")]
    Validation(#[from] RangeViolation),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Session {0} not found")]
    SessionNotFound(String),

    #[error("Session {0} has not been ingested yet")]
    SessionNotProcessed(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
