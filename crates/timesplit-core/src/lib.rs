pub mod config;
pub mod error;
pub mod ingestion;
pub mod metadata;
pub mod partition;
pub mod session;
pub mod timestamps;
pub mod types;
pub mod validation;

pub use tokio_util::sync::CancellationToken;
pub use config::IngestConfig;
pub use error::{ConfigError, IngestError, PartitionError, PipelineError, Result};
pub use ingestion::{
    count_rows_in_file, ingest, ingest_file, IngestOptions, IngestReport, RowWarning,
};
pub use partition::{partition, partition_file, PartitionOutcome};
pub use session::{MonthlyDistribution, Session, SessionInfo, SessionStore};
pub use types::{
    DatasetMetadata, PartitionRequest, PartitionResult, TimeWindow, TimestampAnchor, Window,
};
pub use validation::{validate, RangeViolation, ValidationOutcome};
