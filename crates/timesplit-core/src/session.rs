//! On-disk sessions. Each session is a directory under the storage root named
//! by its UUID, holding the augmented file and the JSON documents produced by
//! ingestion and range selection.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use blake3::Hasher;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::IngestConfig;
use crate::error::{PipelineError, Result};
use crate::ingestion::{ingest_file, IngestReport};
use crate::partition::partition_file;
use crate::types::{DatasetMetadata, PartitionRequest, PartitionResult};
use crate::validation::validate;

pub const PROCESSED_FILE: &str = "processed.csv";
pub const METADATA_FILE: &str = "metadata.json";
pub const SESSION_FILE: &str = "session.json";
pub const RANGES_FILE: &str = "range_selection.json";
pub const DISTRIBUTION_FILE: &str = "monthly_distribution.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub original_file_name: String,
    pub processed_file_path: PathBuf,
    /// blake3 of the uploaded file, hex encoded.
    pub source_hash: String,
    pub created_at: DateTime<Utc>,
    pub is_processed: bool,
}

/// Persisted outcome of a range selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyDistribution {
    pub status: String,
    pub train_count: u64,
    pub test_count: u64,
    pub simulate_count: u64,
    pub train_monthly: BTreeMap<String, u64>,
    pub test_monthly: BTreeMap<String, u64>,
    pub sim_monthly: BTreeMap<String, u64>,
}

impl From<PartitionResult> for MonthlyDistribution {
    fn from(result: PartitionResult) -> Self {
        MonthlyDistribution {
            status: "Success".to_string(),
            train_count: result.train_count,
            test_count: result.test_count,
            simulate_count: result.sim_count,
            train_monthly: result.train_monthly,
            test_monthly: result.test_monthly,
            sim_monthly: result.sim_monthly,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn create(&self) -> Result<Session> {
        let id = Uuid::new_v4();
        let dir = self.root.join(id.to_string());
        tokio::fs::create_dir_all(&dir).await?;
        debug!(session = %id, dir = %dir.display(), "created session directory");
        Ok(Session { id, dir })
    }

    /// Opens an existing session. Ids that are not UUIDs are treated as
    /// unknown so they never resolve outside the storage root.
    pub async fn open(&self, id: &str) -> Result<Session> {
        let parsed =
            Uuid::parse_str(id.trim()).map_err(|_| PipelineError::SessionNotFound(id.to_string()))?;
        let dir = self.root.join(parsed.to_string());
        if !tokio::fs::try_exists(&dir).await? {
            return Err(PipelineError::SessionNotFound(id.to_string()));
        }
        Ok(Session { id: parsed, dir })
    }

    /// Sessions that finished ingestion, oldest first.
    pub async fn list(&self) -> Result<Vec<SessionInfo>> {
        if !tokio::fs::try_exists(&self.root).await? {
            return Ok(Vec::new());
        }

        let mut sessions = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let path = entry.path().join(SESSION_FILE);
            match read_json_opt::<SessionInfo>(&path).await {
                Ok(Some(info)) => sessions.push(info),
                Ok(None) => {}
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "ignoring unreadable session")
                }
            }
        }
        sessions.sort_by_key(|info| info.created_at);
        Ok(sessions)
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    dir: PathBuf,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn processed_path(&self) -> PathBuf {
        self.dir.join(PROCESSED_FILE)
    }

    /// Hashes and ingests `source`, then records the metadata and session
    /// info. A failed ingest leaves no processed file behind.
    pub async fn ingest(
        &self,
        source: &Path,
        config: &IngestConfig,
        cancel: &CancellationToken,
    ) -> Result<IngestReport> {
        let source_hash = hash_file(source).await?;
        let processed = self.processed_path();

        let report = match ingest_file(source, &processed, config, cancel).await {
            Ok(report) => report,
            Err(err) => {
                if let Err(cleanup) = tokio::fs::remove_file(&processed).await {
                    debug!(error = %cleanup, "no partial output to remove");
                }
                return Err(err.into());
            }
        };

        write_json(&self.dir.join(METADATA_FILE), &report.metadata).await?;
        let info = SessionInfo {
            session_id: self.id,
            original_file_name: report.metadata.file_name.clone(),
            processed_file_path: processed,
            source_hash,
            created_at: Utc::now(),
            is_processed: true,
        };
        write_json(&self.dir.join(SESSION_FILE), &info).await?;

        info!(
            session = %self.id,
            rows = report.metadata.row_count,
            hash = %info.source_hash,
            "session ingested"
        );
        Ok(report)
    }

    /// Validates `request` against the stored metadata, partitions the
    /// augmented file, and stores both the request and the distribution.
    pub async fn select_ranges(
        &self,
        request: &PartitionRequest,
        cancel: &CancellationToken,
    ) -> Result<MonthlyDistribution> {
        let metadata = self.read_metadata().await?;
        validate(request, &metadata)?;

        let outcome = partition_file(&self.processed_path(), request, cancel).await?;
        if outcome.skipped_rows > 0 {
            warn!(
                session = %self.id,
                skipped = outcome.skipped_rows,
                "rows without a readable timestamp were left out"
            );
        }

        write_json(&self.dir.join(RANGES_FILE), request).await?;
        let distribution = MonthlyDistribution::from(outcome.result);
        write_json(&self.dir.join(DISTRIBUTION_FILE), &distribution).await?;
        Ok(distribution)
    }

    pub async fn read_info(&self) -> Result<SessionInfo> {
        read_json_opt(&self.dir.join(SESSION_FILE))
            .await?
            .ok_or_else(|| PipelineError::SessionNotProcessed(self.id.to_string()))
    }

    pub async fn read_metadata(&self) -> Result<DatasetMetadata> {
        read_json_opt(&self.dir.join(METADATA_FILE))
            .await?
            .ok_or_else(|| PipelineError::SessionNotProcessed(self.id.to_string()))
    }

    pub async fn read_ranges(&self) -> Result<Option<PartitionRequest>> {
        read_json_opt(&self.dir.join(RANGES_FILE)).await
    }

    pub async fn read_distribution(&self) -> Result<Option<MonthlyDistribution>> {
        read_json_opt(&self.dir.join(DISTRIBUTION_FILE)).await
    }
}

async fn hash_file(path: &Path) -> Result<String> {
    let path = path.to_path_buf();
    let hash = task::spawn_blocking(move || -> std::io::Result<String> {
        let mut file = std::fs::File::open(&path)?;
        let mut hasher = Hasher::new();
        std::io::copy(&mut file, &mut hasher)?;
        Ok(hasher.finalize().to_hex().to_string())
    })
    .await
    .map_err(std::io::Error::other)??;
    Ok(hash)
}

/// Writes through a temporary sibling and renames it into place.
async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

async fn read_json_opt<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}
