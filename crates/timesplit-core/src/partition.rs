//! Streams an augmented CSV and buckets each row into the train, test or
//! simulate window by its `synthetic_timestamp`.

use std::io::Read;
use std::path::Path;
use std::time::Instant;

use csv::{ByteRecord, ReaderBuilder};
use timesplit_parser::{Header, SYNTHETIC_TIMESTAMP_COLUMN};
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::PartitionError;
use crate::timestamps::{month_key, parse_timestamp};
use crate::types::{PartitionRequest, PartitionResult};

const CANCEL_CHECK_EVERY_ROWS: u64 = 4096;
const MAX_LOGGED_SKIPS: u64 = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionOutcome {
    pub result: PartitionResult,
    pub rows_scanned: u64,
    /// Rows whose timestamp was missing or unparseable.
    pub skipped_rows: u64,
}

/// Single pass over `reader`. Windows are tested in train, test, simulate
/// order and a row lands in the first one containing it; rows outside every
/// window are ignored.
pub fn partition<R: Read>(
    reader: R,
    request: &PartitionRequest,
    cancel: &CancellationToken,
) -> Result<PartitionOutcome, PartitionError> {
    let started = Instant::now();
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let names = csv_reader
        .byte_headers()?
        .iter()
        .map(|name| String::from_utf8_lossy(name).into_owned())
        .collect();
    let ts_index = Header::new(names)
        .position(SYNTHETIC_TIMESTAMP_COLUMN)
        .ok_or(PartitionError::MissingTimestampColumn(SYNTHETIC_TIMESTAMP_COLUMN))?;
    debug!(column = ts_index, "located timestamp column");

    let mut result = PartitionResult::default();
    let mut rows_scanned = 0u64;
    let mut skipped_rows = 0u64;
    let mut record = ByteRecord::new();

    while csv_reader.read_byte_record(&mut record)? {
        if rows_scanned % CANCEL_CHECK_EVERY_ROWS == 0 && cancel.is_cancelled() {
            return Err(PartitionError::Cancelled);
        }
        rows_scanned += 1;

        let parsed = record
            .get(ts_index)
            .and_then(|raw| std::str::from_utf8(raw).ok())
            .and_then(parse_timestamp);
        let Some(ts) = parsed else {
            skipped_rows += 1;
            if skipped_rows <= MAX_LOGGED_SKIPS {
                let line = record.position().map(|pos| pos.line()).unwrap_or_default();
                warn!(line, "skipping row without a readable synthetic timestamp");
            }
            continue;
        };

        if let Some(window) = request.classify(ts) {
            result.record(window, month_key(ts));
        }
    }

    info!(
        rows_scanned,
        skipped_rows,
        train = result.train_count,
        test = result.test_count,
        simulate = result.sim_count,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "partition complete"
    );

    Ok(PartitionOutcome {
        result,
        rows_scanned,
        skipped_rows,
    })
}

/// Runs [`partition`] over a file on the blocking pool.
pub async fn partition_file(
    path: &Path,
    request: &PartitionRequest,
    cancel: &CancellationToken,
) -> Result<PartitionOutcome, PartitionError> {
    let path = path.to_path_buf();
    let request = *request;
    let cancel = cancel.clone();
    task::spawn_blocking(move || {
        let file = std::fs::File::open(&path)?;
        partition(std::io::BufReader::new(file), &request, &cancel)
    })
    .await?
}
