//! Parallel CSV ingestion: reads the raw file in fixed-size batches, parses and
//! stamps each batch on the blocking pool, and writes the augmented rows back
//! in original order.
//!
//! At most `workers` batches are parsed at once; the producer waits on a
//! semaphore permit before spawning the next one. The producer is also the
//! only writer: it keeps join handles in submission order and writes a batch
//! only after every earlier batch has been written, so completion order never
//! leaks into the output. Aggregates are per-batch values merged after the
//! last batch is drained.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDateTime, Utc};
use timesplit_parser::{
    count_rows, split_fields, write_row, Header, ParserError, RawRecord, RecordAssembler,
    RowIssue, SYNTHETIC_TIMESTAMP_COLUMN,
};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter,
};
use tokio::sync::Semaphore;
use tokio::task::{self, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{IngestConfig, DEFAULT_BATCH_SIZE, DEFAULT_MAX_LOGGED_WARNINGS};
use crate::error::IngestError;
use crate::metadata::{build_metadata, BatchSummary};
use crate::timestamps::{format_synthetic, synthetic_at};
use crate::types::DatasetMetadata;

const IO_BUFFER: usize = 64 * 1024;
const PROGRESS_EVERY_ROWS: u64 = 100_000;
const CANCEL_CHECK_EVERY_ROWS: usize = 1024;

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub batch_size: usize,
    pub workers: usize,
    /// Timestamp of data row 0.
    pub base_timestamp: NaiveDateTime,
    pub max_logged_warnings: usize,
    /// Pre-counted row total, only used for progress messages.
    pub expected_rows: Option<u64>,
}

impl IngestOptions {
    pub fn new(base_timestamp: NaiveDateTime) -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            workers: crate::config::default_workers(),
            base_timestamp,
            max_logged_warnings: DEFAULT_MAX_LOGGED_WARNINGS,
            expected_rows: None,
        }
    }

    pub fn from_config(config: &IngestConfig, base_timestamp: NaiveDateTime) -> Self {
        Self {
            batch_size: config.batch_size,
            workers: config.workers,
            base_timestamp,
            max_logged_warnings: config.max_logged_warnings,
            expected_rows: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_max_logged_warnings(mut self, limit: usize) -> Self {
        self.max_logged_warnings = limit;
        self
    }

    pub fn with_expected_rows(mut self, rows: u64) -> Self {
        self.expected_rows = Some(rows);
        self
    }

    fn validate(&self) -> Result<(), IngestError> {
        if self.batch_size == 0 {
            return Err(IngestError::InvalidOptions(
                "batch size must be greater than zero".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(IngestError::InvalidOptions(
                "worker count must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// A rejected data record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowWarning {
    /// Physical line on which the record starts (header is line 1).
    pub line: u64,
    pub row_index: u64,
    pub issue: RowIssue,
}

#[derive(Debug, Clone)]
pub struct IngestReport {
    pub metadata: DatasetMetadata,
    pub malformed_rows: u64,
    pub blank_lines: u64,
    pub batches: usize,
    /// First `max_logged_warnings` rejected rows, in file order.
    pub warnings: Vec<RowWarning>,
}

/// Counts data rows of a file on the blocking pool.
pub async fn count_rows_in_file(path: &Path) -> std::io::Result<u64> {
    let path = path.to_path_buf();
    task::spawn_blocking(move || count_rows(std::fs::File::open(&path)?))
        .await
        .map_err(std::io::Error::other)?
}

/// Pre-counts `input`, resolves the configured anchor, and writes the
/// augmented copy to `output`.
pub async fn ingest_file(
    input: &Path,
    output: &Path,
    config: &IngestConfig,
    cancel: &CancellationToken,
) -> Result<IngestReport, IngestError> {
    let started = Instant::now();
    let expected_rows = count_rows_in_file(input).await?;
    info!(
        path = %input.display(),
        rows = expected_rows,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "counted rows"
    );

    let base = config
        .anchor
        .resolve(expected_rows, Utc::now().naive_utc());
    let options = IngestOptions::from_config(config, base).with_expected_rows(expected_rows);
    let file_name = input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let reader = tokio::fs::File::open(input).await?;
    let writer = tokio::fs::File::create(output).await?;
    ingest(&file_name, reader, writer, &options, cancel).await
}

/// Reads a header plus data rows from `input` and writes the augmented rows
/// to `output`.
///
/// A missing or blank header is fatal. Rows with the wrong field count or
/// invalid UTF-8 are skipped and reported; they keep their row index, so
/// every accepted row `i` is stamped `base + i` seconds.
pub async fn ingest<R, W>(
    file_name: &str,
    input: R,
    output: W,
    options: &IngestOptions,
    cancel: &CancellationToken,
) -> Result<IngestReport, IngestError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    options.validate()?;
    let started = Instant::now();
    let processed_at = Utc::now().naive_utc();

    let reader = BufReader::with_capacity(IO_BUFFER, input);
    let mut source = BatchSource::new(reader, options.batch_size);
    let mut sink = BufWriter::with_capacity(IO_BUFFER, output);

    let header_record = source
        .next_record()
        .await?
        .ok_or(ParserError::MissingHeader)?;
    let header = Header::parse(&header_record)?;

    info!(
        file = file_name,
        columns = header.len(),
        batch_size = options.batch_size,
        workers = options.workers,
        base = %format_synthetic(options.base_timestamp),
        "starting ingestion"
    );
    match header.response_index() {
        Some(idx) => debug!(file = file_name, column = idx, "found response column"),
        None => warn!(file = file_name, "no 'response' column found; pass rate will be 0"),
    }

    let mut header_bytes = Vec::new();
    write_row(&mut header_bytes, header.names(), Some(SYNTHETIC_TIMESTAMP_COLUMN));
    sink.write_all(&header_bytes).await?;

    let context = Arc::new(BatchContext {
        base: options.base_timestamp,
        expected_fields: header.len(),
        response_index: header.response_index(),
        max_warnings: options.max_logged_warnings,
        cancel: cancel.clone(),
    });
    let permits = Arc::new(Semaphore::new(options.workers));
    let mut sequencer = Sequencer::new(options.workers * 2, options.max_logged_warnings);
    let mut reported_progress = 0;

    loop {
        if cancel.is_cancelled() {
            sequencer.abandon().await;
            return Err(IngestError::Cancelled);
        }

        let Some(batch) = source.next_batch().await? else {
            break;
        };
        let queued = batch.first_row + batch.records.len() as u64;

        let permit = tokio::select! {
            permit = Arc::clone(&permits).acquire_owned() => permit?,
            _ = cancel.cancelled() => {
                sequencer.abandon().await;
                return Err(IngestError::Cancelled);
            }
        };
        let context = Arc::clone(&context);
        sequencer.submit(task::spawn_blocking(move || {
            let _permit = permit;
            process_batch(&context, batch)
        }));

        if let Err(err) = sequencer.drain_ready(&mut sink).await {
            sequencer.abandon().await;
            return Err(err);
        }

        if queued / PROGRESS_EVERY_ROWS > reported_progress {
            reported_progress = queued / PROGRESS_EVERY_ROWS;
            info!(
                queued,
                expected = options.expected_rows,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "queued rows for processing"
            );
        }
    }

    if let Err(err) = sequencer.drain_all(&mut sink).await {
        sequencer.abandon().await;
        return Err(err);
    }
    sink.flush().await?;

    let Sequencer {
        summaries,
        warnings,
        malformed_rows,
        batches,
        ..
    } = sequencer;

    if malformed_rows > warnings.len() as u64 {
        warn!(
            file = file_name,
            malformed_rows,
            logged = warnings.len(),
            "additional malformed rows were skipped without individual warnings"
        );
    }

    let metadata = build_metadata(file_name, header.len(), summaries, processed_at);
    let elapsed = started.elapsed();
    info!(
        file = %metadata.file_name,
        rows = metadata.row_count,
        columns = metadata.column_count,
        pass_rate = metadata.pass_rate,
        start = %format_synthetic(metadata.start_timestamp),
        end = %format_synthetic(metadata.end_timestamp),
        malformed_rows,
        blank_lines = source.blank_lines,
        elapsed_ms = elapsed.as_millis() as u64,
        rows_per_sec = (metadata.row_count as f64 / elapsed.as_secs_f64().max(1e-9)) as u64,
        "ingestion complete"
    );

    Ok(IngestReport {
        metadata,
        malformed_rows,
        blank_lines: source.blank_lines,
        batches,
        warnings,
    })
}

/// Contiguous slice of data records, tagged with the index of its first row.
struct Batch {
    first_row: u64,
    records: Vec<RawRecord>,
}

struct BatchSource<R> {
    reader: R,
    assembler: RecordAssembler,
    line: Vec<u8>,
    batch_size: usize,
    next_row: u64,
    blank_lines: u64,
}

impl<R: AsyncBufRead + Unpin> BatchSource<R> {
    fn new(reader: R, batch_size: usize) -> Self {
        Self {
            reader,
            assembler: RecordAssembler::new(),
            line: Vec::new(),
            batch_size,
            next_row: 0,
            blank_lines: 0,
        }
    }

    async fn next_record(&mut self) -> std::io::Result<Option<RawRecord>> {
        loop {
            self.line.clear();
            if self.reader.read_until(b'\n', &mut self.line).await? == 0 {
                return Ok(self.assembler.finish());
            }
            if let Some(record) = self.assembler.push_line(&self.line) {
                return Ok(Some(record));
            }
        }
    }

    async fn next_batch(&mut self) -> std::io::Result<Option<Batch>> {
        let mut records = Vec::with_capacity(self.batch_size.min(8192));
        while records.len() < self.batch_size {
            match self.next_record().await? {
                Some(record) if record.is_blank() => self.blank_lines += 1,
                Some(record) => records.push(record),
                None => break,
            }
        }
        if records.is_empty() {
            return Ok(None);
        }

        let batch = Batch {
            first_row: self.next_row,
            records,
        };
        self.next_row += batch.records.len() as u64;
        Ok(Some(batch))
    }
}

struct BatchContext {
    base: NaiveDateTime,
    expected_fields: usize,
    response_index: Option<usize>,
    max_warnings: usize,
    cancel: CancellationToken,
}

struct BatchOutput {
    bytes: Vec<u8>,
    summary: BatchSummary,
    warnings: Vec<RowWarning>,
    cancelled: bool,
}

fn process_batch(ctx: &BatchContext, batch: Batch) -> BatchOutput {
    let estimate: usize = batch.records.iter().map(|r| r.bytes.len() + 21).sum();
    let mut bytes = Vec::with_capacity(estimate);
    let mut summary = BatchSummary::default();
    let mut warnings = Vec::new();
    let mut cancelled = false;

    for (offset, record) in batch.records.iter().enumerate() {
        if offset % CANCEL_CHECK_EVERY_ROWS == 0 && ctx.cancel.is_cancelled() {
            cancelled = true;
            break;
        }

        let row_index = batch.first_row + offset as u64;
        let issue = match std::str::from_utf8(&record.bytes) {
            Err(_) => Some(RowIssue::Encoding),
            Ok(text) => {
                let fields = split_fields(text);
                if fields.len() == ctx.expected_fields {
                    let ts = synthetic_at(ctx.base, row_index);
                    let passed = ctx
                        .response_index
                        .and_then(|idx| fields.get(idx))
                        .is_some_and(|value| is_pass(value));
                    summary.record_row(ts, passed);
                    write_row(&mut bytes, &fields, Some(format_synthetic(ts).as_str()));
                    None
                } else {
                    Some(RowIssue::FieldCount {
                        expected: ctx.expected_fields,
                        found: fields.len(),
                    })
                }
            }
        };

        if let Some(issue) = issue {
            summary.record_malformed();
            if warnings.len() < ctx.max_warnings {
                warnings.push(RowWarning {
                    line: record.line,
                    row_index,
                    issue,
                });
            }
        }
    }

    BatchOutput {
        bytes,
        summary,
        warnings,
        cancelled,
    }
}

/// A response counts as a pass when it reads as the number 1.
fn is_pass(value: &str) -> bool {
    value
        .trim()
        .parse::<f64>()
        .map(|parsed| parsed == 1.0)
        .unwrap_or(false)
}

/// Releases batch output strictly in submission order.
struct Sequencer {
    pending: VecDeque<JoinHandle<BatchOutput>>,
    max_pending: usize,
    max_warnings: usize,
    summaries: Vec<BatchSummary>,
    warnings: Vec<RowWarning>,
    malformed_rows: u64,
    batches: usize,
}

impl Sequencer {
    fn new(max_pending: usize, max_warnings: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            max_pending: max_pending.max(1),
            max_warnings,
            summaries: Vec::new(),
            warnings: Vec::new(),
            malformed_rows: 0,
            batches: 0,
        }
    }

    fn submit(&mut self, handle: JoinHandle<BatchOutput>) {
        self.pending.push_back(handle);
    }

    /// Writes finished head-of-line batches; blocks on the head when too many
    /// batches are waiting to be written.
    async fn drain_ready<W>(&mut self, sink: &mut W) -> Result<(), IngestError>
    where
        W: AsyncWrite + Unpin,
    {
        while self.pending.len() > self.max_pending
            || self.pending.front().is_some_and(|head| head.is_finished())
        {
            self.write_next(sink).await?;
        }
        Ok(())
    }

    async fn drain_all<W>(&mut self, sink: &mut W) -> Result<(), IngestError>
    where
        W: AsyncWrite + Unpin,
    {
        while !self.pending.is_empty() {
            self.write_next(sink).await?;
        }
        Ok(())
    }

    async fn write_next<W>(&mut self, sink: &mut W) -> Result<(), IngestError>
    where
        W: AsyncWrite + Unpin,
    {
        let Some(handle) = self.pending.pop_front() else {
            return Ok(());
        };
        let output = handle.await?;
        if output.cancelled {
            return Err(IngestError::Cancelled);
        }

        sink.write_all(&output.bytes).await?;
        self.batches += 1;
        self.malformed_rows += output.summary.malformed_rows;
        self.summaries.push(output.summary);
        for warning in output.warnings {
            if self.warnings.len() >= self.max_warnings {
                break;
            }
            warn!(
                line = warning.line,
                row = warning.row_index,
                issue = %warning.issue,
                "skipping malformed row"
            );
            self.warnings.push(warning);
        }
        Ok(())
    }

    /// Waits for outstanding workers and drops their output.
    async fn abandon(&mut self) {
        for handle in self.pending.drain(..) {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_values_are_numeric_one() {
        assert!(is_pass("1"));
        assert!(is_pass(" 1.0 "));
        assert!(is_pass("1e0"));
        assert!(!is_pass("0"));
        assert!(!is_pass("yes"));
        assert!(!is_pass(""));
    }
}
