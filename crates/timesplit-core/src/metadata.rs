//! Folds per-batch aggregates into [`DatasetMetadata`].
//!
//! Every field merges with `+`, `min` or `max`, so summaries can be combined in
//! whatever order batches complete.

use chrono::NaiveDateTime;

use crate::types::DatasetMetadata;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub rows_accepted: u64,
    pub response_ones: u64,
    pub malformed_rows: u64,
    pub first_timestamp: Option<NaiveDateTime>,
    pub last_timestamp: Option<NaiveDateTime>,
}

impl BatchSummary {
    pub fn record_row(&mut self, ts: NaiveDateTime, passed: bool) {
        self.rows_accepted += 1;
        if passed {
            self.response_ones += 1;
        }
        self.first_timestamp = min_opt(self.first_timestamp, Some(ts));
        self.last_timestamp = max_opt(self.last_timestamp, Some(ts));
    }

    pub fn record_malformed(&mut self) {
        self.malformed_rows += 1;
    }

    pub fn merge(self, other: BatchSummary) -> BatchSummary {
        BatchSummary {
            rows_accepted: self.rows_accepted + other.rows_accepted,
            response_ones: self.response_ones + other.response_ones,
            malformed_rows: self.malformed_rows + other.malformed_rows,
            first_timestamp: min_opt(self.first_timestamp, other.first_timestamp),
            last_timestamp: max_opt(self.last_timestamp, other.last_timestamp),
        }
    }

    /// Percentage of accepted rows whose response was 1; 0 for an empty set.
    pub fn pass_rate(&self) -> f64 {
        if self.rows_accepted == 0 {
            0.0
        } else {
            self.response_ones as f64 / self.rows_accepted as f64 * 100.0
        }
    }
}

fn min_opt(a: Option<NaiveDateTime>, b: Option<NaiveDateTime>) -> Option<NaiveDateTime> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn max_opt(a: Option<NaiveDateTime>, b: Option<NaiveDateTime>) -> Option<NaiveDateTime> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Builds the metadata record. `header_len` excludes the synthetic column;
/// `processed_at` stands in for the timestamps when no row was accepted.
pub fn build_metadata<I>(
    file_name: &str,
    header_len: usize,
    summaries: I,
    processed_at: NaiveDateTime,
) -> DatasetMetadata
where
    I: IntoIterator<Item = BatchSummary>,
{
    let total = summaries
        .into_iter()
        .fold(BatchSummary::default(), BatchSummary::merge);

    DatasetMetadata {
        file_name: file_name.to_string(),
        row_count: total.rows_accepted,
        column_count: header_len + 1,
        pass_rate: total.pass_rate(),
        start_timestamp: total.first_timestamp.unwrap_or(processed_at),
        end_timestamp: total.last_timestamp.unwrap_or(processed_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamps::{default_epoch, synthetic_at};

    fn summary(rows: std::ops::Range<u64>, passes: u64) -> BatchSummary {
        let base = default_epoch();
        let mut out = BatchSummary::default();
        for (n, idx) in rows.enumerate() {
            out.record_row(synthetic_at(base, idx), (n as u64) < passes);
        }
        out
    }

    #[test]
    fn merge_is_order_independent() {
        let a = summary(0..10, 3);
        let b = summary(10..25, 5);
        let c = summary(25..26, 1);

        let forward = a.merge(b).merge(c);
        let backward = c.merge(b.merge(a));
        assert_eq!(forward, backward);
        assert_eq!(forward.rows_accepted, 26);
        assert_eq!(forward.response_ones, 9);
        assert_eq!(forward.first_timestamp, Some(default_epoch()));
        assert_eq!(forward.last_timestamp, Some(synthetic_at(default_epoch(), 25)));
    }

    #[test]
    fn builds_metadata_from_summaries() {
        let now = synthetic_at(default_epoch(), 1_000_000);
        let meta = build_metadata("data.csv", 4, vec![summary(0..4, 1), summary(4..8, 1)], now);

        assert_eq!(meta.file_name, "data.csv");
        assert_eq!(meta.row_count, 8);
        assert_eq!(meta.column_count, 5);
        assert!((meta.pass_rate - 25.0).abs() < 1e-9);
        assert_eq!(meta.start_timestamp, default_epoch());
        assert_eq!(meta.end_timestamp, synthetic_at(default_epoch(), 7));
    }

    #[test]
    fn empty_dataset_defaults_to_processing_time() {
        let now = synthetic_at(default_epoch(), 42);
        let meta = build_metadata("empty.csv", 3, Vec::new(), now);

        assert_eq!(meta.row_count, 0);
        assert_eq!(meta.pass_rate, 0.0);
        assert_eq!(meta.column_count, 4);
        assert_eq!(meta.start_timestamp, now);
        assert_eq!(meta.end_timestamp, now);
    }
}
