use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::timestamps::{self, parse_timestamp};

/// Summary of one ingested dataset. Written once next to the augmented file
/// and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetMetadata {
    pub file_name: String,
    pub row_count: u64,
    pub column_count: usize,
    pub pass_rate: f64,
    #[serde(with = "timestamps::flexible")]
    pub start_timestamp: NaiveDateTime,
    #[serde(with = "timestamps::flexible")]
    pub end_timestamp: NaiveDateTime,
}

/// Closed interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    #[inline]
    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        self.start <= ts && ts <= self.end
    }

    pub fn is_ordered(&self) -> bool {
        self.start <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Window {
    Train,
    Test,
    Simulate,
}

impl Window {
    pub const ALL: [Window; 3] = [Window::Train, Window::Test, Window::Simulate];

    pub fn as_str(&self) -> &'static str {
        match self {
            Window::Train => "train",
            Window::Test => "test",
            Window::Simulate => "simulate",
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Train/test/simulate windows chosen by the caller.
///
/// Persisted with PascalCase keys, the shape the training service reads;
/// camelCase keys are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PartitionRequest {
    #[serde(with = "timestamps::flexible", alias = "trainStart")]
    pub train_start: NaiveDateTime,
    #[serde(with = "timestamps::flexible", alias = "trainEnd")]
    pub train_end: NaiveDateTime,
    #[serde(with = "timestamps::flexible", alias = "testStart")]
    pub test_start: NaiveDateTime,
    #[serde(with = "timestamps::flexible", alias = "testEnd")]
    pub test_end: NaiveDateTime,
    #[serde(with = "timestamps::flexible", alias = "simStart")]
    pub sim_start: NaiveDateTime,
    #[serde(with = "timestamps::flexible", alias = "simEnd")]
    pub sim_end: NaiveDateTime,
}

impl PartitionRequest {
    pub fn from_windows(train: TimeWindow, test: TimeWindow, simulate: TimeWindow) -> Self {
        Self {
            train_start: train.start,
            train_end: train.end,
            test_start: test.start,
            test_end: test.end,
            sim_start: simulate.start,
            sim_end: simulate.end,
        }
    }

    pub fn window(&self, window: Window) -> TimeWindow {
        match window {
            Window::Train => TimeWindow::new(self.train_start, self.train_end),
            Window::Test => TimeWindow::new(self.test_start, self.test_end),
            Window::Simulate => TimeWindow::new(self.sim_start, self.sim_end),
        }
    }

    /// First matching window in train, test, simulate order.
    pub fn classify(&self, ts: NaiveDateTime) -> Option<Window> {
        Window::ALL
            .into_iter()
            .find(|window| self.window(*window).contains(ts))
    }
}

/// Row counts and `YYYY-MM` histograms per window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionResult {
    pub train_count: u64,
    pub test_count: u64,
    pub sim_count: u64,
    pub train_monthly: BTreeMap<String, u64>,
    pub test_monthly: BTreeMap<String, u64>,
    pub sim_monthly: BTreeMap<String, u64>,
}

impl PartitionResult {
    pub fn record(&mut self, window: Window, month: String) {
        let (count, monthly) = match window {
            Window::Train => (&mut self.train_count, &mut self.train_monthly),
            Window::Test => (&mut self.test_count, &mut self.test_monthly),
            Window::Simulate => (&mut self.sim_count, &mut self.sim_monthly),
        };
        *count += 1;
        *monthly.entry(month).or_insert(0) += 1;
    }

    pub fn count(&self, window: Window) -> u64 {
        match window {
            Window::Train => self.train_count,
            Window::Test => self.test_count,
            Window::Simulate => self.sim_count,
        }
    }

    pub fn monthly(&self, window: Window) -> &BTreeMap<String, u64> {
        match window {
            Window::Train => &self.train_monthly,
            Window::Test => &self.test_monthly,
            Window::Simulate => &self.sim_monthly,
        }
    }

    pub fn total(&self) -> u64 {
        self.train_count + self.test_count + self.sim_count
    }
}

/// Where the synthetic timeline starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimestampAnchor {
    /// The first data row is stamped with this instant.
    Epoch(NaiveDateTime),
    /// The last data row is stamped with the processing time.
    Now,
}

impl Default for TimestampAnchor {
    fn default() -> Self {
        TimestampAnchor::Epoch(timestamps::default_epoch())
    }
}

impl TimestampAnchor {
    /// Base timestamp for row 0, given the pre-counted number of data rows.
    pub fn resolve(&self, expected_rows: u64, now: NaiveDateTime) -> NaiveDateTime {
        match self {
            TimestampAnchor::Epoch(base) => *base,
            TimestampAnchor::Now => {
                let back = i64::try_from(expected_rows.saturating_sub(1)).unwrap_or(i64::MAX);
                now.checked_sub_signed(Duration::seconds(back))
                    .unwrap_or(NaiveDateTime::MIN)
            }
        }
    }
}

impl FromStr for TimestampAnchor {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("now") {
            return Ok(TimestampAnchor::Now);
        }
        parse_timestamp(trimmed)
            .map(TimestampAnchor::Epoch)
            .ok_or_else(|| format!("expected 'now' or a timestamp, got '{trimmed}'"))
    }
}

impl TryFrom<String> for TimestampAnchor {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for TimestampAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampAnchor::Epoch(base) => write!(f, "{}", timestamps::format_synthetic(*base)),
            TimestampAnchor::Now => f.write_str("now"),
        }
    }
}

impl From<TimestampAnchor> for String {
    fn from(anchor: TimestampAnchor) -> Self {
        anchor.to_string()
    }
}
