// crates/timesplit/src/main.rs

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use clap::{Args, Parser, Subcommand};
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use serde_json::json;
use timesplit_core::session::{MonthlyDistribution, SessionInfo};
use timesplit_core::timestamps::{format_synthetic, parse_timestamp};
use timesplit_core::{
    count_rows_in_file, CancellationToken, IngestConfig, PartitionRequest, SessionStore,
    TimeWindow, TimestampAnchor,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Stamp CSV uploads with synthetic timestamps and split them into train/test/simulation windows",
    long_about = None
)]
struct Cli {
    /// TOML file with ingestion settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding session folders (overrides config and TIMESPLIT_STORAGE_DIR)
    #[arg(long, global = true)]
    storage_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Count data rows in a CSV file without parsing fields
    CountRows { file: PathBuf },
    /// Create a session from a CSV file
    Ingest(IngestArgs),
    /// Validate date ranges and compute the per-window distribution
    Split(SplitArgs),
    /// Print the stored metadata and distribution of a session
    Show {
        #[arg(long)]
        session: String,
    },
    /// List ingested sessions
    Sessions,
}

#[derive(Args, Debug)]
struct IngestArgs {
    file: PathBuf,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    workers: Option<usize>,

    /// `now`, or the timestamp given to the first data row
    #[arg(long)]
    anchor: Option<TimestampAnchor>,
}

#[derive(Args, Debug)]
struct SplitArgs {
    #[arg(long)]
    session: String,

    /// JSON file with TrainStart, TrainEnd, TestStart, TestEnd, SimStart, SimEnd
    #[arg(long, conflicts_with_all = [
        "train_start", "train_end", "test_start", "test_end", "sim_start", "sim_end"
    ])]
    ranges: Option<PathBuf>,

    #[command(flatten)]
    windows: WindowArgs,
}

#[derive(Args, Debug, Default)]
struct WindowArgs {
    #[arg(long, value_parser = parse_instant)]
    train_start: Option<NaiveDateTime>,
    #[arg(long, value_parser = parse_instant)]
    train_end: Option<NaiveDateTime>,
    #[arg(long, value_parser = parse_instant)]
    test_start: Option<NaiveDateTime>,
    #[arg(long, value_parser = parse_instant)]
    test_end: Option<NaiveDateTime>,
    #[arg(long, value_parser = parse_instant)]
    sim_start: Option<NaiveDateTime>,
    #[arg(long, value_parser = parse_instant)]
    sim_end: Option<NaiveDateTime>,
}

impl WindowArgs {
    fn into_request(self) -> Result<PartitionRequest> {
        let fields = [
            ("--train-start", self.train_start),
            ("--train-end", self.train_end),
            ("--test-start", self.test_start),
            ("--test-end", self.test_end),
            ("--sim-start", self.sim_start),
            ("--sim-end", self.sim_end),
        ];
        let missing: Vec<&str> = fields
            .iter()
            .filter(|(_, value)| value.is_none())
            .map(|(flag, _)| *flag)
            .collect();
        if !missing.is_empty() {
            bail!("missing range bounds: {} (or pass --ranges FILE)", missing.join(", "));
        }

        let [train_start, train_end, test_start, test_end, sim_start, sim_end] =
            fields.map(|(_, value)| value.unwrap_or_default());
        Ok(PartitionRequest::from_windows(
            TimeWindow::new(train_start, train_end),
            TimeWindow::new(test_start, test_end),
            TimeWindow::new(sim_start, sim_end),
        ))
    }
}

fn parse_instant(value: &str) -> Result<NaiveDateTime, String> {
    parse_timestamp(value).ok_or_else(|| format!("'{value}' is not a recognised timestamp"))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling");
                cancel.cancel();
            }
        });
    }

    let mut config =
        IngestConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(dir) = cli.storage_dir {
        config.storage_root = dir;
    }

    match cli.command {
        Command::CountRows { file } => {
            let rows = count_rows_in_file(&file)
                .await
                .with_context(|| format!("failed to count rows in {}", file.display()))?;
            println!("{rows}");
            Ok(())
        }
        Command::Ingest(args) => run_ingest(config, args, &cancel).await,
        Command::Split(args) => run_split(&config, args, &cancel).await,
        Command::Show { session } => run_show(&config, &session).await,
        Command::Sessions => run_sessions(&config).await,
    }
}

async fn run_ingest(
    mut config: IngestConfig,
    args: IngestArgs,
    cancel: &CancellationToken,
) -> Result<()> {
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(anchor) = args.anchor {
        config.anchor = anchor;
    }
    config.validate()?;

    let store = SessionStore::new(&config.storage_root);
    let session = store.create().await?;
    let report = match session.ingest(&args.file, &config, cancel).await {
        Ok(report) => report,
        Err(err) => {
            if let Err(cleanup) = tokio::fs::remove_dir_all(session.dir()).await {
                warn!(error = %cleanup, "failed to remove incomplete session directory");
            }
            return Err(err).with_context(|| format!("failed to ingest {}", args.file.display()));
        }
    };

    info!(session = %session.id(), "session ready");
    let summary = json!({
        "sessionId": session.id(),
        "metadata": report.metadata,
        "malformedRows": report.malformed_rows,
        "blankLines": report.blank_lines,
        "batches": report.batches,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn run_split(
    config: &IngestConfig,
    args: SplitArgs,
    cancel: &CancellationToken,
) -> Result<()> {
    let request = match &args.ranges {
        Some(path) => read_ranges_file(path).await?,
        None => args.windows.into_request()?,
    };

    let store = SessionStore::new(&config.storage_root);
    let session = store.open(&args.session).await?;
    let distribution = session.select_ranges(&request, cancel).await?;

    println!(
        "{}: train={} test={} simulate={}",
        distribution.status,
        distribution.train_count,
        distribution.test_count,
        distribution.simulate_count
    );
    println!("{}", distribution_table(&distribution));
    Ok(())
}

async fn read_ranges_file(path: &Path) -> Result<PartitionRequest> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("invalid range file {}", path.display()))
}

async fn run_show(config: &IngestConfig, id: &str) -> Result<()> {
    let store = SessionStore::new(&config.storage_root);
    let session = store.open(id).await?;
    let metadata = session.read_metadata().await?;
    println!("{}", serde_json::to_string_pretty(&metadata)?);

    if let Some(ranges) = session.read_ranges().await? {
        println!("{}", serde_json::to_string_pretty(&ranges)?);
    }
    match session.read_distribution().await? {
        Some(distribution) => println!("{}", distribution_table(&distribution)),
        None => println!("No range selection stored yet."),
    }
    Ok(())
}

async fn run_sessions(config: &IngestConfig) -> Result<()> {
    let store = SessionStore::new(&config.storage_root);
    let sessions = store.list().await?;
    if sessions.is_empty() {
        println!("No sessions under {}", store.root().display());
        return Ok(());
    }
    println!("{}", sessions_table(&sessions));
    Ok(())
}

fn distribution_table(distribution: &MonthlyDistribution) -> Table {
    let months: BTreeSet<&String> = distribution
        .train_monthly
        .keys()
        .chain(distribution.test_monthly.keys())
        .chain(distribution.sim_monthly.keys())
        .collect();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Month", "Train", "Test", "Simulate"]);
    for month in months {
        let cell = |counts: &std::collections::BTreeMap<String, u64>| {
            counts.get(month).copied().unwrap_or(0).to_string()
        };
        table.add_row(vec![
            month.clone(),
            cell(&distribution.train_monthly),
            cell(&distribution.test_monthly),
            cell(&distribution.sim_monthly),
        ]);
    }
    table.add_row(vec![
        "Total".to_string(),
        distribution.train_count.to_string(),
        distribution.test_count.to_string(),
        distribution.simulate_count.to_string(),
    ]);
    table
}

fn sessions_table(sessions: &[SessionInfo]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Session", "File", "Created", "Source hash"]);
    for info in sessions {
        table.add_row(vec![
            info.session_id.to_string(),
            info.original_file_name.clone(),
            format_synthetic(info.created_at.naive_utc()),
            info.source_hash.chars().take(16).collect(),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_accepts_inline_windows() {
        let cli = Cli::try_parse_from([
            "timesplit",
            "split",
            "--session",
            "abc",
            "--train-start",
            "2021-01-01 00:00:00",
            "--train-end",
            "2021-01-01T00:01:00",
            "--test-start",
            "2021-01-01 00:01:01",
            "--test-end",
            "2021-01-01 00:02:00",
            "--sim-start",
            "2021-01-01 00:02:01",
            "--sim-end",
            "2021-01-01 00:03:00",
        ])
        .expect("parse args");

        let Command::Split(args) = cli.command else {
            panic!("expected split command");
        };
        let request = args.windows.into_request().expect("request");
        assert_eq!(format_synthetic(request.train_end), "2021-01-01 00:01:00");
        assert_eq!(format_synthetic(request.sim_end), "2021-01-01 00:03:00");
    }

    #[test]
    fn split_reports_missing_bounds() {
        let windows = WindowArgs {
            train_start: parse_timestamp("2021-01-01 00:00:00"),
            ..WindowArgs::default()
        };
        let err = windows.into_request().expect_err("incomplete");
        let message = err.to_string();
        assert!(message.contains("--train-end"));
        assert!(message.contains("--sim-end"));
        assert!(!message.contains("--train-start"));
    }

    #[test]
    fn ranges_file_conflicts_with_inline_bounds() {
        let result = Cli::try_parse_from([
            "timesplit",
            "split",
            "--session",
            "abc",
            "--ranges",
            "ranges.json",
            "--train-start",
            "2021-01-01",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn ingest_parses_anchor() {
        let cli = Cli::try_parse_from([
            "timesplit",
            "ingest",
            "data.csv",
            "--anchor",
            "now",
            "--workers",
            "2",
        ])
        .expect("parse args");
        let Command::Ingest(args) = cli.command else {
            panic!("expected ingest command");
        };
        assert_eq!(args.anchor, Some(TimestampAnchor::Now));
        assert_eq!(args.workers, Some(2));
    }

    #[tokio::test]
    async fn reads_camel_case_range_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ranges.json");
        std::fs::write(
            &path,
            r#"{"trainStart":"2021-01-01T00:00:00","trainEnd":"2021-01-01T00:00:09",
                "testStart":"2021-01-01T00:00:10","testEnd":"2021-01-01T00:00:19",
                "simStart":"2021-01-01T00:00:20","simEnd":"2021-01-01T00:00:29"}"#,
        )
        .expect("write ranges");

        let request = read_ranges_file(&path).await.expect("read ranges");
        assert_eq!(format_synthetic(request.test_start), "2021-01-01 00:00:10");
    }
}
