//! # shiftscan CLI Application
//!
//! Command-line interface for the shiftscan collector, with one subcommand
//! per output variant:
//!
//! - `counts`: per-window hit statistics for keyword × subreddit queries
//! - `items`: raw posts/comments with overflow subdivision
//!
//! Both subcommands share the window/range configuration, the
//! append-vs-fresh output choice and the failed-request log. Configuration
//! problems surface immediately, before the first request; progress is
//! shown per completed query and a summary line is printed at the end.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tracing::instrument;
use tracing_subscriber::EnvFilter;

use shiftscan::output::{CountWriter, FailureLog, ItemWriter, OpenMode};
use shiftscan::query::ContentType;
use shiftscan::scan::{Progress, ScanConfig, ScanSummary, Scanner};
use shiftscan::window::{TimeWindow, WindowStep};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Time-windowed collector for the Pushshift archive search API",
    long_about = None,
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Collect per-window hit counts for each keyword and subreddit
    Counts(CountsArgs),

    /// Collect raw posts/comments, subdividing windows that overflow
    Items(ItemsArgs),
}

#[derive(Args, Debug)]
struct CountsArgs {
    /// Search term (repeatable); an empty term queries without a text filter
    #[arg(short = 'k', long = "keyword", default_value = "")]
    keywords: Vec<String>,

    /// Subreddit to scan (repeatable)
    #[arg(short = 's', long = "subreddit", default_value = "uci")]
    subreddits: Vec<String>,

    /// Newest date of the range, YYYY-MM-DD (default: today)
    #[arg(long)]
    start: Option<String>,

    /// Oldest date of the range, YYYY-MM-DD (default: 2010-01-01)
    #[arg(long)]
    end: Option<String>,

    /// Partition into fixed N-day windows instead of calendar months
    #[arg(long, value_name = "N")]
    by_days: Option<u32>,

    /// Explicit window as unix seconds (repeatable, overrides partitioning)
    #[arg(short = 'w', long = "window", value_name = "BEFORE:AFTER")]
    windows: Vec<String>,

    /// Content to query
    #[arg(short = 'c', long, default_value = "both", value_parser = ["submission", "comment", "both"])]
    content: String,

    /// Output CSV path
    #[arg(short = 'o', long, default_value = "reddit_keyword_data.csv")]
    output: PathBuf,

    /// Failed-request log path
    #[arg(short = 'l', long, default_value = "logs.txt")]
    log: PathBuf,

    /// Append to an existing output file instead of starting fresh
    #[arg(short = 'a', long)]
    append: bool,

    /// Seconds to wait before retrying a failed request
    #[arg(long, default_value = "20")]
    retry_delay: u64,

    /// API base URL
    #[arg(long, default_value = "https://api.pushshift.io")]
    base_url: String,
}

#[derive(Args, Debug)]
struct ItemsArgs {
    /// Subreddit to scan (repeatable)
    #[arg(short = 's', long = "subreddit", default_value = "uci")]
    subreddits: Vec<String>,

    /// Newest date of the range, YYYY-MM-DD (default: today)
    #[arg(long)]
    start: Option<String>,

    /// Oldest date of the range, YYYY-MM-DD (default: 2010-01-01)
    #[arg(long)]
    end: Option<String>,

    /// Initial window granularity in days; halved on overflow
    #[arg(short = 'g', long, default_value = "3")]
    granularity: u32,

    /// Explicit window as unix seconds (repeatable, overrides partitioning)
    #[arg(short = 'w', long = "window", value_name = "BEFORE:AFTER")]
    windows: Vec<String>,

    /// Content to query
    #[arg(short = 'c', long, default_value = "both", value_parser = ["submission", "comment", "both"])]
    content: String,

    /// Output CSV path
    #[arg(short = 'o', long, default_value = "reddit_item_data.csv")]
    output: PathBuf,

    /// Failed-request log path
    #[arg(short = 'l', long, default_value = "logs.txt")]
    log: PathBuf,

    /// Append to an existing output file instead of starting fresh
    #[arg(short = 'a', long)]
    append: bool,

    /// Seconds to wait before retrying a failed request
    #[arg(long, default_value = "20")]
    retry_delay: u64,

    /// API base URL
    #[arg(long, default_value = "https://api.pushshift.io")]
    base_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Counts(args) => counts_command(args).await?,
        Commands::Items(args) => items_command(args).await?,
    }

    Ok(())
}

#[instrument(skip(args))]
async fn counts_command(args: CountsArgs) -> anyhow::Result<()> {
    let mut builder = ScanConfig::builder()
        .keywords(args.keywords.clone())
        .subreddits(args.subreddits.clone())
        .content_types(parse_content(&args.content))
        .retry_delay(Duration::from_secs(args.retry_delay))
        .base_url(args.base_url.clone());
    builder = apply_range(builder, &args.start, &args.end, &args.windows)?;
    if let Some(days) = args.by_days {
        builder = builder.step(WindowStep::Days(days));
    }

    let scanner = Scanner::new(builder.build())?;
    let mode = open_mode(args.append);
    let mut writer = CountWriter::open(&args.output, mode)
        .with_context(|| format!("opening {}", args.output.display()))?;
    let mut failure_log = FailureLog::open(&args.log)
        .with_context(|| format!("opening {}", args.log.display()))?;

    println!("Scanning {} queries...", scanner.planned_count_queries());
    let (progress_sender, progress_handle) = spawn_progress(scanner.planned_count_queries());

    let summary = scanner
        .run_counts(&mut writer, &mut failure_log, Some(progress_sender))
        .await?;
    let _ = progress_handle.await;

    print_summary(&summary, &args.output);
    Ok(())
}

#[instrument(skip(args))]
async fn items_command(args: ItemsArgs) -> anyhow::Result<()> {
    let mut builder = ScanConfig::builder()
        .subreddits(args.subreddits.clone())
        .content_types(parse_content(&args.content))
        .granularity_days(args.granularity)
        .retry_delay(Duration::from_secs(args.retry_delay))
        .base_url(args.base_url.clone());
    builder = apply_range(builder, &args.start, &args.end, &args.windows)?;

    let scanner = Scanner::new(builder.build())?;
    let mode = open_mode(args.append);
    let mut writer = ItemWriter::open(&args.output, mode)
        .with_context(|| format!("opening {}", args.output.display()))?;
    let mut failure_log = FailureLog::open(&args.log)
        .with_context(|| format!("opening {}", args.log.display()))?;

    println!("Scanning {} windows...", scanner.planned_item_windows());
    let (progress_sender, progress_handle) = spawn_progress(scanner.planned_item_windows());

    let summary = scanner
        .run_items(&mut writer, &mut failure_log, Some(progress_sender))
        .await?;
    let _ = progress_handle.await;

    print_summary(&summary, &args.output);
    Ok(())
}

/// Apply the shared range options to a config builder
fn apply_range(
    mut builder: shiftscan::scan::ScanConfigBuilder,
    start: &Option<String>,
    end: &Option<String>,
    windows: &[String],
) -> anyhow::Result<shiftscan::scan::ScanConfigBuilder> {
    if let Some(start) = start {
        builder = builder.start(parse_date(start)?);
    }
    if let Some(end) = end {
        builder = builder.end(parse_date(end)?);
    }
    if !windows.is_empty() {
        let windows = windows
            .iter()
            .map(|spec| parse_window(spec))
            .collect::<anyhow::Result<Vec<_>>>()?;
        builder = builder.windows(windows);
    }
    Ok(builder)
}

/// Parse a YYYY-MM-DD date as UTC midnight
fn parse_date(text: &str) -> anyhow::Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{text}', expected YYYY-MM-DD"))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("invalid date '{text}'"))?;
    Ok(Utc.from_utc_datetime(&midnight))
}

/// Parse a BEFORE:AFTER window in unix seconds
fn parse_window(spec: &str) -> anyhow::Result<TimeWindow> {
    let (before, after) = spec
        .split_once(':')
        .ok_or_else(|| anyhow!("invalid window '{spec}', expected BEFORE:AFTER"))?;
    let before = before
        .trim()
        .parse::<i64>()
        .with_context(|| format!("invalid window bound '{before}'"))?;
    let after = after
        .trim()
        .parse::<i64>()
        .with_context(|| format!("invalid window bound '{after}'"))?;
    Ok(TimeWindow::new(before, after))
}

fn parse_content(content: &str) -> Vec<ContentType> {
    match content {
        "submission" => vec![ContentType::Submission],
        "comment" => vec![ContentType::Comment],
        _ => vec![ContentType::Submission, ContentType::Comment],
    }
}

fn open_mode(append: bool) -> OpenMode {
    if append {
        OpenMode::Append
    } else {
        OpenMode::Create
    }
}

/// Spawn the task that renders progress updates as a bar
fn spawn_progress(
    total: u64,
) -> (mpsc::Sender<Progress>, tokio::task::JoinHandle<()>) {
    let (sender, mut receiver) = mpsc::channel::<Progress>(100);

    let progress_bar = ProgressBar::new(total);
    progress_bar.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
            .expect("valid progress template")
            .progress_chars("##-"),
    );

    let handle = tokio::spawn(async move {
        while let Some(update) = receiver.recv().await {
            progress_bar.inc(1);
            if update.term.is_empty() {
                progress_bar.set_message(update.subreddit);
            } else {
                progress_bar.set_message(format!("{}@{}", update.term, update.subreddit));
            }
        }
        progress_bar.finish_with_message("done");
    });

    (sender, handle)
}

fn print_summary(summary: &ScanSummary, output: &Path) {
    println!(
        "{} requests, {} written to {}, {} failed, {} skipped",
        summary.requests,
        summary.written,
        output.display(),
        summary.failed,
        summary.skipped
    );
}
