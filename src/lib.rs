//! # shiftscan - Time-Windowed Archive Collector for Rust
//!
//! This crate collects keyword and subreddit statistics from a
//! Pushshift-style archive search API. It partitions a date range into
//! non-overlapping time windows, enumerates every keyword × subreddit ×
//! window query lazily, executes them one at a time with a bounded retry
//! policy, and appends results to CSV as each response arrives, so an
//! interrupted run keeps everything it had already fetched.
//!
//! ## Features
//!
//! - Calendar-month or fixed-day window partitioning with exact range
//!   coverage
//! - Aggregate mode: per-window hit counts with their precision flag
//! - Raw mode: deduplicated individual posts/comments, with automatic
//!   window subdivision when a result page overflows
//! - One-retry-then-log failure policy; a bad request never aborts a batch
//! - Crash-safe incremental CSV output with append/resume support
//! - Async API with Tokio
//!
//! ## Example
//!
//! ```rust,no_run
//! use shiftscan::output::{CountWriter, FailureLog, OpenMode};
//! use shiftscan::scan::{ScanConfig, Scanner};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ScanConfig::builder()
//!         .keywords(vec!["sports".to_string()])
//!         .subreddits(vec!["uci".to_string()])
//!         .build();
//!
//!     let mut writer = CountWriter::open("counts.csv", OpenMode::Create)?;
//!     let mut log = FailureLog::open("failures.log")?;
//!
//!     let scanner = Scanner::new(config)?;
//!     let summary = scanner.run_counts(&mut writer, &mut log, None).await?;
//!     println!("wrote {} records", summary.written);
//!     Ok(())
//! }
//! ```

mod error;

pub mod client;
pub mod extract;
pub mod output;
pub mod query;
pub mod scan;
pub mod subdivide;
pub mod window;

pub use error::Error;

/// Re-export of the crate's core types for public use
pub mod prelude {
    pub use crate::error::Error;
    pub use crate::error::Result;
    pub use crate::extract::{CountRecord, HitPrecision, ItemRecord};
    pub use crate::query::{ContentType, QueryRequest};
    pub use crate::scan::{ScanConfig, ScanSummary, Scanner};
    pub use crate::window::{TimeWindow, WindowStep};
}
