//! # Scan Orchestration Module
//!
//! This module ties the collector together: configuration of the search
//! space, window generation, query enumeration, execution with retry, and
//! incremental persistence. A scan is strictly sequential, one outstanding
//! request at a time, blocking on each outcome before issuing the next:
//! staying gentle on the archive API is a functional requirement, not a
//! tuning knob.
//!
//! ## Key Components
//!
//! - `ScanConfig`: the full configuration surface, with a builder
//! - `Scanner`: runs aggregate (`run_counts`) or raw (`run_items`) scans
//! - `ScanSummary`: per-run totals reported back to the caller
//! - `Progress`: per-request updates for a progress display
//!
//! Nothing inside the per-request loop can abort a scan; only configuration
//! errors (caught before the first request) and I/O errors on the output or
//! log files propagate out.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::mpsc;
use tracing::{error, info, instrument};

use crate::client::{QueryMode, SearchClient};
use crate::error::{Error, Result};
use crate::extract::{ItemRecord, extract_counts, extract_items};
use crate::output::{CountWriter, FailureLog, ItemWriter};
use crate::query::{ContentType, QueryRequest, enumerate};
use crate::subdivide::{FetchItems, collect_window};
use crate::window::{TimeWindow, WindowStep, partition};

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.pushshift.io";

/// Default delay before the single retry of a failed request, in seconds
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 20;

/// Page-size ceiling documented by the upstream
pub const DEFAULT_PAGE_LIMIT: usize = 1000;

/// Configuration for a scan
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Free-text search terms; an empty string queries without a text filter
    pub keywords: Vec<String>,

    /// Subreddits to scan
    pub subreddits: Vec<String>,

    /// Newest instant of the scanned range
    pub start: DateTime<Utc>,

    /// Oldest instant of the scanned range
    pub end: DateTime<Utc>,

    /// Step size used to partition the range into windows
    pub step: WindowStep,

    /// Explicit window list overriding the generated partition
    pub windows: Option<Vec<TimeWindow>>,

    /// Content types to query; each multiplies the request count
    pub content_types: Vec<ContentType>,

    /// Delay before the single retry of a failed request
    pub retry_delay: Duration,

    /// Initial day granularity for raw-mode windows
    pub granularity_days: u32,

    /// Page-size ceiling of the upstream; a window returning this many raw
    /// items is treated as truncated
    pub page_limit: usize,

    /// API base URL
    pub base_url: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            keywords: vec![String::new()],
            subreddits: vec!["uci".to_string()],
            start: Utc::now(),
            // The archive holds nothing useful older than this.
            end: Utc
                .with_ymd_and_hms(2010, 1, 1, 0, 0, 0)
                .single()
                .expect("valid floor date"),
            step: WindowStep::Month,
            windows: None,
            content_types: vec![ContentType::Submission, ContentType::Comment],
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
            granularity_days: 3,
            page_limit: DEFAULT_PAGE_LIMIT,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl ScanConfig {
    /// Create a new builder
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::new()
    }

    /// Check the configuration before any request is issued
    pub fn validate(&self) -> Result<()> {
        if self.keywords.is_empty() {
            return Err(Error::InvalidConfig("keyword list is empty".to_string()));
        }
        if self.subreddits.is_empty() {
            return Err(Error::InvalidConfig("subreddit list is empty".to_string()));
        }
        if self.content_types.is_empty() {
            return Err(Error::InvalidConfig(
                "content type list is empty".to_string(),
            ));
        }
        if self.page_limit == 0 {
            return Err(Error::InvalidConfig("page limit must be positive".to_string()));
        }
        if self.granularity_days == 0 {
            return Err(Error::InvalidConfig(
                "granularity must be at least one day".to_string(),
            ));
        }
        if let WindowStep::Days(0) = self.step {
            return Err(Error::InvalidConfig(
                "window step must be at least one day".to_string(),
            ));
        }
        match &self.windows {
            Some(windows) => {
                for window in windows {
                    if window.after >= window.before {
                        return Err(Error::InvalidConfig(format!(
                            "window {}:{} is inverted or empty",
                            window.before, window.after
                        )));
                    }
                }
            }
            None => {
                if self.start <= self.end {
                    return Err(Error::InvalidConfig(
                        "start must be later than end".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// The window sequence this configuration scans
    pub fn resolve_windows(&self) -> Vec<TimeWindow> {
        match &self.windows {
            Some(windows) => windows.clone(),
            None => partition(self.start, self.end, self.step),
        }
    }
}

/// Builder for ScanConfig
#[derive(Debug, Default)]
pub struct ScanConfigBuilder {
    config: ScanConfig,
}

impl ScanConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: ScanConfig::default(),
        }
    }

    /// Set the search terms
    pub fn keywords(mut self, keywords: Vec<String>) -> Self {
        self.config.keywords = keywords;
        self
    }

    /// Set the subreddits to scan
    pub fn subreddits(mut self, subreddits: Vec<String>) -> Self {
        self.config.subreddits = subreddits;
        self
    }

    /// Set the newest instant of the range
    pub fn start(mut self, start: DateTime<Utc>) -> Self {
        self.config.start = start;
        self
    }

    /// Set the oldest instant of the range
    pub fn end(mut self, end: DateTime<Utc>) -> Self {
        self.config.end = end;
        self
    }

    /// Set the partition step
    pub fn step(mut self, step: WindowStep) -> Self {
        self.config.step = step;
        self
    }

    /// Override the generated partition with an explicit window list
    pub fn windows(mut self, windows: Vec<TimeWindow>) -> Self {
        self.config.windows = Some(windows);
        self
    }

    /// Set the content types to query
    pub fn content_types(mut self, content_types: Vec<ContentType>) -> Self {
        self.config.content_types = content_types;
        self
    }

    /// Set the retry delay
    pub fn retry_delay(mut self, retry_delay: Duration) -> Self {
        self.config.retry_delay = retry_delay;
        self
    }

    /// Set the initial raw-mode granularity in days
    pub fn granularity_days(mut self, granularity_days: u32) -> Self {
        self.config.granularity_days = granularity_days;
        self
    }

    /// Set the upstream page-size ceiling
    pub fn page_limit(mut self, page_limit: usize) -> Self {
        self.config.page_limit = page_limit;
        self
    }

    /// Set the API base URL
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    /// Build the configuration
    pub fn build(self) -> ScanConfig {
        self.config
    }
}

/// Totals for one completed scan
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary {
    /// Requests issued, retries not counted
    pub requests: u64,

    /// Records (or items) durably written
    pub written: u64,

    /// Requests abandoned after the retry and logged
    pub failed: u64,

    /// Successful responses dropped for a malformed body
    pub skipped: u64,
}

/// One progress update per completed query
#[derive(Debug, Clone)]
pub struct Progress {
    /// Term of the completed query, empty in raw mode
    pub term: String,

    /// Subreddit of the completed query
    pub subreddit: String,
}

/// Runs a configured scan to completion
pub struct Scanner {
    config: ScanConfig,
    client: SearchClient,
}

impl Scanner {
    /// Validate the configuration and create a scanner
    pub fn new(config: ScanConfig) -> Result<Self> {
        config.validate()?;
        let client = SearchClient::new(
            config.base_url.clone(),
            config.retry_delay,
            config.page_limit,
        );
        Ok(Self { config, client })
    }

    /// The configuration this scanner runs
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Number of aggregate-mode queries the scan will issue
    pub fn planned_count_queries(&self) -> u64 {
        let windows = self.config.resolve_windows().len() as u64;
        windows
            * self.config.keywords.len() as u64
            * self.config.subreddits.len() as u64
            * self.config.content_types.len() as u64
    }

    /// Number of raw-mode top-level windows the scan will cover
    ///
    /// Overflow subdivision can only add queries beyond this.
    pub fn planned_item_windows(&self) -> u64 {
        let windows = self.config.resolve_windows().len() as u64;
        windows * self.config.subreddits.len() as u64 * self.config.content_types.len() as u64
    }

    /// Run an aggregate-mode scan, appending one hit-count record per
    /// successful query
    #[instrument(skip_all)]
    pub async fn run_counts(
        &self,
        writer: &mut CountWriter,
        failure_log: &mut FailureLog,
        progress: Option<mpsc::Sender<Progress>>,
    ) -> Result<ScanSummary> {
        let windows = self.config.resolve_windows();
        let mut summary = ScanSummary::default();

        for request in enumerate(
            &self.config.keywords,
            &self.config.subreddits,
            &windows,
            &self.config.content_types,
        ) {
            summary.requests += 1;
            match self
                .client
                .execute_with_retry(&request, QueryMode::Counts, failure_log)
                .await?
            {
                None => summary.failed += 1,
                Some(body) => match extract_counts(&body, &request) {
                    Ok(record) => {
                        writer.write(&record)?;
                        summary.written += 1;
                    }
                    Err(err) => {
                        // Fatal for this record only, never for the batch.
                        error!(
                            error = %err,
                            term = %request.term,
                            subreddit = %request.subreddit,
                            "malformed success body, skipping record"
                        );
                        summary.skipped += 1;
                    }
                },
            }
            if let Some(sender) = &progress {
                let _ = sender
                    .send(Progress {
                        term: request.term.clone(),
                        subreddit: request.subreddit.clone(),
                    })
                    .await;
            }
        }

        info!(
            requests = summary.requests,
            written = summary.written,
            failed = summary.failed,
            skipped = summary.skipped,
            "count scan finished"
        );
        Ok(summary)
    }

    /// Run a raw-mode scan, collecting deduplicated items per window
    #[instrument(skip_all)]
    pub async fn run_items(
        &self,
        writer: &mut ItemWriter,
        failure_log: &mut FailureLog,
        progress: Option<mpsc::Sender<Progress>>,
    ) -> Result<ScanSummary> {
        let windows = self.config.resolve_windows();
        let mut summary = ScanSummary::default();

        for &content_type in &self.config.content_types {
            for subreddit in &self.config.subreddits {
                for &window in &windows {
                    let mut fetcher = ClientFetcher {
                        client: &self.client,
                        failure_log: &mut *failure_log,
                        subreddit,
                        content_type,
                        requests: 0,
                        failed: 0,
                        skipped: 0,
                    };
                    let items = collect_window(
                        &mut fetcher,
                        window,
                        self.config.granularity_days,
                        self.config.page_limit,
                    )
                    .await?;
                    summary.requests += fetcher.requests;
                    summary.failed += fetcher.failed;
                    summary.skipped += fetcher.skipped;

                    for item in &items {
                        writer.write(item)?;
                        summary.written += 1;
                    }

                    if let Some(sender) = &progress {
                        let _ = sender
                            .send(Progress {
                                term: String::new(),
                                subreddit: subreddit.clone(),
                            })
                            .await;
                    }
                }
            }
        }

        info!(
            requests = summary.requests,
            written = summary.written,
            failed = summary.failed,
            skipped = summary.skipped,
            "item scan finished"
        );
        Ok(summary)
    }
}

/// Raw-item source backed by the live client, feeding the failure log
struct ClientFetcher<'a> {
    client: &'a SearchClient,
    failure_log: &'a mut FailureLog,
    subreddit: &'a str,
    content_type: ContentType,
    requests: u64,
    failed: u64,
    skipped: u64,
}

impl FetchItems for ClientFetcher<'_> {
    async fn fetch(&mut self, window: TimeWindow) -> Result<Option<Vec<ItemRecord>>> {
        self.requests += 1;
        let request = QueryRequest {
            term: String::new(),
            subreddit: self.subreddit.to_string(),
            window,
            content_type: self.content_type,
        };
        match self
            .client
            .execute_with_retry(&request, QueryMode::Items, self.failure_log)
            .await?
        {
            None => {
                self.failed += 1;
                Ok(None)
            }
            Some(body) => match extract_items(&body) {
                Ok(items) => Ok(Some(items)),
                Err(err) => {
                    error!(
                        error = %err,
                        subreddit = %self.subreddit,
                        before = window.before,
                        "malformed item body, skipping window"
                    );
                    self.skipped += 1;
                    Ok(None)
                }
            },
        }
    }
}
