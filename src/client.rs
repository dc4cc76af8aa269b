//! # Search Client Module
//!
//! This module executes archive queries over HTTP and applies the
//! collector's entire failure-recovery policy: classify, wait, retry once,
//! then log and move on. There is deliberately no backoff tuning or circuit
//! breaking; a single request's permanent failure must never abort a batch
//! that may have tens of thousands of requests left.
//!
//! ## Key Components
//!
//! - `SearchClient`: the HTTP client, one outstanding request at a time
//! - `QueryMode`: aggregate statistics vs raw item list query form
//! - `QueryOutcome`: success or recoverable failure classification

use std::time::Duration;

use reqwest::Client as ReqwestClient;
use tracing::{debug, error, instrument, warn};
use url::Url;

use crate::error::Result;
use crate::output::FailureLog;
use crate::query::QueryRequest;

/// Default timeout for HTTP requests in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Which form of a query to issue
///
/// The same request parameters serve both output variants; only the
/// envelope shape differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// Ask for hit statistics only (`metadata=true&size=0`)
    Counts,

    /// Ask for the raw result list, up to the page-size ceiling
    Items,
}

/// Classification of one executed request
///
/// Any HTTP status below 300 is a success; everything else, including a
/// transport error that produced no response at all (recorded with status
/// 0), is a recoverable failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    /// The request succeeded; `body` is the raw response text
    Success {
        /// Raw response body
        body: String,
    },

    /// The request failed and may be retried
    Failure {
        /// HTTP status code, or 0 when no response was received
        status: u16,
        /// Response body or transport error text
        body: String,
    },
}

/// HTTP client for the archive search API
#[derive(Clone)]
pub struct SearchClient {
    /// The underlying reqwest client
    client: ReqwestClient,

    /// Base URL for API requests
    base_url: String,

    /// Fixed delay before the single retry of a failed request
    retry_delay: Duration,

    /// Page-size ceiling requested for raw item queries
    page_limit: usize,
}

impl SearchClient {
    /// Create a new client against the given API base URL
    pub fn new(base_url: impl Into<String>, retry_delay: Duration, page_limit: usize) -> Self {
        let client = ReqwestClient::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.into(),
            retry_delay,
            page_limit,
        }
    }

    /// Build the endpoint URL for a request
    ///
    /// The endpoint differs per content type; the window bounds and filters
    /// travel as query parameters. An empty term still sends `q=` the way
    /// the upstream expects an unfiltered query.
    fn build_url(&self, request: &QueryRequest, mode: QueryMode) -> Result<Url> {
        let endpoint = format!(
            "{}/reddit/search/{}/",
            self.base_url,
            request.content_type.endpoint()
        );
        let before = request.window.before.to_string();
        let after = request.window.after.to_string();
        let limit = self.page_limit.to_string();

        let mut params: Vec<(&str, &str)> = vec![
            ("q", request.term.as_str()),
            ("subreddit", request.subreddit.as_str()),
            ("before", before.as_str()),
            ("after", after.as_str()),
        ];
        match mode {
            QueryMode::Counts => {
                params.push(("metadata", "true"));
                params.push(("size", "0"));
            }
            QueryMode::Items => {
                params.push(("limit", limit.as_str()));
            }
        }

        Ok(Url::parse_with_params(&endpoint, &params)?)
    }

    /// Execute one request and classify the outcome
    ///
    /// Only URL construction can fail as an `Err`; transport and HTTP
    /// failures are data, folded into [`QueryOutcome::Failure`].
    #[instrument(skip(self, request), level = "debug")]
    pub async fn execute(&self, request: &QueryRequest, mode: QueryMode) -> Result<QueryOutcome> {
        let url = self.build_url(request, mode)?;
        debug!(%url, "sending GET request");

        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(%url, error = %err, "no response received");
                return Ok(QueryOutcome::Failure {
                    status: 0,
                    body: err.to_string(),
                });
            }
        };

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                return Ok(QueryOutcome::Failure {
                    status,
                    body: err.to_string(),
                });
            }
        };

        if status >= 300 {
            Ok(QueryOutcome::Failure { status, body })
        } else {
            Ok(QueryOutcome::Success { body })
        }
    }

    /// Execute a request under the bounded retry policy
    ///
    /// A failure waits out the configured delay and retries exactly once.
    /// A second failure appends one entry to the failure log and yields
    /// `Ok(None)`; the caller continues with the next request.
    #[instrument(
        skip(self, request, failure_log),
        fields(term = %request.term, subreddit = %request.subreddit, before = request.window.before)
    )]
    pub async fn execute_with_retry(
        &self,
        request: &QueryRequest,
        mode: QueryMode,
        failure_log: &mut FailureLog,
    ) -> Result<Option<String>> {
        match self.execute(request, mode).await? {
            QueryOutcome::Success { body } => return Ok(Some(body)),
            QueryOutcome::Failure { status, .. } => {
                warn!(status, delay_secs = self.retry_delay.as_secs(), "request failed, retrying once");
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        match self.execute(request, mode).await? {
            QueryOutcome::Success { body } => Ok(Some(body)),
            QueryOutcome::Failure { status, body } => {
                let url = self.build_url(request, mode)?;
                error!(status, %url, "retry failed, abandoning request");
                failure_log.append(status, url.as_str(), &body)?;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ContentType;
    use crate::window::TimeWindow;
    use tempfile::TempDir;

    fn request() -> QueryRequest {
        QueryRequest {
            term: "sports".to_string(),
            subreddit: "uci".to_string(),
            window: TimeWindow::new(1_675_209_600, 1_672_531_200),
            content_type: ContentType::Submission,
        }
    }

    fn client(base_url: &str) -> SearchClient {
        SearchClient::new(base_url, Duration::from_millis(10), 1000)
    }

    #[test]
    fn test_build_url_counts_form() {
        let url = client("https://api.example.com")
            .build_url(&request(), QueryMode::Counts)
            .unwrap();

        assert_eq!(url.path(), "/reddit/search/submission/");
        let query = url.query().unwrap();
        assert!(query.contains("q=sports"));
        assert!(query.contains("subreddit=uci"));
        assert!(query.contains("before=1675209600"));
        assert!(query.contains("after=1672531200"));
        assert!(query.contains("metadata=true"));
        assert!(query.contains("size=0"));
    }

    #[test]
    fn test_build_url_items_form_and_comment_endpoint() {
        let mut request = request();
        request.content_type = ContentType::Comment;
        request.term = String::new();

        let url = client("https://api.example.com")
            .build_url(&request, QueryMode::Items)
            .unwrap();

        assert_eq!(url.path(), "/reddit/search/comment/");
        let query = url.query().unwrap();
        // An unfiltered query still carries an empty q parameter.
        assert!(query.contains("q="));
        assert!(query.contains("limit=1000"));
        assert!(!query.contains("metadata"));
    }

    #[tokio::test]
    async fn test_execute_classifies_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/reddit/search/submission/")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body("{\"data\": []}")
            .expect(1)
            .create_async()
            .await;

        let outcome = client(&server.url())
            .execute(&request(), QueryMode::Counts)
            .await
            .unwrap();

        assert_eq!(outcome, QueryOutcome::Success {
            body: "{\"data\": []}".to_string(),
        });
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_execute_classifies_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/reddit/search/submission/")
            .match_query(mockito::Matcher::Any)
            .with_status(404)
            .with_body("not found")
            .create_async()
            .await;

        let outcome = client(&server.url())
            .execute(&request(), QueryMode::Counts)
            .await
            .unwrap();

        assert_eq!(outcome, QueryOutcome::Failure {
            status: 404,
            body: "not found".to_string(),
        });
    }

    #[tokio::test]
    async fn test_execute_transport_error_is_status_zero() {
        // Nothing listens here; the connection is refused.
        let outcome = client("http://127.0.0.1:1")
            .execute(&request(), QueryMode::Counts)
            .await
            .unwrap();

        assert!(matches!(outcome, QueryOutcome::Failure { status: 0, .. }));
    }

    #[tokio::test]
    async fn test_retry_exhaustion_makes_two_attempts_and_one_log_entry() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/reddit/search/submission/")
            .match_query(mockito::Matcher::Any)
            .with_status(500)
            .with_body("server error")
            .expect(2)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("failures.log");
        let mut log = FailureLog::open(&log_path).unwrap();

        let body = client(&server.url())
            .execute_with_retry(&request(), QueryMode::Counts, &mut log)
            .await
            .unwrap();

        assert!(body.is_none());
        // Exactly two attempts, never more.
        mock.assert_async().await;

        // Exactly one three-line log entry.
        let contents = std::fs::read_to_string(&log_path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "500");
        assert!(lines[1].contains("/reddit/search/submission/"));
        assert_eq!(lines[2], "server error");
    }

    #[tokio::test]
    async fn test_success_does_not_retry_or_log() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/reddit/search/submission/")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body("ok")
            .expect(1)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("failures.log");
        let mut log = FailureLog::open(&log_path).unwrap();

        let body = client(&server.url())
            .execute_with_retry(&request(), QueryMode::Counts, &mut log)
            .await
            .unwrap();

        assert_eq!(body.as_deref(), Some("ok"));
        mock.assert_async().await;
        assert_eq!(std::fs::read_to_string(&log_path).unwrap(), "");
    }
}
