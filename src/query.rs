//! Query enumeration for the scan loop
//!
//! A scan is the Cartesian product of content types, search terms,
//! subreddits and time windows. The product can run to tens of thousands of
//! requests, so it is enumerated lazily, one `QueryRequest` at a time.

use crate::window::TimeWindow;

/// Kind of archive content a query targets
///
/// The archive exposes one search endpoint per content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    /// A forum post
    Submission,

    /// A comment on a post
    Comment,
}

impl ContentType {
    /// Endpoint path segment for this content type
    pub fn endpoint(&self) -> &'static str {
        match self {
            ContentType::Submission => "submission",
            ContentType::Comment => "comment",
        }
    }

    /// Whether this content type is the submission endpoint
    pub fn is_submission(&self) -> bool {
        matches!(self, ContentType::Submission)
    }
}

/// A fully-specified archive query
///
/// Immutable once constructed; uniquely identifies one API call. An empty
/// `term` queries the window without a free-text filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    /// Free-text search term, empty for no text filter
    pub term: String,

    /// Subreddit the query is restricted to
    pub subreddit: String,

    /// Time window the query is restricted to
    pub window: TimeWindow,

    /// Content type, selecting the endpoint
    pub content_type: ContentType,
}

/// Lazily enumerate the Cartesian product
/// `content_types × terms × subreddits × windows`
///
/// Content type is the outermost axis, matching the per-endpoint split of
/// the archive API. The product is never materialized; each request is
/// built as the iterator is advanced.
pub fn enumerate<'a>(
    terms: &'a [String],
    subreddits: &'a [String],
    windows: &'a [TimeWindow],
    content_types: &'a [ContentType],
) -> impl Iterator<Item = QueryRequest> + 'a {
    content_types.iter().flat_map(move |&content_type| {
        terms.iter().flat_map(move |term| {
            subreddits.iter().flat_map(move |subreddit| {
                windows.iter().map(move |&window| QueryRequest {
                    term: term.clone(),
                    subreddit: subreddit.clone(),
                    window,
                    content_type,
                })
            })
        })
    })
}
