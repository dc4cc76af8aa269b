//! # Response Envelope Extraction Module
//!
//! This module turns a successful search response into normalized records.
//! The archive API wraps results in a JSON envelope; the paths this module
//! reads are its contract with the upstream:
//!
//! - `metadata.es.hits.total.value`: total hit count
//! - `metadata.es.hits.total.relation`: `"eq"` for an exact count,
//!   `"gte"` when the upstream capped counting and the true total may
//!   exceed the reported value
//! - `metadata.es_query.query.bool.must[]`: the query-explanation clause
//!   list mirroring the request's filters:
//!   `simple_query_string.query` (free-text term, absent when the query had
//!   none), `term.subreddit` (subreddit filter) and
//!   `range.created_utc.{gte,lt}` (window bounds, `gte` inclusive lower /
//!   `lt` exclusive upper)
//! - `data[]`: the raw result list, each element carrying its own `id`
//!
//! Clauses are located by name, never by position. A required path missing
//! from a well-formed success body is an upstream contract violation and
//! fails loudly with [`Error::MissingField`]; the scan loop treats that as
//! fatal for the single record and moves on.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::query::QueryRequest;

/// Whether a reported hit count is exact or a lower bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitPrecision {
    /// The upstream counted every hit
    Exact,

    /// Counting was capped; the true total may exceed the reported value
    LowerBound,
}

impl HitPrecision {
    /// The upstream relation string this precision serializes as
    pub fn as_str(&self) -> &'static str {
        match self {
            HitPrecision::Exact => "eq",
            HitPrecision::LowerBound => "gte",
        }
    }

    fn from_relation(relation: &str) -> Self {
        if relation == "eq" {
            HitPrecision::Exact
        } else {
            HitPrecision::LowerBound
        }
    }
}

/// Aggregate-mode output unit: hit statistics for one term × subreddit ×
/// window query
///
/// Written exactly once per successful, non-overflowing query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountRecord {
    /// Free-text term the query filtered on, empty for none
    pub term: String,

    /// Subreddit the query was restricted to
    pub subreddit: String,

    /// Exclusive upper window bound (unix seconds)
    pub before: i64,

    /// Inclusive lower window bound (unix seconds)
    pub after: i64,

    /// Total hit count reported by the upstream
    pub hits: u64,

    /// Whether `hits` is exact or a lower bound
    pub precision: HitPrecision,

    /// Whether the submission endpoint was queried (false for comments)
    pub is_submission: bool,
}

/// Raw-mode output unit: one post or comment as returned by the API
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRecord {
    /// Upstream id, used to deduplicate overlapping re-queries
    pub id: String,

    /// The item's fields as returned, `id` included
    pub fields: Map<String, Value>,
}

/// Response envelope, deserialized only as deep as this module reads it
#[derive(Debug, Deserialize)]
struct Envelope {
    data: Option<Vec<Value>>,
    metadata: Option<EnvelopeMetadata>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeMetadata {
    es: Option<EsStats>,
    es_query: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct EsStats {
    hits: Option<EsHits>,
}

#[derive(Debug, Deserialize)]
struct EsHits {
    total: Option<HitTotal>,
}

#[derive(Debug, Deserialize)]
struct HitTotal {
    value: u64,
    relation: String,
}

/// Extract aggregate hit statistics from a success body
///
/// `request` contributes only the endpoint (`is_submission`); every other
/// field is read back from the envelope's query explanation so the record
/// reflects what the upstream actually evaluated.
pub fn extract_counts(body: &str, request: &QueryRequest) -> Result<CountRecord> {
    let envelope: Envelope = serde_json::from_str(body)?;
    let metadata = envelope
        .metadata
        .ok_or_else(|| Error::MissingField("metadata".to_string()))?;

    let total = metadata
        .es
        .and_then(|es| es.hits)
        .and_then(|hits| hits.total)
        .ok_or_else(|| Error::MissingField("metadata.es.hits.total".to_string()))?;

    let clauses = metadata
        .es_query
        .as_ref()
        .and_then(|query| query.pointer("/query/bool/must"))
        .and_then(Value::as_array)
        .ok_or_else(|| Error::MissingField("metadata.es_query.query.bool.must".to_string()))?;

    // A query without a free-text filter simply has no text clause.
    let term = find_clause(clauses, "/simple_query_string/query")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let subreddit = find_clause(clauses, "/term/subreddit")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::MissingField("term.subreddit".to_string()))?
        .to_string();

    let range = find_clause(clauses, "/range/created_utc")
        .ok_or_else(|| Error::MissingField("range.created_utc".to_string()))?;
    let after = range
        .pointer("/gte")
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::MissingField("range.created_utc.gte".to_string()))?;
    let before = range
        .pointer("/lt")
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::MissingField("range.created_utc.lt".to_string()))?;

    Ok(CountRecord {
        term,
        subreddit,
        before,
        after,
        hits: total.value,
        precision: HitPrecision::from_relation(&total.relation),
        is_submission: request.content_type.is_submission(),
    })
}

/// Find the first clause containing the given named path
fn find_clause<'a>(clauses: &'a [Value], path: &str) -> Option<&'a Value> {
    clauses.iter().find_map(|clause| clause.pointer(path))
}

/// Decode the raw result list from a success body
pub fn extract_items(body: &str) -> Result<Vec<ItemRecord>> {
    let envelope: Envelope = serde_json::from_str(body)?;
    let data = envelope
        .data
        .ok_or_else(|| Error::MissingField("data".to_string()))?;

    data.into_iter()
        .map(|item| {
            let fields = match item {
                Value::Object(fields) => fields,
                _ => return Err(Error::MissingField("data[].id".to_string())),
            };
            let id = match fields.get("id") {
                Some(Value::String(id)) => id.clone(),
                Some(Value::Number(id)) => id.to_string(),
                _ => return Err(Error::MissingField("data[].id".to_string())),
            };
            Ok(ItemRecord { id, fields })
        })
        .collect()
}
