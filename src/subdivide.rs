//! # Overflow Subdivision Module
//!
//! A raw-mode query can return at most the API's page-size ceiling. A
//! window that comes back exactly full is presumptively truncated: more
//! items exist than one page could carry. This module re-queries such
//! windows at successively finer day granularities until they fit, merging
//! everything it sees and deduplicating by item id, since the subdivided
//! windows re-overlap the boundaries already fetched.
//!
//! Subdivision runs over an explicit worklist of `(window, granularity)`
//! pairs rather than recursing, which keeps stack depth flat and makes the
//! termination property directly testable: granularity strictly halves and
//! floors at one day, so a window saturated at every level costs a bounded
//! number of extra queries. A window still saturated at one-day granularity
//! is accepted as a known-lossy result and reported through the log.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::error::Result;
use crate::extract::ItemRecord;
use crate::window::TimeWindow;

/// Source of raw items for a window
///
/// `fetch` returns `Ok(None)` when the request was abandoned after its
/// retry (the executor has already logged it); subdivision skips that
/// sub-window and carries on.
#[allow(async_fn_in_trait)]
pub trait FetchItems {
    /// Fetch up to one page of items for the window
    async fn fetch(&mut self, window: TimeWindow) -> Result<Option<Vec<ItemRecord>>>;
}

/// Collect every item in `window`, subdividing on overflow
///
/// The window is split into `granularity_days`-sized sub-windows and each
/// is fetched once. A sub-window returning `page_limit` or more items is
/// pushed back onto the worklist at half its granularity (minimum one day);
/// one saturated at a single day is logged and accepted as incomplete.
/// Merged items are deduplicated by id, so the result only ever grows as
/// granularity shrinks.
pub async fn collect_window<F: FetchItems>(
    fetcher: &mut F,
    window: TimeWindow,
    granularity_days: u32,
    page_limit: usize,
) -> Result<Vec<ItemRecord>> {
    let mut items = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut worklist = vec![(window, granularity_days.max(1))];

    while let Some((span, granularity)) = worklist.pop() {
        for sub in span.split_days(granularity) {
            let Some(batch) = fetcher.fetch(sub).await? else {
                continue;
            };
            let truncated = batch.len() >= page_limit;

            for item in batch {
                if seen.insert(item.id.clone()) {
                    items.push(item);
                }
            }

            if truncated {
                if granularity > 1 {
                    let finer = (granularity / 2).max(1);
                    debug!(
                        before = sub.before,
                        after = sub.after,
                        granularity,
                        finer,
                        "window saturated, subdividing"
                    );
                    worklist.push((sub, finer));
                } else {
                    warn!(
                        before = sub.before,
                        after = sub.after,
                        "window saturated at one-day granularity, accepting incomplete results"
                    );
                }
            }
        }
    }

    Ok(items)
}
