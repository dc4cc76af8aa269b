//! # Time Window Partitioning Module
//!
//! This module partitions a date range into an ordered, non-overlapping
//! sequence of query windows. The archive API filters results by unix
//! timestamp bounds, so a scan over a multi-year range is driven by walking
//! the range newest-first in calendar-month or fixed-day steps.
//!
//! ## Key Components
//!
//! - `TimeWindow`: a half-open `[after, before)` interval in unix seconds
//! - `WindowStep`: calendar-month or fixed-day step size
//! - `partition`: produces the window sequence covering a date range
//!
//! The sequence is contiguous and gap-free: each window's `after` is the
//! next window's `before`, the first window starts at the scan's start
//! instant and the last is clamped to its end instant.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};

/// Seconds in a fixed-length day, used for day stepping
const DAY_SECS: i64 = 86_400;

/// A half-open time interval `[after, before)` in unix seconds
///
/// Invariant: `after < before`. Used directly as the `before`/`after`
/// query parameters of the archive API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    /// Exclusive upper bound (unix seconds)
    pub before: i64,

    /// Inclusive lower bound (unix seconds)
    pub after: i64,
}

impl TimeWindow {
    /// Create a window from raw unix-second bounds
    pub fn new(before: i64, after: i64) -> Self {
        Self { before, after }
    }

    /// Re-partition this window into fixed-day sub-windows, newest-first
    ///
    /// The final sub-window is clamped to this window's `after`, so the
    /// result covers exactly the same span. Returns an empty vector when
    /// `days` is zero.
    pub fn split_days(&self, days: u32) -> Vec<TimeWindow> {
        if days == 0 {
            return Vec::new();
        }
        let step = i64::from(days) * DAY_SECS;
        let mut windows = Vec::new();
        let mut curr = self.before;
        while curr > self.after {
            let after = (curr - step).max(self.after);
            windows.push(TimeWindow {
                before: curr,
                after,
            });
            curr = after;
        }
        windows
    }
}

/// Step size used when walking a date range down into windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStep {
    /// One calendar month per window, with correct month-length and
    /// year-rollover handling
    Month,

    /// A fixed number of days per window
    Days(u32),
}

/// Partition `[end, start]` into an ordered, non-overlapping sequence of
/// windows, newest-first
///
/// Walks `curr` from `start` down toward `end`, emitting
/// `(before = curr, after = curr - step)` and clamping the final window's
/// `after` to `end`. Returns an empty vector when `start <= end`.
pub fn partition(start: DateTime<Utc>, end: DateTime<Utc>, step: WindowStep) -> Vec<TimeWindow> {
    match step {
        WindowStep::Days(days) => {
            if start <= end {
                return Vec::new();
            }
            TimeWindow::new(start.timestamp(), end.timestamp()).split_days(days)
        }
        WindowStep::Month => {
            let end_ts = end.timestamp();
            let mut windows = Vec::new();
            let mut curr = start;
            while curr.timestamp() > end_ts {
                let before = curr.timestamp();
                let prev = step_back_month(curr);
                let after = prev.timestamp().max(end_ts);
                windows.push(TimeWindow { before, after });
                curr = prev;
            }
            windows
        }
    }
}

/// Decrement the month field of `curr`, rolling the year back and wrapping
/// to December on underflow
///
/// The day-of-month is clamped to the target month's length, so stepping
/// back from e.g. March 31 lands on the last day of February.
fn step_back_month(curr: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = match curr.month() {
        1 => (curr.year() - 1, 12),
        m => (curr.year(), m - 1),
    };
    let day = curr.day().min(days_in_month(year, month));
    Utc.with_ymd_and_hms(year, month, day, curr.hour(), curr.minute(), curr.second())
        .single()
        .expect("clamped calendar date is valid")
}

/// Number of days in the given month
fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
    }

    /// Windows must tile `[end, start]` exactly: newest-first, no gaps,
    /// no overlaps, bounds matching the requested range.
    fn assert_covers(windows: &[TimeWindow], start: DateTime<Utc>, end: DateTime<Utc>) {
        assert!(!windows.is_empty());
        assert_eq!(windows[0].before, start.timestamp());
        assert_eq!(windows[windows.len() - 1].after, end.timestamp());
        for window in windows {
            assert!(window.after < window.before);
        }
        for pair in windows.windows(2) {
            assert_eq!(pair[0].after, pair[1].before);
        }
    }

    #[test]
    fn test_monthly_partition_scenario() {
        let windows = partition(utc(2023, 2, 1), utc(2022, 11, 1), WindowStep::Month);

        assert_eq!(
            windows,
            vec![
                TimeWindow::new(utc(2023, 2, 1).timestamp(), utc(2023, 1, 1).timestamp()),
                TimeWindow::new(utc(2023, 1, 1).timestamp(), utc(2022, 12, 1).timestamp()),
                TimeWindow::new(utc(2022, 12, 1).timestamp(), utc(2022, 11, 1).timestamp()),
            ]
        );
        assert_covers(&windows, utc(2023, 2, 1), utc(2022, 11, 1));
    }

    #[test]
    fn test_monthly_partition_rolls_over_year_boundary() {
        let windows = partition(utc(2023, 1, 15), utc(2022, 11, 15), WindowStep::Month);

        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].after, utc(2022, 12, 15).timestamp());
        assert_covers(&windows, utc(2023, 1, 15), utc(2022, 11, 15));
    }

    #[test]
    fn test_monthly_partition_clamps_day_to_month_length() {
        let windows = partition(utc(2023, 3, 31), utc(2023, 2, 1), WindowStep::Month);

        // March 31 steps back to the last day of February, not an
        // invalid February 31.
        assert_eq!(windows[0].after, utc(2023, 2, 28).timestamp());
        assert_covers(&windows, utc(2023, 3, 31), utc(2023, 2, 1));
    }

    #[test]
    fn test_monthly_partition_clamps_final_window_to_end() {
        let windows = partition(utc(2023, 2, 15), utc(2023, 1, 20), WindowStep::Month);

        // A full month step would cross below `end`, so the single window
        // is clamped to it.
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].before, utc(2023, 2, 15).timestamp());
        assert_eq!(windows[0].after, utc(2023, 1, 20).timestamp());
    }

    #[test]
    fn test_day_partition_covers_range() {
        let start = utc(2023, 2, 1);
        let end = utc(2022, 10, 24);
        let windows = partition(start, end, WindowStep::Days(7));

        assert_covers(&windows, start, end);
        for window in &windows {
            assert!(window.before - window.after <= 7 * DAY_SECS);
        }
    }

    #[test]
    fn test_day_partition_clamps_final_window() {
        let start = utc(2023, 1, 31);
        let end = utc(2023, 1, 1);
        let windows = partition(start, end, WindowStep::Days(7));

        assert_eq!(windows.len(), 5);
        assert_eq!(windows[4].before - windows[4].after, 2 * DAY_SECS);
        assert_covers(&windows, start, end);
    }

    #[test]
    fn test_partition_empty_when_start_not_after_end() {
        assert!(partition(utc(2023, 1, 1), utc(2023, 1, 1), WindowStep::Month).is_empty());
        assert!(partition(utc(2022, 1, 1), utc(2023, 1, 1), WindowStep::Days(7)).is_empty());
    }

    #[test]
    fn test_split_days_tiles_window() {
        let window = TimeWindow::new(10 * DAY_SECS, 0);
        let split = window.split_days(3);

        assert_eq!(split.len(), 4);
        assert_eq!(split[0].before, window.before);
        assert_eq!(split[3].after, window.after);
        for pair in split.windows(2) {
            assert_eq!(pair[0].after, pair[1].before);
        }
        // Last piece is the 1-day remainder.
        assert_eq!(split[3].before - split[3].after, DAY_SECS);
    }

    #[test]
    fn test_split_days_zero_is_empty() {
        assert!(TimeWindow::new(100, 0).split_days(0).is_empty());
    }
}
