/// Interval merging over 1-based inclusive integer coordinates
use crate::error::{CoverageError, Result};

/// Closed interval `[start, end]` with start <= end
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Interval {
    pub start: u64,
    pub end: u64,
}

impl Interval {
    /// Build an interval from coordinates given in either order
    pub fn new(a: u64, b: u64) -> Self {
        if a <= b {
            Interval { start: a, end: b }
        } else {
            Interval { start: b, end: a }
        }
    }

    /// Number of inclusive positions spanned
    pub fn span(&self) -> u64 {
        self.end - self.start + 1
    }
}

impl From<(u64, u64)> for Interval {
    fn from((a, b): (u64, u64)) -> Self {
        Interval::new(a, b)
    }
}

/// Collapse intervals into the minimal sorted set of disjoint intervals.
///
/// An interval whose start is <= the running end is folded in, so `[1,5]` and `[5,9]`
/// merge while `[1,5]` and `[6,9]` stay separate. An empty list is a precondition error.
pub fn merge_intervals(mut intervals: Vec<Interval>) -> Result<Vec<Interval>> {
    if intervals.is_empty() {
        return Err(CoverageError::Precondition(
            "cannot merge an empty interval list".to_string(),
        ));
    }

    intervals.sort_unstable_by_key(|iv| iv.start);

    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
    let mut current = intervals[0];

    for next in &intervals[1..] {
        if next.start <= current.end {
            current.end = current.end.max(next.end);
        } else {
            merged.push(current);
            current = *next;
        }
    }
    merged.push(current);

    Ok(merged)
}

/// Sum of inclusive lengths of already-merged intervals
pub fn covered_bases(merged: &[Interval]) -> u64 {
    merged.iter().map(Interval::span).sum()
}

/// Merge and count in one step
pub fn coverage_of(intervals: Vec<Interval>) -> Result<u64> {
    merge_intervals(intervals).map(|m| covered_bases(&m))
}
