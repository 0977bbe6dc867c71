//! Buffered time-range sets.
//!
//! [`TimeRanges`] mirrors what a media buffer reports as "buffered": a sorted
//! list of disjoint `[start, end)` intervals in seconds. Construction always
//! normalizes, so every query can assume sorted, non-overlapping, non-empty
//! ranges.

use serde::{Deserialize, Serialize};

/// Ranges closer than this are considered contiguous when normalizing.
const MERGE_TOLERANCE: f64 = 1.0 / 60.0;

/// A single `[start, end)` interval, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    #[must_use]
    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Length of the interval in seconds.
    #[inline]
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Whether `position` lies inside `[start, end)`.
    #[inline]
    #[must_use]
    pub fn contains(&self, position: f64) -> bool {
        position >= self.start && position < self.end
    }
}

/// Sorted, disjoint set of buffered intervals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<TimeRange>", into = "Vec<TimeRange>")]
pub struct TimeRanges {
    ranges: Vec<TimeRange>,
}

impl TimeRanges {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from arbitrary intervals: empty or inverted ones are dropped,
    /// the rest sorted and merged.
    #[must_use]
    pub fn from_ranges(ranges: impl IntoIterator<Item = TimeRange>) -> Self {
        let mut ranges: Vec<TimeRange> = ranges
            .into_iter()
            .filter(|r| r.start.is_finite() && r.end.is_finite() && r.end > r.start)
            .collect();
        ranges.sort_by(|a, b| a.start.total_cmp(&b.start));

        let mut merged: Vec<TimeRange> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(last) if range.start <= last.end + MERGE_TOLERANCE => {
                    last.end = last.end.max(range.end);
                }
                _ => merged.push(range),
            }
        }
        Self { ranges: merged }
    }

    /// Number of disjoint intervals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimeRange> {
        self.ranges.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[TimeRange] {
        &self.ranges
    }

    /// The interval containing `position`, if any.
    #[must_use]
    pub fn range_containing(&self, position: f64) -> Option<TimeRange> {
        self.ranges.iter().copied().find(|r| r.contains(position))
    }

    /// Seconds buffered ahead of `position` in its interval, `None` when
    /// `position` is not buffered.
    #[must_use]
    pub fn buffer_gap_at(&self, position: f64) -> Option<f64> {
        self.range_containing(position).map(|r| r.end - position)
    }

    /// End of the last interval, `None` when empty.
    #[must_use]
    pub fn last_end(&self) -> Option<f64> {
        self.ranges.last().map(|r| r.end)
    }

    /// Total buffered seconds.
    #[must_use]
    pub fn total_duration(&self) -> f64 {
        self.ranges.iter().map(TimeRange::duration).sum()
    }

    /// Add an interval, keeping the set normalized.
    pub fn insert(&mut self, range: TimeRange) {
        let mut all = std::mem::take(&mut self.ranges);
        all.push(range);
        *self = Self::from_ranges(all);
    }
}

impl From<Vec<TimeRange>> for TimeRanges {
    fn from(ranges: Vec<TimeRange>) -> Self {
        Self::from_ranges(ranges)
    }
}

impl From<TimeRanges> for Vec<TimeRange> {
    fn from(ranges: TimeRanges) -> Self {
        ranges.ranges
    }
}

impl FromIterator<(f64, f64)> for TimeRanges {
    fn from_iter<I: IntoIterator<Item = (f64, f64)>>(iter: I) -> Self {
        Self::from_ranges(iter.into_iter().map(|(s, e)| TimeRange::new(s, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_on_construction() {
        let r: TimeRanges = [(10.0, 20.0), (0.0, 5.0), (4.0, 8.0), (30.0, 30.0)]
            .into_iter()
            .collect();
        assert_eq!(
            r.as_slice(),
            &[TimeRange::new(0.0, 8.0), TimeRange::new(10.0, 20.0)]
        );
    }

    #[test]
    fn nearly_contiguous_ranges_merge() {
        let r: TimeRanges = [(0.0, 4.0), (4.01, 9.0)].into_iter().collect();
        assert_eq!(r.len(), 1);
        assert_eq!(r.last_end(), Some(9.0));
    }

    #[test]
    fn buffer_gap() {
        let r: TimeRanges = [(0.0, 10.0), (20.0, 30.0)].into_iter().collect();
        assert_eq!(r.buffer_gap_at(4.0), Some(6.0));
        assert_eq!(r.buffer_gap_at(15.0), None);
        assert_eq!(r.buffer_gap_at(10.0), None);
        assert_eq!(r.range_containing(25.0), Some(TimeRange::new(20.0, 30.0)));
    }

    #[test]
    fn insert_keeps_normalized() {
        let mut r = TimeRanges::new();
        r.insert(TimeRange::new(5.0, 6.0));
        r.insert(TimeRange::new(0.0, 5.0));
        assert_eq!(r.as_slice(), &[TimeRange::new(0.0, 6.0)]);
        assert!((r.total_duration() - 6.0).abs() < f64::EPSILON);
    }

    #[test]
    fn serializes_as_list() {
        let r: TimeRanges = [(0.0, 1.5)].into_iter().collect();
        let json = serde_json::to_string(&r).expect("serialize");
        assert_eq!(json, r#"[{"start":0.0,"end":1.5}]"#);
        let back: TimeRanges = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, r);
    }
}
