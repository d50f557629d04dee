// Copyright 2020 Ant Group. All rights reserved.
//
// SPDX-License-Identifier: Apache-2.0

//! An ordered, disjoint, non-adjacent set of half-open byte ranges.
//!
//! Backs [`FragmentCache`](crate::cache::fragment::FragmentCache)'s
//! notion of which byte ranges of its buffer are resident. Stored as a
//! sorted `Vec<(u64, u64)>` rather than a tree: the number of resident
//! fragments of a single blob is small in practice, so binary search over
//! a flat vector is both simpler and faster than a tree for this size
//! range.

use std::cmp;

/// A sorted, disjoint, non-adjacent collection of `[start, end)` ranges.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ByteRangeMap {
    ranges: Vec<(u64, u64)>,
}

impl ByteRangeMap {
    pub fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    /// Index of the first range whose end is `> offset`, i.e. the first
    /// range that could possibly intersect or follow `offset`.
    fn lower_bound(&self, offset: u64) -> usize {
        self.ranges.partition_point(|&(_, end)| end <= offset)
    }

    /// True iff `[a, b)` is fully contained in a single resident range.
    pub fn contains_range(&self, a: u64, b: u64) -> bool {
        if a >= b {
            return true;
        }
        let idx = self.lower_bound(a);
        match self.ranges.get(idx) {
            Some(&(start, end)) => start <= a && b <= end,
            None => false,
        }
    }

    /// Yield, in increasing order, the sub-intervals of `[a, b)` that are
    /// not yet resident.
    pub fn holes(&self, a: u64, b: u64) -> Vec<(u64, u64)> {
        let mut out = Vec::new();
        if a >= b {
            return out;
        }
        let mut cursor = a;
        let idx = self.lower_bound(a);
        for &(start, end) in &self.ranges[idx..] {
            if start >= b {
                break;
            }
            if cursor < start {
                out.push((cursor, cmp::min(start, b)));
            }
            cursor = cmp::max(cursor, end);
            if cursor >= b {
                break;
            }
        }
        if cursor < b {
            out.push((cursor, b));
        }
        out
    }

    /// Insert `[a, b)`, merging with any intersecting or adjacent range.
    pub fn insert(&mut self, a: u64, b: u64) {
        if a >= b {
            return;
        }
        let start_idx = self.ranges.partition_point(|&(_, end)| end < a);
        let mut merged_start = a;
        let mut merged_end = b;
        let mut end_idx = start_idx;
        while end_idx < self.ranges.len() && self.ranges[end_idx].0 <= merged_end {
            let (s, e) = self.ranges[end_idx];
            merged_start = cmp::min(merged_start, s);
            merged_end = cmp::max(merged_end, e);
            end_idx += 1;
        }
        self.ranges
            .splice(start_idx..end_idx, std::iter::once((merged_start, merged_end)));
    }

    /// Remove anything above `L`; shrink a range straddling `L` to end at
    /// `L`. A no-op if `L` already coincides with (or exceeds) every
    /// endpoint.
    pub fn clip_at(&mut self, length: u64) {
        let idx = self.ranges.partition_point(|&(start, _)| start < length);
        self.ranges.truncate(idx);
        if let Some(last) = self.ranges.last_mut() {
            if last.1 > length {
                last.1 = length;
            }
        }
    }

    #[cfg(test)]
    pub fn ranges(&self) -> &[(u64, u64)] {
        &self.ranges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_disjoint() {
        let mut m = ByteRangeMap::new();
        m.insert(0, 5);
        m.insert(10, 15);
        assert_eq!(m.ranges(), &[(0, 5), (10, 15)]);
    }

    #[test]
    fn test_insert_merges_overlap() {
        let mut m = ByteRangeMap::new();
        m.insert(0, 5);
        m.insert(3, 8);
        assert_eq!(m.ranges(), &[(0, 8)]);
    }

    #[test]
    fn test_insert_merges_adjacent() {
        let mut m = ByteRangeMap::new();
        m.insert(0, 5);
        m.insert(5, 10);
        assert_eq!(m.ranges(), &[(0, 10)]);
    }

    #[test]
    fn test_insert_bridges_gap() {
        let mut m = ByteRangeMap::new();
        m.insert(0, 5);
        m.insert(10, 15);
        m.insert(4, 11);
        assert_eq!(m.ranges(), &[(0, 15)]);
    }

    #[test]
    fn test_contains_range() {
        let mut m = ByteRangeMap::new();
        m.insert(2, 8);
        assert!(m.contains_range(2, 8));
        assert!(m.contains_range(3, 5));
        assert!(!m.contains_range(1, 8));
        assert!(!m.contains_range(2, 9));
        assert!(m.contains_range(5, 5));
    }

    #[test]
    fn test_holes_simple() {
        let mut m = ByteRangeMap::new();
        m.insert(2, 5);
        assert_eq!(m.holes(0, 8), vec![(0, 2), (5, 8)]);
        assert_eq!(m.holes(2, 5), vec![]);
        assert_eq!(m.holes(3, 4), vec![]);
    }

    #[test]
    fn test_holes_multiple_residents() {
        let mut m = ByteRangeMap::new();
        m.insert(2, 4);
        m.insert(6, 8);
        assert_eq!(m.holes(0, 10), vec![(0, 2), (4, 6), (8, 10)]);
    }

    #[test]
    fn test_clip_at_drops_above() {
        let mut m = ByteRangeMap::new();
        m.insert(0, 5);
        m.insert(10, 15);
        m.clip_at(12);
        assert_eq!(m.ranges(), &[(0, 5), (10, 12)]);
    }

    #[test]
    fn test_clip_at_endpoint_is_noop() {
        let mut m = ByteRangeMap::new();
        m.insert(0, 5);
        m.clip_at(5);
        assert_eq!(m.ranges(), &[(0, 5)]);
    }

    #[test]
    fn test_clip_at_zero_clears_everything() {
        let mut m = ByteRangeMap::new();
        m.insert(0, 5);
        m.insert(10, 15);
        m.clip_at(0);
        assert_eq!(m.ranges(), &[]);
    }

    #[test]
    fn test_empty_insert_is_ignored() {
        let mut m = ByteRangeMap::new();
        m.insert(5, 5);
        assert_eq!(m.ranges(), &[]);
    }
}
