// Copyright 2020 Ant Group. All rights reserved.
//
// SPDX-License-Identifier: Apache-2.0

//! A sparse byte-range cache layer over a single remote blob.
//!
//! [`FragmentCache`](fragment::FragmentCache) is populated lazily from an
//! injected fetch callback and tracks which byte ranges are resident via
//! [`ByteRangeMap`](range_map::ByteRangeMap). It supports arbitrary
//! overlapping reads, writes and truncation while fetching only the holes
//! a given operation actually needs.
//!
//! Known limitation: a fetch for one hole blocks every other operation on
//! the same blob for its duration. Correct, not maximally concurrent; a
//! future revision could deduplicate concurrent fetches of the same hole
//! with a pending-fetch map instead of holding the whole-cache mutex
//! across I/O.

pub mod fragment;
pub mod range_map;

pub use fragment::FragmentCache;
pub use range_map::ByteRangeMap;
