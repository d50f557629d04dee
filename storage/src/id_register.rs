// Copyright 2020 Ant Group. All rights reserved.
//
// SPDX-License-Identifier: Apache-2.0

//! A bounded `id -> value` map that hands out ids by linear probing from a
//! hint, with an optional blocking mode for callers willing to wait for a
//! slot to free up.
//!
//! Grounded on `cpfs/register.py`'s `Register`: a dict-like object that
//! allocates the smallest id at or after `last_id` not currently in use,
//! wrapping at the upper bound, and blocking via a condition variable when
//! the space is full.

use std::sync::{Condvar, Mutex};

use storage_error::{Error, Result};

struct State<T> {
    entries: std::collections::HashMap<u64, T>,
    next_hint: u64,
}

/// A bounded integer keyspace `[lo, hi]` mapping ids to values of type `T`.
pub struct IdRegister<T> {
    lo: u64,
    hi: u64,
    state: Mutex<State<T>>,
    not_full: Condvar,
}

impl<T> IdRegister<T> {
    pub fn new(lo: u64, hi: u64) -> Self {
        assert!(lo <= hi, "id register range must be non-empty");
        Self {
            lo,
            hi,
            state: Mutex::new(State {
                entries: std::collections::HashMap::new(),
                next_hint: lo,
            }),
            not_full: Condvar::new(),
        }
    }

    fn capacity(&self) -> u64 {
        self.hi - self.lo + 1
    }

    /// Find the first free id at or after `state.next_hint`, wrapping at
    /// `hi + 1 -> lo`. Caller must already know the map isn't full.
    fn probe(&self, state: &State<T>) -> u64 {
        let mut id = state.next_hint;
        loop {
            if id > self.hi {
                id = self.lo;
            }
            if !state.entries.contains_key(&id) {
                return id;
            }
            id += 1;
        }
    }

    /// Allocate an id for `value` without blocking. Fails with
    /// `IdSpaceFull` if every id in `[lo, hi]` is taken.
    pub fn try_register(&self, value: T) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        if state.entries.len() as u64 == self.capacity() {
            return Err(Error::IdSpaceFull);
        }
        let id = self.probe(&state);
        state.entries.insert(id, value);
        state.next_hint = id + 1;
        Ok(id)
    }

    /// Allocate an id for `value`, blocking until one is free.
    pub fn register_blocking(&self, value: T) -> u64 {
        let mut state = self.state.lock().unwrap();
        while state.entries.len() as u64 == self.capacity() {
            state = self.not_full.wait(state).unwrap();
        }
        let id = self.probe(&state);
        state.entries.insert(id, value);
        state.next_hint = id + 1;
        id
    }

    /// Remove and return the value registered under `id`, waking one
    /// blocked allocator if the map was full.
    pub fn deregister(&self, id: u64) -> Option<T> {
        let mut state = self.state.lock().unwrap();
        let was_full = state.entries.len() as u64 == self.capacity();
        let removed = state.entries.remove(&id);
        if removed.is_some() && was_full {
            self.not_full.notify_one();
        }
        removed
    }

    pub fn contains(&self, id: u64) -> bool {
        self.state.lock().unwrap().entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> IdRegister<T> {
    pub fn get(&self, id: u64) -> Option<T> {
        self.state.lock().unwrap().entries.get(&id).cloned()
    }
}
