// Copyright 2020 Ant Group. All rights reserved.
//
// SPDX-License-Identifier: Apache-2.0

//! An insertion-ordered set of blob names pending upload.
//!
//! `add`ing a name already in the queue moves it to the tail instead of
//! duplicating it, which is how two `close()` calls on the same dirty blob
//! between uploader passes collapse into a single pending upload ("upload
//! coalescing").

use indexmap::IndexSet;

#[derive(Default)]
pub struct UploadQueue {
    names: IndexSet<String>,
}

impl UploadQueue {
    pub fn new() -> Self {
        Self {
            names: IndexSet::new(),
        }
    }

    /// Insert `name`, or move it to the tail if already queued.
    pub fn add(&mut self, name: &str) {
        self.names.shift_remove(name);
        self.names.insert(name.to_string());
    }

    /// Remove `name` if present. Returns whether it was present.
    pub fn discard(&mut self, name: &str) -> bool {
        self.names.shift_remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Remove and return the oldest remaining name, if any.
    pub fn pop_front(&mut self) -> Option<String> {
        if self.names.is_empty() {
            None
        } else {
            Some(self.names.shift_remove_index(0))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }
}
