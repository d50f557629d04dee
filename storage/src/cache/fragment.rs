// Copyright 2020 Ant Group. All rights reserved.
//
// SPDX-License-Identifier: Apache-2.0

use std::cmp;
use std::io;
use std::sync::Mutex;

use storage_error::{Error, Result};

use super::range_map::ByteRangeMap;

/// `(offset, length) -> exactly `length` bytes`, or an I/O error.
///
/// Error handling is the fetch's concern: whatever it returns on success is
/// trusted verbatim. The cache only checks that the byte count matches.
pub type FetchFn = Box<dyn Fn(u64, u64) -> io::Result<Vec<u8>> + Send + Sync>;

struct Inner {
    buffer: Vec<u8>,
    resident: ByteRangeMap,
    length: u64,
    dirty: bool,
}

/// A random-access, in-memory, sparsely-populated view of one blob.
///
/// All mutating and reading operations serialize through a single mutex
/// (held for the duration of any fetch they trigger, see the module-level
/// doc comment on `blocking fetch under cache lock`).
pub struct FragmentCache {
    fetch: FetchFn,
    inner: Mutex<Inner>,
}

impl FragmentCache {
    /// Create a cache with logical length `length` and nothing resident.
    pub fn new(fetch: FetchFn, length: u64) -> Self {
        Self {
            fetch,
            inner: Mutex::new(Inner {
                buffer: Vec::new(),
                resident: ByteRangeMap::new(),
                length,
                dirty: false,
            }),
        }
    }

    /// Current logical length of the blob.
    pub fn len(&self) -> u64 {
        self.inner.lock().unwrap().length
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the cache holds writes/truncations not yet reflected by a
    /// completed upload.
    pub fn is_dirty(&self) -> bool {
        self.inner.lock().unwrap().dirty
    }

    /// Clear the dirty flag, e.g. after a successful upload.
    pub fn clear_dirty(&self) {
        self.inner.lock().unwrap().dirty = false;
    }

    /// Mark the cache dirty without touching its contents, used when a
    /// blob is declared newly created and has nothing remote to diff
    /// against yet.
    pub fn mark_dirty(&self) {
        self.inner.lock().unwrap().dirty = true;
    }

    /// Ensure `[a, b) ⊆ resident`. Assumes `inner`'s lock is already held
    /// by the caller — this exists because `std::sync::Mutex` isn't
    /// reentrant and `read`/`write` both need to call it while holding
    /// their own lock guard.
    fn load_locked(inner: &mut Inner, fetch: &FetchFn, a: u64, b: u64, zero_fill: bool) -> Result<()> {
        if a >= b || inner.resident.contains_range(a, b) {
            return Ok(());
        }
        for (x, y) in inner.resident.holes(a, b) {
            if inner.buffer.len() < y as usize {
                inner.buffer.resize(y as usize, 0);
            }
            if !zero_fill {
                let want = y - x;
                let data = fetch(x, want).map_err(|e| Error::bad_fetch(x, want, e))?;
                if data.len() as u64 != want {
                    return Err(Error::bad_fetch(
                        x,
                        want,
                        io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            format!("fetch returned {} of {} requested bytes", data.len(), want),
                        ),
                    ));
                }
                inner.buffer[x as usize..y as usize].copy_from_slice(&data);
            }
        }
        inner.resident.insert(a, b);
        Ok(())
    }

    /// Load `[a, b)` into residency without reading it back. Public entry
    /// point used by callers that only want to warm the cache.
    pub fn load(&self, a: u64, b: u64, zero_fill: bool) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        Self::load_locked(&mut inner, &self.fetch, a, b, zero_fill)
    }

    /// Read `n` bytes at `offset`, clamped to the logical length.
    pub fn read(&self, offset: u64, n: u64) -> Result<Vec<u8>> {
        let mut inner = self.inner.lock().unwrap();
        let n_effective = cmp::min(n, inner.length.saturating_sub(offset));
        if n_effective == 0 {
            return Ok(Vec::new());
        }
        let end = offset + n_effective;
        Self::load_locked(&mut inner, &self.fetch, offset, end, false)?;
        Ok(inner.buffer[offset as usize..end as usize].to_vec())
    }

    /// Overwrite `buf.len()` bytes at `offset`, growing the logical length
    /// if necessary. Never triggers a fetch for the overwritten range.
    pub fn write(&self, offset: u64, buf: &[u8]) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        let end = offset + buf.len() as u64;
        Self::load_locked(&mut inner, &self.fetch, offset, end, true)?;
        inner.buffer[offset as usize..end as usize].copy_from_slice(buf);
        inner.resident.insert(offset, end);
        inner.length = cmp::max(inner.length, end);
        inner.dirty = true;
        Ok(buf.len())
    }

    /// Truncate (or zero-extend) the blob to exactly `length` bytes.
    pub fn truncate(&self, length: u64) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        if (length as usize) <= inner.buffer.len() {
            inner.buffer.truncate(length as usize);
        } else {
            inner.buffer.resize(length as usize, 0);
        }
        inner.resident.clip_at(length);
        inner.length = length;
        inner.dirty = true;
        Ok(length)
    }

    /// Snapshot the full resident image, `[0, len())`, for upload. Fetches
    /// any remaining holes first so the uploaded bytes are complete.
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        let mut inner = self.inner.lock().unwrap();
        let end = inner.length;
        Self::load_locked(&mut inner, &self.fetch, 0, end, false)?;
        Ok(inner.buffer[..end as usize].to_vec())
    }
}
