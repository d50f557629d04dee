// Copyright 2020 Ant Group. All rights reserved.
//
// SPDX-License-Identifier: Apache-2.0

//! The storage backend contract and the drivers that implement it.
//!
//! A driver is a plugin that knows how to talk to one concrete remote (or
//! local) object store. [`StorageCoordinator`](crate::coordinator::StorageCoordinator)
//! is built on top of exactly one driver, and mirrors the same operation
//! set to its own caller while interposing the fragment cache and upload
//! queue in between.

pub mod cloud;
pub mod local;
pub mod registry;

use std::io;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use storage_error::eio;

use crate::cache::fragment::FetchFn;

/// Error surfaced by a concrete backend driver.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The driver doesn't support the requested operation.
    #[error("unsupported backend operation: {0}")]
    Unsupported(String),
    /// A request to the remote failed (network, HTTP status, etc).
    #[error("backend request failed: {0}")]
    Request(String),
    /// A local filesystem call failed.
    #[error("local filesystem error: {0}")]
    Io(#[from] io::Error),
    /// The mount URL didn't name a registered scheme.
    #[error("no backend registered for scheme `{0}`")]
    UnknownScheme(String),
    /// The mount URL was missing required authority fields for this driver.
    #[error("invalid backend url: {0}")]
    InvalidUrl(String),
}

/// Specialized `Result` for backend operations.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

impl From<BackendError> for io::Error {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::Io(e) => e,
            other => eio!(other),
        }
    }
}

/// Generic per-request tuning, shared by every HTTP-based driver.
///
/// Modeled on a `CommonConfig`/`ProxyConfig` pair using the same
/// `#[serde(default)]` shape; the proxy fallback chain isn't relevant to
/// this contract, so only the fields the backend actually needs are kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommonConfig {
    /// Per-request timeout, in seconds.
    pub timeout_secs: u64,
    /// TCP connect timeout, in seconds.
    pub connect_timeout_secs: u64,
    /// Number of times to retry a failed request before giving up.
    pub retry_limit: u8,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 5,
            retry_limit: 2,
        }
    }
}

/// The storage backend contract every driver implements.
pub trait Backend: Send + Sync {
    /// Make `name` ready for I/O; may discover the blob's remote length.
    fn open(&self, name: &str) -> BackendResult<()>;
    /// Declare `name` as newly created: no remote fetch on future opens.
    fn create(&self, name: &str) -> BackendResult<()>;
    /// Read exactly `length` bytes at `offset`, or fail.
    fn read(&self, name: &str, offset: u64, length: u64) -> BackendResult<Vec<u8>>;
    /// Write `buf` at `offset`. No round trip is required before return.
    fn write(&self, name: &str, offset: u64, buf: &[u8]) -> BackendResult<usize>;
    /// Truncate the blob's logical length.
    fn truncate(&self, name: &str, length: u64) -> BackendResult<()>;
    /// Current logical length of the blob.
    fn size(&self, name: &str) -> BackendResult<u64>;
    /// Best-effort flush hint; drivers may treat this as a no-op.
    fn flush(&self, name: &str) -> BackendResult<()> {
        let _ = name;
        Ok(())
    }
    /// End of client use of `name`; may enqueue an upload.
    fn close(&self, name: &str) -> BackendResult<()>;
    /// Delete `name` locally and remotely.
    fn remove(&self, name: &str) -> BackendResult<()>;
    /// `(used, total)` space accounting.
    fn statfs(&self) -> BackendResult<(u64, u64)>;
    /// Drain pending uploads and terminate any background worker.
    fn destroy(&self) {}
}

/// Bind a driver's `read` to the `(offset, length) -> bytes` shape that
/// [`FragmentCache`](crate::cache::fragment::FragmentCache) expects.
pub fn fetch_fn(backend: Arc<dyn Backend>, name: String) -> FetchFn {
    Box::new(move |offset, length| {
        backend
            .read(&name, offset, length)
            .map_err(io::Error::from)
    })
}
