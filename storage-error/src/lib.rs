// Copyright 2020 Ant Group. All rights reserved.
//
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy shared by the blob cache / storage coordinator crates.
//!
//! The core cache and coordinator surface a small, closed set of error
//! kinds (see `Error` below); everywhere else they build plain
//! `std::io::Error` values through the `einval!`/`enoent!`/`eio!`/
//! `eacces!`/`last_error!` macros, mirroring how the rest of this codebase
//! talks to the kernel/FUSE boundary in terms of errno.

use std::io;

/// Build an `io::Error` with `ErrorKind::InvalidInput` from a `Display`able value.
#[macro_export]
macro_rules! einval {
    ($e:expr) => {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("{}", $e))
    };
}

/// Build an `io::Error` with `ErrorKind::NotFound` from a `Display`able value.
#[macro_export]
macro_rules! enoent {
    ($e:expr) => {
        std::io::Error::new(std::io::ErrorKind::NotFound, format!("{}", $e))
    };
    () => {
        std::io::Error::from_raw_os_error(libc::ENOENT)
    };
}

/// Build an `io::Error` with `ErrorKind::Other` from a `Display`able value.
#[macro_export]
macro_rules! eio {
    ($e:expr) => {
        std::io::Error::new(std::io::ErrorKind::Other, format!("{}", $e))
    };
    () => {
        std::io::Error::from_raw_os_error(libc::EIO)
    };
}

/// Build an `io::Error` mapping to `EACCES`.
#[macro_export]
macro_rules! eacces {
    ($e:expr) => {
        std::io::Error::new(std::io::ErrorKind::PermissionDenied, format!("{}", $e))
    };
    () => {
        std::io::Error::from_raw_os_error(libc::EACCES)
    };
}

/// Wrap `errno()` as an `io::Error`, tagging it with a short description.
#[macro_export]
macro_rules! last_error {
    ($e:expr) => {
        std::io::Error::new(
            std::io::Error::last_os_error().kind(),
            format!("{}: {}", $e, std::io::Error::last_os_error()),
        )
    };
}

/// Error kinds surfaced synchronously by the fragment cache and storage
/// coordinator to their caller (a POSIX adapter, out of scope here).
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The fetch callback returned fewer bytes than requested, or failed.
    #[error("fetch callback failed for range [{offset}, {offset}+{len}): {source}")]
    BadFetch {
        offset: u64,
        len: u64,
        #[source]
        source: io::Error,
    },
    /// A blob name was not present in the open-blob table.
    #[error("no such open blob `{0}`")]
    NoSuchBlob(String),
    /// The ID register's range is exhausted and a non-blocking allocation
    /// was requested.
    #[error("id register exhausted, no free id in range")]
    IdSpaceFull,
    /// A backend open/metadata/upload/delete call failed.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    /// An argument violated a precondition (negative offset/length, etc).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Specialized `Result` for the error kinds above.
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::BadFetch { source, .. } => source,
            Error::NoSuchBlob(_) => enoent!(e),
            Error::IdSpaceFull => einval!(e),
            Error::BackendUnavailable(_) => eio!(e),
            Error::InvalidArgument(_) => einval!(e),
        }
    }
}

impl Error {
    pub fn bad_fetch(offset: u64, len: u64, source: io::Error) -> Self {
        Error::BadFetch { offset, len, source }
    }
}
