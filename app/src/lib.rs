// Copyright 2020 Ant Group. All rights reserved.
//
// SPDX-License-Identifier: Apache-2.0

//! Ambient bootstrap for a binary wiring a mount together: log
//! initialization and build-time version info. Has no dependency on
//! `storage`/`storage-error` so it can be reused by any future frontend.

use std::io;
use std::path::PathBuf;

use flexi_logger::{Duplicate, FileSpec, LogSpecification, Logger};

/// Build-time metadata baked in by `built` (`build.rs`).
pub mod build_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// A human-readable one-liner identifying this build, suitable for a
/// startup log line or a `--version` flag.
pub fn version_string() -> String {
    format!(
        "{} {} ({}, {})",
        build_info::PKG_NAME,
        build_info::PKG_VERSION,
        build_info::GIT_COMMIT_HASH.unwrap_or("unknown"),
        build_info::BUILT_TIME_UTC,
    )
}

/// Initialize the global `log` logger.
///
/// `log_file`, if given, additionally mirrors output there; warnings and
/// errors are always duplicated to stderr regardless of destination.
pub fn setup_logging(log_file: Option<PathBuf>, level: log::LevelFilter) -> io::Result<()> {
    let spec = LogSpecification::default(level).build();
    let mut logger = Logger::with(spec);
    if let Some(path) = log_file {
        logger = logger
            .log_to_file(
                FileSpec::try_from(path)
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?,
            )
            .duplicate_to_stderr(Duplicate::Warn);
    }
    logger
        .start()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("failed to start logger: {}", e)))?;
    Ok(())
}
