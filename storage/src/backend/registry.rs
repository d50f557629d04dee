// Copyright 2020 Ant Group. All rights reserved.
//
// SPDX-License-Identifier: Apache-2.0

//! Maps a mount URL's scheme to the driver that understands it.
//!
//! The original `StorageOperations` resolution imported a module named
//! after the scheme at runtime. That has no safe Rust equivalent and no
//! use case here beyond picking one of a small, fixed set of drivers, so
//! this is a static table checked in order instead.

use std::sync::Arc;

use url::Url;

use super::{Backend, BackendError, BackendResult, CommonConfig};
use super::cloud::CloudBackend;
use super::local::LocalBackend;

type Factory = fn(&Url, &CommonConfig) -> BackendResult<Arc<dyn Backend>>;

fn local_factory(url: &Url, _config: &CommonConfig) -> BackendResult<Arc<dyn Backend>> {
    Ok(Arc::new(LocalBackend::new(url.path())?))
}

fn cloud_factory(url: &Url, config: &CommonConfig) -> BackendResult<Arc<dyn Backend>> {
    let access_token = url.username().to_string();
    let app_path = url.path().to_string();
    Ok(Arc::new(CloudBackend::new(access_token, app_path, config)?))
}

static DRIVERS: &[(&str, Factory)] = &[("file", local_factory), ("cloud", cloud_factory)];

/// Parse `url` as `<scheme>://[[[user[:password]@]host][/path]]` and
/// instantiate the driver registered for its scheme.
pub fn build(url: &str, config: &CommonConfig) -> BackendResult<Arc<dyn Backend>> {
    let parsed = Url::parse(url).map_err(|e| BackendError::InvalidUrl(e.to_string()))?;
    for (scheme, factory) in DRIVERS {
        if *scheme == parsed.scheme() {
            return factory(&parsed, config);
        }
    }
    Err(BackendError::UnknownScheme(parsed.scheme().to_string()))
}
