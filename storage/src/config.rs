// Copyright 2020 Ant Group. All rights reserved.
//
// SPDX-License-Identifier: Apache-2.0

//! Deserializable description of a single mount.

use serde::{Deserialize, Serialize};

use crate::backend::CommonConfig;
use crate::META_BLOB_NAME;

fn default_metadata_blob_name() -> String {
    META_BLOB_NAME.to_string()
}

/// One mount: which backend to talk to, how, and where the metadata blob
/// lives within it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountConfig {
    /// `<scheme>://[[[user[:password]@]host][/path]]`, resolved through
    /// [`crate::backend::registry::build`].
    pub backend_url: String,
    /// Request tuning shared by every HTTP-based driver; ignored by
    /// [`crate::backend::local::LocalBackend`].
    #[serde(default)]
    pub common: CommonConfig,
    /// Reserved blob name holding the (externally compressed) metadata
    /// image. Defaults to `"0"`, matching the source.
    #[serde(default = "default_metadata_blob_name")]
    pub metadata_blob_name: String,
}
