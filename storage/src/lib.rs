// Copyright 2020 Ant Group. All rights reserved.
//
// SPDX-License-Identifier: Apache-2.0

//! Sparse byte-range fragment cache and blob storage coordinator.
//!
//! This crate implements the two core subsystems of a remote-blob-backed
//! filesystem's storage layer: a lazily-populated, sparse byte-range cache
//! over a single blob ([`cache::FragmentCache`]), and a per-mount
//! coordinator that owns every open blob's cache plus a background
//! uploader ([`coordinator::StorageCoordinator`]). A pluggable [`backend`]
//! trait abstracts over where blobs actually live.
//!
//! The POSIX/FUSE adapter, the metadata database schema, and the `mount`/
//! `fsck` command-line surface are all out of scope; this crate's contract
//! ends at `open`/`read`/`write`/`truncate`/`close`/`remove`.

pub mod backend;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod id_register;
pub mod upload_queue;

pub use storage_error::{Error, Result};

/// Reserved blob name holding the (externally compressed) metadata image.
pub const META_BLOB_NAME: &str = "0";
