// Copyright 2020 Ant Group. All rights reserved.
//
// SPDX-License-Identifier: Apache-2.0

//! A [`Backend`] over an HTTP object store, addressed as
//! `cloud://<token>@<host>/<app-path>`.
//!
//! Grounded on `cpfs/remote/bpan.py`'s `StorageOperations`: a GET with a
//! `Range` header for reads, a multipart POST for whole-blob uploads, a
//! plain POST for deletes, and a `(used, quota)` pair cached for up to 600
//! seconds so `statfs()` doesn't round-trip on every call. `reqwest`'s
//! blocking client is used rather than its async one, since every caller in
//! this crate runs on a plain OS thread rather than an async runtime (see
//! `coordinator.rs`'s uploader thread).

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Deserialize;

use super::{Backend, BackendError, BackendResult, CommonConfig};

const DOWNLOAD_BASE: &str = "https://d.pcs.example.com/rest/2.0/pcs/file";
const UPLOAD_BASE: &str = "https://c.pcs.example.com/rest/2.0/pcs/file";
const META_BASE: &str = "https://pcs.example.com/rest/2.0/pcs/file";
const QUOTA_BASE: &str = "https://pcs.example.com/rest/2.0/pcs/quota";

const QUOTA_CACHE_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Deserialize)]
struct MetaEntry {
    size: u64,
}

#[derive(Debug, Deserialize)]
struct MetaList {
    list: Vec<MetaEntry>,
}

#[derive(Debug, Deserialize)]
struct QuotaInfo {
    used: u64,
    quota: u64,
}

/// HTTP object-store driver, modeled on a Baidu-PCS-shaped API: per-request
/// bearer-style `access_token`, an app-rooted path namespace, and a `Range`
/// header for partial downloads.
pub struct CloudBackend {
    client: reqwest::blocking::Client,
    access_token: String,
    app_path: String,
    quota: Mutex<Option<(Instant, (u64, u64))>>,
}

impl CloudBackend {
    pub fn new(access_token: String, app_path: String, config: &CommonConfig) -> BackendResult<Self> {
        if access_token.is_empty() {
            return Err(BackendError::InvalidUrl("access token missing".into()));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| BackendError::Request(e.to_string()))?;
        Ok(Self {
            client,
            access_token,
            app_path,
            quota: Mutex::new(None),
        })
    }

    fn remote_path(&self, name: &str) -> String {
        format!("{}/{}", self.app_path, name)
    }

    fn get_meta(&self, name: &str) -> BackendResult<MetaEntry> {
        let path = self.remote_path(name);
        let resp = self
            .client
            .get(META_BASE)
            .query(&[
                ("method", "meta"),
                ("path", path.as_str()),
                ("access_token", self.access_token.as_str()),
            ])
            .send()
            .map_err(|e| BackendError::Request(e.to_string()))?;
        let body: MetaList = resp.json().map_err(|e| BackendError::Request(e.to_string()))?;
        body.list
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::Request(format!("no metadata returned for `{}`", name)))
    }
}

impl Backend for CloudBackend {
    fn open(&self, _name: &str) -> BackendResult<()> {
        Ok(())
    }

    fn create(&self, _name: &str) -> BackendResult<()> {
        Ok(())
    }

    fn read(&self, name: &str, offset: u64, length: u64) -> BackendResult<Vec<u8>> {
        let range = format!("bytes={}-{}", offset, offset + length.saturating_sub(1));
        let path = self.remote_path(name);
        let resp = self
            .client
            .get(DOWNLOAD_BASE)
            .query(&[
                ("method", "download"),
                ("path", path.as_str()),
                ("access_token", self.access_token.as_str()),
            ])
            .header(reqwest::header::RANGE, range)
            .send()
            .map_err(|e| BackendError::Request(e.to_string()))?;
        let bytes = resp.bytes().map_err(|e| BackendError::Request(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn write(&self, name: &str, offset: u64, buf: &[u8]) -> BackendResult<usize> {
        if offset != 0 {
            return Err(BackendError::Unsupported(
                "cloud backend only supports whole-blob uploads at offset 0".into(),
            ));
        }
        let form = reqwest::blocking::multipart::Form::new().part(
            "file",
            reqwest::blocking::multipart::Part::bytes(buf.to_vec()),
        );
        let path = self.remote_path(name);
        self.client
            .post(UPLOAD_BASE)
            .query(&[
                ("method", "upload"),
                ("path", path.as_str()),
                ("ondup", "overwrite"),
                ("access_token", self.access_token.as_str()),
            ])
            .multipart(form)
            .send()
            .map_err(|e| BackendError::Request(e.to_string()))?;
        Ok(buf.len())
    }

    fn truncate(&self, _name: &str, _length: u64) -> BackendResult<()> {
        // The remote object is only ever replaced wholesale on upload; the
        // authoritative length lives in the fragment cache until then.
        Ok(())
    }

    fn size(&self, name: &str) -> BackendResult<u64> {
        Ok(self.get_meta(name)?.size)
    }

    fn flush(&self, _name: &str) -> BackendResult<()> {
        Ok(())
    }

    fn close(&self, _name: &str) -> BackendResult<()> {
        Ok(())
    }

    fn remove(&self, name: &str) -> BackendResult<()> {
        let path = self.remote_path(name);
        self.client
            .post(META_BASE)
            .query(&[
                ("method", "delete"),
                ("path", path.as_str()),
                ("access_token", self.access_token.as_str()),
            ])
            .send()
            .map_err(|e| BackendError::Request(e.to_string()))?;
        Ok(())
    }

    fn statfs(&self) -> BackendResult<(u64, u64)> {
        let mut quota = self.quota.lock().unwrap();
        if let Some((fetched_at, value)) = *quota {
            if fetched_at.elapsed() < QUOTA_CACHE_TTL {
                return Ok(value);
            }
        }
        let resp = self
            .client
            .get(QUOTA_BASE)
            .query(&[
                ("method", "info"),
                ("access_token", self.access_token.as_str()),
            ])
            .send()
            .map_err(|e| BackendError::Request(e.to_string()))?;
        let info: QuotaInfo = resp.json().map_err(|e| BackendError::Request(e.to_string()))?;
        let value = (info.used, info.quota);
        *quota = Some((Instant::now(), value));
        Ok(value)
    }
}
