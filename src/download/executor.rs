// kindle-core - Kindle e-book delivery client
// Copyright (C) 2025 kindle-core contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Part download execution
//!
//! Sends every [`PartRequest`] through the shared [`KindleClient`] and
//! streams successful bodies into the staging directory.
//!
//! # Failure policy
//! A non-success status or a request/I/O failure on one part is logged,
//! recorded as [`PartOutcome::Skipped`] and the remaining parts continue.
//! Any other error (an unsignable request, for instance) aborts the run.
//! A part that fails mid-stream has its partial file removed.
//!
//! # Concurrency
//! With `max_concurrent_parts == 1` parts run strictly one after another.
//! Larger values keep up to that many requests in flight. Either way the
//! returned outcomes follow request order, and [`DownloadExecutor::execute_all`]
//! only returns once every part has been attempted.
//!
//! # File names
//! 1. the type-derived name from the request builder
//! 2. the `Content-Disposition` file name of the response
//! 3. the resource id
//!
//! A name already taken by an earlier part is prefixed with the resource id.

use crate::api::client::KindleClient;
use crate::api::manifest::ResourceType;
use crate::download::progress::{PartProgress, ProgressCallback, ProgressTracker};
use crate::download::request::PartRequest;
use crate::error::{KindleError, Result};
use crate::file::paths::{filename_from_content_disposition, sanitize_filename};
use futures_util::{stream, StreamExt};
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;

/// Result of attempting one part
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum PartOutcome {
    #[serde(rename_all = "camelCase")]
    Downloaded {
        resource_id: String,
        resource_type: ResourceType,
        filename: String,
        bytes: u64,
        #[serde(skip)]
        path: PathBuf,
    },
    #[serde(rename_all = "camelCase")]
    Skipped {
        resource_id: String,
        resource_type: ResourceType,
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        http_status: Option<u16>,
    },
}

impl PartOutcome {
    /// Skipped outcome for an error that stopped a part
    pub fn skipped(resource_id: &str, resource_type: &ResourceType, error: &KindleError) -> Self {
        Self::Skipped {
            resource_id: resource_id.to_string(),
            resource_type: resource_type.clone(),
            reason: error.to_string(),
            http_status: error.status(),
        }
    }

    pub fn resource_id(&self) -> &str {
        match self {
            Self::Downloaded { resource_id, .. } | Self::Skipped { resource_id, .. } => resource_id,
        }
    }

    /// Path of the written file, for downloaded parts
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Downloaded { path, .. } => Some(path),
            Self::Skipped { .. } => None,
        }
    }

    pub fn is_downloaded(&self) -> bool {
        matches!(self, Self::Downloaded { .. })
    }
}

/// Executes part requests for one title
pub struct DownloadExecutor<'a> {
    client: &'a KindleClient,
    content_id: String,
    staging_dir: PathBuf,
    max_concurrent_parts: usize,
    progress: Option<ProgressCallback>,
    claimed: Mutex<HashSet<String>>,
}

impl<'a> DownloadExecutor<'a> {
    pub fn new(client: &'a KindleClient, content_id: impl Into<String>, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            content_id: content_id.into(),
            staging_dir: staging_dir.into(),
            max_concurrent_parts: 1,
            progress: None,
            claimed: Mutex::new(HashSet::new()),
        }
    }

    /// Allow up to `n` parts in flight (minimum 1)
    pub fn with_max_concurrent_parts(mut self, n: usize) -> Self {
        self.max_concurrent_parts = n.max(1);
        self
    }

    pub fn with_progress(mut self, callback: Option<ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Reserve names that parts must not use (e.g. the manifest side file)
    pub fn reserve_filename(&self, name: &str) {
        self.lock_claimed().insert(name.to_string());
    }

    /// Attempt every request and return one outcome per request, in order
    ///
    /// # Errors
    /// Only errors outside the request/I/O class; part failures are
    /// returned as [`PartOutcome::Skipped`].
    pub async fn execute_all(&self, requests: Vec<PartRequest>) -> Result<Vec<PartOutcome>> {
        let attempts: Vec<Result<PartOutcome>> = stream::iter(requests.into_iter().map(|r| self.attempt(r)))
            .buffered(self.max_concurrent_parts)
            .collect()
            .await;

        attempts.into_iter().collect()
    }

    /// Attempt a single part
    pub async fn attempt(&self, request: PartRequest) -> Result<PartOutcome> {
        let mut tracker = ProgressTracker::new(
            PartProgress::new(self.content_id.clone(), request.resource_id.clone(), request.expected_size),
            self.progress.clone(),
        );

        match self.download(&request, &mut tracker).await {
            Ok((filename, path, bytes)) => {
                tracker.complete();
                tracing::info!(resource_id = %request.resource_id, %filename, bytes, "downloaded part");
                Ok(PartOutcome::Downloaded {
                    resource_id: request.resource_id,
                    resource_type: request.resource_type,
                    filename,
                    bytes,
                    path,
                })
            }
            Err(e) if e.is_part_recoverable() => {
                tracing::warn!(resource_id = %request.resource_id, error = %e, "skipping part");
                tracker.skip(e.to_string());
                Ok(PartOutcome::skipped(&request.resource_id, &request.resource_type, &e))
            }
            Err(e) => Err(e),
        }
    }

    async fn download(
        &self,
        request: &PartRequest,
        tracker: &mut ProgressTracker,
    ) -> Result<(String, PathBuf, u64)> {
        let part_error = |message: String, status: Option<u16>| KindleError::PartDownload {
            resource_id: request.resource_id.clone(),
            message,
            status,
        };

        let builder = self
            .client
            .http()
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());

        let response = self.client.send(builder).await.map_err(|e| match e {
            KindleError::Http(err) => part_error(err.to_string(), err.status().map(|s| s.as_u16())),
            other => other,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(part_error(format!("HTTP {}", status), Some(status.as_u16())));
        }

        let filename = self.claim_filename(request, response.headers());
        let path = self.staging_dir.join(&filename);

        tracker.set_total_if_unknown(response.content_length());
        tracker.start();

        let mut file = tokio::fs::File::create(&path).await?;
        let mut body = response.bytes_stream();
        let mut written = 0u64;

        let streamed: Result<()> = async {
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(|e| part_error(format!("Body interrupted: {}", e), None))?;
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
                tracker.advance(written);
            }
            file.flush().await?;
            Ok(())
        }
        .await;

        if let Err(e) = streamed {
            drop(file);
            if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                tracing::debug!(path = %path.display(), error = %remove_err, "could not remove partial file");
            }
            self.lock_claimed().remove(&filename);
            return Err(e);
        }

        Ok((filename, path, written))
    }

    fn claim_filename(&self, request: &PartRequest, headers: &HeaderMap) -> String {
        let candidate = request
            .target_filename
            .clone()
            .or_else(|| {
                headers
                    .get(CONTENT_DISPOSITION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(filename_from_content_disposition)
            })
            .unwrap_or_else(|| fallback_name(&request.resource_id));

        let mut claimed = self.lock_claimed();
        let mut name = candidate.clone();
        let mut n = 1;
        while claimed.contains(&name) {
            name = if n == 1 {
                format!("{}_{}", fallback_name(&request.resource_id), candidate)
            } else {
                format!("{}_{}_{}", fallback_name(&request.resource_id), n, candidate)
            };
            n += 1;
        }
        claimed.insert(name.clone());
        name
    }

    fn lock_claimed(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        // The set holds plain names; a poisoned lock still has usable contents.
        self.claimed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn fallback_name(resource_id: &str) -> String {
    let name = sanitize_filename(resource_id);
    if name.is_empty() {
        "part".to_string()
    } else {
        name
    }
}
