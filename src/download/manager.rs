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


//! Download cycle orchestration
//!
//! One call to [`DownloadManager::download_book`] runs a full cycle for a
//! title:
//!
//! ```text
//! FETCH_MANIFEST → FILTER_RESOURCES → BUILD_REQUESTS → DOWNLOAD_PARTS
//!   → WRITE_SIDE_FILE → PACKAGE → [DECRYPT] → DONE
//! ```
//!
//! Stages only move forward. A failure while fetching the manifest or
//! packaging ends the cycle; a failure on one part only skips that part.
//! Resources without a download URL are skipped the same way.
//!
//! Parts are staged in `{output}/.{CONTENT_ID}.parts/` and removed once
//! packaged. Dropping the returned future cancels the cycle; staged files
//! left behind by a cancelled cycle can be deleted freely.

use crate::api::client::KindleClient;
use crate::api::manifest::Manifest;
use crate::crypto::decryptor::{decrypt_in_place, Decryptor};
use crate::download::executor::{DownloadExecutor, PartOutcome};
use crate::download::progress::ProgressCallback;
use crate::download::request::{PartRequest, PartRequestBuilder};
use crate::download::scope::ScopeFilter;
use crate::error::{KindleError, Result};
use crate::file::archive::ArchiveAssembler;
use crate::file::paths::manifest_filename;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Download configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadOptions {
    /// Which resources to fetch (default `DEFERRED`: everything)
    pub scope: ScopeFilter,

    /// Directory receiving the archive
    pub output_dir: PathBuf,

    /// Parts in flight at once; 1 downloads sequentially
    pub max_concurrent_parts: usize,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            scope: ScopeFilter::default(),
            output_dir: PathBuf::from("."),
            max_concurrent_parts: 1,
        }
    }
}

impl DownloadOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    /// Set the scope from its name
    ///
    /// # Errors
    /// `InvalidScope` for an unknown name
    pub fn with_scope_name(mut self, name: &str) -> Result<Self> {
        self.scope = ScopeFilter::parse(name)?;
        Ok(self)
    }

    pub fn with_max_concurrent_parts(mut self, n: usize) -> Self {
        self.max_concurrent_parts = n.max(1);
        self
    }
}

/// Stage of a download cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStage {
    FetchManifest,
    FilterResources,
    BuildRequests,
    DownloadParts,
    WriteSideFile,
    Package,
    Decrypt,
    Done,
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CycleStage::FetchManifest => "FETCH_MANIFEST",
            CycleStage::FilterResources => "FILTER_RESOURCES",
            CycleStage::BuildRequests => "BUILD_REQUESTS",
            CycleStage::DownloadParts => "DOWNLOAD_PARTS",
            CycleStage::WriteSideFile => "WRITE_SIDE_FILE",
            CycleStage::Package => "PACKAGE",
            CycleStage::Decrypt => "DECRYPT",
            CycleStage::Done => "DONE",
        })
    }
}

/// Result of a completed cycle
#[derive(Debug, Clone)]
pub struct DownloadSummary {
    pub content_id: String,

    /// The archive, decrypted when a decryptor ran
    pub archive_path: PathBuf,

    /// One outcome per selected resource, manifest order
    pub outcomes: Vec<PartOutcome>,

    pub decrypted: bool,
}

impl DownloadSummary {
    pub fn downloaded_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_downloaded()).count()
    }

    pub fn skipped(&self) -> impl Iterator<Item = &PartOutcome> {
        self.outcomes.iter().filter(|o| !o.is_downloaded())
    }

    /// True when every selected resource made it into the archive
    pub fn is_complete(&self) -> bool {
        self.skipped().next().is_none()
    }
}

/// Runs download cycles
pub struct DownloadManager {
    client: KindleClient,
    options: DownloadOptions,
    decryptor: Option<Arc<dyn Decryptor>>,
    progress: Option<ProgressCallback>,
}

impl DownloadManager {
    pub fn new(client: KindleClient, options: DownloadOptions) -> Self {
        Self {
            client,
            options,
            decryptor: None,
            progress: None,
        }
    }

    /// Hand every packaged archive to `decryptor`
    pub fn with_decryptor(mut self, decryptor: Arc<dyn Decryptor>) -> Self {
        self.decryptor = Some(decryptor);
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn options(&self) -> &DownloadOptions {
        &self.options
    }

    /// Download, package and optionally decrypt one title
    ///
    /// # Errors
    /// - `InvalidInput` - malformed content id
    /// - `ManifestFetch` / `ManifestParse` - no manifest, nothing downloaded
    /// - `Packaging` - the archive could not be written
    /// - `Decrypt` - the decryptor failed; the plain archive is kept at
    ///   its usual path
    pub async fn download_book(&self, content_id: &str) -> Result<DownloadSummary> {
        enter(CycleStage::FetchManifest, content_id);
        let manifest = self.client.get_manifest(content_id).await?;
        self.download_manifest(&manifest).await
    }

    /// Run the cycle from an already resolved manifest
    pub async fn download_manifest(&self, manifest: &Manifest) -> Result<DownloadSummary> {
        let content_id = manifest.content_id.as_str();

        enter(CycleStage::FilterResources, content_id);
        let selected = self.options.scope.select(&manifest.resources);
        tracing::info!(
            content_id,
            scope = %self.options.scope.scope(),
            selected = selected.len(),
            total = manifest.resources.len(),
            "selected resources"
        );

        enter(CycleStage::BuildRequests, content_id);
        let builder = PartRequestBuilder::new(&self.client, manifest);
        let mut slots: Vec<Slot> = Vec::with_capacity(selected.len());
        for resource in &selected {
            match builder.build(resource) {
                Ok(request) => slots.push(Slot::Pending(request)),
                Err(e) if e.is_part_recoverable() => {
                    tracing::warn!(resource_id = %resource.id, error = %e, "skipping resource");
                    slots.push(Slot::Done(PartOutcome::skipped(&resource.id, &resource.resource_type, &e)));
                }
                Err(e) => return Err(e),
            }
        }

        let staging_dir = staging_dir(&self.options.output_dir, content_id);
        clear_staging_dir(&staging_dir).await?;
        tokio::fs::create_dir_all(&staging_dir).await?;

        enter(CycleStage::DownloadParts, content_id);
        let executor = DownloadExecutor::new(&self.client, content_id, &staging_dir)
            .with_max_concurrent_parts(self.options.max_concurrent_parts)
            .with_progress(self.progress.clone());
        executor.reserve_filename(&manifest_filename(content_id));

        let outcomes = fill_slots(slots, &executor).await?;

        // Every part has been attempted at this point.
        enter(CycleStage::WriteSideFile, content_id);
        enter(CycleStage::Package, content_id);
        let assembler = ArchiveAssembler::new(&self.options.output_dir);
        let archive_path = assembler.package(manifest, &outcomes, &staging_dir).await?;

        let mut decrypted = false;
        if let Some(decryptor) = &self.decryptor {
            enter(CycleStage::Decrypt, content_id);
            decrypt_in_place(decryptor.as_ref(), &archive_path, self.client.authenticator().as_ref())
                .await
                .map_err(|e| {
                    tracing::error!(
                        content_id,
                        archive = %archive_path.display(),
                        error = %e,
                        "decryption failed, keeping plain archive"
                    );
                    match e {
                        KindleError::Decrypt(message) => KindleError::Decrypt(format!(
                            "{} (plain archive kept at {})",
                            message,
                            archive_path.display()
                        )),
                        other => other,
                    }
                })?;
            decrypted = true;
        }

        enter(CycleStage::Done, content_id);
        let summary = DownloadSummary {
            content_id: content_id.to_string(),
            archive_path,
            outcomes,
            decrypted,
        };
        tracing::info!(
            content_id,
            downloaded = summary.downloaded_count(),
            skipped = summary.outcomes.len() - summary.downloaded_count(),
            archive = %summary.archive_path.display(),
            "download cycle finished"
        );
        Ok(summary)
    }
}

enum Slot {
    Pending(PartRequest),
    Done(PartOutcome),
}

/// Execute pending slots and merge them back in slot order
async fn fill_slots(slots: Vec<Slot>, executor: &DownloadExecutor<'_>) -> Result<Vec<PartOutcome>> {
    let mut requests = Vec::new();
    let mut order = Vec::with_capacity(slots.len());
    for slot in slots {
        match slot {
            Slot::Pending(request) => {
                requests.push(request);
                order.push(None);
            }
            Slot::Done(outcome) => order.push(Some(outcome)),
        }
    }

    let mut executed = executor.execute_all(requests).await?.into_iter();
    order
        .into_iter()
        .map(|slot| {
            slot.or_else(|| executed.next())
                .ok_or_else(|| KindleError::InvalidState("missing part outcome".to_string()))
        })
        .collect()
}

fn staging_dir(output_dir: &Path, content_id: &str) -> PathBuf {
    output_dir.join(format!(".{}.parts", content_id))
}

/// Drop whatever an interrupted cycle left in the staging directory
async fn clear_staging_dir(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "removed stale staging directory");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn enter(stage: CycleStage, content_id: &str) {
    tracing::info!(content_id, %stage, "entering stage");
}
