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


//! Archive packaging
//!
//! Folds the downloaded parts of a title into one ZIP container:
//!
//! ```text
//! {CONTENT_ID}_EBOK.kfx-zip
//! ├── {part files, manifest order}
//! └── {CONTENT_ID}.manifest
//! ```
//!
//! The `.manifest` side file is the resolved manifest as JSON, decoded
//! contexts included, plus a `downloadOutcomes` list telling which parts
//! made it into the archive and why the others did not.
//!
//! The archive is written under a temporary name and renamed into place.
//! Source files are deleted only after the rename succeeds.

use crate::api::manifest::Manifest;
use crate::download::executor::PartOutcome;
use crate::error::{KindleError, Result};
use crate::file::paths::{archive_filename, manifest_filename};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ManifestSnapshot<'a> {
    #[serde(flatten)]
    manifest: &'a Manifest,
    download_outcomes: &'a [PartOutcome],
    packaged_at: DateTime<Utc>,
}

/// Packages parts into the final archive
#[derive(Debug, Clone)]
pub struct ArchiveAssembler {
    output_dir: PathBuf,
}

impl ArchiveAssembler {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Path the archive of a title is written to
    pub fn archive_path(&self, content_id: &str) -> PathBuf {
        self.output_dir.join(archive_filename(content_id))
    }

    /// Write the side file into `staging_dir`
    pub async fn write_side_file(
        &self,
        manifest: &Manifest,
        outcomes: &[PartOutcome],
        staging_dir: &Path,
    ) -> Result<PathBuf> {
        let snapshot = ManifestSnapshot {
            manifest,
            download_outcomes: outcomes,
            packaged_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| KindleError::Packaging(format!("Cannot serialize manifest: {}", e)))?;

        let path = staging_dir.join(manifest_filename(&manifest.content_id));
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| KindleError::Packaging(format!("Cannot write {}: {}", path.display(), e)))?;
        Ok(path)
    }

    /// Package downloaded parts plus the side file into the archive
    ///
    /// Must only be called once every part has been attempted.
    ///
    /// # Errors
    /// `Packaging` on any filesystem or archive failure. Source files are
    /// left in place in that case.
    pub async fn package(
        &self,
        manifest: &Manifest,
        outcomes: &[PartOutcome],
        staging_dir: &Path,
    ) -> Result<PathBuf> {
        let side_file = self.write_side_file(manifest, outcomes, staging_dir).await?;

        let mut entries: Vec<(String, PathBuf)> = outcomes
            .iter()
            .filter_map(|o| match o {
                PartOutcome::Downloaded { filename, path, .. } => Some((filename.clone(), path.clone())),
                PartOutcome::Skipped { .. } => None,
            })
            .collect();
        entries.push((manifest_filename(&manifest.content_id), side_file));

        let final_path = self.archive_path(&manifest.content_id);
        let temp_path = self
            .output_dir
            .join(format!(".{}.partial", archive_filename(&manifest.content_id)));

        let zip_entries = entries.clone();
        let zip_temp = temp_path.clone();
        tokio::task::spawn_blocking(move || write_zip(&zip_temp, &zip_entries))
            .await
            .map_err(|e| KindleError::Packaging(format!("Packaging task failed: {}", e)))?
            .map_err(|e| {
                let _ = std::fs::remove_file(&temp_path);
                e
            })?;

        tokio::fs::rename(&temp_path, &final_path).await.map_err(|e| {
            KindleError::Packaging(format!("Cannot move archive to {}: {}", final_path.display(), e))
        })?;

        for (_, path) in &entries {
            if let Err(e) = tokio::fs::remove_file(path).await {
                tracing::warn!(path = %path.display(), error = %e, "could not remove packaged file");
            }
        }
        if let Err(e) = tokio::fs::remove_dir_all(staging_dir).await {
            tracing::warn!(path = %staging_dir.display(), error = %e, "could not remove staging directory");
        }

        tracing::info!(
            archive = %final_path.display(),
            entries = entries.len(),
            "packaged archive"
        );
        Ok(final_path)
    }
}

fn write_zip(target: &Path, entries: &[(String, PathBuf)]) -> Result<()> {
    let packaging = |what: &str, e: &dyn std::fmt::Display| KindleError::Packaging(format!("{}: {}", what, e));

    let file = File::create(target).map_err(|e| packaging(&format!("Cannot create {}", target.display()), &e))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));

    for (name, path) in entries {
        let source = File::open(path).map_err(|e| packaging(&format!("Cannot open {}", path.display()), &e))?;
        let size = source.metadata().map(|m| m.len()).unwrap_or(0);
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(size >= u32::MAX as u64);

        zip.start_file(name.as_str(), options)
            .map_err(|e| packaging(&format!("Cannot add {}", name), &e))?;
        std::io::copy(&mut BufReader::new(source), &mut zip)
            .map_err(|e| packaging(&format!("Cannot write {}", name), &e))?;
    }

    let writer = zip.finish().map_err(|e| packaging("Cannot finish archive", &e))?;
    writer
        .into_inner()
        .map_err(|e| packaging("Cannot flush archive", &e.error().to_string()))?
        .sync_all()
        .map_err(|e| packaging("Cannot sync archive", &e))?;
    Ok(())
}
