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


//! Manifest-driven Kindle e-book downloads
//!
//! Resolves the delivery manifest of a title, downloads the parts in scope,
//! and packages them with a manifest side file into one
//! `{CONTENT_ID}_EBOK.kfx-zip` archive. Decryption is left to an optional
//! external [`crypto::Decryptor`].
//!
//! ```no_run
//! use kindle_core::{DownloadManager, DownloadOptions, Identity, KindleClient};
//!
//! # async fn run() -> kindle_core::Result<()> {
//! let identity = Identity::from_file("identity.json")?;
//! let client = KindleClient::new(identity)?;
//! let options = DownloadOptions::new("books").with_scope_name("required")?;
//!
//! let summary = DownloadManager::new(client, options).download_book("B00ABC123").await?;
//! println!("{}", summary.archive_path.display());
//! # Ok(())
//! # }
//! ```

// Core modules
pub mod error;
pub mod api;
pub mod crypto;
pub mod download;
pub mod file;

// Re-export commonly used types for convenience
pub use api::{Authenticator, ClientConfig, Identity, KindleClient, Library, Manifest};
pub use download::{DownloadManager, DownloadOptions, DownloadSummary, PartOutcome, ScopeFilter};
pub use error::{KindleError, Result};
