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


//! Error types for the delivery client
//!
//! Every failure the download cycle can produce maps onto one variant of
//! [`KindleError`]. Which of them abort a cycle and which are absorbed
//! depends on where they occur:
//!
//! | Variant              | Raised by          | Effect                            |
//! |----------------------|--------------------|-----------------------------------|
//! | `ManifestFetch`      | manifest request   | fatal, aborts the cycle           |
//! | `ManifestParse`      | manifest decoding  | fatal, aborts the cycle           |
//! | `InvalidScope`       | scope parsing      | fatal, before any network call    |
//! | `ResourceUrlMissing` | request building   | that resource is skipped          |
//! | `PartDownload`       | part download      | logged, part skipped              |
//! | `Packaging`          | archive writing    | fatal, aborts before decryption   |
//! | `Decrypt`            | decryptor hand-off | surfaced, plain archive preserved |
//! | `LibraryFetch`       | library request    | fatal for the listing             |
//! | `LibraryParse`       | library decoding   | fatal for the listing             |

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, KindleError>;

#[derive(Debug, Error)]
pub enum KindleError {
    /// Transport or HTTP status failure while fetching a manifest
    #[error("Failed to fetch manifest for {content_id}: {message}")]
    ManifestFetch {
        content_id: String,
        message: String,
        status: Option<u16>,
    },

    /// Manifest body is malformed or a context blob cannot be decoded
    #[error("Invalid manifest: {message}")]
    ManifestParse {
        message: String,
        response_body: Option<String>,
    },

    /// Unknown scope name
    #[error("Invalid scope '{name}', expected one of: {}", valid.join(", "))]
    InvalidScope {
        name: String,
        valid: Vec<&'static str>,
    },

    /// A resource carries neither a direct nor a generic endpoint URL
    #[error("Resource {resource_id} has no download URL")]
    ResourceUrlMissing { resource_id: String },

    /// Non-success response or transport error on a single part
    #[error("Download of part {resource_id} failed: {message}")]
    PartDownload {
        resource_id: String,
        message: String,
        status: Option<u16>,
    },

    /// Filesystem or archive write failure while packaging
    #[error("Packaging failed: {0}")]
    Packaging(String),

    /// The decryption collaborator failed
    #[error("Decryption failed: {0}")]
    Decrypt(String),

    /// Transport or HTTP status failure while listing the library
    #[error("Failed to fetch library: {message}")]
    LibraryFetch { message: String, status: Option<u16> },

    /// Library sync response is not the expected XML document
    #[error("Invalid library response: {0}")]
    LibraryParse(String),

    #[error("No locale found for {key} '{value}'")]
    UnsupportedLocale { key: &'static str, value: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl KindleError {
    /// Build a `ManifestParse` error without a response body
    pub fn manifest_parse(message: impl Into<String>) -> Self {
        Self::ManifestParse {
            message: message.into(),
            response_body: None,
        }
    }

    /// Whether a failure on a single part may be recorded and skipped.
    ///
    /// Only request and I/O class failures qualify. Structural errors
    /// (a malformed manifest, invalid state) must propagate.
    pub fn is_part_recoverable(&self) -> bool {
        matches!(
            self,
            Self::PartDownload { .. }
                | Self::ResourceUrlMissing { .. }
                | Self::Http(_)
                | Self::Io(_)
        )
    }

    /// HTTP status code attached to the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ManifestFetch { status, .. }
            | Self::PartDownload { status, .. }
            | Self::LibraryFetch { status, .. } => *status,
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
