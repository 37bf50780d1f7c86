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


//! Delivery manifests
//!
//! # API Endpoint
//! `GET {delivery}/delivery/manifest/kindle.ebook/{CONTENT_ID}`
//!
//! Request headers:
//! - `User-Agent` fixed client string
//! - `X-ADP-AttemptCount: 1`
//! - `X-ADP-CorrelationId` fresh, wall-clock based
//! - `X-ADP-Transport: WiFi`
//! - `X-ADP-Reason: ArchivedItems`
//! - `Accept-Language` from the account locale
//! - `x-amzn-accept-type: application/x.amzn.digital.deliverymanifest@1.0`
//! - `X-ADP-SW` client software version
//!
//! Response body:
//! ```json
//! {
//!   "content": { "id": "B00ABC123" },
//!   "responseContext": "<base64 binary>",
//!   "resources": [
//!     {
//!       "id": "CR!ABCDEF",
//!       "type": "KINDLE_MAIN_BASE",
//!       "requirement": "REQUIRED",
//!       "size": 1048576,
//!       "deliveryType": "DOWNLOAD",
//!       "endpoint": { "directUrl": "https://...", "url": "https://..." },
//!       "responseContext": "<base64 binary>"
//!     }
//!   ]
//! }
//! ```
//!
//! The raw body is parsed into private wire types and then converted into
//! a fresh [`Manifest`] with every context blob decoded. Nothing in the
//! fetched structure is rewritten in place.

use crate::api::client::{
    insert_header, truncate, KindleClient, HEADER_ACCEPT_TYPE, HEADER_REASON, HEADER_SOFTWARE_VERSION,
    HEADER_TRANSPORT,
};
use crate::api::context::{ContextDecoder, ContextMap, ResponseContext};
use crate::api::correlation::build_correlation_id;
use crate::error::{KindleError, Result};
use reqwest::header::HeaderName;
use serde::{Deserialize, Serialize};

/// Transport reported on manifest requests
pub const MANIFEST_TRANSPORT: &str = "WiFi";

/// Reason reported on manifest requests
pub const MANIFEST_REASON: &str = "ArchivedItems";

// ============================================================================
// MANIFEST MODEL
// ============================================================================

/// Resource type
///
/// Unrecognized types are kept verbatim in [`ResourceType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResourceType {
    /// Main book content
    KindleMainBase,
    /// Book metadata sidecar
    KindleMainMetadata,
    /// Attachable resources (images, fonts)
    KindleMainAttachable,
    /// User annotations
    KindleUserAnot,
    /// DRM voucher
    DrmVoucher,
    Other(String),
}

impl ResourceType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::KindleMainBase => "KINDLE_MAIN_BASE",
            Self::KindleMainMetadata => "KINDLE_MAIN_METADATA",
            Self::KindleMainAttachable => "KINDLE_MAIN_ATTACHABLE",
            Self::KindleUserAnot => "KINDLE_USER_ANOT",
            Self::DrmVoucher => "DRM_VOUCHER",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for ResourceType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "KINDLE_MAIN_BASE" => Self::KindleMainBase,
            "KINDLE_MAIN_METADATA" => Self::KindleMainMetadata,
            "KINDLE_MAIN_ATTACHABLE" => Self::KindleMainAttachable,
            "KINDLE_USER_ANOT" => Self::KindleUserAnot,
            "DRM_VOUCHER" => Self::DrmVoucher,
            _ => Self::Other(value),
        }
    }
}

impl From<ResourceType> for String {
    fn from(value: ResourceType) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How strongly the service wants a resource delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Requirement {
    Required,
    Preferred,
    Deferred,
}

/// Download endpoint of a resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Optimal direct (CDN) URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_url: Option<String>,

    /// Generic endpoint URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Endpoint {
    /// Preferred download URL: the direct URL when present, else the
    /// generic one
    pub fn resolve(&self) -> Option<&str> {
        self.direct_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .or_else(|| self.url.as_deref().filter(|u| !u.is_empty()))
    }
}

/// One deliverable part of a title
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: String,

    #[serde(rename = "type")]
    pub resource_type: ResourceType,

    pub requirement: Requirement,

    /// Payload size in bytes as announced by the service
    pub size: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_type: Option<String>,

    pub endpoint: Endpoint,

    /// Decoded per-resource context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_context: Option<ContextMap>,
}

/// Fully resolved delivery manifest
///
/// Produced once per title and read-only afterwards. Resource order is the
/// order the service returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Canonical uppercase title id
    pub content_id: String,

    pub response_context: ResponseContext,

    pub resources: Vec<Resource>,
}

// ============================================================================
// WIRE FORMAT
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawManifest {
    content: RawContent,
    response_context: String,
    resources: Vec<RawResource>,
}

#[derive(Deserialize)]
struct RawContent {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResource {
    id: String,
    #[serde(rename = "type")]
    resource_type: ResourceType,
    requirement: Requirement,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    delivery_type: Option<String>,
    #[serde(default)]
    endpoint: Endpoint,
    #[serde(default)]
    response_context: Option<String>,
}

/// Normalize a content id: trimmed and uppercase
pub fn normalize_content_id(content_id: &str) -> Result<String> {
    let normalized = content_id.trim().to_uppercase();
    if normalized.is_empty() {
        return Err(KindleError::InvalidInput("Content id is empty".to_string()));
    }
    if !normalized.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(KindleError::InvalidInput(format!(
            "Content id '{}' must be alphanumeric",
            content_id
        )));
    }
    Ok(normalized)
}

impl Manifest {
    /// Parse a manifest response body and decode its contexts
    ///
    /// `content_id` must already be normalized.
    pub fn from_response(content_id: &str, body: &str, decoder: &dyn ContextDecoder) -> Result<Self> {
        let raw: RawManifest = serde_json::from_str(body).map_err(|e| KindleError::ManifestParse {
            message: format!("Failed to parse manifest: {}", e),
            response_body: Some(body.to_string()),
        })?;

        if !raw.content.id.eq_ignore_ascii_case(content_id) {
            tracing::warn!(
                requested = content_id,
                returned = %raw.content.id,
                "manifest content id differs from requested id"
            );
        }

        let response_context = ResponseContext::from_map(decoder.decode(&raw.response_context)?)?;

        let resources = raw
            .resources
            .into_iter()
            .map(|r| {
                let response_context = r
                    .response_context
                    .as_deref()
                    .map(|blob| decoder.decode(blob))
                    .transpose()
                    .map_err(|e| {
                        KindleError::manifest_parse(format!("resource {}: {}", r.id, e))
                    })?;

                Ok(Resource {
                    id: r.id,
                    resource_type: r.resource_type,
                    requirement: r.requirement,
                    size: r.size,
                    delivery_type: r.delivery_type,
                    endpoint: r.endpoint,
                    response_context,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            content_id: content_id.to_string(),
            response_context,
            resources,
        })
    }

    /// Total announced size of all resources
    pub fn total_size(&self) -> u64 {
        self.resources.iter().map(|r| r.size).sum()
    }
}

// ============================================================================
// API FUNCTIONS
// ============================================================================

impl KindleClient {
    /// Fetch and resolve the delivery manifest of a title
    ///
    /// # Errors
    /// - `InvalidInput` - content id is empty or not alphanumeric
    /// - `ManifestFetch` - transport failure or non-success status
    /// - `ManifestParse` - malformed body or undecodable context blob
    pub async fn get_manifest(&self, content_id: &str) -> Result<Manifest> {
        let content_id = normalize_content_id(content_id)?;
        let url = self.delivery_url(&format!("/delivery/manifest/kindle.ebook/{}", content_id))?;

        let auth = self.authenticator();
        let correlation_id =
            build_correlation_id(auth.device_type(), auth.device_serial(), &content_id, None);

        let mut headers = self.identity_headers(&correlation_id)?;
        insert_header(&mut headers, HeaderName::from_static(HEADER_TRANSPORT), MANIFEST_TRANSPORT)?;
        insert_header(&mut headers, HeaderName::from_static(HEADER_REASON), MANIFEST_REASON)?;
        insert_header(
            &mut headers,
            HeaderName::from_static(HEADER_ACCEPT_TYPE),
            &self.config().manifest_accept_type,
        )?;
        insert_header(
            &mut headers,
            HeaderName::from_static(HEADER_SOFTWARE_VERSION),
            &self.config().software_version,
        )?;

        let fetch_error = |message: String, status: Option<u16>| KindleError::ManifestFetch {
            content_id: content_id.clone(),
            message,
            status,
        };

        let response = self
            .send(self.http().get(url).headers(headers))
            .await
            .map_err(|e| {
                let status = e.status();
                fetch_error(e.to_string(), status)
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| fetch_error(format!("Failed to read body: {}", e), Some(status.as_u16())))?;

        if !status.is_success() {
            return Err(fetch_error(
                format!("HTTP {}: {}", status, truncate(&body, 200)),
                Some(status.as_u16()),
            ));
        }

        let manifest = Manifest::from_response(&content_id, &body, self.decoder())?;
        tracing::info!(
            content_id = %manifest.content_id,
            resources = manifest.resources.len(),
            manifest_time = manifest.response_context.manifest_time,
            "resolved manifest"
        );
        Ok(manifest)
    }
}
