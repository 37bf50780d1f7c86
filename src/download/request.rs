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


//! Part request construction
//!
//! Turns each selected [`Resource`] into a ready-to-send [`PartRequest`].
//! Most resource types are a plain GET of the resolved endpoint. The DRM
//! voucher is the exception:
//!
//! - client identity headers (`User-Agent`, `X-ADP-AttemptCount`)
//! - `X-ADP-Transport`, `X-ADP-Reason`, `X-ADP-SW` and, when present,
//!   `X-ADP-Country` copied from the manifest's response context
//! - `X-ADP-CorrelationId` built with the manifest's `manifestTime`
//! - `Accept` for voucher content
//! - `supportedVoucherVersions` appended to the URL
//!
//! The server checks the voucher correlation id against the manifest it
//! issued, so the timestamp never comes from the local clock. This holds no
//! matter when, or in which order, the voucher request is sent.
//!
//! Endpoint resolution prefers `endpoint.directUrl` over `endpoint.url`.

use crate::api::client::{
    insert_header, KindleClient, HEADER_COUNTRY, HEADER_REASON, HEADER_SOFTWARE_VERSION,
    HEADER_TRANSPORT,
};
use crate::api::correlation::build_correlation_id;
use crate::api::manifest::{Manifest, Resource, ResourceType};
use crate::error::{KindleError, Result};
use crate::file::paths::filename_for;
use reqwest::header::{HeaderMap, HeaderName, ACCEPT};
use reqwest::Method;
use url::Url;

/// `Accept` value for voucher downloads
pub const VOUCHER_ACCEPT: &str = "application/x-com.amazon.drm.Voucher@1.0";

/// Query parameter listing the voucher versions this client understands
pub const VOUCHER_VERSIONS_PARAM: &str = "supportedVoucherVersions";

pub const SUPPORTED_VOUCHER_VERSIONS: &str = "V1,V2,V3";

/// A resolved request for one resource
#[derive(Debug, Clone)]
pub struct PartRequest {
    pub resource_id: String,

    pub resource_type: ResourceType,

    pub method: Method,

    pub url: Url,

    pub headers: HeaderMap,

    /// Type-derived file name; `None` defers naming to the response
    pub target_filename: Option<String>,

    /// Size announced in the manifest
    pub expected_size: u64,
}

/// Builds part requests for one manifest
pub struct PartRequestBuilder<'a> {
    client: &'a KindleClient,
    manifest: &'a Manifest,
}

impl<'a> PartRequestBuilder<'a> {
    pub fn new(client: &'a KindleClient, manifest: &'a Manifest) -> Self {
        Self { client, manifest }
    }

    /// Build the request for a single resource
    ///
    /// # Errors
    /// - `ResourceUrlMissing` - neither `directUrl` nor `url` is set
    /// - `InvalidInput` - the URL or a header value is malformed
    pub fn build(&self, resource: &Resource) -> Result<PartRequest> {
        let raw_url = resource
            .endpoint
            .resolve()
            .ok_or_else(|| KindleError::ResourceUrlMissing {
                resource_id: resource.id.clone(),
            })?;

        let mut url = Url::parse(raw_url).map_err(|e| {
            KindleError::InvalidInput(format!("Resource {} has invalid URL: {}", resource.id, e))
        })?;

        let headers = match resource.resource_type {
            ResourceType::DrmVoucher => {
                url.query_pairs_mut()
                    .append_pair(VOUCHER_VERSIONS_PARAM, SUPPORTED_VOUCHER_VERSIONS);
                self.voucher_headers()?
            }
            ResourceType::KindleMainBase
            | ResourceType::KindleMainMetadata
            | ResourceType::KindleMainAttachable
            | ResourceType::KindleUserAnot
            | ResourceType::Other(_) => HeaderMap::new(),
        };

        let target_filename =
            filename_for(&resource.resource_type, &resource.id, &self.manifest.content_id);

        tracing::debug!(
            resource_id = %resource.id,
            resource_type = %resource.resource_type,
            filename = ?target_filename,
            "built part request"
        );

        Ok(PartRequest {
            resource_id: resource.id.clone(),
            resource_type: resource.resource_type.clone(),
            method: Method::GET,
            url,
            headers,
            target_filename,
            expected_size: resource.size,
        })
    }

    /// Build requests for all resources, stopping at the first failure
    pub fn build_all(&self, resources: &[&Resource]) -> Result<Vec<PartRequest>> {
        resources.iter().map(|r| self.build(r)).collect()
    }

    fn voucher_headers(&self) -> Result<HeaderMap> {
        let context = &self.manifest.response_context;
        let auth = self.client.authenticator();

        let correlation_id = build_correlation_id(
            auth.device_type(),
            auth.device_serial(),
            &self.manifest.content_id,
            Some(context.manifest_time),
        );

        let mut headers = self.client.identity_headers(&correlation_id)?;
        insert_header(&mut headers, HeaderName::from_static(HEADER_TRANSPORT), &context.transport)?;
        insert_header(&mut headers, HeaderName::from_static(HEADER_REASON), &context.reason)?;
        insert_header(
            &mut headers,
            HeaderName::from_static(HEADER_SOFTWARE_VERSION),
            &context.sw_version,
        )?;
        if let Some(country) = &context.country {
            insert_header(&mut headers, HeaderName::from_static(HEADER_COUNTRY), country)?;
        }
        insert_header(&mut headers, ACCEPT, VOUCHER_ACCEPT)?;
        Ok(headers)
    }
}
