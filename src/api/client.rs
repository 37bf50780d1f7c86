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


//! Delivery service client
//!
//! [`KindleClient`] owns the shared HTTP connection pool, the
//! [`Authenticator`] and the context decoder. It is cheap to clone and is
//! shared by every request of a download cycle.
//!
//! No request or connect timeout is configured: book payloads are large
//! and are expected to finish rather than be cut off. Retries are likewise
//! left to callers.

use crate::api::auth::Authenticator;
use crate::api::context::{CborContextDecoder, ContextDecoder};
use crate::error::{KindleError, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

pub const DEFAULT_DELIVERY_BASE_URL: &str = "https://kindle-digital-delivery.amazon.com";
pub const DEFAULT_LIBRARY_BASE_URL: &str = "https://todo-ta-g7g.amazon.com";
pub const DEFAULT_USER_AGENT: &str = "Kindle/1.0.235280.0.10 CFNetwork/1220.1 Darwin/20.3.0";
pub const DEFAULT_SOFTWARE_VERSION: &str = "1184366692";
pub const DEFAULT_MANIFEST_ACCEPT_TYPE: &str = "application/x.amzn.digital.deliverymanifest@1.0";

pub(crate) const HEADER_ATTEMPT_COUNT: &str = "x-adp-attemptcount";
pub(crate) const HEADER_CORRELATION_ID: &str = "x-adp-correlationid";
pub(crate) const HEADER_TRANSPORT: &str = "x-adp-transport";
pub(crate) const HEADER_REASON: &str = "x-adp-reason";
pub(crate) const HEADER_SOFTWARE_VERSION: &str = "x-adp-sw";
pub(crate) const HEADER_COUNTRY: &str = "x-adp-country";
pub(crate) const HEADER_ACCEPT_TYPE: &str = "x-amzn-accept-type";

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the delivery service
    pub delivery_base_url: String,

    /// Base URL of the library sync service
    pub library_base_url: String,

    /// Fixed client identity sent as `User-Agent`
    pub user_agent: String,

    /// Client software version sent as `X-ADP-SW` on manifest requests
    pub software_version: String,

    /// `x-amzn-accept-type` tag for manifest requests
    pub manifest_accept_type: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            delivery_base_url: DEFAULT_DELIVERY_BASE_URL.to_string(),
            library_base_url: DEFAULT_LIBRARY_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            software_version: DEFAULT_SOFTWARE_VERSION.to_string(),
            manifest_accept_type: DEFAULT_MANIFEST_ACCEPT_TYPE.to_string(),
        }
    }
}

/// Authenticated delivery client
#[derive(Clone)]
pub struct KindleClient {
    http: reqwest::Client,
    auth: Arc<dyn Authenticator>,
    decoder: Arc<dyn ContextDecoder>,
    config: ClientConfig,
}

impl KindleClient {
    /// Create a client with the default configuration
    pub fn new(auth: impl Authenticator + 'static) -> Result<Self> {
        Self::with_config(Arc::new(auth), ClientConfig::default())
    }

    /// Create a client with an explicit configuration
    pub fn with_config(auth: Arc<dyn Authenticator>, config: ClientConfig) -> Result<Self> {
        for (name, base) in [
            ("delivery", &config.delivery_base_url),
            ("library", &config.library_base_url),
        ] {
            Url::parse(base).map_err(|e| {
                KindleError::InvalidInput(format!("Invalid {} base URL '{}': {}", name, base, e))
            })?;
        }

        let http = reqwest::Client::builder().build()?;

        Ok(Self {
            http,
            auth,
            decoder: Arc::new(CborContextDecoder),
            config,
        })
    }

    /// Replace the response context decoder
    pub fn with_decoder(mut self, decoder: Arc<dyn ContextDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn authenticator(&self) -> &Arc<dyn Authenticator> {
        &self.auth
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn decoder(&self) -> &dyn ContextDecoder {
        self.decoder.as_ref()
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Join a path onto the delivery base URL
    pub(crate) fn delivery_url(&self, path: &str) -> Result<Url> {
        join_url(&self.config.delivery_base_url, path)
    }

    /// Join a path onto the library sync base URL
    pub(crate) fn library_url(&self, path: &str) -> Result<Url> {
        join_url(&self.config.library_base_url, path)
    }

    /// Headers every delivery request carries: the fixed client identity,
    /// attempt count and correlation id
    pub(crate) fn identity_headers(&self, correlation_id: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        insert_header(&mut headers, USER_AGENT, &self.config.user_agent)?;
        insert_header(&mut headers, HeaderName::from_static(HEADER_ATTEMPT_COUNT), "1")?;
        insert_header(&mut headers, HeaderName::from_static(HEADER_CORRELATION_ID), correlation_id)?;

        let language = self.auth.language();
        if !language.is_empty() {
            insert_header(&mut headers, reqwest::header::ACCEPT_LANGUAGE, language)?;
        }
        Ok(headers)
    }

    /// Build, sign and send a request
    pub(crate) async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let mut request = builder.build()?;
        self.auth.sign_request(&mut request)?;
        tracing::debug!(method = %request.method(), url = %request.url(), "sending request");
        Ok(self.http.execute(request).await?)
    }
}

/// Shorten a response body for error messages
pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    }
}

fn join_url(base: &str, path: &str) -> Result<Url> {
    Url::parse(&format!("{}{}", base.trim_end_matches('/'), path))
        .map_err(|e| KindleError::InvalidInput(format!("Invalid URL path '{}': {}", path, e)))
}

/// Insert a header, rejecting values that are not valid header text
pub(crate) fn insert_header(headers: &mut HeaderMap, name: HeaderName, value: &str) -> Result<()> {
    let value = HeaderValue::from_str(value)
        .map_err(|e| KindleError::InvalidInput(format!("Invalid value for header {}: {}", name, e)))?;
    headers.insert(name, value);
    Ok(())
}
