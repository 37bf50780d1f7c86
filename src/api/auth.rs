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


//! Request authentication
//!
//! Device registration and token refresh live outside this crate. What the
//! delivery client needs from them is captured by [`Authenticator`]: the
//! device identity used in correlation ids and client headers, and a hook
//! that attaches credentials to an outgoing request.
//!
//! [`Identity`] is the stock implementation. It is loaded from a JSON
//! credential file produced by whatever registered the device:
//!
//! ```json
//! {
//!   "device_type": "A2A33MVZVPQKHY",
//!   "device_serial_number": "0123456789ABCDEF",
//!   "user_id": "amzn1.account.EXAMPLE",
//!   "access_token": "Atna|...",
//!   "cookies": { "session-id": "..." },
//!   "locale": { "name": "united_states", "country_code": "us", "domain": "com", "language": "en-US" }
//! }
//! ```

use crate::api::locale::Locale;
use crate::error::{KindleError, Result};
use reqwest::header::{HeaderName, HeaderValue, COOKIE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

const ACCESS_TOKEN_HEADER: &str = "x-amz-access-token";

/// Credential provider for delivery requests
///
/// Implementations are shared across every part of a download cycle and
/// may be read concurrently. No credential refresh is expected while a
/// cycle is running.
pub trait Authenticator: Send + Sync {
    /// Registered device type (e.g. `A2A33MVZVPQKHY`)
    fn device_type(&self) -> &str;

    /// Registered device serial number
    fn device_serial(&self) -> &str;

    /// Account user id
    fn user_id(&self) -> &str;

    /// Language tag sent as `Accept-Language`
    fn language(&self) -> &str;

    /// Attach credentials to a fully built request
    fn sign_request(&self, request: &mut reqwest::Request) -> Result<()>;
}

/// Registered device credentials
#[derive(Clone, Serialize, Deserialize)]
pub struct Identity {
    pub device_type: String,

    pub device_serial_number: String,

    pub user_id: String,

    /// Bearer access token (`Atna|...`)
    pub access_token: String,

    /// Session cookies returned at registration
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,

    #[serde(default)]
    pub locale: Locale,
}

impl Identity {
    /// Parse an identity from its JSON form
    pub fn from_json(json: &str) -> Result<Self> {
        let identity: Identity = serde_json::from_str(json)?;
        identity.validate()?;
        Ok(identity)
    }

    /// Load an identity from a JSON credential file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            KindleError::InvalidInput(format!("Cannot read identity file {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("device_type", &self.device_type),
            ("device_serial_number", &self.device_serial_number),
            ("access_token", &self.access_token),
        ] {
            if value.trim().is_empty() {
                return Err(KindleError::InvalidInput(format!("Identity field {} is empty", field)));
            }
        }
        Ok(())
    }

    /// Identity summary that is safe to log
    pub fn masked_log_entry(&self) -> String {
        format!(
            "device={} serial={} user={} locale={}",
            self.device_type,
            mask(&self.device_serial_number),
            mask(&self.user_id),
            self.locale.country_code
        )
    }

    fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

impl Authenticator for Identity {
    fn device_type(&self) -> &str {
        &self.device_type
    }

    fn device_serial(&self) -> &str {
        &self.device_serial_number
    }

    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn language(&self) -> &str {
        &self.locale.language
    }

    fn sign_request(&self, request: &mut reqwest::Request) -> Result<()> {
        let token = HeaderValue::from_str(&self.access_token)
            .map_err(|e| KindleError::InvalidInput(format!("Access token is not a valid header: {}", e)))?;
        let headers = request.headers_mut();
        headers.insert(HeaderName::from_static(ACCESS_TOKEN_HEADER), token);

        if let Some(cookies) = self.cookie_header() {
            let value = HeaderValue::from_str(&cookies)
                .map_err(|e| KindleError::InvalidInput(format!("Cookies are not a valid header: {}", e)))?;
            headers.insert(COOKIE, value);
        }
        Ok(())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("device_type", &self.device_type)
            .field("device_serial_number", &mask(&self.device_serial_number))
            .field("user_id", &mask(&self.user_id))
            .field("access_token", &"***")
            .field("cookies", &self.cookies.len())
            .field("locale", &self.locale.name)
            .finish()
    }
}

fn mask(value: &str) -> String {
    let visible: String = value.chars().take(4).collect();
    if value.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{}****", visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDENTITY_JSON: &str = r#"{
        "device_type": "A2A33MVZVPQKHY",
        "device_serial_number": "0123456789ABCDEF",
        "user_id": "amzn1.account.TEST",
        "access_token": "Atna|secret-token",
        "cookies": { "session-id": "123", "ubid-main": "456" }
    }"#;

    #[test]
    fn test_identity_from_json_defaults_locale() {
        let identity = Identity::from_json(IDENTITY_JSON).unwrap();
        assert_eq!(identity.device_type(), "A2A33MVZVPQKHY");
        assert_eq!(identity.device_serial(), "0123456789ABCDEF");
        assert_eq!(identity.language(), "en-US");
    }

    #[test]
    fn test_identity_rejects_empty_token() {
        let json = IDENTITY_JSON.replace("Atna|secret-token", " ");
        assert!(matches!(Identity::from_json(&json), Err(KindleError::InvalidInput(_))));
    }

    #[test]
    fn test_sign_request_attaches_credentials() {
        let identity = Identity::from_json(IDENTITY_JSON).unwrap();
        let mut request = reqwest::Client::new()
            .get("https://example.com/x")
            .build()
            .unwrap();

        identity.sign_request(&mut request).unwrap();

        let headers = request.headers();
        assert_eq!(headers.get(ACCESS_TOKEN_HEADER).unwrap(), "Atna|secret-token");
        assert_eq!(headers.get(COOKIE).unwrap(), "session-id=123; ubid-main=456");
    }

    #[test]
    fn test_debug_masks_secrets() {
        let identity = Identity::from_json(IDENTITY_JSON).unwrap();
        let debug = format!("{:?}", identity);
        assert!(!debug.contains("secret-token"));
        assert!(!debug.contains("0123456789ABCDEF"));
        assert!(identity.masked_log_entry().contains("0123****"));
    }
}
