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


//! Opaque response contexts
//!
//! The delivery manifest embeds `responseContext` blobs: base64 text
//! wrapping a self-describing binary document. The top-level blob carries
//! the values the voucher request has to echo back:
//!
//! | Key           | Type              | Used for                     |
//! |---------------|-------------------|------------------------------|
//! | `manifestTime`| integer (ms)      | voucher correlation id       |
//! | `transport`   | string            | `X-ADP-Transport`            |
//! | `reason`      | string            | `X-ADP-Reason`               |
//! | `swVersion`   | string or integer | `X-ADP-SW`                   |
//! | `country`     | string, optional  | `X-ADP-Country`              |
//!
//! Decoding goes through [`ContextDecoder`]. The default
//! [`CborContextDecoder`] reads CBOR and yields a JSON-compatible
//! [`ContextMap`], so decoded contexts serialize straight into the archive's
//! manifest side file.

use crate::error::{KindleError, Result};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Number, Value};

/// Decoded context: string keys, JSON-compatible values
pub type ContextMap = Map<String, Value>;

/// Decoder for base64-wrapped binary context blobs
pub trait ContextDecoder: Send + Sync {
    /// Decode one blob into a mapping. Must be deterministic.
    fn decode(&self, encoded: &str) -> Result<ContextMap>;
}

/// Base64 + CBOR context decoder
#[derive(Debug, Clone, Copy, Default)]
pub struct CborContextDecoder;

impl ContextDecoder for CborContextDecoder {
    fn decode(&self, encoded: &str) -> Result<ContextMap> {
        let bytes = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| KindleError::manifest_parse(format!("responseContext is not base64: {}", e)))?;

        let value: serde_cbor::Value = serde_cbor::from_slice(&bytes)
            .map_err(|e| KindleError::manifest_parse(format!("responseContext is not decodable: {}", e)))?;

        match cbor_to_json(value)? {
            Value::Object(map) => Ok(map),
            other => Err(KindleError::manifest_parse(format!(
                "responseContext must decode to a mapping, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn cbor_to_json(value: serde_cbor::Value) -> Result<Value> {
    use serde_cbor::Value as Cbor;

    Ok(match value {
        Cbor::Null => Value::Null,
        Cbor::Bool(b) => Value::Bool(b),
        Cbor::Integer(i) => {
            if let Ok(n) = i64::try_from(i) {
                Value::Number(n.into())
            } else if let Ok(n) = u64::try_from(i) {
                Value::Number(n.into())
            } else {
                return Err(KindleError::manifest_parse(format!("integer {} out of range", i)));
            }
        }
        Cbor::Float(f) => Number::from_f64(f)
            .map(Value::Number)
            .ok_or_else(|| KindleError::manifest_parse("non-finite float in responseContext"))?,
        Cbor::Bytes(b) => Value::String(general_purpose::STANDARD.encode(b)),
        Cbor::Text(s) => Value::String(s),
        Cbor::Array(items) => Value::Array(
            items
                .into_iter()
                .map(cbor_to_json)
                .collect::<Result<Vec<_>>>()?,
        ),
        Cbor::Map(entries) => {
            let mut map = Map::new();
            for (key, value) in entries {
                let key = match key {
                    Cbor::Text(s) => s,
                    Cbor::Integer(i) => i.to_string(),
                    other => {
                        return Err(KindleError::manifest_parse(format!(
                            "unsupported responseContext key: {:?}",
                            other
                        )))
                    }
                };
                map.insert(key, cbor_to_json(value)?);
            }
            Value::Object(map)
        }
        Cbor::Tag(_, inner) => cbor_to_json(*inner)?,
        other => {
            return Err(KindleError::manifest_parse(format!(
                "unsupported responseContext value: {:?}",
                other
            )))
        }
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "mapping",
    }
}

/// Typed view of the manifest's top-level response context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseContext {
    /// Server-issued manifest timestamp in milliseconds
    #[serde(deserialize_with = "integer_or_numeric_string")]
    pub manifest_time: i64,

    pub transport: String,

    pub reason: String,

    #[serde(deserialize_with = "string_or_integer")]
    pub sw_version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    /// Every other key, kept verbatim
    #[serde(flatten)]
    pub extra: ContextMap,
}

impl ResponseContext {
    /// Build the typed context from a decoded mapping
    pub fn from_map(map: ContextMap) -> Result<Self> {
        serde_json::from_value(Value::Object(map))
            .map_err(|e| KindleError::manifest_parse(format!("responseContext: {}", e)))
    }
}

fn integer_or_numeric_string<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| D::Error::custom(format!("manifestTime {} is not an integer", n))),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| D::Error::custom(format!("manifestTime '{}' is not numeric", s))),
        other => Err(D::Error::custom(format!(
            "manifestTime must be an integer, got {}",
            json_kind(&other)
        ))),
    }
}

fn string_or_integer<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(n.to_string()),
        other => Err(D::Error::custom(format!(
            "swVersion must be a string or integer, got {}",
            json_kind(&other)
        ))),
    }
}
