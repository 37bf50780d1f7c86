//! Output file naming
//!
//! | Resource type            | File name                  |
//! |--------------------------|----------------------------|
//! | `DRM_VOUCHER`            | `{id}.voucher`             |
//! | `KINDLE_MAIN_BASE`       | `{contentId}_EBOK.azw`     |
//! | `KINDLE_MAIN_METADATA`   | `{id}.azw.md`              |
//! | `KINDLE_MAIN_ATTACHABLE` | `{id}.azw.res`             |
//! | `KINDLE_USER_ANOT`       | `{contentId}_EBOK.mbpV2`   |
//! | anything else            | decided at download time   |
//!
//! Names coming from the service (resource ids, `Content-Disposition`)
//! are reduced to a single path component before use.

use crate::api::manifest::ResourceType;
use lazy_static::lazy_static;
use regex::Regex;

/// Extension of the packaged archive
pub const ARCHIVE_EXTENSION: &str = "kfx-zip";

lazy_static! {
    static ref FILENAME_EXT: Regex =
        Regex::new(r#"(?i)filename\*\s*=\s*(?:[\w-]+)?'[^']*'([^;]+)"#).expect("valid regex");
    static ref FILENAME_QUOTED: Regex =
        Regex::new(r#"(?i)filename\s*=\s*"([^"]*)""#).expect("valid regex");
    static ref FILENAME_BARE: Regex =
        Regex::new(r#"(?i)filename\s*=\s*([^;\s]+)"#).expect("valid regex");
}

/// File name derived from the resource type, if the type fixes one
pub fn filename_for(resource_type: &ResourceType, resource_id: &str, content_id: &str) -> Option<String> {
    let name = match resource_type {
        ResourceType::DrmVoucher => format!("{}.voucher", resource_id),
        ResourceType::KindleMainBase => format!("{}_EBOK.azw", content_id),
        ResourceType::KindleMainMetadata => format!("{}.azw.md", resource_id),
        ResourceType::KindleMainAttachable => format!("{}.azw.res", resource_id),
        ResourceType::KindleUserAnot => format!("{}_EBOK.mbpV2", content_id),
        ResourceType::Other(_) => return None,
    };
    Some(sanitize_filename(&name))
}

/// Name of the packaged archive
pub fn archive_filename(content_id: &str) -> String {
    format!("{}_EBOK.{}", content_id, ARCHIVE_EXTENSION)
}

/// Name of the manifest side file
pub fn manifest_filename(content_id: &str) -> String {
    format!("{}.manifest", content_id)
}

/// Extract the file name from a `Content-Disposition` header value.
///
/// RFC 5987 `filename*=` wins over plain `filename=`.
pub fn filename_from_content_disposition(header: &str) -> Option<String> {
    let raw = FILENAME_EXT
        .captures(header)
        .and_then(|c| c.get(1))
        .map(|m| percent_decode(m.as_str().trim()))
        .or_else(|| {
            FILENAME_QUOTED
                .captures(header)
                .or_else(|| FILENAME_BARE.captures(header))
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim().to_string())
        })?;

    let name = sanitize_filename(&raw);
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Reduce a name to a single safe path component
pub fn sanitize_filename(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = last
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned == "." || cleaned == ".." {
        String::new()
    } else {
        cleaned.to_string()
    }
}

fn percent_decode(value: &str) -> String {
    url::form_urlencoded::parse(format!("n={}", value.replace('+', "%2B")).as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_else(|| value.to_string())
}
