//! Shared fixtures for delivery integration tests
//!
//! Builds manifest bodies, context blobs and clients pointed at a local
//! mock server.

#![allow(dead_code)]

use base64::{engine::general_purpose, Engine as _};
use httpmock::MockServer;
use kindle_core::{ClientConfig, Identity, KindleClient};
use serde_cbor::Value as Cbor;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

pub const CONTENT_ID: &str = "B00ABC123";
pub const MANIFEST_TIME: i64 = 1_614_000_000_123;
pub const DEVICE_TYPE: &str = "A1DEVICETYPE";
pub const DEVICE_SERIAL: &str = "SERIAL0001";

pub fn manifest_path(content_id: &str) -> String {
    format!("/delivery/manifest/kindle.ebook/{}", content_id)
}

pub fn identity() -> Identity {
    Identity::from_json(
        &json!({
            "device_type": DEVICE_TYPE,
            "device_serial_number": DEVICE_SERIAL,
            "user_id": "amzn1.account.TEST",
            "access_token": "Atna|test-token",
        })
        .to_string(),
    )
    .unwrap()
}

pub fn client(server: &MockServer) -> KindleClient {
    let config = ClientConfig {
        delivery_base_url: server.base_url(),
        library_base_url: server.base_url(),
        ..ClientConfig::default()
    };
    KindleClient::with_config(Arc::new(identity()), config).unwrap()
}

/// Base64 CBOR mapping, as embedded in manifest responses
pub fn encode_context(entries: &[(&str, Cbor)]) -> String {
    let map: BTreeMap<Cbor, Cbor> = entries
        .iter()
        .map(|(k, v)| (Cbor::Text(k.to_string()), v.clone()))
        .collect();
    general_purpose::STANDARD.encode(serde_cbor::to_vec(&Cbor::Map(map)).unwrap())
}

pub fn top_context() -> String {
    encode_context(&[
        ("manifestTime", Cbor::Integer(MANIFEST_TIME as i128)),
        ("transport", Cbor::Text("WiFi".into())),
        ("reason", Cbor::Text("ArchivedItems".into())),
        ("swVersion", Cbor::Integer(1_184_366_692)),
        ("country", Cbor::Text("US".into())),
    ])
}

pub fn resource(id: &str, resource_type: &str, requirement: &str, url: Option<String>) -> Value {
    let endpoint = match url {
        Some(url) => json!({ "url": url }),
        None => json!({}),
    };
    json!({
        "id": id,
        "type": resource_type,
        "requirement": requirement,
        "size": 4,
        "deliveryType": "DOWNLOAD",
        "endpoint": endpoint,
    })
}

pub fn manifest_body(content_id: &str, resources: Vec<Value>) -> String {
    json!({
        "content": { "id": content_id },
        "responseContext": top_context(),
        "resources": resources,
    })
    .to_string()
}

/// Entry names of an archive, in archive order
pub fn archive_entries(path: &Path) -> Vec<String> {
    let mut zip = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    (0..zip.len())
        .map(|i| zip.by_index(i).unwrap().name().to_string())
        .collect()
}

pub fn archive_entry(path: &Path, name: &str) -> Vec<u8> {
    let mut zip = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut data = Vec::new();
    zip.by_name(name).unwrap().read_to_end(&mut data).unwrap();
    data
}

pub fn side_file(path: &Path, content_id: &str) -> Value {
    serde_json::from_slice(&archive_entry(path, &format!("{}.manifest", content_id))).unwrap()
}
