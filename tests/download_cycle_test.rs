//! Full download cycles against a mock delivery service

mod helpers;

use async_trait::async_trait;
use helpers::*;
use httpmock::prelude::*;
use kindle_core::crypto::Decryptor;
use kindle_core::download::{PartProgress, PartState};
use kindle_core::{Authenticator, DownloadManager, DownloadOptions, KindleError, PartOutcome};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

fn voucher_correlation_id() -> String {
    format!(
        "Device:{}:{};kindle.EBOK:{}:{}",
        DEVICE_TYPE, DEVICE_SERIAL, CONTENT_ID, MANIFEST_TIME
    )
}

async fn serve_manifest(server: &MockServer, resources: Vec<serde_json::Value>) {
    server
        .mock_async(|when, then| {
            when.method(GET).path(manifest_path(CONTENT_ID));
            then.status(200).body(manifest_body(CONTENT_ID, resources));
        })
        .await;
}

#[tokio::test]
async fn test_cycle_packages_parts_with_type_derived_names() {
    let server = MockServer::start_async().await;
    serve_manifest(
        &server,
        vec![
            resource("V1", "DRM_VOUCHER", "REQUIRED", Some(server.url("/voucher"))),
            resource("CR!BASE", "KINDLE_MAIN_BASE", "REQUIRED", Some(server.url("/base"))),
            resource("MD1", "KINDLE_MAIN_METADATA", "PREFERRED", Some(server.url("/md"))),
            resource("AN1", "KINDLE_USER_ANOT", "DEFERRED", Some(server.url("/anot"))),
        ],
    )
    .await;

    let voucher = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/voucher")
                .query_param("supportedVoucherVersions", "V1,V2,V3")
                .header("x-adp-correlationid", voucher_correlation_id())
                .header("accept", "application/x-com.amazon.drm.Voucher@1.0")
                .header("x-adp-transport", "WiFi")
                .header("x-adp-reason", "ArchivedItems")
                .header("x-adp-sw", "1184366692")
                .header("x-adp-country", "US");
            then.status(200).body("VVVV");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/base");
            then.status(200).body("BASE");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/md");
            then.status(200)
                .header("content-disposition", r#"attachment; filename="ignored.bin""#)
                .body("META");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/anot");
            then.status(200).body("ANOT");
        })
        .await;

    let out = TempDir::new().unwrap();
    let manager = DownloadManager::new(client(&server), DownloadOptions::new(out.path()));
    let summary = manager.download_book("b00abc123").await.unwrap();

    voucher.assert_async().await;
    assert_eq!(summary.archive_path, out.path().join("B00ABC123_EBOK.kfx-zip"));
    assert!(summary.is_complete());
    assert!(!summary.decrypted);

    assert_eq!(
        archive_entries(&summary.archive_path),
        vec![
            "V1.voucher",
            "B00ABC123_EBOK.azw",
            "MD1.azw.md",
            "B00ABC123_EBOK.mbpV2",
            "B00ABC123.manifest",
        ]
    );
    assert_eq!(archive_entry(&summary.archive_path, "MD1.azw.md"), b"META");

    let side = side_file(&summary.archive_path, CONTENT_ID);
    assert_eq!(side["contentId"], CONTENT_ID);
    assert_eq!(side["responseContext"]["manifestTime"], MANIFEST_TIME);
    assert_eq!(side["resources"].as_array().unwrap().len(), 4);
    assert_eq!(side["downloadOutcomes"][0]["status"], "downloaded");

    let leftovers: Vec<_> = std::fs::read_dir(out.path()).unwrap().collect();
    assert_eq!(leftovers.len(), 1, "staging files should be cleaned up");
}

#[tokio::test]
async fn test_failed_part_is_skipped_and_recorded() {
    let server = MockServer::start_async().await;
    serve_manifest(
        &server,
        vec![
            resource("V1", "DRM_VOUCHER", "REQUIRED", Some(server.url("/voucher"))),
            resource("CR!BASE", "KINDLE_MAIN_BASE", "REQUIRED", Some(server.url("/base"))),
            resource("RES1", "KINDLE_MAIN_ATTACHABLE", "DEFERRED", Some(server.url("/res"))),
        ],
    )
    .await;
    for (path, status) in [("/voucher", 200), ("/base", 200), ("/res", 500)] {
        server
            .mock_async(|when, then| {
                when.method(GET).path(path);
                then.status(status).body("DATA");
            })
            .await;
    }

    let out = TempDir::new().unwrap();
    let summary = DownloadManager::new(client(&server), DownloadOptions::new(out.path()))
        .download_book(CONTENT_ID)
        .await
        .unwrap();

    assert_eq!(summary.downloaded_count(), 2);
    assert!(!summary.is_complete());
    assert_eq!(
        archive_entries(&summary.archive_path),
        vec!["V1.voucher", "B00ABC123_EBOK.azw", "B00ABC123.manifest"]
    );

    let side = side_file(&summary.archive_path, CONTENT_ID);
    let failed = &side["downloadOutcomes"][2];
    assert_eq!(failed["status"], "skipped");
    assert_eq!(failed["resourceId"], "RES1");
    assert_eq!(failed["httpStatus"], 500);
}

#[tokio::test]
async fn test_required_scope_without_required_resources() {
    let server = MockServer::start_async().await;
    serve_manifest(
        &server,
        vec![
            resource("MD1", "KINDLE_MAIN_METADATA", "PREFERRED", Some(server.url("/md"))),
            resource("AN1", "KINDLE_USER_ANOT", "DEFERRED", Some(server.url("/anot"))),
        ],
    )
    .await;
    let md = server
        .mock_async(|when, then| {
            when.method(GET).path("/md");
            then.status(200).body("META");
        })
        .await;
    let anot = server
        .mock_async(|when, then| {
            when.method(GET).path("/anot");
            then.status(200).body("ANOT");
        })
        .await;

    let out = TempDir::new().unwrap();
    let options = DownloadOptions::new(out.path()).with_scope_name("REQUIRED").unwrap();
    let summary = DownloadManager::new(client(&server), options)
        .download_book(CONTENT_ID)
        .await
        .unwrap();

    assert!(summary.outcomes.is_empty());
    assert_eq!(archive_entries(&summary.archive_path), vec!["B00ABC123.manifest"]);
    assert_eq!(md.hits_async().await, 0);
    assert_eq!(anot.hits_async().await, 0);
}

#[tokio::test]
async fn test_unknown_scope_fails_before_any_request() {
    let server = MockServer::start_async().await;
    let manifest = server
        .mock_async(|when, then| {
            when.any_request();
            then.status(200).body(manifest_body(CONTENT_ID, vec![]));
        })
        .await;

    let out = TempDir::new().unwrap();
    let result = DownloadOptions::new(out.path())
        .with_scope_name("urgent")
        .map(|options| DownloadManager::new(client(&server), options));

    match result {
        Err(KindleError::InvalidScope { name, valid }) => {
            assert_eq!(name, "urgent");
            assert_eq!(valid, vec!["REQUIRED", "PREFERRED", "DEFERRED"]);
        }
        Err(other) => panic!("expected InvalidScope, got {:?}", other),
        Ok(_) => panic!("expected InvalidScope"),
    }
    assert_eq!(manifest.hits_async().await, 0);
    assert!(std::fs::read_dir(out.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn test_manifest_failure_aborts_cycle() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(manifest_path(CONTENT_ID));
            then.status(503);
        })
        .await;

    let out = TempDir::new().unwrap();
    let err = DownloadManager::new(client(&server), DownloadOptions::new(out.path()))
        .download_book(CONTENT_ID)
        .await
        .unwrap_err();

    assert!(matches!(err, KindleError::ManifestFetch { status: Some(503), .. }));
    assert!(std::fs::read_dir(out.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn test_resource_without_url_is_skipped() {
    let server = MockServer::start_async().await;
    serve_manifest(
        &server,
        vec![
            resource("CR!BASE", "KINDLE_MAIN_BASE", "REQUIRED", Some(server.url("/base"))),
            resource("NOURL", "KINDLE_MAIN_ATTACHABLE", "REQUIRED", None),
        ],
    )
    .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/base");
            then.status(200).body("BASE");
        })
        .await;

    let out = TempDir::new().unwrap();
    let summary = DownloadManager::new(client(&server), DownloadOptions::new(out.path()))
        .download_book(CONTENT_ID)
        .await
        .unwrap();

    assert_eq!(summary.outcomes.len(), 2);
    assert!(summary.outcomes[0].is_downloaded());
    match &summary.outcomes[1] {
        PartOutcome::Skipped { resource_id, reason, http_status, .. } => {
            assert_eq!(resource_id, "NOURL");
            assert!(reason.contains("NOURL"));
            assert_eq!(*http_status, None);
        }
        other => panic!("expected a skipped outcome, got {:?}", other),
    }
    assert_eq!(
        archive_entries(&summary.archive_path),
        vec!["B00ABC123_EBOK.azw", "B00ABC123.manifest"]
    );
}

#[tokio::test]
async fn test_unreachable_part_is_skipped_without_status() {
    let server = MockServer::start_async().await;
    serve_manifest(
        &server,
        vec![
            resource("CR!BASE", "KINDLE_MAIN_BASE", "REQUIRED", Some(server.url("/base"))),
            resource("GONE", "KINDLE_MAIN_ATTACHABLE", "DEFERRED", Some("http://127.0.0.1:1/x".to_string())),
        ],
    )
    .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/base");
            then.status(200).body("BASE");
        })
        .await;

    let out = TempDir::new().unwrap();
    let summary = DownloadManager::new(client(&server), DownloadOptions::new(out.path()))
        .download_book(CONTENT_ID)
        .await
        .unwrap();

    assert!(summary.outcomes[0].is_downloaded());
    match &summary.outcomes[1] {
        PartOutcome::Skipped { resource_id, http_status, .. } => {
            assert_eq!(resource_id, "GONE");
            assert_eq!(*http_status, None);
        }
        other => panic!("expected a skipped outcome, got {:?}", other),
    }
    assert_eq!(
        archive_entries(&summary.archive_path),
        vec!["B00ABC123_EBOK.azw", "B00ABC123.manifest"]
    );
    assert_eq!(side_file(&summary.archive_path, CONTENT_ID)["downloadOutcomes"][1]["status"], "skipped");
}

#[tokio::test]
async fn test_leftover_staging_files_are_discarded() {
    let server = MockServer::start_async().await;
    serve_manifest(
        &server,
        vec![resource("CR!BASE", "KINDLE_MAIN_BASE", "REQUIRED", Some(server.url("/base")))],
    )
    .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/base");
            then.status(200).body("BASE");
        })
        .await;

    let out = TempDir::new().unwrap();
    let staging = out.path().join(format!(".{}.parts", CONTENT_ID));
    std::fs::create_dir_all(&staging).unwrap();
    std::fs::write(staging.join("stale.bin"), b"OLD").unwrap();
    std::fs::write(staging.join("B00ABC123_EBOK.azw"), b"HALF").unwrap();

    let summary = DownloadManager::new(client(&server), DownloadOptions::new(out.path()))
        .download_book(CONTENT_ID)
        .await
        .unwrap();

    assert_eq!(
        archive_entries(&summary.archive_path),
        vec!["B00ABC123_EBOK.azw", "B00ABC123.manifest"]
    );
    assert_eq!(archive_entry(&summary.archive_path, "B00ABC123_EBOK.azw"), b"BASE");
    assert!(!staging.exists());

    let remaining: Vec<PathBuf> = std::fs::read_dir(out.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(remaining, vec![summary.archive_path.clone()]);
}

#[tokio::test]
async fn test_concurrent_parts_keep_manifest_order() {
    let server = MockServer::start_async().await;
    let ids = ["R1", "R2", "R3", "R4"];
    serve_manifest(
        &server,
        ids.iter()
            .map(|id| {
                resource(id, "KINDLE_MAIN_ATTACHABLE", "DEFERRED", Some(server.url(format!("/{}", id))))
            })
            .collect(),
    )
    .await;
    for (i, id) in ids.iter().enumerate() {
        let delay = Duration::from_millis(200 - 50 * i as u64);
        server
            .mock_async(|when, then| {
                when.method(GET).path(format!("/{}", id));
                then.status(200).delay(delay).body(id.as_bytes());
            })
            .await;
    }

    let out = TempDir::new().unwrap();
    let options = DownloadOptions::new(out.path()).with_max_concurrent_parts(4);
    let summary = DownloadManager::new(client(&server), options)
        .download_book(CONTENT_ID)
        .await
        .unwrap();

    let order: Vec<&str> = summary.outcomes.iter().map(|o| o.resource_id()).collect();
    assert_eq!(order, ids);
    assert_eq!(
        archive_entries(&summary.archive_path),
        vec!["R1.azw.res", "R2.azw.res", "R3.azw.res", "R4.azw.res", "B00ABC123.manifest"]
    );
}

#[tokio::test]
async fn test_progress_reports_terminal_states() {
    let server = MockServer::start_async().await;
    serve_manifest(
        &server,
        vec![
            resource("CR!BASE", "KINDLE_MAIN_BASE", "REQUIRED", Some(server.url("/base"))),
            resource("RES1", "KINDLE_MAIN_ATTACHABLE", "REQUIRED", Some(server.url("/res"))),
        ],
    )
    .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/base");
            then.status(200).body("BASE");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/res");
            then.status(404);
        })
        .await;

    let seen: Arc<Mutex<Vec<(String, PartState)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let callback = Arc::new(move |p: PartProgress| {
        sink.lock().unwrap().push((p.resource_id.clone(), p.state));
    });

    let out = TempDir::new().unwrap();
    DownloadManager::new(client(&server), DownloadOptions::new(out.path()))
        .with_progress(callback)
        .download_book(CONTENT_ID)
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert!(seen.contains(&("CR!BASE".to_string(), PartState::Completed)));
    assert!(seen.contains(&("RES1".to_string(), PartState::Skipped)));
}

struct ReverseDecryptor;

#[async_trait]
impl Decryptor for ReverseDecryptor {
    async fn decrypt(&self, archive: &Path, auth: &dyn Authenticator) -> kindle_core::Result<PathBuf> {
        assert_eq!(auth.device_serial(), DEVICE_SERIAL);
        let mut data = tokio::fs::read(archive).await?;
        data.reverse();
        let out = archive.with_extension("dec");
        tokio::fs::write(&out, data).await?;
        Ok(out)
    }
}

struct RejectingDecryptor;

#[async_trait]
impl Decryptor for RejectingDecryptor {
    async fn decrypt(&self, _archive: &Path, _auth: &dyn Authenticator) -> kindle_core::Result<PathBuf> {
        Err(KindleError::Decrypt("voucher rejected".to_string()))
    }
}

async fn serve_single_part(server: &MockServer) {
    serve_manifest(
        server,
        vec![resource("CR!BASE", "KINDLE_MAIN_BASE", "REQUIRED", Some(server.url("/base")))],
    )
    .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/base");
            then.status(200).body("BASE");
        })
        .await;
}

#[tokio::test]
async fn test_decryptor_replaces_archive() {
    let server = MockServer::start_async().await;
    serve_single_part(&server).await;

    let out = TempDir::new().unwrap();
    let summary = DownloadManager::new(client(&server), DownloadOptions::new(out.path()))
        .with_decryptor(Arc::new(ReverseDecryptor))
        .download_book(CONTENT_ID)
        .await
        .unwrap();

    assert!(summary.decrypted);
    assert_eq!(summary.archive_path, out.path().join("B00ABC123_EBOK.kfx-zip"));
    // A reversed zip no longer starts with the local file header magic.
    let data = std::fs::read(&summary.archive_path).unwrap();
    assert_ne!(&data[..4], b"PK\x03\x04");
    assert!(!out.path().join("B00ABC123_EBOK.dec").exists());
}

#[tokio::test]
async fn test_decrypt_failure_keeps_plain_archive() {
    let server = MockServer::start_async().await;
    serve_single_part(&server).await;

    let out = TempDir::new().unwrap();
    let err = DownloadManager::new(client(&server), DownloadOptions::new(out.path()))
        .with_decryptor(Arc::new(RejectingDecryptor))
        .download_book(CONTENT_ID)
        .await
        .unwrap_err();

    assert!(matches!(err, KindleError::Decrypt(ref m) if m.contains("voucher rejected")));
    let archive = out.path().join("B00ABC123_EBOK.kfx-zip");
    assert_eq!(
        archive_entries(&archive),
        vec!["B00ABC123_EBOK.azw", "B00ABC123.manifest"]
    );
}
