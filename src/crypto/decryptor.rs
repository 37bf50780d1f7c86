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


//! Decryption hand-off
//!
//! The crate never decrypts anything itself. A [`Decryptor`] receives the
//! packaged archive and the account's [`Authenticator`], and returns the
//! path of a transformed archive. [`decrypt_in_place`] then swaps that file
//! over the original with a single rename, so the archive on disk is always
//! either fully pre- or fully post-decryption.

use crate::api::auth::Authenticator;
use crate::error::{KindleError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// External decryption step
#[async_trait]
pub trait Decryptor: Send + Sync {
    /// Transform `archive`, returning the path of the result.
    ///
    /// The result should live on the same filesystem as `archive` so the
    /// final swap is a rename. `archive` itself must not be modified.
    async fn decrypt(&self, archive: &Path, auth: &dyn Authenticator) -> Result<PathBuf>;
}

/// Run `decryptor` and atomically replace `archive` with its output
///
/// # Errors
/// `Decrypt` if the decryptor fails or the swap cannot be made. The
/// original archive is untouched in both cases.
pub async fn decrypt_in_place(
    decryptor: &dyn Decryptor,
    archive: &Path,
    auth: &dyn Authenticator,
) -> Result<PathBuf> {
    let decrypted = decryptor.decrypt(archive, auth).await.map_err(|e| match e {
        KindleError::Decrypt(_) => e,
        other => KindleError::Decrypt(other.to_string()),
    })?;

    if decrypted == archive {
        return Ok(archive.to_path_buf());
    }

    if let Err(e) = tokio::fs::rename(&decrypted, archive).await {
        let _ = tokio::fs::remove_file(&decrypted).await;
        return Err(KindleError::Decrypt(format!(
            "Cannot replace {} with {}: {}",
            archive.display(),
            decrypted.display(),
            e
        )));
    }

    tracing::info!(archive = %archive.display(), "replaced archive with decrypted output");
    Ok(archive.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::Identity;
    use tempfile::TempDir;

    fn identity() -> Identity {
        Identity::from_json(
            r#"{"device_type":"DT","device_serial_number":"SERIAL","user_id":"U","access_token":"tok"}"#,
        )
        .unwrap()
    }

    struct Uppercase;

    #[async_trait]
    impl Decryptor for Uppercase {
        async fn decrypt(&self, archive: &Path, auth: &dyn Authenticator) -> Result<PathBuf> {
            let data = tokio::fs::read(archive).await?;
            let out = archive.with_extension("out");
            let mut transformed = data.to_ascii_uppercase();
            transformed.extend_from_slice(auth.device_serial().as_bytes());
            tokio::fs::write(&out, transformed).await?;
            Ok(out)
        }
    }

    struct Failing;

    #[async_trait]
    impl Decryptor for Failing {
        async fn decrypt(&self, _archive: &Path, _auth: &dyn Authenticator) -> Result<PathBuf> {
            Err(KindleError::InvalidState("no key for this device".to_string()))
        }
    }

    #[tokio::test]
    async fn test_successful_swap() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("B00X_EBOK.kfx-zip");
        std::fs::write(&archive, b"plain").unwrap();

        let result = decrypt_in_place(&Uppercase, &archive, &identity()).await.unwrap();

        assert_eq!(result, archive);
        assert_eq!(std::fs::read(&archive).unwrap(), b"PLAINSERIAL");
        assert!(!archive.with_extension("out").exists());
    }

    #[tokio::test]
    async fn test_failure_preserves_original() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("B00X_EBOK.kfx-zip");
        std::fs::write(&archive, b"plain").unwrap();

        let err = decrypt_in_place(&Failing, &archive, &identity()).await.unwrap_err();

        assert!(matches!(err, KindleError::Decrypt(ref m) if m.contains("no key")));
        assert_eq!(std::fs::read(&archive).unwrap(), b"plain");
    }
}
