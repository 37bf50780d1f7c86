//! Decryption through an external program
//!
//! Runs a user-supplied command with `{input}` and `{output}` placeholders
//! substituted in its arguments. The device identity is passed in the
//! environment:
//!
//! - `KINDLE_DEVICE_TYPE`
//! - `KINDLE_DEVICE_SERIAL`
//! - `KINDLE_USER_ID`
//!
//! A non-zero exit status, or an exit without producing `{output}`, is a
//! decryption failure.

use crate::api::auth::Authenticator;
use crate::crypto::decryptor::Decryptor;
use crate::error::{KindleError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

pub const INPUT_PLACEHOLDER: &str = "{input}";
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// [`Decryptor`] backed by an external command
#[derive(Debug, Clone)]
pub struct CommandDecryptor {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandDecryptor {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Where the command is asked to write its result
    pub fn output_path(archive: &Path) -> PathBuf {
        let mut name = archive
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".decrypted");
        archive.with_file_name(name)
    }

    fn expand_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|a| a.replace(INPUT_PLACEHOLDER, &input).replace(OUTPUT_PLACEHOLDER, &output))
            .collect()
    }
}

#[async_trait]
impl Decryptor for CommandDecryptor {
    async fn decrypt(&self, archive: &Path, auth: &dyn Authenticator) -> Result<PathBuf> {
        let output_path = Self::output_path(archive);
        let args = self.expand_args(archive, &output_path);

        tracing::info!(program = %self.program.display(), "running decryptor");

        let output = Command::new(&self.program)
            .args(&args)
            .env("KINDLE_DEVICE_TYPE", auth.device_type())
            .env("KINDLE_DEVICE_SERIAL", auth.device_serial())
            .env("KINDLE_USER_ID", auth.user_id())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                KindleError::Decrypt(format!("Cannot run {}: {}", self.program.display(), e))
            })?;

        if !output.status.success() {
            let _ = tokio::fs::remove_file(&output_path).await;
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(KindleError::Decrypt(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }

        if !tokio::fs::try_exists(&output_path).await.unwrap_or(false) {
            return Err(KindleError::Decrypt(format!(
                "{} did not produce {}",
                self.program.display(),
                output_path.display()
            )));
        }

        Ok(output_path)
    }
}
