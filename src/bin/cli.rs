//! kindle-cli: command line front end for kindle-core

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kindle_core::api::{LibraryOptions, Locale};
use kindle_core::crypto::CommandDecryptor;
use kindle_core::download::{PartProgress, PartState};
use kindle_core::{ClientConfig, DownloadManager, DownloadOptions, Identity, KindleClient};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "kindle-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Download Kindle e-books into .kfx-zip archives", long_about = None)]
struct Cli {
    /// Delivery service base URL
    #[arg(long, global = true, env = "KINDLE_DELIVERY_URL", value_name = "URL")]
    delivery_url: Option<String>,

    /// Library sync service base URL
    #[arg(long, global = true, env = "KINDLE_LIBRARY_URL", value_name = "URL")]
    library_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download a title and package it
    Download {
        /// Content id (ASIN) of the title
        content_id: String,

        /// Device identity JSON file
        #[arg(long, env = "KINDLE_IDENTITY", value_name = "FILE")]
        identity: PathBuf,

        /// REQUIRED, PREFERRED or DEFERRED
        #[arg(long, default_value = "DEFERRED")]
        scope: String,

        /// Directory receiving the archive
        #[arg(long, short, default_value = ".", value_name = "DIR")]
        output: PathBuf,

        /// Parts downloaded at once
        #[arg(long, short, default_value_t = 1)]
        jobs: usize,

        /// Decryption program and its arguments; `{input}` and `{output}`
        /// are replaced with the archive paths
        #[arg(long, num_args = 1.., allow_hyphen_values = true, value_name = "PROG ARGS")]
        decrypt_cmd: Option<Vec<String>>,
    },

    /// Print the resolved manifest of a title as JSON
    Manifest {
        content_id: String,

        #[arg(long, env = "KINDLE_IDENTITY", value_name = "FILE")]
        identity: PathBuf,
    },

    /// List the titles owned by the account
    Library {
        #[arg(long, env = "KINDLE_IDENTITY", value_name = "FILE")]
        identity: PathBuf,

        /// Maximum number of entries
        #[arg(long, default_value_t = 1000)]
        item_count: u32,

        /// Include personal documents and other non e-book entries
        #[arg(long)]
        all: bool,

        /// Print the listing as JSON
        #[arg(long)]
        json: bool,
    },

    /// List known marketplaces
    Locales,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Download {
            content_id,
            identity,
            scope,
            output,
            jobs,
            decrypt_cmd,
        } => {
            let client = client(&identity, cli.delivery_url, cli.library_url)?;
            let options = DownloadOptions::new(output)
                .with_scope_name(&scope)?
                .with_max_concurrent_parts(jobs);
            download(client, options, &content_id, decrypt_cmd).await?
        }
        Commands::Manifest { content_id, identity } => {
            let client = client(&identity, cli.delivery_url, cli.library_url)?;
            let manifest = client.get_manifest(&content_id).await?;
            println!("{}", serde_json::to_string_pretty(&manifest)?);
        }
        Commands::Library {
            identity,
            item_count,
            all,
            json,
        } => {
            let client = client(&identity, cli.delivery_url, cli.library_url)?;
            let mut library = client.get_library_with(&LibraryOptions { item_count }).await?;
            if !all {
                library.books.retain(|b| b.is_ebook());
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&library)?);
            } else {
                for book in &library.books {
                    println!(
                        "{:<12} {} ({})",
                        book.asin,
                        book.title.as_deref().unwrap_or("-"),
                        book.authors.join(", ")
                    );
                }
            }
        }
        Commands::Locales => {
            for line in locale_lines() {
                println!("{}", line);
            }
        }
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kindle_core=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn locale_lines() -> Vec<String> {
    Locale::all()
        .iter()
        .map(|l| format!("{:<16} {:<4} {:<8} {}", l.name, l.country_code, l.domain, l.language))
        .collect()
}

fn client(
    identity_path: &Path,
    delivery_url: Option<String>,
    library_url: Option<String>,
) -> Result<KindleClient> {
    let identity = Identity::from_file(identity_path)
        .with_context(|| format!("loading identity from {}", identity_path.display()))?;
    tracing::info!(identity = %identity.masked_log_entry(), "loaded identity");

    let mut config = ClientConfig::default();
    if let Some(url) = delivery_url {
        config.delivery_base_url = url;
    }
    if let Some(url) = library_url {
        config.library_base_url = url;
    }
    Ok(KindleClient::with_config(Arc::new(identity), config)?)
}

async fn download(
    client: KindleClient,
    options: DownloadOptions,
    content_id: &str,
    decrypt_cmd: Option<Vec<String>>,
) -> Result<()> {
    let mut manager = DownloadManager::new(client, options).with_progress(Arc::new(report_progress));

    if let Some(mut command) = decrypt_cmd {
        if command.is_empty() {
            anyhow::bail!("--decrypt-cmd needs a program");
        }
        let program = command.remove(0);
        manager = manager.with_decryptor(Arc::new(CommandDecryptor::new(program, command)));
    }

    let summary = manager
        .download_book(content_id)
        .await
        .with_context(|| format!("downloading {}", content_id))?;

    for skipped in summary.skipped() {
        eprintln!("skipped {}", serde_json::to_string(skipped)?);
    }
    println!("{}", summary.archive_path.display());
    Ok(())
}

fn report_progress(progress: PartProgress) {
    match progress.state {
        PartState::Completed => tracing::info!(
            resource_id = %progress.resource_id,
            bytes = progress.bytes_received,
            "part complete"
        ),
        _ => tracing::debug!(
            resource_id = %progress.resource_id,
            percent = progress.progress_percentage,
            bytes_per_second = progress.bytes_per_second,
            "part progress"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_command_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_download() {
        let cli = Cli::try_parse_from([
            "kindle-cli",
            "download",
            "B00ABC123",
            "--identity",
            "id.json",
            "--scope",
            "required",
            "-j",
            "4",
            "--decrypt-cmd",
            "dedrm",
            "-i",
            "{input}",
        ])
        .unwrap();

        match cli.command {
            Commands::Download {
                content_id,
                scope,
                jobs,
                decrypt_cmd,
                ..
            } => {
                assert_eq!(content_id, "B00ABC123");
                assert_eq!(scope, "required");
                assert_eq!(jobs, 4);
                assert_eq!(decrypt_cmd.unwrap(), vec!["dedrm", "-i", "{input}"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_library_with_overrides() {
        let cli = Cli::try_parse_from([
            "kindle-cli",
            "library",
            "--identity",
            "id.json",
            "--json",
            "--library-url",
            "http://127.0.0.1:8080",
        ])
        .unwrap();

        assert_eq!(cli.library_url.as_deref(), Some("http://127.0.0.1:8080"));
        match cli.command {
            Commands::Library {
                item_count,
                all,
                json,
                ..
            } => {
                assert_eq!(item_count, 1000);
                assert!(!all);
                assert!(json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_locale_lines_cover_table() {
        let lines = locale_lines();
        assert_eq!(lines.len(), Locale::all().len());
        assert!(lines.iter().any(|l| l.starts_with("united_states")));
    }
}
