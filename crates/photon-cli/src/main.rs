//! Photon CLI: operator tooling for tenant storage.
//!
//! Every storage command takes a provider record file (`--record`). With
//! `--tenant` the record becomes the upstream of a managed, tenant-scoped view.

use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use photon_cli::{
    build_storage_config, format_size, init_tracing, load_record, redacted_json, truncate_string,
};
use photon_core::Config;
use photon_storage::{
    ListProgress, ProgressCallback, StorageFactory, StorageProvider, UploadOptions,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "photon", about = "Photon storage operator CLI")]
struct Cli {
    /// Provider record JSON file: {"id", "type", "config"}
    #[arg(long, global = true)]
    record: Option<PathBuf>,
    /// Scope every operation to this tenant's managed namespace
    #[arg(long, global = true)]
    tenant: Option<String>,
    /// Extra prefix between the upstream base and the tenant segment
    #[arg(long, global = true, requires = "tenant")]
    base_prefix: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the storage config a provider record maps to (credentials masked)
    Map,
    /// List registered storage provider tags
    Providers,
    /// List objects
    Ls {
        /// Only supported image formats, after exclude/limit filters
        #[arg(long)]
        images: bool,
        /// Print as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print still/video live photo pairs
    LivePhotos,
    /// Print the public URL of a key
    Url {
        key: String,
    },
    /// Upload a local file
    Upload {
        /// Path to the file to upload
        file: PathBuf,
        /// Target key (defaults to the file name)
        #[arg(long)]
        key: Option<String>,
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Download a key to stdout or a file
    Get {
        key: String,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Delete a key, or a whole folder with --folder
    Rm {
        key: String,
        #[arg(long)]
        folder: bool,
    },
    /// Move a key
    Mv {
        from: String,
        to: String,
    },
    /// Delete everything stored under --tenant in the managed upstream
    PurgeTenant,
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(config.log_format);

    let cli = Cli::parse();
    let factory = StorageFactory::from_config(&config);

    if let Commands::Providers = cli.command {
        for (tag, category) in factory.registered_providers() {
            println!("{:<10} {}", tag, category);
        }
        return Ok(());
    }

    let record_path = cli
        .record
        .as_deref()
        .context("--record <FILE> is required for this command")?;
    let record = load_record(record_path)?;
    let storage_config =
        build_storage_config(&record, cli.tenant.as_deref(), cli.base_prefix.as_deref())?;

    if let Commands::Map = cli.command {
        return print_json(&redacted_json(&storage_config)?);
    }

    let provider: Arc<dyn StorageProvider> = factory
        .create_provider(&storage_config)
        .context("Failed to create storage provider")?;

    match cli.command {
        Commands::Map | Commands::Providers => {}
        Commands::Ls { images, json } => {
            let objects = if images {
                provider.list_images().await?
            } else {
                let progress: &ProgressCallback = &|p: ListProgress| {
                    tracing::debug!(
                        path = %p.current_path,
                        files_scanned = p.files_scanned,
                        "Listing progress"
                    );
                };
                provider.list_all_files(Some(progress)).await?
            };

            if json {
                print_json(&objects)?;
            } else {
                for object in &objects {
                    let modified = object
                        .last_modified
                        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{:<64} {:>10} {}",
                        truncate_string(&object.key, 64),
                        format_size(object.size),
                        modified
                    );
                }
                eprintln!("{} object(s)", objects.len());
            }
        }
        Commands::LivePhotos => {
            let objects = provider.list_all_files(None).await?;
            let pairs = provider.detect_live_photos(&objects);
            let mut rows: Vec<_> = pairs
                .into_iter()
                .map(|(still, video)| serde_json::json!({ "still": still, "video": video.key }))
                .collect();
            rows.sort_by(|a, b| a["still"].as_str().cmp(&b["still"].as_str()));
            print_json(&rows)?;
        }
        Commands::Url { key } => {
            let url = match provider.generate_public_url(&key).await {
                Ok(url) => url,
                Err(e) => match config.public_url_base.as_deref() {
                    Some(base) => {
                        tracing::warn!(
                            error = %e,
                            key = %key,
                            "Provider could not build a URL, using STORAGE_PUBLIC_URL_BASE"
                        );
                        format!("{}/{}", base, key.trim_start_matches('/'))
                    }
                    None => return Err(e).context("Failed to generate public URL"),
                },
            };
            print_json(&serde_json::json!({ "url": url }))?;
        }
        Commands::Upload {
            file,
            key,
            content_type,
        } => {
            let key = match key {
                Some(key) => key,
                None => file
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .context("Cannot derive a key from the file path; pass --key")?,
            };
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let object = provider
                .upload_file(&key, Bytes::from(data), UploadOptions { content_type })
                .await?;
            print_json(&object)?;
        }
        Commands::Get { key, output } => {
            let data = provider
                .get_file(&key)
                .await?
                .with_context(|| format!("File not found: {}", key))?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, &data)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    eprintln!("Wrote {} to {}", format_size(data.len() as u64), path.display());
                }
                None => {
                    use std::io::Write;
                    std::io::stdout()
                        .write_all(&data)
                        .context("Failed to write to stdout")?;
                }
            }
        }
        Commands::Rm { key, folder } => {
            if folder {
                provider.delete_folder(&key).await?;
            } else {
                provider.delete_file(&key).await?;
            }
            print_json(&serde_json::json!({ "deleted": key, "folder": folder }))?;
        }
        Commands::Mv { from, to } => {
            let object = provider
                .move_file(&from, &to, UploadOptions::default())
                .await?;
            print_json(&object)?;
        }
        Commands::PurgeTenant => {
            let tenant = cli
                .tenant
                .as_deref()
                .context("purge-tenant requires --tenant")?;
            provider.delete_folder("").await?;
            tracing::info!(tenant_id = %tenant, "Purged managed storage namespace");
            print_json(&serde_json::json!({ "purgedTenantId": tenant }))?;
        }
    }

    Ok(())
}
