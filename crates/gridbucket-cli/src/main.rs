//! gridbucket CLI: store and fetch whole files in a blob bucket.
//!
//! The backend is chosen from the environment (STORAGE_BACKEND, GRIDFS_BUCKET_NAME,
//! LOCAL_STORAGE_PATH, MONGODB_URI, MONGODB_DATABASE); a `.env` file is honored.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use gridbucket_cli::{default_filename, init_tracing, write_output};
use gridbucket_core::{Config, DownloadOptions, FileFilter, UploadOptions};
use gridbucket_storage::{
    create_bucket, delete_file_by_id, read_and_delete_by_id, read_file_by_id, read_file_by_name,
    write_file_by_id, write_file_by_name, BucketEngine,
};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gridbucket", about = "Blob bucket CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a file
    Put {
        /// Path to the file to store
        file: PathBuf,
        /// Name to store it under (defaults to the file's name)
        #[arg(long)]
        name: Option<String>,
        /// Identifier to store it under (24 hex characters)
        #[arg(long)]
        id: Option<String>,
        /// JSON object attached as user metadata
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Fetch a file by name or identifier
    Get {
        #[command(flatten)]
        target: Target,
        /// Revision when fetching by name: 0 oldest, -1 newest
        #[arg(long, default_value = "-1", allow_hyphen_values = true)]
        revision: i32,
        /// Write to this path instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Delete a file by identifier
    Rm {
        /// File identifier
        id: String,
    },
    /// Fetch a file by identifier, then delete it
    Take {
        /// File identifier
        id: String,
        /// Write to this path instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// List stored files
    Ls {
        /// Only files with this name
        #[arg(long)]
        name: Option<String>,
    },
    /// Rename a file
    Rename {
        /// File identifier
        id: String,
        /// New file name
        new_name: String,
    },
    /// Show bucket configuration
    Info,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct Target {
    /// File name
    #[arg(long)]
    name: Option<String>,
    /// File identifier
    #[arg(long)]
    id: Option<String>,
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load bucket configuration")?;
    let bucket = create_bucket(&config)
        .await
        .context("Failed to open bucket")?;
    let bucket = bucket.as_ref();

    match cli.command {
        Commands::Put {
            file,
            name,
            id,
            metadata,
        } => {
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Read {}", file.display()))?;
            tracing::debug!(path = %file.display(), size_bytes = data.len(), "Read input file");
            let filename = match name {
                Some(name) => name,
                None => default_filename(&file)?,
            };
            let mut options = UploadOptions::default();
            if let Some(raw) = metadata {
                let value = serde_json::from_str(&raw).context("--metadata must be valid JSON")?;
                options = options.with_metadata(value);
            }

            let stored = match id {
                Some(id) => write_file_by_id(bucket, id, data, &filename, options).await?,
                None => write_file_by_name(bucket, data, &filename, options).await?,
            };
            print_json(&stored)?;
        }
        Commands::Get {
            target,
            revision,
            output,
        } => {
            let data = match (target.name, target.id) {
                (Some(name), _) => {
                    read_file_by_name(bucket, &name, DownloadOptions::revision(revision)).await?
                }
                (None, Some(id)) => read_file_by_id(bucket, id).await?,
                (None, None) => anyhow::bail!("either --name or --id is required"),
            };
            write_output(output.as_deref(), &data).await?;
        }
        Commands::Rm { id } => {
            delete_file_by_id(bucket, id.as_str()).await?;
            print_json(
                &serde_json::json!({ "success": true, "message": format!("File {} deleted", id) }),
            )?;
        }
        Commands::Take { id, output } => {
            let data = read_and_delete_by_id(bucket, id).await?;
            write_output(output.as_deref(), &data).await?;
        }
        Commands::Ls { name } => {
            let filter = FileFilter { filename: name };
            let files = bucket.find(filter).await?;
            print_json(&files)?;
        }
        Commands::Rename { id, new_name } => {
            let id = gridbucket_core::conv_to_object_id(id)?;
            bucket.rename(id, &new_name).await?;
            print_json(&serde_json::json!({ "success": true, "id": id, "filename": new_name }))?;
        }
        Commands::Info => {
            print_json(&serde_json::json!({
                "backend": bucket.backend_type(),
                "bucket_name": bucket.name(),
                "options": bucket.options(),
            }))?;
        }
    }

    Ok(())
}
