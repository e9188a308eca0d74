mod files;

use camino::Utf8PathBuf as PathBuf;
use clap::{Parser, Subcommand};
use eyre::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_error::ErrorLayer;
use tracing_subscriber::{prelude::*, EnvFilter};

use wordbank_core::{
    actor::{
        batch::{BatchEvent, BatchHandle, BatchSummary},
        convert::{start_convert_batch, ConvertBatch},
        maintenance::{start_delete_batch, DeleteBatch},
        upload::{start_upload_batch, UploadBatch},
    },
    catalog::operation::convert_remote::filter_convertible,
    config::{read_config, Config},
    model::{QualityTier, RemoteVideoPath},
    processing::toolkit::FfmpegToolkit,
    remote::{
        index::{IndexApi, IndexClient},
        rclone::{ListEntries, ObjectStore, RcloneStore},
    },
    startup_self_check,
};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "wordbank.toml")]
    config: PathBuf,
    #[arg(long)]
    skip_startup_check: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List remote categories, or one category's folders and videos
    List { category: Option<String> },
    /// Upload local videos (files or folders) to a remote directory
    Upload {
        /// Local video files, or folders scanned recursively for videos
        #[arg(required = true)]
        paths: Vec<String>,
        /// Remote directory: category[/subfolder...]
        #[arg(long)]
        dest: String,
        /// Re-encode large sources with the hardware H.265 encoder
        /// (quality, balanced or compact)
        #[arg(long, value_name = "TIER")]
        compress: Option<QualityTier>,
        /// Skip thumbnail creation and upload
        #[arg(long)]
        no_thumbnail: bool,
        /// Skip the index sync after the batch
        #[arg(long)]
        no_sync: bool,
    },
    /// Convert already-uploaded videos to HLS
    Convert {
        /// Remote directory to scan: category[/subfolder...]
        #[arg(long)]
        path: String,
        /// Specific files below the directory; default: every video not
        /// yet converted
        files: Vec<String>,
        /// Keep the original video object next to the HLS rendition
        #[arg(long)]
        keep_original: bool,
        /// Skip the index sync after the batch
        #[arg(long)]
        no_sync: bool,
    },
    /// Delete remote videos together with their HLS folders and thumbnails
    Delete {
        /// Remote video paths: category[/subfolder...]/filename
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Rebuild the remote index from current store contents
    Sync,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "1")
    }
    if std::env::var("RUST_SPANTRACE").is_err() {
        std::env::set_var("RUST_SPANTRACE", "1");
    }
    color_eyre::install()?;
    tracing_subscriber::registry()
        .with(EnvFilter::from_env("WORDBANK_LOG"))
        .with(ErrorLayer::default())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = read_config(&args.config).await?;

    if !args.skip_startup_check {
        tracing::info!("Running self check");
        startup_self_check::run_self_check(config.bin_paths.as_ref())
            .await
            .map_err(|()| eyre::eyre!("self check failed, see log output"))?;
    } else {
        tracing::info!("Skipping self check");
    }

    match args.command {
        Commands::List { category } => list(&config, category).await,
        Commands::Upload {
            paths,
            dest,
            compress,
            no_thumbnail,
            no_sync,
        } => {
            let files = files::collect_video_files(&paths)?;
            if files.is_empty() {
                println!("No video files selected.");
                return Ok(());
            }
            let cancel = CancellationToken::new();
            let handle = start_upload_batch(
                RcloneStore::new(&config, cancel.clone()),
                FfmpegToolkit::new(config.bin_paths.clone(), cancel.clone()),
                IndexClient::new(&config.api_base_url, &config.index)?,
                config.upload.compress_skip_below,
                UploadBatch {
                    files,
                    remote_dir: dest.trim_matches('/').to_owned(),
                    compress,
                    thumbnail: !no_thumbnail,
                    sync_when_done: !no_sync,
                },
                cancel,
            );
            finish(run_batch(handle).await)
        }
        Commands::Convert {
            path,
            files,
            keep_original,
            no_sync,
        } => {
            let path = path.trim_matches('/').to_owned();
            let cancel = CancellationToken::new();
            let store = RcloneStore::new(&config, cancel.clone());
            let selected = if files.is_empty() {
                let listing = store
                    .list(&path, ListEntries::FilesOnly, true)
                    .await
                    .wrap_err("could not list remote files")?;
                filter_convertible(&listing)
            } else {
                files
            };
            if selected.is_empty() {
                println!("Nothing to convert under {} (already-converted videos are skipped).", path);
                return Ok(());
            }
            let files = selected
                .iter()
                .map(|file| RemoteVideoPath::parse(&format!("{}/{}", path, file)))
                .collect::<Result<Vec<_>>>()?;
            let handle = start_convert_batch(
                store,
                FfmpegToolkit::new(config.bin_paths.clone(), cancel.clone()),
                IndexClient::new(&config.api_base_url, &config.index)?,
                ConvertBatch {
                    files,
                    delete_original: !keep_original,
                    sync_when_done: !no_sync,
                },
                cancel,
            );
            finish(run_batch(handle).await)
        }
        Commands::Delete { paths } => {
            let files = paths
                .iter()
                .map(|path| RemoteVideoPath::parse(path))
                .collect::<Result<Vec<_>>>()?;
            let cancel = CancellationToken::new();
            let handle = start_delete_batch(
                RcloneStore::new(&config, cancel.clone()),
                IndexClient::new(&config.api_base_url, &config.index)?,
                DeleteBatch { files },
                cancel,
            );
            finish(run_batch(handle).await)
        }
        Commands::Sync => {
            let index = IndexClient::new(&config.api_base_url, &config.index)?;
            println!("Syncing index...");
            match index.sync().await {
                Ok(count) => {
                    println!("Index synced ({} files)", count);
                    Ok(())
                }
                Err(err) => Err(err).wrap_err("index sync failed"),
            }
        }
    }
}

async fn list(config: &Config, category: Option<String>) -> Result<()> {
    let store = RcloneStore::new(config, CancellationToken::new());
    match category {
        None => {
            let mut categories = config.categories.clone();
            let listed = store
                .list("", ListEntries::DirsOnly, false)
                .await
                .wrap_err("could not list remote folders")?;
            for folder in listed {
                if folder != "thumbnails" && !categories.contains(&folder) {
                    categories.push(folder);
                }
            }
            for category in categories {
                println!("{}", category);
            }
        }
        Some(category) => {
            let folders = store
                .list(&category, ListEntries::DirsOnly, true)
                .await
                .wrap_err("could not list remote folders")?;
            for folder in &folders {
                println!("{}/{}/", category, folder);
            }
            let listing = store
                .list(&category, ListEntries::FilesOnly, true)
                .await
                .wrap_err("could not list remote files")?;
            for file in filter_convertible(&listing) {
                println!("{}/{}", category, file);
            }
        }
    }
    Ok(())
}

/// Drain a batch worker's event stream to the terminal, cancelling it on
/// ctrl-c, and return its summary.
async fn run_batch(mut handle: BatchHandle) -> BatchSummary {
    let cancel = handle.cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling, waiting for the current file to stop...");
            cancel.cancel();
        }
    });
    while let Some(event) = handle.events.recv().await {
        print_event(event);
    }
    handle.join().await
}

fn print_event(event: BatchEvent) {
    match event {
        BatchEvent::FileStarted { index, total, name } => {
            println!("[{}/{}] {}", index, total, name)
        }
        BatchEvent::Log(message) => println!("  {}", message),
        BatchEvent::FileDone { result: Ok(()), .. } => println!("  done"),
        BatchEvent::FileDone {
            result: Err(report),
            ..
        } => println!("  failed: {:#}", report),
        BatchEvent::SyncStarted => println!("Syncing index..."),
        BatchEvent::SyncDone(Ok(count)) => println!("Index synced ({} files)", count),
        BatchEvent::SyncDone(Err(err)) => println!("Index sync failed: {}", err),
        BatchEvent::BatchDone(summary) => {
            println!(
                "Finished: {} succeeded, {} failed{}",
                summary.succeeded,
                summary.failed,
                if summary.cancelled { " (cancelled)" } else { "" }
            )
        }
    }
}

fn finish(summary: BatchSummary) -> Result<()> {
    if summary.failed > 0 || summary.cancelled {
        std::process::exit(1);
    }
    Ok(())
}
