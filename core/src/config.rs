use std::time::Duration;

use camino::{Utf8Path as Path, Utf8PathBuf as PathBuf};
use color_eyre::eyre::{Context, Result};
use serde::Deserialize;

/// Size below which (inclusive) compression is never attempted.
const DEFAULT_COMPRESS_SKIP_BELOW: &str = "600MB";
const DEFAULT_TRANSFERS: u32 = 8;
const DEFAULT_CHECKERS: u32 = 16;
const DEFAULT_REGISTER_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SYNC_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct TomlBinPaths {
    pub rclone: Option<String>,
    pub ffmpeg: Option<String>,
    pub ffprobe: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct TomlUpload {
    pub compress_skip_below: Option<String>,
    pub transfers: Option<u32>,
    pub checkers: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct TomlIndex {
    pub register_timeout_secs: Option<u64>,
    pub sync_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct TomlConfig {
    pub bucket: String,
    pub api_base_url: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(rename = "BinPaths")]
    pub bin_paths: Option<TomlBinPaths>,
    #[serde(rename = "Upload")]
    pub upload: Option<TomlUpload>,
    #[serde(rename = "Index")]
    pub index: Option<TomlIndex>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinPaths {
    pub rclone: Option<PathBuf>,
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    /// Sources at or below this many bytes are never compressed.
    pub compress_skip_below: u64,
    pub transfers: u32,
    pub checkers: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    pub register_timeout: Duration,
    /// Full resync scans the whole bucket, so it gets a longer deadline.
    pub sync_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Remote alias plus bucket as understood by the transfer tool,
    /// e.g. "r2:wordbank-videos".
    pub bucket: String,
    pub api_base_url: String,
    /// Seed list of top-level categories, merged with what the remote
    /// listing reports.
    pub categories: Vec<String>,
    pub bin_paths: Option<BinPaths>,
    pub upload: UploadConfig,
    pub index: IndexConfig,
}

pub async fn read_config(path: &Path) -> Result<Config> {
    let toml_str = tokio::fs::read_to_string(path)
        .await
        .context(format!("Error reading config file {}", path))?;
    parse_config(&toml_str)
}

fn parse_config(toml_str: &str) -> Result<Config> {
    let toml_config: TomlConfig = toml::from_str(toml_str).context("Error parsing config file")?;
    let bin_paths = toml_config.bin_paths.map(|bin_paths| BinPaths {
        rclone: bin_paths.rclone.map(PathBuf::from),
        ffmpeg: bin_paths.ffmpeg.map(PathBuf::from),
        ffprobe: bin_paths.ffprobe.map(PathBuf::from),
    });
    let upload = {
        let toml_upload = toml_config.upload.unwrap_or(TomlUpload {
            compress_skip_below: None,
            transfers: None,
            checkers: None,
        });
        let skip_below_str = toml_upload
            .compress_skip_below
            .unwrap_or_else(|| DEFAULT_COMPRESS_SKIP_BELOW.to_owned());
        let compress_skip_below = parse_size::parse_size(&skip_below_str)
            .map_err(|err| color_eyre::eyre::eyre!("invalid compress_skip_below value: {}", err))?;
        UploadConfig {
            compress_skip_below,
            transfers: toml_upload.transfers.unwrap_or(DEFAULT_TRANSFERS),
            checkers: toml_upload.checkers.unwrap_or(DEFAULT_CHECKERS),
        }
    };
    let index = {
        let toml_index = toml_config.index.unwrap_or(TomlIndex {
            register_timeout_secs: None,
            sync_timeout_secs: None,
        });
        IndexConfig {
            register_timeout: Duration::from_secs(
                toml_index
                    .register_timeout_secs
                    .unwrap_or(DEFAULT_REGISTER_TIMEOUT_SECS),
            ),
            sync_timeout: Duration::from_secs(
                toml_index
                    .sync_timeout_secs
                    .unwrap_or(DEFAULT_SYNC_TIMEOUT_SECS),
            ),
        }
    };
    Ok(Config {
        bucket: toml_config.bucket,
        api_base_url: toml_config.api_base_url,
        categories: toml_config.categories,
        bin_paths,
        upload,
        index,
    })
}
