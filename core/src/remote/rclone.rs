use std::process::Stdio;

use async_trait::async_trait;
use camino::{Utf8Path as Path, Utf8PathBuf as PathBuf};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::{
    config::Config,
    processing::process_control::{run_process, ProcessResult},
    util::OptionPathExt,
};

#[derive(thiserror::Error, Debug)]
pub enum TransferToolError {
    #[error("Error starting transfer tool: {0}")]
    ErrorStarting(#[source] std::io::Error),
    #[error("Error waiting for transfer tool: {0}")]
    ErrorRunning(eyre::Report),
    #[error("transfer tool exited with an error: {stderr}")]
    Failed { stderr: String },
    #[error("transfer was cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListEntries {
    DirsOnly,
    FilesOnly,
}

/// The single boundary through which the pipelines reach the object store.
/// All remote paths are bucket-relative; the implementation owns the
/// bucket alias. Failures are values, never panics, so per-file cleanup
/// always runs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Empty output is a valid "no entries" result, not an error.
    async fn list(
        &self,
        prefix: &str,
        entries: ListEntries,
        recursive: bool,
    ) -> Result<Vec<String>, TransferToolError>;
    /// Upload a single file under a remote directory, keeping its name.
    async fn upload(&self, local: &Path, remote_dir: &str) -> Result<(), TransferToolError>;
    /// Upload a directory's contents beneath a remote prefix with bounded
    /// transfer fan-out. Segment upload order is irrelevant; the manifest
    /// is the only consumer-visible ordering.
    async fn upload_dir(&self, local_dir: &Path, remote_dir: &str)
        -> Result<(), TransferToolError>;
    /// Copy with an explicit destination name, for when the remote name
    /// must differ from the local one.
    async fn upload_to(&self, local: &Path, remote_path: &str) -> Result<(), TransferToolError>;
    async fn download(&self, remote_path: &str, local_dir: &Path)
        -> Result<(), TransferToolError>;
    async fn delete_file(&self, remote_path: &str) -> Result<(), TransferToolError>;
    /// Recursive removal of a remote folder, used for HLS teardown.
    async fn purge(&self, remote_dir: &str) -> Result<(), TransferToolError>;
}

pub struct RcloneStore {
    bucket: String,
    bin_path: Option<PathBuf>,
    transfers: u32,
    checkers: u32,
    cancel: CancellationToken,
}

impl RcloneStore {
    pub fn new(config: &Config, cancel: CancellationToken) -> Self {
        Self {
            bucket: config.bucket.clone(),
            bin_path: config
                .bin_paths
                .as_ref()
                .and_then(|bp| bp.rclone.clone()),
            transfers: config.upload.transfers,
            checkers: config.upload.checkers,
            cancel,
        }
    }

    /// `<bucket-alias>/<path>`; an empty path addresses the bucket root.
    fn remote(&self, path: &str) -> String {
        let path = path.trim_matches('/');
        if path.is_empty() {
            self.bucket.clone()
        } else {
            format!("{}/{}", self.bucket, path)
        }
    }

    #[instrument(skip(self, args), fields(tool = "rclone"))]
    async fn run(&self, args: Vec<String>) -> Result<Vec<u8>, TransferToolError> {
        let mut command = Command::new(
            self.bin_path
                .as_opt_path()
                .map(|p| p.as_str())
                .unwrap_or("rclone"),
        );
        command
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        debug!(command = ?command.as_std(), "Invoking rclone");
        let child = command.spawn().map_err(TransferToolError::ErrorStarting)?;
        match run_process(child, &self.cancel)
            .await
            .map_err(TransferToolError::ErrorRunning)?
        {
            ProcessResult::RanToEnd(output) if output.status.success() => Ok(output.stdout),
            ProcessResult::RanToEnd(output) => Err(TransferToolError::Failed {
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }),
            ProcessResult::Cancelled => Err(TransferToolError::Cancelled),
        }
    }
}

/// One entry per line, directories with a trailing slash.
fn parse_lsf_output(stdout: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(|line| line.trim_end().trim_end_matches('/'))
        .filter(|line| !line.is_empty())
        .map(|line| line.to_owned())
        .collect()
}

#[async_trait]
impl ObjectStore for RcloneStore {
    async fn list(
        &self,
        prefix: &str,
        entries: ListEntries,
        recursive: bool,
    ) -> Result<Vec<String>, TransferToolError> {
        let mut args = vec!["lsf".to_owned(), self.remote(prefix)];
        args.push(
            match entries {
                ListEntries::DirsOnly => "--dirs-only",
                ListEntries::FilesOnly => "--files-only",
            }
            .to_owned(),
        );
        if recursive {
            args.push("-R".to_owned());
        }
        let stdout = self.run(args).await?;
        Ok(parse_lsf_output(&stdout))
    }

    async fn upload(&self, local: &Path, remote_dir: &str) -> Result<(), TransferToolError> {
        self.run(vec![
            "copy".to_owned(),
            local.to_string(),
            format!("{}/", self.remote(remote_dir)),
        ])
        .await?;
        Ok(())
    }

    async fn upload_dir(
        &self,
        local_dir: &Path,
        remote_dir: &str,
    ) -> Result<(), TransferToolError> {
        self.run(vec![
            "copy".to_owned(),
            local_dir.to_string(),
            format!("{}/", self.remote(remote_dir)),
            "--transfers".to_owned(),
            self.transfers.to_string(),
            "--checkers".to_owned(),
            self.checkers.to_string(),
        ])
        .await?;
        Ok(())
    }

    async fn upload_to(&self, local: &Path, remote_path: &str) -> Result<(), TransferToolError> {
        self.run(vec![
            "copyto".to_owned(),
            local.to_string(),
            self.remote(remote_path),
        ])
        .await?;
        Ok(())
    }

    async fn download(
        &self,
        remote_path: &str,
        local_dir: &Path,
    ) -> Result<(), TransferToolError> {
        self.run(vec![
            "copy".to_owned(),
            self.remote(remote_path),
            local_dir.to_string(),
        ])
        .await?;
        Ok(())
    }

    async fn delete_file(&self, remote_path: &str) -> Result<(), TransferToolError> {
        self.run(vec!["deletefile".to_owned(), self.remote(remote_path)])
            .await?;
        Ok(())
    }

    async fn purge(&self, remote_dir: &str) -> Result<(), TransferToolError> {
        self.run(vec!["purge".to_owned(), self.remote(remote_dir)])
            .await?;
        Ok(())
    }
}
