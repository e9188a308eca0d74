use std::{ffi::OsString, process::Stdio};

use camino::Utf8Path as Path;
use eyre::{eyre, Context, Result};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::processing::process_control::{run_process, ProcessResult};

#[derive(thiserror::Error, Debug)]
pub enum FFmpegError {
    #[error("Error starting FFmpeg")]
    ErrorStarting,
    #[error("FFmpeg run was cancelled")]
    Cancelled,
}

pub struct FFmpeg {
    pre_input_flags: Vec<OsString>,
    flags: Vec<OsString>,
}

impl FFmpeg {
    pub fn new(pre_input_flags: Vec<OsString>, flags: Vec<OsString>) -> Self {
        Self {
            pre_input_flags,
            flags,
        }
    }

    #[instrument(err, name = "ffmpeg", skip(self, cancel))]
    pub async fn run(
        &self,
        input: &Path,
        output: &Path,
        ffmpeg_bin_path: Option<&Path>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut command = Command::new(ffmpeg_bin_path.unwrap_or("ffmpeg".into()));
        command
            .arg("-nostdin")
            .arg("-y")
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        command.args(self.pre_input_flags.iter());
        command.arg("-i").arg(input);
        command.args(self.flags.iter());
        command.arg(output);
        debug!(command = ?command.as_std(), "Invoking ffmpeg");
        let child = command.spawn().wrap_err(FFmpegError::ErrorStarting)?;
        match run_process(child, cancel).await? {
            ProcessResult::RanToEnd(output) if output.status.success() => Ok(()),
            ProcessResult::RanToEnd(_output) => Err(eyre!("ffmpeg exited with an error")),
            ProcessResult::Cancelled => Err(FFmpegError::Cancelled.into()),
        }
    }
}
