use std::process::Stdio;

use camino::Utf8Path as Path;
use eyre::{eyre, Context, Result};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::process_control::{run_process, ProcessResult};

const SNAPSHOT_TIMESTAMP: &str = "00:00:01";
const SNAPSHOT_WIDTH: u32 = 480;

/// Extract a single still frame as a thumbnail image.
#[instrument(skip(ffmpeg_bin_path, cancel))]
pub async fn ffmpeg_snapshot(
    video_path: &Path,
    output: &Path,
    ffmpeg_bin_path: Option<&Path>,
    cancel: &CancellationToken,
) -> Result<()> {
    let child = Command::new(ffmpeg_bin_path.unwrap_or("ffmpeg".into()))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .arg("-nostdin")
        .arg("-y")
        .args(["-ss", SNAPSHOT_TIMESTAMP])
        .arg("-i")
        .arg(video_path)
        .args(["-frames:v", "1"])
        .arg("-vf")
        .arg(format!("scale={}:-1", SNAPSHOT_WIDTH))
        .args(["-q:v", "3"])
        .arg(output)
        .spawn()
        .wrap_err("failed to call ffmpeg")?;
    match run_process(child, cancel).await? {
        ProcessResult::RanToEnd(tool_output) if tool_output.status.success() => {
            if !output.exists() {
                return Err(eyre!("snapshot produced no image despite tool success"));
            }
            Ok(())
        }
        ProcessResult::RanToEnd(_) => Err(eyre!(
            "error taking video snapshot: ffmpeg exited with non-zero code"
        )),
        ProcessResult::Cancelled => Err(eyre!("video snapshot was cancelled")),
    }
}
