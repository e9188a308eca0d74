use std::process::Stdio;

use camino::Utf8Path as Path;
use eyre::{Context, Result};
use serde::Deserialize;
use tokio::process::Command;
use tracing::{instrument, warn};

use crate::model::VideoCodec;

/// Probe the codec of a file's first video stream. Never fails: any probe
/// error maps to [`VideoCodec::Unknown`], which downstream decisions treat
/// conservatively.
#[instrument(skip(ffprobe_bin_path))]
pub async fn probe_video_codec(path: &Path, ffprobe_bin_path: Option<&Path>) -> VideoCodec {
    match ffprobe_codec_name(path, ffprobe_bin_path).await {
        Ok(Some(codec_name)) => VideoCodec::from_codec_name(&codec_name),
        Ok(None) => {
            warn!("no video stream found in file");
            VideoCodec::Unknown
        }
        Err(err) => {
            warn!("Error probing video codec: {:?}", err);
            VideoCodec::Unknown
        }
    }
}

async fn ffprobe_codec_name(path: &Path, ffprobe_bin_path: Option<&Path>) -> Result<Option<String>> {
    let ffprobe_result = Command::new(ffprobe_bin_path.unwrap_or("ffprobe".into()))
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=codec_name",
            "-of",
            "json",
        ])
        .arg(path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .wrap_err("failed to call ffprobe")?
        .wait_with_output()
        .await
        .wrap_err("ffprobe error")?;
    if !ffprobe_result.status.success() {
        return Err(eyre::eyre!(
            "ffprobe exited with an error: {}",
            String::from_utf8_lossy(&ffprobe_result.stderr)
        ));
    }
    parse_ffprobe_output(&ffprobe_result.stdout)
}

fn parse_ffprobe_output(json: &[u8]) -> Result<Option<String>> {
    #[derive(Debug, Clone, Deserialize)]
    struct FFProbeStream {
        pub codec_name: Option<String>,
    }
    #[derive(Debug, Clone, Deserialize)]
    struct FFProbeOutput {
        #[serde(default)]
        pub streams: Vec<FFProbeStream>,
    }

    let parsed: FFProbeOutput =
        serde_json::from_slice(json).wrap_err("could not parse ffprobe output")?;
    Ok(parsed
        .streams
        .into_iter()
        .find_map(|stream| stream.codec_name))
}
