use std::ffi::OsString;

use camino::Utf8Path as Path;
use eyre::{eyre, Result};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::ffmpeg::FFmpeg;
use crate::model::{QualityTier, VideoCodec};

/// Codec family the hardware re-encode produces. When a compressed output
/// is kept, segmentation decisions use this instead of the probed source
/// codec.
pub const COMPRESS_TARGET_CODEC: VideoCodec = VideoCodec::Hevc;

/// Compression is only worth attempting above the skip threshold,
/// regardless of codec. Sources at or below it count as already optimized.
pub fn compression_worthwhile(source_size: u64, skip_at_or_below: u64) -> bool {
    source_size > skip_at_or_below
}

/// Compression must never regress size: an output that is not strictly
/// smaller than its input is discarded.
pub fn keep_compressed_output(source_size: u64, compressed_size: u64) -> bool {
    compressed_size < source_size
}

pub fn compress_flags(tier: QualityTier) -> Vec<OsString> {
    vec![
        "-c:v".into(),
        "hevc_nvenc".into(),
        "-preset".into(),
        "p5".into(),
        "-rc".into(),
        "vbr".into(),
        "-cq".into(),
        tier.cq().to_string().into(),
        "-b:v".into(),
        "0".into(),
        "-maxrate".into(),
        tier.max_bitrate().into(),
        "-c:a".into(),
        "copy".into(),
        "-tag:v".into(),
        "hvc1".into(),
    ]
}

/// Re-encode with the hardware H.265 encoder at the requested tier. The
/// caller decides whether the output is kept (see
/// [`keep_compressed_output`]).
#[instrument(skip(ffmpeg_bin_path, cancel))]
pub async fn compress(
    input: &Path,
    output: &Path,
    tier: QualityTier,
    ffmpeg_bin_path: Option<&Path>,
    cancel: &CancellationToken,
) -> Result<()> {
    let ffmpeg = FFmpeg::new(vec![], compress_flags(tier));
    ffmpeg.run(input, output, ffmpeg_bin_path, cancel).await?;
    if !output.exists() {
        return Err(eyre!("compression produced no output despite tool success"));
    }
    Ok(())
}
