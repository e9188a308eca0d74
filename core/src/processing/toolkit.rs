use async_trait::async_trait;
use camino::Utf8Path as Path;
use eyre::Result;
use tokio_util::sync::CancellationToken;

use super::{image, video};
use crate::{
    config::BinPaths,
    model::{QualityTier, VideoCodec},
    processing::video::hls::HlsOutput,
    util::OptionPathExt,
};

/// The single boundary through which the pipelines reach the multimedia
/// tool. Substituted with fakes in tests.
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Never fails; probe errors map to [`VideoCodec::Unknown`].
    async fn probe_codec(&self, path: &Path) -> VideoCodec;
    async fn extract_thumbnail(&self, video: &Path, output: &Path) -> Result<()>;
    async fn convert_to_hls(
        &self,
        input: &Path,
        out_dir: &Path,
        codec: &VideoCodec,
    ) -> Result<HlsOutput>;
    async fn compress(&self, input: &Path, output: &Path, tier: QualityTier) -> Result<()>;
}

pub struct FfmpegToolkit {
    bin_paths: Option<BinPaths>,
    cancel: CancellationToken,
}

impl FfmpegToolkit {
    pub fn new(bin_paths: Option<BinPaths>, cancel: CancellationToken) -> Self {
        Self { bin_paths, cancel }
    }

    fn ffmpeg_path(&self) -> Option<&Path> {
        self.bin_paths.as_ref().and_then(|bp| bp.ffmpeg.as_opt_path())
    }

    fn ffprobe_path(&self) -> Option<&Path> {
        self.bin_paths.as_ref().and_then(|bp| bp.ffprobe.as_opt_path())
    }
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn probe_codec(&self, path: &Path) -> VideoCodec {
        video::ffprobe::probe_video_codec(path, self.ffprobe_path()).await
    }

    async fn extract_thumbnail(&self, video: &Path, output: &Path) -> Result<()> {
        image::ffmpeg_snapshot(video, output, self.ffmpeg_path(), &self.cancel).await
    }

    async fn convert_to_hls(
        &self,
        input: &Path,
        out_dir: &Path,
        codec: &VideoCodec,
    ) -> Result<HlsOutput> {
        video::hls::convert_to_hls(input, out_dir, codec, self.ffmpeg_path(), &self.cancel).await
    }

    async fn compress(&self, input: &Path, output: &Path, tier: QualityTier) -> Result<()> {
        video::compress::compress(input, output, tier, self.ffmpeg_path(), &self.cancel).await
    }
}
