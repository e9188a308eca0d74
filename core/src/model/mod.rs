use std::collections::HashSet;
use std::fmt;

use eyre::{eyre, Result};
use lazy_static::lazy_static;
use serde::Serialize;
use strum::{Display, EnumString};

lazy_static! {
    /// Lowercase extensions the pipelines accept as video input.
    pub static ref VIDEO_EXTENSIONS: HashSet<&'static str> =
        ["mp4", "mov", "avi", "mkv", "webm"].into_iter().collect();
}

pub fn is_video_file(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| VIDEO_EXTENSIONS.contains(ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Bucket-relative location of a video object:
/// `<category>[/<subfolder>...]/<filename>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteVideoPath {
    pub dir: String,
    pub filename: String,
}

impl RemoteVideoPath {
    pub fn new(dir: impl Into<String>, filename: impl Into<String>) -> RemoteVideoPath {
        RemoteVideoPath {
            dir: dir.into(),
            filename: filename.into(),
        }
    }

    pub fn parse(path: &str) -> Result<RemoteVideoPath> {
        let path = path.trim_matches('/');
        match path.rsplit_once('/') {
            Some((dir, filename)) if !dir.is_empty() && !filename.is_empty() => {
                Ok(RemoteVideoPath {
                    dir: dir.to_owned(),
                    filename: filename.to_owned(),
                })
            }
            _ => Err(eyre!(
                "remote video path must be of the form category/.../filename: '{}'",
                path
            )),
        }
    }

    /// Top-level classification, the first path segment.
    pub fn category(&self) -> &str {
        self.dir.split('/').next().expect("split yields at least one element")
    }

    /// Filename without its extension, used to name the HLS folder.
    pub fn basename(&self) -> &str {
        self.filename
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(&self.filename)
    }
}

impl fmt::Display for RemoteVideoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.dir, self.filename)
    }
}

/// Codec family reported by the probe tool. Anything the probe cannot
/// identify maps to `Unknown`, which downstream decisions treat
/// conservatively.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VideoCodec {
    H264,
    Hevc,
    Vp9,
    Av1,
    Mpeg4,
    Other(String),
    Unknown,
}

impl VideoCodec {
    pub fn from_codec_name(name: &str) -> VideoCodec {
        match name {
            "h264" | "avc1" => VideoCodec::H264,
            "hevc" | "h265" | "hvc1" => VideoCodec::Hevc,
            "vp9" => VideoCodec::Vp9,
            "av1" => VideoCodec::Av1,
            "mpeg4" => VideoCodec::Mpeg4,
            other => VideoCodec::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoCodec::H264 => write!(f, "h264"),
            VideoCodec::Hevc => write!(f, "hevc"),
            VideoCodec::Vp9 => write!(f, "vp9"),
            VideoCodec::Av1 => write!(f, "av1"),
            VideoCodec::Mpeg4 => write!(f, "mpeg4"),
            VideoCodec::Other(name) => write!(f, "{}", name),
            VideoCodec::Unknown => write!(f, "unknown"),
        }
    }
}

/// How HLS segments are containered. The manifest is the only
/// consumer-visible difference: `.ts` segments, or `.m4s` fragments with a
/// shared `init.mp4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentFormat {
    MpegTs,
    Fmp4,
}

impl SegmentFormat {
    /// HEVC, VP9 and AV1 cannot be carried in transport-stream segments by
    /// the players we target, so those families get fragmented MP4.
    pub fn for_codec(codec: &VideoCodec) -> SegmentFormat {
        match codec {
            VideoCodec::Hevc | VideoCodec::Vp9 | VideoCodec::Av1 => SegmentFormat::Fmp4,
            VideoCodec::H264
            | VideoCodec::Mpeg4
            | VideoCodec::Other(_)
            | VideoCodec::Unknown => SegmentFormat::MpegTs,
        }
    }
}

/// Quality tier for the hardware H.265 re-encode. Each tier fixes the
/// encoder's constant-quality parameter and a bitrate ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum QualityTier {
    Quality,
    Balanced,
    Compact,
}

impl QualityTier {
    pub fn cq(self) -> i32 {
        match self {
            QualityTier::Quality => 23,
            QualityTier::Balanced => 28,
            QualityTier::Compact => 32,
        }
    }

    pub fn max_bitrate(self) -> &'static str {
        match self {
            QualityTier::Quality => "8M",
            QualityTier::Balanced => "5M",
            QualityTier::Compact => "3M",
        }
    }
}

/// Registration record sent to the index service for one asset.
/// `hls` is present iff an HLS rendition exists for the asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisterFile {
    pub path: String,
    pub name: String,
    pub size: u64,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hls: Option<String>,
}
