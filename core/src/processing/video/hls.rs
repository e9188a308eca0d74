use std::ffi::OsString;

use camino::{Utf8Path as Path, Utf8PathBuf as PathBuf};
use eyre::{eyre, Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::ffmpeg::FFmpeg;
use crate::model::{SegmentFormat, VideoCodec};

/// Target duration per segment. The last segment of a rendition is shorter.
pub const SEGMENT_SECONDS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HlsOutput {
    pub dir: PathBuf,
    pub manifest: PathBuf,
    pub segment_count: usize,
}

pub fn hls_flags(format: SegmentFormat, out_dir: &Path) -> Vec<OsString> {
    let mut flags: Vec<OsString> = vec![
        "-c:v".into(),
        "copy".into(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        "128k".into(),
        "-hls_time".into(),
        SEGMENT_SECONDS.to_string().into(),
        // non-live manifest: keep every segment in the playlist
        "-hls_list_size".into(),
        "0".into(),
    ];
    match format {
        SegmentFormat::MpegTs => {
            flags.push("-hls_segment_filename".into());
            flags.push(out_dir.join("seg_%03d.ts").into_string().into());
        }
        SegmentFormat::Fmp4 => {
            flags.push("-hls_segment_type".into());
            flags.push("fmp4".into());
            flags.push("-hls_fmp4_init_filename".into());
            flags.push("init.mp4".into());
            flags.push("-hls_segment_filename".into());
            flags.push(out_dir.join("seg_%03d.m4s").into_string().into());
        }
    }
    flags.push("-f".into());
    flags.push("hls".into());
    flags
}

/// Filenames containing characters the invocation layer could misread as
/// argument delimiters are staged under a neutral name before conversion.
pub fn needs_staging(filename: &str) -> bool {
    filename.starts_with('-')
        || filename
            .chars()
            .any(|c| matches!(c, ',' | ';' | ':' | '\'' | '"'))
}

/// A copy (hard link where possible) of an unsafe-named input under a
/// neutral name, removed when dropped whether or not conversion succeeded.
#[derive(Debug)]
pub struct StagedInput {
    path: PathBuf,
}

impl StagedInput {
    pub fn stage(input: &Path, dir: &Path) -> Result<StagedInput> {
        let extension = input.extension().unwrap_or("mp4");
        let path = dir.join(format!("input.{}", extension));
        if path.exists() {
            std::fs::remove_file(&path).wrap_err("could not clear old staged input")?;
        }
        if std::fs::hard_link(input, &path).is_err() {
            std::fs::copy(input, &path).wrap_err("could not stage input file")?;
        }
        debug!(from = %input, to = %path, "Staged input under neutral name");
        Ok(StagedInput { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedInput {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            warn!("Error removing staged input {}: {}", self.path, err);
        }
    }
}

/// Rewrite manifest entries that leaked filesystem paths out of the
/// encoding step. Segment and init-segment references must be bare
/// filenames resolvable relative to the manifest itself. Returns `None`
/// when the manifest needed no changes.
pub fn rewrite_manifest(contents: &str) -> Option<String> {
    let mut changed = false;
    let lines: Vec<String> = contents
        .lines()
        .map(|line| match rewrite_manifest_line(line) {
            Some(rewritten) => {
                changed = true;
                rewritten
            }
            None => line.to_owned(),
        })
        .collect();
    if !changed {
        return None;
    }
    let mut rewritten = lines.join("\n");
    if contents.ends_with('\n') {
        rewritten.push('\n');
    }
    Some(rewritten)
}

fn rewrite_manifest_line(line: &str) -> Option<String> {
    if line.starts_with("#EXT-X-MAP:") {
        // some encoders write the init segment URI as the absolute path it
        // was created under
        let uri_start = line.find("URI=\"")? + "URI=\"".len();
        let uri_end = uri_start + line[uri_start..].find('"')?;
        let uri = &line[uri_start..uri_end];
        let bare = uri.rsplit('/').next().expect("rsplit yields at least one element");
        if bare == uri {
            return None;
        }
        let mut rewritten = String::with_capacity(line.len());
        rewritten.push_str(&line[..uri_start]);
        rewritten.push_str(bare);
        rewritten.push_str(&line[uri_end..]);
        return Some(rewritten);
    }
    if !line.starts_with('#') && !line.trim().is_empty() && line.contains('/') {
        let bare = line.rsplit('/').next().expect("rsplit yields at least one element");
        return Some(bare.to_owned());
    }
    None
}

/// Convert a local video into an HLS rendition in `out_dir`: manifest
/// `index.m3u8` plus segments. The segmentation container is chosen from
/// the codec family.
#[instrument(skip(ffmpeg_bin_path, cancel))]
pub async fn convert_to_hls(
    input: &Path,
    out_dir: &Path,
    codec: &VideoCodec,
    ffmpeg_bin_path: Option<&Path>,
    cancel: &CancellationToken,
) -> Result<HlsOutput> {
    tokio::fs::create_dir_all(out_dir)
        .await
        .wrap_err("could not create HLS output directory")?;
    let format = SegmentFormat::for_codec(codec);
    // staged inputs live next to the output dir, never inside it, so they
    // are not swept up into the uploaded artifact set
    let staging_dir = out_dir
        .parent()
        .ok_or_else(|| eyre!("HLS output directory must have a parent"))?;
    let staged = match input.file_name() {
        Some(name) if needs_staging(name) => Some(StagedInput::stage(input, staging_dir)?),
        _ => None,
    };
    let effective_input = staged.as_ref().map(|s| s.path()).unwrap_or(input);

    let manifest = out_dir.join("index.m3u8");
    let ffmpeg = FFmpeg::new(vec![], hls_flags(format, out_dir));
    let run_result = ffmpeg
        .run(effective_input, &manifest, ffmpeg_bin_path, cancel)
        .await;
    drop(staged);
    run_result?;

    if !manifest.exists() {
        return Err(eyre!("HLS conversion produced no manifest despite tool success"));
    }
    let contents = tokio::fs::read_to_string(&manifest)
        .await
        .wrap_err("could not read produced manifest")?;
    if let Some(rewritten) = rewrite_manifest(&contents) {
        tokio::fs::write(&manifest, rewritten)
            .await
            .wrap_err("could not rewrite manifest")?;
    }
    let segment_count = count_segments(out_dir)?;
    Ok(HlsOutput {
        dir: out_dir.to_owned(),
        manifest,
        segment_count,
    })
}

fn count_segments(out_dir: &Path) -> Result<usize> {
    let entries = out_dir
        .read_dir_utf8()
        .wrap_err("could not read HLS output directory")?;
    let mut count = 0;
    for entry in entries {
        let entry = entry.wrap_err("could not read HLS output directory")?;
        match entry.path().extension() {
            Some("ts") | Some("m4s") => count += 1,
            _ => {}
        }
    }
    Ok(count)
}
