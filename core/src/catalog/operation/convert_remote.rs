use eyre::{eyre, Context, Result};
use tracing::{instrument, warn};

use super::StepLog;
use crate::{
    catalog::storage_key,
    model::{is_video_file, RemoteVideoPath},
    processing::{toolkit::MediaToolkit, workdir::WorkDir},
    remote::rclone::ObjectStore,
};

/// Convert an already-uploaded video into an HLS rendition: download,
/// segment, upload the rendition, optionally delete the original object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertRemote {
    pub remote_path: RemoteVideoPath,
    pub delete_original: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedConvertRemote {
    pub remote_path: RemoteVideoPath,
    pub hls_manifest: String,
    pub segment_count: usize,
    pub deleted_original: bool,
}

/// Files eligible for conversion out of a recursive remote listing: video
/// files that are not themselves HLS artifacts (segments, manifests, or
/// anything below an `hls/` folder such as init segments).
pub fn filter_convertible(files: &[String]) -> Vec<String> {
    files
        .iter()
        .filter(|file| {
            is_video_file(file)
                && !file.contains(".m3u8")
                && !file.contains("seg_")
                && !file.split('/').any(|component| component == "hls")
        })
        .cloned()
        .collect()
}

#[instrument(skip(store, toolkit, log), fields(file = %op.remote_path))]
pub async fn perform_convert_remote(
    store: &impl ObjectStore,
    toolkit: &impl MediaToolkit,
    op: &ConvertRemote,
    log: &StepLog,
) -> Result<CompletedConvertRemote> {
    let video_key = storage_key::video_file(&op.remote_path);
    let workdir = WorkDir::create(&video_key)?;

    log.msg("Downloading...");
    store
        .download(&video_key, workdir.path())
        .await
        .wrap_err("could not download video")?;
    let local = workdir.join(&op.remote_path.filename);
    if !local.exists() {
        // zero exit but nothing on disk: treat like a tool failure
        return Err(eyre!("download produced no file despite tool success"));
    }
    let size = std::fs::metadata(&local)
        .wrap_err("could not stat downloaded video")?
        .len();
    log.msg(format!("Downloaded ({}MB)", size / (1024 * 1024)));

    log.msg("Converting to HLS...");
    let codec = toolkit.probe_codec(&local).await;
    let hls = toolkit
        .convert_to_hls(&local, &workdir.join("hls"), &codec)
        .await
        .wrap_err("could not convert to HLS")?;
    log.msg(format!(
        "HLS conversion done ({} segments)",
        hls.segment_count
    ));

    log.msg("Uploading HLS segments...");
    store
        .upload_dir(&hls.dir, &storage_key::hls_dir(&op.remote_path))
        .await
        .wrap_err("could not upload HLS rendition")?;

    let deleted_original = if op.delete_original {
        log.msg("Deleting original video object...");
        match store.delete_file(&video_key).await {
            Ok(()) => true,
            Err(err) => {
                warn!("Error deleting original video object: {}", err);
                log.msg("Could not delete original, remove it manually");
                false
            }
        }
    } else {
        false
    };

    Ok(CompletedConvertRemote {
        remote_path: op.remote_path.clone(),
        hls_manifest: storage_key::hls_manifest(&op.remote_path),
        segment_count: hls.segment_count,
        deleted_original,
    })
}
