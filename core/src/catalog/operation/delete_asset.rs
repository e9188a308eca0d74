use eyre::{Context, Result};
use tracing::{instrument, warn};

use super::StepLog;
use crate::{catalog::storage_key, model::RemoteVideoPath, remote::rclone::ObjectStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteAsset {
    pub remote_path: RemoteVideoPath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedDeleteAsset {
    pub remote_path: RemoteVideoPath,
    pub hls_removed: bool,
    pub thumbnail_removed: bool,
}

/// Remove a video object together with its derived artifacts. Only the
/// video deletion decides success: HLS folder and thumbnail may
/// legitimately not exist, so their failures are logged and carried in the
/// result instead.
#[instrument(skip(store, log), fields(file = %op.remote_path))]
pub async fn perform_delete_asset(
    store: &impl ObjectStore,
    op: &DeleteAsset,
    log: &StepLog,
) -> Result<CompletedDeleteAsset> {
    let video_key = storage_key::video_file(&op.remote_path);
    log.msg("Deleting video object...");
    // all three removals are attempted independently; only the video
    // result decides the item's outcome
    let video_result = store.delete_file(&video_key).await;

    let hls_removed = match store.purge(&storage_key::hls_dir(&op.remote_path)).await {
        Ok(()) => true,
        Err(err) => {
            warn!("Error purging HLS folder: {}", err);
            log.msg("No HLS folder removed");
            false
        }
    };
    let thumbnail_removed = match store
        .delete_file(&storage_key::thumbnail(&op.remote_path))
        .await
    {
        Ok(()) => true,
        Err(err) => {
            warn!("Error deleting thumbnail: {}", err);
            log.msg("No thumbnail removed");
            false
        }
    };

    video_result.wrap_err("could not delete video object")?;
    Ok(CompletedDeleteAsset {
        remote_path: op.remote_path.clone(),
        hls_removed,
        thumbnail_removed,
    })
}
