use camino::Utf8PathBuf as PathBuf;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

use super::batch::{forward_step_log, BatchEvent, BatchHandle, BatchSummary};
use crate::{
    catalog::operation::{
        upload_asset::{perform_upload_asset, UploadAsset},
        StepLog,
    },
    model::QualityTier,
    processing::toolkit::MediaToolkit,
    remote::{index::IndexApi, rclone::ObjectStore},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadBatch {
    pub files: Vec<PathBuf>,
    /// Remote directory (`category[/subfolder...]`) all files land in.
    pub remote_dir: String,
    pub compress: Option<QualityTier>,
    pub thumbnail: bool,
    pub sync_when_done: bool,
}

/// Spawn the background worker for one upload batch. Files are processed
/// strictly sequentially: each file's transcode and transfer are heavy
/// enough that inter-file parallelism would exhaust disk, encoder
/// sessions and bandwidth.
pub fn start_upload_batch<S, M, I>(
    store: S,
    toolkit: M,
    index: I,
    compress_skip_below: u64,
    batch: UploadBatch,
    cancel: CancellationToken,
) -> BatchHandle
where
    S: ObjectStore + 'static,
    M: MediaToolkit + 'static,
    I: IndexApi + 'static,
{
    let (events_send, events_recv) = mpsc::unbounded_channel();
    let task_cancel = cancel.clone();
    let join = tokio::task::spawn(
        async move {
            let log = StepLog::new(forward_step_log(events_send.clone()));
            let total = batch.files.len();
            let mut summary = BatchSummary::default();
            info!("Starting upload batch: {} files -> {}", total, batch.remote_dir);
            for (i, file) in batch.files.iter().enumerate() {
                if task_cancel.is_cancelled() {
                    summary.cancelled = true;
                    break;
                }
                let name = file.file_name().unwrap_or(file.as_str()).to_owned();
                let _ = events_send.send(BatchEvent::FileStarted {
                    index: i + 1,
                    total,
                    name: name.clone(),
                });
                let op = UploadAsset {
                    local_path: file.clone(),
                    remote_dir: batch.remote_dir.clone(),
                    compress: batch.compress,
                    thumbnail: batch.thumbnail,
                };
                let result = perform_upload_asset(
                    &store,
                    &toolkit,
                    &index,
                    &op,
                    compress_skip_below,
                    &log,
                )
                .await;
                match result {
                    Ok(_done) => {
                        summary.succeeded += 1;
                        let _ = events_send.send(BatchEvent::FileDone {
                            name,
                            result: Ok(()),
                        });
                    }
                    Err(report) => {
                        if task_cancel.is_cancelled() {
                            summary.cancelled = true;
                            break;
                        }
                        error!("Error uploading {}:\n{:?}", name, report);
                        summary.failed += 1;
                        let _ = events_send.send(BatchEvent::FileDone {
                            name,
                            result: Err(report),
                        });
                    }
                }
            }
            if batch.sync_when_done && summary.succeeded > 0 && !summary.cancelled {
                let _ = events_send.send(BatchEvent::SyncStarted);
                let sync_result = index.sync().await;
                let _ = events_send.send(BatchEvent::SyncDone(sync_result));
            }
            let _ = events_send.send(BatchEvent::BatchDone(summary));
            summary
        }
        .instrument(info_span!("upload_batch")),
    );
    BatchHandle::new(events_recv, cancel, join)
}
