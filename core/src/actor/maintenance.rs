use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

use super::batch::{forward_step_log, BatchEvent, BatchHandle, BatchSummary};
use crate::{
    catalog::operation::{
        delete_asset::{perform_delete_asset, DeleteAsset},
        StepLog,
    },
    model::RemoteVideoPath,
    remote::{index::IndexApi, rclone::ObjectStore},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteBatch {
    pub files: Vec<RemoteVideoPath>,
}

/// Spawn the background worker removing assets and their derived
/// artifacts. After the whole selection is processed a full index resync
/// runs unconditionally, so the index stops listing whatever was removed.
pub fn start_delete_batch<S, I>(
    store: S,
    index: I,
    batch: DeleteBatch,
    cancel: CancellationToken,
) -> BatchHandle
where
    S: ObjectStore + 'static,
    I: IndexApi + 'static,
{
    let (events_send, events_recv) = mpsc::unbounded_channel();
    let task_cancel = cancel.clone();
    let join = tokio::task::spawn(
        async move {
            let log = StepLog::new(forward_step_log(events_send.clone()));
            let total = batch.files.len();
            let mut summary = BatchSummary::default();
            info!("Starting deletion batch: {} files", total);
            for (i, file) in batch.files.iter().enumerate() {
                if task_cancel.is_cancelled() {
                    summary.cancelled = true;
                    break;
                }
                let name = file.to_string();
                let _ = events_send.send(BatchEvent::FileStarted {
                    index: i + 1,
                    total,
                    name: name.clone(),
                });
                let op = DeleteAsset {
                    remote_path: file.clone(),
                };
                match perform_delete_asset(&store, &op, &log).await {
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
                        error!("Error deleting {}:\n{:?}", name, report);
                        summary.failed += 1;
                        let _ = events_send.send(BatchEvent::FileDone {
                            name,
                            result: Err(report),
                        });
                    }
                }
            }
            let _ = events_send.send(BatchEvent::SyncStarted);
            let sync_result = index.sync().await;
            let _ = events_send.send(BatchEvent::SyncDone(sync_result));
            let _ = events_send.send(BatchEvent::BatchDone(summary));
            summary
        }
        .instrument(info_span!("delete_batch")),
    );
    BatchHandle::new(events_recv, cancel, join)
}
