use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

use super::batch::{forward_step_log, BatchEvent, BatchHandle, BatchSummary};
use crate::{
    catalog::operation::{
        convert_remote::{perform_convert_remote, ConvertRemote},
        StepLog,
    },
    model::RemoteVideoPath,
    processing::toolkit::MediaToolkit,
    remote::{index::IndexApi, rclone::ObjectStore},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertBatch {
    pub files: Vec<RemoteVideoPath>,
    pub delete_original: bool,
    pub sync_when_done: bool,
}

/// Spawn the background worker converting already-uploaded videos to HLS,
/// one at a time.
pub fn start_convert_batch<S, M, I>(
    store: S,
    toolkit: M,
    index: I,
    batch: ConvertBatch,
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
            info!("Starting HLS conversion batch: {} files", total);
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
                let op = ConvertRemote {
                    remote_path: file.clone(),
                    delete_original: batch.delete_original,
                };
                match perform_convert_remote(&store, &toolkit, &op, &log).await {
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
                        error!("Error converting {}:\n{:?}", name, report);
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
        .instrument(info_span!("convert_batch")),
    );
    BatchHandle::new(events_recv, cancel, join)
}
