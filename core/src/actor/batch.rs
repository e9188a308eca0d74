use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::remote::index::IndexError;

/// Progress reported by a batch worker to the presentation layer. Sent
/// over a channel; the worker never touches UI state directly.
#[derive(Debug)]
pub enum BatchEvent {
    FileStarted {
        /// 1-based position within the batch.
        index: usize,
        total: usize,
        name: String,
    },
    Log(String),
    FileDone {
        name: String,
        result: Result<(), eyre::Report>,
    },
    SyncStarted,
    SyncDone(Result<u64, IndexError>),
    BatchDone(BatchSummary),
}

/// The single source of truth reported to the operator at the end of a
/// batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// Handle to one running batch worker: its event stream, a cancellation
/// token checked between files (and killing in-flight tool processes), and
/// the final summary.
pub struct BatchHandle {
    pub events: mpsc::UnboundedReceiver<BatchEvent>,
    pub cancel: CancellationToken,
    join: tokio::task::JoinHandle<BatchSummary>,
}

impl BatchHandle {
    pub(crate) fn new(
        events: mpsc::UnboundedReceiver<BatchEvent>,
        cancel: CancellationToken,
        join: tokio::task::JoinHandle<BatchSummary>,
    ) -> Self {
        Self {
            events,
            cancel,
            join,
        }
    }

    pub async fn join(self) -> BatchSummary {
        self.join.await.expect("batch worker must not panic")
    }
}

/// Forward step-level log lines from an operation into the batch event
/// stream.
pub(crate) fn forward_step_log(
    events: mpsc::UnboundedSender<BatchEvent>,
) -> mpsc::UnboundedSender<String> {
    let (send, mut recv) = mpsc::unbounded_channel::<String>();
    tokio::task::spawn(async move {
        while let Some(message) = recv.recv().await {
            let _ = events.send(BatchEvent::Log(message));
        }
    });
    send
}
