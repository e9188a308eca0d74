pub mod convert_remote;
pub mod delete_asset;
pub mod upload_asset;

use tokio::sync::mpsc;

/// Step-level progress messages surfaced to the presentation layer while
/// an operation runs. Dropping messages is fine (the receiver may be
/// gone); diagnostics go through `tracing` separately.
#[derive(Debug, Clone)]
pub struct StepLog {
    send: Option<mpsc::UnboundedSender<String>>,
}

impl StepLog {
    pub fn new(send: mpsc::UnboundedSender<String>) -> Self {
        Self { send: Some(send) }
    }

    pub fn disabled() -> Self {
        Self { send: None }
    }

    pub fn msg(&self, text: impl Into<String>) {
        if let Some(send) = &self.send {
            let _ = send.send(text.into());
        }
    }
}
