use std::process::Output;

use eyre::{Context, Result};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub enum ProcessResult {
    RanToEnd(Output),
    Cancelled,
}

/// Run a child process to completion while listening for cancellation.
/// On cancellation the child is killed and its exit awaited, so no zombie
/// is left behind. Captured stdout/stderr are returned if the caller piped
/// them; otherwise the corresponding buffers are empty.
pub async fn run_process(
    mut child: tokio::process::Child,
    cancel: &CancellationToken,
) -> Result<ProcessResult> {
    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();
    // Both pipes are drained concurrently with the wait, so a chatty child
    // cannot deadlock on a full pipe buffer.
    let drain = tokio::task::spawn(async move {
        let out_fut = async {
            let mut buf = Vec::new();
            if let Some(stdout) = stdout.as_mut() {
                let _ = stdout.read_to_end(&mut buf).await;
            }
            buf
        };
        let err_fut = async {
            let mut buf = Vec::new();
            if let Some(stderr) = stderr.as_mut() {
                let _ = stderr.read_to_end(&mut buf).await;
            }
            buf
        };
        tokio::join!(out_fut, err_fut)
    });
    let status = tokio::select! {
        status = child.wait() => {
            status.wrap_err("error waiting for child process")?
        }
        _ = cancel.cancelled() => {
            if let Err(err) = child.start_kill() {
                tracing::error!("Error killing child process: {}", err);
            }
            let _ = child.wait().await;
            drain.abort();
            return Ok(ProcessResult::Cancelled);
        }
    };
    let (stdout, stderr) = drain.await.unwrap_or_default();
    Ok(ProcessResult::RanToEnd(Output {
        status,
        stdout,
        stderr,
    }))
}
