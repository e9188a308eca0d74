use std::process::Stdio;

use camino::Utf8Path as Path;
use tokio::process::Command;

use crate::{config::BinPaths, util::OptionPathExt};

/// Check that every external tool the pipelines depend on can actually be
/// started before any batch work begins.
pub async fn run_self_check(bin_paths: Option<&BinPaths>) -> Result<(), ()> {
    let rclone_bin_path = bin_paths.and_then(|bp| bp.rclone.as_opt_path());
    check_can_run("rclone", rclone_bin_path, "--version").await?;
    let ffmpeg_bin_path = bin_paths.and_then(|bp| bp.ffmpeg.as_opt_path());
    check_can_run("ffmpeg", ffmpeg_bin_path, "-version").await?;
    let ffprobe_bin_path = bin_paths.and_then(|bp| bp.ffprobe.as_opt_path());
    check_can_run("ffprobe", ffprobe_bin_path, "-version").await?;
    Ok(())
}

async fn check_can_run(
    name: &str,
    bin_path: Option<&Path>,
    version_flag: &str,
) -> Result<(), ()> {
    let spawn_result = Command::new(bin_path.map(|p| p.as_str()).unwrap_or(name))
        .arg(version_flag)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn();
    let child = match spawn_result {
        Ok(c) => c,
        Err(err) => match err.kind() {
            std::io::ErrorKind::NotFound => {
                if let Some(path) = bin_path {
                    tracing::error!("Could not find {} at path from config: {}", name, path);
                } else {
                    tracing::error!("Could not find {}. Is it installed?", name);
                }
                return Err(());
            }
            _kind => {
                tracing::error!("Error running {}: {}", name, err);
                return Err(());
            }
        },
    };
    let output = match child.wait_with_output().await {
        Ok(o) => o,
        Err(err) => {
            tracing::error!(
                "{} test failed, error waiting for {} process: {}",
                name,
                name,
                err
            );
            return Err(());
        }
    };
    if !output.status.success() {
        tracing::error!(
            "{} test failed, error running {}:\n{}",
            name,
            name,
            String::from_utf8_lossy(&output.stderr)
        );
        return Err(());
    }
    tracing::debug!("ok: can run {}", name);
    Ok(())
}
