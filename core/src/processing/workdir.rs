use camino::{Utf8Path as Path, Utf8PathBuf as PathBuf};
use eyre::{eyre, Context, Result};
use fasthash::sea;

/// Temporary working directory for processing one asset, removed on every
/// exit path.
///
/// The directory name is derived from the asset's identity by hashing, so
/// concurrent runs on different assets never collide and a rerun after an
/// aborted batch lands on the same directory, which is cleared before
/// reuse.
#[derive(Debug)]
pub struct WorkDir {
    path: PathBuf,
}

impl WorkDir {
    pub fn create(tag: &str) -> Result<WorkDir> {
        let temp_root = PathBuf::from_path_buf(std::env::temp_dir())
            .map_err(|p| eyre!("temp dir is not valid UTF-8: {}", p.display()))?;
        let path = temp_root.join(format!("wordbank_{:016x}", sea::hash64(tag.as_bytes())));
        if path.exists() {
            // stale leftovers from a previously aborted run
            std::fs::remove_dir_all(&path)
                .wrap_err("could not clear stale working directory")?;
        }
        std::fs::create_dir_all(&path).wrap_err("could not create working directory")?;
        Ok(WorkDir { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, name: impl AsRef<str>) -> PathBuf {
        self.path.join(name.as_ref())
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_dir_all(&self.path) {
            tracing::warn!("Error removing working directory {}: {}", self.path, err);
        }
    }
}
