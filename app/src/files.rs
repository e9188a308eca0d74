use camino::{Utf8Path as Path, Utf8PathBuf as PathBuf};
use eyre::{eyre, Context, Result};
use walkdir::WalkDir;
use wordbank_core::model::is_video_file;

/// Expand the user's selection into a flat, deduplicated list of video
/// files. Directories are walked recursively and filtered to known video
/// extensions; explicitly named files are taken as-is.
pub fn collect_video_files(paths: &[String]) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = Vec::new();
    for raw in paths {
        let path = Path::new(raw);
        if path.is_dir() {
            for entry in WalkDir::new(path.as_std_path()).sort_by_file_name() {
                let entry = entry.wrap_err("error walking directory")?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let entry_path = PathBuf::from_path_buf(entry.into_path())
                    .map_err(|p| eyre!("path is not valid UTF-8: {}", p.display()))?;
                let is_video = entry_path
                    .file_name()
                    .map(is_video_file)
                    .unwrap_or(false);
                if is_video && !files.contains(&entry_path) {
                    files.push(entry_path);
                }
            }
        } else if path.is_file() {
            let owned = path.to_owned();
            if !files.contains(&owned) {
                files.push(owned);
            }
        } else {
            return Err(eyre!("no such file or directory: {}", path));
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn directories_are_walked_and_filtered_to_videos() {
        let dir = tempfile::tempdir().unwrap();
        let root = Path::from_path(dir.path()).unwrap();
        std::fs::create_dir_all(root.join("nested")).unwrap();
        std::fs::write(root.join("a.mp4"), b"").unwrap();
        std::fs::write(root.join("notes.txt"), b"").unwrap();
        std::fs::write(root.join("nested/b.MKV"), b"").unwrap();

        let files = collect_video_files(&[root.to_string()]).unwrap();
        let names: Vec<&str> = files.iter().filter_map(|f| f.file_name()).collect();
        assert_eq!(names, vec!["a.mp4", "b.MKV"]);
    }

    #[test]
    fn explicit_files_are_not_listed_twice() {
        let dir = tempfile::tempdir().unwrap();
        let root = Path::from_path(dir.path()).unwrap();
        let video = root.join("a.mp4");
        std::fs::write(&video, b"").unwrap();

        let files =
            collect_video_files(&[video.to_string(), root.to_string()]).unwrap();
        assert_eq!(files, vec![video]);
    }

    #[test]
    fn missing_paths_are_an_error() {
        assert!(collect_video_files(&["/does/not/exist.mp4".to_owned()]).is_err());
    }
}
