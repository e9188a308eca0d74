//! Bucket-relative keys for every artifact derived from a video asset.

use crate::model::RemoteVideoPath;

pub fn video_file(path: &RemoteVideoPath) -> String {
    format!("{}/{}", path.dir, path.filename)
}

/// Folder holding one asset's entire HLS rendition. Purged as a unit when
/// the asset is deleted.
pub fn hls_dir(path: &RemoteVideoPath) -> String {
    format!("{}/hls/{}", path.dir, path.basename())
}

pub fn hls_manifest(path: &RemoteVideoPath) -> String {
    format!("{}/index.m3u8", hls_dir(path))
}

pub fn thumbnail(path: &RemoteVideoPath) -> String {
    format!("thumbnails/{}/{}.jpg", path.dir, path.filename)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn keys_derived_from_asset_path() {
        let path = RemoteVideoPath::new("sermons/2024", "easter.mp4");
        assert_eq!(video_file(&path), "sermons/2024/easter.mp4");
        assert_eq!(hls_dir(&path), "sermons/2024/hls/easter");
        assert_eq!(hls_manifest(&path), "sermons/2024/hls/easter/index.m3u8");
        assert_eq!(thumbnail(&path), "thumbnails/sermons/2024/easter.mp4.jpg");
    }
}
