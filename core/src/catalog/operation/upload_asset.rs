use camino::{Utf8Path as Path, Utf8PathBuf as PathBuf};
use eyre::{eyre, Context, Result};
use tracing::{instrument, warn};

use super::StepLog;
use crate::{
    catalog::storage_key,
    model::{QualityTier, RegisterFile, RemoteVideoPath, VideoCodec},
    processing::{
        toolkit::MediaToolkit,
        video::compress::{
            compression_worthwhile, keep_compressed_output, COMPRESS_TARGET_CODEC,
        },
        workdir::WorkDir,
    },
    remote::{index::IndexApi, rclone::ObjectStore},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadAsset {
    pub local_path: PathBuf,
    /// Remote directory (`category[/subfolder...]`) the video lands in.
    pub remote_dir: String,
    pub compress: Option<QualityTier>,
    pub thumbnail: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedUploadAsset {
    pub remote_path: RemoteVideoPath,
    /// Size of the object actually uploaded (compressed size if the
    /// compressed output was kept).
    pub size: u64,
    pub compressed: bool,
    pub hls_manifest: Option<String>,
    pub thumbnail: Option<String>,
    /// False when the upload completed but index registration failed; the
    /// next full resync reconciles the entry.
    pub registered: bool,
}

/// Everything the orchestrator decided to feed into HLS conversion:
/// which local file to treat as the video object and what codec it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
struct UploadSource {
    path: PathBuf,
    codec: VideoCodec,
    size: u64,
    compressed: bool,
}

/// Run the whole per-file pipeline: optional compression, HLS conversion,
/// uploads, optional thumbnail, index registration. Temporary artifacts
/// live in a per-asset working directory removed on every exit path.
///
/// Failure of this function marks the file failed; the surrounding batch
/// continues with the next file.
#[instrument(skip(store, toolkit, index, log), fields(file = %op.local_path))]
pub async fn perform_upload_asset(
    store: &impl ObjectStore,
    toolkit: &impl MediaToolkit,
    index: &impl IndexApi,
    op: &UploadAsset,
    compress_skip_below: u64,
    log: &StepLog,
) -> Result<CompletedUploadAsset> {
    let filename = op
        .local_path
        .file_name()
        .ok_or_else(|| eyre!("upload source has no filename: {}", op.local_path))?;
    let remote_path = RemoteVideoPath::new(op.remote_dir.trim_matches('/'), filename);
    let video_key = storage_key::video_file(&remote_path);
    let workdir = WorkDir::create(&video_key)?;

    let source_size = tokio::fs::metadata(&op.local_path)
        .await
        .wrap_err("could not stat upload source")?
        .len();
    let probed_codec = toolkit.probe_codec(&op.local_path).await;

    let source = match op.compress {
        Some(tier) => {
            compress_source(
                toolkit,
                &op.local_path,
                probed_codec,
                source_size,
                tier,
                compress_skip_below,
                &workdir,
                log,
            )
            .await
        }
        None => UploadSource {
            path: op.local_path.clone(),
            codec: probed_codec,
            size: source_size,
            compressed: false,
        },
    };

    log.msg("Converting to HLS...".to_owned());
    let hls = match toolkit
        .convert_to_hls(&source.path, &workdir.join("hls"), &source.codec)
        .await
    {
        Ok(output) => {
            log.msg(format!(
                "HLS conversion done ({} segments)",
                output.segment_count
            ));
            Some(output)
        }
        Err(report) => {
            // intentional degrade-gracefully policy: the asset simply has
            // no streaming rendition
            warn!("Error converting to HLS: {:?}", report);
            log.msg("HLS conversion failed, uploading original only");
            None
        }
    };

    log.msg("Uploading video...");
    if source.compressed {
        store
            .upload_to(&source.path, &video_key)
            .await
            .wrap_err("could not upload video")?;
    } else {
        store
            .upload(&source.path, &remote_path.dir)
            .await
            .wrap_err("could not upload video")?;
    }
    if let Some(hls) = &hls {
        log.msg("Uploading HLS segments...");
        store
            .upload_dir(&hls.dir, &storage_key::hls_dir(&remote_path))
            .await
            .wrap_err("could not upload HLS rendition")?;
    }

    let thumbnail = if op.thumbnail {
        upload_thumbnail(store, toolkit, &source.path, &remote_path, &workdir, log).await
    } else {
        None
    };

    let hls_manifest = hls.as_ref().map(|_| storage_key::hls_manifest(&remote_path));
    let file = RegisterFile {
        path: video_key,
        name: remote_path.filename.clone(),
        size: source.size,
        category: remote_path.category().to_owned(),
        hls: hls_manifest.clone(),
    };
    let registered = match index.register(&file).await {
        Ok(()) => true,
        Err(err) => {
            // the upload itself stands; the next resync picks the entry up
            warn!("Error registering file with index service: {}", err);
            log.msg(format!("Index registration failed: {}", err));
            false
        }
    };

    Ok(CompletedUploadAsset {
        remote_path,
        size: source.size,
        compressed: source.compressed,
        hls_manifest,
        thumbnail,
        registered,
    })
}

#[allow(clippy::too_many_arguments)]
async fn compress_source(
    toolkit: &impl MediaToolkit,
    local_path: &Path,
    probed_codec: VideoCodec,
    source_size: u64,
    tier: QualityTier,
    compress_skip_below: u64,
    workdir: &WorkDir,
    log: &StepLog,
) -> UploadSource {
    let original = UploadSource {
        path: local_path.to_owned(),
        codec: probed_codec,
        size: source_size,
        compressed: false,
    };
    if !compression_worthwhile(source_size, compress_skip_below) {
        log.msg("Source small enough, skipping compression");
        return original;
    }
    log.msg(format!("Compressing ({})...", tier));
    let output = workdir.join("compressed.mp4");
    match toolkit.compress(local_path, &output, tier).await {
        Ok(()) => {
            let compressed_size = match std::fs::metadata(&output) {
                Ok(meta) => meta.len(),
                Err(err) => {
                    warn!("Error reading compressed output size: {}", err);
                    log.msg("Compression output unreadable, keeping original");
                    return original;
                }
            };
            if keep_compressed_output(source_size, compressed_size) {
                log.msg(format!(
                    "Compressed {} -> {} bytes",
                    source_size, compressed_size
                ));
                UploadSource {
                    path: output,
                    codec: COMPRESS_TARGET_CODEC,
                    size: compressed_size,
                    compressed: true,
                }
            } else {
                // never regress size: throw the result away
                if let Err(err) = std::fs::remove_file(&output) {
                    warn!("Error removing discarded compression output: {}", err);
                }
                log.msg("Compression did not shrink the file, keeping original");
                original
            }
        }
        Err(report) => {
            warn!("Error compressing video: {:?}", report);
            log.msg("Compression failed, keeping original");
            original
        }
    }
}

/// Best-effort: thumbnail failures never fail the file.
async fn upload_thumbnail(
    store: &impl ObjectStore,
    toolkit: &impl MediaToolkit,
    video: &Path,
    remote_path: &RemoteVideoPath,
    workdir: &WorkDir,
    log: &StepLog,
) -> Option<String> {
    log.msg("Creating thumbnail...");
    let local = workdir.join("thumb.jpg");
    if let Err(report) = toolkit.extract_thumbnail(video, &local).await {
        warn!("Error extracting thumbnail: {:?}", report);
        log.msg("Thumbnail extraction failed, continuing without one");
        return None;
    }
    let key = storage_key::thumbnail(remote_path);
    match store.upload_to(&local, &key).await {
        Ok(()) => {
            log.msg("Thumbnail uploaded");
            Some(key)
        }
        Err(err) => {
            warn!("Error uploading thumbnail: {}", err);
            log.msg("Thumbnail upload failed, continuing without one");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use claims::{assert_err, assert_ok};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        processing::video::hls::HlsOutput,
        remote::{index::IndexError, rclone::{ListEntries, TransferToolError}},
    };

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum StoreCall {
        Upload { local: PathBuf, remote_dir: String },
        UploadDir { local_dir: PathBuf, remote_dir: String },
        UploadTo { local: PathBuf, remote_path: String },
    }

    #[derive(Default)]
    struct FakeStore {
        calls: Mutex<Vec<StoreCall>>,
        fail_upload: bool,
        fail_upload_dir: bool,
        fail_thumbnail_upload: bool,
    }

    impl FakeStore {
        fn calls(&self) -> Vec<StoreCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn failed() -> TransferToolError {
        TransferToolError::Failed {
            stderr: "boom".to_owned(),
        }
    }

    #[async_trait]
    impl ObjectStore for FakeStore {
        async fn list(
            &self,
            _prefix: &str,
            _entries: ListEntries,
            _recursive: bool,
        ) -> Result<Vec<String>, TransferToolError> {
            Ok(Vec::new())
        }

        async fn upload(&self, local: &Path, remote_dir: &str) -> Result<(), TransferToolError> {
            if self.fail_upload {
                return Err(failed());
            }
            self.calls.lock().unwrap().push(StoreCall::Upload {
                local: local.to_owned(),
                remote_dir: remote_dir.to_owned(),
            });
            Ok(())
        }

        async fn upload_dir(
            &self,
            local_dir: &Path,
            remote_dir: &str,
        ) -> Result<(), TransferToolError> {
            if self.fail_upload_dir {
                return Err(failed());
            }
            self.calls.lock().unwrap().push(StoreCall::UploadDir {
                local_dir: local_dir.to_owned(),
                remote_dir: remote_dir.to_owned(),
            });
            Ok(())
        }

        async fn upload_to(
            &self,
            local: &Path,
            remote_path: &str,
        ) -> Result<(), TransferToolError> {
            if self.fail_thumbnail_upload && remote_path.starts_with("thumbnails/") {
                return Err(failed());
            }
            if self.fail_upload && !remote_path.starts_with("thumbnails/") {
                return Err(failed());
            }
            self.calls.lock().unwrap().push(StoreCall::UploadTo {
                local: local.to_owned(),
                remote_path: remote_path.to_owned(),
            });
            Ok(())
        }

        async fn download(
            &self,
            _remote_path: &str,
            _local_dir: &Path,
        ) -> Result<(), TransferToolError> {
            Ok(())
        }

        async fn delete_file(&self, _remote_path: &str) -> Result<(), TransferToolError> {
            Ok(())
        }

        async fn purge(&self, _remote_dir: &str) -> Result<(), TransferToolError> {
            Ok(())
        }
    }

    struct FakeToolkit {
        codec: VideoCodec,
        fail_hls: bool,
        fail_thumbnail: bool,
        /// Size of the file `compress` writes; `None` makes compression
        /// fail outright.
        compressed_size: Option<u64>,
        hls_codecs_seen: Mutex<Vec<VideoCodec>>,
        compress_calls: Mutex<usize>,
    }

    impl FakeToolkit {
        fn new(codec: VideoCodec) -> Self {
            Self {
                codec,
                fail_hls: false,
                fail_thumbnail: false,
                compressed_size: None,
                hls_codecs_seen: Mutex::new(Vec::new()),
                compress_calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl MediaToolkit for FakeToolkit {
        async fn probe_codec(&self, _path: &Path) -> VideoCodec {
            self.codec.clone()
        }

        async fn extract_thumbnail(&self, _video: &Path, output: &Path) -> Result<()> {
            if self.fail_thumbnail {
                return Err(eyre!("no frame"));
            }
            std::fs::write(output, b"jpeg")?;
            Ok(())
        }

        async fn convert_to_hls(
            &self,
            _input: &Path,
            out_dir: &Path,
            codec: &VideoCodec,
        ) -> Result<HlsOutput> {
            self.hls_codecs_seen.lock().unwrap().push(codec.clone());
            if self.fail_hls {
                return Err(eyre!("segmenter exploded"));
            }
            std::fs::create_dir_all(out_dir)?;
            let manifest = out_dir.join("index.m3u8");
            std::fs::write(&manifest, "#EXTM3U\n")?;
            std::fs::write(out_dir.join("seg_000.ts"), b"segment")?;
            Ok(HlsOutput {
                dir: out_dir.to_owned(),
                manifest,
                segment_count: 1,
            })
        }

        async fn compress(&self, _input: &Path, output: &Path, _tier: QualityTier) -> Result<()> {
            *self.compress_calls.lock().unwrap() += 1;
            match self.compressed_size {
                Some(size) => {
                    std::fs::write(output, vec![0u8; size as usize])?;
                    Ok(())
                }
                None => Err(eyre!("no encode sessions left")),
            }
        }
    }

    #[derive(Default)]
    struct FakeIndex {
        registered: Mutex<Vec<RegisterFile>>,
        fail: bool,
    }

    #[async_trait]
    impl IndexApi for FakeIndex {
        async fn register(&self, file: &RegisterFile) -> Result<(), IndexError> {
            if self.fail {
                return Err(IndexError::Rejected("KV not available".to_owned()));
            }
            self.registered.lock().unwrap().push(file.clone());
            Ok(())
        }

        async fn sync(&self) -> Result<u64, IndexError> {
            Ok(0)
        }
    }

    fn write_source(dir: &Path, name: &str, len: usize) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, vec![0u8; len]).unwrap();
        path
    }

    fn upload_op(local_path: PathBuf) -> UploadAsset {
        UploadAsset {
            local_path,
            remote_dir: "sermons/2024".to_owned(),
            compress: None,
            thumbnail: false,
        }
    }

    #[tokio::test]
    async fn plain_upload_registers_with_hls_reference() {
        let dir = tempfile::tempdir().unwrap();
        let dir_path = Path::from_path(dir.path()).unwrap();
        let local = write_source(dir_path, "easter.mp4", 100);
        let store = FakeStore::default();
        let toolkit = FakeToolkit::new(VideoCodec::H264);
        let index = FakeIndex::default();

        let done = assert_ok!(
            perform_upload_asset(
                &store,
                &toolkit,
                &index,
                &upload_op(local.clone()),
                600,
                &StepLog::disabled(),
            )
            .await
        );
        assert_eq!(
            done.hls_manifest.as_deref(),
            Some("sermons/2024/hls/easter/index.m3u8")
        );
        assert!(done.registered);
        assert!(!done.compressed);

        let calls = store.calls();
        assert!(calls.contains(&StoreCall::Upload {
            local,
            remote_dir: "sermons/2024".to_owned(),
        }));
        assert!(calls
            .iter()
            .any(|call| matches!(call, StoreCall::UploadDir { remote_dir, .. } if remote_dir == "sermons/2024/hls/easter")));

        let registered = index.registered.lock().unwrap();
        assert_eq!(registered.len(), 1);
        assert_eq!(registered[0].path, "sermons/2024/easter.mp4");
        assert_eq!(registered[0].name, "easter.mp4");
        assert_eq!(registered[0].category, "sermons");
        assert_eq!(
            registered[0].hls.as_deref(),
            Some("sermons/2024/hls/easter/index.m3u8")
        );
    }

    #[tokio::test]
    async fn hls_failure_falls_back_to_plain_upload() {
        let dir = tempfile::tempdir().unwrap();
        let dir_path = Path::from_path(dir.path()).unwrap();
        let local = write_source(dir_path, "pentecost.mp4", 100);
        let store = FakeStore::default();
        let mut toolkit = FakeToolkit::new(VideoCodec::H264);
        toolkit.fail_hls = true;
        let index = FakeIndex::default();

        let done = assert_ok!(
            perform_upload_asset(
                &store,
                &toolkit,
                &index,
                &upload_op(local),
                600,
                &StepLog::disabled(),
            )
            .await
        );
        assert_eq!(done.hls_manifest, None);
        assert!(done.registered);

        let calls = store.calls();
        assert!(calls.iter().any(|call| matches!(call, StoreCall::Upload { .. })));
        assert!(!calls.iter().any(|call| matches!(call, StoreCall::UploadDir { .. })));
        // registration omits the hls reference
        assert_eq!(index.registered.lock().unwrap()[0].hls, None);
    }

    #[tokio::test]
    async fn upload_failure_skips_registration() {
        let dir = tempfile::tempdir().unwrap();
        let dir_path = Path::from_path(dir.path()).unwrap();
        let local = write_source(dir_path, "advent.mp4", 100);
        let store = FakeStore {
            fail_upload: true,
            ..Default::default()
        };
        let toolkit = FakeToolkit::new(VideoCodec::H264);
        let index = FakeIndex::default();

        assert_err!(
            perform_upload_asset(
                &store,
                &toolkit,
                &index,
                &upload_op(local),
                600,
                &StepLog::disabled(),
            )
            .await
        );
        assert!(index.registered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn compression_skipped_at_threshold_and_run_above_it() {
        let dir = tempfile::tempdir().unwrap();
        let dir_path = Path::from_path(dir.path()).unwrap();
        let store = FakeStore::default();
        let index = FakeIndex::default();

        // exactly at the threshold: already optimized, never compressed
        let at_threshold = write_source(dir_path, "at.mp4", 600);
        let toolkit = FakeToolkit::new(VideoCodec::H264);
        let mut op = upload_op(at_threshold);
        op.compress = Some(QualityTier::Balanced);
        assert_ok!(
            perform_upload_asset(&store, &toolkit, &index, &op, 600, &StepLog::disabled()).await
        );
        assert_eq!(*toolkit.compress_calls.lock().unwrap(), 0);

        // one byte above: compressed, and the smaller output is kept
        let above = write_source(dir_path, "above.mp4", 601);
        let mut toolkit = FakeToolkit::new(VideoCodec::H264);
        toolkit.compressed_size = Some(300);
        let mut op = upload_op(above);
        op.compress = Some(QualityTier::Balanced);
        let done = assert_ok!(
            perform_upload_asset(&store, &toolkit, &index, &op, 600, &StepLog::disabled()).await
        );
        assert_eq!(*toolkit.compress_calls.lock().unwrap(), 1);
        assert!(done.compressed);
        assert_eq!(done.size, 300);
        // the kept compressed output goes up under the original name
        assert!(store.calls().iter().any(|call| matches!(
            call,
            StoreCall::UploadTo { remote_path, .. } if remote_path == "sermons/2024/above.mp4"
        )));
        // segmentation sees the compression target codec
        assert_eq!(
            toolkit.hls_codecs_seen.lock().unwrap().last(),
            Some(&VideoCodec::Hevc)
        );
    }

    #[tokio::test]
    async fn size_regression_discards_compressed_output() {
        let dir = tempfile::tempdir().unwrap();
        let dir_path = Path::from_path(dir.path()).unwrap();
        let local = write_source(dir_path, "big.mp4", 700);
        let store = FakeStore::default();
        let mut toolkit = FakeToolkit::new(VideoCodec::H264);
        toolkit.compressed_size = Some(700);
        let index = FakeIndex::default();
        let mut op = upload_op(local.clone());
        op.compress = Some(QualityTier::Compact);

        let done = assert_ok!(
            perform_upload_asset(&store, &toolkit, &index, &op, 600, &StepLog::disabled()).await
        );
        assert!(!done.compressed);
        assert_eq!(done.size, 700);
        // original uploaded under its own name, segmentation saw the probed codec
        assert!(store.calls().iter().any(|call| matches!(
            call,
            StoreCall::Upload { local: l, .. } if *l == local
        )));
        assert_eq!(
            toolkit.hls_codecs_seen.lock().unwrap().last(),
            Some(&VideoCodec::H264)
        );
    }

    #[tokio::test]
    async fn compression_failure_falls_back_to_original() {
        let dir = tempfile::tempdir().unwrap();
        let dir_path = Path::from_path(dir.path()).unwrap();
        let local = write_source(dir_path, "huge.mp4", 700);
        let store = FakeStore::default();
        let toolkit = FakeToolkit::new(VideoCodec::H264); // compressed_size: None => compress errors
        let index = FakeIndex::default();
        let mut op = upload_op(local);
        op.compress = Some(QualityTier::Quality);

        let done = assert_ok!(
            perform_upload_asset(&store, &toolkit, &index, &op, 600, &StepLog::disabled()).await
        );
        assert!(!done.compressed);
        assert!(done.registered);
    }

    #[tokio::test]
    async fn thumbnail_failures_do_not_fail_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let dir_path = Path::from_path(dir.path()).unwrap();
        let store = FakeStore::default();
        let index = FakeIndex::default();

        // extraction fails
        let local = write_source(dir_path, "a.mp4", 10);
        let mut toolkit = FakeToolkit::new(VideoCodec::H264);
        toolkit.fail_thumbnail = true;
        let mut op = upload_op(local);
        op.thumbnail = true;
        let done = assert_ok!(
            perform_upload_asset(&store, &toolkit, &index, &op, 600, &StepLog::disabled()).await
        );
        assert_eq!(done.thumbnail, None);

        // upload of the extracted image fails
        let local = write_source(dir_path, "b.mp4", 10);
        let store = FakeStore {
            fail_thumbnail_upload: true,
            ..Default::default()
        };
        let toolkit = FakeToolkit::new(VideoCodec::H264);
        let mut op = upload_op(local);
        op.thumbnail = true;
        let done = assert_ok!(
            perform_upload_asset(&store, &toolkit, &index, &op, 600, &StepLog::disabled()).await
        );
        assert_eq!(done.thumbnail, None);
    }

    #[tokio::test]
    async fn thumbnail_uploaded_under_derived_key() {
        let dir = tempfile::tempdir().unwrap();
        let dir_path = Path::from_path(dir.path()).unwrap();
        let local = write_source(dir_path, "christmas.mp4", 10);
        let store = FakeStore::default();
        let toolkit = FakeToolkit::new(VideoCodec::H264);
        let index = FakeIndex::default();
        let mut op = upload_op(local);
        op.thumbnail = true;

        let done = assert_ok!(
            perform_upload_asset(&store, &toolkit, &index, &op, 600, &StepLog::disabled()).await
        );
        assert_eq!(
            done.thumbnail.as_deref(),
            Some("thumbnails/sermons/2024/christmas.mp4.jpg")
        );
    }

    #[tokio::test]
    async fn registration_failure_does_not_fail_the_upload() {
        let dir = tempfile::tempdir().unwrap();
        let dir_path = Path::from_path(dir.path()).unwrap();
        let local = write_source(dir_path, "lent.mp4", 10);
        let store = FakeStore::default();
        let toolkit = FakeToolkit::new(VideoCodec::H264);
        let index = FakeIndex {
            fail: true,
            ..Default::default()
        };

        let done = assert_ok!(
            perform_upload_asset(
                &store,
                &toolkit,
                &index,
                &upload_op(local),
                600,
                &StepLog::disabled(),
            )
            .await
        );
        assert!(!done.registered);
    }

    #[tokio::test]
    async fn hevc_source_without_compression_segments_as_fmp4_input() {
        let dir = tempfile::tempdir().unwrap();
        let dir_path = Path::from_path(dir.path()).unwrap();
        let local = write_source(dir_path, "drone.mp4", 10);
        let store = FakeStore::default();
        let toolkit = FakeToolkit::new(VideoCodec::Hevc);
        let index = FakeIndex::default();

        assert_ok!(
            perform_upload_asset(
                &store,
                &toolkit,
                &index,
                &upload_op(local),
                600,
                &StepLog::disabled(),
            )
            .await
        );
        assert_eq!(
            toolkit.hls_codecs_seen.lock().unwrap().as_slice(),
            &[VideoCodec::Hevc]
        );
    }
}
