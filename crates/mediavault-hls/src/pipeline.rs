//! The segmentation pipeline: assembled source → transcoded →
//! segments encrypted → manifest rewritten → published.

use std::{
    collections::BTreeSet,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use mediavault_cipher::{encrypt_text_token, xor_in_place, ObfuscationKey};
use mediavault_core::HlsOptions;
use regex::Regex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::{HlsError, HlsResult},
    transcoder::Transcoder,
};

/// Subdirectory of a record's storage dir that holds HLS artifacts.
const HLS_SUBDIR: &str = "HLS";

/// Derives encrypted streaming artifacts for one stored payload.
pub struct SegmentationPipeline {
    key: Arc<ObfuscationKey>,
    transcoder: Arc<dyn Transcoder>,
    options: HlsOptions,
}

impl SegmentationPipeline {
    pub fn new(key: Arc<ObfuscationKey>, transcoder: Arc<dyn Transcoder>, options: HlsOptions) -> Self {
        Self {
            key,
            transcoder,
            options,
        }
    }

    /// Run the full derivation for the payload whose upload chunks
    /// `chunk_names` live in `storage_dir`.
    ///
    /// The assembled source is written to a temporary file that is
    /// removed on every exit path. Segments are produced into
    /// `{storage_dir}/HLS/` under a run-scoped id so concurrent runs
    /// cannot collide, then XOR-encrypted in place. The manifest gets
    /// every segment reference marked `.enc` and every local
    /// key-delivery URI rewritten to the indirection endpoint, is
    /// itself encrypted, and the plaintext is deleted.
    ///
    /// Returns the published artifact reference: the encrypted manifest
    /// path relative to `publish_root`. Derivation for a record that
    /// already carries an artifact reference should be short-circuited
    /// by the caller; every run here is a fresh, run-scoped one.
    ///
    /// # Errors
    ///
    /// [`HlsError::MissingSource`] when a chunk is absent, transcoder
    /// errors verbatim, and I/O failures.
    pub async fn run(
        &self,
        storage_dir: &Path,
        chunk_names: &[String],
        source_extension: &str,
        publish_root: &Path,
    ) -> HlsResult<String> {
        if chunk_names.is_empty() {
            return Err(HlsError::MissingSource("empty chunk list".to_string()));
        }

        // Assemble the source into a temp file. The guard deletes it no
        // matter how this function exits.
        let suffix = if source_extension.starts_with('.') {
            source_extension.to_string()
        } else {
            format!(".{source_extension}")
        };
        let mut temp_input = tempfile::Builder::new()
            .prefix("mediavault-src-")
            .suffix(&suffix)
            .tempfile()?;
        for name in chunk_names {
            let chunk_path = storage_dir.join(name);
            let data = std::fs::read(&chunk_path)
                .map_err(|_| HlsError::MissingSource(name.clone()))?;
            temp_input.write_all(&data)?;
        }
        temp_input.flush()?;
        debug!(chunks = chunk_names.len(), "source assembled for transcoding");

        let hls_dir = storage_dir.join(HLS_SUBDIR);
        std::fs::create_dir_all(&hls_dir)?;

        let run_id = Uuid::new_v4().to_string();
        let playlist_path = self
            .transcoder
            .transcode(temp_input.path(), &hls_dir, &run_id)
            .await?;

        let manifest = std::fs::read_to_string(&playlist_path)?;
        let encrypted_count = self.encrypt_segments(&hls_dir, &run_id, &manifest)?;

        let rewritten = self.rewrite_manifest(&manifest, &run_id);
        let encrypted_manifest_path = PathBuf::from(format!("{}.enc", playlist_path.display()));
        std::fs::write(
            &encrypted_manifest_path,
            encrypt_text_token(&self.key, rewritten.as_bytes()),
        )?;
        std::fs::remove_file(&playlist_path)?;

        let published = encrypted_manifest_path
            .strip_prefix(publish_root)
            .unwrap_or(&encrypted_manifest_path)
            .to_string_lossy()
            .replace('\\', "/");

        info!(
            run_id,
            segments = encrypted_count,
            artifact = %published,
            "HLS derivation published"
        );
        Ok(published)
    }

    /// XOR-encrypt, in place, every segment the manifest references.
    fn encrypt_segments(&self, hls_dir: &Path, run_id: &str, manifest: &str) -> HlsResult<usize> {
        let pattern = Regex::new(&format!(r"hls_seg_{}_(\d+)\.ts", regex::escape(run_id)))
            .map_err(|e| HlsError::Manifest(e.to_string()))?;

        let referenced: BTreeSet<&str> = pattern
            .find_iter(manifest)
            .map(|m| m.as_str())
            .collect();

        let mut encrypted = 0;
        for name in referenced {
            let path = hls_dir.join(name);
            let mut data = match std::fs::read(&path) {
                Ok(data) => data,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(segment = name, "referenced segment missing, skipping");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            xor_in_place(&self.key, &mut data);
            std::fs::write(&path, &data)?;
            encrypted += 1;
        }
        Ok(encrypted)
    }

    /// Mark segment references `.enc` and rewrite local key URIs.
    ///
    /// Segment files keep their names on disk; the marker only lives in
    /// the manifest so the serving layer knows to decrypt. Key URIs
    /// that are local or relative paths are routed through the
    /// configured indirection endpoint; absolute external URIs are left
    /// untouched.
    fn rewrite_manifest(&self, manifest: &str, run_id: &str) -> String {
        let seg_pattern = Regex::new(&format!(r"hls_seg_{}_(\d+)\.ts", regex::escape(run_id)))
            .expect("static segment pattern");
        let text = seg_pattern.replace_all(manifest, "${0}.enc");

        let key_pattern = Regex::new(r#"URI="([^"]+)""#).expect("static key pattern");
        key_pattern
            .replace_all(&text, |caps: &regex::Captures<'_>| {
                let uri = &caps[1];
                if uri.starts_with("http://") || uri.starts_with("https://") {
                    caps[0].to_string()
                } else {
                    let basename = uri.rsplit('/').next().unwrap_or(uri);
                    format!(r#"URI="{}{}""#, self.options.key_uri_prefix, basename)
                }
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use mediavault_cipher::decrypt_text_token;
    use tempfile::TempDir;

    use super::*;

    /// Transcoder double: emits a plausible playlist plus segment files
    /// starting with the MPEG-TS sync byte.
    struct FakeTranscoder {
        segments: usize,
        key_line: Option<&'static str>,
    }

    #[async_trait]
    impl Transcoder for FakeTranscoder {
        async fn transcode(&self, input: &Path, out_dir: &Path, run_id: &str) -> HlsResult<PathBuf> {
            assert!(input.is_file(), "assembled source must exist");

            let mut manifest = String::from("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:10\n");
            if let Some(key_line) = self.key_line {
                manifest.push_str(key_line);
                manifest.push('\n');
            }
            for index in 0..self.segments {
                let name = format!("hls_seg_{run_id}_{index:03}.ts");
                let mut body = vec![0x47u8, 0x40, 0x11];
                body.extend_from_slice(format!("segment-{index}").as_bytes());
                std::fs::write(out_dir.join(&name), &body).unwrap();
                manifest.push_str("#EXTINF:10.0,\n");
                manifest.push_str(&name);
                manifest.push('\n');
            }
            manifest.push_str("#EXT-X-ENDLIST\n");

            let playlist = out_dir.join(format!("hls_{run_id}.m3u8"));
            std::fs::write(&playlist, manifest).unwrap();
            Ok(playlist)
        }
    }

    fn test_pipeline(key_line: Option<&'static str>) -> SegmentationPipeline {
        let key = Arc::new(ObfuscationKey::derive(b"hls-test-secret").unwrap());
        SegmentationPipeline::new(
            key,
            Arc::new(FakeTranscoder {
                segments: 3,
                key_line,
            }),
            HlsOptions::default(),
        )
    }

    fn seed_chunks(dir: &Path) -> Vec<String> {
        let names = vec!["chunk-a".to_string(), "chunk-b".to_string()];
        std::fs::write(dir.join("chunk-a"), b"first-half-").unwrap();
        std::fs::write(dir.join("chunk-b"), b"second-half").unwrap();
        names
    }

    #[tokio::test]
    async fn full_derivation_encrypts_segments_and_manifest() {
        let root = TempDir::new().unwrap();
        let storage_dir = root.path().join("20240920").join("deadbeef");
        std::fs::create_dir_all(&storage_dir).unwrap();
        let chunks = seed_chunks(&storage_dir);

        let pipeline = test_pipeline(None);
        let published = pipeline
            .run(&storage_dir, &chunks, "mp4", root.path())
            .await
            .unwrap();

        assert!(published.starts_with("20240920/deadbeef/HLS/hls_"));
        assert!(published.ends_with(".m3u8.enc"));

        let hls_dir = storage_dir.join("HLS");
        let entries: Vec<String> = std::fs::read_dir(&hls_dir)
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();

        // The plaintext playlist is gone; only the encrypted manifest
        // and the three (encrypted) segments remain.
        assert!(!entries.iter().any(|n| n.ends_with(".m3u8")));
        assert_eq!(entries.iter().filter(|n| n.ends_with(".ts")).count(), 3);

        // Segments no longer look like MPEG-TS on disk.
        let key = ObfuscationKey::derive(b"hls-test-secret").unwrap();
        for name in entries.iter().filter(|n| n.ends_with(".ts")) {
            let mut data = std::fs::read(hls_dir.join(name)).unwrap();
            assert_ne!(data[0], 0x47);
            xor_in_place(&key, &mut data);
            assert_eq!(data[0], 0x47);
        }

        // The manifest decrypts and references `.enc`-marked segments.
        let token = std::fs::read_to_string(root.path().join(&published)).unwrap();
        let manifest = String::from_utf8(decrypt_text_token(&key, &token).unwrap()).unwrap();
        assert!(manifest.contains(".ts.enc"));
        assert!(!manifest
            .lines()
            .any(|l| l.ends_with(".ts") && !l.ends_with(".ts.enc")));
    }

    #[tokio::test]
    async fn local_key_uri_is_rewritten_and_external_kept() {
        let root = TempDir::new().unwrap();
        let storage_dir = root.path().join("20240920").join("cafebabe");
        std::fs::create_dir_all(&storage_dir).unwrap();
        let chunks = seed_chunks(&storage_dir);

        let pipeline = test_pipeline(Some(
            "#EXT-X-KEY:METHOD=AES-128,URI=\"/media/VKey/ALL/encrypt.key\"",
        ));
        let published = pipeline
            .run(&storage_dir, &chunks, ".mp4", root.path())
            .await
            .unwrap();

        let key = ObfuscationKey::derive(b"hls-test-secret").unwrap();
        let token = std::fs::read_to_string(root.path().join(&published)).unwrap();
        let manifest = String::from_utf8(decrypt_text_token(&key, &token).unwrap()).unwrap();
        assert!(manifest.contains(r#"URI="/api/hls/key/encrypt.key""#));
    }

    #[tokio::test]
    async fn external_key_uri_is_untouched() {
        let root = TempDir::new().unwrap();
        let storage_dir = root.path().join("p");
        std::fs::create_dir_all(&storage_dir).unwrap();
        let chunks = seed_chunks(&storage_dir);

        let pipeline = test_pipeline(Some(
            "#EXT-X-KEY:METHOD=AES-128,URI=\"https://keys.example.com/k1.key\"",
        ));
        let published = pipeline
            .run(&storage_dir, &chunks, "mp4", root.path())
            .await
            .unwrap();

        let key = ObfuscationKey::derive(b"hls-test-secret").unwrap();
        let token = std::fs::read_to_string(root.path().join(&published)).unwrap();
        let manifest = String::from_utf8(decrypt_text_token(&key, &token).unwrap()).unwrap();
        assert!(manifest.contains(r#"URI="https://keys.example.com/k1.key""#));
    }

    #[tokio::test]
    async fn missing_chunk_aborts_before_transcoding() {
        let root = TempDir::new().unwrap();
        let storage_dir = root.path().join("p");
        std::fs::create_dir_all(&storage_dir).unwrap();

        let pipeline = test_pipeline(None);
        let result = pipeline
            .run(
                &storage_dir,
                &["not-there".to_string()],
                "mp4",
                root.path(),
            )
            .await;

        assert!(matches!(result, Err(HlsError::MissingSource(name)) if name == "not-there"));
        // No partial HLS state was left behind.
        assert!(!storage_dir.join(HLS_SUBDIR).exists());
    }
}
