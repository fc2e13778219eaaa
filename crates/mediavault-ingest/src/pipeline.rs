//! Upload ingestion: receive → merge → verify → register.

use std::{path::PathBuf, sync::Arc};

use chrono::Utc;
use mediavault_cipher::{decrypt_text_token, ObfuscationKey};
use mediavault_core::{hash::ContentHasher, is_content_hash};
use mediavault_storage::{find_in_partitions, partition_dir, ChunkStore};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dedup::DedupIndex,
    error::{IngestError, IngestResult},
    hooks::{ArtifactHook, HookContext},
    record::{ChunkManifest, MediaRecord, MediaStatus, MetadataStore},
};

/// One chunk as declared by the uploading client.
#[derive(Clone, Debug)]
pub struct DeclaredChunk {
    /// Position in the payload, assigned by the client.
    pub index: u32,
    /// Filename of the uploaded chunk (UUID).
    pub uuid: String,
}

/// A merge request: the client has uploaded all chunks and asks for
/// them to be verified and registered.
#[derive(Clone, Debug)]
pub struct UploadRequest {
    /// Client-declared MD5 of the complete payload.
    pub content_hash: String,
    pub file_name: String,
    pub file_size: u64,
    pub mime: String,
    /// Declared chunks in any order; merged by declared index.
    pub chunks: Vec<DeclaredChunk>,
    /// Decoded thumbnail bytes, if the client generated one.
    pub thumbnail: Option<Vec<u8>>,
}

/// Result of a chunk upload.
#[derive(Clone, Debug)]
pub struct ReceivedChunk {
    pub chunk_uuid: String,
    pub path: PathBuf,
}

/// Result of a merge: the registered (or pre-existing) record.
#[derive(Clone, Debug)]
pub struct MergeOutcome {
    pub record: MediaRecord,
    /// True when the content hash was already registered and the
    /// existing record was returned instead of re-storing.
    pub already_exists: bool,
}

/// Orchestrates the upload path against the chunk store, the metadata
/// boundary and the artifact hooks.
pub struct IngestionPipeline {
    media_root: PathBuf,
    chunk_store: ChunkStore,
    metadata: Arc<dyn MetadataStore>,
    dedup: DedupIndex,
    key: Arc<ObfuscationKey>,
    hooks: Vec<Arc<dyn ArtifactHook>>,
}

impl IngestionPipeline {
    pub fn new(
        media_root: impl Into<PathBuf>,
        chunk_store: ChunkStore,
        metadata: Arc<dyn MetadataStore>,
        key: Arc<ObfuscationKey>,
    ) -> Self {
        let hooks: Vec<Arc<dyn ArtifactHook>> =
            vec![Arc::new(crate::hooks::ThumbnailHook::new(key.clone()))];
        Self {
            media_root: media_root.into(),
            chunk_store,
            metadata: metadata.clone(),
            dedup: DedupIndex::new(metadata),
            key,
            hooks,
        }
    }

    /// Replace the artifact hook list.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Vec<Arc<dyn ArtifactHook>>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn dedup(&self) -> &DedupIndex {
        &self.dedup
    }

    /// Store one uploaded chunk under the payload's partition, keyed by
    /// a caller-assigned (or generated) UUID.
    ///
    /// # Errors
    ///
    /// [`IngestError::InvalidRequest`] for a malformed hash, storage
    /// errors otherwise.
    pub async fn receive_chunk(
        &self,
        declared_hash: &str,
        chunk_uuid: Option<String>,
        data: &[u8],
    ) -> IngestResult<ReceivedChunk> {
        if !is_content_hash(declared_hash) {
            return Err(IngestError::InvalidRequest(format!(
                "malformed content hash: {declared_hash}"
            )));
        }

        let chunk_uuid = chunk_uuid.unwrap_or_else(|| Uuid::new_v4().to_string());
        let storage_dir = partition_dir(&self.media_root, declared_hash, None);
        let path = self
            .chunk_store
            .write_direct(&storage_dir, &chunk_uuid, data)
            .await?;

        debug!(hash = declared_hash, chunk = %chunk_uuid, bytes = data.len(), "chunk received");
        Ok(ReceivedChunk { chunk_uuid, path })
    }

    /// Merge declared chunks, verify the content hash, and register the
    /// record.
    ///
    /// Chunks are concatenated in declared-index order, not arrival
    /// order. A hash mismatch rejects the upload and discards the
    /// merged payload while keeping the per-piece chunk files for a
    /// retry. A hash that is already registered short-circuits to the
    /// existing record (idempotent re-ingestion, not an error).
    /// Artifact hooks run after registration; their failures are logged
    /// and never roll the registration back.
    ///
    /// # Errors
    ///
    /// [`IngestError::InvalidRequest`], [`IngestError::MissingChunk`],
    /// [`IngestError::HashMismatch`], or storage/metadata failures.
    pub async fn merge_chunks(&self, request: UploadRequest) -> IngestResult<MergeOutcome> {
        if !is_content_hash(&request.content_hash) {
            return Err(IngestError::InvalidRequest(format!(
                "malformed content hash: {}",
                request.content_hash
            )));
        }
        if request.file_name.is_empty() || request.chunks.is_empty() {
            return Err(IngestError::InvalidRequest(
                "file name and chunk list are required".to_string(),
            ));
        }

        if let Some(existing) = self.dedup.exists_by_hash(&request.content_hash).await? {
            info!(hash = %request.content_hash, "content already registered");
            return Ok(MergeOutcome {
                record: existing,
                already_exists: true,
            });
        }

        let storage_dir = partition_dir(&self.media_root, &request.content_hash, None);
        tokio::fs::create_dir_all(&storage_dir).await?;

        let mut declared = request.chunks.clone();
        declared.sort_by_key(|c| c.index);

        // Merge in declared order, hashing as we go. The chunks are the
        // canonical storage, so the merged payload is never persisted;
        // only its hash matters.
        let mut hasher = ContentHasher::new();
        let mut ordered_uuids = Vec::with_capacity(declared.len());
        for chunk in &declared {
            let path = storage_dir.join(&chunk.uuid);
            let data = match tokio::fs::read(&path).await {
                Ok(data) => data,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(IngestError::MissingChunk {
                        name: chunk.uuid.clone(),
                    });
                }
                Err(e) => return Err(e.into()),
            };
            hasher.update(&data);
            ordered_uuids.push(chunk.uuid.clone());
        }

        let actual = hasher.finish();
        if actual != request.content_hash {
            warn!(
                declared = %request.content_hash,
                %actual,
                "merged payload failed hash verification"
            );
            // The per-piece chunk files stay on disk for a retry.
            return Err(IngestError::HashMismatch {
                expected: request.content_hash,
                actual,
            });
        }

        let extension = request
            .file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_else(|| "unknown".to_string());

        let mut record = MediaRecord {
            content_hash: request.content_hash.clone(),
            name: request.file_name.clone(),
            size: request.file_size,
            extension,
            mime: request.mime.clone(),
            status: MediaStatus::Processing,
            manifest: ChunkManifest::Chunks {
                chunks: ordered_uuids,
                storage_dir: storage_dir.clone(),
            },
            thumbnail_ref: None,
            hls_ref: None,
            deleted_at: None,
        };
        self.metadata.insert(&record).await?;

        let ctx = HookContext {
            storage_dir: &storage_dir,
            thumbnail: request.thumbnail.as_deref(),
        };
        for hook in &self.hooks {
            if let Err(error) = hook.run(&ctx, &mut record).await {
                warn!(hook = hook.name(), %error, "artifact hook failed, continuing");
            }
        }

        record.status = MediaStatus::Enabled;
        self.metadata.update(&record).await?;

        info!(
            hash = %record.content_hash,
            name = %record.name,
            chunks = request.chunks.len(),
            "upload registered"
        );
        Ok(MergeOutcome {
            record,
            already_exists: false,
        })
    }

    /// Ordered chunk file paths for streaming a record's content.
    ///
    /// # Errors
    ///
    /// [`IngestError::MissingArtifact`] when the record has no chunk
    /// manifest, [`IngestError::MissingChunk`] when a listed chunk file
    /// is absent.
    pub fn open_content(&self, record: &MediaRecord) -> IngestResult<Vec<PathBuf>> {
        let (chunks, storage_dir) = record.manifest.resolve().ok_or_else(|| {
            IngestError::MissingArtifact(format!("record {} has no chunk data", record.content_hash))
        })?;

        let mut paths = Vec::with_capacity(chunks.len());
        for name in &chunks {
            let path = storage_dir.join(name);
            if !path.is_file() {
                return Err(IngestError::MissingChunk { name: name.clone() });
            }
            paths.push(path);
        }
        Ok(paths)
    }

    /// Decrypt and return a record's thumbnail bytes.
    ///
    /// # Errors
    ///
    /// [`IngestError::MissingArtifact`] when the record has no
    /// thumbnail or its file is gone.
    pub async fn read_thumbnail(&self, record: &MediaRecord) -> IngestResult<Vec<u8>> {
        let Some(thumbnail_ref) = &record.thumbnail_ref else {
            return Err(IngestError::MissingArtifact(format!(
                "record {} has no thumbnail",
                record.content_hash
            )));
        };

        let storage_dir = self.locate_storage_dir(record).ok_or_else(|| {
            IngestError::MissingArtifact(format!(
                "storage location for {} not found",
                record.content_hash
            ))
        })?;

        let path = storage_dir.join(thumbnail_ref);
        let token = match tokio::fs::read_to_string(&path).await {
            Ok(token) => token,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(IngestError::MissingArtifact(format!(
                    "thumbnail {thumbnail_ref} is gone"
                )));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(decrypt_text_token(&self.key, &token)?)
    }

    /// Soft-delete: remove chunk files and HLS artifacts, keep the
    /// thumbnail, mark the record deleted. Returns how many files were
    /// removed.
    ///
    /// # Errors
    ///
    /// Metadata failures; missing files are skipped silently.
    pub async fn delete(&self, record: &mut MediaRecord) -> IngestResult<usize> {
        let mut removed = 0;

        if let Some((chunks, storage_dir)) = record.manifest.resolve() {
            removed += self.chunk_store.remove_chunks(&storage_dir, &chunks);
            removed += remove_hls_artifacts(record, &storage_dir);
        }

        record.manifest = ChunkManifest::Empty;
        record.hls_ref = None;
        record.status = MediaStatus::Deleted;
        record.deleted_at = Some(Utc::now());
        self.metadata.update(record).await?;

        info!(hash = %record.content_hash, removed, "record soft-deleted");
        Ok(removed)
    }

    fn locate_storage_dir(&self, record: &MediaRecord) -> Option<PathBuf> {
        if let Some((_, dir)) = record.manifest.resolve() {
            if dir.is_dir() {
                return Some(dir);
            }
        }
        find_in_partitions(&self.media_root, &record.content_hash, None)
    }
}

/// Remove the encrypted manifest and every segment belonging to the
/// record's HLS run. Segment files carry the run id in their names, so
/// a directory scan with a prefix match finds them without touching
/// other records' artifacts.
fn remove_hls_artifacts(record: &MediaRecord, storage_dir: &std::path::Path) -> usize {
    let Some(hls_ref) = &record.hls_ref else {
        return 0;
    };

    let mut removed = 0;
    let hls_dir = storage_dir.join("HLS");
    let manifest_name = std::path::Path::new(hls_ref)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    let manifest_path = hls_dir.join(manifest_name);
    if std::fs::remove_file(&manifest_path).is_ok() {
        removed += 1;
    }

    let run_id = manifest_name
        .strip_prefix("hls_")
        .and_then(|rest| rest.strip_suffix(".m3u8.enc"));
    let Some(run_id) = run_id else {
        return removed;
    };

    let segment_prefix = format!("hls_seg_{run_id}_");
    if let Ok(entries) = std::fs::read_dir(&hls_dir) {
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(&segment_prefix) && name.ends_with(".ts") {
                if std::fs::remove_file(entry.path()).is_ok() {
                    removed += 1;
                }
            }
        }
    }
    removed
}
