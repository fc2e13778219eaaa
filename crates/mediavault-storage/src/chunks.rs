//! Writing chunk sets.

use std::{
    io,
    path::{Path, PathBuf},
};

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use mediavault_core::ChunkPolicy;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// Filesystem primitives for numbered chunk files.
///
/// Chunk files are named `{file_id}.part{N}` with N counting from 0,
/// no zero-padding. The extension sidecar is `{file_id}.ext`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ChunkStore {
    policy: ChunkPolicy,
}

impl ChunkStore {
    pub fn new(policy: ChunkPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ChunkPolicy {
        &self.policy
    }

    /// Path of chunk `index` for `file_id` under `base_dir`.
    pub fn chunk_path(base_dir: &Path, file_id: &str, index: usize) -> PathBuf {
        base_dir.join(format!("{file_id}.part{index}"))
    }

    /// Path of the extension sidecar for `file_id` under `base_dir`.
    pub fn ext_path(base_dir: &Path, file_id: &str) -> PathBuf {
        base_dir.join(format!("{file_id}.ext"))
    }

    /// True iff a chunk set exists for `file_id`, i.e. chunk index 0 is
    /// present. Used to short-circuit re-downloads.
    pub fn exists(&self, base_dir: &Path, file_id: &str) -> bool {
        Self::chunk_path(base_dir, file_id, 0).is_file()
    }

    /// Number of contiguous chunks present, probing indices from 0
    /// until one is missing.
    pub fn count_existing(&self, base_dir: &Path, file_id: &str) -> usize {
        let mut count = 0;
        while Self::chunk_path(base_dir, file_id, count).is_file() {
            count += 1;
        }
        count
    }

    /// Consume `stream` incrementally and materialize fixed-size chunk
    /// files plus the extension sidecar. Returns the chunk count.
    ///
    /// The target chunk size comes from the sizing policy and the
    /// (possibly unknown) `total_size`. Frames are accumulated in a
    /// buffer; whenever the buffer reaches the target size a full chunk
    /// is flushed and the remainder retained; a final partial chunk is
    /// flushed at stream end. An empty payload still produces one empty
    /// chunk so the set remains enumerable.
    ///
    /// If chunk index 0 already exists the write is skipped entirely
    /// and the existing count returned: at-most-once storage per
    /// `(base_dir, file_id)`. The existence check is not atomic with
    /// the write: two concurrent first-time writers for the same id can
    /// both pass it. Single-writer-per-id is a caller obligation.
    ///
    /// Cancellation is observed between chunk writes; a cancelled write
    /// leaves a contiguous prefix of full chunks behind, never a
    /// truncated final chunk.
    ///
    /// # Errors
    ///
    /// [`StorageError::Cancelled`] on cancellation, [`StorageError::Io`]
    /// on filesystem failure, [`StorageError::Stream`] when the source
    /// stream yields an error.
    pub async fn write_sequential<S>(
        &self,
        base_dir: &Path,
        file_id: &str,
        mut stream: S,
        total_size: Option<u64>,
        extension: Option<&str>,
        cancel: &CancellationToken,
    ) -> StorageResult<usize>
    where
        S: Stream<Item = Result<Bytes, io::Error>> + Unpin + Send,
    {
        tokio::fs::create_dir_all(base_dir).await?;

        if self.exists(base_dir, file_id) {
            let count = self.count_existing(base_dir, file_id);
            debug!(file_id, count, "chunk set already present, skipping write");
            return Ok(count);
        }

        let chunk_size = self.policy.chunk_size_for(total_size);
        debug!(file_id, chunk_size, ?total_size, "starting sequential chunked write");

        let mut buffer = BytesMut::new();
        let mut index = 0usize;

        while let Some(frame) = stream.next().await {
            let frame = frame.map_err(|e| StorageError::Stream(e.to_string()))?;
            buffer.extend_from_slice(&frame);

            while buffer.len() >= chunk_size {
                if cancel.is_cancelled() {
                    return Err(StorageError::Cancelled);
                }
                let chunk = buffer.split_to(chunk_size);
                tokio::fs::write(Self::chunk_path(base_dir, file_id, index), &chunk).await?;
                index += 1;
            }
        }

        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }

        // Final partial chunk; also the sole chunk of an empty payload.
        if !buffer.is_empty() || index == 0 {
            tokio::fs::write(Self::chunk_path(base_dir, file_id, index), &buffer).await?;
            index += 1;
        }

        if let Some(ext) = extension {
            tokio::fs::write(Self::ext_path(base_dir, file_id), ext.as_bytes()).await?;
        }

        info!(file_id, chunks = index, "chunk set written");
        Ok(index)
    }

    /// Single-shot write of a caller-keyed chunk, used for client
    /// upload pieces named by UUID rather than sequential index.
    pub async fn write_direct(
        &self,
        dir: &Path,
        name: &str,
        data: &[u8],
    ) -> StorageResult<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(name);
        tokio::fs::write(&path, data).await?;
        Ok(path)
    }

    /// Remove the named chunk files from `dir`, returning how many were
    /// actually deleted. Missing files are skipped, not errors.
    pub fn remove_chunks(&self, dir: &Path, names: &[String]) -> usize {
        let mut removed = 0;
        for name in names {
            let path = dir.join(name);
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(chunk = %name, error = %e, "failed to remove chunk file");
                }
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;
    use tempfile::TempDir;

    use super::*;

    fn byte_stream(frames: Vec<Vec<u8>>) -> impl Stream<Item = Result<Bytes, io::Error>> + Unpin {
        stream::iter(frames.into_iter().map(|f| Ok(Bytes::from(f))))
    }

    fn small_store() -> ChunkStore {
        ChunkStore::new(ChunkPolicy {
            small_threshold: 100,
            chunk_count_small: 3,
            chunk_size_large: 10,
            read_increment: 4,
        })
    }

    #[tokio::test]
    async fn writes_fixed_size_chunks_and_sidecar() {
        let dir = TempDir::new().unwrap();
        let store = small_store();
        let cancel = CancellationToken::new();

        // 25 bytes at chunk size 10: two full chunks + one partial.
        let count = store
            .write_sequential(
                dir.path(),
                "abc",
                byte_stream(vec![vec![1u8; 25]]),
                Some(500),
                Some(".png"),
                &cancel,
            )
            .await
            .unwrap();

        assert_eq!(count, 3);
        assert_eq!(
            std::fs::read(ChunkStore::chunk_path(dir.path(), "abc", 0)).unwrap().len(),
            10
        );
        assert_eq!(
            std::fs::read(ChunkStore::chunk_path(dir.path(), "abc", 2)).unwrap().len(),
            5
        );
        assert_eq!(
            std::fs::read_to_string(ChunkStore::ext_path(dir.path(), "abc")).unwrap(),
            ".png"
        );
        assert!(store.exists(dir.path(), "abc"));
        assert_eq!(store.count_existing(dir.path(), "abc"), 3);
    }

    #[tokio::test]
    async fn empty_payload_produces_single_empty_chunk() {
        let dir = TempDir::new().unwrap();
        let store = small_store();

        let count = store
            .write_sequential(
                dir.path(),
                "empty",
                byte_stream(vec![]),
                Some(0),
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(count, 1);
        let chunk = std::fs::read(ChunkStore::chunk_path(dir.path(), "empty", 0)).unwrap();
        assert!(chunk.is_empty());
    }

    #[tokio::test]
    async fn second_write_is_skipped() {
        let dir = TempDir::new().unwrap();
        let store = small_store();
        let cancel = CancellationToken::new();

        let first = store
            .write_sequential(
                dir.path(),
                "abc",
                byte_stream(vec![vec![1u8; 25]]),
                Some(500),
                None,
                &cancel,
            )
            .await
            .unwrap();

        // Different content on the second call: files must not change.
        let second = store
            .write_sequential(
                dir.path(),
                "abc",
                byte_stream(vec![vec![9u8; 99]]),
                Some(500),
                None,
                &cancel,
            )
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(
            std::fs::read(ChunkStore::chunk_path(dir.path(), "abc", 0)).unwrap(),
            vec![1u8; 10]
        );
        assert_eq!(store.count_existing(dir.path(), "abc"), first);
    }

    #[tokio::test]
    async fn cancellation_leaves_full_chunk_prefix() {
        let dir = TempDir::new().unwrap();
        let store = small_store();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = store
            .write_sequential(
                dir.path(),
                "abc",
                byte_stream(vec![vec![1u8; 25]]),
                Some(500),
                None,
                &cancel,
            )
            .await;

        assert!(matches!(result, Err(StorageError::Cancelled)));
        // No chunk was flushed after the cancel was observed; whatever is
        // on disk is a contiguous run of full-size chunks.
        let count = store.count_existing(dir.path(), "abc");
        for index in 0..count {
            let chunk = std::fs::read(ChunkStore::chunk_path(dir.path(), "abc", index)).unwrap();
            assert_eq!(chunk.len(), 10);
        }
    }

    #[tokio::test]
    async fn stream_error_propagates() {
        let dir = TempDir::new().unwrap();
        let store = small_store();

        let failing = stream::iter(vec![
            Ok(Bytes::from_static(b"0123456789")),
            Err(io::Error::other("connection reset")),
        ]);

        let result = store
            .write_sequential(
                dir.path(),
                "abc",
                failing,
                None,
                None,
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(result, Err(StorageError::Stream(_))));
    }

    #[tokio::test]
    async fn write_direct_stores_raw_bytes() {
        let dir = TempDir::new().unwrap();
        let store = ChunkStore::default();

        let path = store
            .write_direct(dir.path(), "b6bff779-3f1c-4dc3", b"payload")
            .await
            .unwrap();

        assert_eq!(std::fs::read(path).unwrap(), b"payload");
    }

    #[test]
    fn remove_chunks_skips_missing() {
        let dir = TempDir::new().unwrap();
        let store = ChunkStore::default();
        std::fs::write(dir.path().join("present"), b"x").unwrap();

        let removed = store.remove_chunks(
            dir.path(),
            &["present".to_string(), "absent".to_string()],
        );
        assert_eq!(removed, 1);
    }
}
