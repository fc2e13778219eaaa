//! Split/assemble round-trip across the chunk sizing boundaries.

use bytes::Bytes;
use futures::stream;
use mediavault_core::ChunkPolicy;
use mediavault_storage::{assemble, ChunkStore};
use rstest::rstest;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const THRESHOLD: u64 = 300;
const LARGE_CHUNK: usize = 120;

fn test_store() -> ChunkStore {
    ChunkStore::new(ChunkPolicy {
        small_threshold: THRESHOLD,
        chunk_count_small: 4,
        chunk_size_large: LARGE_CHUNK,
        read_increment: 16,
    })
}

fn payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

/// Feed the payload in uneven frames to exercise buffer accumulation.
fn frames(data: &[u8]) -> Vec<Result<Bytes, std::io::Error>> {
    data.chunks(7)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect()
}

#[rstest]
#[case::empty(0)]
#[case::one_byte(1)]
#[case::chunk_minus_one(LARGE_CHUNK - 1)]
#[case::chunk_exact(LARGE_CHUNK)]
#[case::chunk_plus_one(LARGE_CHUNK + 1)]
#[case::threshold_minus_one(THRESHOLD as usize - 1)]
#[case::threshold_exact(THRESHOLD as usize)]
#[case::threshold_times_ten(THRESHOLD as usize * 10)]
#[tokio::test]
async fn split_then_assemble_is_lossless(#[case] size: usize) {
    let dir = TempDir::new().unwrap();
    let store = test_store();
    let data = payload(size);

    let count = store
        .write_sequential(
            dir.path(),
            "roundtrip",
            stream::iter(frames(&data)),
            Some(size as u64),
            Some(".bin"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert!(count >= 1);

    let (assembled, ext) = assemble(dir.path(), "roundtrip").unwrap();
    assert_eq!(assembled, data);
    assert_eq!(ext, ".bin");
}

#[tokio::test]
async fn threshold_boundary_selects_chunk_size() {
    let store = test_store();
    let cancel = CancellationToken::new();

    // Exactly at the threshold: the large-file fixed chunk size.
    let dir = TempDir::new().unwrap();
    let data = payload(THRESHOLD as usize);
    store
        .write_sequential(
            dir.path(),
            "at",
            stream::iter(frames(&data)),
            Some(THRESHOLD),
            None,
            &cancel,
        )
        .await
        .unwrap();
    let first = std::fs::read(ChunkStore::chunk_path(dir.path(), "at", 0)).unwrap();
    assert_eq!(first.len(), LARGE_CHUNK);

    // One byte below: the small split, ceil(299 / 4) = 75.
    let dir = TempDir::new().unwrap();
    let data = payload(THRESHOLD as usize - 1);
    store
        .write_sequential(
            dir.path(),
            "below",
            stream::iter(frames(&data)),
            Some(THRESHOLD - 1),
            None,
            &cancel,
        )
        .await
        .unwrap();
    let first = std::fs::read(ChunkStore::chunk_path(dir.path(), "below", 0)).unwrap();
    assert_eq!(first.len(), 75);
}

#[tokio::test]
async fn unknown_size_uses_large_chunks() {
    let dir = TempDir::new().unwrap();
    let store = test_store();
    let data = payload(50);

    store
        .write_sequential(
            dir.path(),
            "unknown",
            stream::iter(frames(&data)),
            None,
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    // 50 bytes below the large chunk size: one partial chunk.
    let (assembled, _) = assemble(dir.path(), "unknown").unwrap();
    assert_eq!(assembled, data);
    assert_eq!(
        std::fs::read(ChunkStore::chunk_path(dir.path(), "unknown", 0))
            .unwrap()
            .len(),
        50
    );
}
