//! Reconstructing a payload from its chunk set.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{
    chunks::ChunkStore,
    error::{StorageError, StorageResult},
};

/// Default extension when no sidecar resolves.
const DEFAULT_EXTENSION: &str = ".jpg";

/// Longest sidecar content accepted as an extension.
const MAX_EXTENSION_LEN: usize = 10;

/// Enumerate the chunk files of `file_id` in numeric order.
///
/// Directory listing order is not guaranteed numeric, so the trailing
/// `.part{N}` suffix of each filename is parsed and the files sorted by
/// that index. Only the contiguous run starting at index 0 is
/// returned: a missing index terminates enumeration, sparse sets do
/// not exist.
pub fn ordered_chunk_paths(base_dir: &Path, file_id: &str) -> Vec<PathBuf> {
    let prefix = format!("{file_id}.part");
    let mut indexed: Vec<(usize, PathBuf)> = Vec::new();

    let Ok(entries) = std::fs::read_dir(base_dir) else {
        return Vec::new();
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(suffix) = name.strip_prefix(&prefix) else {
            continue;
        };
        if let Ok(index) = suffix.parse::<usize>() {
            indexed.push((index, entry.path()));
        }
    }

    indexed.sort_by_key(|(index, _)| *index);

    let mut ordered = Vec::with_capacity(indexed.len());
    for (expected, (index, path)) in indexed.into_iter().enumerate() {
        if index != expected {
            break;
        }
        ordered.push(path);
    }
    ordered
}

/// Resolve the stored extension for `file_id`.
///
/// Order: the `{file_id}.ext` sidecar, then the legacy sidecar named
/// exactly `{file_id}`, then the `.jpg` default. A missing or corrupt
/// sidecar falls back rather than failing: content must be UTF-8,
/// start with a dot and be short to be accepted.
pub fn resolve_extension(base_dir: &Path, file_id: &str) -> String {
    let candidates = [
        ChunkStore::ext_path(base_dir, file_id),
        base_dir.join(file_id),
    ];
    for path in candidates {
        if let Some(ext) = read_sidecar(&path) {
            return ext;
        }
    }
    DEFAULT_EXTENSION.to_string()
}

fn read_sidecar(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let trimmed = content.trim();
    if trimmed.starts_with('.') && trimmed.len() < MAX_EXTENSION_LEN {
        Some(trimmed.to_string())
    } else {
        None
    }
}

/// Reassemble the full payload of `file_id` from `base_dir`.
///
/// Returns the bytes and the resolved extension.
///
/// # Errors
///
/// [`StorageError::MissingChunks`] when no chunk index 0 exists,
/// [`StorageError::Io`] when a chunk file cannot be read.
pub fn assemble(base_dir: &Path, file_id: &str) -> StorageResult<(Vec<u8>, String)> {
    let paths = ordered_chunk_paths(base_dir, file_id);
    if paths.is_empty() {
        return Err(StorageError::MissingChunks {
            file_id: file_id.to_string(),
        });
    }

    let mut data = Vec::new();
    for path in &paths {
        data.extend_from_slice(&std::fs::read(path)?);
    }

    let extension = resolve_extension(base_dir, file_id);
    debug!(
        file_id,
        chunks = paths.len(),
        bytes = data.len(),
        "assembled chunk set"
    );
    Ok((data, extension))
}

/// Reassemble `file_id` from the first candidate directory that holds
/// its chunk set directory, in the given priority order.
///
/// Each candidate is probed for a `{candidate}/{file_id}` directory.
///
/// # Errors
///
/// [`StorageError::MissingChunks`] when no candidate contains the set.
pub fn assemble_from(candidates: &[PathBuf], file_id: &str) -> StorageResult<(Vec<u8>, String)> {
    for candidate in candidates {
        let base_dir = candidate.join(file_id);
        if base_dir.is_dir() {
            return assemble(&base_dir, file_id);
        }
    }
    Err(StorageError::MissingChunks {
        file_id: file_id.to_string(),
    })
}
