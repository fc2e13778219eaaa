//! The metadata-record boundary.
//!
//! The relational store itself is an external collaborator; this crate
//! only assumes the narrow [`MetadataStore`] trait and the record shape
//! below. [`MemoryMetadataStore`] is an in-process implementation used
//! by tests and embedders without a database.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::IngestError;

/// Record lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaStatus {
    Processing,
    Enabled,
    Deleted,
}

/// One ingested logical file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MediaRecord {
    /// Content hash; the dedup key and the chunk-set directory name.
    pub content_hash: String,
    pub name: String,
    pub size: u64,
    /// Extension without the dot, e.g. `mp4`.
    pub extension: String,
    pub mime: String,
    pub status: MediaStatus,
    pub manifest: ChunkManifest,
    /// Encrypted thumbnail filename, when one exists.
    pub thumbnail_ref: Option<String>,
    /// Relative path of the encrypted HLS manifest, when one exists.
    pub hls_ref: Option<String>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Where a record's chunk files live.
///
/// The field has carried three shapes over the system's life: a JSON
/// object with chunk names and a storage directory, a JSON string
/// holding an array of full paths, and nothing at all. The shape is
/// resolved once, here, into this tagged form; call sites only ever see
/// [`ChunkManifest::resolve`].
#[derive(Clone, Debug, PartialEq)]
pub enum ChunkManifest {
    /// Current format: ordered chunk filenames plus their directory.
    Chunks {
        chunks: Vec<String>,
        storage_dir: PathBuf,
    },
    /// Historical format: full paths, one per chunk, in order.
    LegacyPaths(Vec<String>),
    Empty,
}

impl ChunkManifest {
    /// Interpret a raw metadata value in any of the historical shapes.
    pub fn parse(raw: Option<&Value>) -> Self {
        match raw {
            None | Some(Value::Null) => Self::Empty,
            Some(Value::String(text)) => match serde_json::from_str::<Value>(text) {
                Ok(Value::Array(items)) => {
                    let paths: Vec<String> = items
                        .into_iter()
                        .filter_map(|v| v.as_str().map(ToString::to_string))
                        .collect();
                    if paths.is_empty() {
                        Self::Empty
                    } else {
                        Self::LegacyPaths(paths)
                    }
                }
                Ok(Value::Object(map)) => Self::from_object(&map),
                Ok(_) | Err(_) => {
                    warn!("unparseable chunk manifest string, treating as empty");
                    Self::Empty
                }
            },
            Some(Value::Object(map)) => Self::from_object(map),
            Some(_) => Self::Empty,
        }
    }

    fn from_object(map: &serde_json::Map<String, Value>) -> Self {
        let chunks: Vec<String> = map
            .get("chunks")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(ToString::to_string))
                    .collect()
            })
            .unwrap_or_default();
        let storage_dir = map
            .get("storage_dir")
            .and_then(Value::as_str)
            .map(PathBuf::from);
        match (chunks.is_empty(), storage_dir) {
            (false, Some(dir)) => Self::Chunks {
                chunks,
                storage_dir: dir,
            },
            _ => Self::Empty,
        }
    }

    /// Canonical in-memory shape: ordered chunk names plus the
    /// directory holding them. `None` when the record has no chunks.
    pub fn resolve(&self) -> Option<(Vec<String>, PathBuf)> {
        match self {
            Self::Chunks {
                chunks,
                storage_dir,
            } => Some((chunks.clone(), storage_dir.clone())),
            Self::LegacyPaths(paths) => {
                let names: Vec<String> = paths
                    .iter()
                    .filter_map(|p| {
                        p.replace('\\', "/")
                            .rsplit('/')
                            .next()
                            .filter(|n| !n.is_empty())
                            .map(ToString::to_string)
                    })
                    .collect();
                let dir = paths.first().map(|p| {
                    let normalized = p.replace('\\', "/");
                    Path::new(&normalized)
                        .parent()
                        .map(Path::to_path_buf)
                        .unwrap_or_default()
                })?;
                if names.is_empty() {
                    None
                } else {
                    Some((names, dir))
                }
            }
            Self::Empty => None,
        }
    }
}

impl Serialize for ChunkManifest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Chunks {
                chunks,
                storage_dir,
            } => {
                let mut map = serde_json::Map::new();
                map.insert("chunks".into(), serde_json::json!(chunks));
                map.insert(
                    "storage_dir".into(),
                    serde_json::json!(storage_dir.to_string_lossy()),
                );
                Value::Object(map).serialize(serializer)
            }
            // Legacy records keep their string-encoded path array.
            Self::LegacyPaths(paths) => {
                let encoded =
                    serde_json::to_string(paths).map_err(serde::ser::Error::custom)?;
                Value::String(encoded).serialize(serializer)
            }
            Self::Empty => Value::Null.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ChunkManifest {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(Self::parse(value.as_ref()))
    }
}

/// Narrow interface to the external metadata store.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Look a record up by content hash.
    async fn find_by_hash(&self, hash: &str) -> Result<Option<MediaRecord>, IngestError>;

    /// Persist a new record.
    async fn insert(&self, record: &MediaRecord) -> Result<(), IngestError>;

    /// Persist changes to an existing record.
    async fn update(&self, record: &MediaRecord) -> Result<(), IngestError>;
}

/// In-memory [`MetadataStore`], keyed by content hash.
#[derive(Default)]
pub struct MemoryMetadataStore {
    records: RwLock<HashMap<String, MediaRecord>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn find_by_hash(&self, hash: &str) -> Result<Option<MediaRecord>, IngestError> {
        Ok(self.records.read().get(hash).cloned())
    }

    async fn insert(&self, record: &MediaRecord) -> Result<(), IngestError> {
        self.records
            .write()
            .insert(record.content_hash.clone(), record.clone());
        Ok(())
    }

    async fn update(&self, record: &MediaRecord) -> Result<(), IngestError> {
        let mut guard = self.records.write();
        if !guard.contains_key(&record.content_hash) {
            return Err(IngestError::Metadata(format!(
                "no record for hash {}",
                record.content_hash
            )));
        }
        guard.insert(record.content_hash.clone(), record.clone());
        Ok(())
    }
}
