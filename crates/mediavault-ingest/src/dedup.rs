//! Content-hash deduplication.

use std::sync::Arc;

use tracing::debug;

use crate::{
    error::IngestResult,
    record::{MediaRecord, MetadataStore},
};

/// Existence check by content hash.
///
/// This is the single source of truth for avoiding duplicate logical
/// files, independent of the chunk store's filesystem probe: the probe
/// only prevents re-downloading the *same* file id, while this catches
/// identical content arriving under a different id.
#[derive(Clone)]
pub struct DedupIndex {
    store: Arc<dyn MetadataStore>,
}

impl DedupIndex {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// The already-registered record for `hash`, if any. Soft-deleted
    /// records still count: their chunk files are gone but the logical
    /// file existed, and re-registering would orphan the old record.
    ///
    /// # Errors
    ///
    /// Propagates metadata-store failures.
    pub async fn exists_by_hash(&self, hash: &str) -> IngestResult<Option<MediaRecord>> {
        let found = self.store.find_by_hash(hash).await?;
        if found.is_some() {
            debug!(hash, "content hash already registered");
        }
        Ok(found)
    }
}
