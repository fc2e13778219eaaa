//! Post-registration artifact hooks.
//!
//! Derived artifacts (thumbnail now, HLS later) are produced by an
//! ordered list of hooks that run after a record is registered. Each
//! hook fails independently: a failure is logged and surfaces only as
//! an absent artifact reference, never as a rolled-back registration.

use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use mediavault_cipher::{encrypt_text_token, ObfuscationKey};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{error::IngestResult, record::MediaRecord};

/// Per-ingestion context handed to hooks.
pub struct HookContext<'a> {
    /// Directory holding the record's chunk files and artifacts.
    pub storage_dir: &'a Path,
    /// Caller-supplied thumbnail bytes, when the upload carried any.
    pub thumbnail: Option<&'a [u8]>,
}

/// One best-effort derived-artifact producer.
#[async_trait]
pub trait ArtifactHook: Send + Sync {
    fn name(&self) -> &'static str;

    /// Produce the artifact and record its reference on `record`.
    ///
    /// # Errors
    ///
    /// Hook errors are logged by the pipeline and do not propagate.
    async fn run(&self, ctx: &HookContext<'_>, record: &mut MediaRecord) -> IngestResult<()>;
}

/// Encrypts caller-supplied thumbnail bytes into a `thumb_{uuid}.enc`
/// artifact next to the chunk files.
///
/// The artifact is base64 text of the XOR-encrypted image, so it can be
/// stored and served through text-only channels.
pub struct ThumbnailHook {
    key: Arc<ObfuscationKey>,
}

impl ThumbnailHook {
    pub fn new(key: Arc<ObfuscationKey>) -> Self {
        Self { key }
    }
}

#[async_trait]
impl ArtifactHook for ThumbnailHook {
    fn name(&self) -> &'static str {
        "thumbnail"
    }

    async fn run(&self, ctx: &HookContext<'_>, record: &mut MediaRecord) -> IngestResult<()> {
        let Some(thumbnail) = ctx.thumbnail else {
            debug!(hash = %record.content_hash, "no thumbnail bytes supplied, skipping");
            return Ok(());
        };

        let token = encrypt_text_token(&self.key, thumbnail);
        let filename = format!("thumb_{}.enc", Uuid::new_v4());
        tokio::fs::write(ctx.storage_dir.join(&filename), token).await?;

        record.thumbnail_ref = Some(filename.clone());
        info!(
            hash = %record.content_hash,
            artifact = %filename,
            bytes = thumbnail.len(),
            "thumbnail artifact stored"
        );
        Ok(())
    }
}
