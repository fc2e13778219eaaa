//! Remote acquisition: fetch → chunk → store.

use std::path::Path;

use futures::TryStreamExt;
use mediavault_net::{RetryingFetcher, SessionFactory};
use mediavault_storage::ChunkStore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use crate::error::IngestResult;

/// One downloadable rendition of a remote media item (e.g. preview,
/// sample, full resolution), stored in its own subdirectory of the
/// item's partition.
#[derive(Clone, Debug)]
pub struct MediaVariant {
    pub name: String,
    pub url: Url,
}

/// Per-item acquisition outcome across variants. One variant failing
/// never aborts the others.
#[derive(Debug, Default)]
pub struct VariantReport {
    pub success: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

impl VariantReport {
    /// At least one variant landed, so the item counts as downloaded.
    pub fn any_success(&self) -> bool {
        self.success > 0
    }
}

/// Extension for a stored download, taken from the URL path. Falls back
/// to `.jpg` when the path carries none.
pub fn extension_from_url(url: &Url) -> String {
    Path::new(url.path())
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_else(|| ".jpg".to_string())
}

/// Stream `url` into a sequential chunk set under `base_dir`.
///
/// If chunk index 0 already exists the download is skipped entirely and
/// the existing chunk count returned: re-invoking for an already
/// stored id performs no network I/O. The response's Content-Length,
/// when present, feeds the chunk sizing policy.
///
/// # Errors
///
/// Fetch errors after the retry policy is exhausted, and storage errors
/// including cancellation.
pub async fn download_media<F: SessionFactory>(
    fetcher: &RetryingFetcher<F>,
    store: &ChunkStore,
    url: &Url,
    base_dir: &Path,
    file_id: &str,
    cancel: &CancellationToken,
) -> IngestResult<usize> {
    if store.exists(base_dir, file_id) {
        let count = store.count_existing(base_dir, file_id);
        info!(file_id, count, "chunk set already stored, skipping download");
        return Ok(count);
    }

    let (stream, content_length) = fetcher.fetch_stream(url).await?;
    let extension = extension_from_url(url);

    let io_stream = stream.map_err(std::io::Error::other);
    let count = store
        .write_sequential(
            base_dir,
            file_id,
            Box::pin(io_stream),
            content_length,
            Some(&extension),
            cancel,
        )
        .await?;

    info!(file_id, %url, chunks = count, "download stored");
    Ok(count)
}

/// Download every variant of one item into
/// `{partition}/{variant.name}/`, accumulating per-variant failures
/// instead of aborting.
pub async fn download_variants<F: SessionFactory>(
    fetcher: &RetryingFetcher<F>,
    store: &ChunkStore,
    variants: &[MediaVariant],
    partition: &Path,
    file_id: &str,
    cancel: &CancellationToken,
) -> VariantReport {
    let mut report = VariantReport::default();

    for variant in variants {
        if cancel.is_cancelled() {
            break;
        }
        let base_dir = partition.join(&variant.name);
        match download_media(fetcher, store, &variant.url, &base_dir, file_id, cancel).await {
            Ok(_) => report.success += 1,
            Err(error) => {
                warn!(variant = %variant.name, %error, "variant download failed");
                report.failed += 1;
                report.errors.push(format!("{}: {error}", variant.name));
            }
        }
    }
    report
}
