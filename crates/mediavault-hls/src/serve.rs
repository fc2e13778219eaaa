//! Serving-side decryption helpers.
//!
//! The web layer calls these to turn stored artifacts back into
//! playable responses: decrypt the manifest and point its references
//! at content endpoints, and decrypt segments while tolerating legacy
//! unencrypted segments and player-handled AES-128 ones.

use std::path::Path;

use mediavault_cipher::{decrypt_text_token, xor_in_place, ObfuscationKey};
use regex::Regex;
use tracing::debug;

use crate::error::{HlsError, HlsResult};

/// MPEG-TS packets start with this sync byte.
const TS_SYNC_BYTE: u8 = 0x47;

/// Rewrite a decrypted manifest for serving.
///
/// Every segment reference (with or without the stored `.enc` marker)
/// is replaced by `segment_url(filename)`; key-delivery URIs that are
/// local paths are routed through `key_uri_prefix`, absolute external
/// URIs stay as they are.
pub fn rewrite_for_serving(
    manifest: &str,
    segment_url: impl Fn(&str) -> String,
    key_uri_prefix: &str,
) -> String {
    let seg_pattern =
        Regex::new(r"([A-Za-z0-9_\-]+\.ts)(\.enc)?").expect("static segment pattern");
    let text = seg_pattern
        .replace_all(manifest, |caps: &regex::Captures<'_>| segment_url(&caps[1]))
        .into_owned();

    let key_pattern = Regex::new(r#"URI="([^"]+)""#).expect("static key pattern");
    key_pattern
        .replace_all(&text, |caps: &regex::Captures<'_>| {
            let uri = &caps[1];
            if uri.starts_with("http://") || uri.starts_with("https://") {
                caps[0].to_string()
            } else {
                let basename = uri.rsplit('/').next().unwrap_or(uri);
                format!(r#"URI="{key_uri_prefix}{basename}""#)
            }
        })
        .into_owned()
}

/// Read and decrypt a stored manifest, rewriting it for serving.
///
/// # Errors
///
/// [`HlsError::Manifest`] for undecodable content, I/O errors for a
/// missing file.
pub async fn read_manifest(
    key: &ObfuscationKey,
    path: &Path,
    segment_url: impl Fn(&str) -> String,
    key_uri_prefix: &str,
) -> HlsResult<String> {
    let token = tokio::fs::read_to_string(path).await?;
    let decrypted = decrypt_text_token(key, &token)?;
    let manifest = String::from_utf8(decrypted)
        .map_err(|e| HlsError::Manifest(format!("manifest is not UTF-8: {e}")))?;
    Ok(rewrite_for_serving(&manifest, segment_url, key_uri_prefix))
}

/// Read a segment file, decrypting when needed.
///
/// Bytes already starting with the MPEG-TS sync byte are served as-is
/// (legacy unencrypted segments). Otherwise the XOR transform is
/// applied and kept only if the result looks like a TS stream; a
/// segment under player-handled AES-128 stays raw for the player to
/// decrypt.
pub async fn read_segment(key: &ObfuscationKey, path: &Path) -> HlsResult<Vec<u8>> {
    let data = tokio::fs::read(path).await?;
    if data.first() == Some(&TS_SYNC_BYTE) {
        debug!(path = %path.display(), "segment already plaintext");
        return Ok(data);
    }

    let mut decrypted = data.clone();
    xor_in_place(key, &mut decrypted);
    if decrypted.first() == Some(&TS_SYNC_BYTE) {
        return Ok(decrypted);
    }

    debug!(
        path = %path.display(),
        "segment is neither plaintext nor XOR-obscured, serving raw"
    );
    Ok(data)
}
