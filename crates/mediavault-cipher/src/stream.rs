use base64::{engine::general_purpose::STANDARD, Engine};

use crate::{error::CipherResult, key::ObfuscationKey};

/// XOR `buf` against the repeating keystream, in place.
///
/// The keystream position starts at 0 for every call: each
/// independently encrypted unit (chunk, segment, thumbnail, manifest)
/// is aligned to the start of the key, never carried across units.
/// Applying the transform twice with the same key restores the input.
pub fn xor_in_place(key: &ObfuscationKey, buf: &mut [u8]) {
    let key_bytes = key.as_bytes();
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte ^= key_bytes[i % key_bytes.len()];
    }
}

/// Encrypt `data` and encode the result as base64 text.
///
/// Used wherever the encrypted form must live inside a text file:
/// playlist manifests and thumbnail artifacts.
pub fn encrypt_text_token(key: &ObfuscationKey, data: &[u8]) -> String {
    let mut buf = data.to_vec();
    xor_in_place(key, &mut buf);
    STANDARD.encode(buf)
}

/// Decode a base64 text token and decrypt it back to the original bytes.
///
/// # Errors
///
/// Returns [`CipherError::Transport`](crate::CipherError::Transport)
/// when `token` is not valid base64.
pub fn decrypt_text_token(key: &ObfuscationKey, token: &str) -> CipherResult<Vec<u8>> {
    let mut buf = STANDARD.decode(token.trim())?;
    xor_in_place(key, &mut buf);
    Ok(buf)
}
