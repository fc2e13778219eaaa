use crate::error::{CipherError, CipherResult};

/// Fixed keystream length in bytes.
pub const KEY_LEN: usize = 32;

/// Process-wide obfuscation key, derived once from a secret and
/// read-only afterwards.
///
/// Derivation stretches a secret of arbitrary length by
/// self-concatenation until it covers [`KEY_LEN`] bytes, then
/// truncates. The key is unversioned: rotating the secret silently
/// breaks decryption of everything encrypted under the old one.
#[derive(Clone)]
pub struct ObfuscationKey {
    bytes: [u8; KEY_LEN],
}

impl ObfuscationKey {
    /// Derive the key from `secret`.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::EmptySecret`] for an empty secret, which
    /// could never produce a keystream.
    pub fn derive(secret: &[u8]) -> CipherResult<Self> {
        if secret.is_empty() {
            return Err(CipherError::EmptySecret);
        }
        let mut bytes = [0u8; KEY_LEN];
        for (i, slot) in bytes.iter_mut().enumerate() {
            *slot = secret[i % secret.len()];
        }
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl std::fmt::Debug for ObfuscationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of logs.
        f.debug_struct("ObfuscationKey").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_secret_is_stretched() {
        let key = ObfuscationKey::derive(b"ab").unwrap();
        let expected: Vec<u8> = b"ab".iter().copied().cycle().take(KEY_LEN).collect();
        assert_eq!(key.as_bytes().as_slice(), expected.as_slice());
    }

    #[test]
    fn long_secret_is_truncated() {
        let secret = vec![7u8; 100];
        let key = ObfuscationKey::derive(&secret).unwrap();
        assert_eq!(key.as_bytes(), &[7u8; KEY_LEN]);
    }

    #[test]
    fn exact_length_secret_is_used_verbatim() {
        let secret: Vec<u8> = (0..KEY_LEN as u8).collect();
        let key = ObfuscationKey::derive(&secret).unwrap();
        assert_eq!(key.as_bytes().as_slice(), secret.as_slice());
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(matches!(
            ObfuscationKey::derive(b""),
            Err(CipherError::EmptySecret)
        ));
    }

    #[test]
    fn debug_does_not_leak_key_material() {
        let key = ObfuscationKey::derive(b"super-secret").unwrap();
        let rendered = format!("{key:?}");
        assert!(!rendered.contains("super-secret"));
    }
}
