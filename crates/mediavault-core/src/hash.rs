//! Content hashing.
//!
//! Identity of a stored payload is the MD5 of its bytes, rendered as a
//! 32-character lowercase hex string. MD5 is kept for on-disk layout
//! compatibility (hashes are directory names and dedup keys), not as a
//! security boundary.

use md5::{Digest, Md5};

/// Hex-encoded MD5 of `data`, lowercase.
pub fn content_hash(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(32);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Incremental content hasher for payloads that are read in pieces.
#[derive(Default)]
pub struct ContentHasher {
    inner: Md5,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    pub fn finish(self) -> String {
        let digest = self.inner.finalize();
        let mut out = String::with_capacity(32);
        for byte in digest {
            use std::fmt::Write;
            let _ = write!(out, "{byte:02x}");
        }
        out
    }
}

/// True iff `value` looks like a content hash (32 hex characters).
pub fn is_content_hash(value: &str) -> bool {
    value.len() == 32 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::empty(b"", "d41d8cd98f00b204e9800998ecf8427e")]
    #[case::abc(b"abc", "900150983cd24fb0d6963f7d28e17f72")]
    #[case::merged(b"AAABBBCCC", "6207b5df5796e963410d3bc4b6a4218b")]
    fn content_hash_known_vectors(#[case] input: &[u8], #[case] expected: &str) {
        assert_eq!(content_hash(input), expected);
    }

    #[test]
    fn incremental_matches_oneshot() {
        let mut hasher = ContentHasher::new();
        hasher.update(b"AAA");
        hasher.update(b"BBB");
        hasher.update(b"CCC");
        assert_eq!(hasher.finish(), content_hash(b"AAABBBCCC"));
    }

    #[rstest]
    #[case("d41d8cd98f00b204e9800998ecf8427e", true)]
    #[case("D41D8CD98F00B204E9800998ECF8427E", true)]
    #[case("d41d8cd98f00b204e9800998ecf8427", false)]
    #[case("not-a-hash-at-all-not-a-hash-at!", false)]
    #[case("", false)]
    fn content_hash_shape(#[case] value: &str, #[case] expected: bool) {
        assert_eq!(is_content_hash(value), expected);
    }
}
