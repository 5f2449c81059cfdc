//! Handshake transcript hashing.
//!
//! Until the cipher suite is pinned, the handshake does not know which digest
//! the Finished and CertificateVerify derivations will need, so four running
//! contexts are maintained in parallel and fed identically. Every byte of
//! every handshake message, header included, is fed exactly once in wire
//! order.

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384};

/// Running hashes over the handshake transcript.
#[derive(Clone)]
pub struct TranscriptHash {
    md5: Md5,
    sha1: Sha1,
    sha256: Sha256,
    sha384: Sha384,
}

impl TranscriptHash {
    /// Create a fresh transcript.
    pub fn new() -> Self {
        Self {
            md5: Md5::new(),
            sha1: Sha1::new(),
            sha256: Sha256::new(),
            sha384: Sha384::new(),
        }
    }

    /// Feed `data` into all running contexts.
    pub fn update(&mut self, data: &[u8]) {
        self.md5.update(data);
        self.sha1.update(data);
        self.sha256.update(data);
        self.sha384.update(data);
    }

    /// MD5 digest of the transcript so far.
    pub fn md5_current(&self) -> [u8; 16] {
        self.md5.clone().finalize().into()
    }

    /// SHA-1 digest of the transcript so far.
    pub fn sha1_current(&self) -> [u8; 20] {
        self.sha1.clone().finalize().into()
    }

    /// SHA-256 digest of the transcript so far.
    pub fn sha256_current(&self) -> [u8; 32] {
        self.sha256.clone().finalize().into()
    }

    /// SHA-384 digest of the transcript so far.
    pub fn sha384_current(&self) -> [u8; 48] {
        self.sha384.clone().finalize().into()
    }
}

impl Default for TranscriptHash {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_direct_digest() {
        let mut transcript = TranscriptHash::new();
        transcript.update(b"hello ");
        transcript.update(b"world");

        let mut sha256 = Sha256::new();
        sha256.update(b"hello world");
        let expected: [u8; 32] = sha256.finalize().into();
        assert_eq!(transcript.sha256_current(), expected);

        let mut sha384 = Sha384::new();
        sha384.update(b"hello world");
        let expected: [u8; 48] = sha384.finalize().into();
        assert_eq!(transcript.sha384_current(), expected);
    }

    #[test]
    fn test_snapshot_does_not_consume() {
        let mut transcript = TranscriptHash::new();
        transcript.update(b"abc");
        let first = transcript.sha1_current();
        assert_eq!(first, transcript.sha1_current());

        transcript.update(b"def");
        assert_ne!(first, transcript.sha1_current());
    }

    #[test]
    fn test_contexts_fed_identically() {
        let mut a = TranscriptHash::new();
        let mut b = TranscriptHash::new();
        a.update(b"one");
        a.update(b"two");
        b.update(b"onetwo");
        assert_eq!(a.md5_current(), b.md5_current());
        assert_eq!(a.sha384_current(), b.sha384_current());
    }
}
