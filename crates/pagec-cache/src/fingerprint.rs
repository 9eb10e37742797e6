//! Cache key computation.

use std::fmt;

use sha2::{Digest, Sha256};

/// Content hash identifying a cache entry.
///
/// Hex-encoded SHA-256 (64 characters) of the transform inputs. Collisions
/// are treated as impossible: equal fingerprints mean equal bodies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint a single input buffer.
    #[must_use]
    pub fn of(inputs: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(inputs);
        Self(hex::encode(hasher.finalize()))
    }

    /// The hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Two-character shard directory for this fingerprint.
    pub(crate) fn shard(&self) -> &str {
        &self.0[..2]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
