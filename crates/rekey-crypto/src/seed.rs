//! Per-generation team seed.

use std::fmt;

use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Seed size in bytes.
pub const SEED_SIZE: usize = 32;

/// Secret seed of one key generation.
///
/// All application keys of a generation are derived from this value. The
/// buffer is wiped when the seed is dropped, and comparisons run in constant
/// time.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct TeamSeed([u8; SEED_SIZE]);

impl TeamSeed {
    /// Wrap raw seed bytes.
    ///
    /// In production the bytes MUST come from a cryptographically secure RNG.
    pub fn from_bytes(bytes: [u8; SEED_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw seed bytes.
    pub fn as_bytes(&self) -> &[u8; SEED_SIZE] {
        &self.0
    }
}

impl PartialEq for TeamSeed {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_slice().ct_eq(other.0.as_slice()).into()
    }
}

impl Eq for TeamSeed {}

impl fmt::Debug for TeamSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TeamSeed(<redacted>)")
    }
}
