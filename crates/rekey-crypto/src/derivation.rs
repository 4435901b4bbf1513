//! Application key derivation using HKDF

use std::fmt;

use hkdf::Hkdf;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::seed::TeamSeed;

/// Label used for application key derivation
const APPLICATION_KEY_LABEL: &[u8] = b"rekeyApplicationV1";

/// Application key size in bytes.
pub const APPLICATION_KEY_SIZE: usize = 32;

/// Key for one application at one key generation.
///
/// Derived deterministically from the generation's seed. Key material is
/// zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ApplicationKey {
    #[zeroize(skip)]
    generation: u64,
    #[zeroize(skip)]
    application_id: u32,
    key: [u8; APPLICATION_KEY_SIZE],
}

impl ApplicationKey {
    /// Generation whose seed produced this key.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Application identifier mixed into the derivation.
    pub fn application_id(&self) -> u32 {
        self.application_id
    }

    /// Symmetric key material.
    pub fn key(&self) -> &[u8; APPLICATION_KEY_SIZE] {
        &self.key
    }
}

impl PartialEq for ApplicationKey {
    fn eq(&self, other: &Self) -> bool {
        self.generation == other.generation
            && self.application_id == other.application_id
            && bool::from(self.key.as_slice().ct_eq(other.key.as_slice()))
    }
}

impl Eq for ApplicationKey {}

impl fmt::Debug for ApplicationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationKey")
            .field("generation", &self.generation)
            .field("application_id", &self.application_id)
            .finish_non_exhaustive()
    }
}

/// Derive the key for `application_id` from a generation's seed.
///
/// # Security
///
/// - Different applications produce unrelated keys (domain separation)
/// - Different seeds produce unrelated keys, so rotation cuts off the new
///   generation from anyone who only held the old seed
/// - Deterministic: the output depends only on `(seed, application_id)`;
///   `generation` is carried as metadata
pub fn derive_application_key(
    seed: &TeamSeed,
    generation: u64,
    application_id: u32,
) -> ApplicationKey {
    let hkdf = Hkdf::<Sha256>::new(None, seed.as_bytes());

    // Capacity: 18 (label) + 4 (application_id) = 22
    let mut info = Vec::with_capacity(22);
    info.extend_from_slice(APPLICATION_KEY_LABEL);
    info.extend_from_slice(&application_id.to_be_bytes());

    let mut key = [0u8; APPLICATION_KEY_SIZE];
    let Ok(()) = hkdf.expand(&info, &mut key) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };

    ApplicationKey { generation, application_id, key }
}
