//! Seed sealing ("boxing") to a member's X25519 box key.
//!
//! All functions are pure - ephemeral secrets and nonces must be provided by
//! the caller. This keeps the rotation engine deterministic under simulation.

use std::fmt;

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use curve25519_dalek::montgomery::MontgomeryPoint;
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    error::CryptoError,
    seed::{SEED_SIZE, TeamSeed},
};

/// Size of the `XChaCha20` nonce (24 bytes)
pub const NONCE_SIZE: usize = 24;

/// Label used when expanding the X25519 shared secret
const SEAL_LABEL: &[u8] = b"rekeySealV1";

/// X25519 key pair a member's seeds are sealed to.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct BoxKeyPair {
    secret: [u8; 32],
    #[zeroize(skip)]
    public: [u8; 32],
}

impl BoxKeyPair {
    /// Build a key pair from 32 random bytes.
    ///
    /// The bytes are clamped on use, so any 32 bytes form a valid secret.
    pub fn from_secret_bytes(secret: [u8; 32]) -> Self {
        let public = MontgomeryPoint::mul_base_clamped(secret).to_bytes();
        Self { secret, public }
    }

    /// Public half, published on the ledger as the member's box key.
    pub fn public_key(&self) -> [u8; 32] {
        self.public
    }

    /// Secret half, for persisting the key pair in a local keystore.
    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret
    }
}

impl fmt::Debug for BoxKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxKeyPair").field("public", &self.public).finish_non_exhaustive()
    }
}

/// A seed sealed to one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedSeed {
    /// Ephemeral X25519 public key of the sender
    pub ephemeral_public: [u8; 32],
    /// The 24-byte `XChaCha20` nonce
    pub nonce: [u8; NONCE_SIZE],
    /// The ciphertext including 16-byte Poly1305 tag
    pub ciphertext: Vec<u8>,
}

/// Seal `seed` to `recipient_public`.
///
/// `context` is authenticated but not encrypted; the opener must supply the
/// same bytes. Callers bind it to the team and generation.
///
/// # Security
///
/// - `ephemeral_secret` and `nonce` MUST come from a cryptographically secure
///   RNG in production and MUST NOT be reused
/// - Low-order recipient keys yield an all-zero shared secret and are rejected
pub fn seal_seed(
    recipient_public: &[u8; 32],
    seed: &TeamSeed,
    context: &[u8],
    ephemeral_secret: [u8; 32],
    nonce: [u8; NONCE_SIZE],
) -> Result<SealedSeed, CryptoError> {
    let ephemeral = BoxKeyPair::from_secret_bytes(ephemeral_secret);
    let shared = MontgomeryPoint(*recipient_public).mul_clamped(*ephemeral.secret_bytes());

    let mut key = shared_key(shared, &ephemeral.public_key(), recipient_public)?;
    let cipher = XChaCha20Poly1305::new((&key).into());
    key.zeroize();

    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), Payload { msg: seed.as_bytes(), aad: context })
        .map_err(|_| CryptoError::SealFailed { reason: "AEAD encryption failed".to_string() })?;

    Ok(SealedSeed { ephemeral_public: ephemeral.public_key(), nonce, ciphertext })
}

/// Open a sealed seed with the recipient's key pair.
///
/// # Errors
///
/// - `OpenFailed`: wrong recipient, wrong `context`, or tampered ciphertext
/// - `InvalidKey`: the ephemeral key is a low-order point
pub fn open_seed(
    recipient: &BoxKeyPair,
    sealed: &SealedSeed,
    context: &[u8],
) -> Result<TeamSeed, CryptoError> {
    let shared = MontgomeryPoint(sealed.ephemeral_public).mul_clamped(*recipient.secret_bytes());

    let mut key = shared_key(shared, &sealed.ephemeral_public, &recipient.public_key())?;
    let cipher = XChaCha20Poly1305::new((&key).into());
    key.zeroize();

    let mut plaintext = cipher
        .decrypt(
            XNonce::from_slice(&sealed.nonce),
            Payload { msg: sealed.ciphertext.as_slice(), aad: context },
        )
        .map_err(|_| CryptoError::OpenFailed { reason: "authentication failed".to_string() })?;

    if plaintext.len() != SEED_SIZE {
        let got = plaintext.len();
        plaintext.zeroize();
        return Err(CryptoError::OpenFailed {
            reason: format!("expected {SEED_SIZE} byte seed, got {got}"),
        });
    }

    let mut bytes = [0u8; SEED_SIZE];
    bytes.copy_from_slice(&plaintext);
    plaintext.zeroize();

    Ok(TeamSeed::from_bytes(bytes))
}

/// Expand an X25519 shared secret into an AEAD key bound to both public keys.
fn shared_key(
    shared: MontgomeryPoint,
    ephemeral_public: &[u8; 32],
    recipient_public: &[u8; 32],
) -> Result<[u8; 32], CryptoError> {
    let mut shared = shared.to_bytes();
    if shared.iter().all(|&b| b == 0) {
        return Err(CryptoError::InvalidKey { reason: "low-order point" });
    }

    // Salt: ephemeral_public || recipient_public
    let mut salt = [0u8; 64];
    salt[..32].copy_from_slice(ephemeral_public);
    salt[32..].copy_from_slice(recipient_public);

    let hkdf = Hkdf::<Sha256>::new(Some(&salt), &shared);
    shared.zeroize();

    let mut key = [0u8; 32];
    let Ok(()) = hkdf.expand(SEAL_LABEL, &mut key) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };

    Ok(key)
}
