//! Error types for seed sealing and key handling.

use thiserror::Error;

/// Errors from cryptographic operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Sealing a seed failed.
    #[error("seal failed: {reason}")]
    SealFailed {
        /// What went wrong
        reason: String,
    },

    /// Opening a sealed seed failed (wrong recipient, wrong context, or
    /// tampered ciphertext).
    #[error("open failed: {reason}")]
    OpenFailed {
        /// What went wrong
        reason: String,
    },

    /// Public key is unusable for key agreement.
    #[error("invalid box key: {reason}")]
    InvalidKey {
        /// Why the key was rejected
        reason: &'static str,
    },
}
