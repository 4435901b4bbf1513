//! Error types for the key generation store and link encoding.

use thiserror::Error;

use crate::ids::TeamId;

/// Errors from the [`crate::Keyring`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyringError {
    /// No generation is known for this team in this process.
    #[error("unknown team {0}")]
    UnknownTeam(TeamId),

    /// Requested generation lies outside `1..=current`.
    #[error("generation {generation} not found (current is {current})")]
    NotFound {
        /// Requested generation
        generation: u64,
        /// Current generation of the team
        current: u64,
    },

    /// Append that does not extend the store by exactly one.
    ///
    /// Indicates a bug or a corrupted ledger. Never retried.
    #[error("out of order append: expected generation {expected}, got {got}")]
    OutOfOrder {
        /// Generation that would have been accepted (`current + 1`)
        expected: u64,
        /// Generation that was offered
        got: u64,
    },

    /// A different seed was offered for a generation already held.
    ///
    /// Indicates ledger corruption. Never retried.
    #[error("divergent seed for generation {generation}")]
    Divergent {
        /// Generation whose seed disagrees
        generation: u64,
    },
}

impl KeyringError {
    /// Returns true if this error signals a broken invariant.
    ///
    /// Fatal errors indicate a bug or ledger corruption and must not be
    /// retried. Lookup misses (`UnknownTeam`, `NotFound`) are ordinary
    /// caller errors.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::OutOfOrder { .. } | Self::Divergent { .. })
    }
}

/// Errors encoding or decoding chain links.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkCodecError {
    /// CBOR encoding failed
    #[error("link encode failed: {0}")]
    Encode(String),

    /// CBOR decoding failed
    #[error("link decode failed: {0}")]
    Decode(String),

    /// Input exceeds the maximum link size
    #[error("link too large: {size} bytes (max {max})")]
    TooLarge {
        /// Input size
        size: usize,
        /// Limit
        max: usize,
    },
}
