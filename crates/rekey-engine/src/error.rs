//! Engine error types.

use std::time::Duration;

use rekey_core::{KeyringError, UserId};
use rekey_crypto::CryptoError;
use rekey_ledger::LedgerError;
use thiserror::Error;

/// Errors from a rotation.
///
/// A conflict on one attempt is never surfaced; it is retried until the
/// attempt budget runs out.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RotationError {
    /// Every attempt lost the race for the head.
    ///
    /// Nothing was written. The caller may try again later.
    #[error("rotation lost {attempts} consecutive head races")]
    ConflictExhausted {
        /// Attempts made
        attempts: u32,
    },

    /// Caller cancelled before a submission was in flight.
    #[error("rotation cancelled after {attempts} attempts")]
    Cancelled {
        /// Attempts completed before cancellation
        attempts: u32,
    },

    /// Submission failed in transit; the ledger may or may not have applied
    /// it.
    ///
    /// Reload (or refresh) to find out whether `generation` landed.
    #[error("outcome of rotation to generation {generation} unknown: {source}")]
    Indeterminate {
        /// Generation the lost submission would have created
        generation: u64,
        /// Transport failure
        #[source]
        source: LedgerError,
    },

    /// This device's user is not a live member of the team.
    #[error("user {0} is not a live member of the team")]
    NotAMember(UserId),

    /// This device cannot open every generation the team has published.
    ///
    /// Nothing was submitted. An admin re-adding the user with history boxes
    /// makes the missing generations reachable.
    #[error("user {user} holds generations up to {held}, team is at {current}")]
    MissingGenerations {
        /// User this device belongs to
        user: UserId,
        /// Newest generation the keyring reached
        held: u64,
        /// Generation on the ledger
        current: u64,
    },

    /// Ledger refused or failed an operation.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Local key store invariant broken.
    #[error(transparent)]
    Keyring(#[from] KeyringError),

    /// Sealing or opening a seed failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl RotationError {
    /// Returns true if the same request may succeed later without any
    /// change on the caller's side.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConflictExhausted { .. } | Self::Indeterminate { .. } => true,
            Self::Ledger(err) => err.is_transient(),
            Self::Cancelled { .. }
            | Self::NotAMember(_)
            | Self::MissingGenerations { .. }
            | Self::Keyring(_)
            | Self::Crypto(_) => false,
        }
    }
}

/// Errors from the [`crate::TeamKeyEngine`] facade.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Key lookup failed.
    #[error(transparent)]
    Keyring(#[from] KeyringError),

    /// Rotation failed.
    #[error(transparent)]
    Rotation(#[from] RotationError),

    /// Ledger operation outside a rotation failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Sealing the genesis seed failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Invalid configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `max_attempts` is zero.
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,

    /// Base backoff above the cap.
    #[error("base backoff {base:?} exceeds max backoff {max:?}")]
    BackoffInverted {
        /// Configured base backoff
        base: Duration,
        /// Configured cap
        max: Duration,
    },
}
