//! Ledger error types.

use rekey_core::{LinkCodecError, Role, TeamId, UserId};
use thiserror::Error;

/// Errors from ledger operations.
///
/// A link built on a stale head is NOT an error: it is reported as
/// [`crate::SubmitOutcome::Rejected`] so callers can reload and retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Team has no chain on this ledger.
    #[error("team not found: {0}")]
    TeamNotFound(TeamId),

    /// Genesis submitted for a team that already exists.
    #[error("team already exists: {0}")]
    TeamExists(TeamId),

    /// Link violates a chain rule.
    ///
    /// Indicates a client bug. Never retried.
    #[error("invalid link: {0}")]
    InvalidLink(String),

    /// Link author lacks the role the link requires.
    #[error("user {user} needs role {required} or above")]
    Unauthorized {
        /// Link author
        user: UserId,
        /// Minimum role for this link kind
        required: Role,
    },

    /// User has no identity registered.
    #[error("unknown user: {0}")]
    UnknownUser(UserId),

    /// I/O failure talking to the ledger.
    ///
    /// For a submission the outcome is unknown: the link may or may not have
    /// been applied.
    #[error("ledger I/O error: {0}")]
    Io(String),

    /// Stored data could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl LedgerError {
    /// Returns true if this error is transient and may succeed on retry.
    ///
    /// Only I/O failures are transient. Chain rule violations and missing
    /// teams will fail the same way again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

impl From<LinkCodecError> for LedgerError {
    fn from(err: LinkCodecError) -> Self {
        Self::Serialization(err.to_string())
    }
}
