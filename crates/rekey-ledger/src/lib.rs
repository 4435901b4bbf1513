//! Team chain ledger.
//!
//! The ledger is the single source of truth for a team: its membership, its
//! current head and every generation's sealed seeds. Clients reload a
//! snapshot, build a link on the snapshot's head and submit it. The ledger
//! accepts the link only if that head is still current, which is the
//! compare-and-swap every rotation relies on.
//!
//! # Backends
//!
//! - [`MemoryLedger`]: in-process, shared by clones. Used by tests and the
//!   simulation harness.
//! - [`ChaoticLedger`]: wraps another ledger and injects I/O failures,
//!   including failures after a submission was applied.
//! - [`RedbLedger`]: durable, one redb write transaction per submission.

#![warn(missing_docs)]

mod chain;
mod chaotic;
mod error;
mod memory;
mod redb;

use std::future::Future;

pub use chain::{GenerationBox, GenerationEntry, TeamChain, TeamState, Validation};
pub use chaotic::{ChaoticLedger, Fault};
pub use error::LedgerError;
pub use memory::MemoryLedger;
use rekey_core::{Identity, Link, LinkId, TeamId, TeamSnapshot, UserId};

pub use self::redb::RedbLedger;

/// Outcome of a link submission that reached the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Link was appended.
    Accepted {
        /// New head (the link's id)
        head: LinkId,
        /// Seqno the link was stored at
        seqno: u64,
    },

    /// Link was built on a head that is no longer current.
    ///
    /// Nothing was written. The author should reload and rebuild.
    Rejected {
        /// Current head
        head: LinkId,
    },
}

/// Team chain ledger.
///
/// Implementations share their state between clones, so one ledger can be
/// handed to any number of concurrent rotation attempts. Every method is a
/// single round trip; none of them retry internally.
///
/// # Panics
///
/// In-process implementations may panic if an internal lock is poisoned.
pub trait Ledger: Clone + Send + Sync + 'static {
    /// Publish or replace a user's current credentials.
    fn register_user(
        &self,
        user_id: UserId,
        identity: Identity,
    ) -> impl Future<Output = Result<(), LedgerError>> + Send;

    /// Current credentials for `user_id`, `None` if never registered.
    fn identity(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Option<Identity>, LedgerError>> + Send;

    /// Create a team from its genesis link.
    ///
    /// # Errors
    ///
    /// `TeamExists` if the team already has a chain, `InvalidLink` if the
    /// genesis is malformed.
    fn create_team(
        &self,
        genesis: Link,
    ) -> impl Future<Output = Result<LinkId, LedgerError>> + Send;

    /// Authoritative snapshot of a team.
    ///
    /// # Errors
    ///
    /// `TeamNotFound` if the team has no chain.
    fn reload(
        &self,
        team_id: TeamId,
    ) -> impl Future<Output = Result<TeamSnapshot, LedgerError>> + Send;

    /// Append `link` if `link.prev` is still the team's head.
    ///
    /// A stale `prev` yields [`SubmitOutcome::Rejected`], not an error. An
    /// `Io` error means the outcome is unknown: the link may have been
    /// appended.
    fn submit_link(
        &self,
        link: Link,
    ) -> impl Future<Output = Result<SubmitOutcome, LedgerError>> + Send;

    /// Boxes addressed to `recipient` for generations after
    /// `after_generation`, oldest first.
    fn seed_boxes(
        &self,
        team_id: TeamId,
        recipient: UserId,
        after_generation: u64,
    ) -> impl Future<Output = Result<Vec<GenerationBox>, LedgerError>> + Send;

    /// Links `[from_seqno, from_seqno + limit)` of a team's chain.
    fn links(
        &self,
        team_id: TeamId,
        from_seqno: u64,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Link>, LedgerError>> + Send;
}
