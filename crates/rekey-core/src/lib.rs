//! Rekey core: pure data structures of the team key rotation engine.
//!
//! Nothing in this crate performs I/O. The rotation engine reloads team state
//! from a ledger, hands the snapshot to the pure pieces here, and only commits
//! into the [`Keyring`] after the ledger accepted a link.
//!
//! # Components
//!
//! - [`Keyring`]: per-team key generation store (dense, append-only)
//! - [`sweep`]: membership sweeper for reset members
//! - [`Link`] / [`LinkBody`]: chain link types the ledger orders
//! - [`TeamSnapshot`]: the reloaded, authoritative view of one team
//! - [`Environment`]: time and randomness abstraction for deterministic tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod application;
pub mod env;
mod error;
mod ids;
pub mod keyring;
pub mod link;
mod member;
mod snapshot;
pub mod sweeper;

pub use application::{Application, UnknownApplication};
pub use env::Environment;
pub use error::{KeyringError, LinkCodecError};
pub use ids::{TeamId, UserId};
pub use keyring::{Ingest, KeyGenerationRecord, Keyring};
pub use link::{HistoryBox, Link, LinkBody, LinkId, MembershipChange, SeedBox, seal_context};
pub use member::{Identity, Member, Role, TeamSettings};
pub use snapshot::TeamSnapshot;
pub use sweeper::{SweepOutcome, sweep};

/// First key generation of every team.
pub const FIRST_GENERATION: u64 = 1;
