//! Chain link types.
//!
//! A team's history is an append-only chain of links. Each link names the
//! head it was built on (`prev`), so the ledger can accept it only while that
//! head is still current. A link's identity is the SHA-256 of its CBOR
//! encoding.

use std::fmt;

use rekey_crypto::SealedSeed;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    error::LinkCodecError,
    ids::{TeamId, UserId},
    member::{Identity, Member, Role, TeamSettings},
};

/// Maximum encoded link size accepted by [`Link::decode`].
pub const MAX_LINK_SIZE: usize = 1024 * 1024;

/// Content hash of a link. The head of a chain is the id of its last link.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkId(pub [u8; 32]);

impl LinkId {
    /// Head of a team that has no links yet.
    pub const ZERO: LinkId = LinkId([0u8; 32]);
}

impl fmt::Debug for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LinkId({self})")
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..8] {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Seed sealed to one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedBox {
    /// Member who can open this box
    pub recipient: UserId,
    /// Credential epoch the box key belongs to
    pub eldest_seqno: u64,
    /// Sealed seed
    pub sealed: SealedSeed,
}

/// A box for a generation published before its recipient was keyed.
///
/// Carried by membership changes so a member added (or re-keyed after a
/// reset) can open every generation from the first, as the keyring needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryBox {
    /// Generation the sealed seed belongs to
    pub generation: u64,
    /// The box itself
    pub seed_box: SeedBox,
}

/// Associated data binding a sealed seed to its team and generation.
///
/// Layout: `team_id` (16 bytes BE) || `generation` (8 bytes BE).
pub fn seal_context(team_id: TeamId, generation: u64) -> [u8; 24] {
    let mut context = [0u8; 24];
    context[..16].copy_from_slice(&team_id.0.to_be_bytes());
    context[16..].copy_from_slice(&generation.to_be_bytes());
    context
}

/// One membership edit carried by a [`LinkBody::ChangeMembership`] link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipChange {
    /// User being changed
    pub user_id: UserId,
    /// New role; `Role::None` removes the user
    pub role: Role,
    /// Identity to record for users not yet in the team, or the new
    /// identity of a member who reset
    pub identity: Option<Identity>,
}

/// What a link does to the team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkBody {
    /// Creates the team at generation 1.
    Genesis {
        /// Human-readable name
        name: String,
        /// Initial settings
        settings: TeamSettings,
        /// Initial membership
        members: Vec<Member>,
        /// Generation-1 seed sealed to every member
        boxes: Vec<SeedBox>,
    },

    /// Advances the key generation by exactly one.
    RotateKey {
        /// New generation (`current + 1`)
        generation: u64,
        /// New seed sealed to every live member
        boxes: Vec<SeedBox>,
        /// Members swept out by this rotation (possibly empty)
        removed: Vec<UserId>,
    },

    /// Adds, re-roles, re-keys or removes members.
    ChangeMembership {
        /// Edits applied in order
        changes: Vec<MembershipChange>,
        /// Every existing generation sealed to each added or re-keyed member
        boxes: Vec<HistoryBox>,
    },

    /// Replaces the team settings.
    ChangeSettings {
        /// New settings
        settings: TeamSettings,
    },

    /// Renames the team. The team id never changes.
    Rename {
        /// New name
        name: String,
    },
}

impl LinkBody {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Genesis { .. } => "genesis",
            Self::RotateKey { .. } => "rotate_key",
            Self::ChangeMembership { .. } => "change_membership",
            Self::ChangeSettings { .. } => "change_settings",
            Self::Rename { .. } => "rename",
        }
    }
}

/// A signed-off entry in a team's chain.
///
/// Signing is performed by the ledger client outside this crate; the link
/// carries the fields the rotation engine decides on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Team this link belongs to
    pub team_id: TeamId,
    /// Position in the chain, starting at 1
    pub seqno: u64,
    /// Head this link was built on
    pub prev: LinkId,
    /// User who submitted the link
    pub author: UserId,
    /// Unix seconds at submission
    pub ctime_secs: u64,
    /// Link contents
    pub body: LinkBody,
}

impl Link {
    /// CBOR encoding of the link.
    pub fn encode(&self) -> Result<Vec<u8>, LinkCodecError> {
        let mut out = Vec::new();
        ciborium::ser::into_writer(self, &mut out)
            .map_err(|e| LinkCodecError::Encode(e.to_string()))?;
        Ok(out)
    }

    /// Decode a CBOR-encoded link.
    pub fn decode(bytes: &[u8]) -> Result<Self, LinkCodecError> {
        if bytes.len() > MAX_LINK_SIZE {
            return Err(LinkCodecError::TooLarge { size: bytes.len(), max: MAX_LINK_SIZE });
        }
        ciborium::de::from_reader(bytes).map_err(|e| LinkCodecError::Decode(e.to_string()))
    }

    /// Content hash of the link.
    pub fn id(&self) -> Result<LinkId, LinkCodecError> {
        let encoded = self.encode()?;
        Ok(LinkId(Sha256::digest(&encoded).into()))
    }
}
