//! Operations for model-based testing.
//!
//! Operations are generated by proptest (or decoded from fuzz input through
//! `arbitrary`) and applied to both the model and the simulated system.

use arbitrary::Arbitrary;
use rekey_core::{Role, UserId};

/// User index within a simulation (0-indexed, taken modulo [`USER_COUNT`]).
pub type UserIndex = u8;

/// Users in every simulated team. User 0 creates the team.
pub const USER_COUNT: u8 = 4;

/// Ledger user id for a simulation user.
pub fn user_id(index: UserIndex) -> UserId {
    UserId(u64::from(index % USER_COUNT) + 1)
}

/// Initial role of a non-creator member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum ModelRole {
    /// `Role::Reader`
    Reader,
    /// `Role::Writer`
    Writer,
    /// `Role::Admin`
    Admin,
    /// `Role::Owner`
    Owner,
}

impl From<ModelRole> for Role {
    fn from(role: ModelRole) -> Self {
        match role {
            ModelRole::Reader => Role::Reader,
            ModelRole::Writer => Role::Writer,
            ModelRole::Admin => Role::Admin,
            ModelRole::Owner => Role::Owner,
        }
    }
}

/// Team the operations run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub struct TeamShape {
    /// Whether reset members are evicted on rotation.
    pub open: bool,
    /// Roles of users 1, 2 and 3. User 0 is always the owner.
    pub roles: [ModelRole; 3],
}

impl TeamShape {
    /// Initial role of `index`.
    pub fn role_of(&self, index: UserIndex) -> Role {
        match index % USER_COUNT {
            0 => Role::Owner,
            other => self.roles[usize::from(other) - 1].into(),
        }
    }
}

/// Operations that can be applied to the system.
#[derive(Debug, Clone, Arbitrary)]
pub enum Operation {
    /// Explicit rotation.
    Rotate {
        /// Rotating user.
        actor: UserIndex,
    },

    /// Rotate request raised `lag` generations ago.
    ///
    /// `lag` is taken modulo 3. A lag of zero names the current generation
    /// and must rotate; anything else is stale.
    RequestRotate {
        /// User handling the request.
        actor: UserIndex,
        /// How far behind the request is.
        lag: u8,
    },

    /// Account reset: the user's device is replaced by a new one with a
    /// new box key and a bumped eldest seqno.
    Reset {
        /// User resetting.
        user: UserIndex,
    },

    /// Pull any generations the user's device can open.
    Refresh {
        /// Refreshing user.
        actor: UserIndex,
    },
}

impl Operation {
    /// Same operation with user indices folded into range.
    #[must_use]
    pub fn normalized(self) -> Self {
        match self {
            Self::Rotate { actor } => Self::Rotate { actor: actor % USER_COUNT },
            Self::RequestRotate { actor, lag } => {
                Self::RequestRotate { actor: actor % USER_COUNT, lag: lag % 3 }
            },
            Self::Reset { user } => Self::Reset { user: user % USER_COUNT },
            Self::Refresh { actor } => Self::Refresh { actor: actor % USER_COUNT },
        }
    }

    /// Generation a rotate request names, given the current one.
    pub fn requested_generation(current: u64, lag: u8) -> u64 {
        current.saturating_sub(u64::from(lag % 3))
    }
}

/// Observable outcome of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    /// A rotation created this generation.
    Rotated(u64),
    /// A rotate request was already satisfied at this generation.
    Stale(u64),
    /// The actor cannot receive a new seed.
    NotAMember,
    /// Account reset done.
    Reset,
    /// Newest generation held after refreshing.
    Refreshed(u64),
    /// Any other error. The model never produces this.
    Failed(String),
}
