//! Members, roles and team settings.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// Team role, ordered so threshold checks read as `role >= Role::Admin`.
///
/// `None < Reader < Writer < Admin < Owner`
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum Role {
    /// Not a member (removed or never added).
    #[default]
    None,
    /// Can decrypt.
    Reader,
    /// Can decrypt and write.
    Writer,
    /// Can change membership and settings.
    Admin,
    /// Full control. A team always keeps at least one.
    Owner,
}

impl Role {
    /// True if this role is `threshold` or above.
    pub fn is_or_above(self, threshold: Role) -> bool {
        self >= threshold
    }

    /// True for every role that holds team keys.
    pub fn is_member(self) -> bool {
        self >= Role::Reader
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Reader => "reader",
            Self::Writer => "writer",
            Self::Admin => "admin",
            Self::Owner => "owner",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "reader" => Ok(Self::Reader),
            "writer" => Ok(Self::Writer),
            "admin" => Ok(Self::Admin),
            "owner" => Ok(Self::Owner),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// A user's current device credentials as published by the identity service.
///
/// `eldest_seqno` advances whenever the user resets their account, and the
/// box key changes with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Credential epoch marker
    pub eldest_seqno: u64,
    /// X25519 public key seeds are sealed to
    pub box_key: [u8; 32],
}

/// One row of a team's membership table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// User this row belongs to
    pub user_id: UserId,
    /// Current role
    pub role: Role,
    /// Credential epoch the team last observed for this user
    pub eldest_seqno: u64,
    /// Box key matching `eldest_seqno`
    pub box_key: [u8; 32],
}

impl Member {
    /// Member row for a user's current identity.
    pub fn new(user_id: UserId, role: Role, identity: Identity) -> Self {
        Self { user_id, role, eldest_seqno: identity.eldest_seqno, box_key: identity.box_key }
    }

    /// Identity recorded on this row.
    pub fn identity(&self) -> Identity {
        Identity { eldest_seqno: self.eldest_seqno, box_key: self.box_key }
    }
}

/// Team-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSettings {
    /// Open teams admit anyone at `join_as` and evict reset members on
    /// rotation.
    pub open: bool,
    /// Role granted to users joining an open team.
    pub join_as: Role,
}

impl Default for TeamSettings {
    fn default() -> Self {
        Self { open: false, join_as: Role::Reader }
    }
}
