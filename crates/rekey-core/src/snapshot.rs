//! Reloaded team state.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
    ids::{TeamId, UserId},
    link::LinkId,
    member::{Member, Role, TeamSettings},
};

/// Authoritative view of one team, as returned by a ledger reload.
///
/// A snapshot is a value: the rotation engine passes it explicitly through an
/// attempt and throws it away on conflict. It is never cached across
/// attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSnapshot {
    /// Team identifier
    pub team_id: TeamId,
    /// Current name
    pub name: String,
    /// Id of the last link; new links must reference it
    pub head: LinkId,
    /// Seqno of the last link
    pub seqno: u64,
    /// Current key generation
    pub generation: u64,
    /// Active members (role at least `Reader`), ordered by user id
    pub members: Vec<Member>,
    /// Team settings
    pub settings: TeamSettings,
    /// Members whose credentials were reset since the team last saw them
    pub reset: BTreeSet<UserId>,
}

impl TeamSnapshot {
    /// Reset predicate supplied with this reload.
    pub fn is_reset(&self, member: &Member) -> bool {
        self.reset.contains(&member.user_id)
    }

    /// Member row for `user_id`.
    pub fn member(&self, user_id: UserId) -> Option<&Member> {
        self.members.iter().find(|m| m.user_id == user_id)
    }

    /// Role of `user_id`, `Role::None` for non-members.
    pub fn role_of(&self, user_id: UserId) -> Role {
        self.member(user_id).map_or(Role::None, |m| m.role)
    }

    /// Users whose role is `threshold` or above.
    pub fn users_with_role_or_above(&self, threshold: Role) -> Vec<UserId> {
        self.members.iter().filter(|m| m.role.is_or_above(threshold)).map(|m| m.user_id).collect()
    }
}
