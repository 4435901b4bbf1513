//! Membership sweeper.
//!
//! Decides which members a rotation evicts after their credentials were
//! reset. Pure function of its inputs: no I/O, no logging, deterministic.
//!
//! # Rules
//!
//! - Open team: every reset member is demoted to `Role::None`. Open teams
//!   re-admit without admin judgment, so eviction needs none either.
//! - Closed team: roles are left alone. Reset members simply receive no box
//!   for the new generation; removing them is an admin decision.
//! - The team never loses its last owner. If every owner is reset, the first
//!   reset owner (in input order) keeps the role.

use crate::{
    ids::UserId,
    member::{Member, Role},
};

/// Result of a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Input members in input order, swept members demoted to `Role::None`
    pub members: Vec<Member>,
    /// Users demoted by this sweep, in input order
    pub removed: Vec<UserId>,
}

impl SweepOutcome {
    /// Members still holding a role after the sweep.
    pub fn remaining(&self) -> impl Iterator<Item = &Member> {
        self.members.iter().filter(|m| m.role.is_member())
    }
}

/// Compute membership after evicting reset members.
///
/// Members whose role is already `Role::None` pass through untouched and are
/// never reported as removed.
pub fn sweep(
    members: &[Member],
    is_reset: impl Fn(&Member) -> bool,
    team_open: bool,
) -> SweepOutcome {
    if !team_open {
        return SweepOutcome { members: members.to_vec(), removed: Vec::new() };
    }

    let mut evict: Vec<bool> = members.iter().map(|m| m.role.is_member() && is_reset(m)).collect();

    let owners_left = members
        .iter()
        .zip(&evict)
        .filter(|(m, evicted)| m.role == Role::Owner && !**evicted)
        .count();

    if owners_left == 0
        && let Some(spared) = members.iter().position(|m| m.role == Role::Owner)
    {
        evict[spared] = false;
    }

    let mut removed = Vec::new();
    let swept: Vec<Member> = members
        .iter()
        .zip(evict)
        .map(|(member, evicted)| {
            if evicted {
                removed.push(member.user_id);
                Member { role: Role::None, ..*member }
            } else {
                *member
            }
        })
        .collect();

    SweepOutcome { members: swept, removed }
}
