//! Model team state.

use std::collections::{BTreeMap, BTreeSet};

use rekey_core::Role;

use super::operation::{Operation, OperationResult, TeamShape, USER_COUNT, UserIndex};

/// Member row in the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelMember {
    /// Current role.
    pub role: Role,
    /// Reset since the team last recorded this member's credentials.
    pub reset: bool,
}

/// State the model and the real system must agree on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservableState {
    /// Current key generation.
    pub generation: u64,
    /// Role of every member, by user index.
    pub roles: BTreeMap<UserIndex, Role>,
}

/// Reference model of one team.
#[derive(Debug, Clone)]
pub struct ModelTeam {
    open: bool,
    generation: u64,
    members: BTreeMap<UserIndex, ModelMember>,
    replaced_devices: BTreeSet<UserIndex>,
}

impl ModelTeam {
    /// Freshly created team at generation 1.
    pub fn new(shape: TeamShape) -> Self {
        let members = (0..USER_COUNT)
            .map(|index| (index, ModelMember { role: shape.role_of(index), reset: false }))
            .collect();
        Self { open: shape.open, generation: 1, members, replaced_devices: BTreeSet::new() }
    }

    /// Current generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Member rows.
    pub fn members(&self) -> &BTreeMap<UserIndex, ModelMember> {
        &self.members
    }

    /// Observable state for comparison.
    pub fn observable(&self) -> ObservableState {
        ObservableState {
            generation: self.generation,
            roles: self.members.iter().map(|(index, member)| (*index, member.role)).collect(),
        }
    }

    /// Apply a normalized operation and return its expected result.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        match *op {
            Operation::Rotate { actor } => self.rotate(actor),
            Operation::RequestRotate { actor, lag } => {
                let current = self.generation;
                if Operation::requested_generation(current, lag) < current {
                    OperationResult::Stale(current)
                } else {
                    self.rotate(actor)
                }
            },
            Operation::Reset { user } => {
                if let Some(member) = self.members.get_mut(&user) {
                    member.reset = true;
                }
                self.replaced_devices.insert(user);
                OperationResult::Reset
            },
            Operation::Refresh { actor } => {
                // A replaced device never receives a box: nothing re-adds
                // members, and closed teams skip reset members when sealing.
                if self.replaced_devices.contains(&actor) {
                    OperationResult::Refreshed(0)
                } else {
                    OperationResult::Refreshed(self.generation)
                }
            },
        }
    }

    fn rotate(&mut self, actor: UserIndex) -> OperationResult {
        let live = self.members.get(&actor).is_some_and(|m| !m.reset);
        if !live {
            return OperationResult::NotAMember;
        }

        self.generation += 1;
        if self.open {
            self.sweep();
        }
        OperationResult::Rotated(self.generation)
    }

    fn sweep(&mut self) {
        let live_owner =
            self.members.values().any(|m| m.role == Role::Owner && !m.reset);
        let spared = if live_owner {
            None
        } else {
            self.members.iter().find(|(_, m)| m.role == Role::Owner).map(|(index, _)| *index)
        };

        self.members.retain(|index, member| !member.reset || Some(*index) == spared);
    }
}
