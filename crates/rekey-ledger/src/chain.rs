//! Team chain validation.
//!
//! [`TeamState`] is the ledger's materialized view of one chain: membership,
//! settings and every generation's seed boxes. [`TeamChain`] applies links to
//! it one at a time. A link built on a head that is no longer current is
//! rejected without error so the author can reload and rebuild; a link that
//! breaks a chain rule is an [`LedgerError::InvalidLink`].
//!
//! Rules enforced on every accepted link:
//! - seqnos are dense from 1 and `prev` names the current head
//! - a rotation advances the generation by exactly one
//! - boxes are addressed only to members, at the epoch the team recorded
//! - removals name existing members
//! - a member added or re-keyed gets a box for every existing generation
//! - the team never ends up without an owner

use std::collections::{BTreeMap, BTreeSet, HashSet};

use rekey_core::{
    FIRST_GENERATION, HistoryBox, Identity, Link, LinkBody, LinkId, Member, MembershipChange, Role,
    SeedBox, TeamId, TeamSettings, TeamSnapshot, UserId,
};
use serde::{Deserialize, Serialize};

use crate::LedgerError;

/// Seed boxes published by one accepted generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationEntry {
    /// Key generation
    pub generation: u64,
    /// Creation time of the link that published it
    pub ctime_secs: u64,
    /// One box per member at that generation
    pub boxes: Vec<SeedBox>,
}

/// A recipient's box for one generation, as returned by
/// [`crate::Ledger::seed_boxes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationBox {
    /// Key generation
    pub generation: u64,
    /// Creation time of the generation
    pub ctime_secs: u64,
    /// The recipient's sealed seed
    pub seed_box: SeedBox,
}

/// Materialized state of a team's chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamState {
    /// Team identifier
    pub team_id: TeamId,
    /// Current name
    pub name: String,
    /// Id of the last accepted link
    pub head: LinkId,
    /// Seqno of the last accepted link
    pub seqno: u64,
    /// Current settings
    pub settings: TeamSettings,
    /// Members keyed by user id
    pub members: BTreeMap<UserId, Member>,
    /// Every generation in order, starting at [`FIRST_GENERATION`]
    pub generations: Vec<GenerationEntry>,
}

impl TeamState {
    /// Current key generation.
    pub fn generation(&self) -> u64 {
        self.generations.last().map_or(0, |entry| entry.generation)
    }

    /// Snapshot for a reload.
    ///
    /// `identity` looks up a user's current credentials; members whose
    /// current eldest seqno is newer than the one recorded on their row are
    /// reported as reset.
    pub fn snapshot(&self, identity: impl Fn(UserId) -> Option<Identity>) -> TeamSnapshot {
        let reset: BTreeSet<UserId> = self
            .members
            .values()
            .filter(|m| identity(m.user_id).is_some_and(|id| id.eldest_seqno > m.eldest_seqno))
            .map(|m| m.user_id)
            .collect();

        TeamSnapshot {
            team_id: self.team_id,
            name: self.name.clone(),
            head: self.head,
            seqno: self.seqno,
            generation: self.generation(),
            members: self.members.values().copied().collect(),
            settings: self.settings,
            reset,
        }
    }

    /// Boxes addressed to `recipient` for generations after
    /// `after_generation`, oldest first.
    ///
    /// A generation can hold several boxes for one recipient once a member
    /// is re-keyed; the newest one is returned.
    pub fn boxes_for(&self, recipient: UserId, after_generation: u64) -> Vec<GenerationBox> {
        self.generations
            .iter()
            .filter(|entry| entry.generation > after_generation)
            .filter_map(|entry| {
                let seed_box = entry.boxes.iter().rev().find(|b| b.recipient == recipient)?;
                Some(GenerationBox {
                    generation: entry.generation,
                    ctime_secs: entry.ctime_secs,
                    seed_box: seed_box.clone(),
                })
            })
            .collect()
    }

    fn owner_count(&self) -> usize {
        self.members.values().filter(|m| m.role == Role::Owner).count()
    }
}

/// Result of validating a link against the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// Link applies cleanly.
    Accept {
        /// State after the link
        state: TeamState,
        /// New head (the link's id)
        head: LinkId,
    },

    /// Link was built on a stale head.
    Reject {
        /// Current head the author should rebuild on
        head: LinkId,
    },
}

/// Applies links to [`TeamState`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TeamChain;

impl TeamChain {
    /// Build the initial state from a genesis link.
    ///
    /// # Errors
    ///
    /// `InvalidLink` if the link is not a well-formed genesis, `Unauthorized`
    /// if its author is not one of the initial owners.
    pub fn genesis(link: &Link) -> Result<TeamState, LedgerError> {
        let LinkBody::Genesis { name, settings, members, boxes } = &link.body else {
            return Err(invalid(format!("first link must be genesis, got {}", link.body.kind())));
        };
        if link.seqno != 1 || link.prev != LinkId::ZERO {
            return Err(invalid("genesis must have seqno 1 and no prev"));
        }

        let mut rows = BTreeMap::new();
        for member in members {
            if !member.role.is_member() {
                return Err(invalid(format!("genesis lists user {} with no role", member.user_id)));
            }
            if rows.insert(member.user_id, *member).is_some() {
                return Err(invalid(format!("genesis lists user {} twice", member.user_id)));
            }
        }

        let author_role = rows.get(&link.author).map_or(Role::None, |m| m.role);
        if author_role != Role::Owner {
            return Err(LedgerError::Unauthorized { user: link.author, required: Role::Owner });
        }

        check_boxes(&rows, boxes)?;

        let head = link.id()?;
        Ok(TeamState {
            team_id: link.team_id,
            name: name.clone(),
            head,
            seqno: 1,
            settings: *settings,
            members: rows,
            generations: vec![GenerationEntry {
                generation: FIRST_GENERATION,
                ctime_secs: link.ctime_secs,
                boxes: boxes.clone(),
            }],
        })
    }

    /// Validate `link` against `state`.
    ///
    /// Does not mutate `state`; the caller stores the returned state only if
    /// it still owns the head it validated against.
    ///
    /// # Errors
    ///
    /// `InvalidLink` or `Unauthorized` when the link breaks a chain rule.
    pub fn apply(state: &TeamState, link: &Link) -> Result<Validation, LedgerError> {
        if link.team_id != state.team_id {
            return Err(invalid(format!(
                "link for team {} submitted to team {}",
                link.team_id, state.team_id
            )));
        }
        if link.prev != state.head {
            return Ok(Validation::Reject { head: state.head });
        }
        if link.seqno != state.seqno + 1 {
            return Err(invalid(format!(
                "seqno gap: expected {}, got {}",
                state.seqno + 1,
                link.seqno
            )));
        }

        let mut next = state.clone();
        match &link.body {
            LinkBody::Genesis { .. } => return Err(invalid("genesis on an existing team")),
            LinkBody::RotateKey { generation, boxes, removed } => {
                require_role(state, link.author, Role::Reader)?;
                apply_rotation(&mut next, *generation, boxes, removed, link.ctime_secs)?;
            },
            LinkBody::ChangeMembership { changes, boxes } => {
                require_role(state, link.author, Role::Admin)?;
                apply_membership(&mut next, changes, boxes)?;
            },
            LinkBody::ChangeSettings { settings } => {
                require_role(state, link.author, Role::Admin)?;
                next.settings = *settings;
            },
            LinkBody::Rename { name } => {
                require_role(state, link.author, Role::Admin)?;
                if name.is_empty() {
                    return Err(invalid("team name must not be empty"));
                }
                next.name = name.clone();
            },
        }

        if next.owner_count() == 0 {
            return Err(invalid("link would leave the team without an owner"));
        }

        let head = link.id()?;
        next.head = head;
        next.seqno = link.seqno;
        Ok(Validation::Accept { state: next, head })
    }
}

fn apply_rotation(
    state: &mut TeamState,
    generation: u64,
    boxes: &[SeedBox],
    removed: &[UserId],
    ctime_secs: u64,
) -> Result<(), LedgerError> {
    let expected = state.generation() + 1;
    if generation != expected {
        return Err(invalid(format!(
            "rotation must publish generation {expected}, got {generation}"
        )));
    }

    for user in removed {
        if state.members.remove(user).is_none() {
            return Err(invalid(format!("rotation removes non-member {user}")));
        }
    }

    if boxes.is_empty() {
        return Err(invalid("rotation seals the seed to no one"));
    }
    check_boxes(&state.members, boxes)?;

    state.generations.push(GenerationEntry { generation, ctime_secs, boxes: boxes.to_vec() });
    Ok(())
}

fn apply_membership(
    state: &mut TeamState,
    changes: &[MembershipChange],
    boxes: &[HistoryBox],
) -> Result<(), LedgerError> {
    // Users whose box key this link sets, and who therefore need a box for
    // every generation so far.
    let mut keyed = BTreeSet::new();

    for change in changes {
        if !change.role.is_member() {
            if state.members.remove(&change.user_id).is_none() {
                return Err(invalid(format!("removing non-member {}", change.user_id)));
            }
            keyed.remove(&change.user_id);
            continue;
        }

        match (state.members.get_mut(&change.user_id), change.identity) {
            (Some(row), identity) => {
                row.role = change.role;
                if let Some(identity) = identity
                    && identity != row.identity()
                {
                    *row = Member::new(change.user_id, change.role, identity);
                    keyed.insert(change.user_id);
                }
            },
            (None, Some(identity)) => {
                state
                    .members
                    .insert(change.user_id, Member::new(change.user_id, change.role, identity));
                keyed.insert(change.user_id);
            },
            (None, None) => {
                return Err(invalid(format!("adding user {} without identity", change.user_id)));
            },
        }
    }

    let current = state.generation();
    let mut covered: BTreeMap<UserId, BTreeSet<u64>> = BTreeMap::new();
    for history in boxes {
        let recipient = history.seed_box.recipient;
        let Some(member) = state.members.get(&recipient).filter(|_| keyed.contains(&recipient))
        else {
            return Err(invalid(format!("history box for {recipient}, who was not keyed")));
        };
        if member.eldest_seqno != history.seed_box.eldest_seqno {
            return Err(invalid(format!(
                "history box for {recipient} sealed at epoch {}, team has {}",
                history.seed_box.eldest_seqno, member.eldest_seqno
            )));
        }
        if !(FIRST_GENERATION..=current).contains(&history.generation) {
            return Err(invalid(format!(
                "history box for generation {} outside 1..={current}",
                history.generation
            )));
        }
        if !covered.entry(recipient).or_default().insert(history.generation) {
            return Err(invalid(format!(
                "two history boxes for {recipient} at generation {}",
                history.generation
            )));
        }
    }

    for user in &keyed {
        let held = covered.get(user).map_or(0, BTreeSet::len);
        if held as u64 != current {
            return Err(invalid(format!(
                "keyed member {user} gets {held} of {current} generations"
            )));
        }
    }

    for history in boxes {
        if let Some(entry) =
            state.generations.iter_mut().find(|entry| entry.generation == history.generation)
        {
            entry.boxes.push(history.seed_box.clone());
        }
    }
    Ok(())
}

fn require_role(state: &TeamState, user: UserId, required: Role) -> Result<(), LedgerError> {
    let role = state.members.get(&user).map_or(Role::None, |m| m.role);
    if role.is_or_above(required) {
        Ok(())
    } else {
        Err(LedgerError::Unauthorized { user, required })
    }
}

fn check_boxes(members: &BTreeMap<UserId, Member>, boxes: &[SeedBox]) -> Result<(), LedgerError> {
    let mut seen = HashSet::with_capacity(boxes.len());
    for seed_box in boxes {
        let Some(member) = members.get(&seed_box.recipient) else {
            return Err(invalid(format!("box addressed to non-member {}", seed_box.recipient)));
        };
        if member.eldest_seqno != seed_box.eldest_seqno {
            return Err(invalid(format!(
                "box for {} sealed at epoch {}, team has {}",
                seed_box.recipient, seed_box.eldest_seqno, member.eldest_seqno
            )));
        }
        if !seen.insert(seed_box.recipient) {
            return Err(invalid(format!("two boxes for {}", seed_box.recipient)));
        }
    }
    Ok(())
}

fn invalid(reason: impl Into<String>) -> LedgerError {
    LedgerError::InvalidLink(reason.into())
}
