//! In-memory ledger.
//!
//! Holds every team's [`TeamState`] and link list behind one mutex. Used by
//! the engine's tests and by the simulation harness, where many engines
//! share one instance and race on it.

#![allow(clippy::expect_used, reason = "poisoned ledger mutex means a test already panicked")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use rekey_core::{Identity, Link, LinkId, TeamId, TeamSnapshot, UserId};

use crate::{
    GenerationBox, Ledger, LedgerError, SubmitOutcome,
    chain::{TeamChain, TeamState, Validation},
};

/// In-memory ledger for tests and simulation.
///
/// All clones share one `Arc<Mutex<..>>`, so concurrent actors holding
/// clones race on the same chain exactly as they would against a remote
/// ledger. Validation and append happen under one lock acquisition, which
/// makes `submit_link` an atomic compare-and-swap on the head.
#[derive(Clone, Default)]
pub struct MemoryLedger {
    inner: Arc<Mutex<MemoryLedgerInner>>,
}

#[derive(Default)]
struct MemoryLedgerInner {
    teams: HashMap<TeamId, TeamState>,
    /// Links per team in seqno order
    links: HashMap<TeamId, Vec<Link>>,
    identities: HashMap<UserId, Identity>,
    accepted: u64,
    rejected: u64,
}

impl MemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an account reset: bump the user's eldest seqno and install a
    /// new box key.
    ///
    /// Team rows keep the old epoch, so the user shows up in every snapshot's
    /// reset set until a rotation sweeps or re-adds them.
    ///
    /// # Errors
    ///
    /// `UnknownUser` if the user was never registered.
    pub fn reset_user(&self, user_id: UserId, box_key: [u8; 32]) -> Result<Identity, LedgerError> {
        let mut inner = self.inner.lock().expect("ledger mutex poisoned");
        let identity =
            inner.identities.get_mut(&user_id).ok_or(LedgerError::UnknownUser(user_id))?;
        identity.eldest_seqno += 1;
        identity.box_key = box_key;
        tracing::debug!(
            user_id = %user_id,
            eldest_seqno = identity.eldest_seqno,
            "user reset"
        );
        Ok(*identity)
    }

    /// Number of submissions appended.
    pub fn accepted_count(&self) -> u64 {
        self.inner.lock().expect("ledger mutex poisoned").accepted
    }

    /// Number of submissions rejected for a stale head.
    pub fn rejected_count(&self) -> u64 {
        self.inner.lock().expect("ledger mutex poisoned").rejected
    }

    /// Materialized state of a team, for invariant checks.
    pub fn team_state(&self, team_id: TeamId) -> Option<TeamState> {
        self.inner.lock().expect("ledger mutex poisoned").teams.get(&team_id).cloned()
    }
}

impl Ledger for MemoryLedger {
    async fn register_user(&self, user_id: UserId, identity: Identity) -> Result<(), LedgerError> {
        let mut inner = self.inner.lock().expect("ledger mutex poisoned");
        inner.identities.insert(user_id, identity);
        Ok(())
    }

    async fn identity(&self, user_id: UserId) -> Result<Option<Identity>, LedgerError> {
        let inner = self.inner.lock().expect("ledger mutex poisoned");
        Ok(inner.identities.get(&user_id).copied())
    }

    async fn create_team(&self, genesis: Link) -> Result<LinkId, LedgerError> {
        let mut inner = self.inner.lock().expect("ledger mutex poisoned");
        if inner.teams.contains_key(&genesis.team_id) {
            return Err(LedgerError::TeamExists(genesis.team_id));
        }

        let state = TeamChain::genesis(&genesis)?;
        let head = state.head;
        inner.teams.insert(genesis.team_id, state);
        inner.links.insert(genesis.team_id, vec![genesis]);
        Ok(head)
    }

    async fn reload(&self, team_id: TeamId) -> Result<TeamSnapshot, LedgerError> {
        let inner = self.inner.lock().expect("ledger mutex poisoned");
        let state = inner.teams.get(&team_id).ok_or(LedgerError::TeamNotFound(team_id))?;
        Ok(state.snapshot(|user| inner.identities.get(&user).copied()))
    }

    async fn submit_link(&self, link: Link) -> Result<SubmitOutcome, LedgerError> {
        let mut inner = self.inner.lock().expect("ledger mutex poisoned");
        let state = inner.teams.get(&link.team_id).ok_or(LedgerError::TeamNotFound(link.team_id))?;

        match TeamChain::apply(state, &link)? {
            Validation::Reject { head } => {
                inner.rejected += 1;
                Ok(SubmitOutcome::Rejected { head })
            },
            Validation::Accept { state, head } => {
                let seqno = state.seqno;
                inner.teams.insert(link.team_id, state);
                inner.links.entry(link.team_id).or_default().push(link);
                inner.accepted += 1;
                Ok(SubmitOutcome::Accepted { head, seqno })
            },
        }
    }

    async fn seed_boxes(
        &self,
        team_id: TeamId,
        recipient: UserId,
        after_generation: u64,
    ) -> Result<Vec<GenerationBox>, LedgerError> {
        let inner = self.inner.lock().expect("ledger mutex poisoned");
        let state = inner.teams.get(&team_id).ok_or(LedgerError::TeamNotFound(team_id))?;
        Ok(state.boxes_for(recipient, after_generation))
    }

    async fn links(
        &self,
        team_id: TeamId,
        from_seqno: u64,
        limit: usize,
    ) -> Result<Vec<Link>, LedgerError> {
        let inner = self.inner.lock().expect("ledger mutex poisoned");
        let links = inner.links.get(&team_id).ok_or(LedgerError::TeamNotFound(team_id))?;
        Ok(links.iter().filter(|l| l.seqno >= from_seqno).take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use rekey_core::{LinkBody, Member, Role, SeedBox, TeamSettings};
    use rekey_crypto::SealedSeed;

    use super::*;

    const TEAM: TeamId = TeamId(42);

    fn identity(user: u64) -> Identity {
        Identity { eldest_seqno: 1, box_key: [user as u8; 32] }
    }

    fn seed_box(user: u64, eldest_seqno: u64) -> SeedBox {
        SeedBox {
            recipient: UserId(user),
            eldest_seqno,
            sealed: SealedSeed {
                ephemeral_public: [7u8; 32],
                nonce: [0u8; 24],
                ciphertext: vec![0u8; 48],
            },
        }
    }

    fn genesis() -> Link {
        Link {
            team_id: TEAM,
            seqno: 1,
            prev: LinkId::ZERO,
            author: UserId(1),
            ctime_secs: 10,
            body: LinkBody::Genesis {
                name: "acme".to_string(),
                settings: TeamSettings::default(),
                members: vec![
                    Member::new(UserId(1), Role::Owner, identity(1)),
                    Member::new(UserId(2), Role::Reader, identity(2)),
                ],
                boxes: vec![seed_box(1, 1), seed_box(2, 1)],
            },
        }
    }

    fn rotation(snapshot: &TeamSnapshot) -> Link {
        Link {
            team_id: TEAM,
            seqno: snapshot.seqno + 1,
            prev: snapshot.head,
            author: UserId(1),
            ctime_secs: 20,
            body: LinkBody::RotateKey {
                generation: snapshot.generation + 1,
                boxes: vec![seed_box(1, 1), seed_box(2, 1)],
                removed: vec![],
            },
        }
    }

    async fn ledger_with_team() -> MemoryLedger {
        let ledger = MemoryLedger::new();
        ledger.register_user(UserId(1), identity(1)).await.unwrap();
        ledger.register_user(UserId(2), identity(2)).await.unwrap();
        ledger.create_team(genesis()).await.unwrap();
        ledger
    }

    #[tokio::test]
    async fn create_then_reload() {
        let ledger = ledger_with_team().await;
        let snapshot = ledger.reload(TEAM).await.unwrap();
        assert_eq!(snapshot.generation, 1);
        assert_eq!(snapshot.members.len(), 2);
        assert!(snapshot.reset.is_empty());
    }

    #[tokio::test]
    async fn duplicate_team_is_refused() {
        let ledger = ledger_with_team().await;
        assert_eq!(ledger.create_team(genesis()).await, Err(LedgerError::TeamExists(TEAM)));
    }

    #[tokio::test]
    async fn reload_unknown_team() {
        let ledger = MemoryLedger::new();
        assert_eq!(ledger.reload(TEAM).await, Err(LedgerError::TeamNotFound(TEAM)));
    }

    #[tokio::test]
    async fn second_link_on_same_head_is_rejected() {
        let ledger = ledger_with_team().await;
        let snapshot = ledger.reload(TEAM).await.unwrap();

        let first = ledger.submit_link(rotation(&snapshot)).await.unwrap();
        let SubmitOutcome::Accepted { head, seqno } = first else {
            panic!("expected accept, got {first:?}");
        };
        assert_eq!(seqno, 2);

        let second = ledger.submit_link(rotation(&snapshot)).await.unwrap();
        assert_eq!(second, SubmitOutcome::Rejected { head });
        assert_eq!(ledger.accepted_count(), 1);
        assert_eq!(ledger.rejected_count(), 1);
        assert_eq!(ledger.reload(TEAM).await.unwrap().generation, 2);
    }

    #[tokio::test]
    async fn reset_user_shows_in_snapshot() {
        let ledger = ledger_with_team().await;
        let identity = ledger.reset_user(UserId(2), [0xee; 32]).unwrap();
        assert_eq!(identity.eldest_seqno, 2);

        let snapshot = ledger.reload(TEAM).await.unwrap();
        assert!(snapshot.reset.contains(&UserId(2)));
    }

    #[tokio::test]
    async fn reset_unknown_user_fails() {
        let ledger = MemoryLedger::new();
        assert_eq!(ledger.reset_user(UserId(9), [0; 32]), Err(LedgerError::UnknownUser(UserId(9))));
    }

    #[tokio::test]
    async fn seed_boxes_after_generation() {
        let ledger = ledger_with_team().await;
        let snapshot = ledger.reload(TEAM).await.unwrap();
        ledger.submit_link(rotation(&snapshot)).await.unwrap();

        let all = ledger.seed_boxes(TEAM, UserId(2), 0).await.unwrap();
        assert_eq!(all.iter().map(|b| b.generation).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(all[1].ctime_secs, 20);

        let newer = ledger.seed_boxes(TEAM, UserId(2), 1).await.unwrap();
        assert_eq!(newer.len(), 1);
    }

    #[tokio::test]
    async fn links_are_dense() {
        let ledger = ledger_with_team().await;
        let snapshot = ledger.reload(TEAM).await.unwrap();
        ledger.submit_link(rotation(&snapshot)).await.unwrap();

        let links = ledger.links(TEAM, 1, 10).await.unwrap();
        assert_eq!(links.iter().map(|l| l.seqno).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(links[1].prev, links[0].id().unwrap());
    }
}
