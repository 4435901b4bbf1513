//! End-to-end rotation tests against an in-memory ledger.
//!
//! Each user gets its own engine (device and keyring), all sharing one
//! ledger, the way separate machines share the team chain.

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    time::Duration,
};

use rekey_core::{
    Application, Identity, KeyringError, Link, LinkBody, LinkId, MembershipChange, Role, TeamId,
    TeamSettings, TeamSnapshot, UserId,
};
use rekey_crypto::ApplicationKey;
use rekey_engine::{
    Cancellation, Device, EngineConfig, EngineError, RotateRequestOutcome, RotationConfig,
    RotationError, SystemEnv, TeamKeyEngine,
};
use rekey_ledger::{
    ChaoticLedger, Fault, GenerationBox, Ledger, LedgerError, MemoryLedger, SubmitOutcome,
};

fn config() -> EngineConfig {
    EngineConfig {
        rotation: RotationConfig {
            max_attempts: 10,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(20),
        },
    }
}

async fn user<L: Ledger>(ledger: &L, id: u64) -> TeamKeyEngine<L, SystemEnv> {
    device_at(ledger, id, 1).await
}

/// Fresh device for `id` at credential epoch `eldest_seqno`, published as
/// the user's current identity.
async fn device_at<L: Ledger>(
    ledger: &L,
    id: u64,
    eldest_seqno: u64,
) -> TeamKeyEngine<L, SystemEnv> {
    let env = SystemEnv::new();
    let device = Device::provision(&env, UserId(id), eldest_seqno);
    let engine = TeamKeyEngine::new(ledger.clone(), env, config(), device).unwrap();
    engine.register().await.unwrap();
    engine
}

/// Owner 1 plus members 2 (admin), 3 (writer), 4 (reader).
async fn four_member_team(
    ledger: &MemoryLedger,
    open: bool,
) -> (TeamId, Vec<TeamKeyEngine<MemoryLedger, SystemEnv>>) {
    let mut engines = Vec::new();
    for id in 1..=4 {
        engines.push(user(ledger, id).await);
    }
    let settings = TeamSettings { open, ..TeamSettings::default() };
    let team = engines[0]
        .create_team(
            "four",
            settings,
            &[(UserId(2), Role::Admin), (UserId(3), Role::Writer), (UserId(4), Role::Reader)],
        )
        .await
        .unwrap();
    (team, engines)
}

#[tokio::test]
async fn rotate_advances_generation_and_keeps_history() {
    let ledger = MemoryLedger::new();
    let owner = user(&ledger, 1).await;
    let _member = user(&ledger, 2).await;
    let team = owner
        .create_team("acme", TeamSettings::default(), &[(UserId(2), Role::Writer)])
        .await
        .unwrap();

    let before = owner.latest_application_key(team, Application::Chat).unwrap();
    assert_eq!(before.generation(), 1);

    let generation = owner.rotate(team).await.unwrap();
    assert_eq!(generation, 2);

    let after = owner.latest_application_key(team, Application::Chat).unwrap();
    assert_eq!(after.generation(), 2);
    assert_ne!(after.key(), before.key());

    let old = owner.application_key_at_generation(team, Application::Chat, 1).unwrap();
    assert_eq!(old, before);

    let all = owner.all_application_keys(team, Application::Chat).unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0], before);
    assert_eq!(all[1], after);

    assert_eq!(ledger.reload(team).await.unwrap().generation, 2);
}

#[tokio::test]
async fn old_generations_are_stable_across_rotations() {
    let ledger = MemoryLedger::new();
    let owner = user(&ledger, 1).await;
    let team = owner.create_team("stable", TeamSettings::default(), &[]).await.unwrap();

    let pinned: Vec<_> = Application::ALL
        .iter()
        .map(|app| owner.application_key_at_generation(team, *app, 1).unwrap())
        .collect();

    for expected in 2..=6 {
        assert_eq!(owner.rotate(team).await.unwrap(), expected);
    }

    for (app, key) in Application::ALL.iter().zip(&pinned) {
        assert_eq!(&owner.application_key_at_generation(team, *app, 1).unwrap(), key);
    }
}

#[tokio::test]
async fn generation_outside_range_is_not_found() {
    let ledger = MemoryLedger::new();
    let owner = user(&ledger, 1).await;
    let team = owner.create_team("range", TeamSettings::default(), &[]).await.unwrap();

    for generation in [0, 2, 99] {
        let err = owner.application_key_at_generation(team, Application::Kbfs, generation);
        assert!(matches!(err, Err(EngineError::Keyring(KeyringError::NotFound { .. }))));
    }
}

#[tokio::test]
async fn stale_rotate_request_is_a_noop() {
    let ledger = MemoryLedger::new();
    let owner = user(&ledger, 1).await;
    let team = owner.create_team("stale", TeamSettings::default(), &[]).await.unwrap();
    owner.rotate(team).await.unwrap();

    let key = owner.latest_application_key(team, Application::Saltpack).unwrap();
    let head = ledger.reload(team).await.unwrap().head;

    let outcome = owner.handle_rotate_request(team, 1).await.unwrap();
    assert_eq!(outcome, RotateRequestOutcome::Stale { current: 2 });

    let snapshot = ledger.reload(team).await.unwrap();
    assert_eq!(snapshot.generation, 2);
    assert_eq!(snapshot.head, head);
    assert_eq!(owner.latest_application_key(team, Application::Saltpack).unwrap(), key);
}

#[tokio::test]
async fn current_rotate_request_advances_once() {
    let ledger = MemoryLedger::new();
    let owner = user(&ledger, 1).await;
    let team = owner.create_team("current", TeamSettings::default(), &[]).await.unwrap();

    let outcome = owner.handle_rotate_request(team, 1).await.unwrap();
    assert_eq!(outcome, RotateRequestOutcome::Rotated { generation: 2 });
    assert_eq!(ledger.reload(team).await.unwrap().generation, 2);
    assert_eq!(ledger.accepted_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_rotate_requests() {
    let ledger = MemoryLedger::new();
    let alice = user(&ledger, 1).await;
    let bob = user(&ledger, 2).await;
    let team = alice
        .create_team("race", TeamSettings::default(), &[(UserId(2), Role::Admin)])
        .await
        .unwrap();

    let rounds = async {
        for _ in 0..5 {
            let initial = ledger.reload(team).await.unwrap().generation;

            let a = {
                let alice = alice.clone();
                tokio::spawn(async move { alice.handle_rotate_request(team, initial).await })
            };
            let b = {
                let bob = bob.clone();
                tokio::spawn(async move { bob.handle_rotate_request(team, initial).await })
            };

            let mut rotated = 0;
            for outcome in [a.await.unwrap().unwrap(), b.await.unwrap().unwrap()] {
                match outcome {
                    RotateRequestOutcome::Rotated { generation } => {
                        assert_eq!(generation, initial + 1);
                        rotated += 1;
                    },
                    RotateRequestOutcome::Stale { current } => assert!(current > initial),
                }
            }

            // The gate lets only one of two identical requests through.
            assert_eq!(rotated, 1);
            assert_eq!(ledger.reload(team).await.unwrap().generation, initial + 1);
        }
    };
    tokio::time::timeout(Duration::from_secs(20), rounds).await.unwrap();

    // Both devices converge on the same keys.
    bob.refresh(team).await.unwrap();
    alice.refresh(team).await.unwrap();
    assert_eq!(
        alice.all_application_keys(team, Application::Chat).unwrap(),
        bob.all_application_keys(team, Application::Chat).unwrap()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_rotations_each_land_or_exhaust() {
    let ledger = MemoryLedger::new();
    let alice = user(&ledger, 1).await;
    let bob = user(&ledger, 2).await;
    let team = alice
        .create_team("race", TeamSettings::default(), &[(UserId(2), Role::Writer)])
        .await
        .unwrap();

    let rounds = async {
        for _ in 0..5 {
            let initial = ledger.reload(team).await.unwrap().generation;
            let a = {
                let alice = alice.clone();
                tokio::spawn(async move { alice.rotate(team).await })
            };
            let b = {
                let bob = bob.clone();
                tokio::spawn(async move { bob.rotate(team).await })
            };

            let mut successes = 0;
            for result in [a.await.unwrap(), b.await.unwrap()] {
                match result {
                    Ok(_) => successes += 1,
                    Err(RotationError::ConflictExhausted { .. }) => {},
                    Err(err) => panic!("unexpected rotation error: {err}"),
                }
            }
            assert_eq!(ledger.reload(team).await.unwrap().generation, initial + successes);
        }
    };
    tokio::time::timeout(Duration::from_secs(20), rounds).await.unwrap();

    let links = ledger.links(team, 1, usize::MAX).await.unwrap();
    let generations: Vec<u64> = links
        .iter()
        .filter_map(|l| match &l.body {
            LinkBody::RotateKey { generation, .. } => Some(*generation),
            _ => None,
        })
        .collect();
    let expected: Vec<u64> = (2..2 + generations.len() as u64).collect();
    assert_eq!(generations, expected);
}

#[tokio::test]
async fn open_team_sweeps_reset_members() {
    let ledger = MemoryLedger::new();
    let (team, engines) = four_member_team(&ledger, true).await;

    ledger.reset_user(UserId(2), [0xa2; 32]).unwrap();
    ledger.reset_user(UserId(3), [0xa3; 32]).unwrap();

    let generation = engines[0].rotate(team).await.unwrap();
    assert_eq!(generation, 2);

    let snapshot = ledger.reload(team).await.unwrap();
    let remaining: Vec<(UserId, Role)> =
        snapshot.members.iter().map(|m| (m.user_id, m.role)).collect();
    assert_eq!(remaining, vec![(UserId(1), Role::Owner), (UserId(4), Role::Reader)]);
    assert!(snapshot.reset.is_empty());

    let links = ledger.links(team, 2, 1).await.unwrap();
    let LinkBody::RotateKey { removed, .. } = &links[0].body else {
        panic!("expected rotation link");
    };
    assert_eq!(removed, &vec![UserId(2), UserId(3)]);
}

#[tokio::test]
async fn closed_team_keeps_roles_but_skips_reset_boxes() {
    let ledger = MemoryLedger::new();
    let (team, engines) = four_member_team(&ledger, false).await;
    let before = ledger.reload(team).await.unwrap();

    ledger.reset_user(UserId(2), [0xb2; 32]).unwrap();
    ledger.reset_user(UserId(3), [0xb3; 32]).unwrap();

    engines[0].rotate(team).await.unwrap();

    let after = ledger.reload(team).await.unwrap();
    assert_eq!(after.generation, 2);
    assert_eq!(after.members, before.members);

    let boxed_at_two = |boxes: Vec<GenerationBox>| boxes.iter().any(|b| b.generation == 2);
    for (id, expect_box) in [(1, true), (2, false), (3, false), (4, true)] {
        let boxes = ledger.seed_boxes(team, UserId(id), 1).await.unwrap();
        assert_eq!(boxed_at_two(boxes), expect_box, "user {id}");
    }
}

#[tokio::test]
async fn sweep_never_removes_last_owner() {
    let ledger = MemoryLedger::new();
    let owner = user(&ledger, 1).await;
    let _co_owner = user(&ledger, 2).await;
    let reader = user(&ledger, 3).await;
    let settings = TeamSettings { open: true, ..TeamSettings::default() };
    let team = owner
        .create_team("owners", settings, &[(UserId(2), Role::Owner), (UserId(3), Role::Reader)])
        .await
        .unwrap();

    ledger.reset_user(UserId(1), [0xc1; 32]).unwrap();
    ledger.reset_user(UserId(2), [0xc2; 32]).unwrap();

    reader.refresh(team).await.unwrap();
    assert_eq!(reader.rotate(team).await.unwrap(), 2);

    let snapshot = ledger.reload(team).await.unwrap();
    assert_eq!(snapshot.users_with_role_or_above(Role::Owner).len(), 1);
    assert_eq!(snapshot.member(UserId(3)).map(|m| m.role), Some(Role::Reader));
}

#[tokio::test]
async fn member_refresh_matches_rotator_keys() {
    let ledger = MemoryLedger::new();
    let owner = user(&ledger, 1).await;
    let member = user(&ledger, 2).await;
    let team = owner
        .create_team("sync", TeamSettings::default(), &[(UserId(2), Role::Reader)])
        .await
        .unwrap();

    owner.rotate(team).await.unwrap();
    owner.rotate(team).await.unwrap();

    assert_eq!(member.refresh(team).await.unwrap(), 3);
    assert_eq!(
        member.latest_application_key(team, Application::GitMetadata).unwrap(),
        owner.latest_application_key(team, Application::GitMetadata).unwrap()
    );
    // Idempotent.
    assert_eq!(member.refresh(team).await.unwrap(), 3);
}

#[tokio::test]
async fn reset_actor_is_not_a_member() {
    let ledger = MemoryLedger::new();
    let owner = user(&ledger, 1).await;
    let member = user(&ledger, 2).await;
    let team = owner
        .create_team("reset", TeamSettings::default(), &[(UserId(2), Role::Writer)])
        .await
        .unwrap();

    ledger.reset_user(UserId(2), [0xd2; 32]).unwrap();
    assert_eq!(member.rotate(team).await, Err(RotationError::NotAMember(UserId(2))));
    assert_eq!(ledger.reload(team).await.unwrap().generation, 1);
}

#[tokio::test]
async fn cancelled_before_first_attempt() {
    let ledger = MemoryLedger::new();
    let owner = user(&ledger, 1).await;
    let team = owner.create_team("cancel", TeamSettings::default(), &[]).await.unwrap();

    let cancel = Cancellation::new();
    cancel.cancel();
    assert_eq!(
        owner.rotate_with(team, &cancel).await,
        Err(RotationError::Cancelled { attempts: 0 })
    );
    assert_eq!(ledger.reload(team).await.unwrap().generation, 1);
}

#[tokio::test]
async fn lost_ack_is_indeterminate_until_refresh() {
    let memory = MemoryLedger::new();
    let ledger = ChaoticLedger::new(memory.clone(), 0.0);
    let owner = user(&ledger, 1).await;
    let team = owner.create_team("lossy", TeamSettings::default(), &[]).await.unwrap();

    ledger.inject(Fault::LostAck);
    let err = owner.rotate(team).await.unwrap_err();
    assert!(matches!(err, RotationError::Indeterminate { generation: 2, .. }));
    assert!(err.is_transient());

    // The link landed; the keyring learns the seed from the ledger.
    assert_eq!(memory.reload(team).await.unwrap().generation, 2);
    assert_eq!(owner.refresh(team).await.unwrap(), 2);
    assert_eq!(owner.latest_application_key(team, Application::Chat).unwrap().generation(), 2);
}

#[tokio::test]
async fn lost_request_is_indeterminate_and_changes_nothing() {
    let memory = MemoryLedger::new();
    let ledger = ChaoticLedger::new(memory.clone(), 0.0);
    let owner = user(&ledger, 1).await;
    let team = owner.create_team("lossy", TeamSettings::default(), &[]).await.unwrap();

    ledger.inject(Fault::LostRequest);
    let err = owner.rotate(team).await.unwrap_err();
    assert!(matches!(err, RotationError::Indeterminate { generation: 2, .. }));

    assert_eq!(owner.refresh(team).await.unwrap(), 1);
    assert_eq!(owner.rotate(team).await.unwrap(), 2);
}

/// Ledger that lets a competing link land right before each of the next
/// `remaining` submissions.
#[derive(Clone)]
struct InterferingLedger {
    inner: MemoryLedger,
    rival: UserId,
    remaining: Arc<AtomicU32>,
}

impl InterferingLedger {
    async fn interfere(&self, team_id: TeamId) -> Result<(), LedgerError> {
        let snapshot: TeamSnapshot = self.inner.reload(team_id).await?;
        let rename = Link {
            team_id,
            seqno: snapshot.seqno + 1,
            prev: snapshot.head,
            author: self.rival,
            ctime_secs: 0,
            body: LinkBody::Rename { name: format!("renamed-{}", snapshot.seqno) },
        };
        let outcome = self.inner.submit_link(rename).await?;
        assert!(matches!(outcome, SubmitOutcome::Accepted { .. }));
        Ok(())
    }
}

impl Ledger for InterferingLedger {
    async fn register_user(&self, user_id: UserId, identity: Identity) -> Result<(), LedgerError> {
        self.inner.register_user(user_id, identity).await
    }

    async fn identity(&self, user_id: UserId) -> Result<Option<Identity>, LedgerError> {
        self.inner.identity(user_id).await
    }

    async fn create_team(&self, genesis: Link) -> Result<LinkId, LedgerError> {
        self.inner.create_team(genesis).await
    }

    async fn reload(&self, team_id: TeamId) -> Result<TeamSnapshot, LedgerError> {
        self.inner.reload(team_id).await
    }

    async fn submit_link(&self, link: Link) -> Result<SubmitOutcome, LedgerError> {
        let interfere = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if interfere {
            self.interfere(link.team_id).await?;
        }
        self.inner.submit_link(link).await
    }

    async fn seed_boxes(
        &self,
        team_id: TeamId,
        recipient: UserId,
        after_generation: u64,
    ) -> Result<Vec<GenerationBox>, LedgerError> {
        self.inner.seed_boxes(team_id, recipient, after_generation).await
    }

    async fn links(
        &self,
        team_id: TeamId,
        from_seqno: u64,
        limit: usize,
    ) -> Result<Vec<Link>, LedgerError> {
        self.inner.links(team_id, from_seqno, limit).await
    }
}

#[tokio::test]
async fn conflicts_are_retried() {
    let ledger = InterferingLedger {
        inner: MemoryLedger::new(),
        rival: UserId(1),
        remaining: Arc::new(AtomicU32::new(0)),
    };
    let owner = user(&ledger, 1).await;
    let team = owner.create_team("busy", TeamSettings::default(), &[]).await.unwrap();

    ledger.remaining.store(3, Ordering::SeqCst);
    assert_eq!(owner.rotate(team).await.unwrap(), 2);
    assert_eq!(ledger.inner.rejected_count(), 3);
    assert_eq!(ledger.inner.reload(team).await.unwrap().seqno, 5);
}

#[tokio::test]
async fn conflicts_exhaust_the_attempt_budget() {
    let ledger = InterferingLedger {
        inner: MemoryLedger::new(),
        rival: UserId(1),
        remaining: Arc::new(AtomicU32::new(0)),
    };
    let owner = user(&ledger, 1).await;
    let team = owner.create_team("busy", TeamSettings::default(), &[]).await.unwrap();

    ledger.remaining.store(u32::MAX, Ordering::SeqCst);
    assert_eq!(owner.rotate(team).await, Err(RotationError::ConflictExhausted { attempts: 10 }));

    let snapshot = ledger.inner.reload(team).await.unwrap();
    assert_eq!(snapshot.generation, 1);
    assert_eq!(owner.latest_application_key(team, Application::Chat).unwrap().generation(), 1);
}

#[tokio::test]
async fn added_member_receives_every_generation() {
    let ledger = MemoryLedger::new();
    let owner = user(&ledger, 1).await;
    let newcomer = user(&ledger, 2).await;
    let team = owner.create_team("growing", TeamSettings::default(), &[]).await.unwrap();
    owner.rotate(team).await.unwrap();
    owner.rotate(team).await.unwrap();

    // A bare membership change would leave the newcomer unable to open
    // generations 1..=3, so the ledger refuses it.
    let snapshot = ledger.reload(team).await.unwrap();
    let bare = Link {
        team_id: team,
        seqno: snapshot.seqno + 1,
        prev: snapshot.head,
        author: UserId(1),
        ctime_secs: 0,
        body: LinkBody::ChangeMembership {
            changes: vec![MembershipChange {
                user_id: UserId(2),
                role: Role::Writer,
                identity: ledger.identity(UserId(2)).await.unwrap(),
            }],
            boxes: Vec::new(),
        },
    };
    assert!(matches!(ledger.submit_link(bare).await, Err(LedgerError::InvalidLink(_))));

    assert_eq!(owner.change_membership(team, &[(UserId(2), Role::Writer)]).await.unwrap(), 4);
    assert_eq!(newcomer.refresh(team).await.unwrap(), 3);
    assert_eq!(
        newcomer.all_application_keys(team, Application::Chat).unwrap(),
        owner.all_application_keys(team, Application::Chat).unwrap()
    );

    assert_eq!(newcomer.rotate(team).await.unwrap(), 4);
    assert_eq!(owner.refresh(team).await.unwrap(), 4);
    assert_eq!(
        newcomer.latest_application_key(team, Application::Chat).unwrap(),
        owner.latest_application_key(team, Application::Chat).unwrap()
    );
}

#[tokio::test]
async fn reset_member_is_readded_with_history() {
    let ledger = MemoryLedger::new();
    let owner = user(&ledger, 1).await;
    let old_device = user(&ledger, 2).await;
    let team = owner
        .create_team("readd", TeamSettings::default(), &[(UserId(2), Role::Writer)])
        .await
        .unwrap();
    owner.rotate(team).await.unwrap();
    old_device.refresh(team).await.unwrap();

    let new_device = device_at(&ledger, 2, 2).await;
    assert_eq!(new_device.rotate(team).await, Err(RotationError::NotAMember(UserId(2))));

    owner.change_membership(team, &[(UserId(2), Role::Writer)]).await.unwrap();
    let snapshot = ledger.reload(team).await.unwrap();
    assert!(snapshot.reset.is_empty());
    assert_eq!(snapshot.member(UserId(2)).map(|m| m.eldest_seqno), Some(2));

    assert_eq!(new_device.refresh(team).await.unwrap(), 2);
    assert_eq!(new_device.rotate(team).await.unwrap(), 3);

    // The replaced device passes the membership check but cannot follow the
    // chain; it must fail before submitting anything.
    assert_eq!(
        old_device.rotate(team).await,
        Err(RotationError::MissingGenerations { user: UserId(2), held: 2, current: 3 })
    );
    assert_eq!(ledger.reload(team).await.unwrap().generation, 3);
}

#[tokio::test]
async fn membership_changes_need_an_admin() {
    let ledger = MemoryLedger::new();
    let owner = user(&ledger, 1).await;
    let writer = user(&ledger, 2).await;
    let _outsider = user(&ledger, 3).await;
    let team = owner
        .create_team("gated", TeamSettings::default(), &[(UserId(2), Role::Writer)])
        .await
        .unwrap();

    let err = writer.change_membership(team, &[(UserId(3), Role::Reader)]).await.unwrap_err();
    assert!(matches!(
        err,
        RotationError::Ledger(LedgerError::Unauthorized { required: Role::Admin, .. })
    ));

    owner.change_membership(team, &[(UserId(2), Role::None)]).await.unwrap();
    assert_eq!(writer.rotate(team).await, Err(RotationError::NotAMember(UserId(2))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn observer_only_sees_whole_generations() {
    let ledger = MemoryLedger::new();
    let (team, engines) = four_member_team(&ledger, false).await;
    let done = Arc::new(AtomicBool::new(false));

    let rotators: Vec<_> = engines[..2]
        .iter()
        .cloned()
        .map(|engine| {
            tokio::spawn(async move {
                for _ in 0..5 {
                    match engine.rotate(team).await {
                        Ok(_) | Err(RotationError::ConflictExhausted { .. }) => {},
                        Err(err) => panic!("unexpected rotation error: {err}"),
                    }
                }
            })
        })
        .collect();

    let observer = {
        let reader = engines[3].clone();
        let ledger = ledger.clone();
        let done = done.clone();
        tokio::spawn(async move {
            let mut seen: BTreeMap<u64, ApplicationKey> = BTreeMap::new();
            loop {
                let finished = done.load(Ordering::SeqCst);
                let held = reader.refresh(team).await.unwrap();
                assert!(held <= ledger.reload(team).await.unwrap().generation);

                let keys = reader.all_application_keys(team, Application::Chat).unwrap();
                let generations: Vec<u64> = keys.iter().map(ApplicationKey::generation).collect();
                assert_eq!(generations, (1..=held).collect::<Vec<_>>());
                for key in keys {
                    assert_eq!(seen.entry(key.generation()).or_insert_with(|| key.clone()), &key);
                }

                if finished {
                    break seen;
                }
                tokio::task::yield_now().await;
            }
        })
    };

    let race = async {
        for rotator in rotators {
            rotator.await.unwrap();
        }
    };
    tokio::time::timeout(Duration::from_secs(20), race).await.unwrap();
    done.store(true, Ordering::SeqCst);
    let seen = observer.await.unwrap();

    let generation = ledger.reload(team).await.unwrap().generation;
    assert_eq!(seen.keys().copied().collect::<Vec<_>>(), (1..=generation).collect::<Vec<_>>());

    let rotator = &engines[0];
    rotator.refresh(team).await.unwrap();
    for (generation, key) in &seen {
        let held = rotator.application_key_at_generation(team, Application::Chat, *generation);
        assert_eq!(&held.unwrap(), key);
    }
}
