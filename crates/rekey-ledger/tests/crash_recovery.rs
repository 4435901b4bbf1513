//! Crash recovery tests for `RedbLedger`.
//!
//! Chains must survive database close/reopen cycles, simulating restarts.

use rekey_core::{
    Identity, Link, LinkBody, LinkId, Member, Role, SeedBox, TeamId, TeamSettings, UserId,
};
use rekey_crypto::SealedSeed;
use rekey_ledger::{Ledger, RedbLedger, SubmitOutcome};
use tempfile::tempdir;

const TEAM: TeamId = TeamId(0xfeed);

fn identity(user: u64) -> Identity {
    Identity { eldest_seqno: 1, box_key: [user as u8; 32] }
}

fn seed_box(user: u64, marker: u8) -> SeedBox {
    SeedBox {
        recipient: UserId(user),
        eldest_seqno: 1,
        sealed: SealedSeed {
            ephemeral_public: [marker; 32],
            nonce: [marker; 24],
            ciphertext: vec![marker; 48],
        },
    }
}

fn genesis() -> Link {
    Link {
        team_id: TEAM,
        seqno: 1,
        prev: LinkId::ZERO,
        author: UserId(1),
        ctime_secs: 1_000,
        body: LinkBody::Genesis {
            name: "infra".to_string(),
            settings: TeamSettings::default(),
            members: vec![
                Member::new(UserId(1), Role::Owner, identity(1)),
                Member::new(UserId(2), Role::Writer, identity(2)),
            ],
            boxes: vec![seed_box(1, 1), seed_box(2, 1)],
        },
    }
}

fn rotation(prev: LinkId, seqno: u64, generation: u64) -> Link {
    Link {
        team_id: TEAM,
        seqno,
        prev,
        author: UserId(2),
        ctime_secs: 1_000 + generation,
        body: LinkBody::RotateKey {
            generation,
            boxes: vec![seed_box(1, generation as u8), seed_box(2, generation as u8)],
            removed: vec![],
        },
    }
}

#[tokio::test]
async fn chain_survives_restart() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("ledger.redb");
    let rotations = 5u64;

    let head = {
        let ledger = RedbLedger::open(&db_path).unwrap();
        ledger.register_user(UserId(1), identity(1)).await.unwrap();
        ledger.register_user(UserId(2), identity(2)).await.unwrap();

        let mut head = ledger.create_team(genesis()).await.unwrap();
        for generation in 2..=rotations + 1 {
            let outcome = ledger.submit_link(rotation(head, generation, generation)).await.unwrap();
            let SubmitOutcome::Accepted { head: next, .. } = outcome else {
                panic!("rotation {generation} rejected");
            };
            head = next;
        }
        head
        // Database dropped
    };

    let ledger = RedbLedger::open(&db_path).unwrap();
    let snapshot = ledger.reload(TEAM).await.unwrap();
    assert_eq!(snapshot.head, head);
    assert_eq!(snapshot.generation, rotations + 1);
    assert_eq!(snapshot.seqno, rotations + 1);

    let links = ledger.links(TEAM, 1, 100).await.unwrap();
    assert_eq!(links.len() as u64, rotations + 1);
    for window in links.windows(2) {
        assert_eq!(window[1].prev, window[0].id().unwrap());
        assert_eq!(window[1].seqno, window[0].seqno + 1);
    }

    let boxes = ledger.seed_boxes(TEAM, UserId(2), 0).await.unwrap();
    let generations: Vec<u64> = boxes.iter().map(|b| b.generation).collect();
    assert_eq!(generations, (1..=rotations + 1).collect::<Vec<_>>());
}

#[tokio::test]
async fn identities_and_devices_survive_restart() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("ledger.redb");

    {
        let ledger = RedbLedger::open(&db_path).unwrap();
        ledger.register_user(UserId(7), identity(7)).await.unwrap();
        ledger.store_device_secret(UserId(7), &[0x42; 32]).unwrap();
    }

    let ledger = RedbLedger::open(&db_path).unwrap();
    assert_eq!(ledger.identity(UserId(7)).await.unwrap(), Some(identity(7)));
    assert_eq!(ledger.device_secret(UserId(7)).unwrap(), Some([0x42; 32]));
}

#[tokio::test]
async fn rejected_submission_writes_nothing() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("ledger.redb");

    {
        let ledger = RedbLedger::open(&db_path).unwrap();
        let genesis_head = ledger.create_team(genesis()).await.unwrap();
        let accepted = ledger.submit_link(rotation(genesis_head, 2, 2)).await.unwrap();
        assert!(matches!(accepted, SubmitOutcome::Accepted { seqno: 2, .. }));

        let stale = ledger.submit_link(rotation(genesis_head, 2, 2)).await.unwrap();
        assert!(matches!(stale, SubmitOutcome::Rejected { .. }));
    }

    let ledger = RedbLedger::open(&db_path).unwrap();
    assert_eq!(ledger.links(TEAM, 1, 100).await.unwrap().len(), 2);
    assert_eq!(ledger.reload(TEAM).await.unwrap().generation, 2);
}
