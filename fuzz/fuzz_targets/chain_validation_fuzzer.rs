//! Fuzz target for chain validation
//!
//! # Strategy
//!
//! A three-member team receives arbitrary links: stale or current heads,
//! seqno gaps, unauthorized authors, rotations with wrong generations or
//! missing, duplicated and misaddressed boxes, removals of the last owner,
//! and membership edits with or without history boxes.
//!
//! # Invariants
//!
//! - Validation never panics
//! - An accepted link advances the seqno by exactly one and moves the head
//! - Only rotations change the generation, and only by one
//! - A stale head is a rejection, never an error
//! - The team always keeps an owner

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rekey_core::{
    HistoryBox, Identity, Link, LinkBody, LinkId, Member, MembershipChange, Role, SeedBox, TeamId,
    TeamSettings, UserId,
};
use rekey_crypto::{NONCE_SIZE, SealedSeed};
use rekey_ledger::{TeamChain, TeamState, Validation};

const TEAM: TeamId = TeamId(0xfeed);

#[derive(Debug, Arbitrary)]
struct FuzzLink {
    author: u8,
    stale_prev: bool,
    seqno_skew: i8,
    body: FuzzBody,
}

#[derive(Debug, Arbitrary)]
enum FuzzBody {
    Rotate { generation_skew: i8, recipients: Vec<(u8, u8)>, removed: Vec<u8> },
    Membership { changes: Vec<(u8, u8, bool)>, history: Vec<(u8, u8, u8)> },
    Rename { name: String },
    Settings { open: bool },
}

fn identity(user: u8, eldest_seqno: u64) -> Identity {
    Identity { eldest_seqno, box_key: [user; 32] }
}

fn role(byte: u8) -> Role {
    match byte % 5 {
        0 => Role::None,
        1 => Role::Reader,
        2 => Role::Writer,
        3 => Role::Admin,
        _ => Role::Owner,
    }
}

fn seed_box(recipient: u8, eldest_seqno: u8) -> SeedBox {
    SeedBox {
        recipient: UserId(u64::from(recipient % 5)),
        eldest_seqno: u64::from(eldest_seqno % 3),
        sealed: SealedSeed {
            ephemeral_public: [recipient; 32],
            nonce: [0; NONCE_SIZE],
            ciphertext: vec![0; 48],
        },
    }
}

fn genesis() -> Link {
    let members = vec![
        Member::new(UserId(1), Role::Owner, identity(1, 1)),
        Member::new(UserId(2), Role::Admin, identity(2, 1)),
        Member::new(UserId(3), Role::Reader, identity(3, 1)),
    ];
    let boxes = (1..=3).map(|user| seed_box(user, 1)).collect();
    Link {
        team_id: TEAM,
        seqno: 1,
        prev: LinkId::ZERO,
        author: UserId(1),
        ctime_secs: 0,
        body: LinkBody::Genesis {
            name: "fuzz".to_string(),
            settings: TeamSettings::default(),
            members,
            boxes,
        },
    }
}

fn body(state: &TeamState, body: FuzzBody) -> LinkBody {
    match body {
        FuzzBody::Rotate { generation_skew, recipients, removed } => LinkBody::RotateKey {
            generation: state
                .generation()
                .saturating_add_signed(i64::from(generation_skew % 3) + 1),
            boxes: recipients.into_iter().take(6).map(|(r, e)| seed_box(r, e)).collect(),
            removed: removed.into_iter().take(4).map(|u| UserId(u64::from(u % 5))).collect(),
        },
        FuzzBody::Membership { changes, history } => LinkBody::ChangeMembership {
            changes: changes
                .into_iter()
                .take(4)
                .map(|(user, r, with_identity)| MembershipChange {
                    user_id: UserId(u64::from(user % 5)),
                    role: role(r),
                    identity: with_identity.then(|| identity(user % 5, 1)),
                })
                .collect(),
            boxes: history
                .into_iter()
                .take(8)
                .map(|(generation, r, e)| HistoryBox {
                    generation: u64::from(generation) % (state.generation() + 2),
                    seed_box: seed_box(r, e),
                })
                .collect(),
        },
        FuzzBody::Rename { name } => LinkBody::Rename { name },
        FuzzBody::Settings { open } => {
            LinkBody::ChangeSettings { settings: TeamSettings { open, ..TeamSettings::default() } }
        },
    }
}

fuzz_target!(|links: Vec<FuzzLink>| {
    let mut state = TeamChain::genesis(&genesis()).expect("fixed genesis is valid");
    let mut previous_head = LinkId::ZERO;

    for fuzz in links.into_iter().take(32) {
        let is_rotation = matches!(fuzz.body, FuzzBody::Rotate { .. });
        let prev = if fuzz.stale_prev { previous_head } else { state.head };
        let link = Link {
            team_id: TEAM,
            seqno: state.seqno.saturating_add_signed(i64::from(fuzz.seqno_skew % 2) + 1),
            prev,
            author: UserId(u64::from(fuzz.author % 5)),
            ctime_secs: 1,
            body: body(&state, fuzz.body),
        };

        match TeamChain::apply(&state, &link) {
            Ok(Validation::Accept { state: next, head }) => {
                assert_eq!(link.prev, state.head);
                assert_eq!(next.seqno, state.seqno + 1);
                assert_eq!(next.head, head);
                assert_ne!(head, state.head);
                let expected = state.generation() + u64::from(is_rotation);
                assert_eq!(next.generation(), expected);
                assert!(next.members.values().any(|m| m.role == Role::Owner));

                previous_head = state.head;
                state = next;
            },
            Ok(Validation::Reject { head }) => {
                assert_eq!(head, state.head);
                assert_ne!(link.prev, state.head);
            },
            Err(_) => {},
        }
    }
});
