//! Fuzz target for the keyring
//!
//! # Strategy
//!
//! Random appends and ingests with arbitrary generations and seeds across a
//! few teams, mirrored into a plain vector per team.
//!
//! # Invariants
//!
//! - A team's generations are always exactly `1..=current`
//! - Accepted operations extend by exactly one generation
//! - Re-ingesting a held generation with its seed is a no-op
//! - A held generation never changes its seed

#![no_main]

use std::collections::BTreeMap;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rekey_core::{Ingest, KeyGenerationRecord, Keyring, TeamId};
use rekey_crypto::TeamSeed;

#[derive(Debug, Arbitrary)]
enum KeyringOp {
    Append { team: u8, generation: u8, seed: u8 },
    Ingest { team: u8, generation: u8, seed: u8 },
    Lookup { team: u8, generation: u8 },
}

fn record(generation: u8, seed: u8) -> KeyGenerationRecord {
    KeyGenerationRecord {
        generation: u64::from(generation),
        seed: TeamSeed::from_bytes([seed; 32]),
        created_at_secs: u64::from(generation),
    }
}

fuzz_target!(|ops: Vec<KeyringOp>| {
    let keyring = Keyring::new();
    let mut mirror: BTreeMap<u8, Vec<u8>> = BTreeMap::new();

    for op in ops {
        match op {
            KeyringOp::Append { team, generation, seed } => {
                let team = team % 3;
                let held = mirror.entry(team).or_default();
                let result = keyring.append(TeamId(u128::from(team)), record(generation, seed));
                if usize::from(generation) == held.len() + 1 {
                    assert!(result.is_ok());
                    held.push(seed);
                } else {
                    assert!(result.is_err());
                }
            },
            KeyringOp::Ingest { team, generation, seed } => {
                let team = team % 3;
                let held = mirror.entry(team).or_default();
                let result = keyring.ingest(TeamId(u128::from(team)), record(generation, seed));
                let index = usize::from(generation);
                if index >= 1 && index <= held.len() {
                    if held[index - 1] == seed {
                        assert_eq!(result.ok(), Some(Ingest::AlreadyPresent));
                    } else {
                        assert!(result.is_err());
                    }
                } else if index == held.len() + 1 {
                    assert_eq!(result.ok(), Some(Ingest::Appended));
                    held.push(seed);
                } else {
                    assert!(result.is_err());
                }
            },
            KeyringOp::Lookup { team, generation } => {
                let team = team % 3;
                let held = mirror.get(&team).map_or(&[][..], Vec::as_slice);
                let result = keyring.record_at(TeamId(u128::from(team)), u64::from(generation));
                let index = usize::from(generation);
                if index >= 1 && index <= held.len() {
                    assert_eq!(result.ok(), Some(TeamSeed::from_bytes([held[index - 1]; 32])));
                } else {
                    assert!(result.is_err());
                }
            },
        }
    }

    for (team, held) in &mirror {
        let current = keyring.current_generation(TeamId(u128::from(*team))).unwrap_or(0);
        assert_eq!(current, held.len() as u64);
    }
});
