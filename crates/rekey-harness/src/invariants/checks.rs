//! Standard invariant checks.

use std::collections::BTreeMap;

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

/// The team always keeps at least one owner.
pub struct OwnerRetained;

impl Invariant for OwnerRetained {
    fn name(&self) -> &'static str {
        "owner_retained"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        if state.owners == 0 {
            return Err(Violation {
                invariant: self.name(),
                message: format!("no owner left at generation {}", state.generation),
            });
        }
        Ok(())
    }
}

/// Generations are dense.
///
/// The chain holds exactly one rotation per generation from 2 up to the
/// ledger's generation, and every keyring holds `1..=n` for some `n` no
/// greater than the ledger's generation.
pub struct GenerationDensity;

impl Invariant for GenerationDensity {
    fn name(&self) -> &'static str {
        "generation_density"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let expected: Vec<u64> = (2..=state.generation).collect();
        if state.rotation_generations != expected {
            return Err(Violation {
                invariant: self.name(),
                message: format!(
                    "chain rotations {:?} do not cover 2..={}",
                    state.rotation_generations, state.generation
                ),
            });
        }

        for device in &state.devices {
            let held: Vec<u64> = device.keys.iter().map(|(g, _)| *g).collect();
            let dense = held.iter().zip(1..).all(|(g, expected)| *g == expected);
            if !dense || held.last().is_some_and(|g| *g > state.generation) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "user {} holds generations {held:?} with ledger at {}",
                        device.user, state.generation
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Devices holding the same generation derive the same key.
pub struct KeyAgreement;

impl Invariant for KeyAgreement {
    fn name(&self) -> &'static str {
        "key_agreement"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let mut seen: BTreeMap<u64, (u8, [u8; 32])> = BTreeMap::new();
        for device in &state.devices {
            for (generation, key) in &device.keys {
                let (holder, agreed) = *seen.entry(*generation).or_insert((device.user, *key));
                if agreed != *key {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "users {holder} and {} disagree on generation {generation}",
                            device.user
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// A generation's key never changes once any device held it.
pub struct HistoryImmutability;

impl Invariant for HistoryImmutability {
    fn name(&self) -> &'static str {
        "history_immutability"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for device in &state.devices {
            for (generation, key) in &device.keys {
                if state.first_seen.get(generation).is_some_and(|first| first != key) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "user {} holds a different key for generation {generation}",
                            device.user
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}
