//! Observable system state for invariant checks.

use std::collections::BTreeMap;

use crate::model::UserIndex;

/// One device's keyring.
#[derive(Debug, Clone, Default)]
pub struct DeviceSnapshot {
    /// User the device belongs to.
    pub user: UserIndex,
    /// Credential epoch of the device.
    pub eldest_seqno: u64,
    /// `(generation, fingerprint)` for every held generation, oldest first.
    pub keys: Vec<(u64, [u8; 32])>,
}

/// Ledger and keyring state at one point of a simulation.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// Generation recorded by the ledger.
    pub generation: u64,
    /// Generation of every `RotateKey` link, in chain order.
    pub rotation_generations: Vec<u64>,
    /// Members with the owner role.
    pub owners: usize,
    /// Every current device.
    pub devices: Vec<DeviceSnapshot>,
    /// Fingerprint of each generation the first time any device held it.
    pub first_seen: BTreeMap<u64, [u8; 32]>,
}

impl SystemSnapshot {
    /// Snapshot with no team.
    pub fn empty() -> Self {
        Self { owners: 1, ..Self::default() }
    }

    /// Merge this snapshot's keys into a first-seen map.
    pub fn record_first_seen(&self, first_seen: &mut BTreeMap<u64, [u8; 32]>) {
        for device in &self.devices {
            for (generation, key) in &device.keys {
                first_seen.entry(*generation).or_insert(*key);
            }
        }
    }
}
