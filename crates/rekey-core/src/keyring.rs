//! Key generation store.
//!
//! Holds, per team, every key generation this process has seen. Generations
//! form a dense sequence `1..=current`; records are immutable once appended
//! and retained forever so historical content stays decryptable.
//!
//! The store is a local cache. It may lag behind a concurrent writer in
//! another process; the rotation engine closes that gap by reloading from the
//! ledger and ingesting the missing generations, never by trusting this cache
//! for a rotation decision.
//!
//! # Concurrency
//!
//! Readers of different teams never contend. Within one team, reads share a
//! read lock and `append`/`ingest` take the team's write lock, which is the
//! per-team exclusive section for writers.

#![allow(clippy::expect_used, reason = "Lock poisoning should cause a panic")]

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use rekey_crypto::TeamSeed;

use crate::{FIRST_GENERATION, error::KeyringError, ids::TeamId};

/// One key generation of a team. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyGenerationRecord {
    /// Generation number, starting at 1
    pub generation: u64,
    /// Seed of this generation
    pub seed: TeamSeed,
    /// Unix seconds when the generation was created
    pub created_at_secs: u64,
}

/// Result of [`Keyring::ingest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    /// The record extended the team by one generation.
    Appended,
    /// The record was already held with an identical seed.
    AlreadyPresent,
}

/// Records of a single team. `records[i]` holds generation `i + 1`.
#[derive(Default)]
struct TeamKeys {
    records: Vec<KeyGenerationRecord>,
}

impl TeamKeys {
    fn current(&self) -> u64 {
        self.records.len() as u64
    }

    fn get(&self, generation: u64) -> Option<&KeyGenerationRecord> {
        if generation < FIRST_GENERATION {
            return None;
        }
        self.records.get((generation - FIRST_GENERATION) as usize)
    }

    fn push(&mut self, record: KeyGenerationRecord) -> Result<(), KeyringError> {
        let expected = self.current() + 1;
        if record.generation != expected {
            return Err(KeyringError::OutOfOrder { expected, got: record.generation });
        }

        self.records.push(record);

        debug_assert_eq!(self.records.last().map(|r| r.generation), Some(self.current()));
        Ok(())
    }
}

/// Per-process key generation store shared by all rotation attempts.
///
/// Clone is cheap and shares the same underlying records.
#[derive(Clone, Default)]
pub struct Keyring {
    teams: Arc<RwLock<HashMap<TeamId, Arc<RwLock<TeamKeys>>>>>,
}

impl Keyring {
    /// Create an empty keyring.
    pub fn new() -> Self {
        Self::default()
    }

    fn team(&self, team_id: TeamId) -> Option<Arc<RwLock<TeamKeys>>> {
        self.teams.read().expect("Keyring lock poisoned").get(&team_id).cloned()
    }

    fn team_or_insert(&self, team_id: TeamId) -> Arc<RwLock<TeamKeys>> {
        if let Some(team) = self.team(team_id) {
            return team;
        }
        let mut teams = self.teams.write().expect("Keyring lock poisoned");
        Arc::clone(teams.entry(team_id).or_default())
    }

    /// Current generation and its seed.
    ///
    /// Reflects the latest generation committed or ingested by this process.
    ///
    /// # Errors
    ///
    /// `UnknownTeam` if this process holds no generation for the team.
    pub fn latest(&self, team_id: TeamId) -> Result<(u64, TeamSeed), KeyringError> {
        let team = self.team(team_id).ok_or(KeyringError::UnknownTeam(team_id))?;
        let keys = team.read().expect("Keyring lock poisoned");
        let record = keys.records.last().ok_or(KeyringError::UnknownTeam(team_id))?;
        Ok((record.generation, record.seed.clone()))
    }

    /// Current generation, `None` if the team is unknown.
    pub fn current_generation(&self, team_id: TeamId) -> Option<u64> {
        let team = self.team(team_id)?;
        let current = team.read().expect("Keyring lock poisoned").current();
        (current >= FIRST_GENERATION).then_some(current)
    }

    /// Seed of `generation`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if `generation` is 0 or beyond the current generation
    /// - `UnknownTeam` if this process holds no generation for the team
    pub fn record_at(&self, team_id: TeamId, generation: u64) -> Result<TeamSeed, KeyringError> {
        let team = self.team(team_id).ok_or(KeyringError::UnknownTeam(team_id))?;
        let keys = team.read().expect("Keyring lock poisoned");
        keys.get(generation)
            .map(|r| r.seed.clone())
            .ok_or(KeyringError::NotFound { generation, current: keys.current() })
    }

    /// All retained records of a team, oldest first.
    pub fn records(&self, team_id: TeamId) -> Result<Vec<KeyGenerationRecord>, KeyringError> {
        let team = self.team(team_id).ok_or(KeyringError::UnknownTeam(team_id))?;
        let keys = team.read().expect("Keyring lock poisoned");
        if keys.records.is_empty() {
            return Err(KeyringError::UnknownTeam(team_id));
        }
        Ok(keys.records.clone())
    }

    /// Append the next generation.
    ///
    /// An unknown team starts at generation 0, so its first append must be
    /// generation 1.
    ///
    /// # Errors
    ///
    /// `OutOfOrder` unless `record.generation == current + 1`. Fatal.
    pub fn append(&self, team_id: TeamId, record: KeyGenerationRecord) -> Result<(), KeyringError> {
        let team = self.team_or_insert(team_id);
        let mut keys = team.write().expect("Keyring lock poisoned");
        let generation = record.generation;

        keys.push(record).inspect_err(|e| {
            tracing::error!(team_id = %team_id, generation, error = %e, "Keyring append rejected");
        })?;

        tracing::debug!(team_id = %team_id, generation, "Appended key generation");
        Ok(())
    }

    /// Idempotent commit of a generation learned from the ledger.
    ///
    /// Used both after this process's own rotation was accepted and when
    /// catching up with generations created elsewhere. Two attempts racing to
    /// commit the same accepted generation both succeed.
    ///
    /// # Errors
    ///
    /// - `Divergent` if the generation is held with a different seed
    /// - `OutOfOrder` if the record would leave a gap
    pub fn ingest(
        &self,
        team_id: TeamId,
        record: KeyGenerationRecord,
    ) -> Result<Ingest, KeyringError> {
        let team = self.team_or_insert(team_id);
        let mut keys = team.write().expect("Keyring lock poisoned");

        if let Some(existing) = keys.get(record.generation) {
            if existing.seed == record.seed {
                return Ok(Ingest::AlreadyPresent);
            }
            tracing::error!(
                team_id = %team_id,
                generation = record.generation,
                "Ledger delivered a different seed for a held generation"
            );
            return Err(KeyringError::Divergent { generation: record.generation });
        }

        let generation = record.generation;
        keys.push(record)?;

        tracing::debug!(team_id = %team_id, generation, "Ingested key generation");
        Ok(Ingest::Appended)
    }

    /// Teams with at least one generation.
    pub fn teams(&self) -> Vec<TeamId> {
        let teams = self.teams.read().expect("Keyring lock poisoned");
        teams
            .iter()
            .filter(|(_, keys)| keys.read().expect("Keyring lock poisoned").current() > 0)
            .map(|(id, _)| *id)
            .collect()
    }
}
