//! Simulated deployment: one in-memory ledger, one engine per user.
//!
//! Every user starts with a device registered at eldest seqno 1, and user 0
//! creates the team described by a [`TeamShape`]. Operations drive the real
//! engines, and [`SimWorld::snapshot`] reads back the ledger and every
//! keyring for invariant checks.
//!
//! Run simulations on a paused tokio runtime so retry backoff costs no
//! wall-clock time.

use std::{collections::BTreeMap, time::Duration};

use rekey_core::{Application, LinkBody, Role, TeamId, TeamSettings};
use rekey_engine::{
    Device, EngineConfig, EngineError, RotateRequestOutcome, RotationConfig, RotationError,
    TeamKeyEngine,
};
use rekey_ledger::{Ledger, MemoryLedger};

use crate::{
    invariants::{DeviceSnapshot, SystemSnapshot},
    model::{ObservableState, Operation, OperationResult, TeamShape, USER_COUNT, user_id},
    sim_env::SimEnv,
};

/// Error setting up or inspecting a simulation.
pub type SimError = Box<dyn std::error::Error + Send + Sync>;

type SimEngine = TeamKeyEngine<MemoryLedger, SimEnv>;

/// Ledger, team and per-user engines of one simulation.
pub struct SimWorld {
    ledger: MemoryLedger,
    env: SimEnv,
    config: EngineConfig,
    team_id: TeamId,
    engines: Vec<SimEngine>,
    first_seen: BTreeMap<u64, [u8; 32]>,
}

impl SimWorld {
    /// Register [`USER_COUNT`] users and create the team.
    pub async fn new(seed: u64, shape: TeamShape) -> Result<Self, SimError> {
        let ledger = MemoryLedger::new();
        let env = SimEnv::with_seed(seed);
        let config = EngineConfig {
            rotation: RotationConfig {
                max_attempts: 10,
                base_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(20),
            },
        };

        let mut engines = Vec::with_capacity(usize::from(USER_COUNT));
        for index in 0..USER_COUNT {
            let device = Device::provision(&env, user_id(index), 1);
            let engine = TeamKeyEngine::new(ledger.clone(), env.clone(), config, device)?;
            engine.register().await?;
            engines.push(engine);
        }

        let members: Vec<_> = (1..USER_COUNT).map(|i| (user_id(i), shape.role_of(i))).collect();
        let settings = TeamSettings { open: shape.open, ..TeamSettings::default() };
        let team_id = engines[0].create_team("sim", settings, &members).await?;

        for engine in &engines[1..] {
            engine.refresh(team_id).await?;
        }

        tracing::debug!(team_id = %team_id, seed, open = shape.open, "simulation world ready");
        Ok(Self { ledger, env, config, team_id, engines, first_seen: BTreeMap::new() })
    }

    /// Shared ledger.
    pub fn ledger(&self) -> &MemoryLedger {
        &self.ledger
    }

    /// Simulated team.
    pub fn team_id(&self) -> TeamId {
        self.team_id
    }

    /// Current engine of a user.
    pub fn engine(&self, index: u8) -> &SimEngine {
        &self.engines[usize::from(index % USER_COUNT)]
    }

    /// Apply a normalized operation to the real system.
    pub async fn apply(&mut self, op: &Operation) -> OperationResult {
        match self.try_apply(op).await {
            Ok(result) => result,
            Err(err) => OperationResult::Failed(err.to_string()),
        }
    }

    async fn try_apply(&mut self, op: &Operation) -> Result<OperationResult, SimError> {
        let team_id = self.team_id;
        let result = match *op {
            Operation::Rotate { actor } => {
                rotation_result(self.engine(actor).rotate(team_id).await)?
            },
            Operation::RequestRotate { actor, lag } => {
                let current = self.ledger.reload(team_id).await?.generation;
                let requested = Operation::requested_generation(current, lag);
                match self.engine(actor).handle_rotate_request(team_id, requested).await {
                    Ok(RotateRequestOutcome::Stale { current }) => OperationResult::Stale(current),
                    Ok(RotateRequestOutcome::Rotated { generation }) => {
                        OperationResult::Rotated(generation)
                    },
                    Err(err) => rotation_result(Err(err))?,
                }
            },
            Operation::Reset { user } => {
                self.reset(user).await?;
                OperationResult::Reset
            },
            Operation::Refresh { actor } => {
                OperationResult::Refreshed(self.engine(actor).refresh(team_id).await?)
            },
        };
        Ok(result)
    }

    async fn reset(&mut self, index: u8) -> Result<(), SimError> {
        let user = user_id(index);
        let current = self.ledger.identity(user).await?.ok_or("simulated user not registered")?;

        let device = Device::provision(&self.env, user, current.eldest_seqno + 1);
        let identity = self.ledger.reset_user(user, device.keys().public_key())?;
        if identity != device.identity() {
            return Err(format!("ledger recorded {identity:?} for {user}").into());
        }

        let engine =
            TeamKeyEngine::new(self.ledger.clone(), self.env.clone(), self.config, device)?;
        self.engines[usize::from(index % USER_COUNT)] = engine;
        Ok(())
    }

    /// Generation and member roles as the ledger records them.
    pub async fn observable(&self) -> Result<ObservableState, SimError> {
        let snapshot = self.ledger.reload(self.team_id).await?;
        let roles = (0..USER_COUNT)
            .filter_map(|index| snapshot.member(user_id(index)).map(|m| (index, m.role)))
            .collect();
        Ok(ObservableState { generation: snapshot.generation, roles })
    }

    /// Read back the ledger and every keyring.
    ///
    /// Keys seen here are remembered, so the next snapshot can check that
    /// no generation's key changed in between.
    pub async fn snapshot(&mut self) -> Result<SystemSnapshot, SimError> {
        let team = self.ledger.reload(self.team_id).await?;
        let rotation_generations = self
            .ledger
            .links(self.team_id, 1, usize::MAX)
            .await?
            .into_iter()
            .filter_map(|link| match link.body {
                LinkBody::RotateKey { generation, .. } => Some(generation),
                _ => None,
            })
            .collect();

        let mut devices = Vec::with_capacity(self.engines.len());
        for (index, engine) in (0..USER_COUNT).zip(&self.engines) {
            let keys = match engine.all_application_keys(self.team_id, Application::Chat) {
                Ok(keys) => keys.iter().map(|k| (k.generation(), *k.key())).collect(),
                // Replaced devices never held this team.
                Err(EngineError::Keyring(_)) => Vec::new(),
                Err(err) => return Err(err.into()),
            };
            devices.push(DeviceSnapshot {
                user: index,
                eldest_seqno: engine.coordinator().device().eldest_seqno(),
                keys,
            });
        }

        let snapshot = SystemSnapshot {
            generation: team.generation,
            rotation_generations,
            owners: team.users_with_role_or_above(Role::Owner).len(),
            devices,
            first_seen: self.first_seen.clone(),
        };
        snapshot.record_first_seen(&mut self.first_seen);
        Ok(snapshot)
    }
}

fn rotation_result(result: Result<u64, RotationError>) -> Result<OperationResult, SimError> {
    match result {
        Ok(generation) => Ok(OperationResult::Rotated(generation)),
        Err(RotationError::NotAMember(_)) => Ok(OperationResult::NotAMember),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelRole;

    fn shape(open: bool) -> TeamShape {
        TeamShape { open, roles: [ModelRole::Writer, ModelRole::Admin, ModelRole::Reader] }
    }

    #[tokio::test(start_paused = true)]
    async fn world_starts_at_generation_one() {
        let mut world = SimWorld::new(1, shape(false)).await.unwrap();
        let observable = world.observable().await.unwrap();
        assert_eq!(observable.generation, 1);
        assert_eq!(observable.roles.len(), 4);

        let snapshot = world.snapshot().await.unwrap();
        assert!(snapshot.rotation_generations.is_empty());
        assert!(snapshot.devices.iter().all(|d| d.keys.len() == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_replaces_the_device() {
        let mut world = SimWorld::new(2, shape(true)).await.unwrap();
        assert_eq!(world.apply(&Operation::Reset { user: 3 }).await, OperationResult::Reset);
        assert_eq!(world.engine(3).coordinator().device().eldest_seqno(), 2);
        assert_eq!(
            world.apply(&Operation::Rotate { actor: 3 }).await,
            OperationResult::NotAMember
        );
        assert_eq!(world.apply(&Operation::Rotate { actor: 0 }).await, OperationResult::Rotated(2));
        assert!(!world.observable().await.unwrap().roles.contains_key(&3));
    }

    #[tokio::test(start_paused = true)]
    async fn same_seed_same_team() {
        let a = SimWorld::new(7, shape(false)).await.unwrap();
        let b = SimWorld::new(7, shape(false)).await.unwrap();
        assert_eq!(a.team_id(), b.team_id());
    }
}
