//! Team key engine facade.

use std::collections::BTreeMap;

use rekey_core::{
    Application, Environment, FIRST_GENERATION, KeyGenerationRecord, Keyring, Link, LinkBody,
    LinkId, Member, Role, TeamId, TeamSettings, UserId,
};
use rekey_crypto::{ApplicationKey, TeamSeed, derive_application_key};
use rekey_ledger::{Ledger, LedgerError};

use crate::{
    cancel::Cancellation,
    config::EngineConfig,
    coordinator::{RotationCoordinator, seal_to},
    device::Device,
    error::{ConfigError, EngineError, RotationError},
    handler::RotateRequestOutcome,
};

/// Everything one device needs to create teams, rotate their keys and
/// derive application keys.
///
/// Clones share the keyring, so a clone can be moved into a spawned task
/// and race other clones (or other devices) on the same team.
#[derive(Clone)]
pub struct TeamKeyEngine<L: Ledger, E: Environment> {
    coordinator: RotationCoordinator<L, E>,
}

impl<L: Ledger, E: Environment> TeamKeyEngine<L, E> {
    /// Create an engine for `device` with an empty keyring.
    ///
    /// # Errors
    ///
    /// `ConfigError` if `config` does not validate.
    pub fn new(
        ledger: L,
        env: E,
        config: EngineConfig,
        device: Device,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let coordinator =
            RotationCoordinator::new(ledger, Keyring::new(), env, config.rotation, device);
        Ok(Self { coordinator })
    }

    /// Underlying coordinator.
    pub fn coordinator(&self) -> &RotationCoordinator<L, E> {
        &self.coordinator
    }

    /// User this engine acts as.
    pub fn user_id(&self) -> UserId {
        self.coordinator.device().user_id()
    }

    /// Publish this device's identity to the ledger.
    pub async fn register(&self) -> Result<(), EngineError> {
        let device = self.coordinator.device();
        self.coordinator.ledger().register_user(device.user_id(), device.identity()).await?;
        Ok(())
    }

    /// Create a team owned by this device's user.
    ///
    /// `members` lists everyone else with their initial role; each must have
    /// a registered identity. Generation 1 is sealed to every member.
    ///
    /// # Errors
    ///
    /// `Ledger(UnknownUser)` for an unregistered member, `Ledger(InvalidLink)`
    /// for a role of `None`.
    pub async fn create_team(
        &self,
        name: &str,
        settings: TeamSettings,
        members: &[(UserId, Role)],
    ) -> Result<TeamId, EngineError> {
        let ledger = self.coordinator.ledger();
        let env = self.coordinator.env();
        let device = self.coordinator.device();

        let mut rows = BTreeMap::new();
        for &(user_id, role) in members {
            let identity =
                ledger.identity(user_id).await?.ok_or(LedgerError::UnknownUser(user_id))?;
            rows.insert(user_id, Member::new(user_id, role, identity));
        }
        let me = device.user_id();
        rows.insert(me, Member::new(me, Role::Owner, device.identity()));
        let members: Vec<Member> = rows.into_values().collect();

        let team_id = TeamId(env.random_u128());
        let seed = TeamSeed::from_bytes(env.random_array());
        let boxes = seal_to(env, team_id, FIRST_GENERATION, &seed, &members)?;

        let genesis = Link {
            team_id,
            seqno: 1,
            prev: LinkId::ZERO,
            author: device.user_id(),
            ctime_secs: env.wall_clock_secs(),
            body: LinkBody::Genesis { name: name.to_string(), settings, members, boxes },
        };
        let created_at_secs = genesis.ctime_secs;
        let head = ledger.create_team(genesis).await?;

        self.coordinator.keyring().ingest(
            team_id,
            KeyGenerationRecord { generation: FIRST_GENERATION, seed, created_at_secs },
        )?;

        tracing::info!(team_id = %team_id, name, head = %head, "created team");
        Ok(team_id)
    }

    /// Advance the team's generation by one.
    pub async fn rotate(&self, team_id: TeamId) -> Result<u64, RotationError> {
        self.rotate_with(team_id, &Cancellation::new()).await
    }

    /// [`Self::rotate`] with a cancellation flag.
    pub async fn rotate_with(
        &self,
        team_id: TeamId,
        cancel: &Cancellation,
    ) -> Result<u64, RotationError> {
        self.coordinator.rotate(team_id, cancel).await
    }

    /// Rotate unless the team already moved past `requested_generation`.
    pub async fn handle_rotate_request(
        &self,
        team_id: TeamId,
        requested_generation: u64,
    ) -> Result<RotateRequestOutcome, RotationError> {
        self.coordinator
            .handle_rotate_request(team_id, requested_generation, &Cancellation::new())
            .await
    }

    /// Add, re-role, re-key or remove members in one link.
    ///
    /// Returns the seqno of the accepted link.
    pub async fn change_membership(
        &self,
        team_id: TeamId,
        changes: &[(UserId, Role)],
    ) -> Result<u64, RotationError> {
        self.coordinator.change_membership(team_id, changes, &Cancellation::new()).await
    }

    /// Pull any generations this device can open but does not hold yet.
    ///
    /// Returns the newest generation held afterwards.
    pub async fn refresh(&self, team_id: TeamId) -> Result<u64, EngineError> {
        Ok(self.coordinator.sync(team_id).await?)
    }

    /// Key for `application` at the newest generation held.
    pub fn latest_application_key(
        &self,
        team_id: TeamId,
        application: Application,
    ) -> Result<ApplicationKey, EngineError> {
        let (generation, seed) = self.coordinator.keyring().latest(team_id)?;
        Ok(derive_application_key(&seed, generation, application.id()))
    }

    /// Key for `application` at `generation`.
    ///
    /// # Errors
    ///
    /// `Keyring(NotFound)` if `generation` is outside `1..=current`.
    pub fn application_key_at_generation(
        &self,
        team_id: TeamId,
        application: Application,
        generation: u64,
    ) -> Result<ApplicationKey, EngineError> {
        let seed = self.coordinator.keyring().record_at(team_id, generation)?;
        Ok(derive_application_key(&seed, generation, application.id()))
    }

    /// One key for `application` per held generation, oldest first.
    pub fn all_application_keys(
        &self,
        team_id: TeamId,
        application: Application,
    ) -> Result<Vec<ApplicationKey>, EngineError> {
        let records = self.coordinator.keyring().records(team_id)?;
        Ok(records
            .iter()
            .map(|r| derive_application_key(&r.seed, r.generation, application.id()))
            .collect())
    }
}
