//! Redb-backed durable ledger.
//!
//! Every submission runs validation and the write inside one redb write
//! transaction. Redb serializes write transactions, so the head check and
//! the append cannot interleave with another submission.

use std::{path::Path, sync::Arc};

use redb::{Database, ReadableTable, TableDefinition};
use rekey_core::{Identity, Link, LinkId, TeamId, TeamSnapshot, UserId};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    GenerationBox, Ledger, LedgerError, SubmitOutcome,
    chain::{TeamChain, TeamState, Validation},
};

/// Table: teams
/// Key: team_id as big-endian bytes [16 bytes]
/// Value: CBOR-encoded TeamState
const TEAMS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("teams");

/// Table: links
/// Key: (team_id: u128, seqno: u64) as big-endian bytes [24 bytes]
/// Value: CBOR-encoded Link
const LINKS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("links");

/// Table: identities
/// Key: user_id as big-endian bytes [8 bytes]
/// Value: CBOR-encoded Identity
const IDENTITIES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("identities");

/// Table: devices
/// Key: user_id as big-endian bytes [8 bytes]
/// Value: 32-byte X25519 secret of the local device
const DEVICES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("devices");

/// Durable ledger backed by Redb.
///
/// Clone is cheap (Arc). Also holds the secrets of devices provisioned on
/// this machine, which the `rekey` CLI uses to open its seed boxes.
#[derive(Clone)]
pub struct RedbLedger {
    db: Arc<Database>,
}

impl RedbLedger {
    /// Open or create a ledger database at `path`.
    ///
    /// # Errors
    ///
    /// `Io` if the database cannot be opened or its tables created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let db = Database::create(path.as_ref()).map_err(io)?;

        let txn = db.begin_write().map_err(io)?;
        {
            let _ = txn.open_table(TEAMS).map_err(io)?;
            let _ = txn.open_table(LINKS).map_err(io)?;
            let _ = txn.open_table(IDENTITIES).map_err(io)?;
            let _ = txn.open_table(DEVICES).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        tracing::debug!(path = %path.as_ref().display(), "opened ledger database");
        Ok(Self { db: Arc::new(db) })
    }

    /// Store the secret of a device provisioned on this machine.
    ///
    /// # Errors
    ///
    /// `Io` on database failure.
    pub fn store_device_secret(
        &self,
        user_id: UserId,
        secret: &[u8; 32],
    ) -> Result<(), LedgerError> {
        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = txn.open_table(DEVICES).map_err(io)?;
            table.insert(user_key(user_id).as_slice(), secret.as_slice()).map_err(io)?;
        }
        txn.commit().map_err(io)
    }

    /// Secret of a device provisioned on this machine.
    ///
    /// # Errors
    ///
    /// `Io` on database failure, `Serialization` if the stored secret has the
    /// wrong length.
    pub fn device_secret(&self, user_id: UserId) -> Result<Option<[u8; 32]>, LedgerError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(DEVICES).map_err(io)?;
        let Some(value) = table.get(user_key(user_id).as_slice()).map_err(io)? else {
            return Ok(None);
        };
        let secret: [u8; 32] = value
            .value()
            .try_into()
            .map_err(|_| LedgerError::Serialization("device secret must be 32 bytes".into()))?;
        Ok(Some(secret))
    }

    /// All team ids on this ledger.
    ///
    /// # Errors
    ///
    /// `Io` on database failure.
    pub fn list_teams(&self) -> Result<Vec<TeamId>, LedgerError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(TEAMS).map_err(io)?;

        let mut teams = Vec::new();
        for result in table.iter().map_err(io)? {
            let (key, _) = result.map_err(io)?;
            let bytes: [u8; 16] = key
                .value()
                .try_into()
                .map_err(|_| LedgerError::Serialization("team key must be 16 bytes".into()))?;
            teams.push(TeamId(u128::from_be_bytes(bytes)));
        }
        Ok(teams)
    }

    fn load_state(&self, team_id: TeamId) -> Result<TeamState, LedgerError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(TEAMS).map_err(io)?;
        let value = table
            .get(team_key(team_id).as_slice())
            .map_err(io)?
            .ok_or(LedgerError::TeamNotFound(team_id))?;
        decode(value.value())
    }

    fn load_identity(&self, user_id: UserId) -> Result<Option<Identity>, LedgerError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(IDENTITIES).map_err(io)?;
        table.get(user_key(user_id).as_slice()).map_err(io)?.map(|v| decode(v.value())).transpose()
    }

    fn write_link(
        txn: &redb::WriteTransaction,
        state: &TeamState,
        link: &Link,
    ) -> Result<(), LedgerError> {
        let mut teams = txn.open_table(TEAMS).map_err(io)?;
        teams.insert(team_key(state.team_id).as_slice(), encode(state)?.as_slice()).map_err(io)?;

        let mut links = txn.open_table(LINKS).map_err(io)?;
        let bytes = link.encode()?;
        links.insert(link_key(link.team_id, link.seqno).as_slice(), bytes.as_slice()).map_err(io)?;
        Ok(())
    }
}

impl Ledger for RedbLedger {
    async fn register_user(&self, user_id: UserId, identity: Identity) -> Result<(), LedgerError> {
        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = txn.open_table(IDENTITIES).map_err(io)?;
            table.insert(user_key(user_id).as_slice(), encode(&identity)?.as_slice()).map_err(io)?;
        }
        txn.commit().map_err(io)
    }

    async fn identity(&self, user_id: UserId) -> Result<Option<Identity>, LedgerError> {
        self.load_identity(user_id)
    }

    async fn create_team(&self, genesis: Link) -> Result<LinkId, LedgerError> {
        let state = TeamChain::genesis(&genesis)?;

        let txn = self.db.begin_write().map_err(io)?;
        {
            let teams = txn.open_table(TEAMS).map_err(io)?;
            if teams.get(team_key(genesis.team_id).as_slice()).map_err(io)?.is_some() {
                return Err(LedgerError::TeamExists(genesis.team_id));
            }
        }
        Self::write_link(&txn, &state, &genesis)?;
        txn.commit().map_err(io)?;

        tracing::info!(team_id = %genesis.team_id, head = %state.head, "team created");
        Ok(state.head)
    }

    async fn reload(&self, team_id: TeamId) -> Result<TeamSnapshot, LedgerError> {
        let state = self.load_state(team_id)?;

        let mut identities = Vec::with_capacity(state.members.len());
        for user_id in state.members.keys() {
            if let Some(identity) = self.load_identity(*user_id)? {
                identities.push((*user_id, identity));
            }
        }
        Ok(state.snapshot(|user| {
            identities.iter().find(|(id, _)| *id == user).map(|(_, identity)| *identity)
        }))
    }

    async fn submit_link(&self, link: Link) -> Result<SubmitOutcome, LedgerError> {
        let txn = self.db.begin_write().map_err(io)?;

        let state: TeamState = {
            let teams = txn.open_table(TEAMS).map_err(io)?;
            let value = teams
                .get(team_key(link.team_id).as_slice())
                .map_err(io)?
                .ok_or(LedgerError::TeamNotFound(link.team_id))?;
            decode(value.value())?
        };

        match TeamChain::apply(&state, &link)? {
            Validation::Reject { head } => {
                txn.abort().map_err(io)?;
                Ok(SubmitOutcome::Rejected { head })
            },
            Validation::Accept { state, head } => {
                Self::write_link(&txn, &state, &link)?;
                txn.commit().map_err(io)?;
                Ok(SubmitOutcome::Accepted { head, seqno: state.seqno })
            },
        }
    }

    async fn seed_boxes(
        &self,
        team_id: TeamId,
        recipient: UserId,
        after_generation: u64,
    ) -> Result<Vec<GenerationBox>, LedgerError> {
        Ok(self.load_state(team_id)?.boxes_for(recipient, after_generation))
    }

    async fn links(
        &self,
        team_id: TeamId,
        from_seqno: u64,
        limit: usize,
    ) -> Result<Vec<Link>, LedgerError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(LINKS).map_err(io)?;

        let start_key = link_key(team_id, from_seqno);
        let end_key = link_key(team_id, u64::MAX);
        let results = table.range(start_key.as_slice()..=end_key.as_slice()).map_err(io)?;

        let mut links = Vec::with_capacity(limit.min(64));
        for result in results {
            if links.len() >= limit {
                break;
            }
            let (_, value) = result.map_err(io)?;
            links.push(Link::decode(value.value())?);
        }

        if links.is_empty() && from_seqno <= 1 {
            // Distinguish an empty range from a team that does not exist.
            self.load_state(team_id)?;
        }
        Ok(links)
    }
}

fn io(err: impl std::fmt::Display) -> LedgerError {
    LedgerError::Io(err.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, LedgerError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes)
        .map_err(|e| LedgerError::Serialization(e.to_string()))?;
    Ok(bytes)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, LedgerError> {
    ciborium::from_reader(bytes).map_err(|e| LedgerError::Serialization(e.to_string()))
}

fn team_key(team_id: TeamId) -> [u8; 16] {
    team_id.0.to_be_bytes()
}

fn user_key(user_id: UserId) -> [u8; 8] {
    user_id.0.to_be_bytes()
}

fn link_key(team_id: TeamId, seqno: u64) -> [u8; 24] {
    let mut key = [0u8; 24];
    key[..16].copy_from_slice(&team_id.0.to_be_bytes());
    key[16..].copy_from_slice(&seqno.to_be_bytes());
    key
}
