//! Rotation coordinator.
//!
//! A rotation is a loop of independent attempts. Each attempt reloads the
//! team, draws a fresh seed, sweeps reset members, seals the seed to every
//! live member and submits one link built on the reloaded head. Nothing is
//! written anywhere before the ledger accepts that link, so an attempt that
//! loses the race for the head is simply dropped and the next attempt starts
//! over from a new reload.
//!
//! ```text
//!   reload ──► sync keyring ──► seed ──► sweep ──► seal ──► submit
//!     ▲                                                       │
//!     │                 Rejected (head moved)                 │
//!     └──────────── backoff (full jitter) ◄───────────────────┤
//!                                                             │ Accepted
//!                                                  commit seed to keyring
//! ```

use std::{convert::Infallible, sync::Arc};

use rekey_core::{
    Environment, KeyGenerationRecord, Keyring, Link, LinkBody, LinkId, Member, Role, SeedBox,
    TeamId, TeamSnapshot, UserId, seal_context, sweep,
};
use rekey_crypto::{CryptoError, TeamSeed, open_seed, seal_seed};
use rekey_ledger::{Ledger, SubmitOutcome};

use crate::{
    cancel::Cancellation, config::RotationConfig, device::Device, error::RotationError,
};

/// Per-attempt check deciding whether a rotation is still wanted.
pub(crate) trait Gate: Copy + Send + Sync {
    /// Reported when the team no longer needs this rotation.
    type Satisfied: Send;

    /// `Some` if a team at `generation` already satisfies the caller.
    fn satisfied(self, generation: u64) -> Option<Self::Satisfied>;
}

/// Explicit rotation. Never satisfied, so the run can only end in a rotation
/// or an error.
#[derive(Clone, Copy)]
pub(crate) struct Always;

impl Gate for Always {
    type Satisfied = Infallible;

    fn satisfied(self, _generation: u64) -> Option<Infallible> {
        None
    }
}

/// Rotate request raised at a generation; satisfied once the team is past it.
#[derive(Clone, Copy)]
pub(crate) struct UnlessPast(pub u64);

impl Gate for UnlessPast {
    type Satisfied = u64;

    fn satisfied(self, generation: u64) -> Option<u64> {
        (self.0 < generation).then_some(generation)
    }
}

/// How a retry loop ended without error.
pub(crate) enum Finished<S> {
    /// This run created `generation`.
    Rotated(u64),
    /// The gate was satisfied by someone else.
    Satisfied(S),
}

/// Result of one attempt.
enum Attempt<S> {
    /// Our link was appended.
    Accepted { generation: u64, removed: usize },
    /// Someone else moved the head first.
    Conflict { head: LinkId },
    /// The gate was already satisfied.
    Satisfied(S),
}

/// Drives rotations for one device against one ledger.
///
/// Cheap to clone; clones share the keyring and the device.
#[derive(Clone)]
pub struct RotationCoordinator<L: Ledger, E: Environment> {
    ledger: L,
    keyring: Keyring,
    env: E,
    config: RotationConfig,
    device: Arc<Device>,
}

impl<L: Ledger, E: Environment> RotationCoordinator<L, E> {
    /// Create a coordinator.
    pub fn new(
        ledger: L,
        keyring: Keyring,
        env: E,
        config: RotationConfig,
        device: Device,
    ) -> Self {
        Self { ledger, keyring, env, config, device: Arc::new(device) }
    }

    /// Ledger this coordinator submits to.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Local key store.
    pub fn keyring(&self) -> &Keyring {
        &self.keyring
    }

    /// Environment providing time and randomness.
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Device this coordinator acts as.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Retry policy.
    pub fn config(&self) -> &RotationConfig {
        &self.config
    }

    /// Advance the team's generation by one.
    ///
    /// Returns the generation this call created.
    ///
    /// # Errors
    ///
    /// - `ConflictExhausted` if every attempt lost the head race
    /// - `Cancelled` if `cancel` fired between attempts
    /// - `Indeterminate` if the submission was lost in transit
    /// - `NotAMember` if this device cannot receive the new seed
    /// - `MissingGenerations` if this device cannot open every generation
    ///   published so far
    pub async fn rotate(
        &self,
        team_id: TeamId,
        cancel: &Cancellation,
    ) -> Result<u64, RotationError> {
        match self.run(team_id, Always, cancel).await? {
            Finished::Rotated(generation) => Ok(generation),
            Finished::Satisfied(never) => match never {},
        }
    }

    /// Retry loop shared by explicit rotations and rotate requests.
    ///
    /// `gate` is consulted on every attempt, after the reload, and stops the
    /// loop without rotating once it is satisfied.
    pub(crate) async fn run<G: Gate>(
        &self,
        team_id: TeamId,
        gate: G,
        cancel: &Cancellation,
    ) -> Result<Finished<G::Satisfied>, RotationError> {
        let started = self.env.now();
        let max_attempts = self.config.max_attempts;

        for attempt in 1..=max_attempts {
            self.pause(attempt, cancel).await?;

            match self.attempt(team_id, gate).await? {
                Attempt::Accepted { generation, removed } => {
                    tracing::info!(
                        team_id = %team_id,
                        generation,
                        attempt,
                        removed,
                        elapsed_ms = (self.env.now() - started).as_millis() as u64,
                        "rotated team key"
                    );
                    return Ok(Finished::Rotated(generation));
                },
                Attempt::Satisfied(satisfied) => return Ok(Finished::Satisfied(satisfied)),
                Attempt::Conflict { head } => {
                    tracing::debug!(
                        team_id = %team_id,
                        attempt,
                        head = %head,
                        "head moved during rotation, retrying"
                    );
                },
            }
        }

        tracing::warn!(team_id = %team_id, attempts = max_attempts, "rotation retries exhausted");
        Err(RotationError::ConflictExhausted { attempts: max_attempts })
    }

    /// Cancellation check and jittered backoff before attempt `attempt`.
    ///
    /// The first attempt starts immediately.
    pub(crate) async fn pause(
        &self,
        attempt: u32,
        cancel: &Cancellation,
    ) -> Result<(), RotationError> {
        if cancel.is_cancelled() {
            return Err(RotationError::Cancelled { attempts: attempt - 1 });
        }
        if attempt > 1 {
            let backoff = self.config.backoff(attempt, self.env.random_u64());
            tokio::select! {
                () = self.env.sleep(backoff) => {},
                () = cancel.cancelled() => {
                    return Err(RotationError::Cancelled { attempts: attempt - 1 });
                },
            }
        }
        Ok(())
    }

    async fn attempt<G: Gate>(
        &self,
        team_id: TeamId,
        gate: G,
    ) -> Result<Attempt<G::Satisfied>, RotationError> {
        let snapshot = self.ledger.reload(team_id).await?;

        if let Some(satisfied) = gate.satisfied(snapshot.generation) {
            return Ok(Attempt::Satisfied(satisfied));
        }

        let me = self.device.user_id();
        let live = snapshot
            .member(me)
            .is_some_and(|m| m.role.is_or_above(Role::Reader) && !snapshot.is_reset(m));
        if !live {
            return Err(RotationError::NotAMember(me));
        }

        // Committing generation n + 1 needs 1..=n in the keyring.
        let held = self.sync(team_id).await?;
        if held < snapshot.generation {
            return Err(RotationError::MissingGenerations {
                user: me,
                held,
                current: snapshot.generation,
            });
        }

        let generation = snapshot.generation + 1;
        let seed = TeamSeed::from_bytes(self.env.random_array());
        let swept = sweep(&snapshot.members, |m| snapshot.is_reset(m), snapshot.settings.open);
        let recipients = swept.remaining().filter(|m| !snapshot.is_reset(m));
        let boxes = seal_to(&self.env, team_id, generation, &seed, recipients)?;

        let removed = swept.removed.len();
        let ctime_secs = self.env.wall_clock_secs();
        let link = rotation_link(&snapshot, me, ctime_secs, generation, boxes, swept.removed);
        let created_at_secs = link.ctime_secs;

        match self.ledger.submit_link(link).await {
            Ok(SubmitOutcome::Accepted { .. }) => {
                self.keyring.ingest(
                    team_id,
                    KeyGenerationRecord { generation, seed, created_at_secs },
                )?;
                Ok(Attempt::Accepted { generation, removed })
            },
            Ok(SubmitOutcome::Rejected { head }) => Ok(Attempt::Conflict { head }),
            Err(source) if source.is_transient() => {
                tracing::warn!(
                    team_id = %team_id,
                    generation,
                    error = %source,
                    "rotation submission lost in transit"
                );
                Err(RotationError::Indeterminate { generation, source })
            },
            Err(err) => Err(err.into()),
        }
    }

    /// Open this device's boxes for every generation the keyring lacks.
    ///
    /// Stops at the first generation with no box for this device's current
    /// key, which leaves the keyring dense. Returns the keyring's generation
    /// afterwards.
    ///
    /// # Errors
    ///
    /// `Crypto` if a box addressed to this device does not open, `Keyring`
    /// if the ledger contradicts a held seed.
    pub async fn sync(&self, team_id: TeamId) -> Result<u64, RotationError> {
        let held = self.keyring.current_generation(team_id).unwrap_or(0);
        let boxes = self.ledger.seed_boxes(team_id, self.device.user_id(), held).await?;

        let mut current = held;
        for entry in boxes {
            if entry.generation != current + 1
                || entry.seed_box.eldest_seqno != self.device.eldest_seqno()
            {
                tracing::debug!(
                    team_id = %team_id,
                    generation = entry.generation,
                    held = current,
                    "no usable box for this device, stopping sync"
                );
                break;
            }

            let context = seal_context(team_id, entry.generation);
            let seed = open_seed(self.device.keys(), &entry.seed_box.sealed, &context)?;
            self.keyring.ingest(
                team_id,
                KeyGenerationRecord {
                    generation: entry.generation,
                    seed,
                    created_at_secs: entry.ctime_secs,
                },
            )?;
            current = entry.generation;
        }

        if current > held {
            tracing::debug!(team_id = %team_id, from = held, to = current, "synced keyring");
        }
        Ok(current)
    }
}

/// Seal `seed` to each member's recorded box key.
pub(crate) fn seal_to<'a, E: Environment>(
    env: &E,
    team_id: TeamId,
    generation: u64,
    seed: &TeamSeed,
    members: impl IntoIterator<Item = &'a Member>,
) -> Result<Vec<SeedBox>, CryptoError> {
    let context = seal_context(team_id, generation);
    members
        .into_iter()
        .map(|member| {
            let sealed =
                seal_seed(&member.box_key, seed, &context, env.random_array(), env.random_array())?;
            Ok(SeedBox { recipient: member.user_id, eldest_seqno: member.eldest_seqno, sealed })
        })
        .collect()
}

fn rotation_link(
    snapshot: &TeamSnapshot,
    author: UserId,
    ctime_secs: u64,
    generation: u64,
    boxes: Vec<SeedBox>,
    removed: Vec<UserId>,
) -> Link {
    Link {
        team_id: snapshot.team_id,
        seqno: snapshot.seqno + 1,
        prev: snapshot.head,
        author,
        ctime_secs,
        body: LinkBody::RotateKey { generation, boxes, removed },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_gate_opens_only_past_the_requested_generation() {
        assert_eq!(UnlessPast(2).satisfied(1), None);
        assert_eq!(UnlessPast(2).satisfied(2), None);
        assert_eq!(UnlessPast(2).satisfied(3), Some(3));
    }

    #[test]
    fn explicit_rotation_is_never_satisfied() {
        for generation in [0, 1, u64::MAX] {
            assert!(Always.satisfied(generation).is_none());
        }
    }
}
