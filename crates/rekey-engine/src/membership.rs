//! Membership changes.
//!
//! A device's keyring only accepts generations densely from the first, so a
//! user joining a team that already rotated needs every generation, not just
//! the next one. The author of a membership change seals each seed it holds
//! to the joining user's box key and ships those boxes in the same link. The
//! same applies to a member re-added after a reset: their new device cannot
//! open anything sealed to the old key.

use rekey_core::{
    Environment, HistoryBox, Link, LinkBody, MembershipChange, Role, SeedBox, TeamId, TeamSnapshot,
    UserId, seal_context,
};
use rekey_crypto::seal_seed;
use rekey_ledger::{Ledger, LedgerError, SubmitOutcome};

use crate::{cancel::Cancellation, coordinator::RotationCoordinator, error::RotationError};

impl<L: Ledger, E: Environment> RotationCoordinator<L, E> {
    /// Apply `changes` as one link. A role of `Role::None` removes the user.
    ///
    /// Users who are not members yet, and members whose row predates a
    /// reset, are keyed to their current identity and receive boxes for
    /// every generation so far. Head races are retried like rotations.
    ///
    /// Returns the seqno of the accepted link.
    ///
    /// # Errors
    ///
    /// - `MissingGenerations` if a user must be keyed but this device does
    ///   not hold every generation
    /// - `Ledger(UnknownUser)` for a user with no registered identity
    /// - `Ledger(Unauthorized)` unless this device's user is an admin
    /// - `ConflictExhausted` / `Cancelled` as for rotations
    pub async fn change_membership(
        &self,
        team_id: TeamId,
        changes: &[(UserId, Role)],
        cancel: &Cancellation,
    ) -> Result<u64, RotationError> {
        let max_attempts = self.config().max_attempts;

        for attempt in 1..=max_attempts {
            self.pause(attempt, cancel).await?;

            let snapshot = self.ledger().reload(team_id).await?;
            let link = self.membership_link(&snapshot, changes).await?;
            let seqno = link.seqno;

            match self.ledger().submit_link(link).await? {
                SubmitOutcome::Accepted { .. } => {
                    tracing::info!(
                        team_id = %team_id,
                        seqno,
                        changes = changes.len(),
                        attempt,
                        "changed team membership"
                    );
                    return Ok(seqno);
                },
                SubmitOutcome::Rejected { head } => {
                    tracing::debug!(
                        team_id = %team_id,
                        attempt,
                        head = %head,
                        "head moved during membership change, retrying"
                    );
                },
            }
        }

        tracing::warn!(team_id = %team_id, attempts = max_attempts, "membership retries exhausted");
        Err(RotationError::ConflictExhausted { attempts: max_attempts })
    }

    async fn membership_link(
        &self,
        snapshot: &TeamSnapshot,
        changes: &[(UserId, Role)],
    ) -> Result<Link, RotationError> {
        let team_id = snapshot.team_id;
        let me = self.device().user_id();
        let env = self.env();
        let held = self.sync(team_id).await?;

        let mut edits = Vec::with_capacity(changes.len());
        let mut boxes = Vec::new();
        for &(user_id, role) in changes {
            let rekey = role.is_member()
                && snapshot.member(user_id).is_none_or(|m| snapshot.is_reset(m));
            if !rekey {
                edits.push(MembershipChange { user_id, role, identity: None });
                continue;
            }

            if held < snapshot.generation {
                return Err(RotationError::MissingGenerations {
                    user: me,
                    held,
                    current: snapshot.generation,
                });
            }
            let identity =
                self.ledger().identity(user_id).await?.ok_or(LedgerError::UnknownUser(user_id))?;

            let records = self.keyring().records(team_id)?;
            for record in records.iter().take_while(|r| r.generation <= snapshot.generation) {
                let context = seal_context(team_id, record.generation);
                let sealed = seal_seed(
                    &identity.box_key,
                    &record.seed,
                    &context,
                    env.random_array(),
                    env.random_array(),
                )?;
                boxes.push(HistoryBox {
                    generation: record.generation,
                    seed_box: SeedBox {
                        recipient: user_id,
                        eldest_seqno: identity.eldest_seqno,
                        sealed,
                    },
                });
            }
            edits.push(MembershipChange { user_id, role, identity: Some(identity) });
        }

        Ok(Link {
            team_id,
            seqno: snapshot.seqno + 1,
            prev: snapshot.head,
            author: me,
            ctime_secs: env.wall_clock_secs(),
            body: LinkBody::ChangeMembership { changes: edits, boxes },
        })
    }
}
