//! Rotate-request handling.
//!
//! Other actors ask for a rotation by naming the generation they observed
//! when the need arose (a member reset, say). A request naming a generation
//! the team has already moved past is stale: someone else rotated in the
//! meantime and the request is satisfied. Handling is therefore idempotent,
//! and many actors may forward the same request without producing more than
//! one rotation between them.

use rekey_core::{Environment, TeamId};
use rekey_ledger::Ledger;

use crate::{
    cancel::Cancellation,
    coordinator::{Finished, RotationCoordinator, UnlessPast},
    error::RotationError,
};

/// What a rotate request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotateRequestOutcome {
    /// The team was already past the requested generation. Nothing changed.
    Stale {
        /// Generation observed on the ledger
        current: u64,
    },

    /// This request rotated the team.
    Rotated {
        /// Generation created
        generation: u64,
    },
}

impl<L: Ledger, E: Environment> RotationCoordinator<L, E> {
    /// Rotate the team unless it already moved past `requested_generation`.
    ///
    /// The staleness check is repeated on every retry: if another actor wins
    /// the head race and thereby satisfies the request, this call stops
    /// instead of rotating a second time.
    ///
    /// # Errors
    ///
    /// Everything [`RotationCoordinator::rotate`] returns.
    pub async fn handle_rotate_request(
        &self,
        team_id: TeamId,
        requested_generation: u64,
        cancel: &Cancellation,
    ) -> Result<RotateRequestOutcome, RotationError> {
        match self.run(team_id, UnlessPast(requested_generation), cancel).await? {
            Finished::Rotated(generation) => Ok(RotateRequestOutcome::Rotated { generation }),
            Finished::Satisfied(current) => {
                tracing::info!(
                    team_id = %team_id,
                    requested_generation,
                    current,
                    "ignoring stale rotate request"
                );
                Ok(RotateRequestOutcome::Stale { current })
            },
        }
    }
}
