//! Reference model for model-based testing.
//!
//! [`ModelTeam`] tracks only what a rotation is supposed to change: the
//! generation counter, member roles, and who has reset their account. The
//! real engine runs the same [`Operation`] sequence against a ledger and the
//! two are compared after every step.

mod operation;
mod team;

pub use operation::{
    ModelRole, Operation, OperationResult, TeamShape, USER_COUNT, UserIndex, user_id,
};
pub use team::{ModelMember, ModelTeam, ObservableState};
