//! Deterministic simulation harness for the rekey engine.
//!
//! [`SimEnv`] replaces system time and entropy with tokio virtual time and a
//! seeded RNG, so a simulation replays exactly from its seed.
//!
//! # Model-Based Testing
//!
//! The `model` module is a reference implementation of rotation semantics.
//! Operations are applied to both the model and a [`SimWorld`], and their
//! results and observable states are compared.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks properties that must hold after any
//! sequence of operations. Use [`InvariantRegistry::standard()`] for the
//! rotation invariants.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod model;
pub mod sim_env;
pub mod sim_world;

pub use invariants::{
    DeviceSnapshot, GenerationDensity, HistoryImmutability, Invariant, InvariantRegistry,
    InvariantResult, KeyAgreement, OwnerRetained, SystemSnapshot, Violation,
};
pub use model::{
    ModelMember, ModelRole, ModelTeam, ObservableState, Operation, OperationResult, TeamShape,
    USER_COUNT, UserIndex, user_id,
};
pub use sim_env::SimEnv;
pub use sim_world::{SimError, SimWorld};
