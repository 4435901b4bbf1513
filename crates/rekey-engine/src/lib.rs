//! Team key rotation engine.
//!
//! Rotates a team's shared secret under concurrent rotators without locks.
//! Every rotation reloads the team from the ledger, builds a new generation
//! in memory and submits it as one link conditioned on the reloaded head.
//! The ledger's compare-and-swap picks exactly one winner per head; losers
//! retry from a fresh reload with jittered backoff until their attempt
//! budget runs out.
//!
//! # Components
//!
//! - [`RotationCoordinator`]: the retry loop and the attempt pipeline
//! - [`RotateRequestOutcome`] / `handle_rotate_request`: idempotent gate for
//!   rotations requested by other actors
//! - `change_membership`: adds or re-keys members with every generation
//!   sealed to them, so their keyring starts dense from the first
//! - [`TeamKeyEngine`]: facade adding team creation and application keys
//! - [`SystemEnv`]: production time and randomness

#![warn(missing_docs)]

mod cancel;
mod config;
mod coordinator;
mod device;
mod engine;
mod error;
mod handler;
mod membership;
mod system_env;

pub use cancel::Cancellation;
pub use config::{EngineConfig, RotationConfig};
pub use coordinator::RotationCoordinator;
pub use device::Device;
pub use engine::TeamKeyEngine;
pub use error::{ConfigError, EngineError, RotationError};
pub use handler::RotateRequestOutcome;
pub use system_env::SystemEnv;
