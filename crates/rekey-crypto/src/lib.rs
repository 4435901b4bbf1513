//! Rekey Cryptographic Primitives
//!
//! Building blocks for team key rotation. Pure functions with deterministic
//! outputs: callers provide random bytes, so the rotation engine can run under
//! a seeded simulation environment.
//!
//! # Key Lifecycle
//!
//! Every key generation of a team owns one 32-byte seed. The seed is sealed to
//! each live member's X25519 box key when the generation is created, and all
//! per-application keys for that generation are derived from it.
//!
//! ```text
//! Random bytes ──► TeamSeed (generation N)
//!                     │
//!          ┌──────────┴──────────┐
//!          ▼                     ▼
//!   seal_seed(member pk)   HKDF(seed, application)
//!          │                     │
//!          ▼                     ▼
//!     SealedSeed            ApplicationKey
//!   (inside chain link)   (chat, kbfs, ...)
//! ```
//!
//! # Security
//!
//! Secret lifetime:
//! - `TeamSeed`, `ApplicationKey` and `BoxKeyPair` zeroize on drop
//! - `Debug` output never contains key material
//!
//! Sealing:
//! - Fresh ephemeral X25519 key per box, shared secret expanded with HKDF
//! - XChaCha20-Poly1305 with caller-supplied associated data binds a box to
//!   its (team, generation) so boxes cannot be replayed across generations
//! - Low-order recipient keys are rejected
//!
//! History:
//! - Seeds of old generations are retained by the caller, so application keys
//!   for historical content stay derivable after rotation

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod derivation;
mod error;
mod sealing;
mod seed;

pub use derivation::{APPLICATION_KEY_SIZE, ApplicationKey, derive_application_key};
pub use error::CryptoError;
pub use sealing::{BoxKeyPair, NONCE_SIZE, SealedSeed, open_seed, seal_seed};
pub use seed::{SEED_SIZE, TeamSeed};
