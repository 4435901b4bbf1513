//! Invariant checking for simulations.
//!
//! Invariants are properties that must hold after every operation, whatever
//! sequence of rotations, resets and conflicts led there. The simulated world
//! extracts a [`SystemSnapshot`] from the ledger and every device's keyring,
//! then the registered [`Invariant`] checks run against it.
//!
//! # Usage
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! let snapshot = world.snapshot().await?;
//! registry.assert_all(&snapshot, "after step 3");
//! ```

mod checks;
mod snapshot;

pub use checks::{GenerationDensity, HistoryImmutability, KeyAgreement, OwnerRetained};
pub use snapshot::{DeviceSnapshot, SystemSnapshot};

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property checked against system state.
pub trait Invariant: Send + Sync {
    /// Invariant name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant against the current state.
    fn check(&self, state: &SystemSnapshot) -> InvariantResult;
}

/// Ordered set of checks run after every simulation step.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Registry with every standard rotation invariant.
    ///
    /// - [`OwnerRetained`]: the team never loses its last owner
    /// - [`GenerationDensity`]: generations on the chain and in keyrings are gap-free
    /// - [`KeyAgreement`]: devices holding a generation hold the same key
    /// - [`HistoryImmutability`]: a generation's key never changes once seen
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(OwnerRetained);
        registry.add(GenerationDensity);
        registry.add(KeyAgreement);
        registry.add(HistoryImmutability);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Run every check against `state`, collecting all violations rather
    /// than stopping at the first.
    pub fn check_all(&self, state: &SystemSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<Violation> =
            self.invariants.iter().filter_map(|check| check.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Names of the registered checks, in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.invariants.iter().map(|check| check.name()).collect()
    }

    /// Check all invariants, panicking with every violation found.
    ///
    /// # Panics
    ///
    /// If any invariant does not hold.
    #[allow(clippy::panic, reason = "test assertion helper")]
    pub fn assert_all(&self, state: &SystemSnapshot, context: &str) {
        if let Err(violations) = self.check_all(state) {
            let lines: Vec<String> = violations.iter().map(ToString::to_string).collect();
            panic!(
                "{} invariant(s) violated {context} at generation {}:\n  {}",
                lines.len(),
                state.generation,
                lines.join("\n  ")
            );
        }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// True if no check is registered.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}
