//! Time and randomness for the rotation engine.
//!
//! The engine never reads the system clock or the OS RNG directly. Seeds,
//! ephemeral box keys, nonces, team ids and backoff jitter all come from an
//! [`Environment`], so a simulation with a seeded RNG and a paused clock
//! replays a whole rotation race bit for bit.

use std::time::Duration;

/// Source of time, sleeping and entropy.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `now()` is monotonic
/// - `random_bytes()` is backed by a CSPRNG in production; seeds and box keys
///   are drawn from it
/// - a seeded implementation yields the same byte stream for the same seed
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant. `std::time::Instant` in production,
    /// `tokio::time::Instant` under simulation.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current monotonic time, for measuring how long a rotation took.
    fn now(&self) -> Self::Instant;

    /// Wait before the next rotation attempt.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fill `buffer` with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Unix seconds, stamped on links and key generation records.
    fn wall_clock_secs(&self) -> u64;

    /// Random `u64` for backoff jitter.
    fn random_u64(&self) -> u64 {
        u64::from_be_bytes(self.random_array())
    }

    /// Random `u128` for team ids.
    fn random_u128(&self) -> u128 {
        u128::from_be_bytes(self.random_array())
    }

    /// Random bytes of a fixed size: seeds, ephemeral keys, nonces.
    fn random_array<const N: usize>(&self) -> [u8; N] {
        let mut bytes = [0u8; N];
        self.random_bytes(&mut bytes);
        bytes
    }
}
