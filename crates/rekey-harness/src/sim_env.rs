//! Deterministic environment for simulations.

#![allow(clippy::expect_used, reason = "poisoned RNG mutex means a test already panicked")]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rekey_core::Environment;

/// Wall clock reported at virtual time zero.
const EPOCH_SECS: u64 = 1_700_000_000;

/// Simulation environment.
///
/// Randomness comes from a seeded `ChaCha8Rng`, so the same seed yields the
/// same team ids, seeds, nonces and backoff delays. Time is tokio time: on a
/// runtime started paused, backoff sleeps complete instantly and in order.
#[derive(Clone)]
pub struct SimEnv {
    rng: Arc<Mutex<ChaCha8Rng>>,
    start: tokio::time::Instant,
}

impl SimEnv {
    /// Environment seeded with `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
            start: tokio::time::Instant::now(),
        }
    }
}

impl Environment for SimEnv {
    type Instant = tokio::time::Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().expect("SimEnv RNG mutex poisoned").fill_bytes(buffer);
    }

    fn wall_clock_secs(&self) -> u64 {
        EPOCH_SECS + self.start.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_bytes() {
        let a = SimEnv::with_seed(42);
        let b = SimEnv::with_seed(42);
        assert_eq!(a.random_array::<32>(), b.random_array::<32>());
        assert_eq!(a.random_u64(), b.random_u64());
    }

    #[test]
    fn different_seeds_differ() {
        let a: [u8; 32] = SimEnv::with_seed(1).random_array();
        let b: [u8; 32] = SimEnv::with_seed(2).random_array();
        assert_ne!(a, b);
    }

    #[test]
    fn clones_share_the_stream() {
        let env = SimEnv::with_seed(7);
        let clone = env.clone();
        let fresh = SimEnv::with_seed(7);
        let first = fresh.random_u64();
        let second = fresh.random_u64();
        assert_eq!(env.random_u64(), first);
        assert_eq!(clone.random_u64(), second);
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_advances_virtual_time() {
        let env = SimEnv::with_seed(0);
        let before = env.now();
        env.sleep(Duration::from_secs(3600)).await;
        assert!(env.now() - before >= Duration::from_secs(3600));
        assert!(env.wall_clock_secs() >= EPOCH_SECS + 3600);
    }
}
