//! Production environment backed by the OS clock and RNG.

use std::time::Duration;

use rekey_core::Environment;

/// Production environment.
///
/// Monotonic time from `std::time::Instant`, wall-clock time from
/// `SystemTime`, sleeping via tokio and randomness from getrandom. Seeds,
/// ephemeral keys and nonces all come from `random_bytes`, so it must be the
/// OS CSPRNG.
///
/// # Panics
///
/// Panics if the OS RNG fails. Generating a team seed without working
/// entropy would silently compromise every key derived from it.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }

    #[allow(clippy::disallowed_methods)]
    fn wall_clock_secs(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_bytes_differ() {
        let env = SystemEnv::new();
        let a: [u8; 32] = env.random_array();
        let b: [u8; 32] = env.random_array();
        assert_ne!(a, b);
    }

    #[test]
    fn wall_clock_is_after_2020() {
        assert!(SystemEnv::new().wall_clock_secs() > 1_577_836_800);
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_follows_tokio_time() {
        let start = tokio::time::Instant::now();
        SystemEnv::new().sleep(Duration::from_secs(30)).await;
        assert!(start.elapsed() >= Duration::from_secs(30));
    }
}
