//! Engine configuration.

use std::time::Duration;

use crate::error::ConfigError;

/// Retry policy for the rotation coordinator.
///
/// Conflicts are retried up to `max_attempts` times in total. Before attempt
/// `n >= 2` the coordinator sleeps a uniformly random duration in
/// `[0, min(max_backoff, base_backoff * 2^(n-2))]` ("full jitter"), which
/// spreads out rotators that keep colliding on the same head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationConfig {
    /// Total attempts before giving up with `ConflictExhausted`
    pub max_attempts: u32,
    /// Backoff ceiling before the second attempt
    pub base_backoff: Duration,
    /// Upper bound on any single backoff
    pub max_backoff: Duration,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_backoff: Duration::from_millis(25),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RotationConfig {
    /// Check the policy is usable.
    ///
    /// # Errors
    ///
    /// `ZeroAttempts` if no attempt would ever run, `BackoffInverted` if the
    /// base backoff exceeds the cap.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if self.base_backoff > self.max_backoff {
            return Err(ConfigError::BackoffInverted {
                base: self.base_backoff,
                max: self.max_backoff,
            });
        }
        Ok(())
    }

    /// Backoff ceiling before `attempt` (1-based). Zero for the first attempt.
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let doublings = (attempt - 2).min(31);
        self.base_backoff.saturating_mul(1u32 << doublings).min(self.max_backoff)
    }

    /// Jittered backoff before `attempt`, drawn from `random`.
    pub fn backoff(&self, attempt: u32, random: u64) -> Duration {
        let ceiling = u64::try_from(self.backoff_ceiling(attempt).as_nanos()).unwrap_or(u64::MAX);
        if ceiling == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(random % ceiling.saturating_add(1))
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineConfig {
    /// Retry policy for rotations
    pub rotation: RotationConfig,
}

impl EngineConfig {
    /// Check every section.
    ///
    /// # Errors
    ///
    /// First invalid section's error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rotation.validate()
    }
}
