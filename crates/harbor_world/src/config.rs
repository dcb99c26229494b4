//! World configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::WorldError;

/// Environment variable overriding [`WorldConfig::tick_rate`].
pub const TICK_RATE_ENV: &str = "HARBOR_TICK_RATE";

/// Environment variable overriding [`WorldConfig::max_ticks`].
pub const MAX_TICKS_ENV: &str = "HARBOR_MAX_TICKS";

/// Environment variable overriding [`WorldConfig::worker_threads`].
pub const WORKER_THREADS_ENV: &str = "HARBOR_WORKER_THREADS";

/// Configuration for a [`World`](crate::World) and its tick loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Target ticks per second.
    pub tick_rate: f64,
    /// Maximum number of ticks the loop runs before stopping (0 = unlimited).
    pub max_ticks: u64,
    /// Size of a dedicated worker pool for wave execution. `None` shares
    /// rayon's global pool.
    pub worker_threads: Option<usize>,
    /// Consecutive failures of one system after which a warning is logged.
    pub failure_warn_threshold: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            max_ticks: 0,
            worker_threads: None,
            failure_warn_threshold: 10,
        }
    }
}

impl WorldConfig {
    /// Load defaults, then apply any `HARBOR_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::Config`] if a variable is set but unparsable, or
    /// the resulting configuration is invalid.
    pub fn from_env() -> Result<Self, WorldError> {
        let mut config = Self::default();
        if let Some(rate) = read_env::<f64>(TICK_RATE_ENV)? {
            config.tick_rate = rate;
        }
        if let Some(max_ticks) = read_env::<u64>(MAX_TICKS_ENV)? {
            config.max_ticks = max_ticks;
        }
        if let Some(threads) = read_env::<usize>(WORKER_THREADS_ENV)? {
            config.worker_threads = Some(threads);
        }
        config.validate()?;
        Ok(config)
    }

    /// Override the tick rate.
    #[must_use]
    pub fn with_tick_rate(mut self, tick_rate: f64) -> Self {
        self.tick_rate = tick_rate;
        self
    }

    /// Stop the loop after `max_ticks` ticks.
    #[must_use]
    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    /// Use a dedicated pool of `threads` workers.
    #[must_use]
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    /// Check that the values are usable.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::Config`] for a non-positive tick rate or an
    /// empty worker pool.
    pub fn validate(&self) -> Result<(), WorldError> {
        if !self.tick_rate.is_finite() || self.tick_rate <= 0.0 {
            return Err(WorldError::Config {
                key: "tick_rate",
                value: self.tick_rate.to_string(),
                reason: "must be a positive number".to_string(),
            });
        }
        if self.worker_threads == Some(0) {
            return Err(WorldError::Config {
                key: "worker_threads",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// The target duration of one tick.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate)
    }
}

fn read_env<T>(key: &'static str) -> Result<Option<T>, WorldError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => match value.trim().parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(e) => Err(WorldError::Config {
                key,
                reason: e.to_string(),
                value,
            }),
        },
        Err(_) => Ok(None),
    }
}
