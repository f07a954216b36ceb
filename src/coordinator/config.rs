//! Coordinator configuration

use std::time::Duration;

use crate::error::{Error, Result};

/// Configuration for the ranking coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Deadline for each durable store call
    pub store_timeout: Duration,

    /// Deadline for each cache call
    pub cache_timeout: Duration,

    /// Longest wait for a per-student lock
    pub lock_timeout: Duration,

    /// Leaderboard length when the caller gives none
    pub default_rank_count: usize,

    /// Students hydrated in parallel by a batch read
    pub hydrate_concurrency: usize,

    /// Durable counter used for identifiers
    pub sequence_name: String,

    /// Seed for initial scores; random when unset
    pub score_seed: Option<u64>,

    /// Load every durable record into the cache at start-up
    pub warm_cache_on_start: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(2),
            cache_timeout: Duration::from_millis(500),
            lock_timeout: Duration::from_secs(5),
            default_rank_count: 10,
            hydrate_concurrency: 8,
            sequence_name: "student_id".to_string(),
            score_seed: None,
            warm_cache_on_start: true,
        }
    }
}

impl CoordinatorConfig {
    /// Reject settings the coordinator cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.store_timeout.is_zero() || self.cache_timeout.is_zero() {
            return Err(Error::Config("store timeouts must be non-zero".into()));
        }
        if self.lock_timeout.is_zero() {
            return Err(Error::Config("lock timeout must be non-zero".into()));
        }
        if self.hydrate_concurrency == 0 {
            return Err(Error::Config("hydrate concurrency must be at least 1".into()));
        }
        if self.sequence_name.trim().is_empty() {
            return Err(Error::Config("sequence name must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.default_rank_count, 10);
        assert_eq!(config.sequence_name, "student_id");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let config = CoordinatorConfig {
            hydrate_concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CoordinatorConfig {
            store_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
