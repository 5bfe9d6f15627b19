// ── Runtime configuration ──
//
// Built by the caller (usually from `devlink-config`). Never reads disk.

use std::time::Duration;

use crate::error::CoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Node this process serves. Links bound elsewhere are released.
    pub node_name: String,
    /// Number of concurrent reconcile workers.
    pub workers: usize,
    pub requeue_base_delay: Duration,
    pub requeue_max_delay: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            node_name: String::new(),
            workers: 2,
            requeue_base_delay: Duration::from_millis(5),
            requeue_max_delay: Duration::from_secs(1000),
        }
    }
}

impl ReconcilerConfig {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.node_name.trim().is_empty() {
            return Err(CoreError::Config {
                message: "node name must not be empty".into(),
            });
        }
        if self.workers == 0 {
            return Err(CoreError::Config {
                message: "at least one worker is required".into(),
            });
        }
        if self.requeue_base_delay > self.requeue_max_delay {
            return Err(CoreError::Config {
                message: "requeue base delay exceeds the maximum delay".into(),
            });
        }
        Ok(())
    }

    /// Delay before retrying a link that has failed `failures` times in a row.
    pub fn backoff(&self, failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(failures.min(31));
        self.requeue_base_delay
            .saturating_mul(factor)
            .min(self.requeue_max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let config = ReconcilerConfig {
            requeue_base_delay: Duration::from_millis(10),
            requeue_max_delay: Duration::from_millis(50),
            ..ReconcilerConfig::new("edge-1")
        };
        assert_eq!(config.backoff(0), Duration::from_millis(10));
        assert_eq!(config.backoff(1), Duration::from_millis(20));
        assert_eq!(config.backoff(2), Duration::from_millis(40));
        assert_eq!(config.backoff(3), Duration::from_millis(50));
        assert_eq!(config.backoff(200), Duration::from_millis(50));
    }

    #[test]
    fn validation_rejects_bad_values() {
        assert!(ReconcilerConfig::default().validate().is_err());
        assert!(ReconcilerConfig::new("edge-1").validate().is_ok());
        let no_workers = ReconcilerConfig {
            workers: 0,
            ..ReconcilerConfig::new("edge-1")
        };
        assert!(no_workers.validate().is_err());
    }
}
