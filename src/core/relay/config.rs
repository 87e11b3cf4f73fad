use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::queue::DEFAULT_QUEUE_CAPACITY;
use super::transport::RetryPolicy;

/// Tuning knobs for the relay orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Transport connection attempts per call
    pub max_connect_attempts: u32,
    /// Fixed delay between connection attempts
    pub connect_retry_delay: Duration,
    /// Timeout of a single connection attempt
    pub connect_timeout: Duration,
    /// Keepalive ping interval
    pub ping_interval: Duration,
    /// Time allowed for a pong before the transport is considered dead
    pub ping_timeout: Duration,
    /// Capacity of each audio queue, in chunks
    pub queue_capacity: usize,
    /// Poll interval used by queue consumers to re-check the call status
    pub queue_poll_timeout: Duration,
    /// Wait after ending all calls during shutdown
    pub shutdown_grace: Duration,
    /// Admission limit
    pub max_concurrent_calls: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_connect_attempts: 3,
            connect_retry_delay: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(30),
            ping_timeout: Duration::from_secs(10),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            queue_poll_timeout: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(2),
            max_concurrent_calls: 10,
        }
    }
}

impl RelayConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_connect_attempts,
            delay: self.connect_retry_delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.max_connect_attempts, 3);
        assert_eq!(config.connect_retry_delay, Duration::from_secs(5));
        assert_eq!(config.ping_interval, Duration::from_secs(30));
        assert_eq!(config.ping_timeout, Duration::from_secs(10));
        assert_eq!(config.queue_capacity, 1000);
        assert_eq!(config.queue_poll_timeout, Duration::from_secs(1));
        assert_eq!(config.shutdown_grace, Duration::from_secs(2));
        assert_eq!(config.max_concurrent_calls, 10);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }
}
