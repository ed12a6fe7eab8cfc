use std::time::Duration;
use serde::{Serialize, Deserialize};

/// Gas limits used when building and submitting bridge transactions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasConfig {
    /// Markup applied to every successful estimate, in percent
    pub buffer_percent: u64,

    /// Fallback gas per token when estimation fails
    pub default_gas_per_token: u64,

    /// Destination `lzReceive` gas per token written into the message options
    pub receive_gas_per_token: u128,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            buffer_percent: 15,
            default_gas_per_token: 750_000,
            receive_gas_per_token: 750_000,
        }
    }
}

impl GasConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_buffer_percent(mut self, percent: u64) -> Self {
        self.buffer_percent = percent;
        self
    }

    pub fn with_default_gas_per_token(mut self, gas: u64) -> Self {
        self.default_gas_per_token = gas;
        self
    }

    pub fn with_receive_gas_per_token(mut self, gas: u128) -> Self {
        self.receive_gas_per_token = gas;
        self
    }
}

/// Delivery polling budget
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Fixed delay between fetches
    pub poll_interval: Duration,

    /// Fetches allowed before giving up with `Unknown`, the first one included
    pub max_polls: u32,

    /// Upper bound for a single status fetch
    pub fetch_timeout: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            max_polls: 60,
            fetch_timeout: Duration::from_secs(15),
        }
    }
}

impl TrackerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_polls(mut self, polls: u32) -> Self {
        self.max_polls = polls;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Upper bound on how long tracking can run, ignoring fetch latency.
    pub fn ceiling(&self) -> Duration {
        self.poll_interval * self.max_polls.saturating_sub(1)
    }
}

/// Hosts of the cross-chain status service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    pub mainnet_url: String,
    pub testnet_url: String,
    pub request_timeout: Duration,
    /// Page size for wallet history queries
    pub history_limit: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            mainnet_url: "https://scan.layerzero-api.com".to_string(),
            testnet_url: "https://scan-testnet.layerzero-api.com".to_string(),
            request_timeout: Duration::from_secs(10),
            history_limit: 100,
        }
    }
}

impl ScanConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Points both networks at one host, e.g. a local stub server
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.mainnet_url = url.clone();
        self.testnet_url = url;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_history_limit(mut self, limit: u32) -> Self {
        self.history_limit = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_ceiling_is_about_ten_minutes() {
        let config = TrackerConfig::default();
        assert_eq!(config.ceiling(), Duration::from_secs(590));
    }

    #[test]
    fn test_gas_builder() {
        let config = GasConfig::default()
            .with_buffer_percent(20)
            .with_default_gas_per_token(500_000);
        assert_eq!(config.buffer_percent, 20);
        assert_eq!(config.default_gas_per_token, 500_000);
        assert_eq!(config.receive_gas_per_token, 750_000);
    }
}
