// Client-side configuration for talking to an EVM chain

use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// Default timeout for RPC requests
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum retry attempts for failed transport calls
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Upper bound accepted for `max_retries`
pub const RETRY_LIMIT: u32 = 10;

/// Base delay between retry attempts (exponential backoff)
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Minimum spacing between two calls from the same client
pub const MIN_CALL_INTERVAL: Duration = Duration::from_millis(100);

/// How long to wait for a submitted transaction to be mined
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(180);

pub const DEFAULT_RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Connection parameters for one chain's RPC endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmClientConfig {
    /// RPC endpoint URL
    pub rpc_url: String,
    /// Chain ID the endpoint must report
    pub chain_id: u64,
    /// Per-call timeout
    pub rpc_timeout: Duration,
    /// Extra attempts for transport failures
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub min_call_interval: Duration,
    pub receipt_timeout: Duration,
    pub receipt_poll_interval: Duration,
}

impl EvmClientConfig {
    pub fn validate(&self) -> Result<(), BridgeError> {
        if !self.rpc_url.starts_with("http://") && !self.rpc_url.starts_with("https://") {
            return Err(BridgeError::Configuration(
                "RPC URL must start with http:// or https://".to_string(),
            ));
        }
        if self.chain_id == 0 {
            return Err(BridgeError::Configuration("Chain ID cannot be zero".to_string()));
        }
        if self.rpc_timeout.is_zero() {
            return Err(BridgeError::Configuration("RPC timeout cannot be zero".to_string()));
        }
        if self.max_retries > RETRY_LIMIT {
            return Err(BridgeError::Configuration(format!(
                "max_retries cannot exceed {}",
                RETRY_LIMIT
            )));
        }
        Ok(())
    }

    pub fn conflux(rpc_url: String) -> Self {
        EvmClientConfigBuilder::new(rpc_url, 1030)
            .rpc_timeout(Duration::from_secs(20))
            .build()
    }

    pub fn base(rpc_url: String) -> Self {
        EvmClientConfigBuilder::new(rpc_url, 8453)
            .rpc_timeout(Duration::from_secs(15))
            .receipt_poll_interval(Duration::from_secs(1))
            .build()
    }

    pub fn arbitrum(rpc_url: String) -> Self {
        EvmClientConfigBuilder::new(rpc_url, 42161)
            .rpc_timeout(Duration::from_secs(10))
            .receipt_poll_interval(Duration::from_millis(500))
            .build()
    }

    /// Local node: short timeouts, no pacing.
    pub fn development(rpc_url: String) -> Self {
        EvmClientConfigBuilder::new(rpc_url, 31337)
            .rpc_timeout(Duration::from_secs(5))
            .min_call_interval(Duration::ZERO)
            .max_retries(0)
            .build()
    }
}

/// Builder pattern for EvmClientConfig
pub struct EvmClientConfigBuilder {
    config: EvmClientConfig,
}

impl EvmClientConfigBuilder {
    pub fn new(rpc_url: String, chain_id: u64) -> Self {
        Self {
            config: EvmClientConfig {
                rpc_url,
                chain_id,
                rpc_timeout: DEFAULT_RPC_TIMEOUT,
                max_retries: MAX_RETRY_ATTEMPTS,
                retry_base_delay: RETRY_BASE_DELAY,
                min_call_interval: MIN_CALL_INTERVAL,
                receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
                receipt_poll_interval: DEFAULT_RECEIPT_POLL_INTERVAL,
            },
        }
    }

    pub fn rpc_timeout(mut self, timeout: Duration) -> Self {
        self.config.rpc_timeout = timeout;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.config.retry_base_delay = delay;
        self
    }

    pub fn min_call_interval(mut self, interval: Duration) -> Self {
        self.config.min_call_interval = interval;
        self
    }

    pub fn receipt_timeout(mut self, timeout: Duration) -> Self {
        self.config.receipt_timeout = timeout;
        self
    }

    pub fn receipt_poll_interval(mut self, interval: Duration) -> Self {
        self.config.receipt_poll_interval = interval;
        self
    }

    pub fn build(self) -> EvmClientConfig {
        self.config
    }
}
