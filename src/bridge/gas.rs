use std::sync::Arc;

use ethers::types::U256;
use tracing::{debug, instrument, warn};

use crate::chainadapter::{CallSpec, ChainReader};
use crate::registry::GasConfig;

/// `estimate * (100 + percent) / 100`
pub fn apply_buffer(estimate: U256, buffer_percent: u64) -> U256 {
    estimate.saturating_mul(U256::from(100 + buffer_percent)) / U256::from(100)
}

/// Gas limits for submissions. Never fails: estimation errors fall back to defaults.
#[derive(Clone)]
pub struct GasEstimator {
    reader: Arc<dyn ChainReader>,
    config: GasConfig,
}

impl GasEstimator {
    pub fn new(reader: Arc<dyn ChainReader>, config: GasConfig) -> Self {
        Self { reader, config }
    }

    pub fn config(&self) -> &GasConfig {
        &self.config
    }

    /// Fallback limit, linear in the number of tokens moved.
    pub fn default_for_batch(&self, batch_size: usize) -> U256 {
        U256::from(self.config.default_gas_per_token) * U256::from(batch_size.max(1))
    }

    #[instrument(skip(self, call, default_gas), fields(to = ?call.to))]
    pub async fn estimate(&self, call: &CallSpec, buffer_percent: u64, default_gas: U256) -> U256 {
        match self.reader.estimate_gas(call).await {
            Ok(estimate) if !estimate.is_zero() => {
                let limit = apply_buffer(estimate, buffer_percent);
                debug!(%estimate, %limit, "Gas estimated");
                limit
            }
            Ok(_) => {
                warn!("Node returned a zero gas estimate, using default {}", default_gas);
                default_gas
            }
            Err(e) => {
                warn!("Gas estimation failed, using default {}: {}", default_gas, e);
                default_gas
            }
        }
    }

    /// [`estimate`](Self::estimate) with the configured buffer and batch-scaled default.
    pub async fn estimate_for_batch(&self, call: &CallSpec, batch_size: usize) -> U256 {
        let default_gas = self.default_for_batch(batch_size);
        self.estimate(call, self.config.buffer_percent, default_gas).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcFailure;
    use async_trait::async_trait;
    use ethers::types::{Address, Bytes, TransactionReceipt, TxHash};

    struct Estimates(Result<U256, RpcFailure>);

    #[async_trait]
    impl ChainReader for Estimates {
        async fn chain_id(&self) -> Result<u64, RpcFailure> {
            Ok(1030)
        }

        async fn call(&self, _: &CallSpec) -> Result<Bytes, RpcFailure> {
            Ok(Bytes::default())
        }

        async fn estimate_gas(&self, _: &CallSpec) -> Result<U256, RpcFailure> {
            self.0.clone()
        }

        async fn transaction_receipt(&self, _: TxHash) -> Result<Option<TransactionReceipt>, RpcFailure> {
            Ok(None)
        }
    }

    fn call() -> CallSpec {
        CallSpec::new(Address::from_low_u64_be(0xb1), Bytes::from(vec![1, 2, 3, 4]))
    }

    #[test]
    fn test_apply_buffer() {
        assert_eq!(apply_buffer(U256::from(100_000), 15), U256::from(115_000));
        assert_eq!(apply_buffer(U256::from(100_000), 20), U256::from(120_000));
        assert_eq!(apply_buffer(U256::from(99), 15), U256::from(113));
    }

    #[tokio::test]
    async fn test_buffer_applied_to_estimate() {
        let estimator = GasEstimator::new(Arc::new(Estimates(Ok(U256::from(200_000)))), GasConfig::default());
        assert_eq!(estimator.estimate_for_batch(&call(), 1).await, U256::from(230_000));
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_batch_default() {
        let estimator = GasEstimator::new(
            Arc::new(Estimates(Err(RpcFailure::transport("connection reset")))),
            GasConfig::default(),
        );
        assert_eq!(estimator.estimate_for_batch(&call(), 3).await, U256::from(2_250_000));
        assert_eq!(estimator.estimate_for_batch(&call(), 0).await, U256::from(750_000));
    }

    #[tokio::test]
    async fn test_zero_estimate_uses_default() {
        let estimator = GasEstimator::new(Arc::new(Estimates(Ok(U256::zero()))), GasConfig::default());
        assert_eq!(
            estimator.estimate(&call(), 15, U256::from(42)).await,
            U256::from(42)
        );
    }
}
