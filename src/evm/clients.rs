use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::types::transaction::eip2718::TypedTransaction;
use reqwest::Client;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, instrument, warn};

use crate::chainadapter::{CallSpec, ChainReader};
use crate::error::{BridgeError, RpcFailure};
use crate::evm::types::EvmClientConfig;
use crate::types::HealthMetrics;
use crate::utils::retry_async;

/// Read-only RPC client with pacing, per-call timeouts and retries
pub struct EvmChainClient {
    provider: Arc<Provider<Http>>,
    config: EvmClientConfig,
    last_rpc_call: Mutex<Option<Instant>>,
    health_metrics: Mutex<HealthMetrics>,
}

impl EvmChainClient {
    /// Creates a client without touching the network.
    pub fn new(config: EvmClientConfig) -> Result<Self, BridgeError> {
        config.validate()?;

        let url = reqwest::Url::parse(&config.rpc_url)
            .map_err(|e| BridgeError::Configuration(format!("Invalid RPC URL: {}", e)))?;
        let http = Http::new_with_client(
            url,
            Client::builder()
                .timeout(config.rpc_timeout)
                .build()
                .map_err(|e| BridgeError::Configuration(format!("Failed to create HTTP client: {}", e)))?,
        );
        let provider = Provider::new(http).interval(Duration::from_millis(50));

        Ok(Self {
            provider: Arc::new(provider),
            config,
            last_rpc_call: Mutex::new(None),
            health_metrics: Mutex::new(HealthMetrics::default()),
        })
    }

    /// Creates a client and checks the endpoint serves the configured chain.
    pub async fn connect(config: EvmClientConfig) -> Result<Self, BridgeError> {
        info!("Connecting to chain {} at {}", config.chain_id, config.rpc_url);
        let client = Self::new(config)?;
        client.health_check().await?;
        Ok(client)
    }

    pub async fn health_check(&self) -> Result<(), BridgeError> {
        let chain_id = self.chain_id().await?;
        if chain_id != self.config.chain_id {
            return Err(BridgeError::Configuration(format!(
                "Chain ID mismatch: expected {}, got {}",
                self.config.chain_id, chain_id
            )));
        }
        debug!("Health check passed for chain {}", chain_id);
        Ok(())
    }

    pub fn provider(&self) -> Arc<Provider<Http>> {
        Arc::clone(&self.provider)
    }

    pub fn config(&self) -> &EvmClientConfig {
        &self.config
    }

    pub async fn health_metrics(&self) -> HealthMetrics {
        self.health_metrics.lock().await.clone()
    }

    /// Runs one RPC call under the client's timeout, pacing and retry policy.
    ///
    /// Only transport failures are retried; an error the node itself reported
    /// (a revert, a bad nonce) is returned on first sight.
    async fn execute_rpc_call<T, F, Fut>(&self, mut operation: F) -> Result<T, RpcFailure>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
    {
        self.enforce_rate_limit().await;

        let start_time = Instant::now();
        let rpc_timeout = self.config.rpc_timeout;

        let result = retry_async(
            || {
                let call = operation();
                async move {
                    match timeout(rpc_timeout, call).await {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(e)) => Err(RpcFailure::from(e)),
                        Err(_) => Err(RpcFailure::timeout(format!("RPC call after {:?}", rpc_timeout))),
                    }
                }
            },
            self.config.max_retries,
            self.config.retry_base_delay,
            is_transport_failure,
        )
        .await;

        let mut metrics = self.health_metrics.lock().await;
        match &result {
            Ok(_) => metrics.record_success(start_time.elapsed()),
            Err(failure) if failure.code.is_some() => metrics.record_success(start_time.elapsed()),
            Err(failure) => {
                error!("RPC call failed: {}", failure);
                metrics.record_failure();
            }
        }
        result
    }

    /// Enforces the minimum interval between calls
    async fn enforce_rate_limit(&self) {
        let mut last_call = self.last_rpc_call.lock().await;
        if let Some(last_time) = *last_call {
            let elapsed = last_time.elapsed();
            if elapsed < self.config.min_call_interval {
                let sleep_duration = self.config.min_call_interval - elapsed;
                drop(last_call);
                sleep(sleep_duration).await;
                last_call = self.last_rpc_call.lock().await;
            }
        }
        *last_call = Some(Instant::now());
    }
}

fn is_transport_failure(failure: &RpcFailure) -> bool {
    failure.code.is_none() && !failure.timed_out
}

pub(crate) fn to_typed_transaction(call: &CallSpec) -> TypedTransaction {
    let mut request = TransactionRequest::new().to(call.to).data(call.data.clone());
    if let Some(from) = call.from {
        request = request.from(from);
    }
    if let Some(value) = call.value {
        request = request.value(value);
    }
    request.into()
}

#[async_trait]
impl ChainReader for EvmChainClient {
    async fn chain_id(&self) -> Result<u64, RpcFailure> {
        let chain_id = self
            .execute_rpc_call(|| async { self.provider.get_chainid().await })
            .await?;
        Ok(chain_id.as_u64())
    }

    #[instrument(skip(self, call), fields(to = ?call.to))]
    async fn call(&self, call: &CallSpec) -> Result<Bytes, RpcFailure> {
        let tx = to_typed_transaction(call);
        self.execute_rpc_call(|| async { self.provider.call(&tx, None).await })
            .await
    }

    #[instrument(skip(self, call), fields(to = ?call.to))]
    async fn estimate_gas(&self, call: &CallSpec) -> Result<U256, RpcFailure> {
        let tx = to_typed_transaction(call);
        self.execute_rpc_call(|| async { self.provider.estimate_gas(&tx, None).await })
            .await
    }

    async fn transaction_receipt(&self, hash: TxHash) -> Result<Option<TransactionReceipt>, RpcFailure> {
        let receipt = self
            .execute_rpc_call(|| async { self.provider.get_transaction_receipt(hash).await })
            .await;
        if let Err(failure) = &receipt {
            warn!("Receipt lookup for {:?} failed: {}", hash, failure);
        }
        receipt
    }
}

impl std::fmt::Display for EvmChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EvmChainClient(chain {})", self.config.chain_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evm::types::EvmClientConfigBuilder;

    #[test]
    fn test_new_rejects_bad_url() {
        let config = EvmClientConfigBuilder::new("ftp://nope".to_string(), 1).build();
        assert!(matches!(EvmChainClient::new(config), Err(BridgeError::Configuration(_))));
    }

    #[test]
    fn test_typed_transaction_carries_value_and_sender() {
        let call = CallSpec::new(Address::from_low_u64_be(9), Bytes::from(vec![1, 2, 3, 4]))
            .from(Address::from_low_u64_be(1))
            .value(U256::from(5));
        let tx = to_typed_transaction(&call);
        assert_eq!(tx.to_addr(), Some(&Address::from_low_u64_be(9)));
        assert_eq!(tx.from(), Some(&Address::from_low_u64_be(1)));
        assert_eq!(tx.value(), Some(&U256::from(5)));
    }

    #[test]
    fn test_only_transport_failures_retry() {
        assert!(is_transport_failure(&RpcFailure::transport("connection reset")));
        assert!(!is_transport_failure(&RpcFailure::timeout("call")));
        assert!(!is_transport_failure(&RpcFailure::revert(Bytes::default())));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_failure() {
        let config = EvmClientConfigBuilder::new("http://127.0.0.1:9".to_string(), 1)
            .max_retries(0)
            .rpc_timeout(Duration::from_secs(2))
            .build();
        let client = EvmChainClient::new(config).unwrap();
        let err = client.chain_id().await.unwrap_err();
        assert!(err.code.is_none());
        let metrics = client.health_metrics().await;
        assert_eq!(metrics.failed_calls, 1);
    }
}
