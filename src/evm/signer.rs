use std::time::Duration;

use async_trait::async_trait;
use ethers::middleware::SignerMiddleware;
use ethers::prelude::*;
use ethers::providers::MiddlewareError;
use tokio::time::timeout;
use tracing::{info, instrument};

use crate::chainadapter::{CallSpec, TransactionSigner};
use crate::error::{BridgeError, RpcFailure};
use crate::evm::clients::{to_typed_transaction, EvmChainClient};

/// Local wallet that signs and broadcasts through the client's provider
pub struct WalletSigner {
    client: SignerMiddleware<Provider<Http>, LocalWallet>,
    rpc_timeout: Duration,
}

impl WalletSigner {
    pub fn new(chain: &EvmChainClient, wallet: LocalWallet) -> Self {
        let config = chain.config();
        let wallet = wallet.with_chain_id(config.chain_id);
        let provider = Provider::clone(&chain.provider());
        Self {
            client: SignerMiddleware::new(provider, wallet),
            rpc_timeout: config.rpc_timeout,
        }
    }

    pub fn from_private_key(chain: &EvmChainClient, private_key: &str) -> Result<Self, BridgeError> {
        let wallet: LocalWallet = private_key
            .trim_start_matches("0x")
            .parse()
            .map_err(|e: WalletError| BridgeError::Configuration(format!("Invalid private key: {}", e)))?;
        Ok(Self::new(chain, wallet))
    }
}

fn middleware_failure<E: MiddlewareError>(error: E) -> RpcFailure {
    match error.as_error_response() {
        Some(response) => RpcFailure::from_json_rpc(response),
        None => RpcFailure::transport(error.to_string()),
    }
}

#[async_trait]
impl TransactionSigner for WalletSigner {
    fn address(&self) -> Address {
        self.client.address()
    }

    #[instrument(skip(self, call), fields(to = ?call.to, gas = %gas_limit))]
    async fn send_transaction(&self, call: &CallSpec, gas_limit: U256) -> Result<TxHash, RpcFailure> {
        let mut tx = to_typed_transaction(call);
        tx.set_from(self.address());
        tx.set_gas(gas_limit);

        // No retry here: a resend could broadcast a second transaction.
        let pending = timeout(self.rpc_timeout, self.client.send_transaction(tx, None))
            .await
            .map_err(|_| RpcFailure::timeout("Transaction broadcast"))?
            .map_err(middleware_failure)?;

        let tx_hash = pending.tx_hash();
        info!("Broadcast transaction {:?}", tx_hash);
        Ok(tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evm::types::EvmClientConfigBuilder;

    // Well-known development key, never funded on a live network.
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_signer_address_from_key() {
        let chain = EvmChainClient::new(
            EvmClientConfigBuilder::new("http://localhost:8545".to_string(), 31337).build(),
        )
        .unwrap();
        let signer = WalletSigner::from_private_key(&chain, DEV_KEY).unwrap();
        assert_eq!(
            format!("{:?}", signer.address()),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn test_bad_key_is_configuration_error() {
        let chain = EvmChainClient::new(
            EvmClientConfigBuilder::new("http://localhost:8545".to_string(), 31337).build(),
        )
        .unwrap();
        assert!(matches!(
            WalletSigner::from_private_key(&chain, "0x1234"),
            Err(BridgeError::Configuration(_))
        ));
    }
}
