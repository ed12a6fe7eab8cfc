// Collaborator seams between the pipeline and the outside world

use async_trait::async_trait;
use ethers::types::{Address, Bytes, TransactionReceipt, TxHash, U256};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::error::RpcFailure;
use crate::types::{CrossChainMessage, OperationOutcome, OperationState};

/// A contract call, used for reads, simulation, estimation and submission alike.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallSpec {
    pub from: Option<Address>,
    pub to: Address,
    pub data: Bytes,
    pub value: Option<U256>,
}

impl CallSpec {
    pub fn new(to: Address, data: Bytes) -> Self {
        Self {
            from: None,
            to,
            data,
            value: None,
        }
    }

    pub fn from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    pub fn value(mut self, value: U256) -> Self {
        self.value = Some(value);
        self
    }

    /// First four bytes of calldata.
    pub fn selector(&self) -> Option<[u8; 4]> {
        let data = self.data.as_ref();
        (data.len() >= 4).then(|| [data[0], data[1], data[2], data[3]])
    }
}

/// Read-only access to one chain.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Chain id the client is connected to.
    async fn chain_id(&self) -> Result<u64, RpcFailure>;

    /// `eth_call` against the latest state. Also serves as the pre-broadcast dry run.
    async fn call(&self, call: &CallSpec) -> Result<Bytes, RpcFailure>;

    async fn estimate_gas(&self, call: &CallSpec) -> Result<U256, RpcFailure>;

    /// `Ok(None)` while the transaction is not yet mined.
    async fn transaction_receipt(&self, hash: TxHash) -> Result<Option<TransactionReceipt>, RpcFailure>;
}

/// Signing account that can broadcast transactions.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    fn address(&self) -> Address;

    /// Signs and broadcasts `call` with the given gas limit, returning the hash.
    async fn send_transaction(&self, call: &CallSpec, gas_limit: U256) -> Result<TxHash, RpcFailure>;
}

/// Notifications emitted to whatever renders progress.
#[derive(Debug, Clone, Serialize)]
pub enum BridgeEvent {
    Status(String),
    Stage { operation: Uuid, state: OperationState },
    Finished(OperationOutcome),
    Tracking(CrossChainMessage),
}

pub trait BridgeObserver: Send + Sync {
    fn notify(&self, event: BridgeEvent);
}

impl BridgeObserver for UnboundedSender<BridgeEvent> {
    fn notify(&self, event: BridgeEvent) {
        // Receiver gone means nobody is listening anymore.
        let _ = self.send(event);
    }
}

/// Observer that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl BridgeObserver for NoopObserver {
    fn notify(&self, _event: BridgeEvent) {}
}
