use std::time::{Duration, Instant};

use ethers::types::{Address, Bytes, TransactionReceipt, TxHash, H256, U256};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BridgeError, ValidationError};
use crate::utils::{now_millis, parse_address, parse_token_id};

pub type TokenId = U256;

/// Fee returned by `quoteBridgeSend`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagingFee {
    pub native_fee: U256,
    pub alt_token_fee: U256,
}

impl MessagingFee {
    pub fn new(native_fee: U256, alt_token_fee: U256) -> Self {
        Self { native_fee, alt_token_fee }
    }

    /// A zero native fee usually means the pathway is not wired up.
    pub fn is_usable(&self) -> bool {
        !self.native_fee.is_zero()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Success,
    Reverted,
    Failed,
}

/// Result of one pass through the submitter.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionOutcome {
    pub status: TxStatus,
    pub tx_hash: Option<TxHash>,
    pub revert_reason: Option<String>,
    #[serde(skip)]
    pub receipt: Option<TransactionReceipt>,
}

impl TransactionOutcome {
    pub fn confirmed(receipt: TransactionReceipt) -> Self {
        let status = if receipt.status == Some(1u64.into()) {
            TxStatus::Success
        } else {
            TxStatus::Reverted
        };
        Self {
            status,
            tx_hash: Some(receipt.transaction_hash),
            revert_reason: None,
            receipt: Some(receipt),
        }
    }

    /// Success without a transaction (already approved / already registered).
    pub fn already_done() -> Self {
        Self {
            status: TxStatus::Success,
            tx_hash: None,
            revert_reason: None,
            receipt: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: TxStatus::Failed,
            tx_hash: None,
            revert_reason: Some(reason.into()),
            receipt: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TxStatus::Success
    }
}

/// Delivery state of a cross-chain message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageStatus {
    Pending,
    Delivered,
    Failed,
    /// Poll budget exhausted without a terminal answer.
    Unknown,
}

impl MessageStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, MessageStatus::Pending)
    }
}

/// A message handed over to the delivery tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossChainMessage {
    pub message_id: H256,
    pub source_chain: u64,
    pub destination_chain: u64,
    pub source_tx: TxHash,
    pub destination_tx: Option<TxHash>,
    pub status: MessageStatus,
    pub delivery_timestamp_ms: Option<u64>,
    pub estimated_remaining_ms: Option<u64>,
}

impl CrossChainMessage {
    pub fn pending(message_id: H256, source_tx: TxHash, source_chain: u64, destination_chain: u64) -> Self {
        Self {
            message_id,
            source_chain,
            destination_chain,
            source_tx,
            destination_tx: None,
            status: MessageStatus::Pending,
            delivery_timestamp_ms: None,
            estimated_remaining_ms: None,
        }
    }

    /// Applies an observation. Returns false if the message is already retired.
    pub fn apply(&mut self, observation: StatusObservation) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        match observation {
            StatusObservation::Pending { estimated_remaining_ms } => {
                self.estimated_remaining_ms = estimated_remaining_ms;
            }
            StatusObservation::Delivered { destination_tx, delivered_at_ms } => {
                self.status = MessageStatus::Delivered;
                self.destination_tx = destination_tx;
                self.delivery_timestamp_ms = delivered_at_ms;
                self.estimated_remaining_ms = None;
            }
            StatusObservation::Failed => {
                self.status = MessageStatus::Failed;
                self.estimated_remaining_ms = None;
            }
            StatusObservation::Exhausted => {
                self.status = MessageStatus::Unknown;
                self.estimated_remaining_ms = None;
            }
        }
        true
    }
}

/// One decoded answer from the status service, or the poll budget running out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusObservation {
    Pending { estimated_remaining_ms: Option<u64> },
    Delivered { destination_tx: Option<TxHash>, delivered_at_ms: Option<u64> },
    Failed,
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationState {
    Created,
    Validated,
    Quoted,
    Submitted,
    Completed,
    Failed,
}

/// Caller input for a bridge send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeRequest {
    pub destination_chain: u64,
    pub local_token: Address,
    pub token_ids: Vec<TokenId>,
    pub recipient: Address,
}

impl BridgeRequest {
    /// Parses the untyped form a UI would hand over.
    pub fn parse(
        destination_chain: u64,
        local_token: &str,
        token_ids: &[&str],
        recipient: &str,
    ) -> Result<Self, ValidationError> {
        if local_token.is_empty() || recipient.is_empty() || token_ids.is_empty() {
            return Err(ValidationError::MissingParameters(
                "token address, recipient and at least one token id are required".to_string(),
            ));
        }
        Ok(Self {
            destination_chain,
            local_token: parse_address(local_token)?,
            token_ids: token_ids
                .iter()
                .map(|id| parse_token_id(id))
                .collect::<Result<Vec<_>, _>>()?,
            recipient: parse_address(recipient)?,
        })
    }
}

/// Working state of a single bridge send, discarded once submission completes.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeOperation {
    pub id: Uuid,
    pub source_chain: u64,
    pub destination_chain: u64,
    pub local_token: Address,
    pub token_ids: Vec<TokenId>,
    pub recipient: Address,
    pub options: Bytes,
    pub fee_quote: Option<MessagingFee>,
    pub state: OperationState,
}

impl BridgeOperation {
    pub fn new(source_chain: u64, request: &BridgeRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_chain,
            destination_chain: request.destination_chain,
            local_token: request.local_token,
            token_ids: request.token_ids.clone(),
            recipient: request.recipient,
            options: Bytes::default(),
            fee_quote: None,
            state: OperationState::Created,
        }
    }
}

/// The single result shape every pipeline entry point returns.
#[derive(Debug, Clone, Serialize)]
pub struct OperationOutcome {
    pub status: TxStatus,
    pub tx_hash: Option<TxHash>,
    pub reason: Option<String>,
    pub message: Option<CrossChainMessage>,
}

impl OperationOutcome {
    pub fn from_transaction(outcome: &TransactionOutcome) -> Self {
        Self {
            status: outcome.status,
            tx_hash: outcome.tx_hash,
            reason: outcome.revert_reason.clone(),
            message: None,
        }
    }

    pub fn from_error(error: &BridgeError) -> Self {
        Self {
            status: TxStatus::Failed,
            tx_hash: None,
            reason: Some(error.reason()),
            message: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TxStatus::Success
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub enum ConnectionStatus {
    Healthy,
    Degraded,
    Unhealthy,
    #[default]
    Unknown,
}

/// Call statistics kept by an RPC client.
#[derive(Debug, Clone, Serialize)]
pub struct HealthMetrics {
    #[serde(skip)]
    pub last_successful_call: Option<Instant>,
    pub last_successful_timestamp: Option<u64>,
    pub consecutive_failures: u32,
    pub total_calls: u64,
    pub failed_calls: u64,
    #[serde(serialize_with = "serialize_duration")]
    pub avg_response_time: Duration,
    pub connection_status: ConnectionStatus,
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    duration.as_millis().serialize(serializer)
}

impl Default for HealthMetrics {
    fn default() -> Self {
        Self {
            last_successful_call: None,
            last_successful_timestamp: None,
            consecutive_failures: 0,
            total_calls: 0,
            failed_calls: 0,
            avg_response_time: Duration::ZERO,
            connection_status: ConnectionStatus::Unknown,
        }
    }
}

impl HealthMetrics {
    pub fn record_success(&mut self, response_time: Duration) {
        self.last_successful_call = Some(Instant::now());
        self.last_successful_timestamp = Some(now_millis());
        self.consecutive_failures = 0;
        self.total_calls += 1;
        self.connection_status = ConnectionStatus::Healthy;

        let successful = self.total_calls - self.failed_calls;
        if successful == 1 {
            self.avg_response_time = response_time;
        } else {
            let current = self.avg_response_time.as_nanos() as f64;
            let updated = (current * (successful as f64 - 1.0) + response_time.as_nanos() as f64)
                / successful as f64;
            self.avg_response_time = Duration::from_nanos(updated as u64);
        }
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        self.total_calls += 1;
        self.failed_calls += 1;
        self.connection_status = if self.consecutive_failures > 5 {
            ConnectionStatus::Unhealthy
        } else {
            ConnectionStatus::Degraded
        };
    }
}
