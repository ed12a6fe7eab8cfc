use std::fmt;

use ethers::providers::{JsonRpcError, ProviderError, RpcError};
use ethers::types::{Address, Bytes, TxHash, H256, U256};
use serde::Serialize;

use crate::reason::decode_builtin_revert;

/// JSON-RPC error code nodes use for `execution reverted`.
const EXECUTION_REVERTED_CODE: i64 = 3;

/// Read-only checks that failed before anything reached the chain.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Not owner of token {token_id}")]
    NotOwner { token_id: U256 },

    #[error("Token {token_id} is not approved for the bridge")]
    NotApproved { token_id: U256 },

    #[error("Not ERC721: {0:?}")]
    NotErc721(Address),

    #[error("Collection {0:?} is not registered with the bridge")]
    NotRegistered(Address),

    #[error("Peer not set for endpoint {eid}")]
    PeerNotConfigured { eid: u32 },

    #[error("Peer mismatch for endpoint {eid}: expected {expected:?}, found {actual:?}")]
    PeerMismatch { eid: u32, expected: H256, actual: H256 },

    #[error("Missing parameters: {0}")]
    MissingParameters(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid token id: {0}")]
    InvalidTokenId(String),

    #[error("Unsupported chain {0}")]
    UnsupportedChain(u64),

    #[error("Source and destination cannot be the same")]
    SameChain,
}

/// Fee quotes that must not be used for a send.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QuoteError {
    #[error("Invalid fee quote: native fee is zero (check peer and DVN configuration)")]
    ZeroFee,

    /// The quote call reverted; holds the decoded reason.
    #[error("{0}")]
    Reverted(String),
}

/// Malformed executor options blob.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OptionsError {
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Expected {expected} bytes of options, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("Unsupported options type {0:#06x}")]
    OptionType(u16),

    #[error("Unsupported worker id {0}")]
    Worker(u8),

    #[error("Unexpected option size {0}")]
    Size(u16),

    #[error("Unsupported executor option {0}")]
    SubType(u8),
}

/// Structured inner layer of a failed chain call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureCause {
    /// The node executed the call and it reverted.
    Revert { reason: Option<String>, data: Bytes },
    /// The request never produced an execution result.
    Transport { message: String },
}

/// A failed RPC interaction, keeping every layer that may carry a reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RpcFailure {
    pub code: Option<i64>,
    pub message: String,
    pub cause: Option<FailureCause>,
    pub timed_out: bool,
}

impl RpcFailure {
    pub fn transport(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            code: None,
            cause: Some(FailureCause::Transport { message: message.clone() }),
            message,
            timed_out: false,
        }
    }

    pub fn timeout(context: impl fmt::Display) -> Self {
        Self {
            code: None,
            message: format!("{} timed out", context),
            cause: None,
            timed_out: true,
        }
    }

    pub fn revert(data: Bytes) -> Self {
        let reason = decode_builtin_revert(&data);
        Self {
            code: Some(EXECUTION_REVERTED_CODE),
            message: "execution reverted".to_string(),
            cause: Some(FailureCause::Revert { reason, data }),
            timed_out: false,
        }
    }

    /// Builds a failure from the node's JSON-RPC error object.
    pub fn from_json_rpc(err: &JsonRpcError) -> Self {
        let data = err.data.as_ref().and_then(revert_bytes_from_value);
        let is_revert = data.is_some()
            || err.code == EXECUTION_REVERTED_CODE
            || err.message.contains("revert");

        let cause = if is_revert {
            let data = data.unwrap_or_default();
            // Node text only stands in when there is no payload to decode.
            let reason = if data.is_empty() {
                err.message
                    .strip_prefix("execution reverted: ")
                    .map(str::to_string)
            } else {
                decode_builtin_revert(&data)
            };
            FailureCause::Revert { reason, data }
        } else {
            FailureCause::Transport { message: err.message.clone() }
        };

        Self {
            code: Some(err.code),
            message: err.message.clone(),
            cause: Some(cause),
            timed_out: false,
        }
    }

    pub fn is_revert(&self) -> bool {
        matches!(self.cause, Some(FailureCause::Revert { .. }))
    }

    pub fn revert_data(&self) -> Option<&Bytes> {
        match &self.cause {
            Some(FailureCause::Revert { data, .. }) if !data.is_empty() => Some(data),
            _ => None,
        }
    }
}

impl fmt::Display for RpcFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

impl From<ProviderError> for RpcFailure {
    fn from(error: ProviderError) -> Self {
        match error.as_error_response() {
            Some(response) => RpcFailure::from_json_rpc(response),
            None => RpcFailure::transport(error.to_string()),
        }
    }
}

/// Revert data arrives either as a hex string or nested one level in an object.
fn revert_bytes_from_value(value: &serde_json::Value) -> Option<Bytes> {
    let raw = match value {
        serde_json::Value::String(s) => s.as_str(),
        serde_json::Value::Object(map) => map.get("data")?.as_str()?,
        _ => return None,
    };
    let stripped = raw.strip_prefix("0x").unwrap_or(raw);
    if stripped.is_empty() {
        return None;
    }
    hex::decode(stripped).ok().map(Bytes::from)
}

/// Errors surfaced by the bridging pipeline.
#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Quote failed: {0}")]
    Quote(#[from] QuoteError),

    #[error("Simulation reverted: {0}")]
    SimulationRevert(String),

    #[error("Transaction {tx_hash:?} reverted")]
    TransactionReverted { tx_hash: TxHash, reason: Option<String> },

    #[error("RPC error: {0}")]
    Rpc(RpcFailure),

    #[error("Tracking timed out after {polls} polls")]
    TrackingTimeout { polls: u32 },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Status API error: {0}")]
    StatusApi(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl BridgeError {
    /// The actionable, user-facing reason for this failure.
    pub fn reason(&self) -> String {
        match self {
            BridgeError::Validation(e) => e.to_string(),
            BridgeError::Quote(e) => e.to_string(),
            BridgeError::SimulationRevert(reason) => reason.clone(),
            BridgeError::TransactionReverted { reason, .. } => reason
                .clone()
                .unwrap_or_else(|| "Transaction reverted".to_string()),
            BridgeError::Rpc(failure) if failure.timed_out => {
                format!("RPC timeout: {}", failure.message)
            }
            BridgeError::Rpc(failure) => {
                crate::reason::extract(&crate::reason::ErrorReport::from(failure), None)
                    .unwrap_or_else(|| failure.to_string())
            }
            BridgeError::TrackingTimeout { polls } => {
                format!("Delivery status unknown after {} polls", polls)
            }
            other => other.to_string(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, BridgeError::Validation(_))
    }
}

impl From<RpcFailure> for BridgeError {
    fn from(failure: RpcFailure) -> Self {
        BridgeError::Rpc(failure)
    }
}

impl From<ProviderError> for BridgeError {
    fn from(error: ProviderError) -> Self {
        BridgeError::Rpc(error.into())
    }
}

impl From<ethers::abi::Error> for BridgeError {
    fn from(error: ethers::abi::Error) -> Self {
        BridgeError::Deserialization(format!("ABI error: {}", error))
    }
}

impl From<ethers::contract::AbiError> for BridgeError {
    fn from(error: ethers::contract::AbiError) -> Self {
        BridgeError::Deserialization(format!("ABI error: {}", error))
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(error: reqwest::Error) -> Self {
        BridgeError::StatusApi(error.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(error: serde_json::Error) -> Self {
        BridgeError::Deserialization(error.to_string())
    }
}
