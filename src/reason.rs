//! Best-effort decoding of pipeline failures into a readable reason.
//!
//! A failure is flattened into an [`ErrorReport`] and then handed to an ordered
//! list of strategies; the first one that yields a non-empty string wins.

use ethers::abi::{Abi, ParamType, Token};
use serde::Serialize;
use tracing::debug;

use crate::error::{BridgeError, FailureCause, RpcFailure};

/// Selector of `Error(string)`.
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// Selector of `Panic(uint256)`.
const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

/// Every layer of a failure that may carry a reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub literal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<FailureCause>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
}

impl ErrorReport {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            literal: Some(text.into()),
            ..Default::default()
        }
    }

    fn is_empty(&self) -> bool {
        self == &ErrorReport::default()
    }
}

impl From<&RpcFailure> for ErrorReport {
    fn from(failure: &RpcFailure) -> Self {
        Self {
            literal: None,
            short_message: failure.timed_out.then(|| failure.message.clone()),
            cause: failure.cause.clone(),
            message: Some(failure.message.clone()),
            code: failure.code,
        }
    }
}

impl From<&BridgeError> for ErrorReport {
    fn from(error: &BridgeError) -> Self {
        match error {
            BridgeError::Rpc(failure) => failure.into(),
            BridgeError::Validation(e) => Self {
                short_message: Some(e.to_string()),
                message: Some(error.to_string()),
                ..Default::default()
            },
            BridgeError::Quote(e) => Self {
                short_message: Some(e.to_string()),
                message: Some(error.to_string()),
                ..Default::default()
            },
            BridgeError::SimulationRevert(reason) => Self {
                short_message: Some(reason.clone()),
                message: Some(error.to_string()),
                ..Default::default()
            },
            BridgeError::TransactionReverted { reason, .. } => Self {
                short_message: reason.clone(),
                message: Some(error.to_string()),
                ..Default::default()
            },
            other => Self {
                message: Some(other.to_string()),
                ..Default::default()
            },
        }
    }
}

type Strategy = fn(&ErrorReport, Option<&Abi>) -> Option<String>;

/// Tried in order; the first non-empty result is the reason.
const STRATEGIES: [(&str, Strategy); 7] = [
    ("literal", from_literal),
    ("short_message", from_short_message),
    ("cause_reason", from_cause_reason),
    ("cause_message", from_cause_message),
    ("abi_revert_data", from_revert_data),
    ("message", from_message),
    ("json", from_json_dump),
];

fn non_empty(s: &Option<String>) -> Option<String> {
    s.as_ref().filter(|s| !s.trim().is_empty()).cloned()
}

fn from_literal(report: &ErrorReport, _: Option<&Abi>) -> Option<String> {
    non_empty(&report.literal)
}

fn from_short_message(report: &ErrorReport, _: Option<&Abi>) -> Option<String> {
    non_empty(&report.short_message)
}

fn from_cause_reason(report: &ErrorReport, _: Option<&Abi>) -> Option<String> {
    match &report.cause {
        Some(FailureCause::Revert { reason, .. }) => non_empty(reason),
        _ => None,
    }
}

fn from_cause_message(report: &ErrorReport, _: Option<&Abi>) -> Option<String> {
    match &report.cause {
        Some(FailureCause::Transport { message }) => non_empty(&Some(message.clone())),
        _ => None,
    }
}

fn from_revert_data(report: &ErrorReport, abi: Option<&Abi>) -> Option<String> {
    match (&report.cause, abi) {
        (Some(FailureCause::Revert { data, .. }), Some(abi)) => decode_custom_error(data, abi),
        _ => None,
    }
}

fn from_message(report: &ErrorReport, _: Option<&Abi>) -> Option<String> {
    non_empty(&report.message)
}

fn from_json_dump(report: &ErrorReport, _: Option<&Abi>) -> Option<String> {
    if report.is_empty() {
        return None;
    }
    serde_json::to_string(report).ok()
}

/// Returns the best available reason for `report`, or `None` if nothing usable exists.
pub fn extract(report: &ErrorReport, abi: Option<&Abi>) -> Option<String> {
    STRATEGIES.iter().find_map(|(name, strategy)| {
        let reason = strategy(report, abi)?;
        debug!(strategy = *name, "Decoded failure reason");
        Some(reason)
    })
}

/// Convenience wrapper over [`extract`] for pipeline errors.
pub fn extract_from_error(error: &BridgeError, abi: Option<&Abi>) -> Option<String> {
    extract(&ErrorReport::from(error), abi)
}

/// Decodes the standard `Error(string)` and `Panic(uint256)` payloads.
pub fn decode_builtin_revert(data: &[u8]) -> Option<String> {
    if data.len() < 4 {
        return None;
    }
    let (selector, body) = data.split_at(4);

    if selector == ERROR_STRING_SELECTOR {
        match ethers::abi::decode(&[ParamType::String], body).ok()?.pop()? {
            Token::String(reason) => Some(reason),
            _ => None,
        }
    } else if selector == PANIC_SELECTOR {
        let code = ethers::abi::decode(&[ParamType::Uint(256)], body)
            .ok()?
            .pop()?
            .into_uint()?;
        Some(format!("Panic(0x{:02x})", code.low_u64()))
    } else {
        None
    }
}

/// Matches the revert selector against the ABI's custom errors.
pub fn decode_custom_error(data: &[u8], abi: &Abi) -> Option<String> {
    if data.len() < 4 {
        return None;
    }
    let (selector, body) = data.split_at(4);

    for error in abi.errors.values().flatten() {
        let kinds: Vec<ParamType> = error.inputs.iter().map(|p| p.kind.clone()).collect();
        let signature = format!(
            "{}({})",
            error.name,
            kinds.iter().map(|k| k.to_string()).collect::<Vec<_>>().join(",")
        );
        if ethers::utils::id(&signature)[..] != selector[..] {
            continue;
        }
        let tokens = ethers::abi::decode(&kinds, body).ok()?;
        if tokens.is_empty() {
            return Some(error.name.clone());
        }
        let args: Vec<String> = tokens.iter().map(format_token).collect();
        return Some(format!("{}({})", error.name, args.join(", ")));
    }
    None
}

fn format_token(token: &Token) -> String {
    match token {
        Token::Uint(v) | Token::Int(v) => v.to_string(),
        Token::Address(a) => format!("{:?}", a),
        Token::String(s) => s.clone(),
        Token::Bool(b) => b.to_string(),
        Token::Bytes(b) | Token::FixedBytes(b) => format!("0x{}", hex::encode(b)),
        other => other.to_string(),
    }
}
