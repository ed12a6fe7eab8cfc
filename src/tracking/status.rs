use serde::Deserialize;

use crate::types::MessageStatus;

/// Terminal failure states reported by the status service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Failed,
    Blocked,
    PayloadStored,
    ApplicationBurned,
    ApplicationSkipped,
    UnresolvableCommand,
    MalformedCommand,
}

/// Remote status name, decoded as soon as it leaves the wire.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum ScanStatus {
    Delivered,
    Failed(FailureKind),
    /// Anything else (`INFLIGHT`, `CONFIRMING`, new names) is still moving.
    InFlight(String),
}

impl From<String> for ScanStatus {
    fn from(name: String) -> Self {
        ScanStatus::from(name.as_str())
    }
}

impl From<&str> for ScanStatus {
    fn from(name: &str) -> Self {
        match name {
            "DELIVERED" => ScanStatus::Delivered,
            "FAILED" => ScanStatus::Failed(FailureKind::Failed),
            "BLOCKED" => ScanStatus::Failed(FailureKind::Blocked),
            "PAYLOAD_STORED" => ScanStatus::Failed(FailureKind::PayloadStored),
            "APPLICATION_BURNED" => ScanStatus::Failed(FailureKind::ApplicationBurned),
            "APPLICATION_SKIPPED" => ScanStatus::Failed(FailureKind::ApplicationSkipped),
            "UNRESOLVABLE_COMMAND" => ScanStatus::Failed(FailureKind::UnresolvableCommand),
            "MALFORMED_COMMAND" => ScanStatus::Failed(FailureKind::MalformedCommand),
            other => ScanStatus::InFlight(other.to_string()),
        }
    }
}

impl ScanStatus {
    /// The remote service never yields `Unknown`; only the poll budget does.
    pub fn message_status(&self) -> MessageStatus {
        match self {
            ScanStatus::Delivered => MessageStatus::Delivered,
            ScanStatus::Failed(_) => MessageStatus::Failed,
            ScanStatus::InFlight(_) => MessageStatus::Pending,
        }
    }
}
