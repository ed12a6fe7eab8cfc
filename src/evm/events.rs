use ethers::abi::{RawLog, Token};
use ethers::types::{Address, Log, TransactionReceipt, H256};
use tracing::{debug, info};

use crate::evm::contracts::{bridge_contract, endpoint_contract};

/// Offset of the GUID inside an encoded v2 packet:
/// version(1) nonce(8) srcEid(4) sender(32) dstEid(4) receiver(32).
const PACKET_GUID_OFFSET: usize = 81;

/// One way of reading a message id out of a log entry.
pub trait LogDecoder: Send + Sync {
    fn name(&self) -> &'static str;

    /// `None` if the log is not one this decoder understands.
    fn decode(&self, log: &Log) -> Option<H256>;
}

fn raw(log: &Log) -> RawLog {
    RawLog {
        topics: log.topics.clone(),
        data: log.data.to_vec(),
    }
}

/// The bridge's own `MessageSent(bytes32 indexed guid, ...)` event.
#[derive(Debug, Clone, Default)]
pub struct MessageSentDecoder {
    /// Only accept logs from this emitter when set.
    pub emitter: Option<Address>,
}

impl LogDecoder for MessageSentDecoder {
    fn name(&self) -> &'static str {
        "MessageSent"
    }

    fn decode(&self, log: &Log) -> Option<H256> {
        if self.emitter.map_or(false, |emitter| emitter != log.address) {
            return None;
        }
        let event = bridge_contract().ok()?.abi().event("MessageSent").ok()?;
        if log.topics.first() != Some(&event.signature()) {
            return None;
        }
        let parsed = event.parse_log(raw(log)).ok()?;
        parsed
            .params
            .into_iter()
            .find(|p| p.name == "guid")
            .and_then(|p| match p.value {
                Token::FixedBytes(bytes) if bytes.len() == 32 => Some(H256::from_slice(&bytes)),
                _ => None,
            })
    }
}

/// The endpoint's `PacketSent(bytes encodedPayload, bytes options, address sendLibrary)`.
#[derive(Debug, Clone, Default)]
pub struct PacketSentDecoder;

impl LogDecoder for PacketSentDecoder {
    fn name(&self) -> &'static str {
        "PacketSent"
    }

    fn decode(&self, log: &Log) -> Option<H256> {
        let event = endpoint_contract().ok()?.abi().event("PacketSent").ok()?;
        if log.topics.first() != Some(&event.signature()) {
            return None;
        }
        let parsed = event.parse_log(raw(log)).ok()?;
        let payload = parsed
            .params
            .into_iter()
            .find(|p| p.name == "encodedPayload")?
            .value
            .into_bytes()?;
        payload
            .get(PACKET_GUID_OFFSET..PACKET_GUID_OFFSET + 32)
            .map(H256::from_slice)
    }
}

/// Recovers the cross-chain message id from a confirmed receipt.
///
/// Decoders run in order; within a decoder logs are scanned in receipt order
/// and anything that does not decode is skipped.
pub struct MessageIdExtractor {
    decoders: Vec<Box<dyn LogDecoder>>,
}

impl MessageIdExtractor {
    pub fn new(decoders: Vec<Box<dyn LogDecoder>>) -> Self {
        Self { decoders }
    }

    /// Bridge event first, endpoint packet as a fallback.
    pub fn for_bridge(bridge: Address) -> Self {
        Self::new(vec![
            Box::new(MessageSentDecoder { emitter: Some(bridge) }),
            Box::new(PacketSentDecoder),
        ])
    }

    pub fn extract(&self, receipt: &TransactionReceipt) -> Option<H256> {
        for decoder in &self.decoders {
            for (index, log) in receipt.logs.iter().enumerate() {
                match decoder.decode(log) {
                    Some(id) => {
                        info!("Extracted message id {:?} via {}", id, decoder.name());
                        return Some(id);
                    }
                    None => debug!(index, decoder = decoder.name(), "Log skipped"),
                }
            }
        }
        debug!(
            "No message id in {} logs of {:?}",
            receipt.logs.len(),
            receipt.transaction_hash
        );
        None
    }
}

impl Default for MessageIdExtractor {
    fn default() -> Self {
        Self::new(vec![
            Box::new(MessageSentDecoder::default()),
            Box::new(PacketSentDecoder),
        ])
    }
}
