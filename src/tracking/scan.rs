use async_trait::async_trait;
use ethers::types::{Address, TxHash, H256};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::error::BridgeError;
use crate::registry::{Network, ScanConfig};
use crate::tracking::status::ScanStatus;

/// What to look a message up by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusQuery {
    SourceTx { network: Network, tx_hash: TxHash },
    Guid { network: Network, guid: H256 },
}

impl StatusQuery {
    pub fn network(&self) -> Network {
        match self {
            StatusQuery::SourceTx { network, .. } | StatusQuery::Guid { network, .. } => *network,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pathway {
    pub src_eid: u32,
    pub dst_eid: u32,
    #[serde(default)]
    pub sender: Option<PathwayEnd>,
    #[serde(default)]
    pub receiver: Option<PathwayEnd>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PathwayEnd {
    pub address: Address,
    #[serde(default)]
    pub chain: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainTx {
    #[serde(default)]
    pub tx_hash: Option<TxHash>,
    /// Seconds since the epoch.
    #[serde(default)]
    pub block_timestamp: Option<u64>,
    #[serde(default)]
    pub block_number: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MessageSide {
    #[serde(default)]
    pub tx: Option<ChainTx>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusField {
    pub name: ScanStatus,
    #[serde(default)]
    pub message: Option<String>,
}

/// One message as the status service reports it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanMessage {
    #[serde(default)]
    pub pathway: Option<Pathway>,
    #[serde(default)]
    pub source: MessageSide,
    #[serde(default)]
    pub destination: MessageSide,
    pub status: StatusField,
    #[serde(default)]
    pub guid: Option<H256>,
}

impl ScanMessage {
    pub fn source_tx(&self) -> Option<&ChainTx> {
        self.source.tx.as_ref()
    }

    pub fn destination_tx(&self) -> Option<&ChainTx> {
        self.destination.tx.as_ref()
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    data: Vec<ScanMessage>,
}

/// Source of delivery status for the tracker.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// `Ok(None)` when the service does not know the message yet.
    async fn fetch(&self, query: &StatusQuery) -> Result<Option<ScanMessage>, BridgeError>;
}

/// HTTP client for the LayerZero scan API
#[derive(Debug, Clone)]
pub struct ScanClient {
    http: Client,
    config: ScanConfig,
}

impl ScanClient {
    pub fn new(config: ScanConfig) -> Result<Self, BridgeError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BridgeError::Configuration(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    fn base_url(&self, network: Network) -> &str {
        let url = match network {
            Network::Mainnet => &self.config.mainnet_url,
            Network::Testnet => &self.config.testnet_url,
        };
        url.trim_end_matches('/')
    }

    pub fn url_for(&self, query: &StatusQuery) -> String {
        let base = self.base_url(query.network());
        match query {
            StatusQuery::SourceTx { tx_hash, .. } => format!("{}/v1/messages/tx/{:?}", base, tx_hash),
            StatusQuery::Guid { guid, .. } => format!("{}/v1/messages/guid/{:?}", base, guid),
        }
    }

    async fn get_messages(&self, url: &str) -> Result<Vec<ScanMessage>, BridgeError> {
        debug!("GET {}", url);
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::StatusApi(format!("API error: {}", status)));
        }
        let body: MessagesResponse = response.json().await?;
        Ok(body.data)
    }

    pub async fn message_by_tx(&self, network: Network, tx_hash: TxHash) -> Result<Option<ScanMessage>, BridgeError> {
        self.fetch(&StatusQuery::SourceTx { network, tx_hash }).await
    }

    pub async fn message_by_guid(&self, network: Network, guid: H256) -> Result<Option<ScanMessage>, BridgeError> {
        self.fetch(&StatusQuery::Guid { network, guid }).await
    }

    /// Recent messages sent or received by `wallet`.
    #[instrument(skip(self))]
    pub async fn wallet_messages(&self, network: Network, wallet: Address) -> Result<Vec<ScanMessage>, BridgeError> {
        let url = format!(
            "{}/v1/messages/wallet/{:?}?limit={}",
            self.base_url(network),
            wallet,
            self.config.history_limit
        );
        self.get_messages(&url).await
    }

    /// Wallet history restricted to messages leaving endpoint `src_eid`.
    pub async fn wallet_messages_from(
        &self,
        network: Network,
        wallet: Address,
        src_eid: u32,
    ) -> Result<Vec<ScanMessage>, BridgeError> {
        let messages = self.wallet_messages(network, wallet).await?;
        Ok(filter_by_source(messages, src_eid))
    }
}

pub fn filter_by_source(messages: Vec<ScanMessage>, src_eid: u32) -> Vec<ScanMessage> {
    messages
        .into_iter()
        .filter(|m| m.pathway.as_ref().map_or(false, |p| p.src_eid == src_eid))
        .collect()
}

#[async_trait]
impl StatusSource for ScanClient {
    async fn fetch(&self, query: &StatusQuery) -> Result<Option<ScanMessage>, BridgeError> {
        let url = self.url_for(query);
        Ok(self.get_messages(&url).await?.into_iter().next())
    }
}

/// Converts the service's seconds into milliseconds.
pub fn seconds_to_millis(seconds: u64) -> u64 {
    seconds.saturating_mul(1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
      "data": [{
        "pathway": {"srcEid": 30212, "dstEid": 30184,
                    "sender": {"address": "0x8078efb3cee419abde856b6f5f470cc9d8971319", "chain": "conflux"}},
        "source": {"tx": {"txHash": "0x1111111111111111111111111111111111111111111111111111111111111111",
                          "blockTimestamp": 1700000000, "blockNumber": 1}},
        "destination": {"tx": {"txHash": "0x2222222222222222222222222222222222222222222222222222222222222222",
                               "blockTimestamp": 1700000300}},
        "status": {"name": "DELIVERED", "message": "Executor transaction confirmed"},
        "guid": "0x3333333333333333333333333333333333333333333333333333333333333333"
      }]
    }"#;

    #[test]
    fn test_decodes_delivered_message() {
        let body: MessagesResponse = serde_json::from_str(SAMPLE).unwrap();
        let msg = &body.data[0];
        assert_eq!(msg.status.name, ScanStatus::Delivered);
        assert_eq!(msg.pathway.as_ref().unwrap().dst_eid, 30184);
        assert_eq!(msg.destination_tx().unwrap().tx_hash, Some(H256::repeat_byte(0x22)));
        assert_eq!(msg.source_tx().unwrap().block_timestamp, Some(1_700_000_000));
        assert_eq!(msg.guid, Some(H256::repeat_byte(0x33)));
    }

    #[test]
    fn test_missing_destination_is_tolerated() {
        let body: MessagesResponse = serde_json::from_str(
            r#"{"data":[{"source":{"tx":{"txHash":"0x1111111111111111111111111111111111111111111111111111111111111111"}},
                         "status":{"name":"INFLIGHT"}}]}"#,
        )
        .unwrap();
        assert!(body.data[0].destination_tx().is_none());
        assert_eq!(body.data[0].status.name, ScanStatus::InFlight("INFLIGHT".to_string()));
    }

    #[test]
    fn test_empty_response() {
        let body: MessagesResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert!(body.data.is_empty());
    }

    #[test]
    fn test_urls_follow_network() {
        let client = ScanClient::new(ScanConfig::default()).unwrap();
        let tx = H256::repeat_byte(0xab);
        assert_eq!(
            client.url_for(&StatusQuery::SourceTx { network: Network::Mainnet, tx_hash: tx }),
            format!("https://scan.layerzero-api.com/v1/messages/tx/0x{}", "ab".repeat(32))
        );
        assert!(client
            .url_for(&StatusQuery::Guid { network: Network::Testnet, guid: tx })
            .starts_with("https://scan-testnet.layerzero-api.com/v1/messages/guid/0x"));
    }

    #[test]
    fn test_filter_by_source() {
        let body: MessagesResponse = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(filter_by_source(body.data.clone(), 30212).len(), 1);
        assert!(filter_by_source(body.data, 30110).is_empty());
    }
}
