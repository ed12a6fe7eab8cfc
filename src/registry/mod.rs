mod config;
pub use config::{GasConfig, ScanConfig, TrackerConfig};

use std::collections::HashSet;

use ethers::types::{Address, H160, H256};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{BridgeError, ValidationError};
use crate::utils::pad_address;

pub const CONFLUX_CHAIN_ID: u64 = 1030;
pub const BASE_CHAIN_ID: u64 = 8453;
pub const ARBITRUM_CHAIN_ID: u64 = 42161;

pub const CONFLUX_EID: u32 = 30212;
pub const BASE_EID: u32 = 30184;
pub const ARBITRUM_EID: u32 = 30110;

pub const CONFLUX_BRIDGE: Address = H160([
    0x80, 0x78, 0xef, 0xb3, 0xce, 0xe4, 0x19, 0xab, 0xde, 0x85,
    0x6b, 0x6f, 0x5f, 0x47, 0x0c, 0xc9, 0xd8, 0x97, 0x13, 0x19,
]);

pub const BASE_BRIDGE: Address = H160([
    0xd9, 0x7d, 0xec, 0x9d, 0x62, 0x01, 0x1e, 0x63, 0xad, 0x3b,
    0xd2, 0x7b, 0x51, 0xe3, 0x3c, 0x8d, 0xf3, 0xac, 0x44, 0xcf,
]);

pub const ARBITRUM_BRIDGE: Address = H160([
    0x16, 0xde, 0xd1, 0x8b, 0xd0, 0xea, 0xd6, 0x9b, 0x33, 0x1b,
    0x02, 0x22, 0x11, 0x0f, 0x74, 0xb5, 0x71, 0x66, 0x27, 0xf8,
]);

/// Average delivery time used when a route has no entry of its own.
pub const DEFAULT_DELIVERY_MS: u64 = 300_000;

const MAINNET_ROUTE_DELIVERY_MS: u64 = 420_000;

/// Bridge deployment on one chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub bridge_address: Address,
    pub endpoint_id: u32,
}

impl ChainConfig {
    pub fn new(chain_id: u64, name: impl Into<String>, bridge_address: Address, endpoint_id: u32) -> Self {
        Self {
            chain_id,
            name: name.into(),
            bridge_address,
            endpoint_id,
        }
    }

    /// The value `peers(endpoint_id)` must hold on a bridge that sends here.
    pub fn expected_peer(&self) -> H256 {
        pad_address(self.bridge_address)
    }

    pub fn network(&self) -> Network {
        Network::from_eid(self.endpoint_id)
    }
}

/// Historical average delivery time for one direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTiming {
    pub source_chain: u64,
    pub destination_chain: u64,
    pub average_delivery_ms: u64,
}

/// Which status-service host a message lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    /// V2 mainnet endpoints are numbered 30xxx, testnets 40xxx.
    pub fn from_eid(eid: u32) -> Self {
        if eid >= 40_000 {
            Network::Testnet
        } else {
            Network::Mainnet
        }
    }
}

/// Every supported chain plus per-route delivery heuristics.
///
/// Loaded once and shared read-only between operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfigTable {
    pub chains: Vec<ChainConfig>,
    #[serde(default)]
    pub routes: Vec<RouteTiming>,
    #[serde(default = "default_delivery_ms")]
    pub default_delivery_ms: u64,
}

fn default_delivery_ms() -> u64 {
    DEFAULT_DELIVERY_MS
}

impl ChainConfigTable {
    pub fn new(chains: Vec<ChainConfig>) -> Self {
        Self {
            chains,
            routes: Vec::new(),
            default_delivery_ms: DEFAULT_DELIVERY_MS,
        }
    }

    /// Conflux eSpace, Base and Arbitrum One deployments.
    pub fn mainnet() -> Self {
        let chains = vec![
            ChainConfig::new(
                CONFLUX_CHAIN_ID,
                "Conflux eSpace",
                CONFLUX_BRIDGE,
                CONFLUX_EID,
            ),
            ChainConfig::new(
                BASE_CHAIN_ID,
                "Base",
                BASE_BRIDGE,
                BASE_EID,
            ),
            ChainConfig::new(
                ARBITRUM_CHAIN_ID,
                "Arbitrum One",
                ARBITRUM_BRIDGE,
                ARBITRUM_EID,
            ),
        ];

        let ids: Vec<u64> = chains.iter().map(|c| c.chain_id).collect();
        let mut table = Self::new(chains);
        for &src in &ids {
            for &dst in ids.iter().filter(|&&dst| dst != src) {
                table = table.with_route(src, dst, MAINNET_ROUTE_DELIVERY_MS);
            }
        }
        table
    }

    /// Parses and validates a JSON table.
    pub fn from_json(json: &str) -> Result<Self, BridgeError> {
        let table: Self = serde_json::from_str(json)?;
        table.validate()?;
        info!("Loaded {} chain configurations", table.chains.len());
        Ok(table)
    }

    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.chains.is_empty() {
            return Err(BridgeError::Configuration("No chains configured".to_string()));
        }

        let mut chain_ids = HashSet::new();
        let mut eids = HashSet::new();
        for chain in &self.chains {
            if chain.chain_id == 0 {
                return Err(BridgeError::Configuration("Chain ID cannot be zero".to_string()));
            }
            if chain.bridge_address == Address::zero() {
                return Err(BridgeError::Configuration(format!(
                    "Bridge address for chain {} cannot be zero address",
                    chain.chain_id
                )));
            }
            if !chain_ids.insert(chain.chain_id) {
                return Err(BridgeError::Configuration(format!(
                    "Duplicate chain id {}",
                    chain.chain_id
                )));
            }
            if !eids.insert(chain.endpoint_id) {
                return Err(BridgeError::Configuration(format!(
                    "Duplicate endpoint id {}",
                    chain.endpoint_id
                )));
            }
        }
        Ok(())
    }

    pub fn with_chain(mut self, chain: ChainConfig) -> Self {
        self.chains.retain(|c| c.chain_id != chain.chain_id);
        self.chains.push(chain);
        self
    }

    pub fn with_route(mut self, source_chain: u64, destination_chain: u64, average_delivery_ms: u64) -> Self {
        self.routes
            .retain(|r| !(r.source_chain == source_chain && r.destination_chain == destination_chain));
        self.routes.push(RouteTiming {
            source_chain,
            destination_chain,
            average_delivery_ms,
        });
        self
    }

    pub fn with_default_delivery_ms(mut self, ms: u64) -> Self {
        self.default_delivery_ms = ms;
        self
    }

    pub fn chain(&self, chain_id: u64) -> Result<&ChainConfig, ValidationError> {
        self.chains
            .iter()
            .find(|c| c.chain_id == chain_id)
            .ok_or(ValidationError::UnsupportedChain(chain_id))
    }

    /// Resolves both ends of a send; identical ends are rejected.
    pub fn route(&self, source_chain: u64, destination_chain: u64) -> Result<(&ChainConfig, &ChainConfig), ValidationError> {
        if source_chain == destination_chain {
            return Err(ValidationError::SameChain);
        }
        Ok((self.chain(source_chain)?, self.chain(destination_chain)?))
    }

    /// ETA heuristic for a route, falling back to the table default.
    pub fn average_delivery_ms(&self, source_chain: u64, destination_chain: u64) -> u64 {
        let average = self
            .routes
            .iter()
            .find(|r| r.source_chain == source_chain && r.destination_chain == destination_chain)
            .map(|r| r.average_delivery_ms)
            .unwrap_or(self.default_delivery_ms);
        debug!(source_chain, destination_chain, average, "Route delivery average");
        average
    }
}

impl Default for ChainConfigTable {
    fn default() -> Self {
        Self::mainnet()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::parse_address;

    #[test]
    fn test_mainnet_addresses() {
        let table = ChainConfigTable::mainnet();
        assert!(table.validate().is_ok());
        let conflux = table.chain(CONFLUX_CHAIN_ID).unwrap();
        assert_eq!(
            conflux.bridge_address,
            parse_address("0x8078EFb3CEe419Abde856B6F5f470CC9d8971319").unwrap()
        );
        let base = table.chain(BASE_CHAIN_ID).unwrap();
        assert_eq!(
            base.bridge_address,
            parse_address("0xd97deC9D62011e63AD3Bd27B51E33c8df3Ac44Cf").unwrap()
        );
        let arbitrum = table.chain(ARBITRUM_CHAIN_ID).unwrap();
        assert_eq!(
            arbitrum.bridge_address,
            parse_address("0x16dED18bd0ead69b331B0222110F74b5716627f8").unwrap()
        );
    }

    #[test]
    fn test_route_timings() {
        let table = ChainConfigTable::mainnet();
        assert_eq!(table.average_delivery_ms(CONFLUX_CHAIN_ID, BASE_CHAIN_ID), 420_000);
        assert_eq!(table.average_delivery_ms(ARBITRUM_CHAIN_ID, CONFLUX_CHAIN_ID), 420_000);
        assert_eq!(table.average_delivery_ms(1, BASE_CHAIN_ID), DEFAULT_DELIVERY_MS);
    }

    #[test]
    fn test_route_rejects_same_and_unknown() {
        let table = ChainConfigTable::mainnet();
        assert_eq!(
            table.route(BASE_CHAIN_ID, BASE_CHAIN_ID).unwrap_err(),
            ValidationError::SameChain
        );
        assert_eq!(
            table.route(BASE_CHAIN_ID, 1).unwrap_err(),
            ValidationError::UnsupportedChain(1)
        );
    }

    #[test]
    fn test_from_json_validates() {
        let json = r#"{
            "chains": [
                {"chain_id": 1, "name": "a", "bridge_address": "0x0000000000000000000000000000000000000001", "endpoint_id": 30101},
                {"chain_id": 2, "name": "b", "bridge_address": "0x0000000000000000000000000000000000000002", "endpoint_id": 30101}
            ]
        }"#;
        let err = ChainConfigTable::from_json(json).unwrap_err();
        assert!(err.to_string().contains("Duplicate endpoint id"));
    }

    #[test]
    fn test_from_json_defaults() {
        let json = r#"{
            "chains": [
                {"chain_id": 1, "name": "a", "bridge_address": "0x0000000000000000000000000000000000000001", "endpoint_id": 40161}
            ]
        }"#;
        let table = ChainConfigTable::from_json(json).unwrap();
        assert_eq!(table.default_delivery_ms, DEFAULT_DELIVERY_MS);
        assert_eq!(table.chain(1).unwrap().network(), Network::Testnet);
    }

    #[test]
    fn test_zero_bridge_rejected() {
        let table = ChainConfigTable::new(vec![ChainConfig::new(1, "a", Address::zero(), 30101)]);
        assert!(table.validate().is_err());
    }
}
