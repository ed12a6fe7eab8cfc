//! In-memory chain answering calls by ABI selector.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use ethers::abi::Token;
use ethers::types::{Address, Bytes, TransactionReceipt, TxHash, H160, H256, U256, U64};

use crate::chainadapter::{CallSpec, ChainReader, TransactionSigner};
use crate::error::RpcFailure;
use crate::evm::contracts::{bridge_contract, erc721_contract, ERC721_INTERFACE_ID};
use crate::evm::events::tests::message_sent_log;
use crate::registry::{BASE_BRIDGE, BASE_EID, CONFLUX_BRIDGE};
use crate::utils::pad_address;

pub(crate) const CALLER: Address = H160([0xca; 20]);
pub(crate) const TOKEN: Address = H160([0x70; 20]);
pub(crate) const STRANGER: Address = H160([0x5e; 20]);

pub(crate) struct MockState {
    pub owners: HashMap<U256, Address>,
    pub approved: HashMap<U256, Address>,
    pub approved_for_all: bool,
    pub is_erc721: bool,
    /// Makes `isERC721` revert so callers fall back to ERC-165.
    pub is_erc721_reverts: bool,
    pub supports_erc721_interface: bool,
    pub supported: bool,
    pub peers: HashMap<u32, H256>,
    /// `Err` holds revert data.
    pub quote: Result<(U256, U256), Bytes>,
    /// `None` makes estimation fail.
    pub gas_estimate: Option<U256>,
    pub simulation_revert: Option<Bytes>,
    pub receipt_status: u64,
    /// `false` keeps receipts from ever showing up.
    pub mined: bool,
    pub guid: Option<H256>,
    pub original_token: Address,

    pub calls: Vec<String>,
    pub quoted_with: Vec<Bytes>,
    pub sent: Vec<(CallSpec, U256)>,
    receipts: HashMap<TxHash, TransactionReceipt>,
}

pub(crate) struct MockChain {
    state: Mutex<MockState>,
}

/// Source bridge on Conflux with a correct Base peer, caller owning token 7
/// with the bridge approved, and a 1e15 native fee.
impl Default for MockChain {
    fn default() -> Self {
        let mut owners = HashMap::new();
        owners.insert(U256::from(7), CALLER);
        let mut approved = HashMap::new();
        approved.insert(U256::from(7), CONFLUX_BRIDGE);
        let mut peers = HashMap::new();
        peers.insert(BASE_EID, pad_address(BASE_BRIDGE));

        Self {
            state: Mutex::new(MockState {
                owners,
                approved,
                approved_for_all: false,
                is_erc721: true,
                is_erc721_reverts: false,
                supports_erc721_interface: true,
                supported: true,
                peers,
                quote: Ok((U256::exp10(15), U256::zero())),
                gas_estimate: Some(U256::from(300_000)),
                simulation_revert: None,
                receipt_status: 1,
                mined: true,
                guid: Some(H256::repeat_byte(0x9a)),
                original_token: Address::zero(),
                calls: Vec::new(),
                quoted_with: Vec::new(),
                sent: Vec::new(),
                receipts: HashMap::new(),
            }),
        }
    }
}

fn method_name(data: &[u8]) -> Option<String> {
    let selector = data.get(..4)?;
    [erc721_contract().ok()?, bridge_contract().ok()?]
        .into_iter()
        .flat_map(|contract| contract.abi().functions())
        .find(|f| &f.short_signature()[..] == selector)
        .map(|f| f.name.clone())
}

fn word(data: &[u8], index: usize) -> U256 {
    let start = 4 + index * 32;
    data.get(start..start + 32)
        .map(U256::from_big_endian)
        .unwrap_or_default()
}

fn encoded(tokens: &[Token]) -> Result<Bytes, RpcFailure> {
    Ok(Bytes::from(ethers::abi::encode(tokens)))
}

impl MockChain {
    pub(crate) fn with<F: FnOnce(&mut MockState)>(self, f: F) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn called(&self, method: &str) -> bool {
        self.calls().iter().any(|c| c == method)
    }

    pub(crate) fn quoted_with(&self) -> Vec<Bytes> {
        self.state.lock().unwrap().quoted_with.clone()
    }

    pub(crate) fn sent(&self) -> Vec<(CallSpec, U256)> {
        self.state.lock().unwrap().sent.clone()
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn chain_id(&self) -> Result<u64, RpcFailure> {
        Ok(1030)
    }

    async fn call(&self, call: &CallSpec) -> Result<Bytes, RpcFailure> {
        let data = call.data.as_ref();
        let name = method_name(data).ok_or_else(|| RpcFailure::revert(Bytes::default()))?;
        let mut state = self.state.lock().unwrap();
        state.calls.push(name.clone());

        match name.as_str() {
            "ownerOf" => match state.owners.get(&word(data, 0)) {
                Some(owner) => encoded(&[Token::Address(*owner)]),
                None => {
                    let mut revert = ethers::utils::id("ERC721NonexistentToken(uint256)").to_vec();
                    revert.extend(ethers::abi::encode(&[Token::Uint(word(data, 0))]));
                    Err(RpcFailure::revert(revert.into()))
                }
            },
            "getApproved" => {
                let approved = state.approved.get(&word(data, 0)).copied().unwrap_or_default();
                encoded(&[Token::Address(approved)])
            }
            "isApprovedForAll" => encoded(&[Token::Bool(state.approved_for_all)]),
            "supportsInterface" => {
                let asked = data.get(4..8).unwrap_or_default();
                let supported = state.supports_erc721_interface && asked == &ERC721_INTERFACE_ID[..];
                encoded(&[Token::Bool(supported)])
            }
            "isERC721" if state.is_erc721_reverts => Err(RpcFailure::revert(Bytes::default())),
            "isERC721" => encoded(&[Token::Bool(state.is_erc721)]),
            "supportedTokens" => encoded(&[Token::Bool(state.supported)]),
            "peers" => {
                let peer = state.peers.get(&word(data, 0).low_u32()).copied().unwrap_or_default();
                encoded(&[Token::FixedBytes(peer.as_bytes().to_vec())])
            }
            "wrapperToOriginal" => encoded(&[Token::Address(state.original_token)]),
            "quoteBridgeSend" => {
                state.quoted_with.push(call.data.clone());
                match &state.quote {
                    Ok((native, alt)) => encoded(&[Token::Uint(*native), Token::Uint(*alt)]),
                    Err(revert) => Err(RpcFailure::revert(revert.clone())),
                }
            }
            // Writes reaching `call` are simulations.
            _ => match &state.simulation_revert {
                Some(revert) => Err(RpcFailure::revert(revert.clone())),
                None => Ok(Bytes::default()),
            },
        }
    }

    async fn estimate_gas(&self, _call: &CallSpec) -> Result<U256, RpcFailure> {
        self.state
            .lock()
            .unwrap()
            .gas_estimate
            .ok_or_else(|| RpcFailure::transport("eth_estimateGas: connection refused"))
    }

    async fn transaction_receipt(&self, hash: TxHash) -> Result<Option<TransactionReceipt>, RpcFailure> {
        Ok(self.state.lock().unwrap().receipts.get(&hash).cloned())
    }
}

#[async_trait]
impl TransactionSigner for MockChain {
    fn address(&self) -> Address {
        CALLER
    }

    async fn send_transaction(&self, call: &CallSpec, gas_limit: U256) -> Result<TxHash, RpcFailure> {
        let mut state = self.state.lock().unwrap();
        state.sent.push((call.clone(), gas_limit));
        let hash = H256::from_low_u64_be(state.sent.len() as u64);

        let mut logs = Vec::new();
        if method_name(call.data.as_ref()).as_deref() == Some("bridgeSend") {
            if let Some(guid) = state.guid {
                logs.push(message_sent_log(call.to, guid));
            }
        }
        let receipt = TransactionReceipt {
            transaction_hash: hash,
            status: Some(U64::from(state.receipt_status)),
            logs,
            ..Default::default()
        };
        if state.mined {
            state.receipts.insert(hash, receipt);
        }
        Ok(hash)
    }
}

pub(crate) fn stranger_owns(token_id: u64) -> impl FnOnce(&mut MockState) {
    move |state| {
        state.owners.insert(U256::from(token_id), STRANGER);
    }
}
