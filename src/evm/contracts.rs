//! ABI surface of the ERC-721 collections, the bridge and the messaging endpoint.
//!
//! ABIs are parsed once and shared. [`Erc721Contract`] and [`BridgeContract`]
//! are thin typed views over a [`ChainReader`]; write methods return the
//! [`CallSpec`] to hand to the submitter instead of sending anything.

use std::sync::OnceLock;

use ethers::abi::{Abi, Detokenize, Tokenize};
use ethers::contract::BaseContract;
use ethers::types::{Address, Bytes, H256, U256};

use crate::Result;
use crate::chainadapter::{CallSpec, ChainReader};
use crate::error::BridgeError;
use crate::types::{MessagingFee, TokenId};

/// ERC-165 interface id of ERC-721.
pub const ERC721_INTERFACE_ID: [u8; 4] = [0x80, 0xac, 0x58, 0xcd];

const ERC721_ABI_JSON: &str = r#"[
  {"type":"function","name":"approve","stateMutability":"nonpayable",
   "inputs":[{"name":"to","type":"address"},{"name":"tokenId","type":"uint256"}],"outputs":[]},
  {"type":"function","name":"ownerOf","stateMutability":"view",
   "inputs":[{"name":"tokenId","type":"uint256"}],"outputs":[{"name":"","type":"address"}]},
  {"type":"function","name":"getApproved","stateMutability":"view",
   "inputs":[{"name":"tokenId","type":"uint256"}],"outputs":[{"name":"","type":"address"}]},
  {"type":"function","name":"isApprovedForAll","stateMutability":"view",
   "inputs":[{"name":"owner","type":"address"},{"name":"operator","type":"address"}],
   "outputs":[{"name":"","type":"bool"}]},
  {"type":"function","name":"supportsInterface","stateMutability":"view",
   "inputs":[{"name":"interfaceId","type":"bytes4"}],"outputs":[{"name":"","type":"bool"}]},
  {"type":"error","name":"ERC721NonexistentToken","inputs":[{"name":"tokenId","type":"uint256"}]},
  {"type":"error","name":"ERC721IncorrectOwner",
   "inputs":[{"name":"sender","type":"address"},{"name":"tokenId","type":"uint256"},{"name":"owner","type":"address"}]},
  {"type":"error","name":"ERC721InsufficientApproval",
   "inputs":[{"name":"operator","type":"address"},{"name":"tokenId","type":"uint256"}]}
]"#;

const BRIDGE_ABI_JSON: &str = r#"[
  {"type":"function","name":"isERC721","stateMutability":"view",
   "inputs":[{"name":"_token","type":"address"}],"outputs":[{"name":"","type":"bool"}]},
  {"type":"function","name":"supportedTokens","stateMutability":"view",
   "inputs":[{"name":"","type":"address"}],"outputs":[{"name":"","type":"bool"}]},
  {"type":"function","name":"peers","stateMutability":"view",
   "inputs":[{"name":"_eid","type":"uint32"}],"outputs":[{"name":"","type":"bytes32"}]},
  {"type":"function","name":"wrapperToOriginal","stateMutability":"view",
   "inputs":[{"name":"","type":"address"}],"outputs":[{"name":"","type":"address"}]},
  {"type":"function","name":"originalToWrapper","stateMutability":"view",
   "inputs":[{"name":"","type":"address"}],"outputs":[{"name":"","type":"address"}]},
  {"type":"function","name":"quoteBridgeSend","stateMutability":"view",
   "inputs":[
     {"name":"_localToken","type":"address"},{"name":"_dstEid","type":"uint32"},
     {"name":"_to","type":"address"},{"name":"_tokenIds","type":"uint256[]"},
     {"name":"_options","type":"bytes"},{"name":"_payInLzToken","type":"bool"}],
   "outputs":[{"name":"fee","type":"tuple","components":[
     {"name":"nativeFee","type":"uint256"},{"name":"lzTokenFee","type":"uint256"}]}]},
  {"type":"function","name":"bridgeSend","stateMutability":"payable",
   "inputs":[
     {"name":"_localToken","type":"address"},{"name":"_dstEid","type":"uint32"},
     {"name":"_to","type":"address"},{"name":"_tokenIds","type":"uint256[]"},
     {"name":"_options","type":"bytes"},
     {"name":"_fee","type":"tuple","components":[
       {"name":"nativeFee","type":"uint256"},{"name":"lzTokenFee","type":"uint256"}]},
     {"name":"_refundAddress","type":"address"}],
   "outputs":[]},
  {"type":"function","name":"registerToken","stateMutability":"nonpayable",
   "inputs":[{"name":"_token","type":"address"}],"outputs":[]},
  {"type":"event","name":"MessageSent","anonymous":false,
   "inputs":[
     {"name":"guid","type":"bytes32","indexed":true},
     {"name":"dstEid","type":"uint32","indexed":false},
     {"name":"message","type":"bytes","indexed":false},
     {"name":"refundAddress","type":"address","indexed":false}]},
  {"type":"event","name":"TokenRegistered","anonymous":false,
   "inputs":[{"name":"token","type":"address","indexed":true}]},
  {"type":"error","name":"NoDVNConfigured","inputs":[]},
  {"type":"error","name":"NoPeer","inputs":[{"name":"eid","type":"uint32"}]},
  {"type":"error","name":"OnlyPeer","inputs":[{"name":"eid","type":"uint32"},{"name":"sender","type":"bytes32"}]},
  {"type":"error","name":"NotEnoughNative","inputs":[{"name":"msgValue","type":"uint256"}]},
  {"type":"error","name":"LzTokenUnavailable","inputs":[]},
  {"type":"error","name":"TokenNotSupported","inputs":[{"name":"token","type":"address"}]}
]"#;

const ENDPOINT_ABI_JSON: &str = r#"[
  {"type":"event","name":"PacketSent","anonymous":false,
   "inputs":[
     {"name":"encodedPayload","type":"bytes","indexed":false},
     {"name":"options","type":"bytes","indexed":false},
     {"name":"sendLibrary","type":"address","indexed":false}]}
]"#;

static ERC721: OnceLock<Result<BaseContract, String>> = OnceLock::new();
static BRIDGE: OnceLock<Result<BaseContract, String>> = OnceLock::new();
static ENDPOINT: OnceLock<Result<BaseContract, String>> = OnceLock::new();

fn load(
    cell: &'static OnceLock<Result<BaseContract, String>>,
    json: &str,
    name: &str,
) -> Result<&'static BaseContract> {
    cell.get_or_init(|| {
        serde_json::from_str::<Abi>(json)
            .map(BaseContract::from)
            .map_err(|e| e.to_string())
    })
    .as_ref()
    .map_err(|e| BridgeError::Configuration(format!("Invalid {} ABI: {}", name, e)))
}

pub fn erc721_contract() -> Result<&'static BaseContract> {
    load(&ERC721, ERC721_ABI_JSON, "ERC721")
}

pub fn bridge_contract() -> Result<&'static BaseContract> {
    load(&BRIDGE, BRIDGE_ABI_JSON, "bridge")
}

pub fn endpoint_contract() -> Result<&'static BaseContract> {
    load(&ENDPOINT, ENDPOINT_ABI_JSON, "endpoint")
}

/// Bridge ABI, used to decode its custom errors.
pub fn bridge_abi() -> Result<&'static Abi> {
    Ok(bridge_contract()?.abi())
}

pub fn erc721_abi() -> Result<&'static Abi> {
    Ok(erc721_contract()?.abi())
}

async fn read<T: Tokenize, D: Detokenize>(
    reader: &dyn ChainReader,
    contract: &BaseContract,
    to: Address,
    method: &str,
    args: T,
) -> Result<D> {
    let data = contract.encode(method, args)?;
    let raw = reader.call(&CallSpec::new(to, data)).await?;
    Ok(contract.decode_output(method, raw)?)
}

/// Arguments shared by `quoteBridgeSend` and `bridgeSend`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendParams {
    pub local_token: Address,
    pub dst_eid: u32,
    pub recipient: Address,
    pub token_ids: Vec<TokenId>,
    pub options: Bytes,
}

pub struct Erc721Contract<'a> {
    reader: &'a dyn ChainReader,
    address: Address,
}

impl<'a> Erc721Contract<'a> {
    pub fn new(reader: &'a dyn ChainReader, address: Address) -> Self {
        Self { reader, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub async fn owner_of(&self, token_id: TokenId) -> Result<Address> {
        read(self.reader, erc721_contract()?, self.address, "ownerOf", token_id).await
    }

    pub async fn get_approved(&self, token_id: TokenId) -> Result<Address> {
        read(self.reader, erc721_contract()?, self.address, "getApproved", token_id).await
    }

    pub async fn is_approved_for_all(&self, owner: Address, operator: Address) -> Result<bool> {
        read(self.reader, erc721_contract()?, self.address, "isApprovedForAll", (owner, operator)).await
    }

    pub async fn supports_interface(&self, interface_id: [u8; 4]) -> Result<bool> {
        read(self.reader, erc721_contract()?, self.address, "supportsInterface", interface_id).await
    }

    pub fn approve_call(&self, spender: Address, token_id: TokenId) -> Result<CallSpec> {
        let data = erc721_contract()?.encode("approve", (spender, token_id))?;
        Ok(CallSpec::new(self.address, data))
    }
}

pub struct BridgeContract<'a> {
    reader: &'a dyn ChainReader,
    address: Address,
}

impl<'a> BridgeContract<'a> {
    pub fn new(reader: &'a dyn ChainReader, address: Address) -> Self {
        Self { reader, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub async fn is_erc721(&self, token: Address) -> Result<bool> {
        read(self.reader, bridge_contract()?, self.address, "isERC721", token).await
    }

    pub async fn supported_tokens(&self, token: Address) -> Result<bool> {
        read(self.reader, bridge_contract()?, self.address, "supportedTokens", token).await
    }

    pub async fn peers(&self, eid: u32) -> Result<H256> {
        read(self.reader, bridge_contract()?, self.address, "peers", eid).await
    }

    pub async fn wrapper_to_original(&self, wrapper: Address) -> Result<Address> {
        read(self.reader, bridge_contract()?, self.address, "wrapperToOriginal", wrapper).await
    }

    pub async fn quote_bridge_send(&self, params: &SendParams, pay_in_alt_token: bool) -> Result<MessagingFee> {
        let (native_fee, alt_token_fee): (U256, U256) = read(
            self.reader,
            bridge_contract()?,
            self.address,
            "quoteBridgeSend",
            (
                params.local_token,
                params.dst_eid,
                params.recipient,
                params.token_ids.clone(),
                params.options.clone(),
                pay_in_alt_token,
            ),
        )
        .await?;
        Ok(MessagingFee::new(native_fee, alt_token_fee))
    }

    pub fn register_call(&self, token: Address) -> Result<CallSpec> {
        let data = bridge_contract()?.encode("registerToken", token)?;
        Ok(CallSpec::new(self.address, data))
    }

    /// `bridgeSend` paying `fee.native_fee` as value, refunds going to `refund`.
    pub fn bridge_send_call(&self, params: &SendParams, fee: &MessagingFee, refund: Address) -> Result<CallSpec> {
        let data = bridge_contract()?.encode(
            "bridgeSend",
            (
                params.local_token,
                params.dst_eid,
                params.recipient,
                params.token_ids.clone(),
                params.options.clone(),
                (fee.native_fee, fee.alt_token_fee),
                refund,
            ),
        )?;
        Ok(CallSpec::new(self.address, data).value(fee.native_fee))
    }
}

/// 4-byte selector of a function in `contract`.
pub fn selector(contract: &BaseContract, method: &str) -> Result<[u8; 4]> {
    Ok(contract.abi().function(method)?.short_signature())
}
