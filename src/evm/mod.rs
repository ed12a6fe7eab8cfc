pub mod clients;
pub mod contracts;
pub mod events;
pub mod signer;
pub mod types;

pub use clients::EvmChainClient;
pub use contracts::{BridgeContract, Erc721Contract, SendParams};
pub use events::{LogDecoder, MessageIdExtractor};
pub use signer::WalletSigner;
pub use types::{EvmClientConfig, EvmClientConfigBuilder};
