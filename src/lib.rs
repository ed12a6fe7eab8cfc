//! LayerZero ONFT bridge client
//!
//! Drives an ERC-721 cross-chain transfer from preflight validation through
//! fee quoting, gas estimation and submission, then follows the message until
//! the status service reports delivery.

pub mod bridge;
pub mod chainadapter;
pub mod error;
pub mod evm;
pub mod reason;
pub mod registry;
pub mod tracking;
pub mod types;
pub mod utils;

pub use bridge::{ExecutorLzReceiveOption, NftBridge};
pub use chainadapter::{BridgeEvent, BridgeObserver, CallSpec, ChainReader, NoopObserver, TransactionSigner};
pub use error::{BridgeError, QuoteError, RpcFailure, ValidationError};
pub use registry::{ChainConfig, ChainConfigTable, GasConfig, Network, ScanConfig, TrackerConfig};
pub use tracking::{DeliveryTracker, ScanClient, TrackingHandle};
pub use types::*;

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;
