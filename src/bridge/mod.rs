//! The bridging pipeline: preflight, quote, gas, submit, extract, track.
//!
//! [`NftBridge`] owns one stage object per step and wires them together for a
//! fixed source chain. Every public entry point returns an
//! [`OperationOutcome`]; failures never escape as errors.

pub mod gas;
pub mod options;
pub mod preflight;
pub mod quote;
pub mod submit;

#[cfg(test)]
pub(crate) mod mock;

pub use gas::GasEstimator;
pub use options::ExecutorLzReceiveOption;
pub use preflight::{PreflightValidator, SendCheck};
pub use quote::FeeQuoter;
pub use submit::TransactionSubmitter;

use std::sync::Arc;
use std::time::Duration;

use ethers::signers::LocalWallet;
use ethers::types::Address;
use tracing::{debug, info, instrument, warn};

use crate::Result;
use crate::chainadapter::{BridgeEvent, BridgeObserver, ChainReader, NoopObserver, TransactionSigner};
use crate::error::{BridgeError, ValidationError};
use crate::evm::contracts::{bridge_abi, erc721_abi, BridgeContract, Erc721Contract, SendParams};
use crate::evm::events::MessageIdExtractor;
use crate::evm::{EvmChainClient, EvmClientConfig, WalletSigner};
use crate::registry::{ChainConfigTable, GasConfig, ScanConfig, TrackerConfig};
use crate::tracking::{DeliveryTracker, ScanClient, StatusSource, TrackingHandle};
use crate::types::{
    BridgeOperation, BridgeRequest, CrossChainMessage, MessageStatus, OperationOutcome, OperationState, TokenId,
    TransactionOutcome, TxStatus,
};

/// Bridge client bound to one source chain.
pub struct NftBridge {
    source_chain: u64,
    reader: Arc<dyn ChainReader>,
    signer: Arc<dyn TransactionSigner>,
    chains: Arc<ChainConfigTable>,
    gas: GasConfig,
    tracker_config: TrackerConfig,
    status_source: Arc<dyn StatusSource>,
    observer: Arc<dyn BridgeObserver>,
    preflight: PreflightValidator,
    quoter: FeeQuoter,
    estimator: GasEstimator,
    submitter: TransactionSubmitter,
}

impl NftBridge {
    pub fn new(
        source_chain: u64,
        reader: Arc<dyn ChainReader>,
        signer: Arc<dyn TransactionSigner>,
        chains: Arc<ChainConfigTable>,
        status_source: Arc<dyn StatusSource>,
    ) -> Self {
        let gas = GasConfig::default();
        Self {
            source_chain,
            preflight: PreflightValidator::new(Arc::clone(&reader)),
            quoter: FeeQuoter::new(Arc::clone(&reader)),
            estimator: GasEstimator::new(Arc::clone(&reader), gas.clone()),
            submitter: TransactionSubmitter::new(Arc::clone(&reader), Arc::clone(&signer)),
            reader,
            signer,
            chains,
            gas,
            tracker_config: TrackerConfig::default(),
            status_source,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Connects to the source chain over HTTP and signs with `wallet`.
    pub async fn connect(
        client_config: EvmClientConfig,
        wallet: LocalWallet,
        chains: Arc<ChainConfigTable>,
        scan_config: ScanConfig,
    ) -> Result<Self> {
        chains.chain(client_config.chain_id)?;
        let receipt_timeout = client_config.receipt_timeout;
        let receipt_poll_interval = client_config.receipt_poll_interval;

        let client = EvmChainClient::connect(client_config).await?;
        let signer = WalletSigner::new(&client, wallet);
        let scan = ScanClient::new(scan_config)?;
        let source_chain = client.config().chain_id;

        Ok(Self::new(source_chain, Arc::new(client), Arc::new(signer), chains, Arc::new(scan))
            .with_receipt_timing(receipt_timeout, receipt_poll_interval))
    }

    pub fn with_gas_config(mut self, gas: GasConfig) -> Self {
        self.estimator = GasEstimator::new(Arc::clone(&self.reader), gas.clone());
        self.gas = gas;
        self
    }

    pub fn with_tracker_config(mut self, config: TrackerConfig) -> Self {
        self.tracker_config = config;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn BridgeObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_receipt_timing(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.submitter = self.submitter.with_receipt_timing(timeout, poll_interval);
        self
    }

    pub fn source_chain(&self) -> u64 {
        self.source_chain
    }

    pub fn chains(&self) -> &ChainConfigTable {
        &self.chains
    }

    fn status(&self, text: impl Into<String>) {
        self.observer.notify(BridgeEvent::Status(text.into()));
    }

    fn stage(&self, operation: &mut BridgeOperation, state: OperationState) {
        debug!(operation = %operation.id, ?state, "Stage");
        operation.state = state;
        self.observer.notify(BridgeEvent::Stage {
            operation: operation.id,
            state,
        });
    }

    fn finish(&self, result: Result<OperationOutcome>) -> OperationOutcome {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Operation failed: {}", e);
                OperationOutcome::from_error(&e)
            }
        };
        if let Some(reason) = &outcome.reason {
            self.status(reason.clone());
        }
        self.observer.notify(BridgeEvent::Finished(outcome.clone()));
        outcome
    }

    fn source_bridge(&self) -> Result<Address> {
        Ok(self.chains.chain(self.source_chain)?.bridge_address)
    }

    /// Approves the source bridge for one token. Already approved is a success
    /// without a transaction.
    #[instrument(skip(self))]
    pub async fn approve(&self, token: Address, token_id: TokenId) -> OperationOutcome {
        let result = self.run_approve(token, token_id).await;
        self.finish(result)
    }

    async fn run_approve(&self, token: Address, token_id: TokenId) -> Result<OperationOutcome> {
        let bridge = self.source_bridge()?;
        let caller = self.signer.address();

        if !self.preflight.check_ownership(token_id, token, caller).await? {
            return Err(ValidationError::NotOwner { token_id }.into());
        }
        if self.preflight.check_approval(token_id, token, caller, bridge).await? {
            info!("Token {} already approved", token_id);
            self.status("Already approved");
            return Ok(OperationOutcome::from_transaction(&TransactionOutcome::already_done()));
        }

        let call = Erc721Contract::new(self.reader.as_ref(), token)
            .approve_call(bridge, token_id)?
            .from(caller);
        let gas_limit = self.estimator.estimate_for_batch(&call, 1).await;
        self.status("Approving");
        let tx = self.submitter.submit(call, gas_limit, erc721_abi().ok()).await;
        if tx.is_success() {
            self.status("Approved");
        }
        Ok(OperationOutcome::from_transaction(&tx))
    }

    /// Registers a collection with the source bridge. Already registered is a
    /// success without a transaction.
    #[instrument(skip(self))]
    pub async fn register(&self, token: Address) -> OperationOutcome {
        let result = self.run_register(token).await;
        self.finish(result)
    }

    async fn run_register(&self, token: Address) -> Result<OperationOutcome> {
        let bridge = self.source_bridge()?;

        if !self.preflight.check_erc721(bridge, token).await? {
            return Err(ValidationError::NotErc721(token).into());
        }
        if self.preflight.check_supported(bridge, token).await? {
            info!("Collection {:?} already registered", token);
            self.status("Already registered");
            return Ok(OperationOutcome::from_transaction(&TransactionOutcome::already_done()));
        }

        let call = BridgeContract::new(self.reader.as_ref(), bridge)
            .register_call(token)?
            .from(self.signer.address());
        let gas_limit = self.estimator.estimate_for_batch(&call, 1).await;
        self.status("Registering collection");
        let tx = self.submitter.submit(call, gas_limit, bridge_abi().ok()).await;
        Ok(OperationOutcome::from_transaction(&tx))
    }

    /// Sends `request.token_ids` to the destination chain.
    ///
    /// On success the outcome carries a `Pending` [`CrossChainMessage`] when the
    /// receipt contains a message id; hand it to [`track`](Self::track) or
    /// [`spawn_tracking`](Self::spawn_tracking).
    #[instrument(skip(self, request), fields(dst = request.destination_chain, tokens = request.token_ids.len()))]
    pub async fn bridge(&self, request: &BridgeRequest) -> OperationOutcome {
        let mut operation = BridgeOperation::new(self.source_chain, request);
        let result = self.run_bridge(&mut operation).await;
        if !matches!(&result, Ok(outcome) if outcome.is_success()) {
            self.stage(&mut operation, OperationState::Failed);
        }
        self.finish(result)
    }

    async fn run_bridge(&self, operation: &mut BridgeOperation) -> Result<OperationOutcome> {
        let (source, destination) = self
            .chains
            .route(operation.source_chain, operation.destination_chain)?;
        if operation.recipient.is_zero() {
            return Err(ValidationError::InvalidAddress("recipient is the zero address".to_string()).into());
        }
        let caller = self.signer.address();

        self.status("Checking ownership and bridge configuration");
        self.preflight
            .validate_send(&SendCheck {
                token: operation.local_token,
                token_ids: &operation.token_ids,
                caller,
                bridge: source.bridge_address,
                dst_eid: destination.endpoint_id,
                expected_peer: destination.expected_peer(),
            })
            .await?;
        self.stage(operation, OperationState::Validated);

        let batch_size = operation.token_ids.len();
        operation.options = ExecutorLzReceiveOption::for_batch(self.gas.receive_gas_per_token, batch_size).encode();
        let params = SendParams {
            local_token: operation.local_token,
            dst_eid: destination.endpoint_id,
            recipient: operation.recipient,
            token_ids: operation.token_ids.clone(),
            options: operation.options.clone(),
        };

        self.status("Quoting fee");
        let fee = self.quoter.quote(source.bridge_address, &params, false).await?;
        operation.fee_quote = Some(fee);
        self.stage(operation, OperationState::Quoted);

        let call = BridgeContract::new(self.reader.as_ref(), source.bridge_address)
            .bridge_send_call(&params, &fee, operation.recipient)?
            .from(caller);
        let gas_limit = self.estimator.estimate_for_batch(&call, batch_size).await;

        self.status("Submitting bridge transaction");
        let tx = self.submitter.submit(call, gas_limit, bridge_abi().ok()).await;
        if tx.tx_hash.is_some() {
            self.stage(operation, OperationState::Submitted);
        }
        let mut outcome = OperationOutcome::from_transaction(&tx);
        match tx.status {
            TxStatus::Success => {}
            TxStatus::Reverted => {
                self.status("Bridge transaction reverted");
                return Ok(outcome);
            }
            TxStatus::Failed => return Ok(outcome),
        }

        let message_id = tx
            .receipt
            .as_ref()
            .and_then(|receipt| MessageIdExtractor::for_bridge(source.bridge_address).extract(receipt));
        outcome.message = match (message_id, tx.tx_hash) {
            (Some(id), Some(hash)) => Some(CrossChainMessage::pending(
                id,
                hash,
                operation.source_chain,
                operation.destination_chain,
            )),
            _ => {
                info!("No message id in receipt, delivery tracking unavailable");
                None
            }
        };

        self.stage(operation, OperationState::Completed);
        self.status("Bridged successfully");
        Ok(outcome)
    }

    fn tracker_for(&self, message: &CrossChainMessage) -> Result<DeliveryTracker> {
        let (source, _) = self
            .chains
            .route(message.source_chain, message.destination_chain)?;
        Ok(DeliveryTracker::new(
            Arc::clone(&self.status_source),
            self.tracker_config.clone(),
            source.network(),
            self.chains
                .average_delivery_ms(message.source_chain, message.destination_chain),
        ))
    }

    /// Polls delivery status until the message settles or the poll budget runs out.
    #[instrument(skip(self, message), fields(message_id = ?message.message_id))]
    pub async fn track(&self, message: CrossChainMessage) -> OperationOutcome {
        let tracker = match self.tracker_for(&message) {
            Ok(tracker) => tracker,
            Err(e) => return self.finish(Err(e)),
        };
        let message = tracker.track(message, self.observer.as_ref()).await;
        self.finish(Ok(tracked_outcome(message, tracker.config().max_polls)))
    }

    /// Tracks on a background task. Dropping the handle cancels tracking.
    pub fn spawn_tracking(&self, message: CrossChainMessage) -> Result<TrackingHandle> {
        Ok(self
            .tracker_for(&message)?
            .spawn(message, Arc::clone(&self.observer)))
    }

    /// Home-chain collection behind a wrapped token, if the bridge knows one.
    #[instrument(skip(self))]
    pub async fn resolve_original_token(&self, wrapped: Address) -> Option<Address> {
        let bridge = self.source_bridge().ok()?;
        match BridgeContract::new(self.reader.as_ref(), bridge)
            .wrapper_to_original(wrapped)
            .await
        {
            Ok(original) if !original.is_zero() => Some(original),
            Ok(_) => {
                debug!("{:?} is not a wrapped collection", wrapped);
                None
            }
            Err(e) => {
                warn!("wrapperToOriginal lookup failed: {}", e);
                None
            }
        }
    }
}

fn tracked_outcome(message: CrossChainMessage, max_polls: u32) -> OperationOutcome {
    let (status, reason) = match message.status {
        MessageStatus::Delivered => (TxStatus::Success, None),
        MessageStatus::Failed => (
            TxStatus::Failed,
            Some("Message delivery failed on the destination chain".to_string()),
        ),
        MessageStatus::Unknown => (
            TxStatus::Failed,
            Some(BridgeError::TrackingTimeout { polls: max_polls }.reason()),
        ),
        MessageStatus::Pending => (TxStatus::Failed, Some("Tracking stopped before delivery".to_string())),
    };
    OperationOutcome {
        status,
        tx_hash: Some(message.source_tx),
        reason,
        message: Some(message),
    }
}
