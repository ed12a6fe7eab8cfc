use std::sync::Arc;
use std::time::Duration;

use ethers::abi::Abi;
use ethers::types::{TransactionReceipt, TxHash, U256};
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, instrument, warn};

use crate::chainadapter::{CallSpec, ChainReader, TransactionSigner};
use crate::error::{BridgeError, RpcFailure};
use crate::evm::types::{DEFAULT_RECEIPT_POLL_INTERVAL, DEFAULT_RECEIPT_TIMEOUT};
use crate::reason::{self, ErrorReport};
use crate::types::{TransactionOutcome, TxStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubmissionState {
    Idle,
    Simulated,
    Submitted,
    Confirmed(TxStatus),
}

fn advance(state: &mut SubmissionState, next: SubmissionState) {
    debug!(from = ?state, to = ?next, "Submission state");
    *state = next;
}

/// Simulates, broadcasts and waits for one transaction.
///
/// Nothing is retried: a failed pass must go back through preflight and
/// quoting before it is attempted again.
#[derive(Clone)]
pub struct TransactionSubmitter {
    reader: Arc<dyn ChainReader>,
    signer: Arc<dyn TransactionSigner>,
    receipt_timeout: Duration,
    receipt_poll_interval: Duration,
}

impl TransactionSubmitter {
    pub fn new(reader: Arc<dyn ChainReader>, signer: Arc<dyn TransactionSigner>) -> Self {
        Self {
            reader,
            signer,
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
            receipt_poll_interval: DEFAULT_RECEIPT_POLL_INTERVAL,
        }
    }

    pub fn with_receipt_timing(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.receipt_timeout = timeout;
        self.receipt_poll_interval = poll_interval;
        self
    }

    /// Runs `Idle -> Simulated -> Submitted -> Confirmed`. `abi` decodes
    /// custom errors of the target contract when simulation reverts.
    #[instrument(skip(self, call, abi), fields(to = ?call.to, %gas_limit))]
    pub async fn submit(&self, call: CallSpec, gas_limit: U256, abi: Option<&Abi>) -> TransactionOutcome {
        let mut state = SubmissionState::Idle;
        let call = call.from(self.signer.address());

        if let Err(failure) = self.reader.call(&call).await {
            let error = simulation_error(failure, abi);
            warn!("Simulation failed, not broadcasting: {}", error);
            return TransactionOutcome::failed(error.reason());
        }
        advance(&mut state, SubmissionState::Simulated);

        let tx_hash = match self.signer.send_transaction(&call, gas_limit).await {
            Ok(hash) => hash,
            Err(failure) => {
                let reason = failure_reason(&failure, abi);
                error!("Broadcast failed: {}", reason);
                return TransactionOutcome::failed(reason);
            }
        };
        advance(&mut state, SubmissionState::Submitted);
        info!("Transaction submitted: {:?}", tx_hash);

        let receipt = match self.wait_for_receipt(tx_hash).await {
            Some(receipt) => receipt,
            None => {
                return TransactionOutcome {
                    tx_hash: Some(tx_hash),
                    ..TransactionOutcome::failed(format!("Timed out waiting for receipt of {:?}", tx_hash))
                };
            }
        };

        let mut outcome = TransactionOutcome::confirmed(receipt);
        advance(&mut state, SubmissionState::Confirmed(outcome.status));
        if outcome.status == TxStatus::Reverted {
            let error = BridgeError::TransactionReverted { tx_hash, reason: None };
            warn!("{}", error);
            outcome.revert_reason = Some(error.reason());
        } else {
            info!("Transaction {:?} confirmed", tx_hash);
        }
        outcome
    }

    /// Polls until the receipt shows up or the timeout elapses.
    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Option<TransactionReceipt> {
        let deadline = Instant::now() + self.receipt_timeout;
        loop {
            match self.reader.transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => return Some(receipt),
                Ok(None) => debug!("Receipt for {:?} not available yet", tx_hash),
                Err(e) => warn!("Receipt lookup for {:?} failed: {}", tx_hash, e),
            }
            if Instant::now() + self.receipt_poll_interval > deadline {
                error!("No receipt for {:?} after {:?}", tx_hash, self.receipt_timeout);
                return None;
            }
            sleep(self.receipt_poll_interval).await;
        }
    }
}

/// Reverts carry a decoded reason; anything else stays an RPC failure.
fn simulation_error(failure: RpcFailure, abi: Option<&Abi>) -> BridgeError {
    if failure.is_revert() {
        BridgeError::SimulationRevert(failure_reason(&failure, abi))
    } else {
        BridgeError::Rpc(failure)
    }
}

fn failure_reason(failure: &RpcFailure, abi: Option<&Abi>) -> String {
    reason::extract(&ErrorReport::from(failure), abi).unwrap_or_else(|| failure.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::mock::{MockChain, CALLER, TOKEN};
    use crate::evm::contracts::{bridge_abi, erc721_abi, Erc721Contract};
    use crate::registry::{BASE_EID, CONFLUX_BRIDGE};
    use ethers::abi::Token;

    fn submitter(chain: MockChain) -> (TransactionSubmitter, Arc<MockChain>) {
        let chain = Arc::new(chain);
        let submitter = TransactionSubmitter::new(chain.clone(), chain.clone())
            .with_receipt_timing(Duration::from_secs(30), Duration::from_secs(1));
        (submitter, chain)
    }

    fn approve() -> CallSpec {
        let chain = MockChain::default();
        Erc721Contract::new(&chain, TOKEN)
            .approve_call(CONFLUX_BRIDGE, U256::from(7))
            .unwrap()
    }

    #[tokio::test]
    async fn test_confirmed_transaction_is_sent_from_signer() {
        let (submitter, chain) = submitter(MockChain::default());
        let outcome = submitter.submit(approve(), U256::from(60_000), erc721_abi().ok()).await;

        assert!(outcome.is_success());
        assert!(outcome.receipt.is_some());
        let sent = chain.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.from, Some(CALLER));
        assert_eq!(sent[0].1, U256::from(60_000));
    }

    #[tokio::test]
    async fn test_simulation_revert_is_decoded_and_not_broadcast() {
        let mut revert = ethers::utils::id("NoPeer(uint32)").to_vec();
        revert.extend(ethers::abi::encode(&[Token::Uint(U256::from(BASE_EID))]));
        let (submitter, chain) = submitter(MockChain::default().with(|s| s.simulation_revert = Some(revert.into())));

        let outcome = submitter.submit(approve(), U256::from(60_000), bridge_abi().ok()).await;
        assert_eq!(outcome.status, TxStatus::Failed);
        assert_eq!(outcome.tx_hash, None);
        assert_eq!(outcome.revert_reason.as_deref(), Some("NoPeer(30184)"));
        assert!(chain.sent().is_empty());
    }

    #[tokio::test]
    async fn test_reverted_receipt() {
        let (submitter, _) = submitter(MockChain::default().with(|s| s.receipt_status = 0));
        let outcome = submitter.submit(approve(), U256::from(60_000), None).await;
        assert_eq!(outcome.status, TxStatus::Reverted);
        assert!(outcome.tx_hash.is_some());
        assert_eq!(outcome.revert_reason.as_deref(), Some("Transaction reverted"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_receipt_times_out_with_hash() {
        let (submitter, chain) = submitter(MockChain::default().with(|s| s.mined = false));
        let start = Instant::now();
        let outcome = submitter.submit(approve(), U256::from(60_000), None).await;

        assert_eq!(outcome.status, TxStatus::Failed);
        assert_eq!(outcome.tx_hash, Some(TxHash::from_low_u64_be(1)));
        assert!(outcome
            .revert_reason
            .as_deref()
            .unwrap_or_default()
            .starts_with("Timed out waiting for receipt"));
        assert_eq!(chain.sent().len(), 1);
        assert!(start.elapsed() <= Duration::from_secs(30));
    }
}
