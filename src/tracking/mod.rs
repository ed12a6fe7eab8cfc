//! Delivery tracking against the cross-chain status service.

pub mod scan;
pub mod status;

pub use scan::{ScanClient, ScanMessage, StatusQuery, StatusSource};
pub use status::{FailureKind, ScanStatus};

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, instrument, warn};

use crate::chainadapter::{BridgeEvent, BridgeObserver};
use crate::error::BridgeError;
use crate::registry::{Network, TrackerConfig};
use crate::tracking::scan::seconds_to_millis;
use crate::types::{CrossChainMessage, MessageStatus, StatusObservation};
use crate::utils::now_millis;

/// Which identifier the tracker queries the service with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackingKey {
    #[default]
    SourceTx,
    MessageId,
}

/// `max(0, average - elapsed)`; elapsed counts from the source block when known.
pub fn estimate_remaining_ms(average_delivery_ms: u64, source_sent_ms: Option<u64>, now_ms: u64) -> u64 {
    let elapsed = source_sent_ms.map_or(0, |sent| now_ms.saturating_sub(sent));
    average_delivery_ms.saturating_sub(elapsed)
}

/// Maps one service answer onto the internal state machine.
pub fn observe(message: &ScanMessage, average_delivery_ms: u64, now_ms: u64) -> StatusObservation {
    match message.status.name.message_status() {
        MessageStatus::Delivered => {
            let tx = message.destination_tx();
            StatusObservation::Delivered {
                destination_tx: tx.and_then(|t| t.tx_hash),
                delivered_at_ms: tx.and_then(|t| t.block_timestamp).map(seconds_to_millis),
            }
        }
        MessageStatus::Failed => StatusObservation::Failed,
        _ => {
            let sent_ms = message
                .source_tx()
                .and_then(|t| t.block_timestamp)
                .map(seconds_to_millis);
            StatusObservation::Pending {
                estimated_remaining_ms: Some(estimate_remaining_ms(average_delivery_ms, sent_ms, now_ms)),
            }
        }
    }
}

/// Resolves once cancellation is requested or the requesting side is gone.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Polls the status service for one message until it settles.
///
/// Fetches are strictly sequential: the next one is only scheduled after the
/// previous one returned, failed or timed out.
#[derive(Clone)]
pub struct DeliveryTracker {
    source: Arc<dyn StatusSource>,
    config: TrackerConfig,
    network: Network,
    average_delivery_ms: u64,
    key: TrackingKey,
}

impl DeliveryTracker {
    pub fn new(source: Arc<dyn StatusSource>, config: TrackerConfig, network: Network, average_delivery_ms: u64) -> Self {
        Self {
            source,
            config,
            network,
            average_delivery_ms,
            key: TrackingKey::default(),
        }
    }

    pub fn with_key(mut self, key: TrackingKey) -> Self {
        self.key = key;
        self
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    fn query_for(&self, message: &CrossChainMessage) -> StatusQuery {
        match self.key {
            TrackingKey::MessageId if !message.message_id.is_zero() => StatusQuery::Guid {
                network: self.network,
                guid: message.message_id,
            },
            _ => StatusQuery::SourceTx {
                network: self.network,
                tx_hash: message.source_tx,
            },
        }
    }

    /// Tracks without external cancellation.
    pub async fn track(&self, message: CrossChainMessage, observer: &dyn BridgeObserver) -> CrossChainMessage {
        let (_keep_alive, rx) = watch::channel(false);
        self.track_until_cancelled(message, observer, rx).await
    }

    /// Runs the poll loop. The returned message is `Pending` only if cancelled.
    #[instrument(skip(self, message, observer, cancel), fields(message_id = ?message.message_id))]
    pub async fn track_until_cancelled(
        &self,
        mut message: CrossChainMessage,
        observer: &dyn BridgeObserver,
        mut cancel: watch::Receiver<bool>,
    ) -> CrossChainMessage {
        if message.status.is_terminal() {
            return message;
        }

        let query = self.query_for(&message);
        let started = Instant::now();
        let mut polls = 0u32;

        loop {
            polls += 1;
            let fetch = timeout(self.config.fetch_timeout, self.source.fetch(&query));
            let fetched = tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => {
                    info!(polls, "Tracking cancelled during fetch");
                    return message;
                }
                result = fetch => result,
            };

            match fetched {
                Ok(Ok(Some(remote))) => {
                    let observation = observe(&remote, self.average_delivery_ms, now_millis());
                    debug!(polls, status = ?remote.status.name, "Status fetched");
                    if message.apply(observation) {
                        observer.notify(BridgeEvent::Tracking(message.clone()));
                    }
                }
                Ok(Ok(None)) => debug!(polls, "Message not indexed yet"),
                Ok(Err(e)) => warn!(polls, "Status fetch failed: {}", e),
                Err(_) => warn!(polls, "Status fetch timed out after {:?}", self.config.fetch_timeout),
            }

            if message.status.is_terminal() {
                info!(
                    polls,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Message settled as {:?}",
                    message.status
                );
                return message;
            }

            if polls >= self.config.max_polls {
                let timeout_err = BridgeError::TrackingTimeout { polls };
                warn!("{}", timeout_err.reason());
                message.apply(StatusObservation::Exhausted);
                observer.notify(BridgeEvent::Tracking(message.clone()));
                return message;
            }

            tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => {
                    info!(polls, "Tracking cancelled");
                    return message;
                }
                _ = sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// Runs tracking on its own task.
    pub fn spawn(&self, message: CrossChainMessage, observer: Arc<dyn BridgeObserver>) -> TrackingHandle {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let tracker = self.clone();
        let task = tokio::spawn(async move {
            tracker
                .track_until_cancelled(message, observer.as_ref(), cancel_rx)
                .await
        });
        TrackingHandle { cancel: cancel_tx, task }
    }
}

/// Handle to a spawned tracking task.
pub struct TrackingHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<CrossChainMessage>,
}

impl TrackingHandle {
    /// Stops scheduling further fetches; an in-flight fetch is abandoned.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the final message state.
    pub async fn join(self) -> Result<CrossChainMessage, BridgeError> {
        let TrackingHandle { cancel, task } = self;
        let result = task.await;
        drop(cancel);
        result.map_err(|e| BridgeError::Anyhow(anyhow::anyhow!("Tracking task failed: {}", e)))
    }
}
