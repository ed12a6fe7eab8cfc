use std::sync::Arc;

use ethers::types::{Address, H256};
use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

use crate::Result;
use crate::chainadapter::ChainReader;
use crate::error::{BridgeError, ValidationError};
use crate::evm::contracts::{BridgeContract, Erc721Contract, ERC721_INTERFACE_ID};
use crate::types::TokenId;

/// Everything a `bridgeSend` needs checked before a quote is requested.
#[derive(Debug, Clone)]
pub struct SendCheck<'a> {
    pub token: Address,
    pub token_ids: &'a [TokenId],
    pub caller: Address,
    pub bridge: Address,
    pub dst_eid: u32,
    pub expected_peer: H256,
}

/// Read-only checks run ahead of any write.
#[derive(Clone)]
pub struct PreflightValidator {
    reader: Arc<dyn ChainReader>,
}

/// Reverted reads mean "no" for lookups that revert on unknown input
/// (`ownerOf` on a burned id, `supportsInterface` on a non-165 contract).
fn revert_as<T>(result: Result<T>, fallback: T) -> Result<T> {
    match result {
        Err(BridgeError::Rpc(failure)) if failure.is_revert() => {
            debug!("Read reverted, using fallback");
            Ok(fallback)
        }
        other => other,
    }
}

impl PreflightValidator {
    pub fn new(reader: Arc<dyn ChainReader>) -> Self {
        Self { reader }
    }

    pub async fn check_ownership(&self, token_id: TokenId, token: Address, caller: Address) -> Result<bool> {
        let owner = revert_as(
            Erc721Contract::new(self.reader.as_ref(), token).owner_of(token_id).await,
            Address::zero(),
        )?;
        debug!(%token_id, ?owner, "ownerOf");
        Ok(owner == caller)
    }

    /// Asks the bridge first and falls back to ERC-165 on the collection.
    pub async fn check_erc721(&self, bridge: Address, token: Address) -> Result<bool> {
        match BridgeContract::new(self.reader.as_ref(), bridge).is_erc721(token).await {
            Ok(is_erc721) => Ok(is_erc721),
            Err(e) => {
                warn!("isERC721 probe failed, falling back to supportsInterface: {}", e);
                revert_as(
                    Erc721Contract::new(self.reader.as_ref(), token)
                        .supports_interface(ERC721_INTERFACE_ID)
                        .await,
                    false,
                )
            }
        }
    }

    pub async fn check_supported(&self, bridge: Address, token: Address) -> Result<bool> {
        BridgeContract::new(self.reader.as_ref(), bridge)
            .supported_tokens(token)
            .await
    }

    /// True if `bridge` may move `token_id`, either per token or as operator.
    pub async fn check_approval(
        &self,
        token_id: TokenId,
        token: Address,
        owner: Address,
        bridge: Address,
    ) -> Result<bool> {
        let erc721 = Erc721Contract::new(self.reader.as_ref(), token);
        let approved = revert_as(erc721.get_approved(token_id).await, Address::zero())?;
        if approved == bridge {
            return Ok(true);
        }
        erc721.is_approved_for_all(owner, bridge).await
    }

    /// The peer registered for `dst_eid` must be exactly `expected`.
    pub async fn check_peer(&self, bridge: Address, dst_eid: u32, expected: H256) -> Result<()> {
        let actual = BridgeContract::new(self.reader.as_ref(), bridge).peers(dst_eid).await?;
        if actual.is_zero() {
            return Err(ValidationError::PeerNotConfigured { eid: dst_eid }.into());
        }
        if actual != expected {
            return Err(ValidationError::PeerMismatch {
                eid: dst_eid,
                expected,
                actual,
            }
            .into());
        }
        Ok(())
    }

    /// Every id must be owned by `caller`. Reports the first offender in input order.
    pub async fn check_batch_ownership(
        &self,
        token: Address,
        token_ids: &[TokenId],
        caller: Address,
    ) -> Result<()> {
        let results = join_all(
            token_ids
                .iter()
                .map(|id| self.check_ownership(*id, token, caller)),
        )
        .await;

        for (token_id, owned) in token_ids.iter().zip(results) {
            if !owned? {
                return Err(ValidationError::NotOwner { token_id: *token_id }.into());
            }
        }
        Ok(())
    }

    pub async fn check_batch_approval(
        &self,
        token: Address,
        token_ids: &[TokenId],
        owner: Address,
        bridge: Address,
    ) -> Result<()> {
        let results = join_all(
            token_ids
                .iter()
                .map(|id| self.check_approval(*id, token, owner, bridge)),
        )
        .await;

        for (token_id, approved) in token_ids.iter().zip(results) {
            if !approved? {
                return Err(ValidationError::NotApproved { token_id: *token_id }.into());
            }
        }
        Ok(())
    }

    /// Runs every check a send depends on; stops at the first failure.
    #[instrument(skip(self, check), fields(token = ?check.token, ids = check.token_ids.len(), dst_eid = check.dst_eid))]
    pub async fn validate_send(&self, check: &SendCheck<'_>) -> Result<()> {
        if check.token_ids.is_empty() {
            return Err(ValidationError::MissingParameters("at least one token id is required".to_string()).into());
        }

        self.check_batch_ownership(check.token, check.token_ids, check.caller)
            .await?;
        self.check_batch_approval(check.token, check.token_ids, check.caller, check.bridge)
            .await?;

        if !self.check_erc721(check.bridge, check.token).await? {
            return Err(ValidationError::NotErc721(check.token).into());
        }
        if !self.check_supported(check.bridge, check.token).await? {
            return Err(ValidationError::NotRegistered(check.token).into());
        }
        self.check_peer(check.bridge, check.dst_eid, check.expected_peer)
            .await?;

        info!("Preflight passed for {} token(s)", check.token_ids.len());
        Ok(())
    }
}
