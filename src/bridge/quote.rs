use std::sync::Arc;

use ethers::types::Address;
use tracing::{info, instrument, warn};

use crate::Result;
use crate::chainadapter::ChainReader;
use crate::error::{BridgeError, QuoteError};
use crate::evm::contracts::{bridge_abi, BridgeContract, SendParams};
use crate::reason::{self, ErrorReport};
use crate::types::MessagingFee;

/// Asks the bridge what a send with the given options costs.
#[derive(Clone)]
pub struct FeeQuoter {
    reader: Arc<dyn ChainReader>,
}

impl FeeQuoter {
    pub fn new(reader: Arc<dyn ChainReader>) -> Self {
        Self { reader }
    }

    /// A revert becomes [`QuoteError::Reverted`] with the decoded reason; a zero
    /// native fee becomes [`QuoteError::ZeroFee`].
    #[instrument(skip(self, params), fields(dst_eid = params.dst_eid, tokens = params.token_ids.len()))]
    pub async fn quote(
        &self,
        bridge: Address,
        params: &SendParams,
        pay_in_alt_token: bool,
    ) -> Result<MessagingFee> {
        let fee = match BridgeContract::new(self.reader.as_ref(), bridge)
            .quote_bridge_send(params, pay_in_alt_token)
            .await
        {
            Ok(fee) => fee,
            Err(BridgeError::Rpc(failure)) if failure.is_revert() => {
                let reason = reason::extract(&ErrorReport::from(&failure), bridge_abi().ok())
                    .unwrap_or_else(|| "quoteBridgeSend reverted".to_string());
                warn!("Quote reverted: {}", reason);
                return Err(QuoteError::Reverted(reason).into());
            }
            Err(e) => return Err(e),
        };

        if !fee.is_usable() {
            warn!("Quote returned a zero native fee");
            return Err(QuoteError::ZeroFee.into());
        }

        info!(native_fee = %fee.native_fee, alt_token_fee = %fee.alt_token_fee, "Fee quoted");
        Ok(fee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::mock::{MockChain, CALLER, TOKEN};
    use crate::bridge::ExecutorLzReceiveOption;
    use crate::registry::{BASE_EID, CONFLUX_BRIDGE};
    use ethers::abi::Token;
    use ethers::types::{Bytes, U256};

    fn params() -> SendParams {
        SendParams {
            local_token: TOKEN,
            dst_eid: BASE_EID,
            recipient: CALLER,
            token_ids: vec![U256::from(7)],
            options: ExecutorLzReceiveOption::for_batch(750_000, 1).encode(),
        }
    }

    fn quoter(chain: MockChain) -> FeeQuoter {
        FeeQuoter::new(Arc::new(chain))
    }

    #[tokio::test]
    async fn test_quote_returns_both_fees() {
        let chain = MockChain::default().with(|s| s.quote = Ok((U256::exp10(15), U256::from(42))));
        let fee = quoter(chain).quote(CONFLUX_BRIDGE, &params(), true).await.unwrap();
        assert_eq!(fee.native_fee, U256::exp10(15));
        assert_eq!(fee.alt_token_fee, U256::from(42));
    }

    #[tokio::test]
    async fn test_zero_native_fee_is_rejected() {
        let chain = MockChain::default().with(|s| s.quote = Ok((U256::zero(), U256::from(42))));
        let err = quoter(chain).quote(CONFLUX_BRIDGE, &params(), false).await.unwrap_err();
        assert!(matches!(err, BridgeError::Quote(QuoteError::ZeroFee)));
    }

    #[tokio::test]
    async fn test_custom_error_revert_is_named() {
        let mut revert = ethers::utils::id("NoPeer(uint32)").to_vec();
        revert.extend(ethers::abi::encode(&[Token::Uint(U256::from(BASE_EID))]));
        let chain = MockChain::default().with(|s| s.quote = Err(revert.into()));

        let err = quoter(chain).quote(CONFLUX_BRIDGE, &params(), false).await.unwrap_err();
        assert_eq!(err.reason(), "NoPeer(30184)");
    }

    #[tokio::test]
    async fn test_bare_revert_keeps_node_message() {
        let chain = MockChain::default().with(|s| s.quote = Err(Bytes::default()));
        let err = quoter(chain).quote(CONFLUX_BRIDGE, &params(), false).await.unwrap_err();
        assert!(matches!(err, BridgeError::Quote(QuoteError::Reverted(ref r)) if r == "execution reverted"));
    }
}
