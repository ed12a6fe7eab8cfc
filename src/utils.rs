use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ethers::types::{Address, H256, U256};
use tokio::time::sleep;
use tracing::warn;

use crate::error::ValidationError;

/// Longest single backoff sleep.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Retries `operation` with exponential backoff while `should_retry` accepts the error.
///
/// The last error is returned once `max_retries` extra attempts are spent or the
/// error is not retryable.
pub async fn retry_async<F, Fut, T, E, P>(
    mut operation: F,
    max_retries: u32,
    base_delay: Duration,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < max_retries && should_retry(&e) => {
                warn!("Attempt {} failed, retrying: {}", attempt + 1, e);
                let delay = base_delay.saturating_mul(2u32.saturating_pow(attempt));
                sleep(delay.min(MAX_RETRY_DELAY)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Parses a `0x`-prefixed, 40 hex digit address.
pub fn parse_address(raw: &str) -> Result<Address, ValidationError> {
    let raw = raw.trim();
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| ValidationError::InvalidAddress(raw.to_string()))?;
    if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ValidationError::InvalidAddress(raw.to_string()));
    }
    let bytes = hex::decode(digits).map_err(|_| ValidationError::InvalidAddress(raw.to_string()))?;
    Ok(Address::from_slice(&bytes))
}

/// Parses a decimal or `0x` hex token id.
pub fn parse_token_id(raw: &str) -> Result<U256, ValidationError> {
    let raw = raw.trim();
    let invalid = || ValidationError::InvalidTokenId(raw.to_string());
    match raw.strip_prefix("0x") {
        Some(digits) => {
            let padded = if digits.len() % 2 == 1 {
                format!("0{}", digits)
            } else {
                digits.to_string()
            };
            let bytes = hex::decode(padded).map_err(|_| invalid())?;
            if bytes.is_empty() || bytes.len() > 32 {
                return Err(invalid());
            }
            Ok(U256::from_big_endian(&bytes))
        }
        None => U256::from_dec_str(raw).map_err(|_| invalid()),
    }
}

/// Left-pads an address to the 32-byte form used for peer registrations.
pub fn pad_address(address: Address) -> H256 {
    H256::from(address)
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_parse_address_accepts_mixed_case() {
        let addr = parse_address("0x8078EFb3CEe419Abde856B6F5f470CC9d8971319").unwrap();
        assert_eq!(format!("{:?}", addr), "0x8078efb3cee419abde856b6f5f470cc9d8971319");
    }

    #[test]
    fn test_parse_address_rejects_malformed() {
        assert!(parse_address("8078EFb3CEe419Abde856B6F5f470CC9d8971319").is_err());
        assert!(parse_address("0x8078EFb3CEe419Abde856B6F5f470CC9d89713").is_err());
        assert!(parse_address("0xZZ78EFb3CEe419Abde856B6F5f470CC9d8971319").is_err());
    }

    #[test]
    fn test_parse_token_id_forms() {
        assert_eq!(parse_token_id("7").unwrap(), U256::from(7));
        assert_eq!(parse_token_id("0x0a").unwrap(), U256::from(10));
        assert_eq!(parse_token_id("0xa").unwrap(), U256::from(10));
        assert!(parse_token_id("seven").is_err());
    }

    #[test]
    fn test_pad_address_left_pads() {
        let padded = pad_address(Address::from_low_u64_be(0xabcd));
        assert_eq!(&padded.as_bytes()[..12], &[0u8; 12]);
        assert_eq!(&padded.as_bytes()[30..], &[0xab, 0xcd]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_stops_on_non_retryable() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = retry_async(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("revert".to_string()) }
            },
            3,
            Duration::from_millis(100),
            |e: &String| e != "revert",
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = retry_async(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("busy".to_string())
                    } else {
                        Ok(n)
                    }
                }
            },
            3,
            Duration::from_millis(100),
            |_| true,
        )
        .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_capped_for_large_retry_counts() {
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();
        let result: Result<(), String> = retry_async(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("busy".to_string()) }
            },
            40,
            Duration::from_secs(1),
            |_| true,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 41);
        // 1 + 2 + 4 + 8 + 16 seconds, then 35 sleeps at the cap.
        let expected = Duration::from_secs(31 + 35 * 30);
        assert!(start.elapsed() >= expected && start.elapsed() < expected + Duration::from_secs(1));
    }
}
