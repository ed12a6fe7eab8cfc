//! Executor options passed to `quoteBridgeSend` and `bridgeSend`.
//!
//! Layout (38 bytes, big-endian):
//!
//! ```text
//! 0x0003 | 0x01   | 0x0021 | 0x01     | gas (16) | value (16)
//! type   | worker | size   | sub-type |
//! ```
//!
//! The quote and the send must carry identical bytes, so both go through
//! [`ExecutorLzReceiveOption::encode`].

use ethers::types::Bytes;

use crate::error::OptionsError;

pub const OPTIONS_TYPE_3: u16 = 3;
pub const EXECUTOR_WORKER_ID: u8 = 1;
pub const LZ_RECEIVE_OPTION: u8 = 1;

/// Sub-type byte plus the two 16-byte words.
const OPTION_SIZE: u16 = 33;
const HEADER_LEN: usize = 6;
pub const ENCODED_LEN: usize = HEADER_LEN + 32;

/// `lzReceive` gas and native value for the destination executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorLzReceiveOption {
    pub gas: u128,
    pub value: u128,
}

impl ExecutorLzReceiveOption {
    pub fn new(gas: u128) -> Self {
        Self { gas, value: 0 }
    }

    /// Destination gas for a batch: per-token gas times the number of tokens.
    pub fn for_batch(gas_per_token: u128, batch_size: usize) -> Self {
        Self::new(gas_per_token.saturating_mul(batch_size as u128))
    }

    pub fn with_value(mut self, value: u128) -> Self {
        self.value = value;
        self
    }

    pub fn encode(&self) -> Bytes {
        let mut out = Vec::with_capacity(ENCODED_LEN);
        out.extend_from_slice(&OPTIONS_TYPE_3.to_be_bytes());
        out.push(EXECUTOR_WORKER_ID);
        out.extend_from_slice(&OPTION_SIZE.to_be_bytes());
        out.push(LZ_RECEIVE_OPTION);
        out.extend_from_slice(&self.gas.to_be_bytes());
        out.extend_from_slice(&self.value.to_be_bytes());
        Bytes::from(out)
    }

    /// `0x`-prefixed lowercase hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.encode()))
    }

    pub fn decode(raw: &[u8]) -> Result<Self, OptionsError> {
        if raw.len() != ENCODED_LEN {
            return Err(OptionsError::Length {
                expected: ENCODED_LEN,
                actual: raw.len(),
            });
        }

        let option_type = u16::from_be_bytes([raw[0], raw[1]]);
        if option_type != OPTIONS_TYPE_3 {
            return Err(OptionsError::OptionType(option_type));
        }
        if raw[2] != EXECUTOR_WORKER_ID {
            return Err(OptionsError::Worker(raw[2]));
        }
        let size = u16::from_be_bytes([raw[3], raw[4]]);
        if size != OPTION_SIZE {
            return Err(OptionsError::Size(size));
        }
        if raw[5] != LZ_RECEIVE_OPTION {
            return Err(OptionsError::SubType(raw[5]));
        }

        let mut gas = [0u8; 16];
        gas.copy_from_slice(&raw[HEADER_LEN..HEADER_LEN + 16]);
        let mut value = [0u8; 16];
        value.copy_from_slice(&raw[HEADER_LEN + 16..]);

        Ok(Self {
            gas: u128::from_be_bytes(gas),
            value: u128::from_be_bytes(value),
        })
    }

    pub fn from_hex(raw: &str) -> Result<Self, OptionsError> {
        let stripped = raw.strip_prefix("0x").unwrap_or(raw);
        let bytes = hex::decode(stripped).map_err(|e| OptionsError::InvalidHex(e.to_string()))?;
        Self::decode(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_encoding() {
        let hex = ExecutorLzReceiveOption::new(750_000).to_hex();
        // 750_000 == 0x0b71b0
        let expected = format!("0x000301002101{}b71b0{}", "0".repeat(27), "0".repeat(32));
        assert_eq!(hex, expected);
        assert_eq!(hex.len(), 2 + ENCODED_LEN * 2);
    }

    #[test]
    fn test_layout() {
        let bytes = ExecutorLzReceiveOption::new(200_000).with_value(5).encode();
        assert_eq!(bytes.len(), ENCODED_LEN);
        assert_eq!(&bytes[..6], &[0x00, 0x03, 0x01, 0x00, 0x21, 0x01]);
        assert_eq!(&bytes[6..22], &200_000u128.to_be_bytes());
        assert_eq!(bytes[37], 5);
    }

    #[test]
    fn test_decode_recovers_gas() {
        let option = ExecutorLzReceiveOption::for_batch(750_000, 3);
        let decoded = ExecutorLzReceiveOption::from_hex(&option.to_hex()).unwrap();
        assert_eq!(decoded.gas, 2_250_000);
        assert_eq!(decoded.value, 0);
    }

    #[test]
    fn test_decode_rejects_malformed() {
        let good = ExecutorLzReceiveOption::new(1).encode().to_vec();

        assert_eq!(
            ExecutorLzReceiveOption::decode(&good[..37]),
            Err(OptionsError::Length { expected: 38, actual: 37 })
        );

        let mut bad = good.clone();
        bad[1] = 0x01;
        assert_eq!(ExecutorLzReceiveOption::decode(&bad), Err(OptionsError::OptionType(1)));

        let mut bad = good.clone();
        bad[2] = 0x02;
        assert_eq!(ExecutorLzReceiveOption::decode(&bad), Err(OptionsError::Worker(2)));

        let mut bad = good.clone();
        bad[4] = 0x11;
        assert_eq!(ExecutorLzReceiveOption::decode(&bad), Err(OptionsError::Size(0x11)));

        let mut bad = good;
        bad[5] = 0x03;
        assert_eq!(ExecutorLzReceiveOption::decode(&bad), Err(OptionsError::SubType(3)));

        assert!(matches!(
            ExecutorLzReceiveOption::from_hex("0xzz"),
            Err(OptionsError::InvalidHex(_))
        ));
    }
}
