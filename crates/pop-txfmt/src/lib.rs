//! Binary format for the PoP payout pseudo-transaction.
//!
//! The payout record mimics a solidity call to
//! `mintPoPRewards(uint64,address[],uint256[])`: a 4-byte selector followed
//! by big-endian 32-byte words. The array offsets exist only as a
//! format-compatibility check and are validated, never used for random
//! access.
//!
//! ```text
//! +---------+------------------------------+
//! | Bytes   | Field                        |
//! +---------+------------------------------+
//! | 4       | Function selector            |
//! | 32      | Rewarded block number        |
//! | 32      | Offset of address array      |
//! | 32      | Offset of amount array       |
//! | 32      | Address array length (N)     |
//! | 32 * N  | Addresses, right-justified   |
//! | 32      | Amount array length (== N)   |
//! | 32 * N  | Amounts (uint256)            |
//! +---------+------------------------------+
//! ```

use std::sync::OnceLock;

use alloy_primitives::{
    bytes::{Buf, BufMut, BytesMut},
    keccak256, Address, U256,
};
use cairn_primitives::PopPayout;
use thiserror::Error;

/// Call signature the selector is derived from.
pub const POP_PAYOUT_FN_SIG: &str = "mintPoPRewards(uint64,address[],uint256[])";

/// Maximum number of payout entries in one record.
pub const MAX_PAYOUTS_PER_TX: usize = 64;

/// Every call argument is padded to one 32-byte word.
pub const WORD_LEN: usize = 32;

/// Selector + block number + both offsets + both (length, one entry) pairs.
pub const MIN_ENCODED_LEN: usize = 4 + WORD_LEN + (2 * WORD_LEN) + (2 * WORD_LEN) + (2 * WORD_LEN);

/// The address array always starts right after the three scaffolding words.
const ADDR_ARRAY_OFFSET: u64 = (WORD_LEN * 3) as u64;

/// Returns the 4-byte selector for [`POP_PAYOUT_FN_SIG`].
pub fn pop_payout_selector() -> [u8; 4] {
    static SELECTOR: OnceLock<[u8; 4]> = OnceLock::new();
    *SELECTOR.get_or_init(|| {
        let hash = keccak256(POP_PAYOUT_FN_SIG.as_bytes());
        hash[..4].try_into().expect("hash is at least 4 bytes")
    })
}

/// Payout format violations. All of these are permanent: a record that
/// fails to decode is a chain-validation failure, never retried.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PopTxFmtError {
    #[error("encoded payout must be at least {MIN_ENCODED_LEN} bytes, got {0}")]
    TooShort(usize),

    #[error("bad function selector")]
    BadSelector,

    #[error("address array offset {0:#x} should always be {ADDR_ARRAY_OFFSET:#x}")]
    BadAddressOffset(u64),

    #[error("payout array length {0} exceeds maximum {MAX_PAYOUTS_PER_TX}")]
    PayoutCountExceeded(u64),

    #[error("amount array offset is {actual:#x} but was expected to be {expected:#x}")]
    AmountOffsetMismatch { actual: u64, expected: u64 },

    #[error("address count {addresses} does not match amount count {amounts}")]
    CountMismatch { addresses: u64, amounts: u64 },

    #[error("word has nonzero padding")]
    BadPadding,

    #[error("unexpected end of payout record")]
    UnexpectedEnd,

    #[error("trailing bytes after payout record")]
    TrailingBytes,
}

/// The decoded contents of a PoP payout pseudo-transaction.
///
/// Addresses and amounts are positionally paired; every constructor and the
/// decoder maintain `miner_addresses.len() == miner_amounts.len()`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PopPayoutTxData {
    pub block_rewarded: u64,
    pub miner_addresses: Vec<Address>,
    pub miner_amounts: Vec<U256>,
}

impl PopPayoutTxData {
    /// Assembles a record from per-miner reward lines.
    pub fn from_payouts(block_rewarded: u64, payouts: &[PopPayout]) -> Self {
        Self {
            block_rewarded,
            miner_addresses: payouts.iter().map(|p| p.miner_address).collect(),
            miner_amounts: payouts.iter().map(|p| p.amount).collect(),
        }
    }

    /// Number of payout entries.
    pub fn len(&self) -> usize {
        self.miner_addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.miner_addresses.is_empty()
    }

    /// Serializes the record into calldata bytes.
    ///
    /// Rejects records whose arrays are unpaired or oversized rather than
    /// emitting something the decoder would refuse.
    pub fn encode(&self) -> Result<Vec<u8>, PopTxFmtError> {
        let n = self.miner_addresses.len();
        if n != self.miner_amounts.len() {
            return Err(PopTxFmtError::CountMismatch {
                addresses: n as u64,
                amounts: self.miner_amounts.len() as u64,
            });
        }
        if n > MAX_PAYOUTS_PER_TX {
            return Err(PopTxFmtError::PayoutCountExceeded(n as u64));
        }

        let total = 4 + WORD_LEN + (WORD_LEN * 4) + (WORD_LEN * n) + (WORD_LEN * n);
        let mut buf = BytesMut::with_capacity(total);

        buf.put_slice(&pop_payout_selector());
        put_uint64_word(&mut buf, self.block_rewarded);
        put_uint64_word(&mut buf, ADDR_ARRAY_OFFSET);
        put_uint64_word(&mut buf, (WORD_LEN as u64) * (4 + n as u64));
        put_uint64_word(&mut buf, n as u64);
        for address in &self.miner_addresses {
            put_address_word(&mut buf, address);
        }
        put_uint64_word(&mut buf, n as u64);
        for amount in &self.miner_amounts {
            buf.put_slice(&amount.to_be_bytes::<WORD_LEN>());
        }

        Ok(buf.to_vec())
    }

    /// Deserializes a record, verifying the format exactly.
    ///
    /// The amount-array offset can only be validated once the address-array
    /// length is known; the check order here is part of the format.
    pub fn decode(data: &[u8]) -> Result<Self, PopTxFmtError> {
        if data.len() < MIN_ENCODED_LEN {
            return Err(PopTxFmtError::TooShort(data.len()));
        }

        let mut buf = data;

        let mut selector = [0u8; 4];
        buf.copy_to_slice(&mut selector);
        if selector != pop_payout_selector() {
            return Err(PopTxFmtError::BadSelector);
        }

        let block_rewarded = read_uint64_word(&mut buf)?;

        let addr_offset = read_uint64_word(&mut buf)?;
        if addr_offset != ADDR_ARRAY_OFFSET {
            return Err(PopTxFmtError::BadAddressOffset(addr_offset));
        }

        // Cannot check the amount offset until the address length is read.
        let amount_offset = read_uint64_word(&mut buf)?;

        let addr_len = read_uint64_word(&mut buf)?;
        if addr_len > MAX_PAYOUTS_PER_TX as u64 {
            return Err(PopTxFmtError::PayoutCountExceeded(addr_len));
        }

        let expected_amount_offset = (WORD_LEN as u64) * (4 + addr_len);
        if amount_offset != expected_amount_offset {
            return Err(PopTxFmtError::AmountOffsetMismatch {
                actual: amount_offset,
                expected: expected_amount_offset,
            });
        }

        let mut miner_addresses = Vec::with_capacity(addr_len as usize);
        for _ in 0..addr_len {
            miner_addresses.push(read_address_word(&mut buf)?);
        }

        let amount_len = read_uint64_word(&mut buf)?;
        if amount_len > MAX_PAYOUTS_PER_TX as u64 {
            return Err(PopTxFmtError::PayoutCountExceeded(amount_len));
        }
        if addr_len != amount_len {
            return Err(PopTxFmtError::CountMismatch {
                addresses: addr_len,
                amounts: amount_len,
            });
        }

        let mut miner_amounts = Vec::with_capacity(amount_len as usize);
        for _ in 0..amount_len {
            miner_amounts.push(read_u256_word(&mut buf)?);
        }

        if !buf.is_empty() {
            return Err(PopTxFmtError::TrailingBytes);
        }

        Ok(Self {
            block_rewarded,
            miner_addresses,
            miner_amounts,
        })
    }
}

fn put_uint64_word(buf: &mut BytesMut, value: u64) {
    buf.put_slice(&[0u8; WORD_LEN - 8]);
    buf.put_u64(value);
}

fn put_address_word(buf: &mut BytesMut, address: &Address) {
    buf.put_slice(&[0u8; WORD_LEN - Address::len_bytes()]);
    buf.put_slice(address.as_slice());
}

fn read_word<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8], PopTxFmtError> {
    if buf.remaining() < WORD_LEN {
        return Err(PopTxFmtError::UnexpectedEnd);
    }
    let (word, rest) = buf.split_at(WORD_LEN);
    *buf = rest;
    Ok(word)
}

/// Reads a uint64 right-justified in a word, requiring empty padding.
fn read_uint64_word(buf: &mut &[u8]) -> Result<u64, PopTxFmtError> {
    let word = read_word(buf)?;
    if word[..WORD_LEN - 8].iter().any(|b| *b != 0) {
        return Err(PopTxFmtError::BadPadding);
    }
    Ok(u64::from_be_bytes(
        word[WORD_LEN - 8..].try_into().expect("8-byte slice"),
    ))
}

/// Reads an address right-justified in a word, requiring empty padding.
fn read_address_word(buf: &mut &[u8]) -> Result<Address, PopTxFmtError> {
    let word = read_word(buf)?;
    let pad = WORD_LEN - Address::len_bytes();
    if word[..pad].iter().any(|b| *b != 0) {
        return Err(PopTxFmtError::BadPadding);
    }
    Ok(Address::from_slice(&word[pad..]))
}

fn read_u256_word(buf: &mut &[u8]) -> Result<U256, PopTxFmtError> {
    let word = read_word(buf)?;
    Ok(U256::from_be_slice(word))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    // The documented three-payout example: block 1000, three miners, three
    // amounts.
    const GOLDEN: &str = concat!(
        "1725877d",
        "00000000000000000000000000000000000000000000000000000000000003e8",
        "0000000000000000000000000000000000000000000000000000000000000060",
        "00000000000000000000000000000000000000000000000000000000000000e0",
        "0000000000000000000000000000000000000000000000000000000000000003",
        "00000000000000000000000043f7d4f2e15a668b443ac9bbcf944fc5200a68da",
        "0000000000000000000000000bc2e7ecc5efc445b77737509256d8e0b2f98852",
        "0000000000000000000000007a9cd08fcc037fa50b95833624f9640f308c23cc",
        "0000000000000000000000000000000000000000000000000000000000000003",
        "0000000000000000000000000000000000000000000001100000000000000000",
        "0000000000000000000000000000000000000000000002000000000000000000",
        "0000000000000000000000000000000000000000000000500000000000000000",
    );

    fn golden_record() -> PopPayoutTxData {
        PopPayoutTxData {
            block_rewarded: 1000,
            miner_addresses: vec![
                "0x43f7d4f2e15a668b443ac9bbcf944fc5200a68da".parse().unwrap(),
                "0x0bc2e7ecc5efc445b77737509256d8e0b2f98852".parse().unwrap(),
                "0x7a9cd08fcc037fa50b95833624f9640f308c23cc".parse().unwrap(),
            ],
            miner_amounts: vec![
                U256::from_str_radix("1100000000000000000", 16).unwrap(),
                U256::from_str_radix("2000000000000000000", 16).unwrap(),
                U256::from_str_radix("500000000000000000", 16).unwrap(),
            ],
        }
    }

    #[test]
    fn test_selector_bytes() {
        assert_eq!(pop_payout_selector(), [0x17, 0x25, 0x87, 0x7d]);
    }

    #[test]
    fn test_encode_golden() {
        let encoded = golden_record().encode().expect("encode");
        assert_eq!(hex::encode(encoded), GOLDEN);
    }

    #[test]
    fn test_decode_golden() {
        let data = hex::decode(GOLDEN).unwrap();
        let decoded = PopPayoutTxData::decode(&data).expect("decode");
        assert_eq!(decoded, golden_record());
    }

    #[test]
    fn test_decode_too_short() {
        let data = hex::decode(GOLDEN).unwrap();
        assert_eq!(
            PopPayoutTxData::decode(&data[..MIN_ENCODED_LEN - 1]),
            Err(PopTxFmtError::TooShort(MIN_ENCODED_LEN - 1))
        );
        assert_eq!(
            PopPayoutTxData::decode(&[]),
            Err(PopTxFmtError::TooShort(0))
        );
    }

    #[test]
    fn test_decode_bad_selector() {
        let mut data = hex::decode(GOLDEN).unwrap();
        data[0] ^= 0xff;
        assert_eq!(
            PopPayoutTxData::decode(&data),
            Err(PopTxFmtError::BadSelector)
        );
    }

    #[test]
    fn test_decode_bad_address_offset() {
        let mut data = hex::decode(GOLDEN).unwrap();
        // address-array offset word is [36..68]; flip its low byte
        data[67] = 0x40;
        assert_eq!(
            PopPayoutTxData::decode(&data),
            Err(PopTxFmtError::BadAddressOffset(0x40))
        );
    }

    #[test]
    fn test_decode_amount_offset_mismatch() {
        let mut data = hex::decode(GOLDEN).unwrap();
        // amount-array offset word is [68..100]
        data[99] = 0xc0;
        assert_eq!(
            PopPayoutTxData::decode(&data),
            Err(PopTxFmtError::AmountOffsetMismatch {
                actual: 0xc0,
                expected: 0xe0
            })
        );
    }

    #[test]
    fn test_encode_count_exceeded() {
        let record = PopPayoutTxData {
            block_rewarded: 1,
            miner_addresses: vec![Address::ZERO; MAX_PAYOUTS_PER_TX + 1],
            miner_amounts: vec![U256::ZERO; MAX_PAYOUTS_PER_TX + 1],
        };
        assert_eq!(
            record.encode(),
            Err(PopTxFmtError::PayoutCountExceeded(65))
        );
    }

    #[test]
    fn test_encode_count_mismatch() {
        let record = PopPayoutTxData {
            block_rewarded: 1,
            miner_addresses: vec![Address::ZERO; 2],
            miner_amounts: vec![U256::ZERO; 3],
        };
        assert_eq!(
            record.encode(),
            Err(PopTxFmtError::CountMismatch {
                addresses: 2,
                amounts: 3
            })
        );
    }

    #[test]
    fn test_decode_count_exceeded() {
        let mut data = hex::decode(GOLDEN).unwrap();
        // address-array length word is [100..132]; claim 65 entries
        data[131] = 65;
        assert_eq!(
            PopPayoutTxData::decode(&data),
            Err(PopTxFmtError::PayoutCountExceeded(65))
        );
    }

    #[test]
    fn test_decode_count_mismatch() {
        let mut data = hex::decode(GOLDEN).unwrap();
        // amount-array length word starts at 132 + 3 * 32 = 228
        data[259] = 2;
        assert_eq!(
            PopPayoutTxData::decode(&data),
            Err(PopTxFmtError::CountMismatch {
                addresses: 3,
                amounts: 2
            })
        );
    }

    #[test]
    fn test_decode_trailing_bytes() {
        let mut data = hex::decode(GOLDEN).unwrap();
        data.push(0);
        assert_eq!(
            PopPayoutTxData::decode(&data),
            Err(PopTxFmtError::TrailingBytes)
        );
    }

    #[test]
    fn test_decode_truncated_array() {
        let data = hex::decode(GOLDEN).unwrap();
        // drop the final amount word: the amount array is now short
        assert_eq!(
            PopPayoutTxData::decode(&data[..data.len() - WORD_LEN]),
            Err(PopTxFmtError::UnexpectedEnd)
        );
    }

    #[test]
    fn test_decode_bad_address_padding() {
        let mut data = hex::decode(GOLDEN).unwrap();
        // first pad byte of the first address word [132..164]
        data[132] = 0x01;
        assert_eq!(
            PopPayoutTxData::decode(&data),
            Err(PopTxFmtError::BadPadding)
        );
    }

    #[test]
    fn test_empty_record_not_decodable() {
        // The minimum length assumes at least one entry per array; an empty
        // record is never put on the wire (no payouts means no
        // pseudo-transaction at all) and is rejected by the decoder.
        let record = PopPayoutTxData {
            block_rewarded: 77,
            miner_addresses: vec![],
            miner_amounts: vec![],
        };
        let encoded = record.encode().expect("encode");
        assert_eq!(encoded.len(), 4 + WORD_LEN * 5);
        assert_eq!(
            PopPayoutTxData::decode(&encoded),
            Err(PopTxFmtError::TooShort(4 + WORD_LEN * 5))
        );
    }

    fn payout_strategy() -> impl Strategy<Value = PopPayout> {
        (
            prop::array::uniform20(0u8..),
            prop::array::uniform32(0u8..),
        )
            .prop_map(|(addr, amt)| {
                PopPayout::new(Address::from(addr), U256::from_be_bytes(amt))
            })
    }

    proptest! {
        #[test]
        fn test_roundtrip(
            block_rewarded in any::<u64>(),
            payouts in prop::collection::vec(payout_strategy(), 1..=MAX_PAYOUTS_PER_TX),
        ) {
            let record = PopPayoutTxData::from_payouts(block_rewarded, &payouts);
            let encoded = record.encode().expect("encode");
            let decoded = PopPayoutTxData::decode(&encoded).expect("decode");
            prop_assert_eq!(record, decoded);
        }

        #[test]
        fn test_encode_deterministic(
            block_rewarded in any::<u64>(),
            payouts in prop::collection::vec(payout_strategy(), 0..8),
        ) {
            let record = PopPayoutTxData::from_payouts(block_rewarded, &payouts);
            prop_assert_eq!(record.encode(), record.encode());
        }
    }
}
