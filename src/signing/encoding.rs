//! Packed encoding of quote parameters as checked by the on-chain verifier.
//!
//! Layout (206 bytes):
//!
//! | field            | type    | bytes |
//! |------------------|---------|-------|
//! | amount           | uint256 | 32    |
//! | currency         | bytes4  | 4     |
//! | period (days)    | uint16  | 2     |
//! | contract         | address | 20    |
//! | price            | uint256 | 32    |
//! | price in token   | uint256 | 32    |
//! | expires at (s)   | uint256 | 32    |
//! | generated at (ms)| uint256 | 32    |
//! | verifier         | address | 20    |

use sha3::{Digest, Keccak256};

use crate::domain::{Address, Currency};

/// Length of [`QuoteParams::encode_packed`] output.
pub const PACKED_LEN: usize = 206;

const PERSONAL_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

/// Every field covered by a quote signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteParams {
    /// Cover amount, whole units.
    pub amount: u64,
    /// Cover currency.
    pub currency: Currency,
    /// Cover period in days.
    pub period_days: u16,
    /// Protected contract.
    pub contract: Address,
    /// Premium, smallest currency unit.
    pub price: u128,
    /// Premium in settlement-token wei.
    pub price_in_token: u128,
    /// Expiry, seconds since the epoch.
    pub expires_at: u64,
    /// Generation time, milliseconds since the epoch.
    pub generated_at_ms: u64,
    /// Contract that will verify the signature.
    pub verifier: Address,
}

impl QuoteParams {
    /// Tightly packed encoding, no padding between fields.
    #[must_use]
    pub fn encode_packed(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PACKED_LEN);
        out.extend_from_slice(&uint256(u128::from(self.amount)));
        out.extend_from_slice(&self.currency.code());
        out.extend_from_slice(&self.period_days.to_be_bytes());
        out.extend_from_slice(self.contract.as_bytes());
        out.extend_from_slice(&uint256(self.price));
        out.extend_from_slice(&uint256(self.price_in_token));
        out.extend_from_slice(&uint256(u128::from(self.expires_at)));
        out.extend_from_slice(&uint256(u128::from(self.generated_at_ms)));
        out.extend_from_slice(self.verifier.as_bytes());
        out
    }

    /// Keccak-256 of the packed encoding.
    #[must_use]
    pub fn hash(&self) -> [u8; 32] {
        keccak256(&self.encode_packed())
    }

    /// Hash the signer actually signs: the packed hash wrapped in the
    /// personal-message envelope.
    #[must_use]
    pub fn signing_hash(&self) -> [u8; 32] {
        personal_message_hash(&self.hash())
    }
}

/// `keccak256("\x19Ethereum Signed Message:\n32" ‖ hash)`.
#[must_use]
pub fn personal_message_hash(hash: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(PERSONAL_MESSAGE_PREFIX);
    hasher.update(hash);
    hasher.finalize().into()
}

/// Keccak-256 digest.
#[must_use]
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

fn uint256(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word.split_at_mut(16).1.copy_from_slice(&value.to_be_bytes());
    word
}

#[cfg(test)]
#[allow(clippy::panic)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn address(s: &str) -> Address {
        let Ok(addr) = s.parse() else {
            panic!("valid address {s}");
        };
        addr
    }

    pub(crate) fn eth_quote() -> QuoteParams {
        QuoteParams {
            amount: 1000,
            currency: Currency::Eth,
            period_days: 100,
            contract: address("0x3d9819210a31b4961b30ef54be2aed79b9c9cd3b"),
            price: 13_346_578_668_603_537_188,
            price_in_token: 451_561_311_853_817_774_240,
            expires_at: 1_595_434_956,
            generated_at_ms: 1_595_431_355_422,
            verifier: address("0x1776651f58a17a50098d31ba3c3cd259c1903f7a"),
        }
    }

    pub(crate) fn dai_quote() -> QuoteParams {
        QuoteParams {
            amount: 1_700_000,
            currency: Currency::Dai,
            period_days: 170,
            ..eth_quote()
        }
    }

    #[test]
    fn packed_encoding_matches_verifier_layout() {
        let packed = eth_quote().encode_packed();
        assert_eq!(packed.len(), PACKED_LEN);
        assert_eq!(
            hex::encode(packed),
            concat!(
                "00000000000000000000000000000000000000000000000000000000000003e8",
                "45544800",
                "0064",
                "3d9819210a31b4961b30ef54be2aed79b9c9cd3b",
                "000000000000000000000000000000000000000000000000b9389295fceb7724",
                "0000000000000000000000000000000000000000000000187aac0ca81c3240a0",
                "000000000000000000000000000000000000000000000000000000005f1867cc",
                "00000000000000000000000000000000000000000000000000000173771e841e",
                "1776651f58a17a50098d31ba3c3cd259c1903f7a",
            )
        );
    }

    #[test]
    fn hashes_match_reference_vectors() {
        let eth = eth_quote();
        assert_eq!(
            hex::encode(eth.hash()),
            "873ec9a322dc1383d81168946a888c6b6b671c0f5bf11f93609ba1556390f31f"
        );
        assert_eq!(
            hex::encode(eth.signing_hash()),
            "40a2f4134ccdf05b740a6773eb767f14767ab80066c720dd2eeaae11ba508790"
        );

        let dai = dai_quote();
        assert_eq!(
            hex::encode(dai.hash()),
            "3b889307a90d9ad7f4fffddb4b7863faa627d7614ae7d110ad9517cba1a2e30e"
        );
        assert_eq!(
            hex::encode(dai.signing_hash()),
            "db31086566fb5dceb273a35da5960b3913e98765dc71a1c58236da83f70ba2c4"
        );
    }

    #[test]
    fn dai_encoding_differs_only_in_leading_fields() {
        let packed = hex::encode(dai_quote().encode_packed());
        assert!(packed.starts_with(concat!(
            "000000000000000000000000000000000000000000000000000000000019f0a0",
            "44414900",
            "00aa",
        )));
    }
}
