//! Quote requests, signed quotes and rejection outcomes.

use std::fmt;

use serde::Serialize;

use super::address::AddressError;
use super::currency::UnsupportedCurrency;
use super::{Address, Currency};

/// Shortest cover period accepted, in days.
pub const MIN_PERIOD_DAYS: u16 = 30;

/// Longest cover period accepted, in days.
pub const MAX_PERIOD_DAYS: u16 = 365;

/// Errors produced while validating raw quote parameters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuoteRequestError {
    /// The contract address is malformed.
    #[error("invalid contract address: {0}")]
    Contract(#[from] AddressError),

    /// The amount is not a positive integer.
    #[error("amount must be a positive integer, got {0:?}")]
    Amount(String),

    /// The currency is not supported.
    #[error(transparent)]
    Currency(#[from] UnsupportedCurrency),

    /// The period is not an integer within the accepted range.
    #[error("period must be an integer between 30 and 365 days, got {0:?}")]
    Period(String),
}

/// A validated request for a cover quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteRequest {
    /// The protected contract.
    pub contract: Address,
    /// Requested cover amount in whole units of `currency`.
    pub amount: u64,
    /// Cover currency.
    pub currency: Currency,
    /// Cover period in days.
    pub period_days: u16,
}

impl QuoteRequest {
    /// Validates raw string parameters as received over HTTP.
    ///
    /// # Errors
    ///
    /// Returns a [`QuoteRequestError`] describing the first invalid field.
    pub fn parse(
        contract: &str,
        amount: &str,
        currency: &str,
        period: &str,
    ) -> Result<Self, QuoteRequestError> {
        let contract: Address = contract.parse()?;
        let amount = parse_positive_integer(amount)
            .ok_or_else(|| QuoteRequestError::Amount(amount.to_string()))?;
        let currency: Currency = currency.parse()?;
        let period_days = period
            .parse::<u16>()
            .ok()
            .filter(|days| (MIN_PERIOD_DAYS..=MAX_PERIOD_DAYS).contains(days))
            .ok_or_else(|| QuoteRequestError::Period(period.to_string()))?;

        Ok(Self {
            contract,
            amount,
            currency,
            period_days,
        })
    }
}

fn parse_positive_integer(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<u64>().ok().filter(|v| *v > 0)
}

/// A recoverable secp256k1 signature in the `(v, r, s)` form verifiers expect.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct QuoteSignature {
    /// Recovery byte, `27` or `28`.
    pub v: u8,
    /// The `r` scalar, big-endian.
    pub r: [u8; 32],
    /// The `s` scalar, big-endian, always in the lower half of the curve order.
    pub s: [u8; 32],
}

impl QuoteSignature {
    /// `r` as `0x`-prefixed hex.
    #[must_use]
    pub fn r_hex(&self) -> String {
        format!("0x{}", hex::encode(self.r))
    }

    /// `s` as `0x`-prefixed hex.
    #[must_use]
    pub fn s_hex(&self) -> String {
        format!("0x{}", hex::encode(self.s))
    }
}

impl fmt::Debug for QuoteSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuoteSignature")
            .field("v", &self.v)
            .field("r", &self.r_hex())
            .field("s", &self.s_hex())
            .finish()
    }
}

/// A priced and signed quote. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedQuote {
    /// The protected contract.
    pub contract: Address,
    /// Cover currency.
    pub currency: Currency,
    /// Cover period in days.
    pub period_days: u16,
    /// Offered cover amount in whole units; never above `requested_amount`.
    pub amount: u64,
    /// Amount originally requested.
    pub requested_amount: u64,
    /// Premium in the smallest unit of `currency`.
    pub price: u128,
    /// Premium in the smallest unit of the settlement token.
    pub price_in_token: u128,
    /// Generation time, milliseconds since the epoch.
    pub generated_at_ms: u64,
    /// Expiry, seconds since the epoch.
    pub expires_at: u64,
    /// Signature over the packed quote parameters.
    pub signature: QuoteSignature,
}

impl SignedQuote {
    /// Returns `true` when the offered amount was reduced to fit capacity.
    #[must_use]
    pub fn is_capped(&self) -> bool {
        self.amount < self.requested_amount
    }
}

/// Why no quote could be signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QuoteRejection {
    /// The contract has no net stake behind it.
    #[serde(rename = "Uncoverable")]
    Uncoverable,
    /// No capacity is left after active covers and reservations.
    #[serde(rename = "capacityLimitExceed")]
    CapacityExceeded,
}

impl QuoteRejection {
    /// The reason string exposed to clients.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uncoverable => "Uncoverable",
            Self::CapacityExceeded => "capacityLimitExceed",
        }
    }
}

impl fmt::Display for QuoteRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a quote request that passed validation and chain reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuoteOutcome {
    /// A signed quote.
    Signed(SignedQuote),
    /// A structured business rejection; nothing was signed.
    Rejected {
        /// The protected contract.
        contract: Address,
        /// Why the quote was rejected.
        reason: QuoteRejection,
        /// Generation time, milliseconds since the epoch.
        generated_at_ms: u64,
        /// Expiry, seconds since the epoch.
        expires_at: u64,
    },
}

/// Expiry for a quote generated at `generated_at_ms`, rounded up to the second.
#[must_use]
pub fn expiry_for(generated_at_ms: u64, ttl_secs: u64) -> u64 {
    generated_at_ms
        .saturating_add(ttl_secs.saturating_mul(1000))
        .div_ceil(1000)
}
