//! Database models for issued quotes and API keys.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Address, Currency, SignedQuote};
use crate::service::Reservation;

/// A row of the `quotes` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredQuote {
    /// Row id.
    pub id: Uuid,
    /// The protected contract.
    pub contract: Address,
    /// Cover currency.
    pub currency: Currency,
    /// Cover period in days.
    pub period_days: u16,
    /// Offered amount, whole units.
    pub amount: u64,
    /// Requested amount, whole units.
    pub requested_amount: u64,
    /// Offered amount converted to ETH at signing time.
    pub amount_eth: Decimal,
    /// Premium in the smallest unit of `currency`.
    pub price: u128,
    /// Premium in the smallest unit of the settlement token.
    pub price_in_token: u128,
    /// Generation time.
    pub generated_at: DateTime<Utc>,
    /// Expiry.
    pub expires_at: DateTime<Utc>,
    /// Recovery byte.
    pub v: u8,
    /// `r` as `0x` hex.
    pub r: String,
    /// `s` as `0x` hex.
    pub s: String,
}

impl StoredQuote {
    /// Row for a freshly signed quote.
    #[must_use]
    pub fn from_signed(quote: &SignedQuote, amount_eth: Decimal) -> Self {
        let generated_at = i64::try_from(quote.generated_at_ms)
            .ok()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_default();
        let expires_at = i64::try_from(quote.expires_at)
            .ok()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or_default();
        Self {
            id: Uuid::new_v4(),
            contract: quote.contract,
            currency: quote.currency,
            period_days: quote.period_days,
            amount: quote.amount,
            requested_amount: quote.requested_amount,
            amount_eth,
            price: quote.price,
            price_in_token: quote.price_in_token,
            generated_at,
            expires_at,
            v: quote.signature.v,
            r: quote.signature.r_hex(),
            s: quote.signature.s_hex(),
        }
    }

    /// The reservation this quote holds until it expires.
    #[must_use]
    pub fn reservation(&self) -> Reservation {
        Reservation {
            contract: self.contract,
            currency: self.currency,
            amount: Decimal::from(self.amount),
            amount_eth: self.amount_eth,
            expires_at: self.expires_at,
        }
    }
}

/// A row of the `api_keys` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    /// The key presented in `x-api-key`.
    pub api_key: String,
    /// The origin the key is valid for.
    pub origin: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::QuoteSignature;
    use rust_decimal_macros::dec;

    #[test]
    fn reservation_carries_amount_and_expiry() {
        let quote = SignedQuote {
            contract: Address::ZERO,
            currency: Currency::Dai,
            period_days: 100,
            amount: 5000,
            requested_amount: 6000,
            price: 1,
            price_in_token: 2,
            generated_at_ms: 1_600_000_000_123,
            expires_at: 1_600_003_601,
            signature: QuoteSignature {
                v: 27,
                r: [1; 32],
                s: [2; 32],
            },
        };
        let stored = StoredQuote::from_signed(&quote, dec!(21.45));
        assert_eq!(stored.generated_at.timestamp_millis(), 1_600_000_000_123);

        let reservation = stored.reservation();
        assert_eq!(reservation.amount, dec!(5000));
        assert_eq!(reservation.amount_eth, dec!(21.45));
        assert_eq!(reservation.expires_at.timestamp(), 1_600_003_601);
    }
}
