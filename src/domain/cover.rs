//! Cover records mirrored from the cover registry.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::{Address, Currency};

/// Lifecycle status of a cover as far as exposure accounting is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverStatus {
    /// The cover counts toward exposure until it expires.
    Active,
    /// A claim was accepted and paid out; the cover no longer counts.
    ClaimAccepted,
}

/// A single cover as recorded on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoverRecord {
    /// Sequential cover id assigned by the registry.
    pub id: u64,
    /// The protected contract.
    pub contract: Address,
    /// Denomination of `sum_assured`.
    pub currency: Currency,
    /// Insured amount in whole units of `currency`.
    pub sum_assured: Decimal,
    /// End of coverage.
    pub valid_until: DateTime<Utc>,
    /// Claim status.
    pub status: CoverStatus,
    /// Payout requested by a pending or accepted claim, in whole units.
    pub requested_payout_amount: Decimal,
}

impl CoverRecord {
    /// Returns `true` if the cover still contributes to exposure at `now`.
    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_until > now && self.status != CoverStatus::ClaimAccepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn cover(valid_until: DateTime<Utc>, status: CoverStatus) -> CoverRecord {
        CoverRecord {
            id: 1,
            contract: Address::ZERO,
            currency: Currency::Eth,
            sum_assured: dec!(10),
            valid_until,
            status,
            requested_payout_amount: Decimal::ZERO,
        }
    }

    #[test]
    fn active_until_expiry() {
        let now = Utc::now();
        assert!(cover(now + Duration::days(1), CoverStatus::Active).is_active_at(now));
        assert!(!cover(now, CoverStatus::Active).is_active_at(now));
        assert!(!cover(now - Duration::days(1), CoverStatus::Active).is_active_at(now));
    }

    #[test]
    fn accepted_claim_is_not_active() {
        let now = Utc::now();
        assert!(!cover(now + Duration::days(1), CoverStatus::ClaimAccepted).is_active_at(now));
    }
}
