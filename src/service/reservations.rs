//! Capacity held by signed quotes that have not been bought yet.
//!
//! Every signed quote reserves its amount until it expires or until the
//! ledger sees a cover with the same contract, currency and amount.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::domain::{Address, CoverRecord, Currency};

/// One outstanding quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    /// The protected contract.
    pub contract: Address,
    /// Cover currency.
    pub currency: Currency,
    /// Quoted amount in whole units of `currency`.
    pub amount: Decimal,
    /// The same amount converted to ETH at signing time.
    pub amount_eth: Decimal,
    /// When the quote stops being usable.
    pub expires_at: DateTime<Utc>,
}

impl Reservation {
    fn matches(&self, cover: &CoverRecord) -> bool {
        self.contract == cover.contract
            && self.currency == cover.currency
            && self.amount == cover.sum_assured
    }
}

/// Tracks unexpired reservations.
#[derive(Debug, Default)]
pub struct ReservationTracker {
    entries: Mutex<Vec<Reservation>>,
}

impl ReservationTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a reservation.
    pub fn reserve(&self, reservation: Reservation) {
        tracing::debug!(
            contract = %reservation.contract,
            currency = %reservation.currency,
            amount = %reservation.amount,
            "capacity reserved"
        );
        self.entries.lock().push(reservation);
    }

    /// Sum in ETH of unexpired reservations for any of `contracts`.
    /// Prunes expired entries on the way.
    pub fn reserved_eth(&self, contracts: &[Address], now: DateTime<Utc>) -> Decimal {
        let mut entries = self.entries.lock();
        entries.retain(|r| r.expires_at > now);
        entries
            .iter()
            .filter(|r| contracts.contains(&r.contract))
            .map(|r| r.amount_eth)
            .sum()
    }

    /// Releases one reservation per cover that matches it. Returns the number
    /// released.
    pub fn release_confirmed(&self, covers: &[CoverRecord]) -> usize {
        let mut entries = self.entries.lock();
        let mut released = 0;
        for cover in covers {
            if let Some(pos) = entries.iter().position(|r| r.matches(cover)) {
                entries.swap_remove(pos);
                released += 1;
            }
        }
        if released > 0 {
            tracing::debug!(released, "reservations confirmed by new covers");
        }
        released
    }

    /// Drops expired entries. Returns the number dropped.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|r| r.expires_at > now);
        before - entries.len()
    }

    /// Number of tracked reservations, expired ones included until pruned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing is reserved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CoverStatus;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn contract(byte: u8) -> Address {
        Address::from_bytes([byte; 20])
    }

    fn reservation(byte: u8, amount: Decimal, ttl_secs: i64) -> Reservation {
        Reservation {
            contract: contract(byte),
            currency: Currency::Eth,
            amount,
            amount_eth: amount,
            expires_at: Utc::now() + Duration::seconds(ttl_secs),
        }
    }

    #[test]
    fn sums_unexpired_entries_of_the_group() {
        let tracker = ReservationTracker::new();
        tracker.reserve(reservation(1, dec!(10), 600));
        tracker.reserve(reservation(2, dec!(5), 600));
        tracker.reserve(reservation(3, dec!(100), 600));
        tracker.reserve(reservation(1, dec!(7), -1));

        let reserved = tracker.reserved_eth(&[contract(1), contract(2)], Utc::now());
        assert_eq!(reserved, dec!(15));
        assert_eq!(tracker.len(), 3, "expired entry pruned");
    }

    #[test]
    fn matching_cover_releases_one_reservation() {
        let tracker = ReservationTracker::new();
        tracker.reserve(reservation(1, dec!(10), 600));
        tracker.reserve(reservation(1, dec!(10), 600));

        let cover = CoverRecord {
            id: 9,
            contract: contract(1),
            currency: Currency::Eth,
            sum_assured: dec!(10),
            valid_until: Utc::now() + Duration::days(30),
            status: CoverStatus::Active,
            requested_payout_amount: Decimal::ZERO,
        };
        assert_eq!(tracker.release_confirmed(&[cover.clone()]), 1);
        assert_eq!(tracker.len(), 1);

        let mut other = cover;
        other.currency = Currency::Dai;
        assert_eq!(tracker.release_confirmed(&[other]), 0);
    }

    #[test]
    fn prune_drops_expired() {
        let tracker = ReservationTracker::new();
        tracker.reserve(reservation(1, dec!(1), -5));
        tracker.reserve(reservation(1, dec!(1), 600));
        assert_eq!(tracker.prune(Utc::now()), 1);
        assert!(!tracker.is_empty());
    }
}
