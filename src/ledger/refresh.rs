//! Background tasks keeping the ledger current.
//!
//! Two independent interval loops:
//!
//! - **sync**: appends new covers and releases reservations they confirm.
//!   Skips its tick if a writer is active.
//! - **payout check**: scans payout logs and rebuilds the ledger when a
//!   payout is found. Waits for an active writer.
//!
//! Failures are logged and the loop continues on the next tick.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::cover_ledger::{CoverLedger, PayoutCheck};
use crate::service::ReservationTracker;

/// Periods of the background loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshIntervals {
    /// Between incremental syncs.
    pub sync: Duration,
    /// Between payout scans.
    pub payout_check: Duration,
}

impl Default for RefreshIntervals {
    fn default() -> Self {
        Self {
            sync: Duration::from_secs(60),
            payout_check: Duration::from_secs(300),
        }
    }
}

/// Spawns the sync and payout-check loops. Abort the handles to stop them.
#[must_use]
pub fn spawn_refresh_tasks(
    ledger: Arc<CoverLedger>,
    reservations: Arc<ReservationTracker>,
    intervals: RefreshIntervals,
) -> Vec<JoinHandle<()>> {
    let sync_task = tokio::spawn(sync_loop(
        Arc::clone(&ledger),
        reservations,
        intervals.sync,
    ));
    let payout_task = tokio::spawn(payout_loop(ledger, intervals.payout_check));
    vec![sync_task, payout_task]
}

async fn sync_loop(
    ledger: Arc<CoverLedger>,
    reservations: Arc<ReservationTracker>,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick fires immediately; startup already ran a full sync.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match ledger.try_sync().await {
            None => tracing::debug!("ledger writer busy, sync tick skipped"),
            Some(Ok(report)) => {
                reservations.release_confirmed(&report.new_covers);
                reservations.prune(Utc::now());
            }
            Some(Err(e)) => tracing::warn!(error = %e, "ledger sync failed"),
        }
    }
}

async fn payout_loop(ledger: Arc<CoverLedger>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match ledger.check_payouts().await {
            Ok(PayoutCheck::Clean { verified_to }) => {
                tracing::debug!(verified_to, "no payouts");
            }
            Ok(PayoutCheck::Rebuilt { payouts, verified_to }) => {
                tracing::info!(payouts, verified_to, "ledger rebuilt after payouts");
            }
            Err(e) => tracing::warn!(error = %e, "payout check failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainDataSource, InMemoryChain};
    use crate::domain::{Address, CoverRecord, CoverStatus, Currency};
    use crate::ledger::LedgerConfig;
    use crate::service::Reservation;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn sync_loop_picks_up_new_covers_and_releases_reservations() {
        let chain = Arc::new(InMemoryChain::new());
        let ledger = Arc::new(CoverLedger::new(
            Arc::clone(&chain) as Arc<dyn ChainDataSource>,
            LedgerConfig::default(),
        ));
        let reservations = Arc::new(ReservationTracker::new());
        let contract = Address::from_bytes([7; 20]);
        reservations.reserve(Reservation {
            contract,
            currency: Currency::Eth,
            amount: dec!(10),
            amount_eth: dec!(10),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        });

        let handles = spawn_refresh_tasks(
            Arc::clone(&ledger),
            Arc::clone(&reservations),
            RefreshIntervals {
                sync: Duration::from_millis(20),
                payout_check: Duration::from_secs(3600),
            },
        );

        chain.put_cover(CoverRecord {
            id: 1,
            contract,
            currency: Currency::Eth,
            sum_assured: dec!(10),
            valid_until: Utc::now() + chrono::Duration::days(30),
            status: CoverStatus::Active,
            requested_payout_amount: Decimal::ZERO,
        });
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(ledger.status().await.last_checked_id, 1);
        assert!(reservations.is_empty());
        for handle in handles {
            handle.abort();
        }
    }
}
