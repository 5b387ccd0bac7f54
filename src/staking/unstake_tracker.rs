//! Net stake: raw stake discounted by pending withdrawals.
//!
//! A pending unstake request is not guaranteed to complete, so only half of
//! the pending amount is treated as already withdrawn:
//!
//! ```text
//! netStake = max(rawStake − pendingUnstake / 2, 0)
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::chain::{ChainDataSource, ChainError, UnstakeRequest, with_timeout};
use crate::domain::Address;

const SECS_PER_DAY: u64 = 86_400;

/// How far back unstake requests are considered, plus the one-time timestamp
/// correction for requests emitted before a historical cutover block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnstakeWindow {
    /// Days the pool takes to process an unstake request.
    pub processing_days: u64,
    /// Extra days of lookback beyond the processing time.
    pub buffer_days: u64,
    /// Assumed seconds per block when converting days to blocks.
    pub block_interval_secs: u64,
    /// Requests emitted before this block get `correction_offset_secs` added.
    pub correction_cutover_block: u64,
    /// Offset applied to pre-cutover `effective_at` values.
    pub correction_offset_secs: i64,
}

impl Default for UnstakeWindow {
    fn default() -> Self {
        Self {
            processing_days: 90,
            buffer_days: 30,
            block_interval_secs: 15,
            correction_cutover_block: 0,
            correction_offset_secs: 0,
        }
    }
}

impl UnstakeWindow {
    /// Lookback window converted to a number of blocks.
    #[must_use]
    pub fn lookback_blocks(&self) -> u64 {
        self.processing_days
            .saturating_add(self.buffer_days)
            .saturating_mul(SECS_PER_DAY)
            .checked_div(self.block_interval_secs)
            .unwrap_or(0)
    }

    /// `effective_at` of `request` after the pre-cutover correction.
    #[must_use]
    pub fn corrected_effective_at(&self, request: &UnstakeRequest) -> DateTime<Utc> {
        if request.block_number < self.correction_cutover_block {
            request.effective_at + chrono::Duration::seconds(self.correction_offset_secs)
        } else {
            request.effective_at
        }
    }

    /// Sum of requests at or after the oldest unprocessed request.
    ///
    /// Zero when the pool has nothing left to process.
    #[must_use]
    pub fn pending_unstake(
        &self,
        requests: &[UnstakeRequest],
        first_unprocessed: Option<DateTime<Utc>>,
    ) -> Decimal {
        let Some(first) = first_unprocessed else {
            return Decimal::ZERO;
        };
        requests
            .iter()
            .filter(|r| self.corrected_effective_at(r) >= first)
            .map(|r| r.amount)
            .sum()
    }
}

/// `max(raw − pending / 2, 0)`.
#[must_use]
pub fn net_stake(raw_stake: Decimal, pending_unstake: Decimal) -> Decimal {
    (raw_stake - pending_unstake / Decimal::TWO).max(Decimal::ZERO)
}

/// Stake figures for one contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakeSnapshot {
    /// Stake allocated on chain.
    pub raw: Decimal,
    /// Pending unstake amount inside the lookback window.
    pub pending: Decimal,
    /// Discounted stake used for pricing.
    pub net: Decimal,
}

/// Reads stake and unstake state from the chain and derives net stake.
#[derive(Debug, Clone)]
pub struct StakeTracker {
    chain: Arc<dyn ChainDataSource>,
    window: UnstakeWindow,
    timeout: Duration,
}

impl StakeTracker {
    /// Creates a tracker reading from `chain`, each read bounded by `timeout`.
    #[must_use]
    pub fn new(chain: Arc<dyn ChainDataSource>, window: UnstakeWindow, timeout: Duration) -> Self {
        Self {
            chain,
            window,
            timeout,
        }
    }

    /// Raw, pending and net stake for `contract`.
    ///
    /// # Errors
    ///
    /// Returns the first [`ChainError`] encountered; no partial result.
    pub async fn stake(&self, contract: Address) -> Result<StakeSnapshot, ChainError> {
        let head = with_timeout(self.timeout, "block_number", self.chain.block_number()).await?;
        let from_block = head.saturating_sub(self.window.lookback_blocks());

        let (raw, requests, first_unprocessed) = tokio::try_join!(
            with_timeout(self.timeout, "contract_stake", self.chain.contract_stake(contract)),
            with_timeout(
                self.timeout,
                "unstake_requests",
                self.chain.unstake_requests(contract, from_block, head),
            ),
            with_timeout(
                self.timeout,
                "first_unprocessed_unstake",
                self.chain.first_unprocessed_unstake(),
            ),
        )?;

        let pending = self.window.pending_unstake(&requests, first_unprocessed);
        let net = net_stake(raw, pending);
        tracing::debug!(%contract, %raw, %pending, %net, "stake resolved");
        Ok(StakeSnapshot { raw, pending, net })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::chain::InMemoryChain;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn at(day: u32) -> DateTime<Utc> {
        let Some(t) = Utc.with_ymd_and_hms(2021, 3, day, 0, 0, 0).single() else {
            panic!("valid date");
        };
        t
    }

    fn request(amount: Decimal, effective_day: u32, block_number: u64) -> UnstakeRequest {
        UnstakeRequest {
            contract: Address::ZERO,
            amount,
            effective_at: at(effective_day),
            block_number,
        }
    }

    #[test]
    fn net_stake_halves_pending_and_clamps() {
        assert_eq!(net_stake(dec!(1000), dec!(400)), dec!(800));
        assert_eq!(net_stake(dec!(100), dec!(400)), Decimal::ZERO);
        assert_eq!(net_stake(dec!(100), Decimal::ZERO), dec!(100));
    }

    #[test]
    fn lookback_blocks_from_days() {
        // (90 + 30) days at 15 s per block.
        assert_eq!(UnstakeWindow::default().lookback_blocks(), 691_200);
        let degenerate = UnstakeWindow {
            block_interval_secs: 0,
            ..UnstakeWindow::default()
        };
        assert_eq!(degenerate.lookback_blocks(), 0);
    }

    #[test]
    fn pending_counts_requests_from_first_unprocessed() {
        let window = UnstakeWindow::default();
        let requests = [
            request(dec!(10), 1, 100),
            request(dec!(20), 5, 200),
            request(dec!(30), 9, 300),
        ];
        assert_eq!(window.pending_unstake(&requests, Some(at(5))), dec!(50));
        assert_eq!(window.pending_unstake(&requests, None), Decimal::ZERO);
    }

    #[test]
    fn correction_applies_only_before_cutover() {
        let window = UnstakeWindow {
            correction_cutover_block: 250,
            correction_offset_secs: 4 * 86_400,
            ..UnstakeWindow::default()
        };
        let early = request(dec!(10), 1, 100);
        let late = request(dec!(10), 1, 300);
        assert_eq!(window.corrected_effective_at(&early), at(5));
        assert_eq!(window.corrected_effective_at(&late), at(1));

        // The early request is shifted into the pending range.
        assert_eq!(window.pending_unstake(&[early, late], Some(at(3))), dec!(10));
    }

    #[tokio::test]
    async fn tracker_reads_chain() {
        let chain = Arc::new(InMemoryChain::new());
        chain.set_block_number(1_000_000);
        chain.set_stake(Address::ZERO, dec!(1000));
        chain.push_unstake(request(dec!(200), 10, 900_000));
        // Outside the lookback window.
        chain.push_unstake(request(dec!(500), 10, 100_000));
        chain.set_first_unprocessed_unstake(Some(at(2)));

        let tracker = StakeTracker::new(chain, UnstakeWindow::default(), Duration::from_secs(1));
        let Ok(stake) = tracker.stake(Address::ZERO).await else {
            panic!("chain reads succeed");
        };
        assert_eq!(stake.raw, dec!(1000));
        assert_eq!(stake.pending, dec!(200));
        assert_eq!(stake.net, dec!(900));
    }

    #[tokio::test]
    async fn tracker_propagates_failures() {
        let chain = Arc::new(InMemoryChain::new());
        chain.set_failing(true);
        let tracker = StakeTracker::new(chain, UnstakeWindow::default(), Duration::from_secs(1));
        assert!(tracker.stake(Address::ZERO).await.is_err());
    }
}
