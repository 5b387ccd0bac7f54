//! Local replica of the on-chain cover registry.
//!
//! [`CoverLedger`] keeps every cover read so far plus two cursors: the last
//! cover id fetched and the last block verified to contain no payouts.
//!
//! # Concurrency
//!
//! - All mutation goes through a single writer mutex. The periodic sync skips
//!   its tick when a writer is active; the payout check waits for it.
//! - Readers only take short `RwLock` read locks on the state.
//! - A full rebuild is assembled off to the side and swapped in atomically.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::try_join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::chain::{ChainDataSource, ChainError, with_timeout};
use crate::domain::{Address, CoverRecord, Currency};

/// Tunables for backfill and payout scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Covers fetched concurrently per batch.
    pub batch_size: u64,
    /// Lowest cover id to fetch.
    pub first_cover_id: u64,
    /// Block span of a single payout log query.
    pub log_chunk_blocks: u64,
    /// Deadline for each chain read.
    pub read_timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            batch_size: 200,
            first_cover_id: 1,
            log_chunk_blocks: 10_000,
            read_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct LedgerState {
    covers: BTreeMap<u64, CoverRecord>,
    last_checked_id: u64,
    last_verified_block: Option<u64>,
    last_synced_at: Option<DateTime<Utc>>,
}

/// Covers appended by a sync.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Newly fetched covers in id order.
    pub new_covers: Vec<CoverRecord>,
    /// Cursor after the sync.
    pub last_checked_id: u64,
}

/// Result of a payout check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayoutCheck {
    /// No payout in the scanned range.
    Clean {
        /// Last block scanned.
        verified_to: u64,
    },
    /// Payouts were found and the ledger was rebuilt from scratch.
    Rebuilt {
        /// Number of payout events found.
        payouts: usize,
        /// Last block scanned.
        verified_to: u64,
    },
}

/// Active cover totals per currency across a set of contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Exposure {
    /// Active ETH covers.
    pub eth: Decimal,
    /// Active DAI covers.
    pub dai: Decimal,
}

/// Snapshot of ledger progress for health reporting.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct LedgerStatus {
    /// Covers held.
    pub covers: usize,
    /// Highest cover id fetched.
    pub last_checked_id: u64,
    /// Last block verified to contain no unprocessed payouts.
    pub last_verified_block: Option<u64>,
    /// Completion time of the last successful sync.
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Single-writer replica of cover records.
#[derive(Debug)]
pub struct CoverLedger {
    chain: Arc<dyn ChainDataSource>,
    config: LedgerConfig,
    state: RwLock<LedgerState>,
    writer: Mutex<()>,
}

impl CoverLedger {
    /// Creates an empty ledger. Call [`CoverLedger::full_resync`] to backfill.
    #[must_use]
    pub fn new(chain: Arc<dyn ChainDataSource>, config: LedgerConfig) -> Self {
        let state = LedgerState {
            last_checked_id: config.first_cover_id.saturating_sub(1),
            ..LedgerState::default()
        };
        Self {
            chain,
            config,
            state: RwLock::new(state),
            writer: Mutex::new(()),
        }
    }

    /// Fetches covers created since the last sync, waiting for any active writer.
    ///
    /// # Errors
    ///
    /// Returns the [`ChainError`] of the first failed batch. Batches completed
    /// before the failure stay applied.
    pub async fn sync(&self) -> Result<SyncReport, ChainError> {
        let _writer = self.writer.lock().await;
        self.sync_locked().await
    }

    /// Like [`CoverLedger::sync`] but returns `None` immediately if another
    /// writer is active.
    pub async fn try_sync(&self) -> Option<Result<SyncReport, ChainError>> {
        let _writer = self.writer.try_lock().ok()?;
        Some(self.sync_locked().await)
    }

    async fn sync_locked(&self) -> Result<SyncReport, ChainError> {
        let needs_anchor = self.state.read().await.last_verified_block.is_none();
        if needs_anchor {
            let head = self.read("block_number", self.chain.block_number()).await?;
            self.state.write().await.last_verified_block = Some(head);
        }

        let count = self.read("cover_count", self.chain.cover_count()).await?;
        let mut cursor = self.state.read().await.last_checked_id;
        let mut report = SyncReport {
            new_covers: Vec::new(),
            last_checked_id: cursor,
        };

        while cursor < count {
            let batch_end = cursor.saturating_add(self.batch_size()).min(count);
            let covers = self.fetch_range(cursor + 1, batch_end).await?;

            let mut state = self.state.write().await;
            for cover in &covers {
                state.covers.insert(cover.id, cover.clone());
            }
            state.last_checked_id = batch_end;
            drop(state);

            cursor = batch_end;
            report.last_checked_id = cursor;
            report.new_covers.extend(covers);
        }

        self.state.write().await.last_synced_at = Some(Utc::now());
        if !report.new_covers.is_empty() {
            tracing::info!(
                new_covers = report.new_covers.len(),
                last_checked_id = report.last_checked_id,
                "ledger synced"
            );
        }
        Ok(report)
    }

    /// Rebuilds the ledger from the first cover id and swaps it in.
    ///
    /// # Errors
    ///
    /// Returns a [`ChainError`] if any read fails; the previous state is kept.
    pub async fn full_resync(&self) -> Result<usize, ChainError> {
        let _writer = self.writer.lock().await;
        self.rebuild_locked().await
    }

    async fn rebuild_locked(&self) -> Result<usize, ChainError> {
        let head = self.read("block_number", self.chain.block_number()).await?;
        let count = self.read("cover_count", self.chain.cover_count()).await?;

        let mut fresh = LedgerState {
            last_checked_id: self.config.first_cover_id.saturating_sub(1),
            last_verified_block: Some(head),
            ..LedgerState::default()
        };
        while fresh.last_checked_id < count {
            let batch_end = fresh
                .last_checked_id
                .saturating_add(self.batch_size())
                .min(count);
            for cover in self.fetch_range(fresh.last_checked_id + 1, batch_end).await? {
                fresh.covers.insert(cover.id, cover);
            }
            fresh.last_checked_id = batch_end;
        }
        fresh.last_synced_at = Some(Utc::now());

        let total = fresh.covers.len();
        *self.state.write().await = fresh;
        tracing::info!(covers = total, verified_block = head, "ledger rebuilt");
        Ok(total)
    }

    /// Scans for payouts since the last verified block and rebuilds the
    /// ledger if any are found. Waits for an active writer.
    ///
    /// # Errors
    ///
    /// Returns a [`ChainError`] if a log query or the rebuild fails. The
    /// verified block only advances on success.
    pub async fn check_payouts(&self) -> Result<PayoutCheck, ChainError> {
        let _writer = self.writer.lock().await;

        let head = self.read("block_number", self.chain.block_number()).await?;
        let Some(last_verified) = self.state.read().await.last_verified_block else {
            self.state.write().await.last_verified_block = Some(head);
            return Ok(PayoutCheck::Clean { verified_to: head });
        };

        let mut payouts = 0usize;
        let mut from = last_verified.saturating_add(1);
        let chunk = self.config.log_chunk_blocks.max(1);
        while from <= head {
            let to = from.saturating_add(chunk - 1).min(head);
            let events = self
                .read("payout_events", self.chain.payout_events(from, to))
                .await?;
            payouts += events.len();
            from = to.saturating_add(1);
        }

        if payouts == 0 {
            self.state.write().await.last_verified_block = Some(head);
            return Ok(PayoutCheck::Clean { verified_to: head });
        }

        tracing::info!(payouts, from_block = last_verified + 1, to_block = head, "payouts detected, rebuilding ledger");
        self.rebuild_locked().await?;
        // The rebuild anchored itself at a head at least as new as `head`.
        let verified_to = self
            .state
            .read()
            .await
            .last_verified_block
            .unwrap_or(head);
        Ok(PayoutCheck::Rebuilt {
            payouts,
            verified_to,
        })
    }

    /// Sum of active cover for one contract and currency at `now`.
    pub async fn active_cover_amount(
        &self,
        contract: Address,
        currency: Currency,
        now: DateTime<Utc>,
    ) -> Decimal {
        self.state
            .read()
            .await
            .covers
            .values()
            .filter(|c| c.contract == contract && c.currency == currency && c.is_active_at(now))
            .map(|c| c.sum_assured)
            .sum()
    }

    /// Active cover per currency across all `contracts` at `now`.
    pub async fn exposure(&self, contracts: &[Address], now: DateTime<Utc>) -> Exposure {
        let state = self.state.read().await;
        let mut exposure = Exposure::default();
        for cover in state.covers.values() {
            if !contracts.contains(&cover.contract) || !cover.is_active_at(now) {
                continue;
            }
            match cover.currency {
                Currency::Eth => exposure.eth += cover.sum_assured,
                Currency::Dai => exposure.dai += cover.sum_assured,
            }
        }
        exposure
    }

    /// Progress snapshot.
    pub async fn status(&self) -> LedgerStatus {
        let state = self.state.read().await;
        LedgerStatus {
            covers: state.covers.len(),
            last_checked_id: state.last_checked_id,
            last_verified_block: state.last_verified_block,
            last_synced_at: state.last_synced_at,
        }
    }

    fn batch_size(&self) -> u64 {
        self.config.batch_size.max(1)
    }

    async fn fetch_range(&self, first: u64, last: u64) -> Result<Vec<CoverRecord>, ChainError> {
        try_join_all((first..=last).map(|id| self.read("cover", self.chain.cover(id)))).await
    }

    async fn read<T>(
        &self,
        operation: &'static str,
        fut: impl std::future::Future<Output = Result<T, ChainError>>,
    ) -> Result<T, ChainError> {
        with_timeout(self.config.read_timeout, operation, fut).await
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::chain::{InMemoryChain, PayoutEvent};
    use crate::domain::CoverStatus;
    use chrono::Duration as ChronoDuration;
    use rust_decimal_macros::dec;

    fn contract(byte: u8) -> Address {
        Address::from_bytes([byte; 20])
    }

    fn cover(id: u64, contract_byte: u8, currency: Currency, amount: Decimal) -> CoverRecord {
        CoverRecord {
            id,
            contract: contract(contract_byte),
            currency,
            sum_assured: amount,
            valid_until: Utc::now() + ChronoDuration::days(30),
            status: CoverStatus::Active,
            requested_payout_amount: Decimal::ZERO,
        }
    }

    fn ledger(chain: &Arc<InMemoryChain>, batch_size: u64) -> CoverLedger {
        let config = LedgerConfig {
            batch_size,
            ..LedgerConfig::default()
        };
        CoverLedger::new(Arc::clone(chain) as Arc<dyn ChainDataSource>, config)
    }

    #[tokio::test]
    async fn sync_fetches_in_batches_and_advances_cursor() {
        let chain = Arc::new(InMemoryChain::new());
        for id in 1..=7 {
            chain.put_cover(cover(id, 1, Currency::Eth, dec!(10)));
        }
        let ledger = ledger(&chain, 3);

        let Ok(report) = ledger.sync().await else {
            panic!("sync succeeds");
        };
        assert_eq!(report.new_covers.len(), 7);
        assert_eq!(report.last_checked_id, 7);
        assert_eq!(chain.cover_reads(), 7);

        chain.put_cover(cover(8, 1, Currency::Eth, dec!(5)));
        let Ok(report) = ledger.sync().await else {
            panic!("sync succeeds");
        };
        assert_eq!(report.new_covers.len(), 1);
        assert_eq!(chain.cover_reads(), 8, "only the new id is read");
        assert_eq!(ledger.status().await.last_checked_id, 8);
    }

    #[tokio::test]
    async fn failed_sync_keeps_cursor() {
        let chain = Arc::new(InMemoryChain::new());
        chain.put_cover(cover(1, 1, Currency::Eth, dec!(10)));
        let ledger = ledger(&chain, 10);
        assert!(ledger.sync().await.is_ok());

        chain.put_cover(cover(2, 1, Currency::Eth, dec!(10)));
        chain.set_failing(true);
        assert!(ledger.sync().await.is_err());
        assert_eq!(ledger.status().await.last_checked_id, 1);
    }

    #[tokio::test]
    async fn active_amount_excludes_expired_and_claimed() {
        let chain = Arc::new(InMemoryChain::new());
        chain.put_cover(cover(1, 1, Currency::Eth, dec!(200)));
        chain.put_cover(cover(2, 1, Currency::Dai, dec!(23300)));
        let mut expired = cover(3, 1, Currency::Eth, dec!(50));
        expired.valid_until = Utc::now() - ChronoDuration::days(1);
        chain.put_cover(expired);
        let mut claimed = cover(4, 1, Currency::Eth, dec!(70));
        claimed.status = CoverStatus::ClaimAccepted;
        chain.put_cover(claimed);
        chain.put_cover(cover(5, 2, Currency::Eth, dec!(1)));

        let ledger = ledger(&chain, 10);
        assert!(ledger.full_resync().await.is_ok());

        let now = Utc::now();
        assert_eq!(
            ledger.active_cover_amount(contract(1), Currency::Eth, now).await,
            dec!(200)
        );
        assert_eq!(
            ledger.active_cover_amount(contract(1), Currency::Dai, now).await,
            dec!(23300)
        );
        let group = ledger.exposure(&[contract(1), contract(2)], now).await;
        assert_eq!(group.eth, dec!(201));
        assert_eq!(group.dai, dec!(23300));
    }

    #[tokio::test]
    async fn payout_triggers_full_rebuild() {
        let chain = Arc::new(InMemoryChain::new());
        chain.set_block_number(100);
        chain.put_cover(cover(1, 1, Currency::Eth, dec!(10)));
        let ledger = ledger(&chain, 10);
        assert!(ledger.full_resync().await.is_ok());
        assert_eq!(ledger.status().await.last_verified_block, Some(100));

        chain.set_block_number(150);
        let Ok(check) = ledger.check_payouts().await else {
            panic!("payout check succeeds");
        };
        assert_eq!(check, PayoutCheck::Clean { verified_to: 150 });

        // Claim on cover 1 gets accepted and paid out.
        let mut claimed = cover(1, 1, Currency::Eth, dec!(10));
        claimed.status = CoverStatus::ClaimAccepted;
        chain.put_cover(claimed);
        chain.push_payout(PayoutEvent {
            block_number: 170,
            cover_id: None,
        });
        chain.set_block_number(200);

        let reads_before = chain.cover_reads();
        let Ok(check) = ledger.check_payouts().await else {
            panic!("payout check succeeds");
        };
        assert_eq!(
            check,
            PayoutCheck::Rebuilt {
                payouts: 1,
                verified_to: 200
            }
        );
        assert_eq!(chain.cover_reads(), reads_before + 1);
        assert_eq!(
            ledger
                .active_cover_amount(contract(1), Currency::Eth, Utc::now())
                .await,
            Decimal::ZERO
        );
    }

    #[tokio::test]
    async fn payout_scan_uses_chunks() {
        let chain = Arc::new(InMemoryChain::new());
        chain.set_block_number(10);
        let config = LedgerConfig {
            log_chunk_blocks: 7,
            ..LedgerConfig::default()
        };
        let ledger = CoverLedger::new(Arc::clone(&chain) as Arc<dyn ChainDataSource>, config);
        assert!(ledger.full_resync().await.is_ok());

        chain.push_payout(PayoutEvent {
            block_number: 33,
            cover_id: Some(1),
        });
        chain.set_block_number(40);
        let Ok(PayoutCheck::Rebuilt { payouts, .. }) = ledger.check_payouts().await else {
            panic!("payout in the third chunk is found");
        };
        assert_eq!(payouts, 1);
    }

    #[tokio::test]
    async fn check_payouts_waits_for_running_rebuild() {
        let chain = Arc::new(InMemoryChain::new());
        chain.set_block_number(100);
        chain.put_cover(cover(1, 1, Currency::Eth, dec!(10)));
        chain.put_cover(cover(2, 1, Currency::Eth, dec!(10)));
        // Rebuild: head, count, one batch. Each read takes 50ms.
        chain.set_latency(Some(std::time::Duration::from_millis(50)));
        let ledger = ledger(&chain, 10);
        let finished = parking_lot::Mutex::new(Vec::new());

        let rebuild = async {
            let result = ledger.full_resync().await;
            finished.lock().push("rebuild");
            result
        };
        let check = async {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            let result = ledger.check_payouts().await;
            finished.lock().push("check");
            result
        };
        let (rebuilt, checked) = tokio::join!(rebuild, check);

        assert_eq!(rebuilt.ok(), Some(2));
        assert_eq!(*finished.lock(), vec!["rebuild", "check"]);
        // The check ran against the rebuilt state, anchored at block 100.
        assert!(matches!(checked, Ok(PayoutCheck::Clean { verified_to: 100 })));
        assert_eq!(ledger.status().await.last_verified_block, Some(100));
    }

    #[tokio::test]
    async fn try_sync_skips_while_writer_active() {
        let chain = Arc::new(InMemoryChain::new());
        let ledger = ledger(&chain, 10);
        let guard = ledger.writer.lock().await;
        assert!(ledger.try_sync().await.is_none());
        drop(guard);
        assert!(ledger.try_sync().await.is_some());
    }
}
