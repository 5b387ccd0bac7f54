//! In-memory chain used by tests and local runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;

use super::{
    CapitalFloor, ChainError, ChainHead, CoverRegistry, PayoutEvent, PriceFeed, StakePool,
    TokenPriceOracle, UnstakeRequest,
};
use crate::domain::{Address, CoverRecord};

#[derive(Debug, Default)]
struct State {
    block_number: u64,
    covers: BTreeMap<u64, CoverRecord>,
    payouts: Vec<PayoutEvent>,
    stakes: HashMap<Address, Decimal>,
    unstakes: Vec<UnstakeRequest>,
    first_unprocessed: Option<DateTime<Utc>>,
    token_price_eth: Decimal,
    capital_floor_eth: Decimal,
    dai_per_eth: Decimal,
    latency: Option<Duration>,
    failing: bool,
}

/// A fully controllable [`super::ChainDataSource`].
///
/// Every read sleeps for the configured latency (if any) and fails with
/// [`ChainError::Rpc`] while [`InMemoryChain::set_failing`] is on.
#[derive(Debug, Default)]
pub struct InMemoryChain {
    state: RwLock<State>,
    cover_reads: AtomicU64,
}

impl InMemoryChain {
    /// Creates an empty chain at block zero with zero prices.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the chain head.
    pub fn set_block_number(&self, block: u64) {
        self.state.write().block_number = block;
    }

    /// Appends or replaces a cover.
    pub fn put_cover(&self, cover: CoverRecord) {
        self.state.write().covers.insert(cover.id, cover);
    }

    /// Records a payout at `block_number`.
    pub fn push_payout(&self, event: PayoutEvent) {
        self.state.write().payouts.push(event);
    }

    /// Sets the stake allocated to `contract`.
    pub fn set_stake(&self, contract: Address, amount: Decimal) {
        self.state.write().stakes.insert(contract, amount);
    }

    /// Records an unstake request.
    pub fn push_unstake(&self, request: UnstakeRequest) {
        self.state.write().unstakes.push(request);
    }

    /// Sets the effective time of the oldest unprocessed unstake request.
    pub fn set_first_unprocessed_unstake(&self, at: Option<DateTime<Utc>>) {
        self.state.write().first_unprocessed = at;
    }

    /// Sets the settlement token price, capital floor and DAI rate.
    pub fn set_prices(&self, token_price_eth: Decimal, capital_floor_eth: Decimal, dai_per_eth: Decimal) {
        let mut state = self.state.write();
        state.token_price_eth = token_price_eth;
        state.capital_floor_eth = capital_floor_eth;
        state.dai_per_eth = dai_per_eth;
    }

    /// Delays every read by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state.write().latency = latency;
    }

    /// Makes every read fail until switched off.
    pub fn set_failing(&self, failing: bool) {
        self.state.write().failing = failing;
    }

    /// Number of single-cover reads served so far.
    #[must_use]
    pub fn cover_reads(&self) -> u64 {
        self.cover_reads.load(Ordering::Relaxed)
    }

    async fn read<T>(&self, f: impl FnOnce(&State) -> T) -> Result<T, ChainError> {
        let (latency, failing) = {
            let state = self.state.read();
            (state.latency, state.failing)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if failing {
            return Err(ChainError::Rpc("node unavailable".to_string()));
        }
        Ok(f(&self.state.read()))
    }
}

#[async_trait]
impl ChainHead for InMemoryChain {
    async fn block_number(&self) -> Result<u64, ChainError> {
        self.read(|s| s.block_number).await
    }
}

#[async_trait]
impl CoverRegistry for InMemoryChain {
    async fn cover_count(&self) -> Result<u64, ChainError> {
        self.read(|s| s.covers.keys().next_back().copied().unwrap_or(0))
            .await
    }

    async fn cover(&self, id: u64) -> Result<CoverRecord, ChainError> {
        self.cover_reads.fetch_add(1, Ordering::Relaxed);
        self.read(|s| s.covers.get(&id).cloned())
            .await?
            .ok_or_else(|| ChainError::Rpc(format!("cover {id} does not exist")))
    }

    async fn payout_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<PayoutEvent>, ChainError> {
        self.read(|s| {
            s.payouts
                .iter()
                .filter(|p| (from_block..=to_block).contains(&p.block_number))
                .copied()
                .collect()
        })
        .await
    }
}

#[async_trait]
impl StakePool for InMemoryChain {
    async fn contract_stake(&self, contract: Address) -> Result<Decimal, ChainError> {
        self.read(|s| s.stakes.get(&contract).copied().unwrap_or_default())
            .await
    }

    async fn unstake_requests(
        &self,
        contract: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<UnstakeRequest>, ChainError> {
        self.read(|s| {
            s.unstakes
                .iter()
                .filter(|u| u.contract == contract)
                .filter(|u| (from_block..=to_block).contains(&u.block_number))
                .cloned()
                .collect()
        })
        .await
    }

    async fn first_unprocessed_unstake(&self) -> Result<Option<DateTime<Utc>>, ChainError> {
        self.read(|s| s.first_unprocessed).await
    }
}

#[async_trait]
impl TokenPriceOracle for InMemoryChain {
    async fn token_price_eth(&self) -> Result<Decimal, ChainError> {
        self.read(|s| s.token_price_eth).await
    }
}

#[async_trait]
impl CapitalFloor for InMemoryChain {
    async fn capital_floor_eth(&self) -> Result<Decimal, ChainError> {
        self.read(|s| s.capital_floor_eth).await
    }
}

#[async_trait]
impl PriceFeed for InMemoryChain {
    async fn dai_per_eth(&self) -> Result<Decimal, ChainError> {
        self.read(|s| s.dai_per_eth).await
    }
}
