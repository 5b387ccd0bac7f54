//! Quote service: orchestrates capacity, pricing and signing.
//!
//! Request flow:
//!
//! ```text
//! resolve contract group ─▶ take signing slot ─▶ chain reads (parallel)
//!   ─▶ capacity ─▶ risk ─▶ price ─▶ sign ─▶ reserve
//! ```
//!
//! A request that ends without a signature gives its signing slot back.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use futures_util::{StreamExt, TryStreamExt, stream};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use super::capacity_cache::CapacityCache;
use super::rate_limiter::RateLimiter;
use super::reservations::{Reservation, ReservationTracker};
use crate::chain::{ChainDataSource, with_timeout};
use crate::domain::quote::expiry_for;
use crate::domain::units::to_wei_floor;
use crate::domain::{
    Address, CapacitySnapshot, ContractMetadata, Currency, QuoteOutcome, QuoteRejection,
    QuoteRequest, SignedQuote,
};
use crate::error::EngineError;
use crate::ledger::CoverLedger;
use crate::persistence::{QuoteStore, StoredQuote};
use crate::pricing::{
    Capacity, CapacityInputs, CapacityParams, PricingParams, RateBasis, Rates, RiskCurve,
    calculate_capacity, price_cover,
};
use crate::signing::{QuoteParams, QuoteSigner};
use crate::staking::{StakeSnapshot, StakeTracker};
use crate::whitelist::{ContractGroup, WhitelistLoader};

/// Contracts assessed concurrently by [`QuoteService::get_capacities`].
const CAPACITY_LISTING_CONCURRENCY: usize = 4;

/// Pricing and timing knobs of the quote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteSettings {
    /// Lifetime of a signed quote, seconds.
    pub quote_ttl_secs: u64,
    /// Deadline for each chain read.
    pub chain_timeout: Duration,
    /// Minimum interval between signatures per contract group.
    pub min_sign_interval: Duration,
    /// Lifetime of cached capacity snapshots.
    pub capacity_cache_ttl: Duration,
    /// Risk curve parameters.
    pub risk: RiskCurve,
    /// Capacity formula parameters.
    pub capacity: CapacityParams,
    /// Premium formula parameters.
    pub pricing: PricingParams,
}

impl Default for QuoteSettings {
    fn default() -> Self {
        Self {
            quote_ttl_secs: 3600,
            chain_timeout: Duration::from_secs(10),
            min_sign_interval: Duration::from_secs(60),
            capacity_cache_ttl: Duration::from_secs(30),
            risk: RiskCurve::default(),
            capacity: CapacityParams::default(),
            pricing: PricingParams::default(),
        }
    }
}

/// Collaborators of a [`QuoteService`].
#[derive(Debug)]
pub struct QuoteServiceParts {
    /// Chain reads for prices and capital.
    pub chain: Arc<dyn ChainDataSource>,
    /// Active cover exposure.
    pub ledger: Arc<CoverLedger>,
    /// Net stake per contract.
    pub stake: StakeTracker,
    /// Coverable contracts and their metadata.
    pub whitelist: Arc<WhitelistLoader>,
    /// Quote signing key.
    pub signer: QuoteSigner,
    /// Capacity held by issued quotes.
    pub reservations: Arc<ReservationTracker>,
    /// Optional durable record of issued quotes.
    pub store: Option<Arc<dyn QuoteStore>>,
    /// Tunables.
    pub settings: QuoteSettings,
}

#[derive(Debug)]
struct Assessment {
    stake: StakeSnapshot,
    rates: Rates,
    capacity: Capacity,
}

/// Orchestration layer for quotes and capacity queries.
#[derive(Debug)]
pub struct QuoteService {
    chain: Arc<dyn ChainDataSource>,
    ledger: Arc<CoverLedger>,
    stake: StakeTracker,
    whitelist: Arc<WhitelistLoader>,
    signer: QuoteSigner,
    reservations: Arc<ReservationTracker>,
    store: Option<Arc<dyn QuoteStore>>,
    limiter: RateLimiter,
    capacity_cache: CapacityCache,
    settings: QuoteSettings,
}

impl QuoteService {
    /// Creates a new `QuoteService`.
    #[must_use]
    pub fn new(parts: QuoteServiceParts) -> Self {
        Self {
            limiter: RateLimiter::new(parts.settings.min_sign_interval),
            capacity_cache: CapacityCache::new(parts.settings.capacity_cache_ttl),
            chain: parts.chain,
            ledger: parts.ledger,
            stake: parts.stake,
            whitelist: parts.whitelist,
            signer: parts.signer,
            reservations: parts.reservations,
            store: parts.store,
            settings: parts.settings,
        }
    }

    /// Returns a reference to the cover ledger.
    #[must_use]
    pub fn ledger(&self) -> &Arc<CoverLedger> {
        &self.ledger
    }

    /// Returns a reference to the reservation tracker.
    #[must_use]
    pub fn reservations(&self) -> &Arc<ReservationTracker> {
        &self.reservations
    }

    /// Address quotes are signed with.
    #[must_use]
    pub fn signer_address(&self) -> Address {
        self.signer.address()
    }

    /// Prices and signs a quote.
    ///
    /// Business rejections (`Uncoverable`, `capacityLimitExceed`) are
    /// returned as [`QuoteOutcome::Rejected`], not as errors.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotWhitelisted`] if the contract is not coverable.
    /// - [`EngineError::RateLimited`] if the contract group signed too recently.
    /// - [`EngineError::Upstream`] if a chain read fails or times out.
    /// - [`EngineError::Signing`] if signing fails; nothing unsigned is returned.
    pub async fn get_quote(&self, request: QuoteRequest) -> Result<QuoteOutcome, EngineError> {
        let (meta, group) = self.resolve(request.contract).await?;
        let permit = self.limiter.acquire(group.root)?;

        let now = Utc::now();
        let assessment = self.assess(&meta, &group, now).await?;
        let generated_at_ms = u64::try_from(now.timestamp_millis()).unwrap_or_default();
        let expires_at = expiry_for(generated_at_ms, self.settings.quote_ttl_secs);

        let reject = |reason: QuoteRejection| {
            tracing::info!(contract = %request.contract, %reason, "quote rejected");
            Ok(QuoteOutcome::Rejected {
                contract: request.contract,
                reason,
                generated_at_ms,
                expires_at,
            })
        };

        if assessment.stake.net.is_zero() {
            return reject(QuoteRejection::Uncoverable);
        }

        let available = match request.currency {
            Currency::Eth => assessment.capacity.eth,
            Currency::Dai => assessment.capacity.dai,
        }
        .floor()
        .to_u64()
        .unwrap_or(u64::MAX);
        if available == 0 {
            return reject(QuoteRejection::CapacityExceeded);
        }
        let amount = request.amount.min(available);

        let basis = meta.fixed_annual_rate_bps.map_or_else(
            || RateBasis::Risk(self.settings.risk.risk(assessment.stake.net)),
            RateBasis::Fixed,
        );
        let premium = price_cover(
            Decimal::from(amount),
            request.currency,
            Decimal::from(request.period_days),
            basis,
            &assessment.rates,
            &self.settings.pricing,
        )
        .ok_or_else(|| EngineError::Upstream("price feed returned a zero rate".to_string()))?;
        let price = to_wei_floor(premium.in_currency)
            .map_err(|e| EngineError::Internal(e.to_string()))?;
        let price_in_token =
            to_wei_floor(premium.in_token).map_err(|e| EngineError::Internal(e.to_string()))?;

        let params = QuoteParams {
            amount,
            currency: request.currency,
            period_days: request.period_days,
            contract: request.contract,
            price,
            price_in_token,
            expires_at,
            generated_at_ms,
            verifier: self.signer.verifier(),
        };
        let signature = self.signer.sign(&params)?;
        permit.commit();

        let quote = SignedQuote {
            contract: request.contract,
            currency: request.currency,
            period_days: request.period_days,
            amount,
            requested_amount: request.amount,
            price,
            price_in_token,
            generated_at_ms,
            expires_at,
            signature,
        };
        let amount_eth = assessment
            .rates
            .to_eth(Decimal::from(amount), request.currency)
            .unwrap_or_default();
        self.reservations.reserve(Reservation {
            contract: request.contract,
            currency: request.currency,
            amount: Decimal::from(amount),
            amount_eth,
            expires_at: timestamp_secs(expires_at),
        });
        self.capacity_cache.invalidate(&group.members);

        if let Some(store) = &self.store
            && let Err(e) = store
                .save_quote(&StoredQuote::from_signed(&quote, amount_eth))
                .await
        {
            tracing::warn!(contract = %quote.contract, error = %e, "failed to persist quote");
        }

        tracing::info!(
            contract = %quote.contract,
            currency = %quote.currency,
            amount = quote.amount,
            requested = quote.requested_amount,
            period_days = quote.period_days,
            price = %premium.in_currency,
            net_stake = %assessment.stake.net,
            "quote signed"
        );
        Ok(QuoteOutcome::Signed(quote))
    }

    /// Capacity of one whitelisted contract, cached per contract.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotWhitelisted`] for unknown contracts and
    /// [`EngineError::Upstream`] if a chain read fails.
    pub async fn get_capacity(&self, contract: Address) -> Result<CapacitySnapshot, EngineError> {
        let (meta, group) = self.resolve(contract).await?;
        self.capacity_for(&meta, &group).await
    }

    /// Capacity of every whitelisted, non-deprecated contract, sorted by address.
    ///
    /// # Errors
    ///
    /// Returns the first [`EngineError`] encountered.
    pub async fn get_capacities(&self) -> Result<Vec<CapacitySnapshot>, EngineError> {
        let whitelist = self.whitelist.current().await?;
        let targets: Vec<(ContractMetadata, ContractGroup)> = whitelist
            .iter()
            .filter(|meta| !meta.deprecated)
            .filter_map(|meta| Some((meta.clone(), whitelist.group_of(&meta.address)?)))
            .collect();

        let mut snapshots: Vec<CapacitySnapshot> = stream::iter(targets)
            .map(|(meta, group)| async move { self.capacity_for(&meta, &group).await })
            .buffer_unordered(CAPACITY_LISTING_CONCURRENCY)
            .try_collect()
            .await?;
        snapshots.sort_by_key(|s| *s.contract.as_bytes());
        Ok(snapshots)
    }

    /// Reloads reservations of unexpired stored quotes. Returns how many were
    /// restored.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] if the store cannot be read.
    pub async fn restore_reservations(&self) -> Result<usize, EngineError> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let quotes = store.load_unexpired_quotes(Utc::now()).await?;
        for quote in &quotes {
            self.reservations.reserve(quote.reservation());
        }
        Ok(quotes.len())
    }

    async fn resolve(
        &self,
        contract: Address,
    ) -> Result<(ContractMetadata, ContractGroup), EngineError> {
        let whitelist = self.whitelist.current().await?;
        let meta = whitelist
            .get(&contract)
            .cloned()
            .ok_or(EngineError::NotWhitelisted(contract))?;
        let group = whitelist
            .group_of(&contract)
            .ok_or(EngineError::NotWhitelisted(contract))?;
        Ok((meta, group))
    }

    async fn capacity_for(
        &self,
        meta: &ContractMetadata,
        group: &ContractGroup,
    ) -> Result<CapacitySnapshot, EngineError> {
        if let Some(cached) = self.capacity_cache.get(&meta.address) {
            return Ok(cached);
        }
        let now = Utc::now();
        let assessment = self.assess(meta, group, now).await?;
        let snapshot = CapacitySnapshot {
            contract: meta.address,
            capacity_eth: assessment.capacity.eth,
            capacity_dai: assessment.capacity.dai,
            net_staked: assessment.stake.net,
            binding_limit: assessment.capacity.binding_limit,
            computed_at: now,
        };
        self.capacity_cache.insert(snapshot.clone());
        Ok(snapshot)
    }

    async fn assess(
        &self,
        meta: &ContractMetadata,
        group: &ContractGroup,
        now: DateTime<Utc>,
    ) -> Result<Assessment, EngineError> {
        let timeout = self.settings.chain_timeout;
        let (stake, token_price_eth, capital_floor_eth, dai_per_eth) = tokio::try_join!(
            self.stake.stake(meta.address),
            with_timeout(timeout, "token_price_eth", self.chain.token_price_eth()),
            with_timeout(timeout, "capital_floor_eth", self.chain.capital_floor_eth()),
            with_timeout(timeout, "dai_per_eth", self.chain.dai_per_eth()),
        )?;

        let exposure = self.ledger.exposure(&group.members, now).await;
        let inputs = CapacityInputs {
            net_stake: stake.net,
            token_price_eth,
            capital_floor_eth,
            dai_per_eth,
            capacity_factor: self.settings.capacity.capacity_factor(meta),
            pool_capacity_factor: meta.pool_capacity_factor,
            active_cover_eth: exposure.eth,
            active_cover_dai: exposure.dai,
            reserved_eth: self.reservations.reserved_eth(&group.members, now),
        };
        let capacity = calculate_capacity(&inputs, &self.settings.capacity);
        tracing::debug!(
            contract = %meta.address,
            net_stake = %stake.net,
            capacity_eth = %capacity.eth,
            binding = ?capacity.binding_limit,
            "capacity assessed"
        );

        Ok(Assessment {
            stake,
            rates: Rates {
                dai_per_eth,
                token_price_eth,
            },
            capacity,
        })
    }
}

fn timestamp_secs(secs: u64) -> DateTime<Utc> {
    i64::try_from(secs)
        .ok()
        .and_then(|s| Utc.timestamp_opt(s, 0).single())
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::panic)]
pub(crate) mod tests {
    use super::*;
    use crate::chain::InMemoryChain;
    use crate::domain::{BindingLimit, CoverRecord, CoverStatus};
    use crate::ledger::LedgerConfig;
    use crate::persistence::MemoryStore;
    use crate::signing::recover_signer;
    use crate::staking::UnstakeWindow;
    use crate::whitelist::Whitelist;
    use rust_decimal_macros::dec;

    pub(crate) const PRIVATE_KEY: &str =
        "45571723d6f6fa704623beb284eda724459d76cc68e82b754015d6e7af794cc8";
    pub(crate) const VERIFIER: &str = "0x1776651f58a17a50098d31ba3c3cd259c1903f7a";
    pub(crate) const CONTRACT: &str = "0x3d9819210a31b4961b30ef54be2aed79b9c9cd3b";
    pub(crate) const DEPENDANT: &str = "0x7fc77b5c7614e1533320ea6ddc2eb61fa00a9714";

    pub(crate) fn addr(s: &str) -> Address {
        let Ok(a) = s.parse() else {
            panic!("valid address {s}");
        };
        a
    }

    fn cover(id: u64, currency: Currency, amount: Decimal) -> CoverRecord {
        CoverRecord {
            id,
            contract: addr(CONTRACT),
            currency,
            sum_assured: amount,
            valid_until: Utc::now() + chrono::Duration::days(60),
            status: CoverStatus::Active,
            requested_payout_amount: Decimal::ZERO,
        }
    }

    /// Chain state whose capacity for [`CONTRACT`] is about 1760.09 ETH.
    pub(crate) fn reference_chain() -> Arc<InMemoryChain> {
        let chain = Arc::new(InMemoryChain::new());
        chain.set_block_number(1_000);
        chain.set_stake(addr(CONTRACT), dec!(120000));
        chain.set_prices(dec!(4) / dec!(233), dec!(13500), dec!(233));
        chain.put_cover(cover(1, Currency::Eth, dec!(200)));
        chain.put_cover(cover(2, Currency::Dai, dec!(23300)));
        chain
    }

    pub(crate) fn whitelist() -> Whitelist {
        let mut parent = ContractMetadata::standard(addr(CONTRACT));
        parent.dependants = vec![addr(DEPENDANT)];
        Whitelist::from_entries([parent, ContractMetadata::standard(addr(DEPENDANT))])
    }

    pub(crate) async fn service_with(
        chain: Arc<InMemoryChain>,
        whitelist: Whitelist,
        store: Option<Arc<dyn QuoteStore>>,
    ) -> QuoteService {
        let source: Arc<dyn ChainDataSource> = chain;
        let ledger = Arc::new(CoverLedger::new(Arc::clone(&source), LedgerConfig::default()));
        let Ok(_) = ledger.full_resync().await else {
            panic!("ledger backfill succeeds");
        };
        let Ok(signer) = QuoteSigner::from_hex_key(PRIVATE_KEY, addr(VERIFIER)) else {
            panic!("valid key");
        };
        QuoteService::new(QuoteServiceParts {
            chain: Arc::clone(&source),
            ledger,
            stake: StakeTracker::new(
                Arc::clone(&source),
                UnstakeWindow::default(),
                Duration::from_secs(5),
            ),
            whitelist: Arc::new(WhitelistLoader::fixed(whitelist)),
            signer,
            reservations: Arc::new(ReservationTracker::new()),
            store,
            settings: QuoteSettings::default(),
        })
    }

    fn request(amount: u64, currency: Currency) -> QuoteRequest {
        QuoteRequest {
            contract: addr(CONTRACT),
            amount,
            currency,
            period_days: 365,
        }
    }

    #[tokio::test]
    async fn signs_quote_recoverable_to_signer() {
        let service = service_with(reference_chain(), whitelist(), None).await;
        let Ok(QuoteOutcome::Signed(quote)) = service.get_quote(request(1000, Currency::Eth)).await
        else {
            panic!("quote is signed");
        };
        assert_eq!(quote.amount, 1000);
        assert!(!quote.is_capped());
        assert!(quote.price > 0 && quote.price_in_token > quote.price);

        let params = QuoteParams {
            amount: quote.amount,
            currency: quote.currency,
            period_days: quote.period_days,
            contract: quote.contract,
            price: quote.price,
            price_in_token: quote.price_in_token,
            expires_at: quote.expires_at,
            generated_at_ms: quote.generated_at_ms,
            verifier: addr(VERIFIER),
        };
        assert_eq!(recover_signer(&params, &quote.signature).ok(), Some(service.signer_address()));
        assert_eq!(service.reservations().len(), 1);
    }

    #[tokio::test]
    async fn caps_amount_at_available_capacity() {
        let service = service_with(reference_chain(), whitelist(), None).await;
        let Ok(QuoteOutcome::Signed(quote)) = service.get_quote(request(5000, Currency::Eth)).await
        else {
            panic!("quote is signed");
        };
        assert_eq!(quote.amount, 1760);
        assert_eq!(quote.requested_amount, 5000);
        assert!(quote.is_capped());
    }

    #[tokio::test]
    async fn zero_net_stake_is_uncoverable_and_frees_slot() {
        let chain = reference_chain();
        chain.set_stake(addr(CONTRACT), Decimal::ZERO);
        let service = service_with(Arc::clone(&chain), whitelist(), None).await;

        let Ok(QuoteOutcome::Rejected { reason, .. }) =
            service.get_quote(request(1000, Currency::Eth)).await
        else {
            panic!("quote is rejected");
        };
        assert_eq!(reason, QuoteRejection::Uncoverable);
        assert!(service.reservations().is_empty());

        chain.set_stake(addr(CONTRACT), dec!(120000));
        assert!(matches!(
            service.get_quote(request(1000, Currency::Eth)).await,
            Ok(QuoteOutcome::Signed(_))
        ));
    }

    #[tokio::test]
    async fn exhausted_capacity_is_rejected() {
        let chain = reference_chain();
        chain.put_cover(cover(3, Currency::Eth, dec!(1761)));
        let service = service_with(chain, whitelist(), None).await;
        let Ok(QuoteOutcome::Rejected { reason, .. }) =
            service.get_quote(request(10, Currency::Dai)).await
        else {
            panic!("quote is rejected");
        };
        assert_eq!(reason, QuoteRejection::CapacityExceeded);
    }

    #[tokio::test]
    async fn group_is_rate_limited_across_dependants() {
        let service = service_with(reference_chain(), whitelist(), None).await;
        assert!(matches!(
            service.get_quote(request(10, Currency::Eth)).await,
            Ok(QuoteOutcome::Signed(_))
        ));

        let mut dependant = request(10, Currency::Eth);
        dependant.contract = addr(DEPENDANT);
        assert!(matches!(
            service.get_quote(dependant).await,
            Err(EngineError::RateLimited { .. })
        ));
    }

    #[tokio::test]
    async fn signed_quotes_reserve_capacity_for_the_group() {
        let service = service_with(reference_chain(), whitelist(), None).await;
        let Ok(before) = service.get_capacity(addr(DEPENDANT)).await else {
            panic!("capacity computed");
        };
        assert!(matches!(
            service.get_quote(request(500, Currency::Eth)).await,
            Ok(QuoteOutcome::Signed(_))
        ));
        let Ok(after) = service.get_capacity(addr(CONTRACT)).await else {
            panic!("capacity computed");
        };
        assert_eq!(after.capacity_eth.round_dp(2), dec!(1260.09));
        assert_eq!(before.binding_limit, BindingLimit::StakeDerived);
    }

    #[tokio::test]
    async fn unknown_contract_is_not_whitelisted() {
        let service = service_with(reference_chain(), whitelist(), None).await;
        let mut unknown = request(10, Currency::Eth);
        unknown.contract = Address::ZERO;
        assert!(matches!(
            service.get_quote(unknown).await,
            Err(EngineError::NotWhitelisted(_))
        ));
    }

    #[tokio::test]
    async fn chain_failure_is_upstream_error() {
        let chain = reference_chain();
        let service = service_with(Arc::clone(&chain), whitelist(), None).await;
        chain.set_failing(true);
        assert!(matches!(
            service.get_quote(request(10, Currency::Eth)).await,
            Err(EngineError::Upstream(_))
        ));
        chain.set_failing(false);
        assert!(
            service.get_quote(request(10, Currency::Eth)).await.is_ok(),
            "failed request gave its slot back"
        );
    }

    #[tokio::test]
    async fn fixed_rate_bypasses_risk_curve() {
        let mut meta = ContractMetadata::standard(addr(CONTRACT));
        meta.fixed_annual_rate_bps = Some(200);
        let service =
            service_with(reference_chain(), Whitelist::from_entries([meta]), None).await;
        let Ok(QuoteOutcome::Signed(quote)) = service.get_quote(request(1000, Currency::Eth)).await
        else {
            panic!("quote is signed");
        };
        // 1000 × 2% × 365 / 365.25
        let expected = dec!(1000) * dec!(0.02) * dec!(365) / dec!(365.25);
        assert_eq!(to_wei_floor(expected).ok(), Some(quote.price));
    }

    #[tokio::test]
    async fn quotes_are_persisted_and_restored() {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(
            reference_chain(),
            whitelist(),
            Some(Arc::clone(&store) as Arc<dyn QuoteStore>),
        )
        .await;
        assert!(service.get_quote(request(100, Currency::Eth)).await.is_ok());
        assert_eq!(store.quote_count(), 1);

        let restarted = service_with(
            reference_chain(),
            whitelist(),
            Some(Arc::clone(&store) as Arc<dyn QuoteStore>),
        )
        .await;
        assert_eq!(restarted.restore_reservations().await.ok(), Some(1));
        assert_eq!(restarted.reservations().len(), 1);
    }

    #[tokio::test]
    async fn capacities_list_skips_deprecated() {
        let mut deprecated = ContractMetadata::standard(addr(DEPENDANT));
        deprecated.deprecated = true;
        let whitelist =
            Whitelist::from_entries([ContractMetadata::standard(addr(CONTRACT)), deprecated]);
        let service = service_with(reference_chain(), whitelist, None).await;
        let Ok(list) = service.get_capacities().await else {
            panic!("capacities computed");
        };
        assert_eq!(list.len(), 1);
        assert_eq!(list.first().map(|s| s.contract), Some(addr(CONTRACT)));
    }
}
