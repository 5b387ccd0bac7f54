//! Capacity: the largest cover amount a contract can still take.
//!
//! ```text
//! capacity = min(netStake × tokenPrice × capacityFactor,
//!                capitalFloor × limitPercent × poolFactor)
//!            − activeCoverExposure − reservedQuotes
//! ```
//!
//! Everything is computed in ETH; DAI capacity is the ETH figure times the
//! DAI-per-ETH rate. Results never go below zero.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::{BindingLimit, ContractMetadata, TrustClass};

/// Tunables of the capacity formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityParams {
    /// Share of the capital floor any single contract pool may absorb.
    pub contract_limit_percent: Decimal,
    /// Capacity factor for trusted protocols.
    pub trusted_factor: Decimal,
    /// Capacity factor for contracts onboarded before `legacy_cutover`.
    pub legacy_factor: Decimal,
    /// Contracts onboarded strictly before this instant get `legacy_factor`.
    pub legacy_cutover: DateTime<Utc>,
}

impl Default for CapacityParams {
    fn default() -> Self {
        Self {
            contract_limit_percent: dec!(0.2),
            trusted_factor: dec!(4),
            legacy_factor: dec!(2),
            legacy_cutover: default_legacy_cutover(),
        }
    }
}

/// 2020-08-10T00:00:00Z.
fn default_legacy_cutover() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(2020, 8, 10)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or_default()
}

impl CapacityParams {
    /// Multiplier applied to the stake-derived limit of a contract.
    #[must_use]
    pub fn capacity_factor(&self, meta: &ContractMetadata) -> Decimal {
        if meta.trust == TrustClass::Trusted {
            return self.trusted_factor;
        }
        match meta.onboarded_at {
            Some(at) if at < self.legacy_cutover => self.legacy_factor,
            _ => Decimal::ONE,
        }
    }
}

/// Figures feeding one capacity computation, all in whole units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityInputs {
    /// Net stake behind the contract, settlement tokens.
    pub net_stake: Decimal,
    /// ETH per settlement token.
    pub token_price_eth: Decimal,
    /// Capital floor, ETH.
    pub capital_floor_eth: Decimal,
    /// DAI per ETH.
    pub dai_per_eth: Decimal,
    /// Result of [`CapacityParams::capacity_factor`].
    pub capacity_factor: Decimal,
    /// Per-contract multiplier on the pool-derived limit.
    pub pool_capacity_factor: Decimal,
    /// Active ETH covers across the contract group.
    pub active_cover_eth: Decimal,
    /// Active DAI covers across the contract group.
    pub active_cover_dai: Decimal,
    /// Unexpired issued quotes across the contract group, ETH.
    pub reserved_eth: Decimal,
}

/// Outcome of [`calculate_capacity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacity {
    /// Remaining capacity in ETH.
    pub eth: Decimal,
    /// Remaining capacity in DAI.
    pub dai: Decimal,
    /// Which limit was binding.
    pub binding_limit: BindingLimit,
}

/// Computes remaining capacity. Pure.
#[must_use]
pub fn calculate_capacity(inputs: &CapacityInputs, params: &CapacityParams) -> Capacity {
    let stake_limit = inputs.net_stake.max(Decimal::ZERO)
        * inputs.token_price_eth
        * inputs.capacity_factor;
    let pool_limit =
        inputs.capital_floor_eth * params.contract_limit_percent * inputs.pool_capacity_factor;

    let (limit, binding_limit) = if stake_limit <= pool_limit {
        (stake_limit, BindingLimit::StakeDerived)
    } else {
        (pool_limit, BindingLimit::PoolDerived)
    };

    let dai_exposure_eth = if inputs.active_cover_dai.is_zero() {
        Some(Decimal::ZERO)
    } else {
        inputs.active_cover_dai.checked_div(inputs.dai_per_eth)
    };

    // Unconvertible DAI exposure leaves nothing to sell.
    let eth = dai_exposure_eth.map_or(Decimal::ZERO, |dai_eth| {
        (limit - inputs.active_cover_eth - dai_eth - inputs.reserved_eth).max(Decimal::ZERO)
    });

    Capacity {
        eth,
        dai: eth * inputs.dai_per_eth,
        binding_limit,
    }
}
