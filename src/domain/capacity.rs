//! Capacity snapshots.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::Address;

/// Which side of the capacity formula produced the final limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BindingLimit {
    /// Net stake times token price times capacity factor.
    StakeDerived,
    /// Capital floor times the per-contract pool limit.
    PoolDerived,
}

/// Capacity of one contract at a point in time, in whole units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapacitySnapshot {
    /// The protected contract.
    pub contract: Address,
    /// Remaining capacity in ETH.
    pub capacity_eth: Decimal,
    /// Remaining capacity in DAI.
    pub capacity_dai: Decimal,
    /// Net stake backing the contract, in settlement tokens.
    pub net_staked: Decimal,
    /// Which term of the formula was binding.
    pub binding_limit: BindingLimit,
    /// When the snapshot was computed.
    pub computed_at: DateTime<Utc>,
}
