//! Per-contract metadata supplied by the coverable-contracts whitelist.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::Address;

/// How much the protocol trusts a protected contract for capacity purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustClass {
    /// Default classification.
    Standard,
    /// Explicitly trusted protocol; receives the elevated capacity factor.
    Trusted,
}

/// Metadata used by the capacity and price calculators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractMetadata {
    /// The protected contract.
    pub address: Address,
    /// Display name.
    pub name: String,
    /// When the contract was first listed as coverable, if known.
    pub onboarded_at: Option<DateTime<Utc>>,
    /// Trust classification.
    pub trust: TrustClass,
    /// Flat annual rate in basis points that replaces the risk curve.
    pub fixed_annual_rate_bps: Option<u32>,
    /// Multiplier applied to the pool-derived capacity limit.
    pub pool_capacity_factor: Decimal,
    /// Contracts that share this contract's capacity pool.
    pub dependants: Vec<Address>,
    /// Deprecated contracts remain quotable but are left out of capacity listings.
    pub deprecated: bool,
}

impl ContractMetadata {
    /// Metadata with default factors for an otherwise unknown contract.
    #[must_use]
    pub fn standard(address: Address) -> Self {
        Self {
            address,
            name: String::new(),
            onboarded_at: None,
            trust: TrustClass::Standard,
            fixed_annual_rate_bps: None,
            pool_capacity_factor: Decimal::ONE,
            dependants: Vec::new(),
            deprecated: false,
        }
    }
}
