//! Capacity DTOs.

use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{BindingLimit, CapacitySnapshot};

/// Capacity of one contract. Figures are whole units, rounded down.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CapacityResponse {
    /// Protected contract.
    #[serde(rename = "contractAddress")]
    pub contract_address: String,
    /// Remaining capacity in ETH.
    #[serde(rename = "capacityETH")]
    pub capacity_eth: String,
    /// Remaining capacity in DAI.
    #[serde(rename = "capacityDAI")]
    pub capacity_dai: String,
    /// Net stake behind the contract, settlement tokens.
    #[serde(rename = "netStake")]
    pub net_stake: String,
    /// `STAKE_DERIVED` or `POOL_DERIVED`.
    #[serde(rename = "bindingLimit")]
    #[schema(value_type = String)]
    pub binding_limit: BindingLimit,
}

impl From<&CapacitySnapshot> for CapacityResponse {
    fn from(snapshot: &CapacitySnapshot) -> Self {
        Self {
            contract_address: snapshot.contract.to_string(),
            capacity_eth: snapshot.capacity_eth.floor().to_string(),
            capacity_dai: snapshot.capacity_dai.floor().to_string(),
            net_stake: snapshot.net_staked.floor().to_string(),
            binding_limit: snapshot.binding_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Address;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[test]
    fn figures_are_floored_integers() {
        let snapshot = CapacitySnapshot {
            contract: Address::ZERO,
            capacity_eth: dec!(1760.0937),
            capacity_dai: dec!(410101.83),
            net_staked: dec!(120000.5),
            binding_limit: BindingLimit::PoolDerived,
            computed_at: Utc::now(),
        };
        let json = serde_json::to_value(CapacityResponse::from(&snapshot)).unwrap_or_default();
        assert_eq!(
            json,
            serde_json::json!({
                "contractAddress": "0x0000000000000000000000000000000000000000",
                "capacityETH": "1760",
                "capacityDAI": "410101",
                "netStake": "120000",
                "bindingLimit": "POOL_DERIVED",
            })
        );
    }
}
