//! In-memory whitelist of coverable contracts.
//!
//! The coverable-contracts document is a JSON object keyed by contract
//! address:
//!
//! ```json
//! {
//!   "0x3d9819210a31b4961b30ef54be2aed79b9c9cd3b": {
//!     "name": "Compound",
//!     "dateAdded": "2019-07-01",
//!     "trusted": true,
//!     "dependants": ["0x..."]
//!   }
//! }
//! ```
//!
//! Entries with `"disabled": true` are skipped.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::{Address, AddressError, ContractMetadata, TrustClass};

/// Errors produced while loading the whitelist.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WhitelistError {
    /// The document could not be retrieved.
    #[error("whitelist fetch failed: {0}")]
    Fetch(String),

    /// The document is not valid JSON of the expected shape.
    #[error("whitelist parse failed: {0}")]
    Parse(String),

    /// An address key or dependant is malformed.
    #[error("whitelist entry {key:?}: {source}")]
    Address {
        /// The offending string.
        key: String,
        /// Why it was rejected.
        source: AddressError,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawEntry {
    name: String,
    disabled: bool,
    deprecated: bool,
    date_added: Option<NaiveDate>,
    trusted: bool,
    fixed_annual_rate_bps: Option<u32>,
    capacity_factor: Option<Decimal>,
    dependants: Vec<String>,
}

impl Default for RawEntry {
    fn default() -> Self {
        Self {
            name: String::new(),
            disabled: false,
            deprecated: false,
            date_added: None,
            trusted: false,
            fixed_annual_rate_bps: None,
            capacity_factor: None,
            dependants: Vec::new(),
        }
    }
}

fn parse_address(key: &str) -> Result<Address, WhitelistError> {
    key.parse().map_err(|source| WhitelistError::Address {
        key: key.to_string(),
        source,
    })
}

impl RawEntry {
    fn into_metadata(self, address: Address) -> Result<ContractMetadata, WhitelistError> {
        let dependants = self
            .dependants
            .iter()
            .map(|d| parse_address(d))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ContractMetadata {
            address,
            name: self.name,
            onboarded_at: self
                .date_added
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc()),
            trust: if self.trusted {
                TrustClass::Trusted
            } else {
                TrustClass::Standard
            },
            fixed_annual_rate_bps: self.fixed_annual_rate_bps,
            pool_capacity_factor: self.capacity_factor.unwrap_or(Decimal::ONE),
            dependants,
            deprecated: self.deprecated,
        })
    }
}

/// Contracts sharing one capacity pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractGroup {
    /// The contract whose metadata lists the others as dependants.
    pub root: Address,
    /// `root` followed by its dependants.
    pub members: Vec<Address>,
}

/// Whitelisted contracts keyed by address.
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    contracts: HashMap<Address, ContractMetadata>,
}

impl Whitelist {
    /// Builds a whitelist from metadata records. Later duplicates win.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = ContractMetadata>) -> Self {
        Self {
            contracts: entries.into_iter().map(|m| (m.address, m)).collect(),
        }
    }

    /// Parses a coverable-contracts document.
    ///
    /// # Errors
    ///
    /// Returns [`WhitelistError::Parse`] for malformed JSON and
    /// [`WhitelistError::Address`] for a malformed address.
    pub fn from_json(document: &str) -> Result<Self, WhitelistError> {
        let raw: HashMap<String, RawEntry> =
            serde_json::from_str(document).map_err(|e| WhitelistError::Parse(e.to_string()))?;

        let mut entries = Vec::with_capacity(raw.len());
        for (key, entry) in raw {
            if entry.disabled {
                continue;
            }
            let address = parse_address(&key.to_ascii_lowercase())?;
            entries.push(entry.into_metadata(address)?);
        }
        Ok(Self::from_entries(entries))
    }

    /// Metadata for `contract`, if whitelisted.
    #[must_use]
    pub fn get(&self, contract: &Address) -> Option<&ContractMetadata> {
        self.contracts.get(contract)
    }

    /// Capacity group `contract` belongs to, if whitelisted.
    ///
    /// A contract listed as a dependant of another whitelisted contract
    /// belongs to that contract's group; otherwise it roots its own.
    #[must_use]
    pub fn group_of(&self, contract: &Address) -> Option<ContractGroup> {
        let meta = self.get(contract)?;
        let root = self
            .contracts
            .values()
            .filter(|parent| parent.address != *contract)
            .find(|parent| parent.dependants.contains(contract))
            .unwrap_or(meta);

        let mut members = vec![root.address];
        for dependant in &root.dependants {
            if !members.contains(dependant) {
                members.push(*dependant);
            }
        }
        Some(ContractGroup {
            root: root.address,
            members,
        })
    }

    /// All whitelisted contracts, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &ContractMetadata> {
        self.contracts.values()
    }

    /// Number of whitelisted contracts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    /// Returns `true` if nothing is whitelisted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const DOC: &str = r#"{
        "0x79A8C46DEA5ADA233ABAFFD40F3A0A2B1E5A4F27": {
            "name": "Curve",
            "dateAdded": "2020-06-01",
            "dependants": ["0x7fc77b5c7614e1533320ea6ddc2eb61fa00a9714"]
        },
        "0x7fc77b5c7614e1533320ea6ddc2eb61fa00a9714": { "name": "Curve pool" },
        "0x5c69bee701ef814a2b6a3edd4b1652cb9cc5aa6f": {
            "name": "Uniswap",
            "trusted": true,
            "capacityFactor": "1.5",
            "fixedAnnualRateBps": 260
        },
        "0x0000000000000000000000000000000000000001": { "disabled": true }
    }"#;

    fn addr(s: &str) -> Address {
        let Ok(a) = s.parse() else {
            panic!("valid address {s}");
        };
        a
    }

    #[test]
    fn parses_document_and_skips_disabled() {
        let Ok(whitelist) = Whitelist::from_json(DOC) else {
            panic!("document parses");
        };
        assert_eq!(whitelist.len(), 3);
        assert!(whitelist.get(&addr("0x0000000000000000000000000000000000000001")).is_none());

        let Some(uniswap) = whitelist.get(&addr("0x5c69bee701ef814a2b6a3edd4b1652cb9cc5aa6f")) else {
            panic!("uniswap listed");
        };
        assert_eq!(uniswap.trust, TrustClass::Trusted);
        assert_eq!(uniswap.pool_capacity_factor, dec!(1.5));
        assert_eq!(uniswap.fixed_annual_rate_bps, Some(260));

        let Some(curve) = whitelist.get(&addr("0x79a8c46dea5ada233abaffd40f3a0a2b1e5a4f27")) else {
            panic!("keys are case-insensitive");
        };
        assert!(curve.onboarded_at.is_some());
        assert_eq!(curve.pool_capacity_factor, Decimal::ONE);
    }

    #[test]
    fn dependants_resolve_to_parent_group() {
        let Ok(whitelist) = Whitelist::from_json(DOC) else {
            panic!("document parses");
        };
        let parent = addr("0x79a8c46dea5ada233abaffd40f3a0a2b1e5a4f27");
        let child = addr("0x7fc77b5c7614e1533320ea6ddc2eb61fa00a9714");

        let Some(group) = whitelist.group_of(&child) else {
            panic!("child is whitelisted");
        };
        assert_eq!(group.root, parent);
        assert_eq!(group.members, vec![parent, child]);
        assert_eq!(whitelist.group_of(&parent), Some(group));

        let solo = addr("0x5c69bee701ef814a2b6a3edd4b1652cb9cc5aa6f");
        let Some(group) = whitelist.group_of(&solo) else {
            panic!("solo is whitelisted");
        };
        assert_eq!(group.members, vec![solo]);
    }

    #[test]
    fn rejects_bad_addresses() {
        assert!(matches!(
            Whitelist::from_json(r#"{ "0x1234": {} }"#),
            Err(WhitelistError::Address { .. })
        ));
        assert!(matches!(
            Whitelist::from_json("[]"),
            Err(WhitelistError::Parse(_))
        ));
    }
}
