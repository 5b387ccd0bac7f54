//! Protocol contract address discovery.
//!
//! The protocol publishes a version-data document of the form
//! `{ "<network>": { "abis": [ { "code": "QD", "address": "0x..." }, ... ] } }`.
//! Addresses are resolved by contract code for the configured network.

use std::collections::HashMap;

use serde::Deserialize;

use super::ChainError;
use crate::domain::Address;

/// Contract code of the cover registry.
pub const COVER_REGISTRY_CODE: &str = "QD";
/// Contract code of the staking pool.
pub const STAKING_POOL_CODE: &str = "PS";
/// Contract code of the capital model (token price).
pub const CAPITAL_MODEL_CODE: &str = "MC";
/// Contract code of the pool data contract (capital floor and currency rates).
pub const POOL_DATA_CODE: &str = "PD";
/// Contract code of the pool emitting payout events.
pub const POOL_CODE: &str = "P1";

/// Addresses of the protocol contracts the engine reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolAddresses {
    /// Cover registry.
    pub cover_registry: Address,
    /// Staking pool.
    pub staking_pool: Address,
    /// Capital model.
    pub capital_model: Address,
    /// Pool data.
    pub pool_data: Address,
    /// Pool (payout events).
    pub pool: Address,
}

#[derive(Debug, Deserialize)]
struct NetworkEntry {
    abis: Vec<AbiEntry>,
}

#[derive(Debug, Deserialize)]
struct AbiEntry {
    code: String,
    address: String,
}

impl ProtocolAddresses {
    /// Resolves addresses from a version-data document.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Decode`] if the document has no entry for
    /// `network`, a required code is missing, or an address is malformed.
    pub fn from_version_data(document: &serde_json::Value, network: &str) -> Result<Self, ChainError> {
        let entry = document
            .get(network)
            .ok_or_else(|| ChainError::Decode(format!("no version data for network {network}")))?;
        let entry: NetworkEntry = serde_json::from_value(entry.clone())
            .map_err(|e| ChainError::Decode(format!("version data: {e}")))?;
        let by_code: HashMap<&str, &str> = entry
            .abis
            .iter()
            .map(|abi| (abi.code.as_str(), abi.address.as_str()))
            .collect();

        let lookup = |code: &str| -> Result<Address, ChainError> {
            let raw = by_code
                .get(code)
                .ok_or_else(|| ChainError::Decode(format!("contract {code} missing from version data")))?;
            raw.parse()
                .map_err(|e| ChainError::Decode(format!("contract {code}: {e}")))
        };

        Ok(Self {
            cover_registry: lookup(COVER_REGISTRY_CODE)?,
            staking_pool: lookup(STAKING_POOL_CODE)?,
            capital_model: lookup(CAPITAL_MODEL_CODE)?,
            pool_data: lookup(POOL_DATA_CODE)?,
            pool: lookup(POOL_CODE)?,
        })
    }

    /// Downloads the version-data document and resolves addresses.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Transport`] on HTTP failure and
    /// [`ChainError::Decode`] on malformed content.
    pub async fn fetch(
        client: &reqwest::Client,
        url: &str,
        network: &str,
    ) -> Result<Self, ChainError> {
        tracing::info!(url, network, "fetching version data");
        let document: serde_json::Value = client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ChainError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| ChainError::Decode(e.to_string()))?;
        Self::from_version_data(&document, network)
    }
}
