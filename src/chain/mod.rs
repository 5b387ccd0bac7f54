//! Read-only access to protocol contracts.
//!
//! Each collaborator the engine consumes is a small async trait so that the
//! JSON-RPC reader ([`rpc::JsonRpcChain`]) and the in-memory fixture
//! ([`memory::InMemoryChain`]) are interchangeable. [`ChainDataSource`] bundles
//! them for services that need all of them.
//!
//! Amounts cross this boundary as whole-unit [`Decimal`] values.

pub mod addresses;
pub mod memory;
pub mod rpc;

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::units::UnitsError;
use crate::domain::{Address, CoverRecord};

pub use addresses::ProtocolAddresses;
pub use memory::InMemoryChain;
pub use rpc::JsonRpcChain;

/// Errors returned by chain reads.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChainError {
    /// The read did not complete within its deadline.
    #[error("{operation} timed out after {millis} ms")]
    Timeout {
        /// Which read timed out.
        operation: &'static str,
        /// The deadline that was exceeded.
        millis: u64,
    },

    /// The node returned a JSON-RPC error.
    #[error("rpc error: {0}")]
    Rpc(String),

    /// The response could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The request could not be sent or the response not read.
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<UnitsError> for ChainError {
    fn from(err: UnitsError) -> Self {
        Self::Decode(err.to_string())
    }
}

/// A pending withdrawal of stake from a protected contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnstakeRequest {
    /// Contract the stake is withdrawn from.
    pub contract: Address,
    /// Amount of settlement tokens, whole units.
    pub amount: Decimal,
    /// When the withdrawal becomes effective, as recorded on chain.
    pub effective_at: DateTime<Utc>,
    /// Block the request was emitted in.
    pub block_number: u64,
}

/// A claim payout observed on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayoutEvent {
    /// Block the payout was emitted in.
    pub block_number: u64,
    /// Cover the payout refers to, when the event carries one.
    pub cover_id: Option<u64>,
}

/// Current chain height.
#[async_trait]
pub trait ChainHead: Send + Sync {
    /// Latest block number.
    async fn block_number(&self) -> Result<u64, ChainError>;
}

/// The on-chain registry of purchased covers.
#[async_trait]
pub trait CoverRegistry: Send + Sync {
    /// Number of covers ever created. Ids run from 1 to this value.
    async fn cover_count(&self) -> Result<u64, ChainError>;

    /// Reads one cover by id.
    async fn cover(&self, id: u64) -> Result<CoverRecord, ChainError>;

    /// Payout events emitted in the inclusive block range.
    async fn payout_events(&self, from_block: u64, to_block: u64)
    -> Result<Vec<PayoutEvent>, ChainError>;
}

/// The staking pool backing protected contracts.
#[async_trait]
pub trait StakePool: Send + Sync {
    /// Total stake currently allocated to `contract`, in settlement tokens.
    async fn contract_stake(&self, contract: Address) -> Result<Decimal, ChainError>;

    /// Unstake requests for `contract` emitted in the inclusive block range.
    async fn unstake_requests(
        &self,
        contract: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<UnstakeRequest>, ChainError>;

    /// Effective time of the oldest request the pool has not processed yet.
    async fn first_unprocessed_unstake(&self) -> Result<Option<DateTime<Utc>>, ChainError>;
}

/// Price of the settlement token.
#[async_trait]
pub trait TokenPriceOracle: Send + Sync {
    /// ETH per settlement token.
    async fn token_price_eth(&self) -> Result<Decimal, ChainError>;
}

/// The protocol's minimum capital requirement.
#[async_trait]
pub trait CapitalFloor: Send + Sync {
    /// Capital floor in ETH.
    async fn capital_floor_eth(&self) -> Result<Decimal, ChainError>;
}

/// Exchange rate between cover currencies.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// DAI per ETH.
    async fn dai_per_eth(&self) -> Result<Decimal, ChainError>;
}

/// Every chain collaborator the engine reads from.
pub trait ChainDataSource:
    ChainHead + CoverRegistry + StakePool + TokenPriceOracle + CapitalFloor + PriceFeed + fmt::Debug
{
}

impl<T> ChainDataSource for T where
    T: ChainHead
        + CoverRegistry
        + StakePool
        + TokenPriceOracle
        + CapitalFloor
        + PriceFeed
        + fmt::Debug
{
}

/// Runs a chain read with a deadline.
///
/// # Errors
///
/// Returns [`ChainError::Timeout`] if `fut` does not finish within `limit`,
/// otherwise whatever `fut` returns.
pub async fn with_timeout<T, F>(
    limit: Duration,
    operation: &'static str,
    fut: F,
) -> Result<T, ChainError>
where
    F: Future<Output = Result<T, ChainError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ChainError::Timeout {
            operation,
            millis: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}
