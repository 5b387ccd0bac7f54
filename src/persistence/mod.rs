//! Persistence layer: issued quotes and API keys.
//!
//! [`QuoteStore`] and [`ApiKeyStore`] are the seams the service and the
//! access-control middleware depend on. [`postgres::PostgresPersistence`]
//! implements both over `sqlx::PgPool`; [`memory::MemoryStore`] backs tests
//! and deployments without a database.

pub mod export;
pub mod memory;
pub mod models;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::EngineError;

pub use export::write_quotes_csv;
pub use memory::MemoryStore;
pub use models::{ApiKey, StoredQuote};
pub use postgres::PostgresPersistence;

/// Durable record of signed quotes.
#[async_trait]
pub trait QuoteStore: Send + Sync + fmt::Debug {
    /// Stores a signed quote.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] on storage failure.
    async fn save_quote(&self, quote: &StoredQuote) -> Result<(), EngineError>;

    /// Quotes whose expiry is after `now`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] on storage failure.
    async fn load_unexpired_quotes(&self, now: DateTime<Utc>)
    -> Result<Vec<StoredQuote>, EngineError>;

    /// Deletes quotes that expired before `cutoff`. Returns the number deleted.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] on storage failure.
    async fn delete_quotes_before(&self, cutoff: DateTime<Utc>) -> Result<u64, EngineError>;

    /// Quotes generated in `[from, to)`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] on storage failure.
    async fn load_quotes_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StoredQuote>, EngineError>;
}

/// Lookup of API keys granted to specific origins.
#[async_trait]
pub trait ApiKeyStore: Send + Sync + fmt::Debug {
    /// Returns `true` if `api_key` is registered for `origin`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] on storage failure.
    async fn api_key_exists(&self, origin: &str, api_key: &str) -> Result<bool, EngineError>;
}
