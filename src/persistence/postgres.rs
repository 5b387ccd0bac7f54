//! PostgreSQL implementation of the persistence layer.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use super::models::StoredQuote;
use super::{ApiKeyStore, QuoteStore};
use crate::error::EngineError;

type QuoteRow = (
    Uuid,
    String,
    String,
    i32,
    i64,
    i64,
    Decimal,
    String,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
    i16,
    String,
    String,
);

fn persistence_error(e: impl std::fmt::Display) -> EngineError {
    EngineError::Persistence(e.to_string())
}

/// PostgreSQL-backed persistence layer using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Creates a new persistence layer with the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url` and applies pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] if the connection or a migration
    /// fails.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, EngineError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await
            .map_err(persistence_error)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(persistence_error)?;

        Ok(Self::new(pool))
    }

    /// Registers `api_key` for `origin`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] on database failure.
    pub async fn insert_api_key(&self, origin: &str, api_key: &str) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO api_keys (api_key, origin) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(api_key)
        .bind(origin)
        .execute(&self.pool)
        .await
        .map_err(persistence_error)?;
        Ok(())
    }
}

fn decode_quote(row: QuoteRow) -> Result<StoredQuote, EngineError> {
    let (
        id,
        contract,
        currency,
        period_days,
        amount,
        requested_amount,
        amount_eth,
        price,
        price_in_token,
        generated_at,
        expires_at,
        v,
        r,
        s,
    ) = row;
    Ok(StoredQuote {
        id,
        contract: contract.parse().map_err(persistence_error)?,
        currency: currency.parse().map_err(persistence_error)?,
        period_days: u16::try_from(period_days).map_err(persistence_error)?,
        amount: u64::try_from(amount).map_err(persistence_error)?,
        requested_amount: u64::try_from(requested_amount).map_err(persistence_error)?,
        amount_eth,
        price: price.parse().map_err(persistence_error)?,
        price_in_token: price_in_token.parse().map_err(persistence_error)?,
        generated_at,
        expires_at,
        v: u8::try_from(v).map_err(persistence_error)?,
        r,
        s,
    })
}

#[async_trait]
impl QuoteStore for PostgresPersistence {
    async fn save_quote(&self, quote: &StoredQuote) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO quotes (id, contract, currency, period_days, amount, requested_amount, \
             amount_eth, price, price_in_token, generated_at, expires_at, v, r, s) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(quote.id)
        .bind(quote.contract.to_string())
        .bind(quote.currency.as_str())
        .bind(i32::from(quote.period_days))
        .bind(i64::try_from(quote.amount).map_err(persistence_error)?)
        .bind(i64::try_from(quote.requested_amount).map_err(persistence_error)?)
        .bind(quote.amount_eth)
        .bind(quote.price.to_string())
        .bind(quote.price_in_token.to_string())
        .bind(quote.generated_at)
        .bind(quote.expires_at)
        .bind(i16::from(quote.v))
        .bind(&quote.r)
        .bind(&quote.s)
        .execute(&self.pool)
        .await
        .map_err(persistence_error)?;
        Ok(())
    }

    async fn load_unexpired_quotes(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<StoredQuote>, EngineError> {
        let rows = sqlx::query_as::<_, QuoteRow>(
            "SELECT id, contract, currency, period_days, amount, requested_amount, amount_eth, \
             price, price_in_token, generated_at, expires_at, v, r, s \
             FROM quotes WHERE expires_at > $1 ORDER BY generated_at ASC",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(persistence_error)?;

        rows.into_iter().map(decode_quote).collect()
    }

    async fn delete_quotes_before(&self, cutoff: DateTime<Utc>) -> Result<u64, EngineError> {
        let result = sqlx::query("DELETE FROM quotes WHERE expires_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(persistence_error)?;

        Ok(result.rows_affected())
    }

    async fn load_quotes_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StoredQuote>, EngineError> {
        let rows = sqlx::query_as::<_, QuoteRow>(
            "SELECT id, contract, currency, period_days, amount, requested_amount, amount_eth, \
             price, price_in_token, generated_at, expires_at, v, r, s \
             FROM quotes WHERE generated_at >= $1 AND generated_at < $2 \
             ORDER BY generated_at ASC",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(persistence_error)?;

        rows.into_iter().map(decode_quote).collect()
    }
}

#[async_trait]
impl ApiKeyStore for PostgresPersistence {
    async fn api_key_exists(&self, origin: &str, api_key: &str) -> Result<bool, EngineError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM api_keys WHERE origin = $1 AND api_key = $2)",
        )
        .bind(origin)
        .bind(api_key)
        .fetch_one(&self.pool)
        .await
        .map_err(persistence_error)
    }
}
