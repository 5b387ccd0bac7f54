//! Process-local store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::models::{ApiKey, StoredQuote};
use super::{ApiKeyStore, QuoteStore};
use crate::error::EngineError;

/// Quotes and API keys kept in memory. Used when persistence is disabled.
#[derive(Debug, Default)]
pub struct MemoryStore {
    quotes: RwLock<Vec<StoredQuote>>,
    api_keys: RwLock<Vec<ApiKey>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store preloaded with `api_keys`.
    #[must_use]
    pub fn with_api_keys(api_keys: Vec<ApiKey>) -> Self {
        Self {
            quotes: RwLock::default(),
            api_keys: RwLock::new(api_keys),
        }
    }

    /// Number of stored quotes.
    #[must_use]
    pub fn quote_count(&self) -> usize {
        self.quotes.read().len()
    }
}

#[async_trait]
impl QuoteStore for MemoryStore {
    async fn save_quote(&self, quote: &StoredQuote) -> Result<(), EngineError> {
        self.quotes.write().push(quote.clone());
        Ok(())
    }

    async fn load_unexpired_quotes(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<StoredQuote>, EngineError> {
        Ok(self
            .quotes
            .read()
            .iter()
            .filter(|q| q.expires_at > now)
            .cloned()
            .collect())
    }

    async fn delete_quotes_before(&self, cutoff: DateTime<Utc>) -> Result<u64, EngineError> {
        let mut quotes = self.quotes.write();
        let before = quotes.len();
        quotes.retain(|q| q.expires_at >= cutoff);
        Ok(u64::try_from(before - quotes.len()).unwrap_or(u64::MAX))
    }

    async fn load_quotes_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StoredQuote>, EngineError> {
        let mut quotes: Vec<StoredQuote> = self
            .quotes
            .read()
            .iter()
            .filter(|q| q.generated_at >= from && q.generated_at < to)
            .cloned()
            .collect();
        quotes.sort_by_key(|q| q.generated_at);
        Ok(quotes)
    }
}

#[async_trait]
impl ApiKeyStore for MemoryStore {
    async fn api_key_exists(&self, origin: &str, api_key: &str) -> Result<bool, EngineError> {
        Ok(self
            .api_keys
            .read()
            .iter()
            .any(|k| k.origin == origin && k.api_key == api_key))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{Address, Currency};
    use chrono::Duration;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn quote_at(generated_at: DateTime<Utc>) -> StoredQuote {
        StoredQuote {
            id: Uuid::new_v4(),
            contract: Address::ZERO,
            currency: Currency::Eth,
            period_days: 30,
            amount: 10,
            requested_amount: 10,
            amount_eth: Decimal::TEN,
            price: 1,
            price_in_token: 1,
            generated_at,
            expires_at: generated_at + Duration::hours(1),
            v: 27,
            r: String::new(),
            s: String::new(),
        }
    }

    #[tokio::test]
    async fn quotes_between_is_half_open_and_oldest_first() {
        let store = MemoryStore::default();
        let now = Utc::now();
        for offset in [3, 0, 1, 2] {
            tokio_test::assert_ok!(store.save_quote(&quote_at(now + Duration::minutes(offset))).await);
        }

        let Ok(found) = store
            .load_quotes_between(now + Duration::minutes(1), now + Duration::minutes(3))
            .await
        else {
            panic!("range query failed");
        };
        let times: Vec<_> = found.iter().map(|q| q.generated_at).collect();
        assert_eq!(times, vec![now + Duration::minutes(1), now + Duration::minutes(2)]);
    }

    #[tokio::test]
    async fn api_keys_are_bound_to_origin() {
        let store = MemoryStore::with_api_keys(vec![ApiKey {
            api_key: "k1".to_string(),
            origin: "https://app.example".to_string(),
        }]);
        tokio_test::assert_ok!(store.api_key_exists("https://app.example", "k1").await);
        assert_eq!(store.api_key_exists("https://app.example", "k1").await.ok(), Some(true));
        assert_eq!(store.api_key_exists("https://other.example", "k1").await.ok(), Some(false));
    }
}
