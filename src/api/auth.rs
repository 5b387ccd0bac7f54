//! Access control for quote and capacity endpoints.
//!
//! A request passes when its `Origin` ends with the configured suffix, or
//! when its `x-api-key` is registered for that origin, either statically
//! or in the key store.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use crate::app_state::AppState;
use crate::config::AccessPolicy;
use crate::error::EngineError;
use crate::persistence::ApiKeyStore;

/// Header carrying the caller's API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Decides whether a caller may use the quote endpoints.
#[derive(Debug)]
pub struct AccessControl {
    policy: AccessPolicy,
    store: Option<Arc<dyn ApiKeyStore>>,
}

impl AccessControl {
    /// Creates the checker.
    #[must_use]
    pub fn new(policy: AccessPolicy, store: Option<Arc<dyn ApiKeyStore>>) -> Self {
        Self { policy, store }
    }

    /// Lets every caller through.
    #[must_use]
    pub fn open() -> Self {
        Self::new(AccessPolicy::default(), None)
    }

    /// Returns `true` if a caller with `origin` and `api_key` is allowed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] if the key store cannot be read.
    pub async fn is_allowed(
        &self,
        origin: Option<&str>,
        api_key: Option<&str>,
    ) -> Result<bool, EngineError> {
        if !self.policy.enabled {
            return Ok(true);
        }
        if let (Some(origin), Some(suffix)) = (origin, self.policy.origin_suffix.as_deref())
            && origin.ends_with(suffix)
        {
            return Ok(true);
        }
        let Some(api_key) = api_key else {
            return Ok(false);
        };

        let origin = origin.unwrap_or_default();
        if self
            .policy
            .api_keys
            .iter()
            .any(|k| k.origin == origin && k.api_key == api_key)
        {
            return Ok(true);
        }
        match &self.store {
            Some(store) => store.api_key_exists(origin, api_key).await,
            None => Ok(false),
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Middleware rejecting callers that [`AccessControl`] does not allow.
///
/// # Errors
///
/// Returns [`EngineError::Forbidden`] for disallowed callers.
pub async fn require_access(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, EngineError> {
    let headers = request.headers();
    let origin = header(headers, "origin");
    let allowed = state
        .access
        .is_allowed(origin, header(headers, API_KEY_HEADER))
        .await?;
    if !allowed {
        tracing::debug!(origin = origin.unwrap_or("-"), "request rejected by access control");
        return Err(EngineError::Forbidden(
            "origin not allowed, contact us for an API key".to_string(),
        ));
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{ApiKey, MemoryStore};

    fn policy() -> AccessPolicy {
        AccessPolicy {
            enabled: true,
            origin_suffix: Some(".example.io".to_string()),
            api_keys: vec![ApiKey {
                api_key: "static-key".to_string(),
                origin: "https://partner.com".to_string(),
            }],
        }
    }

    #[tokio::test]
    async fn origin_suffix_is_allowed() {
        let access = AccessControl::new(policy(), None);
        assert_eq!(access.is_allowed(Some("https://app.example.io"), None).await.ok(), Some(true));
        assert_eq!(access.is_allowed(Some("https://evil.com"), None).await.ok(), Some(false));
        assert_eq!(access.is_allowed(None, None).await.ok(), Some(false));
    }

    #[tokio::test]
    async fn api_keys_are_checked_per_origin() {
        let store: Arc<dyn ApiKeyStore> = Arc::new(MemoryStore::with_api_keys(vec![ApiKey {
            api_key: "db-key".to_string(),
            origin: "https://other.com".to_string(),
        }]));
        let access = AccessControl::new(policy(), Some(store));

        let allowed = |origin, key| access.is_allowed(Some(origin), Some(key));
        assert_eq!(allowed("https://partner.com", "static-key").await.ok(), Some(true));
        assert_eq!(allowed("https://other.com", "db-key").await.ok(), Some(true));
        assert_eq!(allowed("https://other.com", "static-key").await.ok(), Some(false));
    }

    #[tokio::test]
    async fn disabled_policy_allows_everyone() {
        let access = AccessControl::open();
        assert_eq!(access.is_allowed(None, None).await.ok(), Some(true));
    }
}
