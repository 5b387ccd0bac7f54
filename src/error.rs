//! Engine error types with HTTP status code mapping.
//!
//! [`EngineError`] is the error type returned by the service layer and the
//! handlers. Each variant maps to a numeric code, an HTTP status and the
//! structured JSON body below. Lower layers keep their own error types and
//! convert through `From`.
//!
//! `Uncoverable` and `capacityLimitExceed` are not errors: they are quote
//! outcomes returned with status 200.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::chain::ChainError;
use crate::domain::{Address, QuoteRequestError};
use crate::service::RateLimited;
use crate::signing::SignerError;
use crate::whitelist::WhitelistError;

/// Structured JSON error response body.
///
/// ```json
/// {
///   "error": {
///     "code": 1001,
///     "message": "invalid request: period must be an integer between 30 and 365 days, got \"7\""
///   }
/// }
/// ```
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Service-level error with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category          | HTTP Status               |
/// |-----------|-------------------|---------------------------|
/// | 1000–1999 | Client            | 400 / 403                 |
/// | 2000–2999 | Throttling        | 429 Too Many Requests     |
/// | 3000–3999 | Server            | 500 Internal Server Error |
/// | 5000–5999 | Upstream          | 502 Bad Gateway           |
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Request parameters failed validation.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The contract is not on the coverable-contracts whitelist.
    #[error("contract {0} is not whitelisted")]
    NotWhitelisted(Address),

    /// The caller's origin or API key is not allowed.
    #[error("origin not allowed: {0}")]
    Forbidden(String),

    /// The contract group signed a quote too recently.
    #[error("rate limit exceeded; retry after {retry_after_ms} ms")]
    RateLimited {
        /// Milliseconds until the group accepts another quote.
        retry_after_ms: u64,
    },

    /// A chain or feed read failed or timed out.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// The quote could not be signed.
    #[error("signing error: {0}")]
    Signing(String),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Validation(_) => 1001,
            Self::NotWhitelisted(_) => 1002,
            Self::Forbidden(_) => 1003,
            Self::RateLimited { .. } => 2001,
            Self::Internal(_) => 3000,
            Self::Persistence(_) => 3001,
            Self::Signing(_) => 3002,
            Self::Upstream(_) => 5001,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::NotWhitelisted(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Signing(_) | Self::Persistence(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let retry_after = match &self {
            Self::RateLimited { retry_after_ms } => Some(retry_after_ms.div_ceil(1000)),
            _ => None,
        };
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl From<QuoteRequestError> for EngineError {
    fn from(err: QuoteRequestError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<ChainError> for EngineError {
    fn from(err: ChainError) -> Self {
        Self::Upstream(err.to_string())
    }
}

impl From<WhitelistError> for EngineError {
    fn from(err: WhitelistError) -> Self {
        Self::Upstream(err.to_string())
    }
}

impl From<SignerError> for EngineError {
    fn from(err: SignerError) -> Self {
        Self::Signing(err.to_string())
    }
}

impl From<RateLimited> for EngineError {
    fn from(err: RateLimited) -> Self {
        Self::RateLimited {
            retry_after_ms: u64::try_from(err.retry_after.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn codes_and_statuses() {
        let cases = [
            (EngineError::Validation("x".into()), 1001, StatusCode::BAD_REQUEST),
            (EngineError::NotWhitelisted(Address::ZERO), 1002, StatusCode::BAD_REQUEST),
            (EngineError::Forbidden("o".into()), 1003, StatusCode::FORBIDDEN),
            (
                EngineError::RateLimited { retry_after_ms: 1 },
                2001,
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (EngineError::Upstream("u".into()), 5001, StatusCode::BAD_GATEWAY),
            (EngineError::Signing("s".into()), 3002, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, code, status) in cases {
            assert_eq!(err.error_code(), code);
            assert_eq!(err.status_code(), status);
        }
    }

    #[test]
    fn rate_limited_sets_retry_after_header() {
        let err = EngineError::from(RateLimited {
            retry_after: Duration::from_millis(1500),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER),
            Some(&HeaderValue::from(2u64))
        );
    }

    #[test]
    fn chain_errors_map_to_upstream() {
        let err = EngineError::from(ChainError::Timeout {
            operation: "cover_count",
            millis: 5000,
        });
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert!(err.to_string().contains("cover_count"));
    }
}
