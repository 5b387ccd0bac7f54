//! Quote DTOs: query parameters, the v1 response and the legacy response.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{QuoteOutcome, QuoteSignature, SignedQuote};

/// Query string of `GET /v1/quote`. Values are validated by the service.
#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct QuoteQuery {
    /// Requested cover amount, positive integer in whole units.
    #[param(example = "1000")]
    pub cover_amount: String,
    /// `ETH` or `DAI`, case-insensitive.
    #[param(example = "ETH")]
    pub currency: String,
    /// Cover period in days, 30 to 365.
    #[param(example = "100")]
    pub period: String,
    /// Protected contract address.
    #[param(example = "0x3d9819210a31b4961b30ef54be2aed79b9c9cd3b")]
    pub contract_address: String,
}

/// `(v, r, s)` signature over the packed quote.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SignatureDto {
    /// Recovery byte, 27 or 28.
    pub v: u8,
    /// `0x`-prefixed 32-byte hex.
    pub r: String,
    /// `0x`-prefixed 32-byte hex.
    pub s: String,
}

impl From<&QuoteSignature> for SignatureDto {
    fn from(sig: &QuoteSignature) -> Self {
        Self {
            v: sig.v,
            r: sig.r_hex(),
            s: sig.s_hex(),
        }
    }
}

/// A signed quote. Amounts and prices are decimal strings; prices are in
/// the smallest unit (18 decimals).
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignedQuoteDto {
    /// Cover currency.
    pub currency: String,
    /// Cover period in days.
    pub period: u16,
    /// Offered cover amount, whole units.
    pub amount: String,
    /// Premium in the smallest unit of `currency`.
    pub price: String,
    /// Premium in the smallest unit of the settlement token.
    pub price_in_token: String,
    /// Generation time, milliseconds since the epoch.
    pub generated_at: u64,
    /// Expiry, seconds since the epoch.
    pub expires_at: u64,
    /// Protected contract.
    pub contract: String,
    /// Signature the verifier checks.
    pub signature: SignatureDto,
}

impl From<&SignedQuote> for SignedQuoteDto {
    fn from(quote: &SignedQuote) -> Self {
        Self {
            currency: quote.currency.to_string(),
            period: quote.period_days,
            amount: quote.amount.to_string(),
            price: quote.price.to_string(),
            price_in_token: quote.price_in_token.to_string(),
            generated_at: quote.generated_at_ms,
            expires_at: quote.expires_at,
            contract: quote.contract.to_string(),
            signature: SignatureDto::from(&quote.signature),
        }
    }
}

/// A business rejection. Returned with status 200.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RejectedQuoteDto {
    /// `Uncoverable` or `capacityLimitExceed`.
    pub error: String,
    /// Generation time, milliseconds since the epoch.
    pub generated_at: u64,
    /// Expiry, seconds since the epoch.
    pub expires_at: u64,
}

/// Body of `GET /v1/quote`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(untagged)]
pub enum QuoteResponse {
    /// A signed quote.
    Signed(SignedQuoteDto),
    /// No quote could be offered.
    Rejected(RejectedQuoteDto),
}

impl From<&QuoteOutcome> for QuoteResponse {
    fn from(outcome: &QuoteOutcome) -> Self {
        match outcome {
            QuoteOutcome::Signed(quote) => Self::Signed(SignedQuoteDto::from(quote)),
            QuoteOutcome::Rejected {
                reason,
                generated_at_ms,
                expires_at,
                ..
            } => Self::Rejected(RejectedQuoteDto {
                error: reason.to_string(),
                generated_at: *generated_at_ms,
                expires_at: *expires_at,
            }),
        }
    }
}

/// Body of the legacy `GET /getQuote/...` endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LegacyQuoteResponse {
    /// Cover currency.
    #[serde(rename = "coverCurr")]
    pub cover_curr: String,
    /// Cover period in days, as a string.
    #[serde(rename = "coverPeriod")]
    pub cover_period: String,
    /// Protected contract.
    #[serde(rename = "smartCA")]
    pub smart_ca: String,
    /// Offered amount, whole units.
    #[serde(rename = "coverAmount")]
    pub cover_amount: u64,
    /// Premium in the smallest unit of the cover currency.
    #[serde(rename = "coverCurrPrice")]
    pub cover_curr_price: String,
    /// Premium in the smallest unit of the settlement token.
    #[serde(rename = "PriceNxm")]
    pub price_nxm: String,
    /// Expiry, seconds since the epoch.
    #[serde(rename = "expireTime")]
    pub expire_time: u64,
    /// Generation time, milliseconds since the epoch.
    #[serde(rename = "generationTime")]
    pub generation_time: u64,
    /// `ok`, `Uncoverable` or `capacityLimitExceed`.
    pub reason: String,
    /// Recovery byte; absent when nothing was signed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v: Option<u8>,
    /// Signature `r`; absent when nothing was signed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r: Option<String>,
    /// Signature `s`; absent when nothing was signed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s: Option<String>,
}

impl LegacyQuoteResponse {
    /// Legacy rendering of `outcome` for a request of `period_days` in
    /// `currency`. A signed quote whose amount was reduced to fit capacity
    /// carries reason `capacityLimitExceed`.
    #[must_use]
    pub fn from_outcome(outcome: &QuoteOutcome, currency: &str, period_days: u16) -> Self {
        match outcome {
            QuoteOutcome::Signed(quote) => Self {
                cover_curr: quote.currency.to_string(),
                cover_period: quote.period_days.to_string(),
                smart_ca: quote.contract.to_string(),
                cover_amount: quote.amount,
                cover_curr_price: quote.price.to_string(),
                price_nxm: quote.price_in_token.to_string(),
                expire_time: quote.expires_at,
                generation_time: quote.generated_at_ms,
                reason: if quote.is_capped() {
                    "capacityLimitExceed".to_string()
                } else {
                    "ok".to_string()
                },
                v: Some(quote.signature.v),
                r: Some(quote.signature.r_hex()),
                s: Some(quote.signature.s_hex()),
            },
            QuoteOutcome::Rejected {
                contract,
                reason,
                generated_at_ms,
                expires_at,
            } => Self {
                cover_curr: currency.to_string(),
                cover_period: period_days.to_string(),
                smart_ca: contract.to_string(),
                cover_amount: 0,
                cover_curr_price: "0".to_string(),
                price_nxm: "0".to_string(),
                expire_time: *expires_at,
                generation_time: *generated_at_ms,
                reason: reason.to_string(),
                v: None,
                r: None,
                s: None,
            },
        }
    }
}
