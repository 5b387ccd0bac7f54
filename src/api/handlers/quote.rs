//! Quote handlers: the v1 endpoint and the legacy path-parameter endpoint.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{LegacyQuoteResponse, QuoteQuery, QuoteResponse};
use crate::app_state::AppState;
use crate::domain::QuoteRequest;
use crate::error::{EngineError, ErrorResponse};

/// `GET /v1/quote` — Price and sign a cover quote.
///
/// # Errors
///
/// Returns [`EngineError`] on invalid parameters, unknown contracts, rate
/// limiting or upstream failures.
#[utoipa::path(
    get,
    path = "/v1/quote",
    tag = "Quotes",
    summary = "Get a signed cover quote",
    description = "Computes capacity and price for the requested cover and signs the quote. Zero net stake or exhausted capacity return a 200 response with an `error` reason and no signature.",
    params(QuoteQuery),
    responses(
        (status = 200, description = "Signed quote or business rejection", body = QuoteResponse),
        (status = 400, description = "Invalid parameters or contract not whitelisted", body = ErrorResponse),
        (status = 403, description = "Origin not allowed", body = ErrorResponse),
        (status = 429, description = "Contract group quoted too recently", body = ErrorResponse),
        (status = 502, description = "Chain read failed", body = ErrorResponse),
    )
)]
pub async fn get_quote(
    State(state): State<AppState>,
    Query(query): Query<QuoteQuery>,
) -> Result<impl IntoResponse, EngineError> {
    let request = QuoteRequest::parse(
        &query.contract_address,
        &query.cover_amount,
        &query.currency,
        &query.period,
    )?;
    let outcome = state.quote_service.get_quote(request).await?;
    Ok(Json(QuoteResponse::from(&outcome)))
}

/// `GET /getQuote/{coverAmount}/{currency}/{period}/{contractAddress}/{version}` — Legacy quote format.
///
/// # Errors
///
/// Returns [`EngineError`] like [`get_quote`].
#[utoipa::path(
    get,
    path = "/getQuote/{coverAmount}/{currency}/{period}/{contractAddress}/{version}",
    tag = "Quotes",
    summary = "Get a signed cover quote (legacy format)",
    description = "Same computation as `/v1/quote`, rendered in the legacy field layout. A quote reduced to fit capacity carries reason `capacityLimitExceed`.",
    params(
        ("coverAmount" = String, Path, description = "Requested amount, whole units"),
        ("currency" = String, Path, description = "ETH or DAI"),
        ("period" = String, Path, description = "Cover period in days"),
        ("contractAddress" = String, Path, description = "Protected contract address"),
        ("version" = String, Path, description = "Client version, ignored"),
    ),
    responses(
        (status = 200, description = "Legacy quote", body = LegacyQuoteResponse),
        (status = 400, description = "Invalid parameters or contract not whitelisted", body = ErrorResponse),
        (status = 403, description = "Origin not allowed", body = ErrorResponse),
        (status = 429, description = "Contract group quoted too recently", body = ErrorResponse),
    )
)]
pub async fn get_legacy_quote(
    State(state): State<AppState>,
    Path((amount, currency, period, contract, _version)): Path<(
        String,
        String,
        String,
        String,
        String,
    )>,
) -> Result<impl IntoResponse, EngineError> {
    let request = QuoteRequest::parse(&contract, &amount, &currency, &period)?;
    let outcome = state.quote_service.get_quote(request).await?;
    Ok(Json(LegacyQuoteResponse::from_outcome(
        &outcome,
        request.currency.as_str(),
        request.period_days,
    )))
}

/// Quote routes. Mounted behind access control.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/quote", get(get_quote))
        .route(
            "/getQuote/{coverAmount}/{currency}/{period}/{contractAddress}/{version}",
            get(get_legacy_quote),
        )
}
