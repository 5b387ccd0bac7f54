//! Capacity handlers.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::CapacityResponse;
use crate::app_state::AppState;
use crate::domain::{Address, QuoteRequestError};
use crate::error::{EngineError, ErrorResponse};

/// `GET /v1/contracts/{address}/capacity` — Capacity of one contract.
///
/// # Errors
///
/// Returns [`EngineError`] on malformed or unknown addresses and upstream
/// failures.
#[utoipa::path(
    get,
    path = "/v1/contracts/{address}/capacity",
    tag = "Capacity",
    summary = "Get contract capacity",
    description = "Remaining cover capacity of a whitelisted contract in ETH and DAI, with the net stake behind it and the binding limit. Cached briefly per contract.",
    params(("address" = String, Path, description = "Protected contract address")),
    responses(
        (status = 200, description = "Capacity snapshot", body = CapacityResponse),
        (status = 400, description = "Malformed or non-whitelisted address", body = ErrorResponse),
        (status = 502, description = "Chain read failed", body = ErrorResponse),
    )
)]
pub async fn get_capacity(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let contract: Address = address.parse().map_err(QuoteRequestError::Contract)?;
    let snapshot = state.quote_service.get_capacity(contract).await?;
    Ok(Json(CapacityResponse::from(&snapshot)))
}

/// `GET /v1/capacities` — Capacity of every listed contract.
///
/// # Errors
///
/// Returns [`EngineError`] on upstream failures.
#[utoipa::path(
    get,
    path = "/v1/capacities",
    tag = "Capacity",
    summary = "List capacities",
    description = "Capacity snapshots for every whitelisted contract that is not deprecated, sorted by address.",
    responses(
        (status = 200, description = "Capacity snapshots", body = Vec<CapacityResponse>),
        (status = 502, description = "Chain read failed", body = ErrorResponse),
    )
)]
pub async fn list_capacities(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, EngineError> {
    let snapshots = state.quote_service.get_capacities().await?;
    let body: Vec<CapacityResponse> = snapshots.iter().map(CapacityResponse::from).collect();
    Ok(Json(body))
}

/// Capacity routes. Mounted behind access control.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/contracts/{address}/capacity", get(get_capacity))
        .route("/v1/capacities", get(list_capacities))
}
