//! REST API layer: route handlers, DTOs, access control and router
//! composition.
//!
//! Quote and capacity endpoints sit behind [`auth::require_access`];
//! `/health` is always reachable.

pub mod auth;
pub mod dto;
pub mod handlers;

use axum::{Router, middleware};
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI document of the public endpoints.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "Cover Quote Engine", description = "Capacity, pricing and signed quotes for protected contracts"),
    paths(
        handlers::quote::get_quote,
        handlers::quote::get_legacy_quote,
        handlers::capacity::get_capacity,
        handlers::capacity::list_capacities,
        handlers::system::health_handler,
    ),
    components(schemas(
        dto::QuoteResponse,
        dto::SignedQuoteDto,
        dto::RejectedQuoteDto,
        dto::SignatureDto,
        dto::LegacyQuoteResponse,
        dto::CapacityResponse,
        crate::error::ErrorResponse,
    )),
    tags(
        (name = "Quotes", description = "Signed cover quotes"),
        (name = "Capacity", description = "Remaining cover capacity"),
        (name = "System", description = "Service status"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router.
pub fn build_router(state: &AppState) -> Router<AppState> {
    let protected = handlers::routes().route_layer(middleware::from_fn_with_state(
        state.clone(),
        auth::require_access,
    ));
    let router = Router::new()
        .merge(protected)
        .merge(handlers::system::routes());

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
}
