//! REST endpoint handlers organized by resource.

pub mod capacity;
pub mod quote;
pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Composes the quote and capacity routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(quote::routes())
        .merge(capacity::routes())
}
