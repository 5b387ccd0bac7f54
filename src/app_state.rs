//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::api::auth::AccessControl;
use crate::service::QuoteService;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Quote and capacity business logic.
    pub quote_service: Arc<QuoteService>,
    /// Caller checks for the protected routes.
    pub access: Arc<AccessControl>,
}
