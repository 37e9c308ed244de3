use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use payment_cell::{GatewayRegistry, ReconciliationService};
use shared_config::AppConfig;
use shared_database::Stores;
use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, BookingCellState};
use crate::services::BookingOrchestrator;

pub fn booking_routes(config: Arc<AppConfig>, stores: &Stores, gateways: GatewayRegistry) -> Router {
    let reconciliation = Arc::new(ReconciliationService::new(stores, gateways, config.clone()));
    let orchestrator = Arc::new(BookingOrchestrator::new(stores, reconciliation, &config));
    let state = Arc::new(BookingCellState::new(orchestrator));

    let protected_routes = Router::new()
        .route("/slots", get(handlers::get_slots))
        .route("/checkout", post(handlers::checkout))
        .route("/{appointment_id}/retry-payment", post(handlers::retry_payment))
        .route("/voice/sessions", post(handlers::start_voice_session))
        .route("/voice/sessions/{session_id}", delete(handlers::abort_voice_session))
        .route("/voice/sessions/{session_id}/reply", post(handlers::reply_voice_session))
        .route("/voice/sessions/{session_id}/payment", post(handlers::poll_voice_payment))
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
