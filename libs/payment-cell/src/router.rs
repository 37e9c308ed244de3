use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_database::Stores;
use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, PaymentCellState};
use crate::services::{GatewayRegistry, ReconciliationService};

pub fn payment_routes(config: Arc<AppConfig>, stores: &Stores, gateways: GatewayRegistry) -> Router {
    let state = Arc::new(PaymentCellState {
        reconciliation: Arc::new(ReconciliationService::new(stores, gateways, config.clone())),
    });

    // Gateways call these without a user token
    let public_routes = Router::new().route("/webhooks/{gateway}", post(handlers::gateway_webhook));

    let protected_routes = Router::new()
        .route("/initiate", post(handlers::initiate_payment))
        .route("/verify", post(handlers::verify_payment))
        .route("/{transaction_ref}", get(handlers::get_payment))
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
