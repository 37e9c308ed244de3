use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use shared_config::AppConfig;
use shared_database::Stores;
use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, QueueCellState};
use crate::services::QueueWatchService;

pub fn queue_routes(config: Arc<AppConfig>, stores: &Stores, watcher: QueueWatchService) -> Router {
    let state = Arc::new(QueueCellState::new(stores, watcher));

    let protected_routes = Router::new()
        .route("/{appointment_id}", get(handlers::get_queue_position))
        .route("/{appointment_id}/stream", get(handlers::stream_queue_position))
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
