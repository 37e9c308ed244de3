use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use shared_config::AppConfig;
use shared_database::Stores;
use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, DoctorCellState};

pub fn doctor_routes(config: Arc<AppConfig>, stores: &Stores) -> Router {
    let state = Arc::new(DoctorCellState::new(stores));

    let protected_routes = Router::new()
        .route("/clinics", get(handlers::list_clinics))
        .route("/clinics/{clinic_id}/providers", get(handlers::list_clinic_providers))
        .route("/{provider_id}/slots", get(handlers::get_slots))
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
