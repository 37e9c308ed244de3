use std::sync::Arc;

use axum::{routing::get, Router};

use appointment_cell::router::appointment_routes;
use booking_flow_cell::router::booking_routes;
use booking_queue_cell::{router::queue_routes, QueueWatchService};
use doctor_cell::router::doctor_routes;
use payment_cell::{router::payment_routes, GatewayRegistry};
use shared_config::AppConfig;
use shared_database::Stores;

pub fn create_router(
    config: Arc<AppConfig>,
    stores: &Stores,
    gateways: GatewayRegistry,
    watcher: QueueWatchService,
) -> Router {
    Router::new()
        .route("/", get(|| async { "Amae booking API is running!" }))
        .nest("/doctors", doctor_routes(config.clone(), stores))
        .nest("/appointments", appointment_routes(config.clone(), stores))
        .nest("/queue", queue_routes(config.clone(), stores, watcher))
        .nest("/payments", payment_routes(config.clone(), stores, gateways.clone()))
        .nest("/booking", booking_routes(config, stores, gateways))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use chrono::Utc;
    use tower::ServiceExt;
    use uuid::Uuid;

    use shared_database::InMemoryStore;
    use shared_models::Provider;
    use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

    use super::*;

    async fn app() -> (Router, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::default());
        let stores = Stores::in_memory(store.clone());
        let watcher = QueueWatchService::new(&stores, Duration::from_millis(10));
        let router = create_router(
            TestConfig::default().to_arc(),
            &stores,
            GatewayRegistry::default(),
            watcher,
        );
        (router, store)
    }

    #[tokio::test]
    async fn test_liveness() {
        let (app, _) = app().await;

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_booking_routes_are_mounted() {
        let (app, store) = app().await;
        let provider = Provider {
            id: Uuid::new_v4(),
            profile_id: None,
            first_name: "Awa".to_string(),
            last_name: "Koné".to_string(),
            specialty: None,
            consultation_price: None,
        };
        store.add_provider(provider.clone(), None).await;
        let tomorrow = Utc::now().date_naive() + chrono::Duration::days(1);

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/booking/slots?provider_id={}&date={}", provider.id, tomorrow))
                    .header(
                        "Authorization",
                        JwtTestUtils::bearer(&TestUser::patient("fatou@example.com")),
                    )
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_webhooks_for_disabled_gateway_are_rejected() {
        let (app, _) = app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/payments/webhooks/paystack")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
