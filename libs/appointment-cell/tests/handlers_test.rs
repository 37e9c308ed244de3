use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::NaiveTime;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use appointment_cell::router::appointment_routes;
use shared_database::{InMemoryStore, Stores};
use shared_models::{AvailabilityWindow, Provider};
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

struct TestApp {
    app: Router,
    provider_id: Uuid,
    provider_user: TestUser,
}

async fn create_test_app() -> TestApp {
    let store = Arc::new(InMemoryStore::default());
    let provider_user = TestUser::doctor("doctor@example.com");
    let provider_id = Uuid::new_v4();
    store
        .add_provider(
            Provider {
                id: provider_id,
                profile_id: Some(provider_user.id),
                first_name: "Marie".to_string(),
                last_name: "Traoré".to_string(),
                specialty: Some("Pédiatrie".to_string()),
                consultation_price: Some(8000),
            },
            None,
        )
        .await;
    store
        .add_window(AvailabilityWindow {
            id: Uuid::new_v4(),
            provider_id,
            day_of_week: 1,
            start_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            is_active: true,
        })
        .await;

    TestApp {
        app: appointment_routes(TestConfig::default().to_arc(), &Stores::in_memory(store)),
        provider_id,
        provider_user,
    }
}

fn post(uri: &str, user: &TestUser, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Authorization", JwtTestUtils::bearer(user))
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_reserve_then_conflict_returns_refreshed_slots() {
    let test = create_test_app().await;
    let alice = TestUser::patient("alice@example.com");
    let bob = TestUser::patient("bob@example.com");
    let body = json!({
        "doctor_id": test.provider_id,
        "date": "2024-06-10",
        "time": "09:00"
    });

    let response = test
        .app
        .clone()
        .oneshot(post("/reserve", &alice, body.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created = body_json(response).await;
    assert_eq!(created["appointment"]["status"], "pending");
    assert_eq!(created["appointment"]["patient_id"], json!(alice.id));

    let response = test
        .app
        .oneshot(post("/reserve", &bob, body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let conflict = body_json(response).await;
    assert_eq!(conflict["code"], "SLOT_TAKEN");

    let slots = conflict["available_slots"].as_array().unwrap();
    assert_eq!(slots.len(), 4);
    let nine = slots.iter().find(|s| s["time"] == "09:00").unwrap();
    assert_eq!(nine["available"], false);
}

#[tokio::test]
async fn test_patient_cannot_book_for_someone_else() {
    let test = create_test_app().await;
    let alice = TestUser::patient("alice@example.com");

    let response = test
        .app
        .oneshot(post(
            "/reserve",
            &alice,
            json!({
                "doctor_id": test.provider_id,
                "date": "2024-06-10",
                "time": "08:30",
                "patient_id": Uuid::new_v4()
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_only_provider_can_complete_and_pending_is_rejected() {
    let test = create_test_app().await;
    let alice = TestUser::patient("alice@example.com");

    let response = test
        .app
        .clone()
        .oneshot(post(
            "/reserve",
            &alice,
            json!({ "doctor_id": test.provider_id, "date": "2024-06-10", "time": "08:00" }),
        ))
        .await
        .unwrap();
    let appointment_id = body_json(response).await["appointment"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let by_patient = test
        .app
        .clone()
        .oneshot(post(
            &format!("/{}/complete", appointment_id),
            &alice,
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(by_patient.status(), StatusCode::FORBIDDEN);

    let by_provider = test
        .app
        .oneshot(post(
            &format!("/{}/complete", appointment_id),
            &test.provider_user,
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(by_provider.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_patient_cancels_own_reservation() {
    let test = create_test_app().await;
    let alice = TestUser::patient("alice@example.com");

    let response = test
        .app
        .clone()
        .oneshot(post(
            "/reserve",
            &alice,
            json!({ "doctor_id": test.provider_id, "date": "2024-06-10", "time": "09:30" }),
        ))
        .await
        .unwrap();
    let appointment_id = body_json(response).await["appointment"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = test
        .app
        .oneshot(post(
            &format!("/{}/cancel", appointment_id),
            &alice,
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["appointment"]["status"], "cancelled");
}
