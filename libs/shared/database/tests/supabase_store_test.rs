use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{NaiveDate, NaiveTime};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_config::AppConfig;
use shared_database::{
    AppointmentStore, ChangeFeed, PaymentStore, StoreError, SupabaseClient, SupabaseStore,
};
use shared_models::{AppointmentStatus, NewAppointment, PaymentStatus};

fn store_for(server: &MockServer) -> SupabaseStore {
    let config = AppConfig {
        supabase_url: server.uri(),
        supabase_service_role_key: "service-role-key".to_string(),
        ..AppConfig::default()
    };
    SupabaseStore::new(Arc::new(SupabaseClient::new(&config)), ChangeFeed::default())
}

fn appointment_row(id: Uuid, provider_id: Uuid, status: &str) -> serde_json::Value {
    json!({
        "id": id,
        "doctor_id": provider_id,
        "patient_id": Uuid::new_v4(),
        "clinic_id": null,
        "appointment_date": "2024-06-10",
        "appointment_time": "09:00:00",
        "status": status,
        "is_first_visit": true,
        "confirmed_at": null,
        "created_at": "2024-06-01T08:00:00Z"
    })
}

fn new_appointment(provider_id: Uuid) -> NewAppointment {
    NewAppointment {
        provider_id,
        patient_id: Uuid::new_v4(),
        clinic_id: None,
        date: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
        time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        is_first_visit: true,
    }
}

#[tokio::test]
async fn test_atomic_insert_goes_through_rpc() {
    let server = MockServer::start().await;
    let provider_id = Uuid::new_v4();
    let id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/book_appointment_atomic"))
        .and(header("apikey", "service-role-key"))
        .and(body_partial_json(json!({
            "p_doctor_id": provider_id,
            "p_appointment_time": "09:00:00"
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(appointment_row(id, provider_id, "pending")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let appointment = store_for(&server)
        .insert_if_slot_free(new_appointment(provider_id))
        .await
        .unwrap();
    assert_eq!(appointment.id, id);
    assert_eq!(appointment.status, AppointmentStatus::Pending);
}

#[tokio::test]
async fn test_unique_violation_maps_to_slot_occupied() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/book_appointment_atomic"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23505",
            "message": "SLOT_TAKEN"
        })))
        .mount(&server)
        .await;

    let result = store_for(&server)
        .insert_if_slot_free(new_appointment(Uuid::new_v4()))
        .await;
    assert_matches!(result, Err(StoreError::SlotOccupied));
}

#[tokio::test]
async fn test_transition_filters_on_current_status() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", id)))
        .and(query_param("status", "in.(pending)"))
        .and(header("prefer", "return=representation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let result = store_for(&server)
        .transition_status(
            id,
            &[AppointmentStatus::Pending],
            AppointmentStatus::Confirmed,
            None,
        )
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_settle_patches_only_pending_payments() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/payments"))
        .and(query_param("transaction_ref", "eq.PAY-1700000000000-ABCDEFGHI"))
        .and(query_param("status", "eq.pending"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let settled = store_for(&server)
        .settle("PAY-1700000000000-ABCDEFGHI", PaymentStatus::Success, None)
        .await
        .unwrap();
    assert!(settled.is_none());
}
