use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{NaiveDate, NaiveTime};
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

use appointment_cell::{AppointmentError, ReservationRequest, ReservationService};
use shared_database::{AppointmentStore, InMemoryStore, Stores};
use shared_models::{AppointmentStatus, ConsultationIntake, ConsultationMode};

fn request(provider_id: Uuid, patient_id: Uuid, time: NaiveTime) -> ReservationRequest {
    ReservationRequest {
        provider_id,
        patient_id,
        date: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
        time,
        clinic_id: None,
        is_first_visit: true,
    }
}

fn nine() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).unwrap()
}

#[tokio::test]
async fn test_second_patient_gets_slot_taken() {
    let store = Arc::new(InMemoryStore::default());
    let service = ReservationService::new(&Stores::in_memory(store));
    let provider_id = Uuid::new_v4();

    let first = assert_ok!(
        service
            .reserve(request(provider_id, Uuid::new_v4(), nine()))
            .await
    );
    assert_eq!(first.status, AppointmentStatus::Pending);
    assert_eq!(first.time, nine());

    let second = service
        .reserve(request(provider_id, Uuid::new_v4(), nine()))
        .await;
    assert_matches!(second, Err(AppointmentError::SlotTaken { time, .. }) if time == nine());
}

#[tokio::test]
async fn test_fifty_concurrent_reservations_yield_one_appointment() {
    for attempts in [2usize, 10, 50] {
        let store = Arc::new(InMemoryStore::default());
        let service = Arc::new(ReservationService::new(&Stores::in_memory(store.clone())));
        let provider_id = Uuid::new_v4();

        let handles: Vec<_> = (0..attempts)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move {
                    service
                        .reserve(request(provider_id, Uuid::new_v4(), nine()))
                        .await
                })
            })
            .collect();

        let mut successes = 0;
        let mut taken = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(AppointmentError::SlotTaken { .. }) => taken += 1,
                Err(e) => panic!("unexpected failure: {e}"),
            }
        }

        assert_eq!(successes, 1, "attempts = {attempts}");
        assert_eq!(taken, attempts - 1);
        assert_eq!(store.appointments().await.len(), 1);
    }
}

#[tokio::test]
async fn test_different_slots_do_not_contend() {
    let store = Arc::new(InMemoryStore::default());
    let service = ReservationService::new(&Stores::in_memory(store));
    let provider_id = Uuid::new_v4();

    assert_ok!(service.reserve(request(provider_id, Uuid::new_v4(), nine())).await);
    assert_ok!(
        service
            .reserve(request(
                provider_id,
                Uuid::new_v4(),
                NaiveTime::from_hms_opt(9, 30, 0).unwrap()
            ))
            .await
    );
    assert_ok!(service.reserve(request(Uuid::new_v4(), Uuid::new_v4(), nine())).await);
}

#[tokio::test]
async fn test_intake_is_attached_only_by_owner() {
    let store = Arc::new(InMemoryStore::default());
    let service = ReservationService::new(&Stores::in_memory(store.clone()));
    let patient_id = Uuid::new_v4();
    let appointment = service
        .reserve(request(Uuid::new_v4(), patient_id, nine()))
        .await
        .unwrap();

    let intake = ConsultationIntake {
        appointment_id: appointment.id,
        patient_id,
        consultation_mode: ConsultationMode::Video,
        reason: Some("Fièvre".to_string()),
        symptoms: vec!["fièvre".to_string(), "toux".to_string()],
        notes: None,
        identity_confirmed: true,
    };
    assert_ok!(service.attach_intake(intake.clone()).await);
    assert_eq!(store.get_intake(appointment.id).await.unwrap(), Some(intake.clone()));

    let foreign = ConsultationIntake {
        patient_id: Uuid::new_v4(),
        ..intake
    };
    assert_err!(service.attach_intake(foreign).await);
}
