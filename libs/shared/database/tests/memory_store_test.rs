use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use shared_database::{
    AppointmentStore, ChangeKind, InMemoryStore, PaymentStore, StoreError,
};
use shared_models::{
    Appointment, AppointmentStatus, GatewayKind, NewAppointment, NewPayment, PaymentStatus,
    PaymentType,
};

fn new_appointment(provider_id: Uuid, patient_id: Uuid, hour: u32) -> NewAppointment {
    NewAppointment {
        provider_id,
        patient_id,
        clinic_id: None,
        date: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
        time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
        is_first_visit: true,
    }
}

#[tokio::test]
async fn test_concurrent_inserts_on_one_slot_have_single_winner() {
    let store = Arc::new(InMemoryStore::default());
    let provider_id = Uuid::new_v4();

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .insert_if_slot_free(new_appointment(provider_id, Uuid::new_v4(), 9))
                    .await
            })
        })
        .collect();

    let mut won = 0;
    let mut lost = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => won += 1,
            Err(StoreError::SlotOccupied) => lost += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(won, 1);
    assert_eq!(lost, 49);
    assert_eq!(store.appointments().await.len(), 1);
}

#[tokio::test]
async fn test_cancelled_slot_can_be_rebooked() {
    let store = InMemoryStore::default();
    let provider_id = Uuid::new_v4();

    let first = store
        .insert_if_slot_free(new_appointment(provider_id, Uuid::new_v4(), 10))
        .await
        .unwrap();
    let cancelled = store
        .transition_status(
            first.id,
            &[AppointmentStatus::Pending],
            AppointmentStatus::Cancelled,
            None,
        )
        .await
        .unwrap();
    assert_matches!(cancelled, Some(a) if a.status == AppointmentStatus::Cancelled);

    let second = store
        .insert_if_slot_free(new_appointment(provider_id, Uuid::new_v4(), 10))
        .await;
    assert!(second.is_ok());
}

#[tokio::test]
async fn test_transition_is_compare_and_set() {
    let store = InMemoryStore::default();
    let appointment = store
        .insert_if_slot_free(new_appointment(Uuid::new_v4(), Uuid::new_v4(), 11))
        .await
        .unwrap();
    let at = Utc::now();

    let confirmed = store
        .transition_status(
            appointment.id,
            &[AppointmentStatus::Pending],
            AppointmentStatus::Confirmed,
            Some(at),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(confirmed.confirmed_at, Some(at));

    let again = store
        .transition_status(
            appointment.id,
            &[AppointmentStatus::Pending],
            AppointmentStatus::Confirmed,
            Some(at + Duration::minutes(5)),
        )
        .await
        .unwrap();
    assert!(again.is_none());

    let stored = store.get_appointment(appointment.id).await.unwrap().unwrap();
    assert_eq!(stored.confirmed_at, Some(at));
}

#[tokio::test]
async fn test_writes_are_published_on_change_feed() {
    let store = InMemoryStore::default();
    let mut changes = store.changes().subscribe();

    let appointment = store
        .insert_if_slot_free(new_appointment(Uuid::new_v4(), Uuid::new_v4(), 12))
        .await
        .unwrap();
    store
        .transition_status(
            appointment.id,
            &[AppointmentStatus::Pending],
            AppointmentStatus::Confirmed,
            None,
        )
        .await
        .unwrap();

    assert_eq!(changes.recv().await.unwrap().kind, ChangeKind::Inserted);
    assert_eq!(
        changes.recv().await.unwrap().kind,
        ChangeKind::StatusChanged(AppointmentStatus::Confirmed)
    );
}

#[tokio::test]
async fn test_settle_only_leaves_pending_once() {
    let store = InMemoryStore::default();
    let appointment_id = Uuid::new_v4();
    store
        .insert_payment(NewPayment {
            appointment_id,
            patient_id: Uuid::new_v4(),
            amount: 5000,
            payment_type: PaymentType::Deposit,
            provider: GatewayKind::Paystack,
            transaction_ref: "PAY-1-ABC".to_string(),
        })
        .await
        .unwrap();

    let first = store
        .settle("PAY-1-ABC", PaymentStatus::Success, Some(Utc::now()))
        .await
        .unwrap();
    let second = store
        .settle("PAY-1-ABC", PaymentStatus::Failed, None)
        .await
        .unwrap();

    assert_matches!(first, Some(p) if p.status == PaymentStatus::Success);
    assert!(second.is_none());
    assert!(store.has_live_deposit(appointment_id).await.unwrap());
    assert_matches!(
        store.settle("PAY-unknown", PaymentStatus::Success, None).await,
        Err(StoreError::NotFound(_))
    );
}

#[tokio::test]
async fn test_slot_stays_taken_while_another_seeded_appointment_holds_it() {
    let store = InMemoryStore::default();
    let provider_id = Uuid::new_v4();
    let slot = new_appointment(provider_id, Uuid::new_v4(), 9);
    let seeded: Vec<Appointment> = (0..2)
        .map(|_| Appointment {
            id: Uuid::new_v4(),
            provider_id,
            patient_id: Uuid::new_v4(),
            clinic_id: None,
            date: slot.date,
            time: slot.time,
            status: AppointmentStatus::Confirmed,
            is_first_visit: false,
            confirmed_at: Some(Utc::now()),
            created_at: Utc::now(),
        })
        .collect();
    for appointment in &seeded {
        store.seed_appointment(appointment.clone()).await;
    }

    store
        .transition_status(
            seeded[0].id,
            &[AppointmentStatus::Confirmed],
            AppointmentStatus::Cancelled,
            None,
        )
        .await
        .unwrap();
    assert_matches!(
        store.insert_if_slot_free(new_appointment(provider_id, Uuid::new_v4(), 9)).await,
        Err(StoreError::SlotOccupied)
    );

    store
        .transition_status(
            seeded[1].id,
            &[AppointmentStatus::Confirmed],
            AppointmentStatus::Cancelled,
            None,
        )
        .await
        .unwrap();
    assert_matches!(
        store.insert_if_slot_free(slot).await,
        Ok(a) if a.status == AppointmentStatus::Pending
    );
}
