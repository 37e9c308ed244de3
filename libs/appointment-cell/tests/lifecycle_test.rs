use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use appointment_cell::{
    AppointmentError, AppointmentLifecycleService, PendingReservationSweeper, ReservationRequest,
    ReservationService,
};
use shared_database::{AppointmentStore, InMemoryStore, PaymentStore, Stores};
use shared_models::{
    Appointment, AppointmentStatus, GatewayKind, NewPayment, PaymentStatus, PaymentType,
};

async fn reserved(stores: &Stores, hour: u32) -> Appointment {
    ReservationService::new(stores)
        .reserve(ReservationRequest {
            provider_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
            time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            clinic_id: None,
            is_first_visit: false,
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn test_pending_cannot_be_completed() {
    let stores = Stores::in_memory(Arc::new(InMemoryStore::default()));
    let lifecycle = AppointmentLifecycleService::new(&stores);
    let appointment = reserved(&stores, 8).await;

    assert_matches!(
        lifecycle.complete(appointment.id).await,
        Err(AppointmentError::InvalidStatusTransition {
            from: AppointmentStatus::Pending,
            to: AppointmentStatus::Completed
        })
    );
}

#[tokio::test]
async fn test_confirmed_appointment_runs_to_completion() {
    let stores = Stores::in_memory(Arc::new(InMemoryStore::default()));
    let lifecycle = AppointmentLifecycleService::new(&stores);
    let appointment = reserved(&stores, 9).await;
    let at = Utc::now();

    let confirmed = lifecycle.confirm_pending(appointment.id, at).await.unwrap();
    assert_matches!(confirmed, Some(a) if a.confirmed_at == Some(at));
    assert!(lifecycle
        .confirm_pending(appointment.id, at + Duration::seconds(5))
        .await
        .unwrap()
        .is_none());

    let completed = lifecycle.complete(appointment.id).await.unwrap();
    assert_eq!(completed.status, AppointmentStatus::Completed);
    assert_eq!(completed.confirmed_at, Some(at));

    assert_matches!(
        lifecycle.cancel(appointment.id).await,
        Err(AppointmentError::InvalidStatusTransition { .. })
    );
}

#[tokio::test]
async fn test_no_show_only_from_confirmed() {
    let stores = Stores::in_memory(Arc::new(InMemoryStore::default()));
    let lifecycle = AppointmentLifecycleService::new(&stores);
    let appointment = reserved(&stores, 10).await;

    assert!(lifecycle.mark_no_show(appointment.id).await.is_err());
    lifecycle
        .confirm_pending(appointment.id, Utc::now())
        .await
        .unwrap();
    let updated = lifecycle.mark_no_show(appointment.id).await.unwrap();
    assert_eq!(updated.status, AppointmentStatus::NoShow);
}

#[tokio::test]
async fn test_unknown_appointment_is_not_found() {
    let stores = Stores::in_memory(Arc::new(InMemoryStore::default()));
    let lifecycle = AppointmentLifecycleService::new(&stores);
    assert_matches!(
        lifecycle.cancel(Uuid::new_v4()).await,
        Err(AppointmentError::NotFound(_))
    );
}

#[tokio::test]
async fn test_sweeper_releases_only_unpaid_stale_reservations() {
    let store = Arc::new(InMemoryStore::default());
    let stores = Stores::in_memory(store.clone());
    let unpaid = reserved(&stores, 8).await;
    let paid = reserved(&stores, 9).await;

    store
        .insert_payment(NewPayment {
            appointment_id: paid.id,
            patient_id: paid.patient_id,
            amount: 5000,
            payment_type: PaymentType::Deposit,
            provider: GatewayKind::CinetPay,
            transaction_ref: "CINET-1-AAAAAAAAA".to_string(),
        })
        .await
        .unwrap();
    store
        .settle("CINET-1-AAAAAAAAA", PaymentStatus::Success, Some(Utc::now()))
        .await
        .unwrap();

    let sweeper = PendingReservationSweeper::new(&stores, 30);

    // Nothing is old enough yet.
    assert_eq!(sweeper.sweep_once(Utc::now()).await.unwrap(), 0);

    let later = Utc::now() + Duration::minutes(31);
    assert_eq!(sweeper.sweep_once(later).await.unwrap(), 1);

    let unpaid = store.get_appointment(unpaid.id).await.unwrap().unwrap();
    let paid = store.get_appointment(paid.id).await.unwrap().unwrap();
    assert_eq!(unpaid.status, AppointmentStatus::Cancelled);
    assert_eq!(paid.status, AppointmentStatus::Pending);
}

#[tokio::test]
async fn test_sweeper_keeps_reservation_while_deposit_is_open() {
    let store = Arc::new(InMemoryStore::default());
    let stores = Stores::in_memory(store.clone());
    let awaiting_gateway = reserved(&stores, 10).await;
    let refused = reserved(&stores, 11).await;

    for (appointment, transaction_ref) in [
        (&awaiting_gateway, "PAY-1-OPEN00000"),
        (&refused, "PAY-2-FAILED000"),
    ] {
        store
            .insert_payment(NewPayment {
                appointment_id: appointment.id,
                patient_id: appointment.patient_id,
                amount: 5000,
                payment_type: PaymentType::Deposit,
                provider: GatewayKind::Paystack,
                transaction_ref: transaction_ref.to_string(),
            })
            .await
            .unwrap();
    }
    store
        .settle("PAY-2-FAILED000", PaymentStatus::Failed, None)
        .await
        .unwrap();

    let sweeper = PendingReservationSweeper::new(&stores, 30);
    let later = Utc::now() + Duration::minutes(31);
    assert_eq!(sweeper.sweep_once(later).await.unwrap(), 1);

    let awaiting_gateway = store.get_appointment(awaiting_gateway.id).await.unwrap().unwrap();
    let refused = store.get_appointment(refused.id).await.unwrap().unwrap();
    assert_eq!(awaiting_gateway.status, AppointmentStatus::Pending);
    assert_eq!(refused.status, AppointmentStatus::Cancelled);
}
