use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use shared_models::{
    Appointment, AppointmentStatus, AvailabilityWindow, Clinic, ConsultationIntake,
    NewAppointment, NewPayment, Payment, PaymentStatus, Provider,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Slot is already occupied")]
    SlotOccupied,

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Read side of providers, clinics and working hours.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn get_provider(&self, provider_id: Uuid) -> StoreResult<Option<Provider>>;

    /// Active windows only, every weekday.
    async fn list_availability(&self, provider_id: Uuid) -> StoreResult<Vec<AvailabilityWindow>>;

    async fn list_clinics(&self) -> StoreResult<Vec<Clinic>>;

    async fn list_clinic_providers(&self, clinic_id: Uuid) -> StoreResult<Vec<Provider>>;

    /// User ids of the clinic's active secretaries.
    async fn list_clinic_staff(&self, clinic_id: Uuid) -> StoreResult<Vec<Uuid>>;
}

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Inserts a `pending` appointment unless a non-cancelled one already holds
    /// the same (provider, date, time). The check and the insert are one atomic step.
    async fn insert_if_slot_free(&self, new: NewAppointment) -> StoreResult<Appointment>;

    async fn get_appointment(&self, id: Uuid) -> StoreResult<Option<Appointment>>;

    /// Non-cancelled appointments of one provider on one day, ordered by time.
    async fn list_active_for_day(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> StoreResult<Vec<Appointment>>;

    /// Compare-and-set on status. Returns `None` when the current status is not
    /// in `allowed_from` (or the row is gone); nothing is written in that case.
    async fn transition_status(
        &self,
        id: Uuid,
        allowed_from: &[AppointmentStatus],
        to: AppointmentStatus,
        confirmed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<Option<Appointment>>;

    async fn list_pending_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<Appointment>>;

    /// Upsert keyed by appointment.
    async fn save_intake(&self, intake: ConsultationIntake) -> StoreResult<()>;

    async fn get_intake(&self, appointment_id: Uuid) -> StoreResult<Option<ConsultationIntake>>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert_payment(&self, new: NewPayment) -> StoreResult<Payment>;

    async fn find_by_reference(&self, transaction_ref: &str) -> StoreResult<Option<Payment>>;

    /// Moves a `pending` payment to a terminal status. Returns `None` when the
    /// payment was already terminal, so exactly one caller wins the transition.
    async fn settle(
        &self,
        transaction_ref: &str,
        status: PaymentStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> StoreResult<Option<Payment>>;

    async fn set_gateway_reference(
        &self,
        transaction_ref: &str,
        gateway_reference: &str,
    ) -> StoreResult<()>;

    /// True while a deposit for the appointment is still open at the gateway
    /// or has already been paid.
    async fn has_live_deposit(&self, appointment_id: Uuid) -> StoreResult<bool>;
}
