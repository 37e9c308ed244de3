use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use shared_database::StoreError;
use shared_models::error::AppError;
use shared_models::AppointmentStatus;

#[derive(Debug, Clone)]
pub struct ReservationRequest {
    pub provider_id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub clinic_id: Option<Uuid>,
    pub is_first_visit: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReserveAppointmentRequest {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    #[serde(with = "doctor_cell::models::hhmm")]
    pub time: NaiveTime,
    pub clinic_id: Option<Uuid>,
    #[serde(default)]
    pub is_first_visit: bool,
    /// Staff booking on behalf of a patient; patients book for themselves.
    pub patient_id: Option<Uuid>,
}

#[derive(Debug, Error)]
pub enum AppointmentError {
    #[error("Appointment {0} not found")]
    NotFound(Uuid),

    #[error("Slot {date} {time} is already taken")]
    SlotTaken { date: NaiveDate, time: NaiveTime },

    #[error("Cannot move appointment from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Not authorized to change this appointment")]
    Unauthorized,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound(_) => AppError::NotFound(err.to_string()),
            AppointmentError::SlotTaken { .. } => AppError::Conflict(err.to_string()),
            AppointmentError::InvalidStatusTransition { .. } => {
                AppError::BadRequest(err.to_string())
            }
            AppointmentError::Unauthorized => AppError::Forbidden(err.to_string()),
            AppointmentError::Store(e) => AppError::Database(e.to_string()),
        }
    }
}
