use chrono::{NaiveDate, NaiveTime};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use appointment_cell::AppointmentError;
use booking_queue_cell::QueueError;
use doctor_cell::{AvailabilityError, SlotView};
use payment_cell::PaymentError;
use shared_models::error::AppError;

use crate::models::BookingChannel;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("{date} is outside the {channel} booking window ({first} to {last})")]
    OutsideHorizon {
        channel: BookingChannel,
        date: NaiveDate,
        first: NaiveDate,
        last: NaiveDate,
    },

    /// Lost the race for a slot. Carries the provider's refreshed day.
    #[error("Slot {date} {time} is already taken")]
    SlotTaken {
        date: NaiveDate,
        time: NaiveTime,
        available: Vec<SlotView>,
    },

    /// The reservation stands; only the checkout failed and can be retried.
    #[error("Payment could not be opened for appointment {appointment_id}: {source}")]
    PaymentNotOpened {
        appointment_id: Uuid,
        source: PaymentError,
    },

    #[error("Payment {0} was not settled in time")]
    PaymentTimeout(String),

    #[error("Voice session {0} not found")]
    SessionNotFound(Uuid),

    #[error("Voice session {id} is not waiting for {expected}")]
    SessionNotWaiting { id: Uuid, expected: &'static str },

    #[error("Not allowed to book for this patient")]
    Unauthorized,

    #[error(transparent)]
    Availability(#[from] AvailabilityError),

    #[error(transparent)]
    Appointment(#[from] AppointmentError),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl From<OrchestratorError> for AppError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::SlotTaken { available, .. } => AppError::SlotTaken {
                message: "This time slot was just booked. Please choose another one.".to_string(),
                available_slots: json!(available),
            },
            OrchestratorError::OutsideHorizon { .. } => AppError::ValidationError(err.to_string()),
            OrchestratorError::PaymentNotOpened { .. } | OrchestratorError::PaymentTimeout(_) => {
                AppError::ExternalService(err.to_string())
            }
            OrchestratorError::SessionNotFound(_) => AppError::NotFound(err.to_string()),
            OrchestratorError::SessionNotWaiting { .. } => AppError::Conflict(err.to_string()),
            OrchestratorError::Unauthorized => AppError::Forbidden(err.to_string()),
            OrchestratorError::Availability(e) => e.into(),
            OrchestratorError::Appointment(e) => e.into(),
            OrchestratorError::Payment(e) => e.into(),
            OrchestratorError::Queue(e) => e.into(),
        }
    }
}
