use thiserror::Error;
use uuid::Uuid;

use appointment_cell::AppointmentError;
use shared_database::StoreError;
use shared_models::error::AppError;
use shared_models::{AppointmentStatus, GatewayKind};

/// Failures talking to, or hearing from, one payment gateway.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("{0} is not configured")]
    NotConfigured(GatewayKind),

    #[error("Gateway unreachable: {0}")]
    Unreachable(String),

    #[error("Gateway rejected the request: {0}")]
    Rejected(String),

    #[error("Webhook signature mismatch")]
    InvalidSignature,

    #[error("Malformed webhook: {0}")]
    MalformedWebhook(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Unreachable(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("No payment with reference {0}")]
    UnknownReference(String),

    #[error("Appointment {0} not found")]
    AppointmentNotFound(Uuid),

    #[error("Appointment {id} is {status} and cannot take this payment")]
    AppointmentNotPayable { id: Uuid, status: AppointmentStatus },

    #[error("Payment amount must be positive")]
    InvalidAmount,

    #[error("Not allowed to pay for this appointment")]
    Unauthorized,

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Appointment(#[from] AppointmentError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::UnknownReference(_) | PaymentError::AppointmentNotFound(_) => {
                AppError::NotFound(err.to_string())
            }
            PaymentError::AppointmentNotPayable { .. } => AppError::Conflict(err.to_string()),
            PaymentError::InvalidAmount => AppError::ValidationError(err.to_string()),
            PaymentError::Unauthorized => AppError::Forbidden(err.to_string()),
            PaymentError::Gateway(GatewayError::NotConfigured(_)) => {
                AppError::BadRequest(err.to_string())
            }
            PaymentError::Gateway(GatewayError::InvalidSignature) => AppError::Auth(err.to_string()),
            PaymentError::Gateway(GatewayError::MalformedWebhook(_)) => {
                AppError::BadRequest(err.to_string())
            }
            PaymentError::Gateway(e) => AppError::ExternalService(e.to_string()),
            PaymentError::Appointment(e) => e.into(),
            PaymentError::Store(e) => AppError::Database(e.to_string()),
        }
    }
}
