use thiserror::Error;
use uuid::Uuid;

use shared_database::StoreError;
use shared_models::error::AppError;
use shared_models::AppointmentStatus;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Appointment {0} not found")]
    AppointmentNotFound(Uuid),

    #[error("Appointment {id} is {status} and no longer waiting")]
    NotQueued { id: Uuid, status: AppointmentStatus },

    #[error("Not allowed to view this queue")]
    Unauthorized,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::AppointmentNotFound(_) => AppError::NotFound(err.to_string()),
            QueueError::NotQueued { .. } => AppError::Conflict(err.to_string()),
            QueueError::Unauthorized => AppError::Forbidden(err.to_string()),
            QueueError::Store(e) => AppError::Database(e.to_string()),
        }
    }
}
