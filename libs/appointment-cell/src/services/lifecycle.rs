use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_database::{AppointmentStore, Stores};
use shared_models::{Appointment, AppointmentStatus};

use crate::models::AppointmentError;

/// Status changes after reservation. Every write is a compare-and-set on the
/// status read just before it, so a concurrent writer makes this call fail
/// instead of being overwritten.
pub struct AppointmentLifecycleService {
    appointments: Arc<dyn AppointmentStore>,
}

impl AppointmentLifecycleService {
    pub fn new(stores: &Stores) -> Self {
        Self {
            appointments: stores.appointments.clone(),
        }
    }

    pub fn validate_status_transition(
        &self,
        current: AppointmentStatus,
        next: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        if !current.can_transition_to(next) {
            warn!("Invalid status transition attempted: {} -> {}", current, next);
            return Err(AppointmentError::InvalidStatusTransition {
                from: current,
                to: next,
            });
        }
        Ok(())
    }

    pub async fn get_appointment(&self, id: Uuid) -> Result<Appointment, AppointmentError> {
        self.appointments
            .get_appointment(id)
            .await?
            .ok_or(AppointmentError::NotFound(id))
    }

    pub async fn cancel(&self, id: Uuid) -> Result<Appointment, AppointmentError> {
        self.transition(id, AppointmentStatus::Cancelled).await
    }

    pub async fn complete(&self, id: Uuid) -> Result<Appointment, AppointmentError> {
        self.transition(id, AppointmentStatus::Completed).await
    }

    pub async fn mark_no_show(&self, id: Uuid) -> Result<Appointment, AppointmentError> {
        self.transition(id, AppointmentStatus::NoShow).await
    }

    /// `pending -> confirmed` with `confirmed_at`. `None` when the appointment
    /// was not pending any more; the caller decides whether that matters.
    pub async fn confirm_pending(
        &self,
        id: Uuid,
        confirmed_at: DateTime<Utc>,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let confirmed = self
            .appointments
            .transition_status(
                id,
                &[AppointmentStatus::Pending],
                AppointmentStatus::Confirmed,
                Some(confirmed_at),
            )
            .await?;
        if let Some(appointment) = &confirmed {
            info!("Appointment {} confirmed at {}", appointment.id, confirmed_at);
        }
        Ok(confirmed)
    }

    async fn transition(
        &self,
        id: Uuid,
        next: AppointmentStatus,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.get_appointment(id).await?;
        self.validate_status_transition(current.status, next)?;

        let updated = self
            .appointments
            .transition_status(id, &[current.status], next, None)
            .await?;

        match updated {
            Some(appointment) => {
                info!("Appointment {}: {} -> {}", id, current.status, next);
                Ok(appointment)
            }
            None => {
                // Someone else moved it between the read and the write.
                let latest = self.get_appointment(id).await?;
                debug!("Appointment {} changed concurrently to {}", id, latest.status);
                Err(AppointmentError::InvalidStatusTransition {
                    from: latest.status,
                    to: next,
                })
            }
        }
    }
}
