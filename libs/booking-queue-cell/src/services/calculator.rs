use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;
use uuid::Uuid;

use shared_database::{AppointmentStore, Stores};
use shared_models::Appointment;

use crate::error::QueueError;
use crate::models::{DayQueue, QueueKey, QueueSnapshot};

/// Derives queue positions from the live appointment set. Nothing is cached:
/// every call re-reads the provider's day.
pub struct QueuePositionCalculator {
    appointments: Arc<dyn AppointmentStore>,
}

impl QueuePositionCalculator {
    pub fn new(stores: &Stores) -> Self {
        Self {
            appointments: stores.appointments.clone(),
        }
    }

    pub async fn appointment(&self, appointment_id: Uuid) -> Result<Appointment, QueueError> {
        self.appointments
            .get_appointment(appointment_id)
            .await?
            .ok_or(QueueError::AppointmentNotFound(appointment_id))
    }

    pub async fn position(&self, appointment_id: Uuid) -> Result<QueueSnapshot, QueueError> {
        let target = self.appointment(appointment_id).await?;
        self.position_of(&target).await
    }

    pub async fn position_of(&self, target: &Appointment) -> Result<QueueSnapshot, QueueError> {
        if !target.status.is_queued() {
            return Err(QueueError::NotQueued {
                id: target.id,
                status: target.status,
            });
        }

        let day = self.waiting(target.provider_id, target.date).await?;
        let snapshot = QueueSnapshot::compute(&day, target.time);

        debug!(
            "Queue position for appointment {}: {}/{}",
            target.id, snapshot.position, snapshot.total_in_queue
        );
        Ok(snapshot)
    }

    /// Snapshots for every waiting appointment of one queue from a single read.
    pub async fn day_queue(&self, key: QueueKey) -> Result<DayQueue, QueueError> {
        let day = self.waiting(key.provider_id, key.date).await?;

        let snapshots: HashMap<Uuid, QueueSnapshot> = day
            .iter()
            .map(|a| (a.id, QueueSnapshot::compute(&day, a.time)))
            .collect();

        Ok(DayQueue { key, snapshots })
    }

    /// Pending and confirmed appointments only; finished visits leave the queue.
    async fn waiting(&self, provider_id: Uuid, date: NaiveDate) -> Result<Vec<Appointment>, QueueError> {
        let mut day = self
            .appointments
            .list_active_for_day(provider_id, date)
            .await?;
        day.retain(|a| a.status.is_queued());
        Ok(day)
    }
}
