use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

use shared_models::{Appointment, AppointmentStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "status")]
pub enum ChangeKind {
    Inserted,
    StatusChanged(AppointmentStatus),
}

/// A committed write to the appointments table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppointmentChange {
    pub appointment_id: Uuid,
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub kind: ChangeKind,
}

impl AppointmentChange {
    pub fn inserted(appointment: &Appointment) -> Self {
        Self {
            appointment_id: appointment.id,
            provider_id: appointment.provider_id,
            date: appointment.date,
            kind: ChangeKind::Inserted,
        }
    }

    pub fn status_changed(appointment: &Appointment) -> Self {
        Self {
            appointment_id: appointment.id,
            provider_id: appointment.provider_id,
            date: appointment.date,
            kind: ChangeKind::StatusChanged(appointment.status),
        }
    }
}

#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<AppointmentChange>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, change: AppointmentChange) {
        // No subscribers is normal when nobody watches a queue.
        if self.sender.send(change).is_err() {
            trace!("Appointment change dropped: no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppointmentChange> {
        self.sender.subscribe()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(1024)
    }
}
