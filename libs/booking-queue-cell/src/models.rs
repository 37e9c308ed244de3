use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_database::AppointmentChange;
use shared_models::Appointment;

/// Average consultation length used for wait estimates.
pub const AVG_SERVICE_MINUTES: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub position: u32,
    pub total_in_queue: u32,
    pub estimated_wait_minutes: u32,
}

impl QueueSnapshot {
    /// Position of `target` among one provider's waiting appointments of the day.
    ///
    /// Every appointment at or before `target` counts as ahead, the target itself
    /// included, so the first appointment of the day sits at position 1.
    pub fn compute(day: &[Appointment], target: NaiveTime) -> Self {
        let ahead = day.iter().filter(|a| a.time <= target).count() as u32;
        let position = ahead.max(1);
        Self {
            position,
            total_in_queue: day.len() as u32,
            estimated_wait_minutes: (position - 1) * AVG_SERVICE_MINUTES,
        }
    }
}

/// One (provider, date) queue, the unit the watcher recomputes and broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct QueueKey {
    pub provider_id: Uuid,
    pub date: NaiveDate,
}

impl From<&Appointment> for QueueKey {
    fn from(appointment: &Appointment) -> Self {
        Self {
            provider_id: appointment.provider_id,
            date: appointment.date,
        }
    }
}

impl From<&AppointmentChange> for QueueKey {
    fn from(change: &AppointmentChange) -> Self {
        Self {
            provider_id: change.provider_id,
            date: change.date,
        }
    }
}

/// Fresh snapshots for every appointment still waiting in one queue.
#[derive(Debug, Clone)]
pub struct DayQueue {
    pub key: QueueKey,
    pub snapshots: HashMap<Uuid, QueueSnapshot>,
}

/// What a single appointment's watcher sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueEvent {
    Position(QueueSnapshot),
    /// Cancelled, completed or no-show: the appointment no longer waits.
    Left,
}
