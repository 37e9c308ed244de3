use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Every status except `cancelled` occupies its slot.
    pub fn occupies_slot(self) -> bool {
        self != AppointmentStatus::Cancelled
    }

    /// Statuses that take part in a provider's daily queue.
    pub fn is_queued(self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }

    pub fn valid_transitions(self) -> &'static [AppointmentStatus] {
        use AppointmentStatus::*;
        match self {
            Pending => &[Confirmed, Cancelled],
            Confirmed => &[Completed, Cancelled, NoShow],
            Completed | Cancelled | NoShow => &[],
        }
    }

    pub fn can_transition_to(self, next: AppointmentStatus) -> bool {
        self.valid_transitions().contains(&next)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column names follow the `appointments` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    #[serde(rename = "doctor_id")]
    pub provider_id: Uuid,
    pub patient_id: Uuid,
    pub clinic_id: Option<Uuid>,
    #[serde(rename = "appointment_date")]
    pub date: NaiveDate,
    #[serde(rename = "appointment_time")]
    pub time: NaiveTime,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub is_first_visit: bool,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    pub fn slot(&self) -> SlotKey {
        SlotKey {
            provider_id: self.provider_id,
            date: self.date,
            time: self.time,
        }
    }
}

/// Identity of a bookable slot: one provider, one day, one start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAppointment {
    pub provider_id: Uuid,
    pub patient_id: Uuid,
    pub clinic_id: Option<Uuid>,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub is_first_visit: bool,
}

impl NewAppointment {
    pub fn slot(&self) -> SlotKey {
        SlotKey {
            provider_id: self.provider_id,
            date: self.date,
            time: self.time,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationMode {
    #[default]
    InPerson,
    Video,
}

/// Pre-consultation answers, stored alongside the appointment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsultationIntake {
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub consultation_mode: ConsultationMode,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub identity_confirmed: bool,
}
