use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_database::StoreError;
use shared_models::error::AppError;

/// Width of one bookable consultation slot.
pub const SLOT_MINUTES: i64 = 30;

/// One candidate start time on a provider's day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotView {
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    pub available: bool,
}

#[derive(Debug, Deserialize)]
pub struct SlotQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Error)]
pub enum AvailabilityError {
    #[error("Doctor {0} not found")]
    ProviderNotFound(Uuid),

    #[error("Clinic {0} has no active doctors")]
    NoProviderInClinic(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<AvailabilityError> for AppError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::ProviderNotFound(_) | AvailabilityError::NoProviderInClinic(_) => {
                AppError::NotFound(err.to_string())
            }
            AvailabilityError::Store(e) => AppError::Database(e.to_string()),
        }
    }
}

/// Slot times travel as `HH:MM`, the way the booking screens display them.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(serde::de::Error::custom)
    }
}
