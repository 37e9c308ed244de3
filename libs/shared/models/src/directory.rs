use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: Uuid,
    /// Auth user behind the provider record, when it differs from `id`.
    #[serde(default)]
    pub profile_id: Option<Uuid>,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub specialty: Option<String>,
    /// Price in the smallest currency unit.
    #[serde(default)]
    pub consultation_price: Option<i64>,
}

impl Provider {
    pub fn display_name(&self) -> String {
        format!("Dr. {} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Recipient id for in-app notifications.
    pub fn user_id(&self) -> Uuid {
        self.profile_id.unwrap_or(self.id)
    }

    pub fn is_general_practitioner(&self) -> bool {
        self.specialty.as_deref().is_some_and(|specialty| {
            let lower = specialty.to_lowercase();
            lower.contains("général") || lower.contains("general") || lower.contains("generaliste")
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clinic {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

/// A recurring weekly working window. `day_of_week` counts from Sunday = 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub id: Uuid,
    #[serde(rename = "doctor_id")]
    pub provider_id: Uuid,
    pub day_of_week: u8,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl AvailabilityWindow {
    pub fn applies_to(&self, date: NaiveDate) -> bool {
        self.is_active && u32::from(self.day_of_week) == date.weekday().num_days_from_sunday()
    }
}
