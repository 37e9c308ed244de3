use std::fmt;

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use booking_queue_cell::QueueSnapshot;
use doctor_cell::models::hhmm;
use payment_cell::Customer;
use shared_models::{Appointment, ConsultationMode, GatewayKind, Payment, Provider};

/// Price used when a provider has not published one, in FCFA.
pub const DEFAULT_CONSULTATION_PRICE: i64 = 100;

/// How many free slots the voice dialogue reads out.
pub const VOICE_OFFER_LIMIT: usize = 5;

/// How the patient is booking. Each channel has its own booking horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingChannel {
    #[default]
    Manual,
    Voice,
}

impl BookingChannel {
    /// First and last bookable day, counted from today. Same-day booking is never offered.
    pub fn horizon_days(self) -> (i64, i64) {
        match self {
            BookingChannel::Manual => (1, 60),
            BookingChannel::Voice => (1, 14),
        }
    }

    pub fn window(self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let (first, last) = self.horizon_days();
        (today + Duration::days(first), today + Duration::days(last))
    }

    pub fn allows(self, today: NaiveDate, date: NaiveDate) -> bool {
        let (first, last) = self.window(today);
        first <= date && date <= last
    }
}

impl fmt::Display for BookingChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingChannel::Manual => f.write_str("manual"),
            BookingChannel::Voice => f.write_str("voice"),
        }
    }
}

/// Deposit that gates confirmation: the provider's consultation price.
pub fn deposit_amount(provider: &Provider) -> i64 {
    provider
        .consultation_price
        .filter(|price| *price > 0)
        .unwrap_or(DEFAULT_CONSULTATION_PRICE)
}

/// A free slot offered to the patient, possibly on any day of the horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotOffer {
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
}

const WEEKDAYS: [&str; 7] = [
    "lundi", "mardi", "mercredi", "jeudi", "vendredi", "samedi", "dimanche",
];
const MONTHS: [&str; 12] = [
    "janvier", "février", "mars", "avril", "mai", "juin", "juillet", "août", "septembre",
    "octobre", "novembre", "décembre",
];

impl SlotOffer {
    pub fn weekday_name(&self) -> &'static str {
        WEEKDAYS[self.date.weekday().num_days_from_monday() as usize]
    }

    /// Spoken form, e.g. `lundi 10 juin à 9 heures 30`.
    pub fn label(&self) -> String {
        let month = MONTHS[self.date.month0() as usize];
        let hour = match self.time.minute() {
            0 => format!("{} heures", self.time.hour()),
            minute => format!("{} heures {}", self.time.hour(), minute),
        };
        format!("{} {} {} à {}", self.weekday_name(), self.date.day(), month, hour)
    }
}

/// One concrete slot chosen by the patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotSelection {
    pub provider_id: Uuid,
    pub clinic_id: Option<Uuid>,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

/// Optional pre-consultation answers collected before checkout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntakeAnswers {
    #[serde(default)]
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

#[derive(Debug, Clone)]
pub struct PaymentChoice {
    pub gateway: GatewayKind,
    pub customer: Customer,
    pub return_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub patient_id: Uuid,
    pub selection: SlotSelection,
    pub is_first_visit: bool,
    pub intake: Option<IntakeAnswers>,
    pub payment: PaymentChoice,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutOutcome {
    pub appointment: Appointment,
    pub payment: Payment,
    pub redirect_url: String,
    pub amount: i64,
}

/// Final word on a checkout once the gateway has settled it.
#[derive(Debug, Clone, Serialize)]
pub struct Confirmation {
    pub payment: Payment,
    pub queue: Option<QueueSnapshot>,
}

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    pub provider_id: Uuid,
    pub date: NaiveDate,
    #[serde(default)]
    pub channel: BookingChannel,
}

#[derive(Debug, Deserialize)]
pub struct PaymentBody {
    pub provider: GatewayKind,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    pub return_url: Option<String>,
}

impl PaymentBody {
    pub fn into_choice(self, fallback_email: Option<String>) -> PaymentChoice {
        PaymentChoice {
            gateway: self.provider,
            customer: Customer {
                name: self.customer_name,
                phone: self.customer_phone,
                email: self.customer_email.or(fallback_email),
            },
            return_url: self.return_url,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CheckoutBody {
    pub doctor_id: Uuid,
    pub clinic_id: Option<Uuid>,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    /// Staff booking on behalf of a patient.
    pub patient_id: Option<Uuid>,
    #[serde(default)]
    pub is_first_visit: bool,
    pub intake: Option<IntakeAnswers>,
    #[serde(flatten)]
    pub payment: PaymentBody,
}

#[derive(Debug, Deserialize)]
pub struct VoiceSessionBody {
    #[serde(default)]
    pub is_first_visit: bool,
    #[serde(flatten)]
    pub payment: PaymentBody,
}

#[derive(Debug, Deserialize)]
pub struct VoiceReplyBody {
    /// Absent or blank when nothing was heard.
    pub transcript: Option<String>,
}
