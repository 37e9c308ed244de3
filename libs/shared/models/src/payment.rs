use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn is_terminal(self) -> bool {
        self != PaymentStatus::Pending
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    Deposit,
    Balance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    CinetPay,
    Paystack,
    MoneyFusion,
}

impl GatewayKind {
    pub const ALL: [GatewayKind; 3] = [
        GatewayKind::CinetPay,
        GatewayKind::Paystack,
        GatewayKind::MoneyFusion,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            GatewayKind::CinetPay => "cinetpay",
            GatewayKind::Paystack => "paystack",
            GatewayKind::MoneyFusion => "moneyfusion",
        }
    }

    /// Prefix of the transaction references this system issues for the gateway.
    pub fn reference_prefix(self) -> &'static str {
        match self {
            GatewayKind::CinetPay => "CINET",
            GatewayKind::Paystack => "PAY",
            GatewayKind::MoneyFusion => "MF",
        }
    }
}

impl fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GatewayKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cinetpay" => Ok(GatewayKind::CinetPay),
            "paystack" => Ok(GatewayKind::Paystack),
            "moneyfusion" => Ok(GatewayKind::MoneyFusion),
            other => Err(format!("Unknown payment gateway: {}", other)),
        }
    }
}

/// Column names follow the `payments` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub amount: i64,
    pub payment_type: PaymentType,
    pub status: PaymentStatus,
    pub provider: GatewayKind,
    pub transaction_ref: String,
    pub gateway_reference: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPayment {
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub amount: i64,
    pub payment_type: PaymentType,
    pub provider: GatewayKind,
    pub transaction_ref: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_names_round_trip_through_path_segments() {
        for kind in GatewayKind::ALL {
            assert_eq!(kind.as_str().parse::<GatewayKind>(), Ok(kind));
            assert_eq!(
                serde_json::to_value(kind).unwrap(),
                serde_json::Value::String(kind.to_string())
            );
        }
        assert!("stripe".parse::<GatewayKind>().is_err());
    }
}
