use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use shared_models::{GatewayKind, Payment, PaymentStatus, PaymentType};

/// What a gateway says about a transaction, before it is applied locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportedStatus {
    Success,
    Failed,
    /// Customer has not finished paying yet. Never settles a payment.
    Pending,
}

impl ReportedStatus {
    pub fn terminal(self) -> Option<PaymentStatus> {
        match self {
            ReportedStatus::Success => Some(PaymentStatus::Success),
            ReportedStatus::Failed => Some(PaymentStatus::Failed),
            ReportedStatus::Pending => None,
        }
    }
}

/// A gateway callback reduced to the two facts reconciliation needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedWebhook {
    pub transaction_ref: String,
    pub status: ReportedStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
}

/// Everything a gateway needs to open a hosted checkout.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub transaction_ref: String,
    pub amount: i64,
    pub description: String,
    pub customer: Customer,
    pub return_url: String,
    pub notify_url: String,
    pub metadata: Value,
}

/// Where to send the customer, plus the gateway's own handle if it issues one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayCheckout {
    pub redirect_url: String,
    pub gateway_reference: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InitiatePayment {
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub amount: i64,
    pub payment_type: PaymentType,
    pub gateway: GatewayKind,
    pub customer: Customer,
    pub return_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentInitiation {
    pub payment: Payment,
    pub redirect_url: String,
}

/// Result of one reconciliation call. `applied` is true only for the call that
/// moved the payment out of `pending`.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    pub payment: Payment,
    pub applied: bool,
    pub appointment_confirmed: bool,
}

#[derive(Debug, Deserialize)]
pub struct InitiatePaymentRequest {
    pub appointment_id: Uuid,
    pub amount: i64,
    #[serde(default = "default_payment_type")]
    pub payment_type: PaymentType,
    pub provider: GatewayKind,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    pub return_url: Option<String>,
}

fn default_payment_type() -> PaymentType {
    PaymentType::Deposit
}

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub transaction_ref: String,
}
