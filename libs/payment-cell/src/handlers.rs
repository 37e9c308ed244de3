use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    Extension, Json,
};
use serde_json::{json, Value};
use tracing::info;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_models::GatewayKind;

use crate::models::{Customer, InitiatePayment, InitiatePaymentRequest, VerifyPaymentRequest};
use crate::services::ReconciliationService;

pub struct PaymentCellState {
    pub reconciliation: Arc<ReconciliationService>,
}

#[axum::debug_handler]
pub async fn initiate_payment(
    State(state): State<Arc<PaymentCellState>>,
    Extension(user): Extension<User>,
    Json(request): Json<InitiatePaymentRequest>,
) -> Result<Json<Value>, AppError> {
    let patient_id = user.subject_id()?;

    let initiation = state
        .reconciliation
        .initiate(InitiatePayment {
            appointment_id: request.appointment_id,
            patient_id,
            amount: request.amount,
            payment_type: request.payment_type,
            gateway: request.provider,
            customer: Customer {
                name: request.customer_name,
                phone: request.customer_phone,
                email: request.customer_email.or(user.email),
            },
            return_url: request.return_url,
        })
        .await?;

    Ok(Json(json!({
        "success": true,
        "transaction_ref": initiation.payment.transaction_ref,
        "redirect_url": initiation.redirect_url,
        "payment": initiation.payment
    })))
}

#[axum::debug_handler]
pub async fn verify_payment(
    State(state): State<Arc<PaymentCellState>>,
    Extension(user): Extension<User>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<Json<Value>, AppError> {
    let payment = state.reconciliation.get_payment(&request.transaction_ref).await?;
    user.ensure_can_act_for_patient(payment.patient_id)?;

    let outcome = state.reconciliation.verify(&request.transaction_ref).await?;

    Ok(Json(json!({
        "success": true,
        "status": outcome.payment.status,
        "appointment_confirmed": outcome.appointment_confirmed,
        "payment": outcome.payment
    })))
}

#[axum::debug_handler]
pub async fn get_payment(
    State(state): State<Arc<PaymentCellState>>,
    Path(transaction_ref): Path<String>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let payment = state.reconciliation.get_payment(&transaction_ref).await?;
    user.ensure_can_act_for_patient(payment.patient_id)?;

    Ok(Json(json!({ "payment": payment })))
}

/// Gateway callbacks. Unauthenticated: Paystack is checked by signature, the
/// others by asking the gateway or matching our own reference.
#[axum::debug_handler]
pub async fn gateway_webhook(
    State(state): State<Arc<PaymentCellState>>,
    Path(gateway): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let kind: GatewayKind = gateway
        .parse()
        .map_err(AppError::NotFound)?;
    info!("{} webhook received ({} bytes)", kind, body.len());

    let outcome = state
        .reconciliation
        .handle_webhook(kind, &headers, &body)
        .await?;

    Ok(Json(json!({
        "received": true,
        "applied": outcome.applied,
        "status": outcome.payment.status
    })))
}
