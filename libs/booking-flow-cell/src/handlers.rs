use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    CheckoutBody, CheckoutRequest, PaymentBody, SlotSelection, SlotsQuery, VoiceReplyBody,
    VoiceSessionBody,
};
use crate::services::{BookingOrchestrator, VoiceCaller, VoiceSessionService};

pub struct BookingCellState {
    pub orchestrator: Arc<BookingOrchestrator>,
    pub sessions: VoiceSessionService,
}

impl BookingCellState {
    pub fn new(orchestrator: Arc<BookingOrchestrator>) -> Self {
        Self {
            sessions: VoiceSessionService::new(orchestrator.clone()),
            orchestrator,
        }
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

async fn ensure_session_access(
    state: &BookingCellState,
    user: &User,
    session_id: Uuid,
) -> Result<(), AppError> {
    let owner = state.sessions.owner(session_id).await?;
    user.ensure_can_act_for_patient(owner)
}

#[axum::debug_handler]
pub async fn get_slots(
    State(state): State<Arc<BookingCellState>>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<Value>, AppError> {
    let slots = state
        .orchestrator
        .slots_for(query.provider_id, query.date, query.channel, today())
        .await?;

    Ok(Json(json!({
        "doctor_id": query.provider_id,
        "date": query.date,
        "channel": query.channel,
        "slots": slots
    })))
}

#[axum::debug_handler]
pub async fn checkout(
    State(state): State<Arc<BookingCellState>>,
    Extension(user): Extension<User>,
    Json(body): Json<CheckoutBody>,
) -> Result<Json<Value>, AppError> {
    let patient_id = match body.patient_id {
        Some(id) => id,
        None => user.subject_id()?,
    };
    user.ensure_can_act_for_patient(patient_id)?;

    let request = CheckoutRequest {
        patient_id,
        selection: SlotSelection {
            provider_id: body.doctor_id,
            clinic_id: body.clinic_id,
            date: body.date,
            time: body.time,
        },
        is_first_visit: body.is_first_visit,
        intake: body.intake,
        payment: body.payment.into_choice(user.email.clone()),
    };
    let outcome = state.orchestrator.checkout(request, today()).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": outcome.appointment,
        "transaction_ref": outcome.payment.transaction_ref,
        "redirect_url": outcome.redirect_url,
        "amount": outcome.amount
    })))
}

#[axum::debug_handler]
pub async fn retry_payment(
    State(state): State<Arc<BookingCellState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(body): Json<PaymentBody>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.orchestrator.appointment(appointment_id).await?;
    user.ensure_can_act_for_patient(appointment.patient_id)?;

    let initiation = state
        .orchestrator
        .initiate_deposit(&appointment, body.into_choice(user.email.clone()))
        .await?;

    Ok(Json(json!({
        "success": true,
        "transaction_ref": initiation.payment.transaction_ref,
        "redirect_url": initiation.redirect_url,
        "payment": initiation.payment
    })))
}

#[axum::debug_handler]
pub async fn start_voice_session(
    State(state): State<Arc<BookingCellState>>,
    Extension(user): Extension<User>,
    Json(body): Json<VoiceSessionBody>,
) -> Result<Json<Value>, AppError> {
    let caller = VoiceCaller {
        patient_id: user.subject_id()?,
        is_first_visit: body.is_first_visit,
        payment: body.payment.into_choice(user.email.clone()),
    };
    let turn = state.sessions.start(caller, today()).await;

    Ok(Json(json!(turn)))
}

#[axum::debug_handler]
pub async fn reply_voice_session(
    State(state): State<Arc<BookingCellState>>,
    Path(session_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(body): Json<VoiceReplyBody>,
) -> Result<Json<Value>, AppError> {
    ensure_session_access(&state, &user, session_id).await?;
    let turn = state
        .sessions
        .reply(session_id, body.transcript, today())
        .await?;

    Ok(Json(json!(turn)))
}

#[axum::debug_handler]
pub async fn poll_voice_payment(
    State(state): State<Arc<BookingCellState>>,
    Path(session_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    ensure_session_access(&state, &user, session_id).await?;
    let turn = state.sessions.poll_payment(session_id, today()).await?;

    Ok(Json(json!(turn)))
}

#[axum::debug_handler]
pub async fn abort_voice_session(
    State(state): State<Arc<BookingCellState>>,
    Path(session_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    ensure_session_access(&state, &user, session_id).await?;
    state.sessions.abort(session_id).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Voice session aborted"
    })))
}
