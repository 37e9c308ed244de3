use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::NaiveDate;
use serde_json::{json, Value};
use uuid::Uuid;

use doctor_cell::{AvailabilityCalendar, DirectoryService};
use shared_database::Stores;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_models::Appointment;

use crate::models::{AppointmentError, ReservationRequest, ReserveAppointmentRequest};
use crate::services::{AppointmentLifecycleService, ReservationService};

pub struct AppointmentCellState {
    pub reservations: ReservationService,
    pub lifecycle: AppointmentLifecycleService,
    pub calendar: AvailabilityCalendar,
    pub directory: DirectoryService,
}

impl AppointmentCellState {
    pub fn new(stores: &Stores) -> Self {
        Self {
            reservations: ReservationService::new(stores),
            lifecycle: AppointmentLifecycleService::new(stores),
            calendar: AvailabilityCalendar::new(stores),
            directory: DirectoryService::new(stores),
        }
    }
}

/// 409 carrying the provider's refreshed day so the client can offer another slot.
pub async fn slot_taken_error(
    calendar: &AvailabilityCalendar,
    provider_id: Uuid,
    date: NaiveDate,
) -> AppError {
    match calendar.get_slots(provider_id, date).await {
        Ok(slots) => AppError::SlotTaken {
            message: "This time slot was just booked. Please choose another one.".to_string(),
            available_slots: json!(slots),
        },
        Err(e) => e.into(),
    }
}

fn ensure_patient_or_staff(user: &User, appointment: &Appointment) -> Result<(), AppError> {
    user.ensure_can_act_for_patient(appointment.patient_id)
        .map_err(|_| AppointmentError::Unauthorized.into())
}

async fn ensure_provider_or_staff(
    state: &AppointmentCellState,
    user: &User,
    appointment: &Appointment,
) -> Result<(), AppError> {
    if user.is_staff() {
        return Ok(());
    }
    let subject = user.subject_id()?;
    if user.is_provider()
        && state
            .directory
            .is_provider_account(appointment.provider_id, subject)
            .await?
    {
        Ok(())
    } else {
        Err(AppointmentError::Unauthorized.into())
    }
}

#[axum::debug_handler]
pub async fn reserve_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Json(request): Json<ReserveAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let patient_id = match request.patient_id {
        Some(id) => id,
        None => user.subject_id()?,
    };
    user.ensure_can_act_for_patient(patient_id)?;

    let reservation = ReservationRequest {
        provider_id: request.doctor_id,
        patient_id,
        date: request.date,
        time: request.time,
        clinic_id: request.clinic_id,
        is_first_visit: request.is_first_visit,
    };

    let appointment = match state.reservations.reserve(reservation).await {
        Ok(appointment) => appointment,
        Err(AppointmentError::SlotTaken { date, .. }) => {
            return Err(slot_taken_error(&state.calendar, request.doctor_id, date).await);
        }
        Err(e) => return Err(e.into()),
    };

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.lifecycle.get_appointment(appointment_id).await?;
    if ensure_patient_or_staff(&user, &appointment).is_err() {
        ensure_provider_or_staff(&state, &user, &appointment).await?;
    }

    Ok(Json(json!({ "appointment": appointment })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.lifecycle.get_appointment(appointment_id).await?;
    if ensure_patient_or_staff(&user, &appointment).is_err() {
        ensure_provider_or_staff(&state, &user, &appointment).await?;
    }

    let cancelled = state.lifecycle.cancel(appointment_id).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": cancelled,
        "message": "Appointment cancelled successfully"
    })))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.lifecycle.get_appointment(appointment_id).await?;
    ensure_provider_or_staff(&state, &user, &appointment).await?;

    let completed = state.lifecycle.complete(appointment_id).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": completed
    })))
}

#[axum::debug_handler]
pub async fn mark_no_show(
    State(state): State<Arc<AppointmentCellState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.lifecycle.get_appointment(appointment_id).await?;
    ensure_provider_or_staff(&state, &user, &appointment).await?;

    let updated = state.lifecycle.mark_no_show(appointment_id).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": updated
    })))
}
