use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
    Extension,
};
use futures::stream::{Stream, StreamExt};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use doctor_cell::DirectoryService;
use shared_database::Stores;
use shared_models::{auth::User, error::AppError, Appointment};

use crate::error::QueueError;
use crate::models::{QueueEvent, QueueKey};
use crate::services::{appointment_updates, QueueWatchService};

pub struct QueueCellState {
    pub watcher: QueueWatchService,
    pub directory: DirectoryService,
}

impl QueueCellState {
    pub fn new(stores: &Stores, watcher: QueueWatchService) -> Self {
        Self {
            watcher,
            directory: DirectoryService::new(stores),
        }
    }
}

/// The patient, clinic staff, or the appointment's own doctor.
async fn ensure_can_view(
    state: &QueueCellState,
    user: &User,
    appointment: &Appointment,
) -> Result<(), AppError> {
    if user.ensure_can_act_for_patient(appointment.patient_id).is_ok() {
        return Ok(());
    }
    let subject = user.subject_id()?;
    if user.is_provider()
        && state
            .directory
            .is_provider_account(appointment.provider_id, subject)
            .await?
    {
        return Ok(());
    }
    Err(QueueError::Unauthorized.into())
}

#[axum::debug_handler]
pub async fn get_queue_position(
    State(state): State<Arc<QueueCellState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let calculator = state.watcher.calculator();
    let appointment = calculator.appointment(appointment_id).await?;
    ensure_can_view(&state, &user, &appointment).await?;

    let snapshot = calculator.position_of(&appointment).await?;

    Ok(Json(json!({
        "appointment_id": appointment_id,
        "doctor_id": appointment.provider_id,
        "date": appointment.date,
        "position": snapshot.position,
        "total_in_queue": snapshot.total_in_queue,
        "estimated_wait_minutes": snapshot.estimated_wait_minutes
    })))
}

pub async fn stream_queue_position(
    State(state): State<Arc<QueueCellState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let calculator = state.watcher.calculator();
    let appointment = calculator.appointment(appointment_id).await?;
    ensure_can_view(&state, &user, &appointment).await?;

    // Subscribe first so no change between the initial read and the stream is lost.
    let receiver = state.watcher.subscribe(QueueKey::from(&appointment)).await;
    let initial = calculator.position_of(&appointment).await?;
    debug!("Streaming queue position for appointment {}", appointment_id);

    let events = appointment_updates(appointment_id, initial, receiver).map(move |event| match event {
        QueueEvent::Position(snapshot) => Event::default().event("position").json_data(snapshot),
        QueueEvent::Left => Ok(Event::default()
            .event("left")
            .data(appointment_id.to_string())),
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
