use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_database::Stores;
use shared_models::error::AppError;

use crate::models::SlotQuery;
use crate::services::{AvailabilityCalendar, DirectoryService};

pub struct DoctorCellState {
    pub calendar: AvailabilityCalendar,
    pub directory: DirectoryService,
}

impl DoctorCellState {
    pub fn new(stores: &Stores) -> Self {
        Self {
            calendar: AvailabilityCalendar::new(stores),
            directory: DirectoryService::new(stores),
        }
    }
}

#[axum::debug_handler]
pub async fn list_clinics(
    State(state): State<Arc<DoctorCellState>>,
) -> Result<Json<Value>, AppError> {
    let clinics = state.directory.list_clinics().await?;

    Ok(Json(json!({
        "clinics": clinics,
        "total": clinics.len()
    })))
}

#[axum::debug_handler]
pub async fn list_clinic_providers(
    State(state): State<Arc<DoctorCellState>>,
    Path(clinic_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let providers = state.directory.clinic_providers(clinic_id).await?;

    let doctors: Vec<Value> = providers
        .iter()
        .map(|p| {
            json!({
                "id": p.id,
                "name": p.display_name(),
                "specialty": p.specialty,
                "consultation_price": p.consultation_price,
            })
        })
        .collect();

    Ok(Json(json!({
        "clinic_id": clinic_id,
        "doctors": doctors
    })))
}

#[axum::debug_handler]
pub async fn get_slots(
    State(state): State<Arc<DoctorCellState>>,
    Path(provider_id): Path<Uuid>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Value>, AppError> {
    state.directory.get_provider(provider_id).await?;
    let slots = state.calendar.get_slots(provider_id, query.date).await?;
    let available = slots.iter().filter(|s| s.available).count();

    Ok(Json(json!({
        "doctor_id": provider_id,
        "date": query.date,
        "slots": slots,
        "total_slots": slots.len(),
        "available_slots": available
    })))
}
