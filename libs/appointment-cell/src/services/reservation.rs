use std::sync::Arc;

use tracing::{debug, info};

use shared_database::{AppointmentStore, StoreError, Stores};
use shared_models::{Appointment, ConsultationIntake, NewAppointment};

use crate::models::{AppointmentError, ReservationRequest};

/// Creates `pending` appointments under the one-live-appointment-per-slot rule.
///
/// The exclusivity check lives in the store's conditional insert, so concurrent
/// callers are serialized there and exactly one of them wins a given slot.
pub struct ReservationService {
    appointments: Arc<dyn AppointmentStore>,
}

impl ReservationService {
    pub fn new(stores: &Stores) -> Self {
        Self {
            appointments: stores.appointments.clone(),
        }
    }

    pub async fn reserve(&self, request: ReservationRequest) -> Result<Appointment, AppointmentError> {
        debug!(
            "Reserving {} {} with doctor {} for patient {}",
            request.date, request.time, request.provider_id, request.patient_id
        );

        let new = NewAppointment {
            provider_id: request.provider_id,
            patient_id: request.patient_id,
            clinic_id: request.clinic_id,
            date: request.date,
            time: request.time,
            is_first_visit: request.is_first_visit,
        };

        match self.appointments.insert_if_slot_free(new).await {
            Ok(appointment) => {
                info!(
                    "Appointment {} reserved ({} {})",
                    appointment.id, appointment.date, appointment.time
                );
                Ok(appointment)
            }
            Err(StoreError::SlotOccupied) => {
                info!(
                    "SLOT_TAKEN: doctor {} {} {}",
                    request.provider_id, request.date, request.time
                );
                Err(AppointmentError::SlotTaken {
                    date: request.date,
                    time: request.time,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Stores pre-consultation answers for a reserved appointment.
    pub async fn attach_intake(&self, intake: ConsultationIntake) -> Result<(), AppointmentError> {
        let appointment = self
            .appointments
            .get_appointment(intake.appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound(intake.appointment_id))?;
        if appointment.patient_id != intake.patient_id {
            return Err(AppointmentError::Unauthorized);
        }

        self.appointments.save_intake(intake).await?;
        Ok(())
    }
}
