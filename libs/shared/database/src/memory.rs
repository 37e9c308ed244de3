use std::collections::{HashMap, HashSet};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shared_models::{
    Appointment, AppointmentStatus, AvailabilityWindow, Clinic, ConsultationIntake,
    NewAppointment, NewPayment, Notification, Payment, PaymentStatus, PaymentType, Provider,
    SlotKey,
};

use crate::change_feed::{AppointmentChange, ChangeFeed};
use crate::notify::NotificationSink;
use crate::store::{AppointmentStore, DirectoryStore, PaymentStore, StoreError, StoreResult};

#[derive(Default)]
struct State {
    providers: HashMap<Uuid, Provider>,
    windows: Vec<AvailabilityWindow>,
    clinics: Vec<Clinic>,
    clinic_providers: HashMap<Uuid, Vec<Uuid>>,
    clinic_staff: HashMap<Uuid, Vec<Uuid>>,
    appointments: HashMap<Uuid, Appointment>,
    occupied: HashSet<SlotKey>,
    intakes: HashMap<Uuid, ConsultationIntake>,
    payments: HashMap<String, Payment>,
    notifications: Vec<Notification>,
}

/// Process-local backend. One write lock guards every table, so the slot
/// check and the insert in `insert_if_slot_free` cannot interleave.
pub struct InMemoryStore {
    state: RwLock<State>,
    changes: ChangeFeed,
}

impl InMemoryStore {
    pub fn new(changes: ChangeFeed) -> Self {
        Self {
            state: RwLock::new(State::default()),
            changes,
        }
    }

    pub fn changes(&self) -> &ChangeFeed {
        &self.changes
    }

    pub async fn add_clinic(&self, clinic: Clinic) {
        self.state.write().await.clinics.push(clinic);
    }

    pub async fn add_provider(&self, provider: Provider, clinic_id: Option<Uuid>) {
        let mut state = self.state.write().await;
        if let Some(clinic_id) = clinic_id {
            state
                .clinic_providers
                .entry(clinic_id)
                .or_default()
                .push(provider.id);
        }
        state.providers.insert(provider.id, provider);
    }

    pub async fn add_window(&self, window: AvailabilityWindow) {
        self.state.write().await.windows.push(window);
    }

    pub async fn add_clinic_staff(&self, clinic_id: Uuid, user_id: Uuid) {
        self.state
            .write()
            .await
            .clinic_staff
            .entry(clinic_id)
            .or_default()
            .push(user_id);
    }

    /// Stores an appointment as-is, bypassing the slot check. Fixture loading only.
    pub async fn seed_appointment(&self, appointment: Appointment) {
        let mut state = self.state.write().await;
        if appointment.status.occupies_slot() {
            state.occupied.insert(appointment.slot());
        }
        state.appointments.insert(appointment.id, appointment);
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.state.read().await.notifications.clone()
    }

    pub async fn appointments(&self) -> Vec<Appointment> {
        self.state.read().await.appointments.values().cloned().collect()
    }

    pub async fn payments(&self) -> Vec<Payment> {
        self.state.read().await.payments.values().cloned().collect()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(ChangeFeed::default())
    }
}

#[async_trait]
impl DirectoryStore for InMemoryStore {
    async fn get_provider(&self, provider_id: Uuid) -> StoreResult<Option<Provider>> {
        Ok(self.state.read().await.providers.get(&provider_id).cloned())
    }

    async fn list_availability(&self, provider_id: Uuid) -> StoreResult<Vec<AvailabilityWindow>> {
        Ok(self
            .state
            .read()
            .await
            .windows
            .iter()
            .filter(|w| w.provider_id == provider_id && w.is_active)
            .cloned()
            .collect())
    }

    async fn list_clinics(&self) -> StoreResult<Vec<Clinic>> {
        let mut clinics = self.state.read().await.clinics.clone();
        clinics.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(clinics)
    }

    async fn list_clinic_providers(&self, clinic_id: Uuid) -> StoreResult<Vec<Provider>> {
        let state = self.state.read().await;
        Ok(state
            .clinic_providers
            .get(&clinic_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.providers.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_clinic_staff(&self, clinic_id: Uuid) -> StoreResult<Vec<Uuid>> {
        Ok(self
            .state
            .read()
            .await
            .clinic_staff
            .get(&clinic_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl AppointmentStore for InMemoryStore {
    async fn insert_if_slot_free(&self, new: NewAppointment) -> StoreResult<Appointment> {
        let appointment = {
            let mut state = self.state.write().await;
            let slot = new.slot();
            if state.occupied.contains(&slot) {
                return Err(StoreError::SlotOccupied);
            }

            let appointment = Appointment {
                id: Uuid::new_v4(),
                provider_id: new.provider_id,
                patient_id: new.patient_id,
                clinic_id: new.clinic_id,
                date: new.date,
                time: new.time,
                status: AppointmentStatus::Pending,
                is_first_visit: new.is_first_visit,
                confirmed_at: None,
                created_at: Utc::now(),
            };
            state.occupied.insert(slot);
            state.appointments.insert(appointment.id, appointment.clone());
            appointment
        };

        debug!("Inserted appointment {}", appointment.id);
        self.changes.publish(AppointmentChange::inserted(&appointment));
        Ok(appointment)
    }

    async fn get_appointment(&self, id: Uuid) -> StoreResult<Option<Appointment>> {
        Ok(self.state.read().await.appointments.get(&id).cloned())
    }

    async fn list_active_for_day(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> StoreResult<Vec<Appointment>> {
        let mut day: Vec<Appointment> = self
            .state
            .read()
            .await
            .appointments
            .values()
            .filter(|a| a.provider_id == provider_id && a.date == date && a.status.occupies_slot())
            .cloned()
            .collect();
        day.sort_by_key(|a| (a.time, a.created_at));
        Ok(day)
    }

    async fn transition_status(
        &self,
        id: Uuid,
        allowed_from: &[AppointmentStatus],
        to: AppointmentStatus,
        confirmed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<Option<Appointment>> {
        let updated = {
            let mut state = self.state.write().await;
            let Some(appointment) = state.appointments.get_mut(&id) else {
                return Ok(None);
            };
            if !allowed_from.contains(&appointment.status) {
                return Ok(None);
            }

            appointment.status = to;
            if confirmed_at.is_some() {
                appointment.confirmed_at = confirmed_at;
            }
            let updated = appointment.clone();
            if !to.occupies_slot() {
                let slot = updated.slot();
                // Seeded fixtures may stack several appointments on one slot.
                let still_held = state
                    .appointments
                    .values()
                    .any(|a| a.status.occupies_slot() && a.slot() == slot);
                if !still_held {
                    state.occupied.remove(&slot);
                }
            }
            updated
        };

        self.changes
            .publish(AppointmentChange::status_changed(&updated));
        Ok(Some(updated))
    }

    async fn list_pending_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<Appointment>> {
        Ok(self
            .state
            .read()
            .await
            .appointments
            .values()
            .filter(|a| a.status == AppointmentStatus::Pending && a.created_at < cutoff)
            .cloned()
            .collect())
    }

    async fn save_intake(&self, intake: ConsultationIntake) -> StoreResult<()> {
        self.state
            .write()
            .await
            .intakes
            .insert(intake.appointment_id, intake);
        Ok(())
    }

    async fn get_intake(&self, appointment_id: Uuid) -> StoreResult<Option<ConsultationIntake>> {
        Ok(self.state.read().await.intakes.get(&appointment_id).cloned())
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn insert_payment(&self, new: NewPayment) -> StoreResult<Payment> {
        let mut state = self.state.write().await;
        if state.payments.contains_key(&new.transaction_ref) {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "duplicate transaction reference {}",
                new.transaction_ref
            )));
        }

        let payment = Payment {
            id: Uuid::new_v4(),
            appointment_id: new.appointment_id,
            patient_id: new.patient_id,
            amount: new.amount,
            payment_type: new.payment_type,
            status: PaymentStatus::Pending,
            provider: new.provider,
            transaction_ref: new.transaction_ref,
            gateway_reference: None,
            paid_at: None,
            created_at: Utc::now(),
        };
        state
            .payments
            .insert(payment.transaction_ref.clone(), payment.clone());
        Ok(payment)
    }

    async fn find_by_reference(&self, transaction_ref: &str) -> StoreResult<Option<Payment>> {
        Ok(self.state.read().await.payments.get(transaction_ref).cloned())
    }

    async fn settle(
        &self,
        transaction_ref: &str,
        status: PaymentStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> StoreResult<Option<Payment>> {
        let mut state = self.state.write().await;
        let Some(payment) = state.payments.get_mut(transaction_ref) else {
            return Err(StoreError::NotFound(transaction_ref.to_string()));
        };
        if payment.status.is_terminal() {
            return Ok(None);
        }
        payment.status = status;
        payment.paid_at = paid_at;
        Ok(Some(payment.clone()))
    }

    async fn set_gateway_reference(
        &self,
        transaction_ref: &str,
        gateway_reference: &str,
    ) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let payment = state
            .payments
            .get_mut(transaction_ref)
            .ok_or_else(|| StoreError::NotFound(transaction_ref.to_string()))?;
        payment.gateway_reference = Some(gateway_reference.to_string());
        Ok(())
    }

    async fn has_live_deposit(&self, appointment_id: Uuid) -> StoreResult<bool> {
        Ok(self.state.read().await.payments.values().any(|p| {
            p.appointment_id == appointment_id
                && p.payment_type == PaymentType::Deposit
                && p.status != PaymentStatus::Failed
        }))
    }
}

#[async_trait]
impl NotificationSink for InMemoryStore {
    async fn notify(&self, notification: Notification) -> Result<()> {
        self.state.write().await.notifications.push(notification);
        Ok(())
    }
}
