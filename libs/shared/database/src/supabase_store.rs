use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_models::{
    Appointment, AppointmentStatus, AvailabilityWindow, Clinic, ConsultationIntake,
    NewAppointment, NewPayment, Payment, PaymentStatus, Provider,
};

use crate::change_feed::{AppointmentChange, ChangeFeed};
use crate::store::{AppointmentStore, DirectoryStore, PaymentStore, StoreError, StoreResult};
use crate::supabase::{is_conflict, SupabaseClient};

const RETURN_REPRESENTATION: (&str, &str) = ("prefer", "return=representation");
const DOCTOR_COLUMNS: &str =
    "id,profile_id,specialty,consultation_price_min,profile:profiles(first_name,last_name)";

#[derive(Debug, Deserialize)]
struct ProfileName {
    first_name: Option<String>,
    last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DoctorRow {
    id: Uuid,
    profile_id: Option<Uuid>,
    specialty: Option<String>,
    consultation_price_min: Option<f64>,
    profile: Option<ProfileName>,
}

impl From<DoctorRow> for Provider {
    fn from(row: DoctorRow) -> Self {
        let (first_name, last_name) = row
            .profile
            .map(|p| (p.first_name.unwrap_or_default(), p.last_name.unwrap_or_default()))
            .unwrap_or_default();
        Provider {
            id: row.id,
            profile_id: row.profile_id,
            first_name,
            last_name,
            specialty: row.specialty,
            consultation_price: row.consultation_price_min.map(|p| p.round() as i64),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ClinicDoctorRow {
    doctor_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct SecretaryRow {
    secretary_id: Uuid,
}

/// PostgREST-backed persistence. Slot exclusivity is enforced by the
/// `book_appointment_atomic` function and the partial unique index behind it.
pub struct SupabaseStore {
    supabase: Arc<SupabaseClient>,
    changes: ChangeFeed,
}

impl SupabaseStore {
    pub fn new(supabase: Arc<SupabaseClient>, changes: ChangeFeed) -> Self {
        Self { supabase, changes }
    }

    async fn select<T>(&self, path: &str) -> StoreResult<Vec<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        Ok(self
            .supabase
            .request::<Vec<T>>(Method::GET, path, None, None)
            .await?)
    }

    async fn patch<T>(&self, path: &str, body: Value) -> StoreResult<Vec<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        Ok(self
            .supabase
            .request_with_headers::<Vec<T>>(
                Method::PATCH,
                path,
                None,
                Some(body),
                &[RETURN_REPRESENTATION],
            )
            .await?)
    }

    async fn providers_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Provider>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let id_list = ids
            .iter()
            .map(Uuid::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let path = format!(
            "/rest/v1/doctors?id=in.({})&select={}",
            id_list, DOCTOR_COLUMNS
        );
        let rows: Vec<DoctorRow> = self.select(&path).await?;
        Ok(rows.into_iter().map(Provider::from).collect())
    }
}

fn status_list(statuses: &[AppointmentStatus]) -> String {
    statuses
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl DirectoryStore for SupabaseStore {
    async fn get_provider(&self, provider_id: Uuid) -> StoreResult<Option<Provider>> {
        let path = format!(
            "/rest/v1/doctors?id=eq.{}&select={}",
            provider_id, DOCTOR_COLUMNS
        );
        let rows: Vec<DoctorRow> = self.select(&path).await?;
        Ok(rows.into_iter().next().map(Provider::from))
    }

    async fn list_availability(&self, provider_id: Uuid) -> StoreResult<Vec<AvailabilityWindow>> {
        let path = format!(
            "/rest/v1/doctor_availability?doctor_id=eq.{}&is_active=eq.true&order=start_time.asc",
            provider_id
        );
        self.select(&path).await
    }

    async fn list_clinics(&self) -> StoreResult<Vec<Clinic>> {
        self.select("/rest/v1/clinics?select=id,name,address,city&order=name.asc")
            .await
    }

    async fn list_clinic_providers(&self, clinic_id: Uuid) -> StoreResult<Vec<Provider>> {
        let path = format!(
            "/rest/v1/clinic_doctors?clinic_id=eq.{}&is_active=eq.true&select=doctor_id",
            clinic_id
        );
        let links: Vec<ClinicDoctorRow> = self.select(&path).await?;
        let ids: Vec<Uuid> = links.into_iter().map(|l| l.doctor_id).collect();
        self.providers_by_ids(&ids).await
    }

    async fn list_clinic_staff(&self, clinic_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let path = format!(
            "/rest/v1/clinic_secretaries?clinic_id=eq.{}&is_active=eq.true&select=secretary_id",
            clinic_id
        );
        let rows: Vec<SecretaryRow> = self.select(&path).await?;
        Ok(rows.into_iter().map(|r| r.secretary_id).collect())
    }
}

#[async_trait]
impl AppointmentStore for SupabaseStore {
    async fn insert_if_slot_free(&self, new: NewAppointment) -> StoreResult<Appointment> {
        let args = json!({
            "p_patient_id": new.patient_id,
            "p_doctor_id": new.provider_id,
            "p_appointment_date": new.date,
            "p_appointment_time": new.time,
            "p_clinic_id": new.clinic_id,
            "p_is_first_visit": new.is_first_visit,
        });

        let appointment: Appointment = match self.supabase.rpc("book_appointment_atomic", args).await
        {
            Ok(appointment) => appointment,
            Err(e) if is_conflict(&e) => {
                info!(
                    "Slot {} {} for doctor {} already occupied",
                    new.date, new.time, new.provider_id
                );
                return Err(StoreError::SlotOccupied);
            }
            Err(e) => return Err(e.into()),
        };

        self.changes.publish(AppointmentChange::inserted(&appointment));
        Ok(appointment)
    }

    async fn get_appointment(&self, id: Uuid) -> StoreResult<Option<Appointment>> {
        let path = format!("/rest/v1/appointments?id=eq.{}", id);
        let rows: Vec<Appointment> = self.select(&path).await?;
        Ok(rows.into_iter().next())
    }

    async fn list_active_for_day(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> StoreResult<Vec<Appointment>> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&appointment_date=eq.{}&status=neq.cancelled&order=appointment_time.asc,created_at.asc",
            provider_id, date
        );
        self.select(&path).await
    }

    async fn transition_status(
        &self,
        id: Uuid,
        allowed_from: &[AppointmentStatus],
        to: AppointmentStatus,
        confirmed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<Option<Appointment>> {
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=in.({})",
            id,
            status_list(allowed_from)
        );
        let mut body = json!({ "status": to, "updated_at": Utc::now() });
        if let Some(at) = confirmed_at {
            body["confirmed_at"] = json!(at);
        }

        let rows: Vec<Appointment> = self.patch(&path, body).await?;
        let updated = rows.into_iter().next();
        match &updated {
            Some(appointment) => self
                .changes
                .publish(AppointmentChange::status_changed(appointment)),
            None => debug!("Appointment {} not in {:?}; transition skipped", id, allowed_from),
        }
        Ok(updated)
    }

    async fn list_pending_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<Appointment>> {
        let path = format!(
            "/rest/v1/appointments?status=eq.pending&created_at=lt.{}",
            urlencoding::encode(&cutoff.to_rfc3339())
        );
        self.select(&path).await
    }

    async fn save_intake(&self, intake: ConsultationIntake) -> StoreResult<()> {
        let mut row = Map::new();
        row.insert("appointment_id".into(), json!(intake.appointment_id));
        row.insert(
            "consultation_reason".into(),
            json!(intake
                .reason
                .clone()
                .unwrap_or_else(|| intake.symptoms.join(", "))),
        );
        row.insert("symptoms".into(), json!(intake.symptoms));
        row.insert("notes".into(), json!(intake.notes));
        row.insert("identity_confirmed".into(), json!(intake.identity_confirmed));
        row.insert("consultation_mode".into(), json!(intake.consultation_mode));
        row.insert("patient_id".into(), json!(intake.patient_id));

        let _: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/consultation_forms?on_conflict=appointment_id",
                None,
                Some(Value::Object(row)),
                &[(
                    "prefer",
                    "resolution=merge-duplicates,return=representation",
                )],
            )
            .await?;
        Ok(())
    }

    async fn get_intake(&self, appointment_id: Uuid) -> StoreResult<Option<ConsultationIntake>> {
        #[derive(Deserialize)]
        struct FormRow {
            appointment_id: Uuid,
            patient_id: Uuid,
            consultation_reason: Option<String>,
            #[serde(default)]
            symptoms: Vec<String>,
            notes: Option<String>,
            #[serde(default)]
            identity_confirmed: bool,
            #[serde(default)]
            consultation_mode: shared_models::ConsultationMode,
        }

        let path = format!(
            "/rest/v1/consultation_forms?appointment_id=eq.{}",
            appointment_id
        );
        let rows: Vec<FormRow> = self.select(&path).await?;
        Ok(rows.into_iter().next().map(|r| ConsultationIntake {
            appointment_id: r.appointment_id,
            patient_id: r.patient_id,
            consultation_mode: r.consultation_mode,
            reason: r.consultation_reason,
            symptoms: r.symptoms,
            notes: r.notes,
            identity_confirmed: r.identity_confirmed,
        }))
    }
}

#[async_trait]
impl PaymentStore for SupabaseStore {
    async fn insert_payment(&self, new: NewPayment) -> StoreResult<Payment> {
        let body = json!({
            "appointment_id": new.appointment_id,
            "patient_id": new.patient_id,
            "amount": new.amount,
            "payment_type": new.payment_type,
            "status": PaymentStatus::Pending,
            "provider": new.provider,
            "transaction_ref": new.transaction_ref,
        });
        let rows: Vec<Payment> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/payments",
                None,
                Some(body),
                &[RETURN_REPRESENTATION],
            )
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Backend(anyhow::anyhow!("payment insert returned no row")))
    }

    async fn find_by_reference(&self, transaction_ref: &str) -> StoreResult<Option<Payment>> {
        let path = format!(
            "/rest/v1/payments?transaction_ref=eq.{}",
            urlencoding::encode(transaction_ref)
        );
        let rows: Vec<Payment> = self.select(&path).await?;
        Ok(rows.into_iter().next())
    }

    async fn settle(
        &self,
        transaction_ref: &str,
        status: PaymentStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> StoreResult<Option<Payment>> {
        let path = format!(
            "/rest/v1/payments?transaction_ref=eq.{}&status=eq.pending",
            urlencoding::encode(transaction_ref)
        );
        let body = json!({ "status": status, "paid_at": paid_at });
        let rows: Vec<Payment> = self.patch(&path, body).await?;
        Ok(rows.into_iter().next())
    }

    async fn set_gateway_reference(
        &self,
        transaction_ref: &str,
        gateway_reference: &str,
    ) -> StoreResult<()> {
        let path = format!(
            "/rest/v1/payments?transaction_ref=eq.{}",
            urlencoding::encode(transaction_ref)
        );
        let rows: Vec<Value> = self
            .patch(&path, json!({ "gateway_reference": gateway_reference }))
            .await?;
        if rows.is_empty() {
            return Err(StoreError::NotFound(transaction_ref.to_string()));
        }
        Ok(())
    }

    async fn has_live_deposit(&self, appointment_id: Uuid) -> StoreResult<bool> {
        let path = format!(
            "/rest/v1/payments?appointment_id=eq.{}&payment_type=eq.deposit&status=in.(pending,success)&select=id",
            appointment_id
        );
        let rows: Vec<Value> = self.select(&path).await?;
        Ok(!rows.is_empty())
    }
}
