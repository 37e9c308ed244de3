#![allow(dead_code)]

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use uuid::Uuid;

use appointment_cell::{ReservationRequest, ReservationService};
use shared_config::AppConfig;
use shared_database::{InMemoryStore, Stores};
use shared_models::{Appointment, Clinic, Provider};

pub const PAYSTACK_SECRET: &str = "sk_test_secret";

pub struct Fixture {
    pub store: Arc<InMemoryStore>,
    pub clinic_id: Uuid,
    pub provider: Provider,
    pub secretary_id: Uuid,
}

pub async fn clinic_fixture() -> Fixture {
    let store = Arc::new(InMemoryStore::default());
    let clinic_id = Uuid::new_v4();
    let secretary_id = Uuid::new_v4();
    let provider = Provider {
        id: Uuid::new_v4(),
        profile_id: Some(Uuid::new_v4()),
        first_name: "Awa".to_string(),
        last_name: "Koné".to_string(),
        specialty: Some("Médecine générale".to_string()),
        consultation_price: Some(10000),
    };

    store
        .add_clinic(Clinic {
            id: clinic_id,
            name: "Clinique du Plateau".to_string(),
            address: None,
            city: Some("Abidjan".to_string()),
        })
        .await;
    store.add_provider(provider.clone(), Some(clinic_id)).await;
    store.add_clinic_staff(clinic_id, secretary_id).await;

    Fixture {
        store,
        clinic_id,
        provider,
        secretary_id,
    }
}

impl Fixture {
    pub async fn reserve(&self, stores: &Stores, patient_id: Uuid) -> Appointment {
        ReservationService::new(stores)
            .reserve(ReservationRequest {
                provider_id: self.provider.id,
                patient_id,
                date: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
                time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                clinic_id: Some(self.clinic_id),
                is_first_visit: true,
            })
            .await
            .unwrap()
    }
}

pub fn paystack_config(base_url: &str) -> Arc<AppConfig> {
    Arc::new(AppConfig {
        paystack_secret_key: PAYSTACK_SECRET.to_string(),
        paystack_base_url: base_url.to_string(),
        ..AppConfig::default()
    })
}
