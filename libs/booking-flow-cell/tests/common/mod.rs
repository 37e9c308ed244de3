#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{NaiveDate, NaiveTime};
use uuid::Uuid;

use booking_flow_cell::{BookingOrchestrator, PaymentChoice};
use payment_cell::{
    CheckoutRequest, Customer, GatewayCheckout, GatewayError, GatewayRegistry, NormalizedWebhook,
    PaymentGateway, ReconciliationService, ReportedStatus,
};
use shared_config::AppConfig;
use shared_database::{InMemoryStore, Stores};
use shared_models::{AvailabilityWindow, Clinic, GatewayKind, Payment, Provider};

pub const CLINIC_NAME: &str = "Clinique du Plateau";
pub const CHECKOUT_URL: &str = "https://checkout.example.com/pay";

/// Gateway double: scripted verify answers and an optional initiation outage.
#[derive(Default)]
pub struct FakeGateway {
    pub reported: Mutex<Option<ReportedStatus>>,
    pub unreachable: AtomicBool,
    pub initiated: AtomicUsize,
}

impl FakeGateway {
    pub fn report(&self, status: ReportedStatus) {
        *self.reported.lock().unwrap() = Some(status);
    }

    pub fn go_down(&self, down: bool) {
        self.unreachable.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Paystack
    }

    async fn initiate(&self, request: &CheckoutRequest) -> Result<GatewayCheckout, GatewayError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(GatewayError::Unreachable("connection refused".to_string()));
        }
        self.initiated.fetch_add(1, Ordering::SeqCst);
        Ok(GatewayCheckout {
            redirect_url: format!("{}/{}", CHECKOUT_URL, request.transaction_ref),
            gateway_reference: None,
        })
    }

    async fn verify(&self, _payment: &Payment) -> Result<ReportedStatus, GatewayError> {
        Ok(self
            .reported
            .lock()
            .unwrap()
            .unwrap_or(ReportedStatus::Pending))
    }

    async fn normalize_webhook(
        &self,
        _headers: &HeaderMap,
        _body: &[u8],
    ) -> Result<NormalizedWebhook, GatewayError> {
        Err(GatewayError::MalformedWebhook("not used".to_string()))
    }
}

pub struct Fixture {
    pub store: Arc<InMemoryStore>,
    pub stores: Stores,
    pub clinic: Clinic,
    pub provider: Provider,
    pub gateway: Arc<FakeGateway>,
}

/// Sunday 9 June 2024. Tomorrow is the first bookable day.
pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 9).unwrap()
}

pub fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
}

pub fn at(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

/// One clinic, one general practitioner working 09:00-11:00 every day.
pub async fn clinic_fixture() -> Fixture {
    let store = Arc::new(InMemoryStore::default());
    let clinic = Clinic {
        id: Uuid::new_v4(),
        name: CLINIC_NAME.to_string(),
        address: None,
        city: Some("Abidjan".to_string()),
    };
    let provider = Provider {
        id: Uuid::new_v4(),
        profile_id: Some(Uuid::new_v4()),
        first_name: "Awa".to_string(),
        last_name: "Koné".to_string(),
        specialty: Some("Médecine générale".to_string()),
        consultation_price: Some(10000),
    };

    store.add_clinic(clinic.clone()).await;
    store.add_provider(provider.clone(), Some(clinic.id)).await;
    for day_of_week in 0..7 {
        store
            .add_window(AvailabilityWindow {
                id: Uuid::new_v4(),
                provider_id: provider.id,
                day_of_week,
                start_time: at(9, 0),
                end_time: at(11, 0),
                is_active: true,
            })
            .await;
    }

    Fixture {
        stores: Stores::in_memory(store.clone()),
        store,
        clinic,
        provider,
        gateway: Arc::new(FakeGateway::default()),
    }
}

impl Fixture {
    pub fn gateways(&self) -> GatewayRegistry {
        GatewayRegistry::default().with(self.gateway.clone())
    }

    pub fn orchestrator(&self) -> Arc<BookingOrchestrator> {
        let config = Arc::new(AppConfig::default());
        let reconciliation = Arc::new(ReconciliationService::new(
            &self.stores,
            self.gateways(),
            config.clone(),
        ));
        Arc::new(
            BookingOrchestrator::new(&self.stores, reconciliation, &config)
                .with_timing(Duration::from_millis(5), Duration::from_millis(200)),
        )
    }
}

pub fn paystack_choice() -> PaymentChoice {
    PaymentChoice {
        gateway: GatewayKind::Paystack,
        customer: Customer {
            name: "Fatou Diallo".to_string(),
            phone: "+2250700000000".to_string(),
            email: Some("fatou@example.com".to_string()),
        },
        return_url: None,
    }
}
