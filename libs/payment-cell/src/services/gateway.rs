use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::info;

use shared_config::AppConfig;
use shared_models::{GatewayKind, Payment};

use crate::error::GatewayError;
use crate::models::{CheckoutRequest, GatewayCheckout, NormalizedWebhook, ReportedStatus};
use crate::services::{CinetPayGateway, MoneyFusionGateway, PaystackGateway};

/// The gateway-specific half of a payment: opening a checkout, asking for the
/// current status, and translating callbacks. Settlement itself lives in
/// [`crate::services::ReconciliationService`] and is shared by every gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn kind(&self) -> GatewayKind;

    async fn initiate(&self, request: &CheckoutRequest) -> Result<GatewayCheckout, GatewayError>;

    async fn verify(&self, payment: &Payment) -> Result<ReportedStatus, GatewayError>;

    async fn normalize_webhook(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<NormalizedWebhook, GatewayError>;
}

/// `PREFIX-<epoch millis>-<9 uppercase alphanumerics>`, e.g. `PAY-1718000000000-K3J9QZ0AB`.
pub fn generate_transaction_ref(kind: GatewayKind) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|b| (b as char).to_ascii_uppercase())
        .collect();
    format!(
        "{}-{}-{}",
        kind.reference_prefix(),
        Utc::now().timestamp_millis(),
        suffix
    )
}

#[derive(Clone, Default)]
pub struct GatewayRegistry {
    gateways: HashMap<GatewayKind, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    /// Registers every gateway whose credentials are present.
    pub fn from_config(config: &AppConfig) -> Self {
        let client = reqwest::Client::new();
        let mut registry = Self::default();

        if config.is_cinetpay_configured() {
            registry = registry.with(Arc::new(CinetPayGateway::new(config, client.clone())));
        }
        if config.is_paystack_configured() {
            registry = registry.with(Arc::new(PaystackGateway::new(config, client.clone())));
        }
        if config.is_moneyfusion_configured() {
            registry = registry.with(Arc::new(MoneyFusionGateway::new(config, client)));
        }

        info!("Payment gateways enabled: {:?}", registry.enabled());
        registry
    }

    pub fn with(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.insert(gateway.kind(), gateway);
        self
    }

    pub fn get(&self, kind: GatewayKind) -> Result<Arc<dyn PaymentGateway>, GatewayError> {
        self.gateways
            .get(&kind)
            .cloned()
            .ok_or(GatewayError::NotConfigured(kind))
    }

    pub fn enabled(&self) -> Vec<GatewayKind> {
        GatewayKind::ALL
            .into_iter()
            .filter(|kind| self.gateways.contains_key(kind))
            .collect()
    }
}
