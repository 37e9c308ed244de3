use async_trait::async_trait;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::{json, Value};
use sha2::Sha512;
use tracing::{debug, info, warn};

use shared_config::AppConfig;
use shared_models::{GatewayKind, Payment};

use crate::error::GatewayError;
use crate::models::{CheckoutRequest, GatewayCheckout, NormalizedWebhook, ReportedStatus};
use crate::services::gateway::PaymentGateway;

type HmacSha512 = Hmac<Sha512>;

pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

/// Paystack card and mobile-money checkout. Amounts go out in the smallest unit.
pub struct PaystackGateway {
    client: Client,
    secret_key: String,
    base_url: String,
}

impl PaystackGateway {
    pub fn new(config: &AppConfig, client: Client) -> Self {
        Self {
            client,
            secret_key: config.paystack_secret_key.clone(),
            base_url: config.paystack_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn verify_signature(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), GatewayError> {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(GatewayError::InvalidSignature)?;
        let expected = hex::decode(signature).map_err(|_| GatewayError::InvalidSignature)?;

        let mut mac = HmacSha512::new_from_slice(self.secret_key.as_bytes())
            .map_err(|_| GatewayError::InvalidSignature)?;
        mac.update(body);
        mac.verify_slice(&expected).map_err(|_| {
            warn!("Paystack webhook signature verification failed");
            GatewayError::InvalidSignature
        })
    }
}

fn status_from_transaction(status: &str) -> ReportedStatus {
    match status {
        "success" => ReportedStatus::Success,
        "failed" | "reversed" => ReportedStatus::Failed,
        // abandoned, ongoing, pending, processing, queued
        _ => ReportedStatus::Pending,
    }
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Paystack
    }

    async fn initiate(&self, request: &CheckoutRequest) -> Result<GatewayCheckout, GatewayError> {
        let email = request
            .customer
            .email
            .as_deref()
            .filter(|e| !e.is_empty())
            .ok_or_else(|| GatewayError::Rejected("customer email is required".to_string()))?;

        let url = format!("{}/transaction/initialize", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .json(&json!({
                "email": email,
                "amount": request.amount * 100,
                "currency": "XOF",
                "reference": request.transaction_ref,
                "callback_url": request.return_url,
                "metadata": request.metadata,
            }))
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() || body["status"] != Value::Bool(true) {
            let message = body["message"].as_str().unwrap_or("initialization failed");
            return Err(GatewayError::Rejected(format!("HTTP {}: {}", status, message)));
        }

        let redirect_url = body["data"]["authorization_url"]
            .as_str()
            .ok_or_else(|| GatewayError::Rejected("missing authorization_url".to_string()))?
            .to_string();
        info!("Paystack checkout opened for {}", request.transaction_ref);

        Ok(GatewayCheckout {
            redirect_url,
            gateway_reference: body["data"]["access_code"].as_str().map(str::to_string),
        })
    }

    async fn verify(&self, payment: &Payment) -> Result<ReportedStatus, GatewayError> {
        let url = format!(
            "{}/transaction/verify/{}",
            self.base_url,
            urlencoding::encode(&payment.transaction_ref)
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            let message = body["message"].as_str().unwrap_or("verification failed");
            return Err(GatewayError::Rejected(format!("HTTP {}: {}", status, message)));
        }

        let reported = body["data"]["status"].as_str().unwrap_or_default();
        debug!("Paystack verify for {}: {}", payment.transaction_ref, reported);
        Ok(status_from_transaction(reported))
    }

    async fn normalize_webhook(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<NormalizedWebhook, GatewayError> {
        self.verify_signature(headers, body)?;

        let event: Value = serde_json::from_slice(body)
            .map_err(|e| GatewayError::MalformedWebhook(e.to_string()))?;
        let transaction_ref = event["data"]["reference"]
            .as_str()
            .ok_or_else(|| GatewayError::MalformedWebhook("missing data.reference".to_string()))?
            .to_string();

        let status = match event["event"].as_str() {
            Some("charge.success") => ReportedStatus::Success,
            Some("charge.failed") => ReportedStatus::Failed,
            _ => status_from_transaction(event["data"]["status"].as_str().unwrap_or_default()),
        };

        Ok(NormalizedWebhook {
            transaction_ref,
            status,
        })
    }
}

/// Hex HMAC-SHA512 of `body`, as Paystack puts it in [`SIGNATURE_HEADER`].
pub fn sign_webhook(secret_key: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha512::new_from_slice(secret_key.as_bytes()).ok()?;
    mac.update(body);
    Some(hex::encode(mac.finalize().into_bytes()))
}
