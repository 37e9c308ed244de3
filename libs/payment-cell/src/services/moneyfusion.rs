use async_trait::async_trait;
use axum::http::HeaderMap;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info};

use shared_config::AppConfig;
use shared_models::{GatewayKind, Payment};

use crate::error::GatewayError;
use crate::models::{CheckoutRequest, GatewayCheckout, NormalizedWebhook, ReportedStatus};
use crate::services::gateway::PaymentGateway;

/// MoneyFusion mobile-money aggregator.
///
/// The checkout is opened against the merchant's own API URL. Our reference
/// travels in `personal_Info` and comes back in every webhook; status polls go
/// through the session token MoneyFusion hands out at init.
pub struct MoneyFusionGateway {
    client: Client,
    api_url: String,
    status_base_url: String,
}

impl MoneyFusionGateway {
    pub fn new(config: &AppConfig, client: Client) -> Self {
        Self {
            client,
            api_url: config.moneyfusion_api_url.clone(),
            status_base_url: config
                .moneyfusion_status_base_url
                .trim_end_matches('/')
                .to_string(),
        }
    }
}

fn status_from_poll(statut: &str) -> ReportedStatus {
    match statut {
        "paid" => ReportedStatus::Success,
        "failure" | "no paid" => ReportedStatus::Failed,
        _ => ReportedStatus::Pending,
    }
}

fn status_from_event(event: &str) -> Option<ReportedStatus> {
    match event {
        "payin.session.completed" => Some(ReportedStatus::Success),
        "payin.session.cancelled" => Some(ReportedStatus::Failed),
        "payin.session.pending" => Some(ReportedStatus::Pending),
        _ => None,
    }
}

#[async_trait]
impl PaymentGateway for MoneyFusionGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::MoneyFusion
    }

    async fn initiate(&self, request: &CheckoutRequest) -> Result<GatewayCheckout, GatewayError> {
        let payload = json!({
            "totalPrice": request.amount,
            "article": [{ "description": request.description, "price": request.amount }],
            "personal_Info": [{
                "transaction_ref": request.transaction_ref,
                "metadata": request.metadata,
            }],
            "numeroSend": request.customer.phone,
            "nomclient": request.customer.name,
            "return_url": request.return_url,
            "webhook_url": request.notify_url,
        });

        let response = self.client.post(&self.api_url).json(&payload).send().await?;
        let status = response.status();
        let body: Value = response.json().await?;

        if !status.is_success() || body["statut"] != Value::Bool(true) {
            let message = body["message"].as_str().unwrap_or("initialization failed");
            return Err(GatewayError::Rejected(format!("HTTP {}: {}", status, message)));
        }

        let redirect_url = body["url"]
            .as_str()
            .ok_or_else(|| GatewayError::Rejected("missing url".to_string()))?
            .to_string();
        info!("MoneyFusion checkout opened for {}", request.transaction_ref);

        Ok(GatewayCheckout {
            redirect_url,
            gateway_reference: body["token"].as_str().map(str::to_string),
        })
    }

    async fn verify(&self, payment: &Payment) -> Result<ReportedStatus, GatewayError> {
        let token = payment.gateway_reference.as_deref().ok_or_else(|| {
            GatewayError::Rejected(format!("no MoneyFusion token for {}", payment.transaction_ref))
        })?;

        let url = format!("{}/paiementNotif/{}", self.status_base_url, urlencoding::encode(token));
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let body: Value = response.json().await?;

        if !status.is_success() || body["statut"] != Value::Bool(true) {
            let message = body["message"].as_str().unwrap_or("status lookup failed");
            return Err(GatewayError::Rejected(format!("HTTP {}: {}", status, message)));
        }

        let reported = body["data"]["statut"].as_str().unwrap_or_default();
        debug!("MoneyFusion status for {}: {}", payment.transaction_ref, reported);
        Ok(status_from_poll(reported))
    }

    async fn normalize_webhook(
        &self,
        _headers: &HeaderMap,
        body: &[u8],
    ) -> Result<NormalizedWebhook, GatewayError> {
        let event: Value = serde_json::from_slice(body)
            .map_err(|e| GatewayError::MalformedWebhook(e.to_string()))?;

        let name = event["event"].as_str().unwrap_or_default();
        let status = status_from_event(name)
            .ok_or_else(|| GatewayError::MalformedWebhook(format!("unknown event '{}'", name)))?;
        let transaction_ref = event["personal_Info"][0]["transaction_ref"]
            .as_str()
            .ok_or_else(|| {
                GatewayError::MalformedWebhook("missing personal_Info transaction_ref".to_string())
            })?
            .to_string();

        Ok(NormalizedWebhook {
            transaction_ref,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(
            status_from_event("payin.session.completed"),
            Some(ReportedStatus::Success)
        );
        assert_eq!(
            status_from_event("payin.session.cancelled"),
            Some(ReportedStatus::Failed)
        );
        assert_eq!(status_from_event("payout.session.completed"), None);
    }

    #[test]
    fn test_poll_statuses() {
        assert_eq!(status_from_poll("paid"), ReportedStatus::Success);
        assert_eq!(status_from_poll("no paid"), ReportedStatus::Failed);
        assert_eq!(status_from_poll("pending"), ReportedStatus::Pending);
    }
}
