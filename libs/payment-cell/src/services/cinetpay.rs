use async_trait::async_trait;
use axum::http::HeaderMap;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use shared_config::AppConfig;
use shared_models::{GatewayKind, Payment};

use crate::error::GatewayError;
use crate::models::{CheckoutRequest, GatewayCheckout, NormalizedWebhook, ReportedStatus};
use crate::services::gateway::PaymentGateway;

const INIT_ACCEPTED: &str = "201";
const CHECK_SUCCESS: &str = "00";
const CHECK_AWAITING: [&str; 2] = ["623", "662"];

/// CinetPay hosted checkout (mobile money and cards, XOF).
pub struct CinetPayGateway {
    client: Client,
    api_key: String,
    site_id: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct CinetPayResponse {
    code: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Value,
}

impl CinetPayGateway {
    pub fn new(config: &AppConfig, client: Client) -> Self {
        Self {
            client,
            api_key: config.cinetpay_api_key.clone(),
            site_id: config.cinetpay_site_id.clone(),
            base_url: config.cinetpay_base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post(&self, path: &str, body: Value) -> Result<CinetPayResponse, GatewayError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("CinetPay request to {}", url);

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        serde_json::from_str(&text).map_err(|e| {
            warn!("Unreadable CinetPay response ({}): {}", status, text);
            GatewayError::Rejected(format!("HTTP {}: {}", status, e))
        })
    }

    async fn check(&self, transaction_id: &str) -> Result<ReportedStatus, GatewayError> {
        let response = self
            .post(
                "/v2/payment/check",
                json!({
                    "apikey": self.api_key,
                    "site_id": self.site_id,
                    "transaction_id": transaction_id,
                }),
            )
            .await?;

        debug!("CinetPay check for {}: code {}", transaction_id, response.code);
        Ok(match response.code.as_str() {
            CHECK_SUCCESS => ReportedStatus::Success,
            code if CHECK_AWAITING.contains(&code) => ReportedStatus::Pending,
            _ => ReportedStatus::Failed,
        })
    }
}

#[async_trait]
impl PaymentGateway for CinetPayGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::CinetPay
    }

    async fn initiate(&self, request: &CheckoutRequest) -> Result<GatewayCheckout, GatewayError> {
        let payload = json!({
            "apikey": self.api_key,
            "site_id": self.site_id,
            "transaction_id": request.transaction_ref,
            "amount": request.amount,
            "currency": "XOF",
            "description": request.description,
            "customer_name": request.customer.name,
            "customer_surname": "",
            "customer_phone_number": request.customer.phone,
            "customer_email": request.customer.email.clone().unwrap_or_default(),
            "customer_country": "CI",
            "notify_url": request.notify_url,
            "return_url": request.return_url,
            "channels": "ALL",
            "metadata": request.metadata.to_string(),
        });

        let response = self.post("/v2/payment", payload).await?;
        if response.code != INIT_ACCEPTED {
            return Err(GatewayError::Rejected(response.message));
        }

        let redirect_url = response.data["payment_url"]
            .as_str()
            .ok_or_else(|| GatewayError::Rejected("missing payment_url".to_string()))?
            .to_string();
        info!("CinetPay checkout opened for {}", request.transaction_ref);

        Ok(GatewayCheckout {
            redirect_url,
            gateway_reference: response.data["payment_token"].as_str().map(str::to_string),
        })
    }

    async fn verify(&self, payment: &Payment) -> Result<ReportedStatus, GatewayError> {
        self.check(&payment.transaction_ref).await
    }

    /// CinetPay's notification only names the transaction, so the status comes
    /// from a check call.
    async fn normalize_webhook(
        &self,
        _headers: &HeaderMap,
        body: &[u8],
    ) -> Result<NormalizedWebhook, GatewayError> {
        let transaction_ref = transaction_id_from_body(body)
            .ok_or_else(|| GatewayError::MalformedWebhook("missing cpm_trans_id".to_string()))?;
        let status = self.check(&transaction_ref).await?;

        Ok(NormalizedWebhook {
            transaction_ref,
            status,
        })
    }
}

/// Notifications arrive form-encoded; JSON bodies are accepted too.
fn transaction_id_from_body(body: &[u8]) -> Option<String> {
    if let Ok(json) = serde_json::from_slice::<Value>(body) {
        return json["cpm_trans_id"].as_str().map(str::to_string);
    }

    let text = std::str::from_utf8(body).ok()?;
    text.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if key != "cpm_trans_id" {
            return None;
        }
        urlencoding::decode(&value.replace('+', " "))
            .ok()
            .map(|v| v.into_owned())
            .filter(|v| !v.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_id_from_form_body() {
        let body = b"cpm_site_id=123&cpm_trans_id=CINET-1718000000000-ABCDEFGHI&cpm_amount=5000";
        assert_eq!(
            transaction_id_from_body(body).as_deref(),
            Some("CINET-1718000000000-ABCDEFGHI")
        );
    }

    #[test]
    fn test_transaction_id_from_json_body() {
        let body = br#"{"cpm_trans_id":"CINET-1-X"}"#;
        assert_eq!(transaction_id_from_body(body).as_deref(), Some("CINET-1-X"));
    }

    #[test]
    fn test_missing_transaction_id() {
        assert_eq!(transaction_id_from_body(b"cpm_amount=5000"), None);
    }
}
