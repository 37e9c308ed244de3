mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use axum::http::HeaderMap;
use chrono::Utc;
use serde_json::json;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::paystack_config;
use payment_cell::services::paystack::{sign_webhook, SIGNATURE_HEADER};
use payment_cell::{
    CheckoutRequest, CinetPayGateway, Customer, GatewayError, MoneyFusionGateway, PaymentGateway,
    PaystackGateway, ReportedStatus,
};
use shared_config::AppConfig;
use shared_models::{GatewayKind, Payment, PaymentStatus, PaymentType};

fn checkout(reference: &str) -> CheckoutRequest {
    CheckoutRequest {
        transaction_ref: reference.to_string(),
        amount: 5000,
        description: "Paiement consultation médicale".to_string(),
        customer: Customer {
            name: "Fatou Diallo".to_string(),
            phone: "+2250700000000".to_string(),
            email: Some("fatou@example.com".to_string()),
        },
        return_url: "http://localhost:3000/return".to_string(),
        notify_url: "http://localhost:3000/payments/webhooks/test".to_string(),
        metadata: json!({ "appointment_id": Uuid::nil() }),
    }
}

fn payment(kind: GatewayKind, reference: &str, gateway_reference: Option<&str>) -> Payment {
    Payment {
        id: Uuid::new_v4(),
        appointment_id: Uuid::new_v4(),
        patient_id: Uuid::new_v4(),
        amount: 5000,
        payment_type: PaymentType::Deposit,
        status: PaymentStatus::Pending,
        provider: kind,
        transaction_ref: reference.to_string(),
        gateway_reference: gateway_reference.map(str::to_string),
        paid_at: None,
        created_at: Utc::now(),
    }
}

fn cinetpay(server: &MockServer) -> CinetPayGateway {
    let config = AppConfig {
        cinetpay_api_key: "ck".to_string(),
        cinetpay_site_id: "site-1".to_string(),
        cinetpay_base_url: server.uri(),
        ..AppConfig::default()
    };
    CinetPayGateway::new(&config, reqwest::Client::new())
}

fn moneyfusion(server: &MockServer) -> MoneyFusionGateway {
    let config = AppConfig {
        moneyfusion_api_url: format!("{}/api/merchant", server.uri()),
        moneyfusion_status_base_url: server.uri(),
        ..AppConfig::default()
    };
    MoneyFusionGateway::new(&config, reqwest::Client::new())
}

#[tokio::test]
async fn test_cinetpay_checkout_and_form_webhook() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/payment"))
        .and(body_partial_json(json!({
            "site_id": "site-1",
            "transaction_id": "CINET-1-AAAAAAAAA",
            "currency": "XOF"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "201",
            "message": "CREATED",
            "data": { "payment_token": "tok", "payment_url": "https://checkout.cinetpay.com/tok" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2/payment/check"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "00",
            "message": "SUCCES",
            "data": { "status": "ACCEPTED" }
        })))
        .mount(&server)
        .await;
    let gateway = cinetpay(&server);

    let opened = assert_ok!(gateway.initiate(&checkout("CINET-1-AAAAAAAAA")).await);
    assert_eq!(opened.redirect_url, "https://checkout.cinetpay.com/tok");
    assert_eq!(opened.gateway_reference.as_deref(), Some("tok"));

    let webhook = assert_ok!(
        gateway
            .normalize_webhook(
                &HeaderMap::new(),
                b"cpm_site_id=site-1&cpm_trans_id=CINET-1-AAAAAAAAA&cpm_amount=5000"
            )
            .await
    );
    assert_eq!(webhook.transaction_ref, "CINET-1-AAAAAAAAA");
    assert_eq!(webhook.status, ReportedStatus::Success);
}

#[tokio::test]
async fn test_cinetpay_refused_init_and_waiting_check() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/payment"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "608",
            "message": "MINIMUM_REQUIRED_FIELDS"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2/payment/check"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "662",
            "message": "WAITING_CUSTOMER_PAYMENT"
        })))
        .mount(&server)
        .await;
    let gateway = cinetpay(&server);

    assert_matches!(
        gateway.initiate(&checkout("CINET-2-AAAAAAAAA")).await,
        Err(GatewayError::Rejected(message)) if message == "MINIMUM_REQUIRED_FIELDS"
    );
    let status = gateway
        .verify(&payment(GatewayKind::CinetPay, "CINET-2-AAAAAAAAA", None))
        .await
        .unwrap();
    assert_eq!(status, ReportedStatus::Pending);
}

#[tokio::test]
async fn test_paystack_sends_minor_units_and_verifies() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transaction/initialize"))
        .and(header("authorization", "Bearer sk_test_secret"))
        .and(body_partial_json(json!({ "amount": 500000, "reference": "PAY-1-AAAAAAAAA" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "data": { "authorization_url": "https://checkout.paystack.com/x", "access_code": "x" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/transaction/verify/PAY-1-AAAAAAAAA"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "data": { "status": "success", "reference": "PAY-1-AAAAAAAAA" }
        })))
        .mount(&server)
        .await;
    let config = paystack_config(&server.uri());
    let gateway = PaystackGateway::new(&config, reqwest::Client::new());

    let opened = assert_ok!(gateway.initiate(&checkout("PAY-1-AAAAAAAAA")).await);
    assert_eq!(opened.redirect_url, "https://checkout.paystack.com/x");

    let status = gateway
        .verify(&payment(GatewayKind::Paystack, "PAY-1-AAAAAAAAA", Some("x")))
        .await
        .unwrap();
    assert_eq!(status, ReportedStatus::Success);
}

#[tokio::test]
async fn test_paystack_rejects_bad_signatures() {
    let config = paystack_config("http://127.0.0.1:9");
    let gateway = PaystackGateway::new(&config, reqwest::Client::new());
    let body = json!({
        "event": "charge.success",
        "data": { "reference": "PAY-1-AAAAAAAAA", "status": "success" }
    })
    .to_string();

    let mut forged = HeaderMap::new();
    forged.insert(
        SIGNATURE_HEADER,
        sign_webhook("another-secret", body.as_bytes())
            .unwrap()
            .parse()
            .unwrap(),
    );
    assert_matches!(
        gateway.normalize_webhook(&forged, body.as_bytes()).await,
        Err(GatewayError::InvalidSignature)
    );
    assert_matches!(
        gateway.normalize_webhook(&HeaderMap::new(), body.as_bytes()).await,
        Err(GatewayError::InvalidSignature)
    );

    let mut signed = HeaderMap::new();
    signed.insert(
        SIGNATURE_HEADER,
        sign_webhook(common::PAYSTACK_SECRET, body.as_bytes())
            .unwrap()
            .parse()
            .unwrap(),
    );
    let webhook = gateway
        .normalize_webhook(&signed, body.as_bytes())
        .await
        .unwrap();
    assert_eq!(webhook.status, ReportedStatus::Success);
}

#[tokio::test]
async fn test_paystack_requires_customer_email() {
    let config = paystack_config("http://127.0.0.1:9");
    let gateway = PaystackGateway::new(&config, reqwest::Client::new());
    let mut request = checkout("PAY-2-AAAAAAAAA");
    request.customer.email = None;

    assert_err!(gateway.initiate(&request).await);
}

#[tokio::test]
async fn test_moneyfusion_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/merchant"))
        .and(body_partial_json(json!({
            "totalPrice": 5000,
            "personal_Info": [{ "transaction_ref": "MF-1-AAAAAAAAA" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "statut": true,
            "token": "mf-token",
            "message": "paiement en cours",
            "url": "https://payin.moneyfusion.net/mf-token"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/paiementNotif/mf-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "statut": true,
            "data": { "statut": "paid", "tokenPay": "mf-token" }
        })))
        .mount(&server)
        .await;
    let gateway = moneyfusion(&server);

    let opened = assert_ok!(gateway.initiate(&checkout("MF-1-AAAAAAAAA")).await);
    assert_eq!(opened.gateway_reference.as_deref(), Some("mf-token"));

    let status = gateway
        .verify(&payment(GatewayKind::MoneyFusion, "MF-1-AAAAAAAAA", Some("mf-token")))
        .await
        .unwrap();
    assert_eq!(status, ReportedStatus::Success);

    let body = json!({
        "event": "payin.session.cancelled",
        "tokenPay": "mf-token",
        "personal_Info": [{ "transaction_ref": "MF-1-AAAAAAAAA" }]
    })
    .to_string();
    let webhook = gateway
        .normalize_webhook(&HeaderMap::new(), body.as_bytes())
        .await
        .unwrap();
    assert_eq!(webhook.transaction_ref, "MF-1-AAAAAAAAA");
    assert_eq!(webhook.status, ReportedStatus::Failed);
}

#[tokio::test]
async fn test_moneyfusion_verify_needs_session_token() {
    let server = MockServer::start().await;
    let gateway: Arc<dyn PaymentGateway> = Arc::new(moneyfusion(&server));

    assert_eq!(gateway.kind(), GatewayKind::MoneyFusion);
    assert_matches!(
        gateway
            .verify(&payment(GatewayKind::MoneyFusion, "MF-2-AAAAAAAAA", None))
            .await,
        Err(GatewayError::Rejected(_))
    );
}
