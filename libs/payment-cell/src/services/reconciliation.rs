use std::sync::Arc;

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

use appointment_cell::AppointmentLifecycleService;
use shared_config::AppConfig;
use shared_database::{AppointmentStore, DirectoryStore, NotificationSink, PaymentStore, Stores};
use shared_models::{
    Appointment, AppointmentStatus, GatewayKind, NewPayment, Notification, NotificationKind,
    Payment, PaymentStatus, PaymentType,
};

use crate::error::PaymentError;
use crate::models::{
    CheckoutRequest, InitiatePayment, PaymentInitiation, ReconcileOutcome, ReportedStatus,
};
use crate::services::gateway::{generate_transaction_ref, GatewayRegistry};

const CHECKOUT_DESCRIPTION: &str = "Paiement consultation médicale";

/// Gateway-agnostic payment state machine: `pending -> success | failed`, once.
///
/// The transaction reference we generate is the idempotency key. Whatever
/// number of webhooks and verify polls arrive for it, only the call that wins
/// the `pending -> terminal` compare-and-set confirms the appointment and
/// sends notifications.
pub struct ReconciliationService {
    payments: Arc<dyn PaymentStore>,
    appointments: Arc<dyn AppointmentStore>,
    directory: Arc<dyn DirectoryStore>,
    notifications: Arc<dyn NotificationSink>,
    lifecycle: AppointmentLifecycleService,
    gateways: GatewayRegistry,
    config: Arc<AppConfig>,
}

impl ReconciliationService {
    pub fn new(stores: &Stores, gateways: GatewayRegistry, config: Arc<AppConfig>) -> Self {
        Self {
            payments: stores.payments.clone(),
            appointments: stores.appointments.clone(),
            directory: stores.directory.clone(),
            notifications: stores.notifications.clone(),
            lifecycle: AppointmentLifecycleService::new(stores),
            gateways,
            config,
        }
    }

    pub async fn get_payment(&self, transaction_ref: &str) -> Result<Payment, PaymentError> {
        self.payments
            .find_by_reference(transaction_ref)
            .await?
            .ok_or_else(|| PaymentError::UnknownReference(transaction_ref.to_string()))
    }

    /// Records a `pending` payment, then opens the gateway checkout. A gateway
    /// that cannot be reached or refuses leaves the record `failed`, never pending.
    pub async fn initiate(&self, request: InitiatePayment) -> Result<PaymentInitiation, PaymentError> {
        if request.amount <= 0 {
            return Err(PaymentError::InvalidAmount);
        }

        let appointment = self
            .appointments
            .get_appointment(request.appointment_id)
            .await?
            .ok_or(PaymentError::AppointmentNotFound(request.appointment_id))?;
        if appointment.patient_id != request.patient_id {
            return Err(PaymentError::Unauthorized);
        }
        let payable = match request.payment_type {
            PaymentType::Deposit => appointment.status == AppointmentStatus::Pending,
            PaymentType::Balance => matches!(
                appointment.status,
                AppointmentStatus::Confirmed | AppointmentStatus::Completed
            ),
        };
        if !payable {
            return Err(PaymentError::AppointmentNotPayable {
                id: appointment.id,
                status: appointment.status,
            });
        }

        let gateway = self.gateways.get(request.gateway)?;
        let transaction_ref = generate_transaction_ref(request.gateway);

        let mut payment = self
            .payments
            .insert_payment(NewPayment {
                appointment_id: appointment.id,
                patient_id: request.patient_id,
                amount: request.amount,
                payment_type: request.payment_type,
                provider: request.gateway,
                transaction_ref: transaction_ref.clone(),
            })
            .await?;

        let checkout = CheckoutRequest {
            transaction_ref: transaction_ref.clone(),
            amount: request.amount,
            description: CHECKOUT_DESCRIPTION.to_string(),
            customer: request.customer,
            return_url: request.return_url.unwrap_or_else(|| {
                format!(
                    "{}/payments/{}",
                    self.config.public_base_url.trim_end_matches('/'),
                    transaction_ref
                )
            }),
            notify_url: self.config.webhook_url(request.gateway.as_str()),
            metadata: json!({
                "appointment_id": appointment.id,
                "patient_id": request.patient_id,
                "payment_id": payment.id,
                "payment_type": request.payment_type,
            }),
        };

        let opened = match gateway.initiate(&checkout).await {
            Ok(opened) => opened,
            Err(e) => {
                warn!("{} initiation failed for {}: {}", request.gateway, transaction_ref, e);
                if let Err(settle_err) = self
                    .payments
                    .settle(&transaction_ref, PaymentStatus::Failed, None)
                    .await
                {
                    error!("Could not mark payment {} failed: {}", transaction_ref, settle_err);
                }
                return Err(e.into());
            }
        };

        if let Some(gateway_reference) = &opened.gateway_reference {
            self.payments
                .set_gateway_reference(&transaction_ref, gateway_reference)
                .await?;
            payment.gateway_reference = Some(gateway_reference.clone());
        }

        info!(
            "Payment {} initiated via {} for appointment {}",
            transaction_ref, request.gateway, appointment.id
        );
        Ok(PaymentInitiation {
            payment,
            redirect_url: opened.redirect_url,
        })
    }

    /// Applies a gateway-reported status. Safe to call any number of times.
    #[instrument(skip(self))]
    pub async fn reconcile(
        &self,
        transaction_ref: &str,
        reported: ReportedStatus,
    ) -> Result<ReconcileOutcome, PaymentError> {
        let Some(payment) = self.payments.find_by_reference(transaction_ref).await? else {
            error!("Reconciliation for unknown payment reference {}", transaction_ref);
            return Err(PaymentError::UnknownReference(transaction_ref.to_string()));
        };

        if payment.status.is_terminal() {
            debug!("Payment {} already {}", transaction_ref, payment.status);
            return self.finish_settled(payment).await;
        }
        let Some(terminal) = reported.terminal() else {
            debug!("Payment {} still awaiting the customer", transaction_ref);
            return Ok(unchanged(payment));
        };

        let now = Utc::now();
        let paid_at = (terminal == PaymentStatus::Success).then_some(now);
        let Some(settled) = self.payments.settle(transaction_ref, terminal, paid_at).await? else {
            // Another webhook or poll settled it first.
            debug!("Payment {} settled concurrently", transaction_ref);
            return Ok(unchanged(self.get_payment(transaction_ref).await?));
        };
        info!("Payment {} settled as {}", transaction_ref, terminal);

        let mut appointment_confirmed = false;
        if terminal == PaymentStatus::Failed {
            self.announce_failure(&settled).await;
        } else if settled.payment_type == PaymentType::Deposit {
            appointment_confirmed = self.confirm_deposit(&settled, now).await?;
        }

        Ok(ReconcileOutcome {
            payment: settled,
            applied: true,
            appointment_confirmed,
        })
    }

    /// Client-initiated poll: asks the payment's own gateway, then reconciles.
    pub async fn verify(&self, transaction_ref: &str) -> Result<ReconcileOutcome, PaymentError> {
        let payment = self.get_payment(transaction_ref).await?;
        if payment.status.is_terminal() {
            return self.finish_settled(payment).await;
        }

        let gateway = self.gateways.get(payment.provider)?;
        let reported = gateway.verify(&payment).await?;
        self.reconcile(transaction_ref, reported).await
    }

    pub async fn handle_webhook(
        &self,
        kind: GatewayKind,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<ReconcileOutcome, PaymentError> {
        let gateway = self.gateways.get(kind)?;
        let webhook = gateway
            .normalize_webhook(headers, body)
            .await
            .inspect_err(|e| warn!("Rejected {} webhook: {}", kind, e))?;

        if let Some(payment) = self.payments.find_by_reference(&webhook.transaction_ref).await? {
            if payment.provider != kind {
                error!(
                    "{} webhook for payment {} opened with {}",
                    kind, webhook.transaction_ref, payment.provider
                );
                return Err(PaymentError::UnknownReference(webhook.transaction_ref));
            }
        }

        self.reconcile(&webhook.transaction_ref, webhook.status).await
    }

    /// Picks up a paid deposit whose appointment is still `pending` because the
    /// confirming write failed after the payment settled. The appointment's own
    /// compare-and-set keeps the confirmation single.
    async fn finish_settled(&self, payment: Payment) -> Result<ReconcileOutcome, PaymentError> {
        if payment.status != PaymentStatus::Success || payment.payment_type != PaymentType::Deposit {
            return Ok(unchanged(payment));
        }
        let still_pending = self
            .appointments
            .get_appointment(payment.appointment_id)
            .await?
            .is_some_and(|a| a.status == AppointmentStatus::Pending);
        if !still_pending {
            return Ok(unchanged(payment));
        }

        warn!(
            "Deposit {} is paid but appointment {} is still pending; confirming",
            payment.transaction_ref, payment.appointment_id
        );
        let appointment_confirmed = self.confirm_deposit(&payment, Utc::now()).await?;
        Ok(ReconcileOutcome {
            payment,
            applied: false,
            appointment_confirmed,
        })
    }

    async fn confirm_deposit(&self, payment: &Payment, now: DateTime<Utc>) -> Result<bool, PaymentError> {
        match self.lifecycle.confirm_pending(payment.appointment_id, now).await {
            Ok(Some(appointment)) => {
                self.announce_confirmation(payment, &appointment).await;
                Ok(true)
            }
            Ok(None) => {
                warn!(
                    "Deposit {} succeeded but appointment {} was no longer pending",
                    payment.transaction_ref, payment.appointment_id
                );
                Ok(false)
            }
            Err(e) => {
                error!(
                    "Deposit {} succeeded but confirming appointment {} failed: {}",
                    payment.transaction_ref, payment.appointment_id, e
                );
                Err(e.into())
            }
        }
    }

    async fn announce_confirmation(&self, payment: &Payment, appointment: &Appointment) {
        let provider = match self.directory.get_provider(appointment.provider_id).await {
            Ok(provider) => provider,
            Err(e) => {
                warn!("Provider lookup for notifications failed: {}", e);
                None
            }
        };
        let doctor_name = provider
            .as_ref()
            .map(|p| p.display_name())
            .unwrap_or_else(|| "Médecin".to_string());
        let when = format!(
            "{} à {}",
            appointment.date.format("%d/%m/%Y"),
            appointment.time.format("%H:%M")
        );

        self.send(Notification {
            user_id: payment.patient_id,
            kind: NotificationKind::PaymentSuccess,
            title: "Paiement confirmé".to_string(),
            message: format!(
                "Votre paiement de {} FCFA a été reçu. Votre RDV avec {} est confirmé.",
                payment.amount, doctor_name
            ),
            data: json!({ "appointment_id": appointment.id, "amount": payment.amount }),
        })
        .await;

        if let Some(provider) = &provider {
            self.send(Notification {
                user_id: provider.user_id(),
                kind: NotificationKind::NewAppointment,
                title: "Nouveau RDV confirmé (payé)".to_string(),
                message: format!("Un patient a réservé le {}. Paiement reçu.", when),
                data: json!({
                    "appointment_id": appointment.id,
                    "patient_id": appointment.patient_id,
                }),
            })
            .await;
        }

        let Some(clinic_id) = appointment.clinic_id else {
            return;
        };
        let staff = match self.directory.list_clinic_staff(clinic_id).await {
            Ok(staff) => staff,
            Err(e) => {
                warn!("Clinic staff lookup for {} failed: {}", clinic_id, e);
                Vec::new()
            }
        };
        for user_id in staff {
            self.send(Notification {
                user_id,
                kind: NotificationKind::NewAppointment,
                title: "Nouveau RDV à traiter".to_string(),
                message: format!(
                    "Un patient a pris RDV avec {} le {}. Paiement effectué.",
                    doctor_name, when
                ),
                data: json!({ "appointment_id": appointment.id, "clinic_id": clinic_id }),
            })
            .await;
        }
    }

    async fn announce_failure(&self, payment: &Payment) {
        self.send(Notification {
            user_id: payment.patient_id,
            kind: NotificationKind::PaymentFailed,
            title: "Paiement échoué".to_string(),
            message: format!(
                "Votre paiement de {} FCFA n'a pas abouti. Vous pouvez réessayer.",
                payment.amount
            ),
            data: json!({
                "appointment_id": payment.appointment_id,
                "transaction_ref": payment.transaction_ref,
            }),
        })
        .await;
    }

    async fn send(&self, notification: Notification) {
        let user_id = notification.user_id;
        if let Err(e) = self.notifications.notify(notification).await {
            warn!("Notification to {} not delivered: {}", user_id, e);
        }
    }
}

fn unchanged(payment: Payment) -> ReconcileOutcome {
    ReconcileOutcome {
        payment,
        applied: false,
        appointment_confirmed: false,
    }
}
