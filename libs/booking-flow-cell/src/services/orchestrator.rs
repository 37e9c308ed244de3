use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, NaiveDate};
use tracing::{debug, info, warn};
use uuid::Uuid;

use appointment_cell::{
    AppointmentError, AppointmentLifecycleService, ReservationRequest, ReservationService,
};
use booking_queue_cell::{QueueError, QueuePositionCalculator};
use doctor_cell::{AvailabilityCalendar, AvailabilityError, DirectoryService, SlotView};
use payment_cell::{InitiatePayment, PaymentError, PaymentInitiation, ReconciliationService};
use shared_config::AppConfig;
use shared_database::Stores;
use shared_models::{
    Appointment, Clinic, ConsultationIntake, Payment, PaymentStatus, PaymentType, Provider,
};

use crate::error::OrchestratorError;
use crate::models::{
    deposit_amount, BookingChannel, CheckoutOutcome, CheckoutRequest, Confirmation,
    IntakeAnswers, PaymentChoice, SlotOffer, SlotSelection,
};

/// The booking sequence shared by every channel: calendar read, reservation,
/// deposit checkout, settlement, queue read. Channels differ only in how the
/// patient's choices are collected.
pub struct BookingOrchestrator {
    calendar: AvailabilityCalendar,
    directory: DirectoryService,
    reservations: ReservationService,
    lifecycle: AppointmentLifecycleService,
    reconciliation: Arc<ReconciliationService>,
    queue: QueuePositionCalculator,
    poll_interval: StdDuration,
    await_timeout: StdDuration,
}

impl BookingOrchestrator {
    pub fn new(stores: &Stores, reconciliation: Arc<ReconciliationService>, config: &AppConfig) -> Self {
        Self {
            calendar: AvailabilityCalendar::new(stores),
            directory: DirectoryService::new(stores),
            reservations: ReservationService::new(stores),
            lifecycle: AppointmentLifecycleService::new(stores),
            reconciliation,
            queue: QueuePositionCalculator::new(stores),
            poll_interval: StdDuration::from_secs(config.payment_poll_interval_secs),
            await_timeout: StdDuration::from_secs(config.payment_await_timeout_secs),
        }
    }

    pub fn with_timing(mut self, poll_interval: StdDuration, await_timeout: StdDuration) -> Self {
        self.poll_interval = poll_interval;
        self.await_timeout = await_timeout;
        self
    }

    pub async fn appointment(&self, appointment_id: Uuid) -> Result<Appointment, OrchestratorError> {
        Ok(self.lifecycle.get_appointment(appointment_id).await?)
    }

    pub async fn payment(&self, transaction_ref: &str) -> Result<Payment, OrchestratorError> {
        Ok(self.reconciliation.get_payment(transaction_ref).await?)
    }

    pub async fn clinics(&self) -> Result<Vec<Clinic>, OrchestratorError> {
        Ok(self.directory.list_clinics().await?)
    }

    /// The clinic's general practitioner, or `None` when it has no active doctor.
    pub async fn provider_for_clinic(&self, clinic_id: Uuid) -> Result<Option<Provider>, OrchestratorError> {
        match self.directory.default_provider_for_clinic(clinic_id).await {
            Ok(provider) => Ok(Some(provider)),
            Err(AvailabilityError::NoProviderInClinic(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Calendar read, restricted to the channel's booking horizon.
    pub async fn slots_for(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        channel: BookingChannel,
        today: NaiveDate,
    ) -> Result<Vec<SlotView>, OrchestratorError> {
        ensure_in_horizon(channel, today, date)?;
        self.directory.get_provider(provider_id).await?;
        Ok(self.calendar.get_slots(provider_id, date).await?)
    }

    /// Earliest free slots across the channel's horizon, at most `limit` of them.
    pub async fn upcoming_offers(
        &self,
        provider_id: Uuid,
        channel: BookingChannel,
        today: NaiveDate,
        limit: usize,
    ) -> Result<Vec<SlotOffer>, OrchestratorError> {
        let (first, last) = channel.window(today);
        let mut offers = Vec::new();
        let mut date = first;

        while date <= last && offers.len() < limit {
            let free = self.calendar.free_slots(provider_id, date).await?;
            offers.extend(
                free.into_iter()
                    .take(limit - offers.len())
                    .map(|time| SlotOffer { date, time }),
            );
            date += Duration::days(1);
        }

        debug!("{} offers for doctor {} from {}", offers.len(), provider_id, first);
        Ok(offers)
    }

    /// Reserves the slot and stores the intake answers when there are any.
    /// A lost race comes back with the provider's refreshed day; another slot
    /// is never picked on the patient's behalf.
    pub async fn reserve(
        &self,
        patient_id: Uuid,
        selection: SlotSelection,
        is_first_visit: bool,
        intake: Option<IntakeAnswers>,
    ) -> Result<Appointment, OrchestratorError> {
        let request = ReservationRequest {
            provider_id: selection.provider_id,
            patient_id,
            date: selection.date,
            time: selection.time,
            clinic_id: selection.clinic_id,
            is_first_visit,
        };

        let appointment = match self.reservations.reserve(request).await {
            Ok(appointment) => appointment,
            Err(AppointmentError::SlotTaken { date, time }) => {
                let available = self.calendar.get_slots(selection.provider_id, date).await?;
                return Err(OrchestratorError::SlotTaken { date, time, available });
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(answers) = intake {
            let intake = ConsultationIntake {
                appointment_id: appointment.id,
                patient_id,
                consultation_mode: answers.consultation_mode,
                reason: answers.reason,
                symptoms: answers.symptoms,
                notes: answers.notes,
                identity_confirmed: answers.identity_confirmed,
            };
            if let Err(e) = self.reservations.attach_intake(intake).await {
                warn!("Intake for appointment {} not saved: {}", appointment.id, e);
            }
        }

        Ok(appointment)
    }

    /// Opens a fresh deposit checkout for a reserved appointment. Used for the
    /// first attempt and for every retry after a gateway failure.
    pub async fn initiate_deposit(
        &self,
        appointment: &Appointment,
        choice: PaymentChoice,
    ) -> Result<PaymentInitiation, OrchestratorError> {
        let provider = self.directory.get_provider(appointment.provider_id).await?;
        self.reconciliation
            .initiate(InitiatePayment {
                appointment_id: appointment.id,
                patient_id: appointment.patient_id,
                amount: deposit_amount(&provider),
                payment_type: PaymentType::Deposit,
                gateway: choice.gateway,
                customer: choice.customer,
                return_url: choice.return_url,
            })
            .await
            .map_err(|source| OrchestratorError::PaymentNotOpened {
                appointment_id: appointment.id,
                source,
            })
    }

    pub async fn retry_payment(
        &self,
        appointment_id: Uuid,
        choice: PaymentChoice,
    ) -> Result<PaymentInitiation, OrchestratorError> {
        let appointment = self.appointment(appointment_id).await?;
        self.initiate_deposit(&appointment, choice).await
    }

    /// Manual flow: reserve, attach the intake, open the deposit checkout.
    pub async fn checkout(
        &self,
        request: CheckoutRequest,
        today: NaiveDate,
    ) -> Result<CheckoutOutcome, OrchestratorError> {
        let selection = request.selection;
        ensure_in_horizon(BookingChannel::Manual, today, selection.date)?;
        self.directory.get_provider(selection.provider_id).await?;

        let appointment = self
            .reserve(request.patient_id, selection, request.is_first_visit, request.intake)
            .await?;
        let initiation = self.initiate_deposit(&appointment, request.payment).await?;

        info!(
            "Checkout for appointment {} opened as {}",
            appointment.id, initiation.payment.transaction_ref
        );
        Ok(CheckoutOutcome {
            amount: initiation.payment.amount,
            appointment,
            payment: initiation.payment,
            redirect_url: initiation.redirect_url,
        })
    }

    /// One verify round against the gateway.
    pub async fn payment_status(&self, transaction_ref: &str) -> Result<PaymentStatus, OrchestratorError> {
        Ok(self.reconciliation.verify(transaction_ref).await?.payment.status)
    }

    /// Polls until the payment settles, then reads the queue for a confirmed booking.
    pub async fn await_confirmation(&self, transaction_ref: &str) -> Result<Confirmation, OrchestratorError> {
        let payment = match tokio::time::timeout(self.await_timeout, self.poll_until_settled(transaction_ref)).await {
            Ok(settled) => settled?,
            Err(_) => {
                warn!("Payment {} still pending after {:?}", transaction_ref, self.await_timeout);
                return Err(OrchestratorError::PaymentTimeout(transaction_ref.to_string()));
            }
        };

        let queue = if payment.status == PaymentStatus::Success {
            match self.queue.position(payment.appointment_id).await {
                Ok(snapshot) => Some(snapshot),
                Err(QueueError::NotQueued { .. }) => None,
                Err(e) => return Err(e.into()),
            }
        } else {
            None
        };

        Ok(Confirmation { payment, queue })
    }

    async fn poll_until_settled(&self, transaction_ref: &str) -> Result<Payment, OrchestratorError> {
        loop {
            match self.reconciliation.verify(transaction_ref).await {
                Ok(outcome) if outcome.payment.status.is_terminal() => return Ok(outcome.payment),
                Ok(_) => debug!("Payment {} still pending", transaction_ref),
                // Transient: the webhook may still settle it.
                Err(PaymentError::Gateway(e)) => {
                    warn!("Verify for {} failed, retrying: {}", transaction_ref, e)
                }
                Err(e) => return Err(e.into()),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

pub fn ensure_in_horizon(
    channel: BookingChannel,
    today: NaiveDate,
    date: NaiveDate,
) -> Result<(), OrchestratorError> {
    if channel.allows(today, date) {
        return Ok(());
    }
    let (first, last) = channel.window(today);
    Err(OrchestratorError::OutsideHorizon {
        channel,
        date,
        first,
        last,
    })
}
