use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::watch;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::OrchestratorError;
use crate::models::{BookingChannel, IntakeAnswers, PaymentChoice, VOICE_OFFER_LIMIT};
use crate::services::orchestrator::BookingOrchestrator;
use crate::services::voice_flow::{VoiceEffect, VoiceEvent, VoiceFlow, VoiceFlowState};

/// Speech synthesis and recognition, provided by the host application.
#[async_trait]
pub trait SpeechIo: Send + Sync {
    async fn speak(&self, text: &str) -> anyhow::Result<()>;

    async fn listen(&self) -> anyhow::Result<String>;

    /// Hands the hosted checkout page to the patient.
    async fn show_checkout(&self, _redirect_url: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Who the dialogue books for and how they pay.
#[derive(Debug, Clone)]
pub struct VoiceCaller {
    pub patient_id: Uuid,
    pub is_first_visit: bool,
    pub payment: PaymentChoice,
}

#[derive(Debug)]
pub enum VoiceRun {
    Finished(VoiceFlowState),
    /// Stopped by the patient. Whatever was reserved before that stays as is.
    Aborted,
}

/// Stops a running dialogue, including a speak or listen already in flight.
#[derive(Clone)]
pub struct AbortHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.sender.borrow()
    }
}

/// Runs the voice state machine in-process against a [`SpeechIo`].
pub struct VoiceBookingDriver {
    orchestrator: Arc<BookingOrchestrator>,
    speech: Arc<dyn SpeechIo>,
    flow: VoiceFlow,
    handle: AbortHandle,
    aborted: watch::Receiver<bool>,
}

impl VoiceBookingDriver {
    pub fn new(orchestrator: Arc<BookingOrchestrator>, speech: Arc<dyn SpeechIo>) -> Self {
        let (sender, aborted) = watch::channel(false);
        Self {
            orchestrator,
            speech,
            flow: VoiceFlow::new(),
            handle: AbortHandle {
                sender: Arc::new(sender),
            },
            aborted,
        }
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.handle.clone()
    }

    #[instrument(skip_all, fields(patient_id = %caller.patient_id))]
    pub async fn run(&self, caller: &VoiceCaller, today: NaiveDate) -> VoiceRun {
        let (mut state, effects) = self.flow.start();
        let mut pending: VecDeque<VoiceEffect> = effects.into();

        while let Some(effect) = pending.pop_front() {
            if self.handle.is_aborted() {
                return self.aborted_at(&state);
            }
            let Some(event) = self.interruptible(self.execute(caller, &effect, today)).await else {
                return self.aborted_at(&state);
            };
            if self.handle.is_aborted() {
                return self.aborted_at(&state);
            }

            if let Some(event) = event {
                let (next, more) = self.flow.advance(state, event);
                state = next;
                pending.extend(more);
            }
        }

        info!("Voice dialogue ended at {:?}", state.step);
        VoiceRun::Finished(state)
    }

    fn aborted_at(&self, state: &VoiceFlowState) -> VoiceRun {
        info!("Voice dialogue aborted at {:?}", state.step);
        VoiceRun::Aborted
    }

    /// `None` when the abort fired before `work` finished; `work` is dropped.
    async fn interruptible<F: Future>(&self, work: F) -> Option<F::Output> {
        let mut aborted = self.aborted.clone();
        tokio::select! {
            biased;
            _ = aborted.wait_for(|flag| *flag) => None,
            output = work => Some(output),
        }
    }

    async fn execute(
        &self,
        caller: &VoiceCaller,
        effect: &VoiceEffect,
        today: NaiveDate,
    ) -> Option<VoiceEvent> {
        match effect {
            VoiceEffect::Say { text } => {
                if let Err(e) = self.speech.speak(text).await {
                    warn!("Speech output failed: {}", e);
                }
                None
            }
            VoiceEffect::Listen => {
                let heard = match self.speech.listen().await {
                    Ok(transcript) if !transcript.trim().is_empty() => Some(transcript),
                    Ok(_) => None,
                    Err(e) => {
                        warn!("Speech input failed: {}", e);
                        None
                    }
                };
                Some(VoiceEvent::Heard(heard))
            }
            VoiceEffect::AwaitPayment {
                transaction_ref,
                redirect_url,
            } => {
                if let Err(e) = self.speech.show_checkout(redirect_url).await {
                    warn!("Could not show checkout {}: {}", redirect_url, e);
                }
                Some(match self.orchestrator.await_confirmation(transaction_ref).await {
                    Ok(confirmation) => VoiceEvent::PaymentSettled(confirmation.payment.status),
                    Err(e) => VoiceEvent::Failed(e.to_string()),
                })
            }
            backend => perform_backend(&self.orchestrator, caller, backend, today).await,
        }
    }
}

/// Runs an effect that only needs the booking services. Speech and payment
/// waiting belong to whoever drives the dialogue, so they yield `None` here.
pub(crate) async fn perform_backend(
    orchestrator: &BookingOrchestrator,
    caller: &VoiceCaller,
    effect: &VoiceEffect,
    today: NaiveDate,
) -> Option<VoiceEvent> {
    let event = match effect {
        VoiceEffect::FetchClinics => orchestrator.clinics().await.map(VoiceEvent::ClinicsLoaded),
        VoiceEffect::FindProvider { clinic_id } => orchestrator
            .provider_for_clinic(*clinic_id)
            .await
            .map(VoiceEvent::ProviderFound),
        VoiceEffect::FetchSlots { provider_id } => orchestrator
            .upcoming_offers(*provider_id, BookingChannel::Voice, today, VOICE_OFFER_LIMIT)
            .await
            .map(VoiceEvent::SlotsLoaded),
        VoiceEffect::Reserve { selection, mode } => {
            let intake = IntakeAnswers {
                consultation_mode: *mode,
                ..IntakeAnswers::default()
            };
            match orchestrator
                .reserve(caller.patient_id, *selection, caller.is_first_visit, Some(intake))
                .await
            {
                Ok(appointment) => Ok(VoiceEvent::Reserved(appointment.id)),
                Err(OrchestratorError::SlotTaken { .. }) => orchestrator
                    .upcoming_offers(selection.provider_id, BookingChannel::Voice, today, VOICE_OFFER_LIMIT)
                    .await
                    .map(VoiceEvent::SlotTaken),
                Err(e) => Err(e),
            }
        }
        VoiceEffect::InitiatePayment { appointment_id, .. } => orchestrator
            .retry_payment(*appointment_id, caller.payment.clone())
            .await
            .map(|initiation| VoiceEvent::PaymentOpened {
                transaction_ref: initiation.payment.transaction_ref,
                redirect_url: initiation.redirect_url,
            }),
        VoiceEffect::Say { .. } | VoiceEffect::Listen | VoiceEffect::AwaitPayment { .. } => {
            return None
        }
    };

    Some(event.unwrap_or_else(|e| {
        warn!("Voice booking step failed: {}", e);
        VoiceEvent::Failed(e.to_string())
    }))
}
