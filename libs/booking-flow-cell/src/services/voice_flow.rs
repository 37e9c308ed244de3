use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use shared_models::{Clinic, ConsultationMode, PaymentStatus, Provider};

use crate::models::{deposit_amount, SlotOffer, SlotSelection};
use crate::services::intent::{IntentParser, YesNo};

const TYPE_RETRIES: u8 = 2;
const CLINIC_ATTEMPTS: u8 = 3;
const SLOT_ATTEMPTS: u8 = 3;
const RECAP_ATTEMPTS: u8 = 2;

const GREETING: &str = "Bonjour. Voulez-vous prendre un rendez-vous médical ?";
const INTENT_REPROMPT: &str =
    "Je n'ai pas compris. Veuillez répondre par oui ou non. Voulez-vous prendre un rendez-vous ?";
const GOODBYE: &str = "D'accord. Au revoir et bonne journée.";
const SHORT_GOODBYE: &str = "D'accord. Au revoir.";
const TYPE_QUESTION: &str = "Préférez-vous une téléconsultation ou un rendez-vous au cabinet ?";
const TYPE_REPROMPT: &str = "Je n'ai pas compris. Dites \"vidéo\" pour une téléconsultation ou \"cabinet\" pour un rendez-vous physique.";
const NO_CLINIC: &str =
    "Désolé, aucun hôpital n'est disponible pour le moment. Veuillez réessayer plus tard.";
const CLINIC_QUESTION: &str = "Dans quel hôpital souhaitez-vous prendre rendez-vous ?";
const CLINIC_GIVE_UP: &str = "Je suis désolé, je n'arrive pas à identifier l'hôpital. Veuillez contacter le secrétariat.";
const SLOT_REPROMPT: &str = "Je n'ai pas compris votre choix. Vous pouvez dire le numéro, par exemple : le premier, ou le jour et l'heure, par exemple : lundi à neuf heures.";
const SLOT_GIVE_UP: &str = "Je suis désolé, je n'arrive pas à comprendre votre choix. Veuillez réessayer ou contacter le secrétariat.";
const YES_OR_NO: &str = "Veuillez répondre par oui ou non.";
const OTHER_SLOT: &str = "Très bien, cherchons un autre créneau.";
const CANCELLED: &str = "Le rendez-vous a été annulé. Au revoir.";
const SLOT_JUST_TAKEN: &str = "Ce créneau vient d'être réservé par quelqu'un d'autre.";
const REDIRECT: &str = "Vous allez maintenant être redirigé vers l'écran de paiement. Veuillez suivre les instructions à l'écran.";
const PAYMENT_FAILED: &str = "Le paiement n'a pas abouti. Votre créneau reste réservé, vous pouvez réessayer le paiement ou contacter le secrétariat.";
const GENERIC_ERROR: &str =
    "Une erreur s'est produite. Veuillez réessayer ou contacter le secrétariat.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceStep {
    #[default]
    Idle,
    /// First yes/no question.
    Greeting,
    /// The single re-ask after an unclear answer to the greeting.
    ConfirmIntent,
    SelectType,
    SelectProviderScope,
    FindProvider,
    ListSlots,
    SelectSlot,
    Recap,
    ConfirmPayment,
    Reserving,
    AwaitGateway,
    Done,
    Error,
}

impl VoiceStep {
    /// Steps a dialogue ends in. `Idle` is also where a declined dialogue lands.
    pub fn is_exit(self) -> bool {
        matches!(self, VoiceStep::Idle | VoiceStep::Done | VoiceStep::Error)
    }
}

/// The dialogue so far: current step plus everything chosen along the way.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VoiceFlowState {
    pub step: VoiceStep,
    /// Failed answers at the current step.
    pub attempts: u8,
    pub mode: ConsultationMode,
    #[serde(skip)]
    pub clinics: Vec<Clinic>,
    pub clinic: Option<Clinic>,
    pub provider: Option<Provider>,
    pub offers: Vec<SlotOffer>,
    pub slot: Option<SlotOffer>,
    pub appointment_id: Option<Uuid>,
    pub transaction_ref: Option<String>,
    pub error: Option<String>,
}

/// Something that happened outside the state machine.
#[derive(Debug, Clone)]
pub enum VoiceEvent {
    Start,
    /// A transcript, or `None` when nothing usable was heard.
    Heard(Option<String>),
    ClinicsLoaded(Vec<Clinic>),
    ProviderFound(Option<Provider>),
    SlotsLoaded(Vec<SlotOffer>),
    Reserved(Uuid),
    /// Someone else got the slot first. Carries freshly read offers.
    SlotTaken(Vec<SlotOffer>),
    PaymentOpened {
        transaction_ref: String,
        redirect_url: String,
    },
    PaymentSettled(PaymentStatus),
    Failed(String),
}

/// Work the state machine asks its driver to do, in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum VoiceEffect {
    Say { text: String },
    Listen,
    FetchClinics,
    FindProvider { clinic_id: Uuid },
    FetchSlots { provider_id: Uuid },
    Reserve {
        #[serde(skip)]
        selection: SlotSelection,
        mode: ConsultationMode,
    },
    InitiatePayment { appointment_id: Uuid, amount: i64 },
    AwaitPayment {
        transaction_ref: String,
        redirect_url: String,
    },
}

fn say(text: impl Into<String>) -> VoiceEffect {
    VoiceEffect::Say { text: text.into() }
}

pub type Transition = (VoiceFlowState, Vec<VoiceEffect>);

/// Pure transition function of the voice booking dialogue. No I/O happens
/// here: each call takes the current state by value and returns the next one
/// with the effects to run.
#[derive(Default)]
pub struct VoiceFlow {
    parser: IntentParser,
}

impl VoiceFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) -> Transition {
        self.advance(VoiceFlowState::default(), VoiceEvent::Start)
    }

    pub fn advance(&self, state: VoiceFlowState, event: VoiceEvent) -> Transition {
        use VoiceEvent as E;
        use VoiceStep as S;

        match (state.step, event) {
            (S::Idle, E::Start) => (
                VoiceFlowState {
                    step: S::Greeting,
                    ..VoiceFlowState::default()
                },
                vec![say(GREETING), VoiceEffect::Listen],
            ),

            (step, E::Failed(reason)) if !step.is_exit() => {
                debug!("Voice dialogue failed at {:?}: {}", step, reason);
                error(state, GENERIC_ERROR.to_string(), reason)
            }

            (S::Greeting, E::Heard(answer)) => match self.yes_no(answer) {
                Some(YesNo::Yes) => ask_type(state),
                Some(YesNo::No) => idle(GOODBYE),
                None => with_step(state, S::ConfirmIntent, vec![say(INTENT_REPROMPT), VoiceEffect::Listen]),
            },

            (S::ConfirmIntent, E::Heard(answer)) => match self.yes_no(answer) {
                Some(YesNo::Yes) => ask_type(state),
                _ => idle(SHORT_GOODBYE),
            },

            (S::SelectType, E::Heard(answer)) => {
                match answer.as_deref().and_then(|t| self.parser.consultation_mode(t)) {
                    Some(mode) => choose_mode(state, mode),
                    None if state.attempts < TYPE_RETRIES => {
                        retry(state, vec![say(TYPE_REPROMPT), VoiceEffect::Listen])
                    }
                    // Still unclear after the re-asks: book at the practice.
                    None => choose_mode(state, ConsultationMode::InPerson),
                }
            }

            (S::SelectProviderScope, E::ClinicsLoaded(clinics)) => {
                if clinics.is_empty() {
                    return error(state, NO_CLINIC.to_string(), "no clinic available".to_string());
                }
                let state = VoiceFlowState { clinics, ..state };
                (state, vec![say(CLINIC_QUESTION), VoiceEffect::Listen])
            }

            (S::SelectProviderScope, E::Heard(answer)) => {
                let picked = answer
                    .as_deref()
                    .and_then(|t| self.parser.match_clinic(t, &state.clinics))
                    .cloned();
                match picked {
                    Some(clinic) => {
                        let clinic_id = clinic.id;
                        let state = VoiceFlowState {
                            step: S::FindProvider,
                            attempts: 0,
                            clinic: Some(clinic),
                            ..state
                        };
                        (state, vec![VoiceEffect::FindProvider { clinic_id }])
                    }
                    None if state.attempts + 1 < CLINIC_ATTEMPTS => {
                        let names = state
                            .clinics
                            .iter()
                            .take(3)
                            .map(|c| c.name.as_str())
                            .collect::<Vec<_>>()
                            .join(", ");
                        let prompt = format!(
                            "Je n'ai pas compris. Les hôpitaux disponibles sont : {}. Veuillez répéter.",
                            names
                        );
                        retry(state, vec![say(prompt), VoiceEffect::Listen])
                    }
                    None => error(state, CLINIC_GIVE_UP.to_string(), "clinic not identified".to_string()),
                }
            }

            (S::FindProvider, E::ProviderFound(found)) => match found {
                Some(provider) => {
                    let provider_id = provider.id;
                    let state = VoiceFlowState {
                        step: S::ListSlots,
                        provider: Some(provider),
                        ..state
                    };
                    (state, vec![VoiceEffect::FetchSlots { provider_id }])
                }
                None => {
                    let message = format!(
                        "Aucun médecin n'est disponible à {}. Veuillez choisir un autre hôpital ou réessayer plus tard.",
                        clinic_name(&state)
                    );
                    error(state, message, "no provider in clinic".to_string())
                }
            },

            (S::ListSlots, E::SlotsLoaded(offers)) => offer_slots(state, offers, None),

            (S::SelectSlot, E::Heard(answer)) => {
                let choice = answer
                    .as_deref()
                    .and_then(|t| self.parser.slot_choice(t, &state.offers));
                match choice {
                    Some(index) => {
                        let state = VoiceFlowState {
                            step: S::Recap,
                            attempts: 0,
                            slot: state.offers.get(index).copied(),
                            ..state
                        };
                        let recap = recap(&state);
                        (state, vec![say(recap), VoiceEffect::Listen])
                    }
                    None if state.attempts + 1 < SLOT_ATTEMPTS => {
                        retry(state, vec![say(SLOT_REPROMPT), VoiceEffect::Listen])
                    }
                    None => error(state, SLOT_GIVE_UP.to_string(), "slot choice not understood".to_string()),
                }
            }

            (S::Recap, E::Heard(answer)) => match self.yes_no(answer) {
                Some(YesNo::Yes) => {
                    let amount = state.provider.as_ref().map(deposit_amount).unwrap_or_default();
                    let prompt = format!(
                        "Pour confirmer cette consultation, vous devez payer la somme de {} francs. Voulez-vous continuer ?",
                        amount
                    );
                    with_step(state, S::ConfirmPayment, vec![say(prompt), VoiceEffect::Listen])
                }
                Some(YesNo::No) => {
                    let Some(provider_id) = state.provider.as_ref().map(|p| p.id) else {
                        return error(state, GENERIC_ERROR.to_string(), "provider missing".to_string());
                    };
                    let state = VoiceFlowState { slot: None, ..state };
                    with_step(
                        state,
                        S::ListSlots,
                        vec![say(OTHER_SLOT), VoiceEffect::FetchSlots { provider_id }],
                    )
                }
                None if state.attempts + 1 < RECAP_ATTEMPTS => {
                    let prompt = format!("{} {}", YES_OR_NO, recap(&state));
                    retry(state, vec![say(prompt), VoiceEffect::Listen])
                }
                None => error(state, GENERIC_ERROR.to_string(), "recap not confirmed".to_string()),
            },

            (S::ConfirmPayment, E::Heard(answer)) => match self.yes_no(answer) {
                Some(YesNo::Yes) => {
                    let Some(selection) = selection(&state) else {
                        return error(state, GENERIC_ERROR.to_string(), "incomplete selection".to_string());
                    };
                    let mode = state.mode;
                    with_step(state, S::Reserving, vec![VoiceEffect::Reserve { selection, mode }])
                }
                _ => idle(CANCELLED),
            },

            (S::Reserving, E::Reserved(appointment_id)) => {
                let amount = state.provider.as_ref().map(deposit_amount).unwrap_or_default();
                let state = VoiceFlowState {
                    appointment_id: Some(appointment_id),
                    ..state
                };
                (state, vec![VoiceEffect::InitiatePayment { appointment_id, amount }])
            }

            (S::Reserving, E::SlotTaken(offers)) => {
                let state = VoiceFlowState { slot: None, ..state };
                offer_slots(state, offers, Some(SLOT_JUST_TAKEN))
            }

            (S::Reserving, E::PaymentOpened { transaction_ref, redirect_url }) => {
                let state = VoiceFlowState {
                    step: S::AwaitGateway,
                    transaction_ref: Some(transaction_ref.clone()),
                    ..state
                };
                (
                    state,
                    vec![say(REDIRECT), VoiceEffect::AwaitPayment { transaction_ref, redirect_url }],
                )
            }

            (S::AwaitGateway, E::PaymentSettled(PaymentStatus::Success)) => {
                let message = format!(
                    "Votre paiement a été effectué avec succès. Votre rendez-vous est maintenant confirmé à l'hôpital {}, le {}. Merci.",
                    clinic_name(&state),
                    state.slot.map(|s| s.label()).unwrap_or_default()
                );
                with_step(state, S::Done, vec![say(message)])
            }

            (S::AwaitGateway, E::PaymentSettled(PaymentStatus::Failed)) => {
                error(state, PAYMENT_FAILED.to_string(), "payment failed".to_string())
            }

            (step, event) => {
                debug!("Voice dialogue ignores {:?} at {:?}", event, step);
                (state, Vec::new())
            }
        }
    }

    fn yes_no(&self, answer: Option<String>) -> Option<YesNo> {
        answer.as_deref().and_then(|t| self.parser.yes_no(t))
    }
}

fn with_step(state: VoiceFlowState, step: VoiceStep, effects: Vec<VoiceEffect>) -> Transition {
    (
        VoiceFlowState {
            step,
            attempts: 0,
            ..state
        },
        effects,
    )
}

fn retry(state: VoiceFlowState, effects: Vec<VoiceEffect>) -> Transition {
    let attempts = state.attempts + 1;
    (VoiceFlowState { attempts, ..state }, effects)
}

/// The patient declined: nothing was reserved, nothing is kept.
fn idle(farewell: &str) -> Transition {
    (VoiceFlowState::default(), vec![say(farewell)])
}

fn error(state: VoiceFlowState, spoken: String, reason: String) -> Transition {
    (
        VoiceFlowState {
            step: VoiceStep::Error,
            error: Some(reason),
            ..state
        },
        vec![say(spoken)],
    )
}

fn ask_type(state: VoiceFlowState) -> Transition {
    with_step(state, VoiceStep::SelectType, vec![say(TYPE_QUESTION), VoiceEffect::Listen])
}

fn choose_mode(state: VoiceFlowState, mode: ConsultationMode) -> Transition {
    let ack = match mode {
        ConsultationMode::Video => "Entendu, une téléconsultation.",
        ConsultationMode::InPerson => "Entendu, rendez-vous au cabinet.",
    };
    let state = VoiceFlowState {
        mode,
        clinics: Vec::new(),
        ..state
    };
    with_step(state, VoiceStep::SelectProviderScope, vec![say(ack), VoiceEffect::FetchClinics])
}

fn offer_slots(state: VoiceFlowState, offers: Vec<SlotOffer>, preface: Option<&str>) -> Transition {
    if offers.is_empty() {
        let message = format!(
            "Le médecin de {} n'a pas de créneaux disponibles. Veuillez réessayer plus tard.",
            clinic_name(&state)
        );
        return error(state, message, "no free slot".to_string());
    }

    let listing = offers
        .iter()
        .enumerate()
        .map(|(i, offer)| format!("{}. {}", i + 1, offer.label()))
        .collect::<Vec<_>>()
        .join(", ");
    let mut prompt = format!(
        "Le médecin est disponible aux dates suivantes : {}. Quelle date vous convient ?",
        listing
    );
    if let Some(preface) = preface {
        prompt = format!("{} {}", preface, prompt);
    }

    let state = VoiceFlowState { offers, ..state };
    with_step(state, VoiceStep::SelectSlot, vec![say(prompt), VoiceEffect::Listen])
}

fn recap(state: &VoiceFlowState) -> String {
    let mode = match state.mode {
        ConsultationMode::Video => "en téléconsultation",
        ConsultationMode::InPerson => "au cabinet",
    };
    let doctor = state
        .provider
        .as_ref()
        .map(|p| p.display_name())
        .unwrap_or_else(|| "un médecin".to_string());
    format!(
        "Vous souhaitez prendre un rendez-vous {} à l'hôpital {}, avec {}, le {}. Est-ce bien cela ?",
        mode,
        clinic_name(state),
        doctor,
        state.slot.map(|s| s.label()).unwrap_or_default()
    )
}

fn clinic_name(state: &VoiceFlowState) -> &str {
    state.clinic.as_ref().map(|c| c.name.as_str()).unwrap_or("l'hôpital")
}

fn selection(state: &VoiceFlowState) -> Option<SlotSelection> {
    let provider = state.provider.as_ref()?;
    let slot = state.slot?;
    Some(SlotSelection {
        provider_id: provider.id,
        clinic_id: state.clinic.as_ref().map(|c| c.id),
        date: slot.date,
        time: slot.time,
    })
}
