use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::OrchestratorError;
use crate::services::driver::{perform_backend, VoiceCaller};
use crate::services::orchestrator::BookingOrchestrator;
use crate::services::voice_flow::{VoiceEffect, VoiceEvent, VoiceFlow, VoiceFlowState, VoiceStep};

/// A session nobody replied to or polled for this long is dropped.
pub const SESSION_IDLE_MINUTES: i64 = 30;

/// What the client has to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Awaiting {
    /// Play the prompts, then post what the patient said.
    Reply,
    /// Send the patient to `redirect_url`, then poll the payment.
    Payment,
    /// The dialogue is over.
    Nothing,
}

/// Response to every voice session call.
#[derive(Debug, Clone, Serialize)]
pub struct VoiceTurn {
    pub session_id: Uuid,
    pub step: VoiceStep,
    pub prompts: Vec<String>,
    pub awaiting: Awaiting,
    pub redirect_url: Option<String>,
    pub appointment_id: Option<Uuid>,
    pub transaction_ref: Option<String>,
    pub error: Option<String>,
}

impl VoiceTurn {
    pub fn finished(&self) -> bool {
        self.awaiting == Awaiting::Nothing
    }
}

struct VoiceSession {
    caller: VoiceCaller,
    state: VoiceFlowState,
    awaiting: Awaiting,
    redirect_url: Option<String>,
    last_touched: DateTime<Utc>,
}

/// Voice dialogues driven over HTTP: the client does speech on its side and
/// posts transcripts. Sessions live in this process only and are dropped as
/// soon as the dialogue ends, is aborted or sits idle past `idle_timeout`.
pub struct VoiceSessionService {
    orchestrator: Arc<BookingOrchestrator>,
    flow: VoiceFlow,
    idle_timeout: Duration,
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<VoiceSession>>>>,
}

impl VoiceSessionService {
    pub fn new(orchestrator: Arc<BookingOrchestrator>) -> Self {
        Self {
            orchestrator,
            flow: VoiceFlow::new(),
            idle_timeout: Duration::minutes(SESSION_IDLE_MINUTES),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub async fn start(&self, caller: VoiceCaller, today: NaiveDate) -> VoiceTurn {
        let now = Utc::now();
        self.expire_idle(now).await;

        let session_id = Uuid::new_v4();
        let (state, effects) = self.flow.start();
        let mut session = VoiceSession {
            caller,
            state,
            awaiting: Awaiting::Nothing,
            redirect_url: None,
            last_touched: now,
        };

        let turn = self.run_effects(session_id, &mut session, effects, today).await;
        if !turn.finished() {
            self.sessions
                .write()
                .await
                .insert(session_id, Arc::new(Mutex::new(session)));
            info!("Voice session {} started", session_id);
        }
        turn
    }

    /// Patient the session books for.
    pub async fn owner(&self, session_id: Uuid) -> Result<Uuid, OrchestratorError> {
        let session = self.session(session_id).await?;
        let patient_id = session.lock().await.caller.patient_id;
        Ok(patient_id)
    }

    pub async fn reply(
        &self,
        session_id: Uuid,
        transcript: Option<String>,
        today: NaiveDate,
    ) -> Result<VoiceTurn, OrchestratorError> {
        let session = self.session(session_id).await?;
        let mut session = session.lock().await;
        session.last_touched = Utc::now();
        if session.awaiting != Awaiting::Reply {
            return Err(OrchestratorError::SessionNotWaiting {
                id: session_id,
                expected: "a reply",
            });
        }

        let heard = transcript.filter(|t| !t.trim().is_empty());
        let turn = self
            .apply(session_id, &mut session, VoiceEvent::Heard(heard), today)
            .await;
        drop(session);
        self.forget_if_finished(&turn).await;
        Ok(turn)
    }

    /// Asks the gateway once. The dialogue moves on only when the payment has settled.
    pub async fn poll_payment(
        &self,
        session_id: Uuid,
        today: NaiveDate,
    ) -> Result<VoiceTurn, OrchestratorError> {
        let session = self.session(session_id).await?;
        let mut session = session.lock().await;
        session.last_touched = Utc::now();
        let transaction_ref = match (&session.awaiting, &session.state.transaction_ref) {
            (Awaiting::Payment, Some(transaction_ref)) => transaction_ref.clone(),
            _ => {
                return Err(OrchestratorError::SessionNotWaiting {
                    id: session_id,
                    expected: "a payment",
                })
            }
        };

        let status = self.orchestrator.payment_status(&transaction_ref).await?;
        let turn = if status.is_terminal() {
            self.apply(session_id, &mut session, VoiceEvent::PaymentSettled(status), today)
                .await
        } else {
            debug!("Voice session {} payment still pending", session_id);
            snapshot(session_id, &session, Vec::new())
        };
        drop(session);
        self.forget_if_finished(&turn).await;
        Ok(turn)
    }

    /// Drops the session. An appointment already reserved stays `pending`.
    pub async fn abort(&self, session_id: Uuid) -> Result<(), OrchestratorError> {
        match self.sessions.write().await.remove(&session_id) {
            Some(_) => {
                info!("Voice session {} aborted", session_id);
                Ok(())
            }
            None => Err(OrchestratorError::SessionNotFound(session_id)),
        }
    }

    /// Drops sessions untouched since `now - idle_timeout`. A session busy with
    /// a call right now is kept. Runs on every `start`; returns how many went.
    pub async fn expire_idle(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.idle_timeout;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, session| match session.try_lock() {
            Ok(guard) if guard.last_touched < cutoff => {
                info!("Voice session {} expired after inactivity", id);
                false
            }
            _ => true,
        });
        before - sessions.len()
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn session(&self, session_id: Uuid) -> Result<Arc<Mutex<VoiceSession>>, OrchestratorError> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or(OrchestratorError::SessionNotFound(session_id))
    }

    async fn forget_if_finished(&self, turn: &VoiceTurn) {
        if turn.finished() {
            self.sessions.write().await.remove(&turn.session_id);
            info!("Voice session {} ended at {:?}", turn.session_id, turn.step);
        }
    }

    async fn apply(
        &self,
        session_id: Uuid,
        session: &mut VoiceSession,
        event: VoiceEvent,
        today: NaiveDate,
    ) -> VoiceTurn {
        let state = std::mem::take(&mut session.state);
        let (next, effects) = self.flow.advance(state, event);
        session.state = next;
        self.run_effects(session_id, session, effects, today).await
    }

    /// Runs effects until the dialogue needs the client again.
    async fn run_effects(
        &self,
        session_id: Uuid,
        session: &mut VoiceSession,
        effects: Vec<VoiceEffect>,
        today: NaiveDate,
    ) -> VoiceTurn {
        let mut prompts = Vec::new();
        let mut pending: VecDeque<VoiceEffect> = effects.into();
        session.awaiting = Awaiting::Nothing;

        while let Some(effect) = pending.pop_front() {
            match effect {
                VoiceEffect::Say { text } => prompts.push(text),
                VoiceEffect::Listen => session.awaiting = Awaiting::Reply,
                VoiceEffect::AwaitPayment { redirect_url, .. } => {
                    session.awaiting = Awaiting::Payment;
                    session.redirect_url = Some(redirect_url);
                }
                backend => {
                    if let Some(event) =
                        perform_backend(&self.orchestrator, &session.caller, &backend, today).await
                    {
                        let state = std::mem::take(&mut session.state);
                        let (next, more) = self.flow.advance(state, event);
                        session.state = next;
                        pending.extend(more);
                    }
                }
            }
        }

        snapshot(session_id, session, prompts)
    }
}

fn snapshot(session_id: Uuid, session: &VoiceSession, prompts: Vec<String>) -> VoiceTurn {
    VoiceTurn {
        session_id,
        step: session.state.step,
        prompts,
        awaiting: session.awaiting,
        redirect_url: session.redirect_url.clone(),
        appointment_id: session.state.appointment_id,
        transaction_ref: session.state.transaction_ref.clone(),
        error: session.state.error.clone(),
    }
}
