//! Voice interaction state machine
//!
//! Cycles a session through wake → capture → resolution → optional
//! confirmation → execution → cooldown and back to waiting for the wake
//! phrase. Each wake starts one turn; the step out of `AwaitingWake` is the
//! single-flight gate, so wakes that arrive while a turn or an emergency
//! holds the session are dropped.
//!
//! A turn runs as its own task under a child cancellation token. Errors and
//! panics inside it end in a spoken apology and a return to `AwaitingWake`.
//! An emergency cancels the turn and owns the state until it resolves.

pub mod policy;
mod state;

pub use state::{ConversationState, StateHandle};

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::confirm::{ConfirmationGate, DEFAULT_CONFIRM_TIMEOUT};
use crate::emergency::EmergencyPreemptor;
use crate::executor::{ActionOutcome, ExecutorRegistry};
use crate::governor::{ResourceGovernor, TaskCategory};
use crate::intent::{IntentKind, IntentResult, InteractionMode, Utterance};
use crate::router::ConfidenceRouter;
use crate::voice::{Announcer, SpeechRecognizer, WakeDetector, WakeEvent, WakeSignal};
use crate::{Error, Result};

/// Session timing and mode
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Listening window for a command after the wake acknowledgement
    pub capture_timeout: Duration,

    /// Listening window for a yes/no
    pub confirm_timeout: Duration,

    /// Budget for one executor run
    pub execution_timeout: Duration,

    /// Pause after an action before listening for the wake phrase again
    pub cooldown: Duration,

    pub mode: InteractionMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capture_timeout: Duration::from_secs(8),
            confirm_timeout: DEFAULT_CONFIRM_TIMEOUT,
            execution_timeout: Duration::from_secs(10),
            cooldown: Duration::from_millis(1500),
            mode: InteractionMode::default(),
        }
    }
}

/// Collaborators a session drives
#[derive(Clone)]
pub struct SessionDeps {
    pub state: StateHandle,
    pub governor: ResourceGovernor,
    pub router: Arc<ConfidenceRouter>,
    pub gate: Arc<ConfirmationGate>,
    pub preemptor: EmergencyPreemptor,
    pub announcer: Announcer,
    pub wake: Arc<dyn WakeDetector>,
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub executors: Arc<ExecutorRegistry>,
}

struct Session {
    id: Uuid,
    config: SessionConfig,
    deps: SessionDeps,
    wake_signal: WakeSignal,
    wake_rx: Mutex<Option<mpsc::Receiver<WakeEvent>>>,
    wake_listening: AtomicBool,
}

/// Top-level coordinator for one voice session
#[derive(Clone)]
pub struct InteractionStateMachine {
    inner: Arc<Session>,
}

impl InteractionStateMachine {
    /// Create a session
    ///
    /// `wake_channel` is the pair from [`WakeSignal::channel`]; the signal
    /// half is the one handed to the wake detector.
    #[must_use]
    pub fn new(
        config: SessionConfig,
        deps: SessionDeps,
        wake_channel: (WakeSignal, mpsc::Receiver<WakeEvent>),
    ) -> Self {
        let (wake_signal, wake_rx) = wake_channel;
        Self {
            inner: Arc::new(Session {
                id: Uuid::new_v4(),
                config,
                deps,
                wake_signal,
                wake_rx: Mutex::new(Some(wake_rx)),
                wake_listening: AtomicBool::new(false),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> ConversationState {
        self.inner.deps.state.get()
    }

    /// Watch state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConversationState> {
        self.inner.deps.state.subscribe()
    }

    /// Handle wake detectors report through
    #[must_use]
    pub fn wake_signal(&self) -> WakeSignal {
        self.inner.wake_signal.clone()
    }

    #[must_use]
    pub fn mode(&self) -> InteractionMode {
        self.inner.config.mode
    }

    /// Run the session until `cancel` fires
    ///
    /// # Errors
    ///
    /// Returns error if the session is already running
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let inner = &self.inner;
        let mut wake_rx = inner
            .wake_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| Error::Config("session already running".to_string()))?;

        let state = &inner.deps.state;
        state.set_running(true);
        state.transition(ConversationState::Idle, ConversationState::AwaitingWake);

        let mut states = state.subscribe();
        let current = *states.borrow_and_update();
        inner.sync_wake_detector(current).await;

        tracing::info!(session_id = %inner.id, mode = ?inner.config.mode, "session started");

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                changed = states.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = *states.borrow_and_update();
                    inner.sync_wake_detector(current).await;
                }
                event = wake_rx.recv() => {
                    let Some(event) = event else {
                        tracing::warn!("wake channel closed");
                        break;
                    };
                    self.on_wake(event, &cancel);
                }
            }
        }

        state.cancel_turn();
        state.set_running(false);
        state.transition_from(
            &[
                ConversationState::AwaitingWake,
                ConversationState::CapturingCommand,
                ConversationState::ResolvingIntent,
                ConversationState::AwaitingConfirmation,
                ConversationState::Executing,
                ConversationState::Cooldown,
            ],
            ConversationState::Idle,
        );
        inner.sync_wake_detector(ConversationState::Idle).await;

        *inner.wake_rx.lock().unwrap_or_else(PoisonError::into_inner) = Some(wake_rx);
        tracing::info!(session_id = %inner.id, "session stopped");
        Ok(())
    }

    fn on_wake(&self, event: WakeEvent, cancel: &CancellationToken) {
        let state = &self.inner.deps.state;
        if !state.transition(ConversationState::AwaitingWake, ConversationState::CapturingCommand) {
            tracing::debug!(state = %state.get(), "wake ignored, session busy");
            return;
        }

        tracing::info!(session_id = %self.inner.id, at = %event.at, "wake detected");

        let token = cancel.child_token();
        state.begin_turn(token.clone());

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                () = token.cancelled() => None,
                result = AssertUnwindSafe(inner.turn(event.command)).catch_unwind() => Some(result),
            };

            match outcome {
                None => tracing::info!("turn cancelled"),
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(e))) => {
                    tracing::warn!(error = %e, "turn failed");
                    inner.apologize().await;
                }
                Some(Err(_)) => {
                    tracing::error!("turn panicked");
                    inner.apologize().await;
                }
            }

            inner.deps.state.end_turn();
            inner.deps.state.recover();
        });
    }
}

impl Session {
    /// Keep the wake detector listening exactly while the session awaits a wake
    async fn sync_wake_detector(&self, state: ConversationState) {
        let listen = state == ConversationState::AwaitingWake;
        if self.wake_listening.swap(listen, Ordering::SeqCst) == listen {
            return;
        }

        let result = if listen {
            self.deps.wake.start().await
        } else {
            self.deps.wake.stop().await
        };
        if let Err(e) = result {
            tracing::warn!(listen, error = %e, "wake detector toggle failed");
        }
    }

    async fn turn(&self, command: Option<String>) -> Result<()> {
        let state = &self.deps.state;
        let mode = self.config.mode;

        let Some(text) = self.capture(command).await? else {
            tracing::debug!("nothing captured");
            return Ok(());
        };

        let utterance = Utterance::new(text, self.id);
        if utterance.is_empty() {
            return Ok(());
        }
        if !state.transition(
            ConversationState::CapturingCommand,
            ConversationState::ResolvingIntent,
        ) {
            return Ok(());
        }

        let result = self.deps.router.resolve(&utterance, mode).await;
        tracing::info!(
            session_id = %self.id,
            intent = %result.intent,
            path = %result.path,
            confidence = result.confidence,
            "intent resolved"
        );

        if result.intent == IntentKind::Emergency {
            let outcome = self.deps.preemptor.trigger(utterance.raw.as_str(), true).await;
            tracing::info!(outcome = ?outcome, "emergency requested");
            return Ok(());
        }

        if mode.senior && !result.intent.allowed_in_senior_mode() {
            self.deps.announcer.say(policy::SENIOR_RESTRICTED).await?;
            return Ok(());
        }

        if !result.is_understood(policy::UNDERSTOOD_FLOOR) {
            self.deps.announcer.say(policy::NOT_UNDERSTOOD).await?;
            return Ok(());
        }

        if let Some(prompt) = policy::confirmation_prompt(&result) {
            if !state.transition(
                ConversationState::ResolvingIntent,
                ConversationState::AwaitingConfirmation,
            ) {
                return Ok(());
            }
            if !self
                .deps
                .gate
                .confirm(&prompt, self.config.confirm_timeout)
                .await
            {
                tracing::info!(intent = %result.intent, "action not confirmed");
                self.deps.announcer.say(policy::DECLINED).await?;
                return Ok(());
            }
        }

        if !state.transition_from(
            &[
                ConversationState::ResolvingIntent,
                ConversationState::AwaitingConfirmation,
            ],
            ConversationState::Executing,
        ) {
            return Ok(());
        }

        let outcome = match self.execute(&result).await {
            Ok(outcome) => outcome,
            Err(Error::NoExecutor(intent)) => {
                tracing::warn!(intent = %intent, "no executor registered");
                ActionOutcome::say(policy::UNSUPPORTED)
            }
            Err(e) => {
                tracing::warn!(intent = %result.intent, error = %e, "action failed");
                ActionOutcome::say(policy::APOLOGY)
            }
        };
        if let Some(spoken) = &outcome.spoken {
            self.deps.announcer.say(spoken).await?;
        }

        if state.transition(ConversationState::Executing, ConversationState::Cooldown) {
            tokio::time::sleep(self.config.cooldown).await;
        }
        Ok(())
    }

    /// The command spoken with the wake phrase, or one captured after prompting
    async fn capture(&self, command: Option<String>) -> Result<Option<String>> {
        if let Some(command) = command.filter(|c| !c.trim().is_empty()) {
            return Ok(Some(command));
        }

        self.deps
            .announcer
            .say(policy::wake_prompt(self.config.mode))
            .await?;

        let window = self.config.capture_timeout;
        let heard = match tokio::time::timeout(window, self.deps.recognizer.listen(window)).await
        {
            Ok(heard) => heard?,
            Err(_) => {
                self.deps.recognizer.stop().await;
                None
            }
        };
        Ok(heard.filter(|t| !t.trim().is_empty()))
    }

    async fn execute(&self, result: &IntentResult) -> Result<ActionOutcome> {
        let executor = self.deps.executors.get(result.intent)?;
        let intent = result.clone();
        let mut handle = self
            .deps
            .governor
            .submit(TaskCategory::General, async move {
                executor.execute(&intent).await
            })?;

        let budget = self.config.execution_timeout;
        match tokio::time::timeout(budget, &mut handle).await {
            Ok(joined) => joined.and_then(|executed| executed),
            Err(_) => {
                handle.abort();
                Err(Error::timeout(budget))
            }
        }
    }

    async fn apologize(&self) {
        if let Err(e) = self.deps.announcer.say(policy::APOLOGY).await {
            tracing::warn!(error = %e, "apology not spoken");
        }
    }
}
