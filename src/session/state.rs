//! Conversation state cell
//!
//! One state per session, published through a watch channel. Transitions
//! are checked against the allowed edges and applied atomically, which makes
//! the step out of `AwaitingWake` the single-flight gate for a turn.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Where a session is in its interaction cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationState {
    Idle,
    AwaitingWake,
    CapturingCommand,
    ResolvingIntent,
    AwaitingConfirmation,
    Executing,
    EmergencyActive,
    Cooldown,
}

impl ConversationState {
    /// Whether `next` is a legal successor
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use ConversationState::{
            AwaitingConfirmation, AwaitingWake, CapturingCommand, Cooldown, EmergencyActive,
            Executing, Idle, ResolvingIntent,
        };

        // Preemption and shutdown are reachable from anywhere
        if matches!(next, EmergencyActive | Idle) {
            return true;
        }

        matches!(
            (self, next),
            (Idle | EmergencyActive | Cooldown, AwaitingWake)
                | (AwaitingWake, CapturingCommand)
                | (CapturingCommand, ResolvingIntent | AwaitingWake)
                | (
                    ResolvingIntent,
                    AwaitingConfirmation | Executing | AwaitingWake
                )
                | (AwaitingConfirmation, Executing | AwaitingWake)
                | (Executing, Cooldown | AwaitingWake)
        )
    }

    /// States in which a turn holds the session
    #[must_use]
    pub const fn is_busy(self) -> bool {
        matches!(
            self,
            Self::CapturingCommand
                | Self::ResolvingIntent
                | Self::AwaitingConfirmation
                | Self::Executing
                | Self::Cooldown
        )
    }

    /// Screaming-snake name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::AwaitingWake => "AWAITING_WAKE",
            Self::CapturingCommand => "CAPTURING_COMMAND",
            Self::ResolvingIntent => "RESOLVING_INTENT",
            Self::AwaitingConfirmation => "AWAITING_CONFIRMATION",
            Self::Executing => "EXECUTING",
            Self::EmergencyActive => "EMERGENCY_ACTIVE",
            Self::Cooldown => "COOLDOWN",
        }
    }
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared handle to a session's state
///
/// The state machine is the only writer apart from emergency preemption and
/// shutdown, which force their target state.
#[derive(Clone)]
pub struct StateHandle {
    tx: Arc<watch::Sender<ConversationState>>,
    turn: Arc<Mutex<Option<CancellationToken>>>,
    running: Arc<AtomicBool>,
}

impl StateHandle {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConversationState::Idle);
        Self {
            tx: Arc::new(tx),
            turn: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Current state
    #[must_use]
    pub fn get(&self) -> ConversationState {
        *self.tx.borrow()
    }

    /// Watch state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConversationState> {
        self.tx.subscribe()
    }

    /// Move `from` → `to` if the session is in `from` and the edge is legal
    pub fn transition(&self, from: ConversationState, to: ConversationState) -> bool {
        self.transition_from(&[from], to)
    }

    /// Move to `to` from any of `from`
    pub fn transition_from(&self, from: &[ConversationState], to: ConversationState) -> bool {
        let mut previous = None;
        let changed = self.tx.send_if_modified(|state| {
            if from.contains(state) && state.can_transition_to(to) {
                previous = Some(*state);
                *state = to;
                true
            } else {
                false
            }
        });

        if let Some(previous) = previous {
            tracing::debug!(from = %previous, to = %to, "state transition");
        }
        changed
    }

    /// Move to `to` unconditionally; returns the previous state
    pub fn force(&self, to: ConversationState) -> ConversationState {
        let previous = self.tx.send_replace(to);
        if previous != to {
            tracing::info!(from = %previous, to = %to, "state forced");
        }
        previous
    }

    /// Leave a failed or finished turn, unless an emergency took over
    pub fn recover(&self) -> bool {
        self.transition_from(
            &[
                ConversationState::CapturingCommand,
                ConversationState::ResolvingIntent,
                ConversationState::AwaitingConfirmation,
                ConversationState::Executing,
                ConversationState::Cooldown,
            ],
            ConversationState::AwaitingWake,
        )
    }

    /// Whether the state machine loop is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub(crate) fn begin_turn(&self, token: CancellationToken) {
        *self.turn.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    pub(crate) fn end_turn(&self) {
        *self.turn.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Cancel the in-flight turn, if any
    pub fn cancel_turn(&self) -> bool {
        let turn = self.turn.lock().unwrap_or_else(PoisonError::into_inner);
        match turn.as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

impl Default for StateHandle {
    fn default() -> Self {
        Self::new()
    }
}
