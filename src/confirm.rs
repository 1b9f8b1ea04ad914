//! Confirmation gate
//!
//! Asks the user to confirm a risky action and listens for a short window.
//! Anything other than a clear yes is a no.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::lexicon::{self, AFFIRMATIVE, NEGATIVE};
use crate::voice::{Announcer, SpeechRecognizer};

/// Default listening window
pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_millis(5000);

/// Longest listening window, used by emergency flows
pub const MAX_CONFIRM_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Interpretation of a confirmation reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationReply {
    Affirmative,
    Negative,
    /// Both or neither
    Ambiguous,
}

impl ConfirmationReply {
    /// Classify a reply by whole tokens; negatives are checked first
    #[must_use]
    pub fn classify(text: &str) -> Self {
        let normalized = lexicon::normalize(text);
        let negative = lexicon::contains_token(&normalized, NEGATIVE);
        let affirmative = lexicon::contains_token(&normalized, AFFIRMATIVE);

        match (negative, affirmative) {
            (true, false) => Self::Negative,
            (false, true) => Self::Affirmative,
            _ => Self::Ambiguous,
        }
    }

    #[must_use]
    pub const fn is_affirmative(self) -> bool {
        matches!(self, Self::Affirmative)
    }
}

/// Clears the pending window when the confirmation ends, however it ends
struct WindowGuard<'a> {
    slot: &'a Mutex<Option<CancellationToken>>,
}

impl Drop for WindowGuard<'_> {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Spoken yes/no gate with a single outstanding window
pub struct ConfirmationGate {
    announcer: Announcer,
    recognizer: Arc<dyn SpeechRecognizer>,
    pending: Mutex<Option<CancellationToken>>,
}

impl ConfirmationGate {
    #[must_use]
    pub fn new(announcer: Announcer, recognizer: Arc<dyn SpeechRecognizer>) -> Self {
        Self {
            announcer,
            recognizer,
            pending: Mutex::new(None),
        }
    }

    /// Speak `prompt`, then listen for up to `timeout` for a yes or no
    ///
    /// Returns true only for an unambiguous affirmative. Timeouts, silence,
    /// recognition errors and preemption all return false, as does a call
    /// made while another window is open.
    pub async fn confirm(&self, prompt: &str, timeout: Duration) -> bool {
        let token = {
            let mut slot = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_some() {
                tracing::warn!("confirmation already pending, rejecting");
                return false;
            }
            let token = CancellationToken::new();
            *slot = Some(token.clone());
            token
        };
        let _guard = WindowGuard {
            slot: &self.pending,
        };

        let timeout = timeout.min(MAX_CONFIRM_TIMEOUT);
        let reply = tokio::select! {
            () = token.cancelled() => {
                tracing::info!("confirmation preempted");
                return false;
            }
            reply = self.window(prompt, timeout) => reply,
        };

        let Some(reply) = reply else {
            tracing::info!("no confirmation reply, denying");
            return false;
        };

        let decision = ConfirmationReply::classify(&reply);
        tracing::info!(reply = %reply, decision = ?decision, "confirmation reply");
        decision.is_affirmative()
    }

    async fn window(&self, prompt: &str, timeout: Duration) -> Option<String> {
        if let Err(e) = self.announcer.say(prompt).await {
            tracing::warn!(error = %e, "confirmation prompt failed");
            return None;
        }

        match tokio::time::timeout(timeout, self.recognizer.listen(timeout)).await {
            Ok(Ok(reply)) => reply.filter(|r| !r.trim().is_empty()),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "confirmation capture failed");
                None
            }
            Err(_) => {
                self.recognizer.stop().await;
                None
            }
        }
    }

    /// Close the open window, resolving it to false
    ///
    /// Returns whether a window was open.
    pub fn preempt(&self) -> bool {
        let slot = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a window is open
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
