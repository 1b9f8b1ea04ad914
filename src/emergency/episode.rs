//! Emergency episode record

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::TriggerReason;
use super::contacts::EmergencyContact;

/// Progress of an episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EpisodePhase {
    Triggered,
    Dialing,
    AwaitingAnswer,
    Answered,
    RetryScheduled,
    Resolved,
}

/// One emergency, from trigger to acknowledgement or cancellation
#[derive(Debug, Clone, Serialize)]
pub struct EmergencyEpisode {
    pub id: Uuid,
    pub reason: String,

    /// Started by a fall detector rather than by the user
    pub fall: bool,

    /// Dialing order
    pub contacts: Vec<EmergencyContact>,

    pub phase: EpisodePhase,

    /// Calls placed so far, across passes
    pub attempts: u32,

    /// Completed passes over the contact list
    pub passes: u32,

    pub started_at: DateTime<Utc>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub acknowledged: bool,
}

impl EmergencyEpisode {
    #[must_use]
    pub fn new(reason: &TriggerReason, contacts: Vec<EmergencyContact>) -> Self {
        Self {
            id: Uuid::new_v4(),
            reason: reason.describe().to_string(),
            fall: reason.is_fall(),
            contacts,
            phase: EpisodePhase::Triggered,
            attempts: 0,
            passes: 0,
            started_at: Utc::now(),
            last_attempt: None,
            acknowledged: false,
        }
    }

    pub(crate) fn begin_attempt(&mut self) {
        self.phase = EpisodePhase::Dialing;
        self.attempts += 1;
        self.last_attempt = Some(Utc::now());
    }

    pub(crate) fn schedule_retry(&mut self) {
        self.phase = EpisodePhase::RetryScheduled;
        self.passes += 1;
    }
}
