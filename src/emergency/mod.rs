//! Emergency preemption
//!
//! An emergency cuts into whatever the session is doing, moves it to
//! `EmergencyActive` and dials contacts in order until someone answers or the
//! user cancels. When a whole pass goes unanswered, the pass repeats after a
//! cooldown for as long as the episode stays active.

mod contacts;
mod episode;

pub use contacts::{
    AlertSignal, ContactKind, Dialer, EmergencyContact, LogNotifier, NotificationChannel,
    dial_order, regional_services,
};
pub use episode::{EmergencyEpisode, EpisodePhase};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::Result;
use crate::confirm::{ConfirmationGate, MAX_CONFIRM_TIMEOUT};
use crate::governor::{ResourceGovernor, TaskCategory};
use crate::intent::InteractionMode;
use crate::session::{ConversationState, StateHandle};
use crate::voice::Announcer;

/// Spoken when an episode starts
pub const EMERGENCY_ANNOUNCEMENT: &str = "حالة طوارئ! بنتصل بالطوارئ دلوقتي";

/// Spoken instead when a fall started the episode
pub const FALL_ANNOUNCEMENT: &str = "تم اكتشاف سقوط! بنتصل بالطوارئ دلوقتي";

/// Spoken when the guardian is being told
pub const GUARDIAN_ANNOUNCEMENT: &str = "ببلغ الوصي دلوقتي";

/// Spoken when dialing could not be started at all
pub const DIAL_UNAVAILABLE_ANNOUNCEMENT: &str = "مش قادر أتصل بالطوارئ، اتصل بـ123 بنفسك";

/// Spoken before each retry pass
pub const RETRY_ANNOUNCEMENT: &str = "بنحاول نتصل بأرقام الطوارئ تاني";

/// Asked before a non-forced trigger
pub const CONFIRM_EMERGENCY_PROMPT: &str = "عايزني أتصل بالطوارئ؟";

const DEFAULT_ALERT_MESSAGE: &str = "رسالة طوارئ: صاحب الرقم ده محتاج مساعدة حالا";

const DEFAULT_FALL_ALERT_MESSAGE: &str = "رسالة طوارئ: صاحب الرقم ده وقع ومحتاج مساعدة حالا";

/// What started an episode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerReason {
    /// The user asked for help; carries what was said
    Spoken(String),

    /// A fall detector fired
    Fall,
}

impl TriggerReason {
    #[must_use]
    pub const fn is_fall(&self) -> bool {
        matches!(self, Self::Fall)
    }

    /// Short description for logs, signals and the guardian
    #[must_use]
    pub fn describe(&self) -> &str {
        match self {
            Self::Spoken(text) => text.as_str(),
            Self::Fall => "سقوط",
        }
    }
}

impl From<&str> for TriggerReason {
    fn from(text: &str) -> Self {
        Self::Spoken(text.to_string())
    }
}

impl From<String> for TriggerReason {
    fn from(text: String) -> Self {
        Self::Spoken(text)
    }
}

/// Emergency tuning
#[derive(Debug, Clone)]
pub struct EmergencyConfig {
    /// User contacts, dialed first
    pub contacts: Vec<EmergencyContact>,

    /// Public services, dialed after the user contacts
    pub services: Vec<EmergencyContact>,

    /// How long to wait for a call to be answered
    pub answer_window: Duration,

    /// Pause between unanswered passes
    pub retry_cooldown: Duration,

    /// Listening window when a trigger needs confirmation
    pub confirm_timeout: Duration,

    /// Text alert sent to user contacts at the start of an episode
    pub alert_message: String,

    /// Alert text used instead when a fall started the episode
    pub fall_alert_message: String,

    /// Texted in senior mode; never dialed
    pub guardian: Option<EmergencyContact>,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            contacts: Vec::new(),
            services: regional_services(),
            answer_window: Duration::from_secs(15),
            retry_cooldown: Duration::from_secs(120),
            confirm_timeout: MAX_CONFIRM_TIMEOUT,
            alert_message: DEFAULT_ALERT_MESSAGE.to_string(),
            fall_alert_message: DEFAULT_FALL_ALERT_MESSAGE.to_string(),
            guardian: None,
        }
    }
}

/// Collaborators the preemptor drives
#[derive(Clone)]
pub struct EmergencyDeps {
    pub dialer: Arc<dyn Dialer>,
    pub notifier: Arc<dyn NotificationChannel>,
    pub governor: ResourceGovernor,
    pub gate: Arc<ConfirmationGate>,
    pub announcer: Announcer,
    pub state: StateHandle,
}

/// Result of a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A new episode started
    Started(Uuid),
    /// An episode was already running
    AlreadyActive(Uuid),
    /// The user did not confirm
    Declined,
    /// Dialing could not be scheduled; no episode is running
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Answered,
    Acknowledged,
    Cancelled,
    Unscheduled,
}

struct Run {
    id: Uuid,
    token: CancellationToken,
    answered: Arc<Notify>,
}

struct Inner {
    config: EmergencyConfig,
    mode: InteractionMode,
    deps: EmergencyDeps,
    active: AtomicBool,
    episode: Mutex<Option<EmergencyEpisode>>,
    run: Mutex<Option<Run>>,
}

impl Inner {
    fn update(&self, id: Uuid, f: impl FnOnce(&mut EmergencyEpisode)) {
        let mut slot = self.episode.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(episode) = slot.as_mut().filter(|e| e.id == id) {
            f(episode);
        }
    }

    /// Clear the episode, then release the session
    fn finish(&self, id: Uuid, resolution: Resolution) -> Option<EmergencyEpisode> {
        let mut episode = {
            let mut slot = self.episode.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.as_ref().is_none_or(|e| e.id != id) {
                return None;
            }
            slot.take()?
        };
        self.active.store(false, Ordering::SeqCst);

        {
            let mut run = self.run.lock().unwrap_or_else(PoisonError::into_inner);
            if run.as_ref().is_some_and(|r| r.id == id) {
                if let Some(run) = run.take() {
                    run.token.cancel();
                }
            }
        }

        episode.acknowledged = matches!(resolution, Resolution::Answered | Resolution::Acknowledged);
        episode.phase = EpisodePhase::Resolved;

        self.deps.notifier.signal(AlertSignal::Cleared { episode_id: id });

        let target = if self.deps.state.is_running() {
            ConversationState::AwaitingWake
        } else {
            ConversationState::Idle
        };
        self.deps
            .state
            .transition(ConversationState::EmergencyActive, target);

        tracing::info!(
            episode_id = %id,
            resolution = ?resolution,
            attempts = episode.attempts,
            passes = episode.passes,
            "emergency resolved"
        );

        Some(episode)
    }
}

/// Emergency interrupt path
#[derive(Clone)]
pub struct EmergencyPreemptor {
    inner: Arc<Inner>,
}

impl EmergencyPreemptor {
    #[must_use]
    pub fn new(config: EmergencyConfig, mode: InteractionMode, deps: EmergencyDeps) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                mode,
                deps,
                active: AtomicBool::new(false),
                episode: Mutex::new(None),
                run: Mutex::new(None),
            }),
        }
    }

    /// Start an emergency episode
    ///
    /// Unless `force` is set or the session is in senior or privacy mode,
    /// the user is asked to confirm first. A running episode is never
    /// restarted.
    pub async fn trigger(&self, reason: impl Into<TriggerReason>, force: bool) -> TriggerOutcome {
        let reason = reason.into();
        if let Some(id) = self.active_episode_id() {
            tracing::info!(episode_id = %id, "emergency already active");
            return TriggerOutcome::AlreadyActive(id);
        }

        if !force && !self.inner.mode.forces_local() {
            let gate = &self.inner.deps.gate;
            if gate.is_pending() {
                tracing::warn!("confirmation window busy, starting emergency unconfirmed");
            } else if !gate
                .confirm(CONFIRM_EMERGENCY_PROMPT, self.inner.config.confirm_timeout)
                .await
            {
                tracing::info!(reason = reason.describe(), "emergency not confirmed");
                return TriggerOutcome::Declined;
            }
        }

        self.start(&reason)
    }

    fn start(&self, reason: &TriggerReason) -> TriggerOutcome {
        let inner = &self.inner;
        let contacts = dial_order(&inner.config.contacts, &inner.config.services);
        let episode = EmergencyEpisode::new(reason, contacts.clone());
        let id = episode.id;

        {
            let mut slot = inner.episode.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(existing) = slot.as_ref() {
                return TriggerOutcome::AlreadyActive(existing.id);
            }
            inner.deps.state.force(ConversationState::EmergencyActive);
            *slot = Some(episode);
            inner.active.store(true, Ordering::SeqCst);
        }

        tracing::warn!(
            episode_id = %id,
            reason = reason.describe(),
            fall = reason.is_fall(),
            contacts = contacts.len(),
            "emergency triggered"
        );

        inner.deps.state.cancel_turn();
        inner.deps.gate.preempt();
        inner.deps.notifier.signal(AlertSignal::Started {
            episode_id: id,
            reason: reason.describe().to_string(),
        });

        let token = CancellationToken::new();
        let answered = Arc::new(Notify::new());
        *inner.run.lock().unwrap_or_else(PoisonError::into_inner) = Some(Run {
            id,
            token: token.clone(),
            answered: Arc::clone(&answered),
        });

        let notify_guardian = inner.mode.senior && inner.config.guardian.is_some();
        let announcements = Announcements {
            opening: if reason.is_fall() {
                FALL_ANNOUNCEMENT
            } else {
                EMERGENCY_ANNOUNCEMENT
            },
            guardian: notify_guardian,
        };
        let task = run_episode(Arc::clone(inner), id, contacts, announcements, token, answered);
        if let Err(e) = inner.deps.governor.submit_critical(TaskCategory::General, task) {
            tracing::error!(episode_id = %id, error = %e, "failed to schedule emergency dialing");
            inner.finish(id, Resolution::Unscheduled);
            inner.deps.announcer.announce(DIAL_UNAVAILABLE_ANNOUNCEMENT);
            return TriggerOutcome::Failed;
        }

        self.send_alerts(reason);
        if notify_guardian {
            self.notify_guardian(reason);
        }

        TriggerOutcome::Started(id)
    }

    fn send_alerts(&self, reason: &TriggerReason) {
        let inner = &self.inner;
        let message = if reason.is_fall() {
            &inner.config.fall_alert_message
        } else {
            &inner.config.alert_message
        };
        for contact in inner.config.contacts.iter().filter(|c| !c.number.trim().is_empty()) {
            self.send_text(contact.clone(), message.clone());
        }
    }

    fn notify_guardian(&self, reason: &TriggerReason) {
        let Some(guardian) = self.inner.config.guardian.clone() else {
            return;
        };
        if guardian.number.trim().is_empty() {
            tracing::warn!("guardian has no number, skipping notification");
            return;
        }
        tracing::info!(guardian = %guardian.name, "notifying guardian");
        self.send_text(guardian, guardian_message(reason, &chrono::Local::now()));
    }

    fn send_text(&self, contact: EmergencyContact, message: String) {
        let inner = &self.inner;
        let dialer = Arc::clone(&inner.deps.dialer);
        let submitted = inner
            .deps
            .governor
            .submit_critical(TaskCategory::Network, async move {
                if let Err(e) = dialer.send_alert(&contact, &message).await {
                    tracing::warn!(contact = %contact.name, error = %e, "emergency alert not sent");
                }
            });
        if let Err(e) = submitted {
            tracing::warn!(error = %e, "failed to schedule emergency alert");
        }
    }

    /// Stop the episode without acknowledgement
    pub fn cancel(&self) -> bool {
        self.resolve(Resolution::Cancelled)
    }

    /// The user confirmed they are safe
    pub fn acknowledge(&self) -> bool {
        self.resolve(Resolution::Acknowledged)
    }

    fn resolve(&self, resolution: Resolution) -> bool {
        self.active_episode_id()
            .and_then(|id| self.inner.finish(id, resolution))
            .is_some()
    }

    /// Deliver the external "call answered" signal
    pub fn report_answered(&self) -> bool {
        let run = self.inner.run.lock().unwrap_or_else(PoisonError::into_inner);
        match run.as_ref() {
            Some(run) => {
                run.answered.notify_one();
                true
            }
            None => false,
        }
    }

    /// Whether an episode is running
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Snapshot of the running episode
    #[must_use]
    pub fn episode(&self) -> Option<EmergencyEpisode> {
        self.inner
            .episode
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn active_episode_id(&self) -> Option<Uuid> {
        self.inner
            .episode
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|e| e.id)
    }
}

/// Text sent to the guardian
fn guardian_message(reason: &TriggerReason, at: &chrono::DateTime<chrono::Local>) -> String {
    format!(
        "تنبيه طوارئ\nالحدث: {}\nالوقت: {}\nمن فضلك اطمن عليه حالا",
        reason.describe(),
        at.format("%d/%m/%Y %H:%M")
    )
}

/// What the dial loop says before its first call
#[derive(Debug, Clone, Copy)]
struct Announcements {
    opening: &'static str,
    guardian: bool,
}

async fn run_episode(
    inner: Arc<Inner>,
    id: Uuid,
    contacts: Vec<EmergencyContact>,
    announcements: Announcements,
    token: CancellationToken,
    answered: Arc<Notify>,
) {
    inner.deps.announcer.interrupt().await;
    inner.deps.announcer.announce(announcements.opening);
    if announcements.guardian {
        inner.deps.announcer.announce(GUARDIAN_ANNOUNCEMENT);
    }

    if contacts.is_empty() {
        tracing::error!(episode_id = %id, "no emergency numbers configured");
    }

    loop {
        for contact in &contacts {
            if token.is_cancelled() || !inner.active.load(Ordering::SeqCst) {
                return;
            }

            inner.update(id, EmergencyEpisode::begin_attempt);
            tracing::info!(
                episode_id = %id,
                contact = %contact.name,
                number = %contact.number,
                "dialing emergency contact"
            );

            if let Err(e) = dial_with_retry(inner.deps.dialer.as_ref(), contact).await {
                tracing::error!(episode_id = %id, contact = %contact.name, error = %e, "emergency dial failed");
                continue;
            }

            inner.update(id, |e| e.phase = EpisodePhase::AwaitingAnswer);
            tokio::select! {
                () = token.cancelled() => return,
                () = answered.notified() => {
                    inner.update(id, |e| e.phase = EpisodePhase::Answered);
                    inner.finish(id, Resolution::Answered);
                    return;
                }
                () = tokio::time::sleep(inner.config.answer_window) => {
                    tracing::info!(episode_id = %id, contact = %contact.name, "no answer");
                }
            }
        }

        if token.is_cancelled() || !inner.active.load(Ordering::SeqCst) {
            return;
        }
        inner.update(id, EmergencyEpisode::schedule_retry);
        tracing::warn!(
            episode_id = %id,
            cooldown_secs = inner.config.retry_cooldown.as_secs(),
            "nobody answered, retrying after cooldown"
        );
        inner.deps.announcer.announce(RETRY_ANNOUNCEMENT);

        tokio::select! {
            () = token.cancelled() => return,
            () = answered.notified() => {
                inner.finish(id, Resolution::Answered);
                return;
            }
            () = tokio::time::sleep(inner.config.retry_cooldown) => {}
        }
    }
}

async fn dial_with_retry(dialer: &dyn Dialer, contact: &EmergencyContact) -> Result<()> {
    match dialer.dial(contact).await {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::warn!(contact = %contact.name, error = %e, "dial failed, retrying once");
            dialer.dial(contact).await
        }
    }
}
