//! Assistant - the composition root
//!
//! Wires the governor, router, confirmation gate, emergency preemptor and
//! session state machine together around the platform collaborators, then
//! runs the session until shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::confirm::ConfirmationGate;
use crate::device::DeviceProfile;
use crate::emergency::{Dialer, EmergencyDeps, EmergencyPreemptor, LogNotifier, NotificationChannel};
use crate::executor::{ClockExecutor, ExecutorRegistry};
use crate::governor::ResourceGovernor;
use crate::intent::IntentKind;
use crate::router::{ConfidenceRouter, FeedbackSink, IntentModel, UnavailableModel};
use crate::session::{InteractionStateMachine, SessionDeps, StateHandle};
use crate::voice::{Announcer, SpeechRecognizer, SpeechSynthesizer, WakeDetector, WakeSignal};
use crate::{Error, Result};

/// How long running tasks get to finish on shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Pending wake events before new ones are dropped
const WAKE_QUEUE: usize = 8;

type WakeFactory = Box<dyn FnOnce(WakeSignal) -> Arc<dyn WakeDetector> + Send>;

/// Builder for an [`Assistant`]
pub struct AssistantBuilder {
    config: Config,
    profile: Option<DeviceProfile>,
    local: Arc<dyn IntentModel>,
    remote: Arc<dyn IntentModel>,
    wake: Option<WakeFactory>,
    recognizer: Option<Arc<dyn SpeechRecognizer>>,
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    dialer: Option<Arc<dyn Dialer>>,
    notifier: Arc<dyn NotificationChannel>,
    executors: ExecutorRegistry,
    feedback: Option<Arc<dyn FeedbackSink>>,
}

impl AssistantBuilder {
    /// Start from a configuration; both models default to unavailable
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            profile: None,
            local: Arc::new(UnavailableModel::new("local")),
            remote: Arc::new(UnavailableModel::new("remote")),
            wake: None,
            recognizer: None,
            synthesizer: None,
            dialer: None,
            notifier: Arc::new(LogNotifier),
            executors: ExecutorRegistry::new().with(IntentKind::ReadTime, Arc::new(ClockExecutor)),
            feedback: None,
        }
    }

    /// Use a fixed device profile instead of probing
    #[must_use]
    pub fn profile(mut self, profile: DeviceProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Set the on-device intent model
    #[must_use]
    pub fn local_model(mut self, model: Arc<dyn IntentModel>) -> Self {
        self.local = model;
        self
    }

    /// Set the cloud intent model
    #[must_use]
    pub fn remote_model(mut self, model: Arc<dyn IntentModel>) -> Self {
        self.remote = model;
        self
    }

    /// Set the wake detector, built around the session's wake signal
    #[must_use]
    pub fn wake_detector<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(WakeSignal) -> Arc<dyn WakeDetector> + Send + 'static,
    {
        self.wake = Some(Box::new(factory));
        self
    }

    #[must_use]
    pub fn recognizer(mut self, recognizer: Arc<dyn SpeechRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    #[must_use]
    pub fn synthesizer(mut self, synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    #[must_use]
    pub fn dialer(mut self, dialer: Arc<dyn Dialer>) -> Self {
        self.dialer = Some(dialer);
        self
    }

    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn NotificationChannel>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Register an executor, replacing the built-in one for that intent
    #[must_use]
    pub fn executor(
        mut self,
        intent: IntentKind,
        executor: Arc<dyn crate::executor::ActionExecutor>,
    ) -> Self {
        self.executors.register(intent, executor);
        self
    }

    /// Send routing feedback somewhere other than the in-memory log
    #[must_use]
    pub fn feedback_sink(mut self, sink: Arc<dyn FeedbackSink>) -> Self {
        self.feedback = Some(sink);
        self
    }

    /// Assemble the assistant
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if a required collaborator is missing
    pub fn build(self) -> Result<Assistant> {
        let missing = |what: &str| Error::Config(format!("{what} not configured"));
        let wake = self.wake.ok_or_else(|| missing("wake detector"))?;
        let recognizer = self.recognizer.ok_or_else(|| missing("speech recognizer"))?;
        let synthesizer = self.synthesizer.ok_or_else(|| missing("speech synthesizer"))?;
        let dialer = self.dialer.ok_or_else(|| missing("dialer"))?;

        let mut config = self.config;
        config.session.mode = config.mode;

        let profile = self
            .profile
            .unwrap_or_else(|| DeviceProfile::detect(config.tier));
        let governor = ResourceGovernor::new(&profile, &config.governor);

        let mut router = ConfidenceRouter::new(
            self.local,
            self.remote,
            governor.clone(),
            &profile,
            &config.router,
        );
        if let Some(sink) = self.feedback {
            router = router.with_feedback_sink(sink);
        }
        let router = Arc::new(router);

        let state = StateHandle::new();
        let announcer = Announcer::spawn(synthesizer);
        let gate = Arc::new(ConfirmationGate::new(
            announcer.clone(),
            Arc::clone(&recognizer),
        ));

        let preemptor = EmergencyPreemptor::new(
            config.emergency.clone(),
            config.mode,
            EmergencyDeps {
                dialer,
                notifier: self.notifier,
                governor: governor.clone(),
                gate: Arc::clone(&gate),
                announcer: announcer.clone(),
                state: state.clone(),
            },
        );

        let (signal, wake_rx) = WakeSignal::channel(WAKE_QUEUE);
        let wake = wake(signal.clone());

        let session = InteractionStateMachine::new(
            config.session.clone(),
            SessionDeps {
                state,
                governor: governor.clone(),
                router: Arc::clone(&router),
                gate,
                preemptor: preemptor.clone(),
                announcer,
                wake,
                recognizer,
                executors: Arc::new(self.executors),
            },
            (signal, wake_rx),
        );

        tracing::info!(
            tier = %profile.tier,
            senior = config.mode.senior,
            privacy = config.mode.privacy,
            "assistant assembled"
        );

        Ok(Assistant {
            config,
            profile,
            governor,
            router,
            preemptor,
            session,
        })
    }
}

/// A fully wired assistant
pub struct Assistant {
    config: Config,
    profile: DeviceProfile,
    governor: ResourceGovernor,
    router: Arc<ConfidenceRouter>,
    preemptor: EmergencyPreemptor,
    session: InteractionStateMachine,
}

impl Assistant {
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub const fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    #[must_use]
    pub const fn governor(&self) -> &ResourceGovernor {
        &self.governor
    }

    #[must_use]
    pub fn router(&self) -> &ConfidenceRouter {
        &self.router
    }

    #[must_use]
    pub const fn preemptor(&self) -> &EmergencyPreemptor {
        &self.preemptor
    }

    #[must_use]
    pub const fn session(&self) -> &InteractionStateMachine {
        &self.session
    }

    /// Run until Ctrl-C
    ///
    /// # Errors
    ///
    /// Returns error if the session fails to start
    pub async fn run(&self) -> Result<()> {
        let cancel = CancellationToken::new();

        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
                on_signal.cancel();
            }
        });

        self.run_until(cancel).await
    }

    /// Run until `cancel` fires, then drain the governor
    ///
    /// An active emergency is left running through the grace period.
    ///
    /// # Errors
    ///
    /// Returns error if the session fails to start
    pub async fn run_until(&self, cancel: CancellationToken) -> Result<()> {
        let result = self.session.run(cancel).await;

        if self.preemptor.is_active() {
            tracing::warn!("shutting down with an emergency in progress");
        }
        let aborted = self.governor.shutdown(SHUTDOWN_GRACE).await;
        if aborted > 0 {
            tracing::warn!(aborted, "tasks aborted at shutdown");
        }

        tracing::info!("assistant stopped");
        result
    }
}
