//! Shared test utilities
//!
//! Scripted stand-ins for every platform collaborator, plus a harness that
//! wires the real components around them with short timeouts.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use rafiq::confirm::ConfirmationGate;
use rafiq::emergency::{
    AlertSignal, Dialer, EmergencyConfig, EmergencyContact, EmergencyDeps, EmergencyPreemptor,
    NotificationChannel, regional_services,
};
use rafiq::executor::{ActionExecutor, ActionOutcome, ExecutorRegistry};
use rafiq::governor::{GovernorConfig, ResourceGovernor};
use rafiq::router::{ConfidenceRouter, IntentModel, ModelOutput, RouterConfig, UnavailableModel};
use rafiq::session::{ConversationState, InteractionStateMachine, SessionConfig, SessionDeps, StateHandle};
use rafiq::voice::{Announcer, SpeechRecognizer, SpeechSynthesizer, WakeDetector, WakeSignal};
use rafiq::{DeviceProfile, DeviceTier, Error, IntentKind, IntentResult, InteractionMode, Result};

/// Poll `condition` until it holds or two seconds pass
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Session timings short enough for tests
#[must_use]
pub fn fast_session(mode: InteractionMode) -> SessionConfig {
    SessionConfig {
        capture_timeout: Duration::from_millis(200),
        confirm_timeout: Duration::from_millis(200),
        execution_timeout: Duration::from_secs(1),
        cooldown: Duration::from_millis(10),
        mode,
    }
}

/// One personal contact plus the regional services, with short windows
#[must_use]
pub fn fast_emergency() -> EmergencyConfig {
    EmergencyConfig {
        contacts: vec![EmergencyContact::personal("ابني", "01001234567")],
        services: regional_services(),
        answer_window: Duration::from_millis(40),
        retry_cooldown: Duration::from_millis(40),
        confirm_timeout: Duration::from_millis(200),
        alert_message: "محتاج مساعدة".to_string(),
        fall_alert_message: "وقع ومحتاج مساعدة".to_string(),
        guardian: None,
    }
}

/// Recognizer that replays a script
///
/// `None` entries, and listens past the end of the script, are silence
/// lasting the whole window.
#[derive(Default)]
pub struct ScriptedRecognizer {
    replies: Mutex<VecDeque<Option<String>>>,
    state: Mutex<Option<StateHandle>>,
    states: Mutex<Vec<ConversationState>>,
    listens: AtomicUsize,
}

impl ScriptedRecognizer {
    #[must_use]
    pub fn new(script: &[Option<&str>]) -> Arc<Self> {
        let recognizer = Self::default();
        for reply in script {
            recognizer.push(*reply);
        }
        Arc::new(recognizer)
    }

    pub fn push(&self, reply: Option<&str>) {
        self.replies
            .lock()
            .unwrap()
            .push_back(reply.map(ToString::to_string));
    }

    /// Record the session state at every listen
    pub fn observe(&self, state: StateHandle) {
        *self.state.lock().unwrap() = Some(state);
    }

    pub fn listens(&self) -> usize {
        self.listens.load(Ordering::SeqCst)
    }

    pub fn states(&self) -> Vec<ConversationState> {
        self.states.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechRecognizer for ScriptedRecognizer {
    async fn listen(&self, timeout: Duration) -> Result<Option<String>> {
        self.listens.fetch_add(1, Ordering::SeqCst);
        if let Some(state) = self.state.lock().unwrap().as_ref() {
            self.states.lock().unwrap().push(state.get());
        }

        let reply = self.replies.lock().unwrap().pop_front().flatten();
        match reply {
            Some(text) => Ok(Some(text)),
            None => {
                tokio::time::sleep(timeout).await;
                Ok(None)
            }
        }
    }
}

/// Synthesizer that records what was said
#[derive(Default)]
pub struct RecordingSynth {
    spoken: Mutex<Vec<String>>,
    stops: AtomicUsize,
}

impl RecordingSynth {
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn said(&self, text: &str) -> bool {
        self.spoken.lock().unwrap().iter().any(|s| s == text)
    }

    pub fn count(&self, text: &str) -> usize {
        self.spoken.lock().unwrap().iter().filter(|s| *s == text).count()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for RecordingSynth {
    async fn speak(&self, text: &str) -> Result<()> {
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Intent model with a fixed behavior
pub struct ScriptedModel {
    name: String,
    ready: bool,
    output: Option<ModelOutput>,
    delay: Duration,
    /// Fail every n-th call when set
    fail_every: Option<usize>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    #[must_use]
    pub fn answering(name: &str, label: &str, confidence: f32) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            ready: true,
            output: Some(ModelOutput::new(label, confidence)),
            delay: Duration::ZERO,
            fail_every: None,
            calls: AtomicUsize::new(0),
        })
    }

    /// Loaded, but every call errors
    #[must_use]
    pub fn failing(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            ready: true,
            output: None,
            delay: Duration::ZERO,
            fail_every: None,
            calls: AtomicUsize::new(0),
        })
    }

    #[must_use]
    pub fn slow(name: &str, label: &str, confidence: f32, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            ready: true,
            output: Some(ModelOutput::new(label, confidence)),
            delay,
            fail_every: None,
            calls: AtomicUsize::new(0),
        })
    }

    /// Answers, except on every `n`-th call
    #[must_use]
    pub fn flaky(name: &str, label: &str, confidence: f32, n: usize) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            ready: true,
            output: Some(ModelOutput::new(label, confidence)),
            delay: Duration::ZERO,
            fail_every: Some(n),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IntentModel for ScriptedModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    async fn analyze(&self, _text: &str) -> Result<ModelOutput> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_every.is_some_and(|n| call % n == 0) {
            return Err(Error::ModelUnavailable(self.name.clone()));
        }
        self.output
            .clone()
            .ok_or_else(|| Error::ModelUnavailable(self.name.clone()))
    }
}

/// Dialer that records calls and can fail chosen numbers
#[derive(Default)]
pub struct RecordingDialer {
    dialed: Mutex<Vec<String>>,
    alerts: Mutex<Vec<(String, String)>>,
    failing: HashSet<String>,
}

impl RecordingDialer {
    #[must_use]
    pub fn failing(numbers: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            failing: numbers.iter().map(ToString::to_string).collect(),
            ..Self::default()
        })
    }

    pub fn dialed(&self) -> Vec<String> {
        self.dialed.lock().unwrap().clone()
    }

    /// Numbers texted, in order
    pub fn alerts(&self) -> Vec<String> {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .map(|(number, _)| number.clone())
            .collect()
    }

    /// Text sent to `number`, if any
    pub fn alert_to(&self, number: &str) -> Option<String> {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .find(|(n, _)| n == number)
            .map(|(_, message)| message.clone())
    }
}

#[async_trait]
impl Dialer for RecordingDialer {
    async fn dial(&self, contact: &EmergencyContact) -> Result<()> {
        self.dialed.lock().unwrap().push(contact.number.clone());
        if self.failing.contains(&contact.number) {
            return Err(Error::Dial(format!("{} unreachable", contact.number)));
        }
        Ok(())
    }

    async fn send_alert(&self, contact: &EmergencyContact, message: &str) -> Result<()> {
        self.alerts
            .lock()
            .unwrap()
            .push((contact.number.clone(), message.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    signals: Mutex<Vec<AlertSignal>>,
}

impl RecordingNotifier {
    pub fn signals(&self) -> Vec<AlertSignal> {
        self.signals.lock().unwrap().clone()
    }
}

impl NotificationChannel for RecordingNotifier {
    fn signal(&self, signal: AlertSignal) {
        self.signals.lock().unwrap().push(signal);
    }
}

/// How a recording executor behaves
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutorBehavior {
    #[default]
    Succeed,
    Fail,
    Panic,
}

/// Executor that records what it was asked to do
#[derive(Default)]
pub struct RecordingExecutor {
    behavior: ExecutorBehavior,
    calls: Mutex<Vec<IntentResult>>,
    state: Mutex<Option<StateHandle>>,
    states: Mutex<Vec<ConversationState>>,
}

impl RecordingExecutor {
    #[must_use]
    pub fn new(behavior: ExecutorBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            ..Self::default()
        })
    }

    pub fn observe(&self, state: StateHandle) {
        *self.state.lock().unwrap() = Some(state);
    }

    pub fn calls(&self) -> Vec<IntentResult> {
        self.calls.lock().unwrap().clone()
    }

    pub fn states(&self) -> Vec<ConversationState> {
        self.states.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActionExecutor for RecordingExecutor {
    async fn execute(&self, intent: &IntentResult) -> Result<ActionOutcome> {
        self.calls.lock().unwrap().push(intent.clone());
        if let Some(state) = self.state.lock().unwrap().as_ref() {
            self.states.lock().unwrap().push(state.get());
        }

        match self.behavior {
            ExecutorBehavior::Succeed => Ok(ActionOutcome::say("تم")),
            ExecutorBehavior::Fail => Err(Error::Executor("device refused".to_string())),
            ExecutorBehavior::Panic => panic!("executor blew up"),
        }
    }
}

/// Wake detector driven by hand through the session's wake signal
#[derive(Default)]
pub struct ManualWake {
    listening: AtomicBool,
    starts: AtomicUsize,
}

impl ManualWake {
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WakeDetector for ManualWake {
    async fn start(&self) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.listening.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.listening.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Knobs for [`Harness::new`]
pub struct HarnessOptions {
    pub mode: InteractionMode,
    pub local: Arc<dyn IntentModel>,
    pub remote: Arc<dyn IntentModel>,
    pub session: SessionConfig,
    pub emergency: EmergencyConfig,
    pub script: Vec<Option<&'static str>>,
    pub executor: ExecutorBehavior,
    pub dialer: Arc<RecordingDialer>,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            mode: InteractionMode::default(),
            local: Arc::new(UnavailableModel::new("local")),
            remote: Arc::new(UnavailableModel::new("remote")),
            session: fast_session(InteractionMode::default()),
            emergency: fast_emergency(),
            script: Vec::new(),
            executor: ExecutorBehavior::Succeed,
            dialer: Arc::new(RecordingDialer::default()),
        }
    }
}

/// The real components, wired around recording collaborators
pub struct Harness {
    pub state: StateHandle,
    pub governor: ResourceGovernor,
    pub router: Arc<ConfidenceRouter>,
    pub gate: Arc<ConfirmationGate>,
    pub preemptor: EmergencyPreemptor,
    pub session: InteractionStateMachine,
    pub synth: Arc<RecordingSynth>,
    pub recognizer: Arc<ScriptedRecognizer>,
    pub dialer: Arc<RecordingDialer>,
    pub notifier: Arc<RecordingNotifier>,
    pub executor: Arc<RecordingExecutor>,
    pub wake: Arc<ManualWake>,
}

impl Harness {
    /// Build on a MID profile; must run inside a tokio runtime
    #[must_use]
    pub fn new(options: HarnessOptions) -> Self {
        let profile = DeviceProfile::for_tier(DeviceTier::Mid);
        let governor = ResourceGovernor::new(&profile, &GovernorConfig::default());
        let router = Arc::new(ConfidenceRouter::new(
            options.local,
            options.remote,
            governor.clone(),
            &profile,
            &RouterConfig::default(),
        ));

        let state = StateHandle::new();
        let synth = Arc::new(RecordingSynth::default());
        let announcer = Announcer::spawn(Arc::clone(&synth) as Arc<dyn SpeechSynthesizer>);

        let recognizer = ScriptedRecognizer::new(&options.script);
        recognizer.observe(state.clone());
        let gate = Arc::new(ConfirmationGate::new(
            announcer.clone(),
            Arc::clone(&recognizer) as Arc<dyn SpeechRecognizer>,
        ));

        let notifier = Arc::new(RecordingNotifier::default());
        let dialer = options.dialer;
        let preemptor = EmergencyPreemptor::new(
            options.emergency,
            options.mode,
            EmergencyDeps {
                dialer: Arc::clone(&dialer) as Arc<dyn Dialer>,
                notifier: Arc::clone(&notifier) as Arc<dyn NotificationChannel>,
                governor: governor.clone(),
                gate: Arc::clone(&gate),
                announcer: announcer.clone(),
                state: state.clone(),
            },
        );

        let executor = RecordingExecutor::new(options.executor);
        executor.observe(state.clone());
        let mut executors = ExecutorRegistry::new();
        for intent in [
            IntentKind::CallContact,
            IntentKind::SendMessage,
            IntentKind::SetAlarm,
            IntentKind::CancelAlarm,
            IntentKind::ReadTime,
            IntentKind::VolumeUp,
        ] {
            executors.register(intent, Arc::clone(&executor) as Arc<dyn ActionExecutor>);
        }

        let wake = Arc::new(ManualWake::default());
        let mut session_config = options.session;
        session_config.mode = options.mode;

        let session = InteractionStateMachine::new(
            session_config,
            SessionDeps {
                state: state.clone(),
                governor: governor.clone(),
                router: Arc::clone(&router),
                gate: Arc::clone(&gate),
                preemptor: preemptor.clone(),
                announcer,
                wake: Arc::clone(&wake) as Arc<dyn WakeDetector>,
                recognizer: Arc::clone(&recognizer) as Arc<dyn SpeechRecognizer>,
                executors: Arc::new(executors),
            },
            WakeSignal::channel(8),
        );

        Self {
            state,
            governor,
            router,
            gate,
            preemptor,
            session,
            synth,
            recognizer,
            dialer,
            notifier,
            executor,
            wake,
        }
    }

    /// Run the session in the background
    pub async fn start(&self) -> (CancellationToken, JoinHandle<Result<()>>) {
        let cancel = CancellationToken::new();
        let session = self.session.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { session.run(token).await });

        let wake = Arc::clone(&self.wake);
        assert!(eventually(|| wake.is_listening()).await, "session did not start");
        (cancel, handle)
    }

    /// Report a wake detection
    pub fn wake_up(&self, command: Option<&str>) -> bool {
        self.session.wake_signal().fire(command.map(ToString::to_string))
    }

    /// Wait for the session to be back at `AwaitingWake` with the detector on
    pub async fn settled(&self) -> bool {
        let state = self.state.clone();
        let wake = Arc::clone(&self.wake);
        eventually(move || state.get() == ConversationState::AwaitingWake && wake.is_listening())
            .await
    }
}
