//! Confidence router
//!
//! Chooses between the on-device model, the cloud model and keyword rules
//! for each utterance, then falls back down that chain until something
//! answers. Resolution never fails; the worst case is `UNKNOWN`.

mod complexity;
mod feedback;
mod model;
mod preference;

pub use complexity::{AMBIGUOUS_MARKERS, score as complexity_score};
pub use feedback::{
    DEFAULT_FEEDBACK_CAPACITY, FeedbackLog, FeedbackOutcome, FeedbackSink, RoutingFeedback,
};
pub use model::{IntentModel, ModelOutput, UnavailableModel};
pub use preference::{
    DEFAULT_PREFER_LOCAL_RATIO, DEFAULT_WINDOW, PathStats, PreferenceSnapshot, RoutingPreference,
};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use crate::device::DeviceProfile;
use crate::governor::{ResourceGovernor, TaskCategory};
use crate::intent::{Entities, IntentKind, IntentResult, InteractionMode, ResolutionPath, Utterance};
use crate::{Error, Result, lexicon};

/// Router tuning
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Attempts per preference window
    pub window: usize,

    /// Local success rate above which local is preferred
    pub prefer_local_ratio: f32,

    /// Budget for one cloud call
    pub remote_timeout: Duration,

    /// Records kept by the default feedback log
    pub feedback_capacity: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            prefer_local_ratio: DEFAULT_PREFER_LOCAL_RATIO,
            remote_timeout: Duration::from_millis(5000),
            feedback_capacity: DEFAULT_FEEDBACK_CAPACITY,
        }
    }
}

/// Why the first resolver was picked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteReason {
    /// Emergency lexicon hit
    Emergency,
    /// Privacy mode pins resolution to the device
    Privacy,
    /// Senior mode pins resolution to the device
    Senior,
    /// Complexity within the device threshold
    Simple,
    /// Too complex, but the device has been reliable lately
    PreferLocal,
    /// Too complex for the device
    Complex,
}

/// First routing decision for an utterance
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RoutePlan {
    pub path: ResolutionPath,
    pub complexity: f32,
    pub reason: RouteReason,
}

/// Routes utterances to resolvers
pub struct ConfidenceRouter {
    local: Arc<dyn IntentModel>,
    remote: Arc<dyn IntentModel>,
    governor: ResourceGovernor,
    local_threshold: f32,
    min_confidence: f32,
    inference_timeout: Duration,
    remote_timeout: Duration,
    preference: Mutex<RoutingPreference>,
    prefer_local: AtomicBool,
    feedback: Arc<dyn FeedbackSink>,
}

impl ConfidenceRouter {
    /// Create a router with thresholds taken from the device profile
    #[must_use]
    pub fn new(
        local: Arc<dyn IntentModel>,
        remote: Arc<dyn IntentModel>,
        governor: ResourceGovernor,
        profile: &DeviceProfile,
        config: &RouterConfig,
    ) -> Self {
        Self {
            local,
            remote,
            governor,
            local_threshold: profile.local_threshold,
            min_confidence: profile.min_confidence,
            inference_timeout: profile.inference_timeout,
            remote_timeout: config.remote_timeout,
            preference: Mutex::new(RoutingPreference::new(
                config.window,
                config.prefer_local_ratio,
            )),
            prefer_local: AtomicBool::new(false),
            feedback: Arc::new(FeedbackLog::new(config.feedback_capacity)),
        }
    }

    /// Send feedback records somewhere other than the in-memory log
    #[must_use]
    pub fn with_feedback_sink(mut self, sink: Arc<dyn FeedbackSink>) -> Self {
        self.feedback = sink;
        self
    }

    /// Decide the first resolver without running anything
    #[must_use]
    pub fn plan(&self, utterance: &Utterance, mode: InteractionMode) -> RoutePlan {
        let complexity = complexity::score(&utterance.normalized);

        let (path, reason) = if lexicon::is_emergency(&utterance.normalized) {
            (ResolutionPath::Local, RouteReason::Emergency)
        } else if mode.privacy {
            (ResolutionPath::Local, RouteReason::Privacy)
        } else if mode.senior {
            (ResolutionPath::Local, RouteReason::Senior)
        } else if complexity <= self.local_threshold {
            (ResolutionPath::Local, RouteReason::Simple)
        } else if self.prefer_local() {
            (ResolutionPath::Local, RouteReason::PreferLocal)
        } else {
            (ResolutionPath::Remote, RouteReason::Complex)
        };

        RoutePlan {
            path,
            complexity,
            reason,
        }
    }

    /// Resolve an utterance into an intent
    ///
    /// Emergencies are answered on-device without a model round-trip. In
    /// privacy mode a local failure goes straight to the rules.
    pub async fn resolve(&self, utterance: &Utterance, mode: InteractionMode) -> IntentResult {
        let plan = self.plan(utterance, mode);

        if plan.reason == RouteReason::Emergency {
            let result = IntentResult::emergency();
            self.emit(utterance, &plan, &result, FeedbackOutcome::Resolved);
            return result;
        }

        let chain: &[ResolutionPath] = match (plan.path, mode.privacy) {
            (ResolutionPath::Local, true) => &[ResolutionPath::Local],
            (ResolutionPath::Local, false) => &[ResolutionPath::Local, ResolutionPath::Remote],
            (ResolutionPath::Remote, _) => &[ResolutionPath::Remote],
            (ResolutionPath::Rule, _) => &[],
        };

        for (i, path) in chain.iter().enumerate() {
            match self.attempt(*path, utterance).await {
                Ok(result) => {
                    let outcome = if i == 0 {
                        FeedbackOutcome::Resolved
                    } else {
                        FeedbackOutcome::FellBack
                    };
                    self.emit(utterance, &plan, &result, outcome);
                    return result;
                }
                Err(e) if e.is_fallback() => {
                    tracing::debug!(path = %path, error = %e, "resolver declined, falling back");
                }
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "resolver failed, falling back");
                }
            }
        }

        let result = lexicon::resolve(&utterance.normalized);
        let outcome = if result.intent == IntentKind::Unknown {
            FeedbackOutcome::Unresolved
        } else {
            FeedbackOutcome::FellBack
        };
        self.emit(utterance, &plan, &result, outcome);
        result
    }

    async fn attempt(&self, path: ResolutionPath, utterance: &Utterance) -> Result<IntentResult> {
        let (model, category, budget) = match path {
            ResolutionPath::Local => (&self.local, TaskCategory::Inference, self.inference_timeout),
            ResolutionPath::Remote => (&self.remote, TaskCategory::Network, self.remote_timeout),
            ResolutionPath::Rule => return Ok(lexicon::resolve(&utterance.normalized)),
        };

        if !model.is_ready() {
            return Err(Error::ModelUnavailable(model.name().to_string()));
        }

        let model = Arc::clone(model);
        let text = utterance.normalized.clone();
        let mut handle = self
            .governor
            .submit(category, async move { model.analyze(&text).await })?;

        let output = match tokio::time::timeout(budget, &mut handle).await {
            Ok(joined) => joined.and_then(|analyzed| analyzed),
            Err(_) => {
                handle.abort();
                Err(Error::timeout(budget))
            }
        };

        let output = match output {
            Ok(output) => output,
            Err(Error::ShuttingDown) => return Err(Error::ShuttingDown),
            Err(e) => {
                self.record(path, false);
                return Err(e);
            }
        };

        let intent = IntentKind::from_model_label(&output.label);
        if intent == IntentKind::Unknown || output.confidence < self.min_confidence {
            self.record(path, false);
            return Err(Error::LowConfidence(output.confidence));
        }
        self.record(path, true);

        let entities = Entities::from_map(&output.entities)
            .or(lexicon::extract_entities(intent, &utterance.normalized));
        Ok(IntentResult::new(intent, entities, output.confidence, path))
    }

    fn record(&self, path: ResolutionPath, success: bool) {
        let mut preference = self.preference.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(prefer_local) = preference.record(path, success) {
            self.prefer_local.store(prefer_local, Ordering::SeqCst);
            tracing::info!(prefer_local, "routing preference window closed");
        }
    }

    fn emit(
        &self,
        utterance: &Utterance,
        plan: &RoutePlan,
        result: &IntentResult,
        outcome: FeedbackOutcome,
    ) {
        tracing::debug!(
            session_id = %utterance.session_id,
            path = %result.path,
            intent = %result.intent,
            confidence = result.confidence,
            complexity = plan.complexity,
            outcome = ?outcome,
            "utterance routed"
        );

        self.feedback.record(RoutingFeedback {
            text: utterance.normalized.clone(),
            path: result.path,
            intent: result.intent,
            confidence: result.confidence,
            complexity: plan.complexity,
            outcome,
            at: Utc::now(),
        });
    }

    /// Whether recent evidence favors the device
    #[must_use]
    pub fn prefer_local(&self) -> bool {
        self.prefer_local.load(Ordering::SeqCst)
    }

    /// Current estimator counters
    #[must_use]
    pub fn preference_snapshot(&self) -> PreferenceSnapshot {
        self.preference
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }
}
