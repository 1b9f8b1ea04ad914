//! Rafiq - Voice interaction core for an Egyptian-Arabic assistant
//!
//! This library provides the orchestration core of a voice assistant built
//! for elderly users on constrained phones:
//! - Bounded task pools sized from the device tier
//! - Intent routing between an on-device model, a cloud model and keyword rules
//! - Spoken confirmation before risky actions
//! - Emergency preemption with repeated dialing until someone answers
//! - The session state machine that ties them together
//!
//! Speech recognition, synthesis, intent models and telephony are external
//! collaborators behind the traits in [`voice`], [`router`], [`emergency`]
//! and [`executor`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │          Platform (mic, TTS, phone, models)          │
//! │   WakeDetector │ Recognizer │ Synthesizer │ Dialer  │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │           InteractionStateMachine (session)          │
//! │  wake → capture → route → confirm → execute → cool   │
//! └───────┬──────────────┬───────────────┬──────────────┘
//!         │              │               │
//! ┌───────▼──────┐ ┌─────▼──────┐ ┌──────▼─────────────┐
//! │ Confidence   │ │Confirmation│ │ EmergencyPreemptor │
//! │ Router       │ │Gate        │ │  (cuts in anytime) │
//! └───────┬──────┘ └────────────┘ └──────┬─────────────┘
//!         │                              │
//! ┌───────▼──────────────────────────────▼──────────────┐
//! │      ResourceGovernor (per-category task pools)      │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod assistant;
pub mod config;
pub mod confirm;
pub mod console;
pub mod device;
pub mod emergency;
pub mod error;
pub mod executor;
pub mod governor;
pub mod intent;
pub mod lexicon;
pub mod router;
pub mod session;
pub mod voice;

pub use assistant::{Assistant, AssistantBuilder};
pub use config::Config;
pub use confirm::{ConfirmationGate, ConfirmationReply};
pub use device::{DeviceProfile, DeviceTier};
pub use emergency::{EmergencyContact, EmergencyPreemptor, TriggerOutcome, TriggerReason};
pub use error::{Error, Result};
pub use executor::{ActionExecutor, ActionOutcome, ExecutorRegistry};
pub use governor::{ResourceGovernor, TaskCategory};
pub use intent::{Entities, IntentKind, IntentResult, InteractionMode, ResolutionPath, Utterance};
pub use router::{ConfidenceRouter, IntentModel, ModelOutput};
pub use session::{ConversationState, InteractionStateMachine};
