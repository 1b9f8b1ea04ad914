//! Intents and utterances
//!
//! The closed set of things the assistant can be asked to do, and the
//! immutable result of resolving an utterance into one of them.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lexicon;

/// What the user asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentKind {
    CallContact,
    SendMessage,
    SetAlarm,
    CancelAlarm,
    ReadTime,
    ReadMissedCalls,
    Emergency,
    VolumeUp,
    VolumeDown,
    Unknown,
}

impl IntentKind {
    /// Map a model label onto an intent, accepting legacy aliases
    #[must_use]
    pub fn from_model_label(label: &str) -> Self {
        match label.trim().to_uppercase().as_str() {
            "CALL_CONTACT" | "CALL_PERSON" => Self::CallContact,
            "SEND_MESSAGE" | "SEND_WHATSAPP" | "SEND_SMS" => Self::SendMessage,
            "SET_ALARM" | "REMIND" => Self::SetAlarm,
            "CANCEL_ALARM" => Self::CancelAlarm,
            "READ_TIME" | "WHAT_TIME" => Self::ReadTime,
            "READ_MISSED_CALLS" | "CHECK_CALLS" => Self::ReadMissedCalls,
            "EMERGENCY" | "HELP" => Self::Emergency,
            "VOLUME_UP" => Self::VolumeUp,
            "VOLUME_DOWN" => Self::VolumeDown,
            _ => Self::Unknown,
        }
    }

    /// Canonical label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CallContact => "CALL_CONTACT",
            Self::SendMessage => "SEND_MESSAGE",
            Self::SetAlarm => "SET_ALARM",
            Self::CancelAlarm => "CANCEL_ALARM",
            Self::ReadTime => "READ_TIME",
            Self::ReadMissedCalls => "READ_MISSED_CALLS",
            Self::Emergency => "EMERGENCY",
            Self::VolumeUp => "VOLUME_UP",
            Self::VolumeDown => "VOLUME_DOWN",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Actions with side effects on other people must be confirmed
    #[must_use]
    pub const fn is_sensitive(self) -> bool {
        matches!(self, Self::CallContact | Self::SendMessage | Self::CancelAlarm)
    }

    /// Intents available in senior mode
    #[must_use]
    pub const fn allowed_in_senior_mode(self) -> bool {
        matches!(
            self,
            Self::CallContact
                | Self::Emergency
                | Self::ReadTime
                | Self::SetAlarm
                | Self::ReadMissedCalls
        )
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which resolver produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionPath {
    /// On-device model
    Local,
    /// Cloud model
    Remote,
    /// Keyword rules
    Rule,
}

impl ResolutionPath {
    /// Lowercase name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
            Self::Rule => "rule",
        }
    }
}

impl fmt::Display for ResolutionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Slots extracted from an utterance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Entities {
    /// Pick the known keys out of a model's entity map
    #[must_use]
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        let get = |key: &str| {
            map.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            contact: get("contact"),
            time: get("time"),
            message: get("message"),
        }
    }

    /// Fill empty slots from another extraction
    #[must_use]
    pub fn or(self, fallback: Self) -> Self {
        Self {
            contact: self.contact.or(fallback.contact),
            time: self.time.or(fallback.time),
            message: self.message.or(fallback.message),
        }
    }

    /// Whether no slot is set
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.contact.is_none() && self.time.is_none() && self.message.is_none()
    }
}

/// Resolved intent; immutable once produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: IntentKind,

    #[serde(default)]
    pub entities: Entities,

    /// In `[0, 1]`
    pub confidence: f32,

    pub path: ResolutionPath,
}

impl IntentResult {
    /// Build a result, clamping confidence into `[0, 1]`
    #[must_use]
    pub fn new(
        intent: IntentKind,
        entities: Entities,
        confidence: f32,
        path: ResolutionPath,
    ) -> Self {
        Self {
            intent,
            entities,
            confidence: confidence.clamp(0.0, 1.0),
            path,
        }
    }

    /// Nothing understood
    #[must_use]
    pub fn unknown(path: ResolutionPath) -> Self {
        Self::new(IntentKind::Unknown, Entities::default(), 0.0, path)
    }

    /// Emergency recognized on-device
    #[must_use]
    pub fn emergency() -> Self {
        Self::new(
            IntentKind::Emergency,
            Entities::default(),
            1.0,
            ResolutionPath::Local,
        )
    }

    /// Whether the result is usable for execution
    #[must_use]
    pub fn is_understood(&self, floor: f32) -> bool {
        self.intent != IntentKind::Unknown && self.confidence >= floor
    }
}

/// One recognized speech segment
#[derive(Debug, Clone)]
pub struct Utterance {
    pub raw: String,
    pub normalized: String,
    pub session_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

impl Utterance {
    /// Capture a transcript for a session
    #[must_use]
    pub fn new(raw: impl Into<String>, session_id: Uuid) -> Self {
        let raw = raw.into();
        let normalized = lexicon::normalize(&raw);
        Self {
            raw,
            normalized,
            session_id,
            timestamp: Utc::now(),
        }
    }

    /// Utterance outside any session (diagnostics, tests)
    #[must_use]
    pub fn detached(raw: impl Into<String>) -> Self {
        Self::new(raw, Uuid::nil())
    }

    /// Whether nothing but whitespace or marks was said
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }
}

/// Interaction mode flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionMode {
    /// Simplified prompts and a restricted intent set
    #[serde(default)]
    pub senior: bool,

    /// Nothing leaves the device
    #[serde(default)]
    pub privacy: bool,
}

impl InteractionMode {
    /// Either flag pins resolution to the device
    #[must_use]
    pub const fn forces_local(self) -> bool {
        self.senior || self.privacy
    }
}
