//! Action executors
//!
//! Executors carry out a resolved intent on the device (place a call, set an
//! alarm, read the time). The session looks them up by intent and runs them
//! on the governor's general pool.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Timelike;

use crate::intent::{IntentKind, IntentResult};
use crate::{Error, Result};

/// What an executor wants said afterwards
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutcome {
    pub spoken: Option<String>,
}

impl ActionOutcome {
    /// Nothing to say
    #[must_use]
    pub const fn silent() -> Self {
        Self { spoken: None }
    }

    /// Speak `text` once the action is done
    #[must_use]
    pub fn say(text: impl Into<String>) -> Self {
        Self {
            spoken: Some(text.into()),
        }
    }
}

/// Carries out one kind of intent
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Perform the action
    ///
    /// # Errors
    ///
    /// Returns error if the action could not be completed
    async fn execute(&self, intent: &IntentResult) -> Result<ActionOutcome>;
}

/// Executors keyed by intent
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<IntentKind, Arc<dyn ActionExecutor>>,
}

impl ExecutorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor, replacing any previous one for the intent
    pub fn register(&mut self, intent: IntentKind, executor: Arc<dyn ActionExecutor>) {
        if self.executors.insert(intent, executor).is_some() {
            tracing::debug!(intent = %intent, "executor replaced");
        }
    }

    /// Builder-style [`Self::register`]
    #[must_use]
    pub fn with(mut self, intent: IntentKind, executor: Arc<dyn ActionExecutor>) -> Self {
        self.register(intent, executor);
        self
    }

    /// Executor for an intent
    ///
    /// # Errors
    ///
    /// Returns `NoExecutor` if nothing handles the intent
    pub fn get(&self, intent: IntentKind) -> Result<Arc<dyn ActionExecutor>> {
        self.executors
            .get(&intent)
            .cloned()
            .ok_or_else(|| Error::NoExecutor(intent.to_string()))
    }

    /// Whether an intent has an executor
    #[must_use]
    pub fn handles(&self, intent: IntentKind) -> bool {
        self.executors.contains_key(&intent)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.executors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

/// Reads the local time aloud
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockExecutor;

#[async_trait]
impl ActionExecutor for ClockExecutor {
    async fn execute(&self, intent: &IntentResult) -> Result<ActionOutcome> {
        if intent.intent != IntentKind::ReadTime {
            return Err(Error::Executor(format!(
                "clock cannot handle {}",
                intent.intent
            )));
        }

        let now = chrono::Local::now();
        Ok(ActionOutcome::say(spoken_time(now.hour(), now.minute())))
    }
}

/// Twelve-hour time the way it is said out loud
#[must_use]
pub fn spoken_time(hour: u32, minute: u32) -> String {
    let period = match hour {
        0..=11 => "الصبح",
        12..=16 => "الضهر",
        _ => "بالليل",
    };
    let hour = match hour % 12 {
        0 => 12,
        h => h,
    };

    match minute {
        0 => format!("الساعة {hour} {period}"),
        30 => format!("الساعة {hour} ونص {period}"),
        m => format!("الساعة {hour} و{m} دقيقة {period}"),
    }
}
