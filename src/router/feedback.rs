//! Routing feedback records

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::intent::{IntentKind, ResolutionPath};

/// Default number of records kept by [`FeedbackLog`]
pub const DEFAULT_FEEDBACK_CAPACITY: usize = 100;

/// How a resolution ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackOutcome {
    /// The first resolver answered
    Resolved,
    /// A later resolver answered after a fallback
    FellBack,
    /// Nothing matched
    Unresolved,
}

/// One record per resolved utterance
#[derive(Debug, Clone, Serialize)]
pub struct RoutingFeedback {
    pub text: String,
    pub path: ResolutionPath,
    pub intent: IntentKind,
    pub confidence: f32,
    pub complexity: f32,
    pub outcome: FeedbackOutcome,
    pub at: DateTime<Utc>,
}

/// Destination for routing feedback
pub trait FeedbackSink: Send + Sync {
    fn record(&self, feedback: RoutingFeedback);
}

/// Bounded in-memory feedback history
#[derive(Debug)]
pub struct FeedbackLog {
    capacity: usize,
    records: Mutex<VecDeque<RoutingFeedback>>,
}

impl FeedbackLog {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: Mutex::new(VecDeque::new()),
        }
    }

    /// Records oldest first
    #[must_use]
    pub fn recent(&self) -> Vec<RoutingFeedback> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for FeedbackLog {
    fn default() -> Self {
        Self::new(DEFAULT_FEEDBACK_CAPACITY)
    }
}

impl FeedbackSink for FeedbackLog {
    fn record(&self, feedback: RoutingFeedback) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(feedback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feedback(text: &str) -> RoutingFeedback {
        RoutingFeedback {
            text: text.to_string(),
            path: ResolutionPath::Rule,
            intent: IntentKind::Unknown,
            confidence: 0.0,
            complexity: 0.5,
            outcome: FeedbackOutcome::Unresolved,
            at: Utc::now(),
        }
    }

    #[test]
    fn test_log_evicts_oldest() {
        let log = FeedbackLog::new(2);
        log.record(feedback("a"));
        log.record(feedback("b"));
        log.record(feedback("c"));

        let texts: Vec<String> = log.recent().into_iter().map(|f| f.text).collect();
        assert_eq!(texts, vec!["b", "c"]);
    }
}
