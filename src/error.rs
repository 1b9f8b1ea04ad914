//! Error types for Rafiq

use thiserror::Error;

/// Result type alias for Rafiq operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the orchestration core
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Intent model not loaded or unreachable
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// Model answered below the accepted confidence
    #[error("low confidence: {0:.2}")]
    LowConfidence(f32),

    /// A bounded wait expired
    #[error("timed out after {0}ms")]
    Timeout(u64),

    /// Task pools cannot admit more work
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Governor no longer accepts work
    #[error("shutting down")]
    ShuttingDown,

    /// Submitted task was cancelled or panicked
    #[error("task failed: {0}")]
    TaskFailed(String),

    /// Text-to-speech error
    #[error("speech error: {0}")]
    Speech(String),

    /// Speech recognition error
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Wake word detection error
    #[error("wake word error: {0}")]
    WakeWord(String),

    /// Action execution error
    #[error("executor error: {0}")]
    Executor(String),

    /// No executor registered for an intent
    #[error("no executor for intent: {0}")]
    NoExecutor(String),

    /// Telephony error
    #[error("dial error: {0}")]
    Dial(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Timeout for a bounded wait
    #[must_use]
    pub fn timeout(waited: std::time::Duration) -> Self {
        Self::Timeout(u64::try_from(waited.as_millis()).unwrap_or(u64::MAX))
    }

    /// Whether the router should fall back to the next resolver on this error
    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        matches!(
            self,
            Self::ModelUnavailable(_)
                | Self::LowConfidence(_)
                | Self::Timeout(_)
                | Self::ResourceExhausted(_)
                | Self::TaskFailed(_)
        )
    }
}
