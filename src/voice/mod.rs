//! Voice collaborators
//!
//! Wake detection, speech recognition and speech synthesis are external
//! engines. This module defines the narrow interfaces the core drives them
//! through, plus the ordered speech output queue.

mod announcer;
mod wake_word;

pub use announcer::Announcer;
pub use wake_word::{DEFAULT_WAKE_PHRASES, PhraseWakeDetector, WakeMatch, WakePhraseMatcher};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, mpsc};

use crate::{Error, Result};

/// Wake word engine
///
/// Reports detections through the [`WakeSignal`] it was built with.
#[async_trait]
pub trait WakeDetector: Send + Sync {
    /// Begin listening for the wake phrase
    async fn start(&self) -> Result<()>;

    /// Stop listening
    async fn stop(&self) -> Result<()>;
}

/// Speech-to-text engine
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Capture one utterance
    ///
    /// Returns `None` when nothing was said before the timeout.
    async fn listen(&self, timeout: Duration) -> Result<Option<String>>;

    /// Abort an in-progress capture
    async fn stop(&self) {}
}

/// Text-to-speech engine
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Speak text, resolving once it has been spoken
    async fn speak(&self, text: &str) -> Result<()>;

    /// Cut off the current utterance
    async fn stop(&self) {}
}

/// A wake detection
#[derive(Debug, Clone)]
pub struct WakeEvent {
    pub at: DateTime<Utc>,

    /// Command spoken together with the wake phrase
    pub command: Option<String>,
}

/// Sending half used by wake detectors
#[derive(Debug, Clone)]
pub struct WakeSignal {
    tx: mpsc::Sender<WakeEvent>,
}

impl WakeSignal {
    /// Create a signal and the receiver the state machine consumes
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<WakeEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Report a detection; returns false if it was dropped
    pub fn fire(&self, command: Option<String>) -> bool {
        let event = WakeEvent {
            at: Utc::now(),
            command,
        };
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, "wake event dropped");
                false
            }
        }
    }
}

/// Transcripts shared by a phrase wake detector and a feed recognizer
///
/// Whoever holds the lock consumes the next transcript.
pub type TranscriptFeed = Arc<Mutex<mpsc::Receiver<String>>>;

/// Create a transcript feed and the sender that fills it
#[must_use]
pub fn transcript_feed(capacity: usize) -> (mpsc::Sender<String>, TranscriptFeed) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (tx, Arc::new(Mutex::new(rx)))
}

/// Recognizer that takes already-transcribed text from a feed
pub struct FeedRecognizer {
    feed: TranscriptFeed,
}

impl FeedRecognizer {
    #[must_use]
    pub const fn new(feed: TranscriptFeed) -> Self {
        Self { feed }
    }
}

#[async_trait]
impl SpeechRecognizer for FeedRecognizer {
    async fn listen(&self, timeout: Duration) -> Result<Option<String>> {
        let mut feed = self.feed.lock().await;
        match tokio::time::timeout(timeout, feed.recv()).await {
            Ok(Some(text)) => Ok(Some(text)),
            Ok(None) => Err(Error::Recognition("transcript feed closed".to_string())),
            Err(_) => Ok(None),
        }
    }
}
