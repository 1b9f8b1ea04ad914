//! Wake phrase matching
//!
//! Finds a configured wake phrase in a transcript and splits off whatever
//! command was spoken in the same breath.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{TranscriptFeed, WakeDetector, WakeSignal};
use crate::{Error, Result, lexicon};

/// Default wake phrases
pub const DEFAULT_WAKE_PHRASES: &[&str] = &["يا صاحبي", "يا كبير"];

/// A wake phrase found in a transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeMatch {
    /// The phrase that matched
    pub phrase: String,

    /// Text spoken after the phrase, if any
    pub command: Option<String>,
}

/// Matches wake phrases in transcripts
#[derive(Debug, Clone)]
pub struct WakePhraseMatcher {
    phrases: Vec<String>,
}

impl WakePhraseMatcher {
    /// Create a matcher
    ///
    /// # Arguments
    ///
    /// * `phrases` - Wake phrases (e.g., "يا صاحبي")
    ///
    /// # Errors
    ///
    /// Returns error if no usable phrase is given
    pub fn new(phrases: Vec<String>) -> Result<Self> {
        let normalized: Vec<String> = phrases
            .iter()
            .map(|p| lexicon::normalize(p))
            .filter(|p| !p.is_empty())
            .collect();

        if normalized.is_empty() {
            return Err(Error::WakeWord("no wake phrases configured".to_string()));
        }

        tracing::debug!(phrases = ?normalized, "wake phrase matcher initialized");

        Ok(Self { phrases: normalized })
    }

    /// Matcher for the built-in phrases
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            phrases: DEFAULT_WAKE_PHRASES
                .iter()
                .map(|p| lexicon::normalize(p))
                .collect(),
        }
    }

    /// Look for a wake phrase; the earliest occurrence wins
    #[must_use]
    pub fn find(&self, transcript: &str) -> Option<WakeMatch> {
        let normalized = lexicon::normalize(transcript);

        let (pos, phrase) = self
            .phrases
            .iter()
            .filter_map(|p| normalized.find(p.as_str()).map(|pos| (pos, p)))
            .min_by_key(|(pos, _)| *pos)?;

        let command = normalized[pos + phrase.len()..]
            .trim_start_matches(|c: char| c.is_whitespace() || c == ',' || c == '،')
            .trim()
            .to_string();

        tracing::info!(phrase = %phrase, "wake phrase detected");

        Some(WakeMatch {
            phrase: phrase.clone(),
            command: (!command.is_empty()).then_some(command),
        })
    }

    /// Configured phrases, normalized
    #[must_use]
    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }
}

/// Wake detector over a transcript feed
///
/// While started, reads transcripts and fires once on the first one that
/// contains a wake phrase, then stops reading so the command that follows
/// reaches the recognizer.
pub struct PhraseWakeDetector {
    matcher: WakePhraseMatcher,
    feed: TranscriptFeed,
    signal: WakeSignal,
    listening: Mutex<Option<CancellationToken>>,
}

impl PhraseWakeDetector {
    #[must_use]
    pub const fn new(matcher: WakePhraseMatcher, feed: TranscriptFeed, signal: WakeSignal) -> Self {
        Self {
            matcher,
            feed,
            signal,
            listening: Mutex::new(None),
        }
    }
}

#[async_trait]
impl WakeDetector for PhraseWakeDetector {
    async fn start(&self) -> Result<()> {
        let token = {
            let mut listening = self.listening.lock().unwrap_or_else(PoisonError::into_inner);
            if listening.as_ref().is_some_and(|t| !t.is_cancelled()) {
                return Ok(());
            }
            let token = CancellationToken::new();
            *listening = Some(token.clone());
            token
        };

        let matcher = self.matcher.clone();
        let feed = Arc::clone(&self.feed);
        let signal = self.signal.clone();

        tokio::spawn(async move {
            loop {
                let transcript = {
                    let mut feed = feed.lock().await;
                    tokio::select! {
                        () = token.cancelled() => return,
                        transcript = feed.recv() => transcript,
                    }
                };

                let Some(transcript) = transcript else {
                    tracing::debug!("transcript feed closed");
                    token.cancel();
                    return;
                };

                if let Some(hit) = matcher.find(&transcript) {
                    token.cancel();
                    signal.fire(hit.command);
                    return;
                }
                tracing::trace!(transcript = %transcript, "no wake phrase");
            }
        });

        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if let Some(token) = self
            .listening
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            token.cancel();
        }
        Ok(())
    }
}
