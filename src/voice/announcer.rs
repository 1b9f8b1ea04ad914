//! Ordered speech output
//!
//! All prompts go through one queue so they are spoken one at a time, in
//! submission order. An interrupt drops everything queued before it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, oneshot};

use super::SpeechSynthesizer;
use crate::{Error, Result};

struct Request {
    text: String,
    epoch: u64,
    done: Option<oneshot::Sender<Result<()>>>,
}

/// Handle to the speech output queue
#[derive(Clone)]
pub struct Announcer {
    tx: mpsc::UnboundedSender<Request>,
    epoch: Arc<AtomicU64>,
    synth: Arc<dyn SpeechSynthesizer>,
}

impl Announcer {
    /// Start the output task
    ///
    /// Must be called from within a tokio runtime. The task ends when the
    /// last handle is dropped.
    #[must_use]
    pub fn spawn(synth: Arc<dyn SpeechSynthesizer>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Request>();
        let epoch = Arc::new(AtomicU64::new(0));

        let worker_synth = Arc::clone(&synth);
        let worker_epoch = Arc::clone(&epoch);
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let result = if request.epoch < worker_epoch.load(Ordering::SeqCst) {
                    Err(Error::Speech("interrupted".to_string()))
                } else {
                    worker_synth.speak(&request.text).await
                };

                if let Err(e) = &result {
                    tracing::debug!(error = %e, "prompt not spoken");
                }
                if let Some(done) = request.done {
                    let _ = done.send(result);
                }
            }
            tracing::debug!("announcer stopped");
        });

        Self { tx, epoch, synth }
    }

    /// Speak and wait until the prompt has been spoken
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails or the prompt was interrupted
    pub async fn say(&self, text: &str) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.enqueue(text, Some(done_tx))?;
        done_rx
            .await
            .map_err(|_| Error::Speech("announcer stopped".to_string()))?
    }

    /// Queue a prompt without waiting for it
    pub fn announce(&self, text: &str) {
        if let Err(e) = self.enqueue(text, None) {
            tracing::warn!(error = %e, "failed to queue announcement");
        }
    }

    /// Stop the current prompt and drop everything queued so far
    pub async fn interrupt(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.synth.stop().await;
    }

    fn enqueue(&self, text: &str, done: Option<oneshot::Sender<Result<()>>>) -> Result<()> {
        tracing::debug!(text, "queueing prompt");
        self.tx
            .send(Request {
                text: text.to_string(),
                epoch: self.epoch.load(Ordering::SeqCst),
                done,
            })
            .map_err(|_| Error::Speech("announcer stopped".to_string()))
    }
}
