//! Console adapters
//!
//! Stand-ins for the platform collaborators so a session can be driven from
//! a terminal: typed lines act as transcripts, prompts are printed, and
//! calls and device actions are only logged.
//!
//! A few typed commands stand in for the phone's emergency controls:
//!
//! - `/cancel` stops an emergency
//! - `/safe` (or saying "أنا كويس" while one is active) acknowledges it
//! - `/answered` reports that the current emergency call was picked up
//! - `/fall` raises a fall detection

use std::io::Write;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::Result;
use crate::emergency::{
    Dialer, EmergencyContact, EmergencyPreemptor, TriggerOutcome, TriggerReason,
};
use crate::executor::{ActionExecutor, ActionOutcome};
use crate::intent::{IntentKind, IntentResult};
use crate::lexicon;
use crate::voice::SpeechSynthesizer;

/// Emergency control typed at the console
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Cancel,
    Safe,
    Answered,
    Fall,
}

impl ConsoleCommand {
    /// Recognize a control line
    ///
    /// Slash commands always parse. An all-clear phrase only counts while an
    /// emergency is active; otherwise it is ordinary speech.
    #[must_use]
    pub fn parse(line: &str, emergency_active: bool) -> Option<Self> {
        match line.trim() {
            "/cancel" => Some(Self::Cancel),
            "/safe" => Some(Self::Safe),
            "/answered" => Some(Self::Answered),
            "/fall" => Some(Self::Fall),
            spoken if emergency_active && lexicon::is_all_clear(&lexicon::normalize(spoken)) => {
                Some(Self::Safe)
            }
            _ => None,
        }
    }

    /// Apply to the preemptor; returns whether it changed anything
    pub async fn apply(self, preemptor: &EmergencyPreemptor) -> bool {
        match self {
            Self::Cancel => preemptor.cancel(),
            Self::Safe => preemptor.acknowledge(),
            Self::Answered => preemptor.report_answered(),
            Self::Fall => matches!(
                preemptor.trigger(TriggerReason::Fall, true).await,
                TriggerOutcome::Started(_)
            ),
        }
    }
}

/// Forward stdin lines into a transcript sender until EOF
///
/// Control commands go to `preemptor` instead of the transcript feed.
pub fn spawn_stdin_reader(tx: mpsc::Sender<String>, preemptor: EmergencyPreemptor) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    if let Some(command) = ConsoleCommand::parse(&line, preemptor.is_active()) {
                        let applied = command.apply(&preemptor).await;
                        tracing::info!(command = ?command, applied, "console command");
                        continue;
                    }
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    tracing::debug!("stdin closed");
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read stdin");
                    break;
                }
            }
        }
    });
}

/// Prints prompts instead of speaking them
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSynthesizer;

#[async_trait]
impl SpeechSynthesizer for ConsoleSynthesizer {
    async fn speak(&self, text: &str) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "رفيق: {text}")?;
        stdout.flush()?;
        Ok(())
    }
}

/// Dialer that logs instead of calling
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDialer;

#[async_trait]
impl Dialer for LogDialer {
    async fn dial(&self, contact: &EmergencyContact) -> Result<()> {
        tracing::warn!(contact = %contact.name, number = %contact.number, "dialing");
        Ok(())
    }

    async fn send_alert(&self, contact: &EmergencyContact, message: &str) -> Result<()> {
        tracing::warn!(contact = %contact.name, number = %contact.number, message, "alert sent");
        Ok(())
    }
}

/// Acknowledges device actions without performing them
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoExecutor;

#[async_trait]
impl ActionExecutor for EchoExecutor {
    async fn execute(&self, intent: &IntentResult) -> Result<ActionOutcome> {
        tracing::info!(intent = %intent.intent, entities = ?intent.entities, "action requested");

        let spoken = match intent.intent {
            IntentKind::CallContact => intent
                .entities
                .contact
                .as_ref()
                .map_or_else(|| "بتصل".to_string(), |c| format!("بتصل بـ{c}")),
            IntentKind::SendMessage => "الرسالة اتبعتت".to_string(),
            IntentKind::SetAlarm => intent
                .entities
                .time
                .as_ref()
                .map_or_else(|| "المنبه اتظبط".to_string(), |t| format!("المنبه اتظبط {t}")),
            IntentKind::CancelAlarm => "المنبه اتلغى".to_string(),
            IntentKind::ReadMissedCalls => "مفيش مكالمات فايتة".to_string(),
            IntentKind::VolumeUp => "عليت الصوت".to_string(),
            IntentKind::VolumeDown => "وطيت الصوت".to_string(),
            _ => "تمام".to_string(),
        };
        Ok(ActionOutcome::say(spoken))
    }
}
