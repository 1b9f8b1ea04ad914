//! Emergency preemption integration tests

use std::sync::Arc;
use std::time::Duration;

use rafiq::console::ConsoleCommand;
use rafiq::emergency::{
    AlertSignal, CONFIRM_EMERGENCY_PROMPT, DIAL_UNAVAILABLE_ANNOUNCEMENT, EMERGENCY_ANNOUNCEMENT,
    EmergencyContact, FALL_ANNOUNCEMENT, GUARDIAN_ANNOUNCEMENT,
};
use rafiq::session::ConversationState;
use rafiq::{InteractionMode, TriggerOutcome, TriggerReason};

mod common;

use common::{Harness, HarnessOptions, RecordingDialer, eventually, fast_emergency};

const PERSONAL: &str = "01001234567";
const GUARDIAN: &str = "01112223334";

const SENIOR: InteractionMode = InteractionMode {
    senior: true,
    privacy: false,
};

fn with_guardian(mode: InteractionMode) -> HarnessOptions {
    let mut emergency = fast_emergency();
    emergency.guardian = Some(EmergencyContact::personal("بنتي", GUARDIAN));
    HarnessOptions {
        mode,
        emergency,
        ..HarnessOptions::default()
    }
}

fn started(outcome: TriggerOutcome) -> uuid::Uuid {
    match outcome {
        TriggerOutcome::Started(id) => id,
        other => panic!("expected a new episode, got {other:?}"),
    }
}

#[tokio::test]
async fn test_dials_in_order_until_answered() {
    let h = Harness::new(HarnessOptions::default());

    let id = started(h.preemptor.trigger("نجدة", true).await);
    assert!(h.preemptor.is_active());
    assert_eq!(h.state.get(), ConversationState::EmergencyActive);

    let dialer = h.dialer.clone();
    assert!(eventually(|| dialer.dialed().len() >= 4).await);
    assert_eq!(h.dialer.dialed()[..4], [PERSONAL, "123", "122", "180"]);

    assert!(h.preemptor.report_answered());
    let preemptor = h.preemptor.clone();
    assert!(eventually(|| !preemptor.is_active()).await);

    // Session loop is not running, so the state rests at Idle
    assert_eq!(h.state.get(), ConversationState::Idle);
    assert!(h.preemptor.episode().is_none());
    assert_eq!(
        h.notifier.signals(),
        vec![
            AlertSignal::Started {
                episode_id: id,
                reason: "نجدة".to_string(),
            },
            AlertSignal::Cleared { episode_id: id },
        ]
    );
}

#[tokio::test]
async fn test_alerts_only_personal_contacts() {
    let h = Harness::new(HarnessOptions::default());
    started(h.preemptor.trigger("نجدة", true).await);

    let dialer = h.dialer.clone();
    assert!(eventually(|| !dialer.alerts().is_empty()).await);
    assert_eq!(h.dialer.alerts(), vec![PERSONAL.to_string()]);

    let synth = h.synth.clone();
    assert!(eventually(|| synth.said(EMERGENCY_ANNOUNCEMENT)).await);

    h.preemptor.cancel();
}

#[tokio::test]
async fn test_unanswered_pass_repeats() {
    let h = Harness::new(HarnessOptions::default());
    started(h.preemptor.trigger("نجدة", true).await);

    let dialer = h.dialer.clone();
    assert!(eventually(|| dialer.dialed().len() >= 5).await);
    assert_eq!(h.dialer.dialed()[4], PERSONAL);

    let episode = h.preemptor.episode().unwrap();
    assert!(episode.passes >= 1);
    assert!(episode.attempts >= 5);
    assert!(h.preemptor.is_active());

    assert!(h.preemptor.cancel());
}

#[tokio::test]
async fn test_failed_dial_retried_once() {
    let h = Harness::new(HarnessOptions {
        dialer: RecordingDialer::failing(&[PERSONAL]),
        ..HarnessOptions::default()
    });
    started(h.preemptor.trigger("نجدة", true).await);

    let dialer = h.dialer.clone();
    assert!(eventually(|| dialer.dialed().len() >= 3).await);
    assert_eq!(h.dialer.dialed()[..3], [PERSONAL, PERSONAL, "123"]);

    h.preemptor.cancel();
}

#[tokio::test]
async fn test_trigger_while_active_keeps_episode() {
    let h = Harness::new(HarnessOptions::default());
    let id = started(h.preemptor.trigger("نجدة", true).await);

    assert_eq!(
        h.preemptor.trigger("الحقوني", true).await,
        TriggerOutcome::AlreadyActive(id)
    );
    assert_eq!(
        h.preemptor.trigger("الحقوني", false).await,
        TriggerOutcome::AlreadyActive(id)
    );
    assert_eq!(h.preemptor.episode().unwrap().reason, "نجدة");

    h.preemptor.cancel();
}

#[tokio::test]
async fn test_unforced_trigger_asks_first() {
    let h = Harness::new(HarnessOptions {
        script: vec![Some("لا"), Some("أيوة")],
        ..HarnessOptions::default()
    });

    assert_eq!(
        h.preemptor.trigger("وقعت", false).await,
        TriggerOutcome::Declined
    );
    assert!(h.synth.said(CONFIRM_EMERGENCY_PROMPT));
    assert!(!h.preemptor.is_active());
    assert!(h.dialer.dialed().is_empty());
    assert_eq!(h.state.get(), ConversationState::Idle);

    started(h.preemptor.trigger("وقعت", false).await);
    assert!(h.preemptor.is_active());

    h.preemptor.cancel();
}

#[tokio::test]
async fn test_senior_trigger_skips_confirmation() {
    let h = Harness::new(HarnessOptions {
        mode: InteractionMode {
            senior: true,
            privacy: false,
        },
        ..HarnessOptions::default()
    });

    started(h.preemptor.trigger("وقعت", false).await);
    assert_eq!(h.recognizer.listens(), 0);
    assert!(!h.synth.said(CONFIRM_EMERGENCY_PROMPT));

    h.preemptor.cancel();
}

#[tokio::test]
async fn test_cancel_stops_dialing() {
    let h = Harness::new(HarnessOptions::default());
    let id = started(h.preemptor.trigger("نجدة", true).await);

    let dialer = h.dialer.clone();
    assert!(eventually(|| !dialer.dialed().is_empty()).await);

    assert!(h.preemptor.cancel());
    assert!(!h.preemptor.is_active());
    assert!(!h.preemptor.cancel());
    assert!(!h.preemptor.report_answered());

    let placed = h.dialer.dialed().len();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(h.dialer.dialed().len(), placed);

    assert_eq!(h.state.get(), ConversationState::Idle);
    assert!(
        h.notifier
            .signals()
            .contains(&AlertSignal::Cleared { episode_id: id })
    );
}

#[tokio::test]
async fn test_emergency_closes_open_confirmation() {
    let h = Harness::new(HarnessOptions::default());

    let gate = Arc::clone(&h.gate);
    let pending =
        tokio::spawn(async move { gate.confirm("عايز تتصل بأمي؟", Duration::from_secs(10)).await });

    let gate = Arc::clone(&h.gate);
    assert!(eventually(|| gate.is_pending()).await);

    // A busy gate cannot ask, so the episode starts unconfirmed
    started(h.preemptor.trigger("وقعت", false).await);

    let confirmed = tokio::time::timeout(Duration::from_millis(500), pending)
        .await
        .expect("confirmation should close")
        .unwrap();
    assert!(!confirmed);
    assert!(!h.gate.is_pending());

    h.preemptor.cancel();
}

#[tokio::test]
async fn test_fall_episode_uses_fall_wording() {
    let h = Harness::new(HarnessOptions::default());
    let id = started(h.preemptor.trigger(TriggerReason::Fall, true).await);

    let synth = h.synth.clone();
    assert!(eventually(|| synth.said(FALL_ANNOUNCEMENT)).await);
    assert!(!h.synth.said(EMERGENCY_ANNOUNCEMENT));

    let dialer = h.dialer.clone();
    assert!(eventually(|| dialer.alert_to(PERSONAL).is_some()).await);
    assert_eq!(
        h.dialer.alert_to(PERSONAL).as_deref(),
        Some("وقع ومحتاج مساعدة")
    );

    let episode = h.preemptor.episode().unwrap();
    assert!(episode.fall);
    assert_eq!(
        h.notifier.signals()[0],
        AlertSignal::Started {
            episode_id: id,
            reason: "سقوط".to_string(),
        }
    );

    h.preemptor.cancel();
}

#[tokio::test]
async fn test_senior_mode_texts_guardian() {
    let h = Harness::new(with_guardian(SENIOR));
    started(h.preemptor.trigger("نجدة", false).await);

    let dialer = h.dialer.clone();
    assert!(eventually(|| dialer.alert_to(GUARDIAN).is_some()).await);
    let message = h.dialer.alert_to(GUARDIAN).unwrap();
    assert!(message.contains("نجدة"), "{message}");
    assert!(h.dialer.alert_to(PERSONAL).is_some());

    let synth = h.synth.clone();
    assert!(eventually(|| synth.said(GUARDIAN_ANNOUNCEMENT)).await);

    // Texted, never dialed
    assert!(eventually(|| dialer.dialed().len() >= 4).await);
    assert!(!h.dialer.dialed().contains(&GUARDIAN.to_string()));

    h.preemptor.cancel();
}

#[tokio::test]
async fn test_guardian_left_alone_outside_senior_mode() {
    let h = Harness::new(with_guardian(InteractionMode::default()));
    started(h.preemptor.trigger("نجدة", true).await);

    let dialer = h.dialer.clone();
    assert!(eventually(|| dialer.alert_to(PERSONAL).is_some()).await);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(h.dialer.alert_to(GUARDIAN).is_none());
    assert!(!h.synth.said(GUARDIAN_ANNOUNCEMENT));

    h.preemptor.cancel();
}

#[tokio::test]
async fn test_trigger_after_shutdown_leaves_nothing_behind() {
    let h = Harness::new(HarnessOptions::default());
    h.governor.shutdown(Duration::from_millis(10)).await;

    assert_eq!(
        h.preemptor.trigger("نجدة", true).await,
        TriggerOutcome::Failed
    );
    assert!(!h.preemptor.is_active());
    assert!(h.preemptor.episode().is_none());
    assert_eq!(h.state.get(), ConversationState::Idle);

    // Nothing is stuck, so a later trigger is not "already active"
    assert_eq!(
        h.preemptor.trigger("نجدة", true).await,
        TriggerOutcome::Failed
    );

    let synth = h.synth.clone();
    assert!(eventually(|| synth.said(DIAL_UNAVAILABLE_ANNOUNCEMENT)).await);
    assert!(h.dialer.dialed().is_empty());

    let signals = h.notifier.signals();
    assert!(matches!(signals[0], AlertSignal::Started { .. }));
    assert!(matches!(signals[1], AlertSignal::Cleared { .. }));
}

#[tokio::test]
async fn test_console_commands_drive_episode() {
    let h = Harness::new(HarnessOptions::default());

    let fall = ConsoleCommand::parse("/fall", h.preemptor.is_active()).unwrap();
    assert!(fall.apply(&h.preemptor).await);
    assert!(h.preemptor.episode().unwrap().fall);

    // Saying you are fine ends it while it is running
    let safe = ConsoleCommand::parse("أنا كويس", h.preemptor.is_active()).unwrap();
    assert!(safe.apply(&h.preemptor).await);
    assert!(!h.preemptor.is_active());
    assert_eq!(h.state.get(), ConversationState::Idle);

    started(h.preemptor.trigger("نجدة", true).await);
    let dialer = h.dialer.clone();
    assert!(eventually(|| !dialer.dialed().is_empty()).await);
    assert!(ConsoleCommand::Answered.apply(&h.preemptor).await);
    let preemptor = h.preemptor.clone();
    assert!(eventually(|| !preemptor.is_active()).await);

    started(h.preemptor.trigger("نجدة", true).await);
    assert!(ConsoleCommand::Cancel.apply(&h.preemptor).await);
    assert!(!ConsoleCommand::Cancel.apply(&h.preemptor).await);
    assert!(!h.preemptor.is_active());
}
