//! Spoken prompts and confirmation wording

use crate::intent::{IntentKind, IntentResult, InteractionMode};

/// Wake acknowledgement
pub const WAKE_PROMPT: &str = "أوامرك؟";

/// Wake acknowledgement in senior mode
pub const SENIOR_WAKE_PROMPT: &str = "قول يا كبير";

/// Spoken after a failed turn
pub const APOLOGY: &str = "معلش، حصلت مشكلة. حاول تاني";

pub const NOT_UNDERSTOOD: &str = "مش فاهمك. قول حاجة تانية";

pub const SENIOR_RESTRICTED: &str = "الأمر ده مش متاح في وضع كبار السن";

/// Spoken when a confirmation is refused or runs out
pub const DECLINED: &str = "تمام، مش هعمل حاجة";

/// Spoken when nothing can carry out the intent
pub const UNSUPPORTED: &str = "الأمر ده مش متاح دلوقتي";

/// Results below this confidence are treated as not understood
pub const UNDERSTOOD_FLOOR: f32 = 0.5;

/// Wake acknowledgement for a mode
#[must_use]
pub const fn wake_prompt(mode: InteractionMode) -> &'static str {
    if mode.senior {
        SENIOR_WAKE_PROMPT
    } else {
        WAKE_PROMPT
    }
}

/// Confirmation question for a sensitive intent
///
/// Returns `None` when the intent runs without confirmation.
#[must_use]
pub fn confirmation_prompt(result: &IntentResult) -> Option<String> {
    if !result.intent.is_sensitive() {
        return None;
    }

    let entities = &result.entities;
    let prompt = match result.intent {
        IntentKind::CallContact => entities.contact.as_ref().map_or_else(
            || "عايز تعمل مكالمة؟".to_string(),
            |contact| format!("عايز تتصل بـ{contact}؟"),
        ),
        IntentKind::SendMessage => entities.contact.as_ref().map_or_else(
            || "عايز تبعت الرسالة؟".to_string(),
            |contact| format!("عايز تبعت رسالة لـ{contact}؟"),
        ),
        IntentKind::CancelAlarm => entities.time.as_ref().map_or_else(
            || "عايز تلغي المنبه؟".to_string(),
            |time| format!("عايز تلغي منبه {time}؟"),
        ),
        _ => "متأكد؟".to_string(),
    };
    Some(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{Entities, ResolutionPath};

    fn result(intent: IntentKind, entities: Entities) -> IntentResult {
        IntentResult::new(intent, entities, 0.9, ResolutionPath::Local)
    }

    #[test]
    fn test_call_prompt_names_contact() {
        let entities = Entities {
            contact: Some("أمي".to_string()),
            ..Entities::default()
        };
        let prompt = confirmation_prompt(&result(IntentKind::CallContact, entities));
        assert_eq!(prompt.as_deref(), Some("عايز تتصل بـأمي؟"));
    }

    #[test]
    fn test_every_sensitive_intent_has_prompt() {
        for intent in [
            IntentKind::CallContact,
            IntentKind::SendMessage,
            IntentKind::CancelAlarm,
        ] {
            assert!(confirmation_prompt(&result(intent, Entities::default())).is_some());
        }
    }

    #[test]
    fn test_harmless_intents_skip_confirmation() {
        for intent in [IntentKind::ReadTime, IntentKind::SetAlarm, IntentKind::VolumeUp] {
            assert!(confirmation_prompt(&result(intent, Entities::default())).is_none());
        }
    }

    #[test]
    fn test_senior_wake_prompt() {
        let senior = InteractionMode {
            senior: true,
            privacy: false,
        };
        assert_eq!(wake_prompt(senior), SENIOR_WAKE_PROMPT);
        assert_eq!(wake_prompt(InteractionMode::default()), WAKE_PROMPT);
    }
}
