//! Egyptian-dialect lexicon
//!
//! Text normalization, keyword tables and the rule resolver used when no
//! model is available. Every table here is plain data; the resolver is a
//! total function over any input.

use crate::intent::{Entities, IntentKind, IntentResult, ResolutionPath};

/// Confidence assigned to keyword matches
pub const RULE_CONFIDENCE: f32 = 0.6;

/// Phrases that always mean the user needs help now
pub const EMERGENCY_TERMS: &[&str] = &[
    "نجدة",
    "النجدة",
    "استغاثة",
    "طوارئ",
    "الطوارئ",
    "مش قادر",
    "حد يجي",
    "إسعاف",
    "اسعاف",
    "الإسعاف",
    "الاسعاف",
    "شرطة",
    "الشرطة",
    "حرقان",
    "حريقة",
    "طلق ناري",
    "الحقوني",
    "الحقني",
    "help",
    "emergency",
    "urgent",
    "danger",
];

/// Replies that accept a confirmation
pub const AFFIRMATIVE: &[&str] = &[
    "نعم", "أكيد", "اكيد", "تمام", "أيوة", "ايوة", "أيوه", "ايوه", "صح", "صحيح", "ماشي", "yes",
    "ok",
];

/// Replies that refuse a confirmation
pub const NEGATIVE: &[&str] = &[
    "لا", "لأ", "لاء", "مش", "مفيش", "بلاش", "لغي", "الغي", "no",
];

/// Phrases that end an emergency when the user is safe
pub const ALL_CLEAR: &[&str] = &[
    "خلاص",
    "أنا كويس",
    "انا كويس",
    "أنا كويسة",
    "انا كويسة",
    "أنا بخير",
    "انا بخير",
];

const CALL_VERBS: &[&str] = &["اتصل", "كلم", "رن", "اتكلم", "كلملي", "رنلي"];

const MESSAGE_WORDS: &[&str] = &["واتساب", "الواتساب", "ابعت", "ابعتلي", "رساله", "رسالة"];

const ALARM_WORDS: &[&str] = &[
    "نبهني", "انبهني", "ذكرني", "صحيني", "منبه", "المنبه", "تذكير", "التذكير",
];

const CANCEL_WORDS: &[&str] = &["الغي", "لغي", "إلغاء", "الغاء", "امسح", "شيل", "وقف"];

const MISSED_CALL_WORDS: &[&str] = &["فايتة", "فايتات", "الفايتة", "المكالمات", "شوفلي"];

const TIME_WORDS: &[&str] = &["الساعه", "الساعة", "الوقت"];

const VOLUME_WORD: &str = "الصوت";

const VOLUME_UP_WORDS: &[&str] = &["علي", "ارفع", "زود", "عالي"];

const VOLUME_DOWN_WORDS: &[&str] = &["وطي", "وطى", "اخفض", "قلل", "واطي"];

/// Words that never belong to a contact name
const FILLER_WORDS: &[&str] = &[
    "دلوقتي", "حالا", "بسرعة", "لو", "سمحت", "فضلك", "من", "على", "يا", "بقى",
];

const MESSAGE_LEADS: &[&str] = &["قوله", "قولها", "وقوله", "وقولها", "وقول", "قول"];

/// Names that start with the letter also used as the "to/with" prefix
const NAMES_WITH_BA: &[&str] = &[
    "باسم", "بسمة", "بلال", "بكر", "بسنت", "بهاء", "بشير", "بثينة", "بدر", "بسام",
];

/// Everyday words seen in commands, used to score unfamiliar input
const COMMON_WORDS: &[&str] = &[
    "يا", "صاحبي", "كبير", "عايز", "عايزة", "ممكن", "لو", "سمحت", "من", "فضلك", "على", "في",
    "انا", "أنا", "بس", "دلوقتي", "النهارده", "بكرة", "بكره", "الصبح", "بالليل", "كام", "مين",
    "إيه", "ايه", "فين", "امتى", "إمتى", "اللي", "هو", "هي", "ده", "دي", "مع", "عشان", "شوية",
    "أمي", "امي", "ماما", "أبويا", "ابويا", "بابا", "أخويا", "اخويا", "أختي", "اختي", "ابني",
    "بنتي", "جوزي", "مراتي", "الدكتور", "جدي", "تيتا", "حبيبي", "اني", "إني", "جاي", "هتأخر",
];

/// Normalize a transcript for matching
///
/// Trims, collapses whitespace, lowercases Latin letters and drops
/// diacritics, tatweel and punctuation. Letter forms are left untouched.
#[must_use]
pub fn normalize(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| !is_mark(*c))
        .map(|c| if is_punctuation(c) { ' ' } else { c })
        .flat_map(char::to_lowercase)
        .collect();

    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

const fn is_mark(c: char) -> bool {
    matches!(c, '\u{064B}'..='\u{0652}' | '\u{0670}' | '\u{0640}')
}

const fn is_punctuation(c: char) -> bool {
    matches!(
        c,
        '؟' | '?' | '!' | '.' | '،' | ',' | '؛' | ';' | '"' | '\'' | '(' | ')' | '-'
    )
}

/// Whether the text names an emergency
#[must_use]
pub fn is_emergency(normalized: &str) -> bool {
    contains_any(normalized, EMERGENCY_TERMS)
}

/// Whether the text says the user is safe
///
/// Anything negated with "مش" is not an all-clear.
#[must_use]
pub fn is_all_clear(normalized: &str) -> bool {
    contains_any(normalized, ALL_CLEAR) && !contains_token(normalized, &["مش"])
}

/// Whether a token is in any table or is a number
#[must_use]
pub fn is_known(token: &str) -> bool {
    if token.chars().any(is_digit) {
        return true;
    }
    variants(token).any(|v| VOCABULARY.iter().any(|table| table.contains(&v)))
}

const VOCABULARY: &[&[&str]] = &[
    EMERGENCY_TERMS,
    AFFIRMATIVE,
    NEGATIVE,
    CALL_VERBS,
    MESSAGE_WORDS,
    ALARM_WORDS,
    CANCEL_WORDS,
    MISSED_CALL_WORDS,
    TIME_WORDS,
    VOLUME_UP_WORDS,
    VOLUME_DOWN_WORDS,
    FILLER_WORDS,
    MESSAGE_LEADS,
    COMMON_WORDS,
    &[VOLUME_WORD],
];

const fn is_digit(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, '\u{0660}'..='\u{0669}')
}

/// Token plus its forms without a one-letter prefix or a "لي" suffix
fn variants(token: &str) -> impl Iterator<Item = &str> {
    let prefixed = ['ب', 'و', 'ل']
        .into_iter()
        .filter_map(move |p| token.strip_prefix(p))
        .filter(|rest| rest.chars().count() >= 2);
    let suffixed = token
        .strip_suffix("لي")
        .filter(|rest| rest.chars().count() >= 2);
    std::iter::once(token).chain(prefixed).chain(suffixed)
}

/// Whether a table term occurs in the text
///
/// Single words match a token or its prefixed forms. Multi-word terms match
/// a run of consecutive whole tokens.
fn contains_any(normalized: &str, terms: &[&str]) -> bool {
    let tokens: Vec<&str> = normalized.split_whitespace().collect();
    terms.iter().any(|term| {
        let words: Vec<&str> = term.split_whitespace().collect();
        match words.as_slice() {
            [] => false,
            [word] => tokens.iter().any(|token| variants(token).any(|v| v == *word)),
            _ => tokens.windows(words.len()).any(|run| run == words.as_slice()),
        }
    })
}

/// Whether the text contains a whole-token match
#[must_use]
pub fn contains_token(normalized: &str, words: &[&str]) -> bool {
    normalized
        .split_whitespace()
        .any(|token| words.contains(&token))
}

/// Classify text by keyword tables alone
#[must_use]
pub fn classify(normalized: &str) -> IntentKind {
    if is_emergency(normalized) {
        IntentKind::Emergency
    } else if contains_any(normalized, ALARM_WORDS) {
        if contains_any(normalized, CANCEL_WORDS) {
            IntentKind::CancelAlarm
        } else {
            IntentKind::SetAlarm
        }
    } else if contains_any(normalized, MISSED_CALL_WORDS) {
        IntentKind::ReadMissedCalls
    } else if contains_any(normalized, MESSAGE_WORDS) {
        IntentKind::SendMessage
    } else if contains_any(normalized, CALL_VERBS) {
        IntentKind::CallContact
    } else if contains_token(normalized, &[VOLUME_WORD]) {
        if contains_token(normalized, VOLUME_DOWN_WORDS) {
            IntentKind::VolumeDown
        } else if contains_token(normalized, VOLUME_UP_WORDS) {
            IntentKind::VolumeUp
        } else {
            IntentKind::Unknown
        }
    } else if contains_any(normalized, TIME_WORDS) {
        IntentKind::ReadTime
    } else {
        IntentKind::Unknown
    }
}

/// Resolve text with keyword rules; never fails
#[must_use]
pub fn resolve(normalized: &str) -> IntentResult {
    match classify(normalized) {
        IntentKind::Unknown => IntentResult::unknown(ResolutionPath::Rule),
        IntentKind::Emergency => IntentResult::new(
            IntentKind::Emergency,
            Entities::default(),
            1.0,
            ResolutionPath::Rule,
        ),
        intent => IntentResult::new(
            intent,
            extract_entities(intent, normalized),
            RULE_CONFIDENCE,
            ResolutionPath::Rule,
        ),
    }
}

/// Pull slots for an intent out of normalized text
#[must_use]
pub fn extract_entities(intent: IntentKind, normalized: &str) -> Entities {
    let tokens: Vec<&str> = normalized.split_whitespace().collect();
    match intent {
        IntentKind::CallContact => Entities {
            contact: contact_after(&tokens, CALL_VERBS),
            ..Entities::default()
        },
        IntentKind::SendMessage => message_entities(&tokens),
        IntentKind::SetAlarm | IntentKind::CancelAlarm => Entities {
            time: time_phrase(&tokens),
            ..Entities::default()
        },
        _ => Entities::default(),
    }
}

fn keyword_position(tokens: &[&str], words: &[&str]) -> Option<usize> {
    tokens
        .iter()
        .position(|token| variants(token).any(|v| words.contains(&v)))
}

fn contact_after(tokens: &[&str], verbs: &[&str]) -> Option<String> {
    let start = keyword_position(tokens, verbs)? + 1;
    let words: Vec<&str> = tokens[start..]
        .iter()
        .copied()
        .filter(|t| !FILLER_WORDS.contains(t))
        .collect();
    let (first, rest) = words.split_first()?;
    let mut contact = vec![strip_preposition(first)];
    contact.extend_from_slice(rest);
    Some(contact.join(" "))
}

/// Drop a leading "ب" ("with") unless it belongs to the name
fn strip_preposition(token: &str) -> &str {
    if NAMES_WITH_BA.contains(&token) {
        return token;
    }
    token
        .strip_prefix('ب')
        .filter(|rest| rest.chars().count() >= 2)
        .unwrap_or(token)
}

fn message_entities(tokens: &[&str]) -> Entities {
    let Some(start) = keyword_position(tokens, MESSAGE_WORDS) else {
        return Entities::default();
    };
    let after = &tokens[start + 1..];
    let Some(target) = after
        .iter()
        .position(|t| t.starts_with('ل') && t.chars().count() > 2 && !MESSAGE_WORDS.contains(t))
    else {
        return Entities::default();
    };

    let contact = after[target]
        .strip_prefix('ل')
        .map(str::to_string);
    let body: Vec<&str> = after[target + 1..]
        .iter()
        .copied()
        .skip_while(|t| MESSAGE_LEADS.contains(t))
        .collect();
    let message = if body.is_empty() {
        None
    } else {
        Some(body.join(" "))
    };

    Entities {
        contact,
        message,
        ..Entities::default()
    }
}

fn time_phrase(tokens: &[&str]) -> Option<String> {
    if let Some(pos) = keyword_position(tokens, TIME_WORDS) {
        let phrase: Vec<&str> = tokens[pos + 1..].iter().copied().take(3).collect();
        if !phrase.is_empty() {
            return Some(phrase.join(" "));
        }
    }
    tokens
        .iter()
        .find(|t| t.chars().any(is_digit))
        .map(|t| (*t).to_string())
}
