//! Utterance complexity scoring

use crate::lexicon;

/// Token count at which the length term saturates
const LENGTH_SATURATION: f32 = 12.0;

const LENGTH_WEIGHT: f32 = 0.4;
const AMBIGUITY_WEIGHT: f32 = 0.3;
const UNKNOWN_WEIGHT: f32 = 0.3;

/// Hedges and alternatives that make intent harder to pin down
pub const AMBIGUOUS_MARKERS: &[&str] = &[
    "ولا", "او", "أو", "يمكن", "مش عارف", "حاجة", "الحاجة",
];

/// Score normalized text in `[0, 1]`; higher means harder for a small model
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn score(normalized: &str) -> f32 {
    let tokens: Vec<&str> = normalized.split_whitespace().collect();
    if tokens.is_empty() {
        return 0.0;
    }

    let length = (tokens.len() as f32 / LENGTH_SATURATION).min(1.0);
    let ambiguity = if has_ambiguity(&tokens) { 1.0 } else { 0.0 };
    let unknown = tokens.iter().filter(|t| !lexicon::is_known(t)).count() as f32
        / tokens.len() as f32;

    LENGTH_WEIGHT
        .mul_add(length, AMBIGUITY_WEIGHT.mul_add(ambiguity, UNKNOWN_WEIGHT * unknown))
        .clamp(0.0, 1.0)
}

fn has_ambiguity(tokens: &[&str]) -> bool {
    AMBIGUOUS_MARKERS.iter().any(|marker| {
        let words: Vec<&str> = marker.split_whitespace().collect();
        tokens.windows(words.len().max(1)).any(|run| run == words.as_slice())
    })
}
