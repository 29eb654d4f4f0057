//! Input canonicalization and secondary-fragment merging
//!
//! Canonical form: single spaces, ASCII dashes and quotes, meridiem glued to
//! its digits (`2 p.m.` → `2pm`) and clock separators tightened (`2 : 30` →
//! `2:30`, `2.30pm` → `2:30pm`). All downstream spans index into this form.

use crate::extract::lexicon::{self, Cues};
use regex::{Captures, Regex};
use std::collections::HashSet;
use std::sync::LazyLock;

static MERIDIEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d)\s*([ap])\.?\s?m\b\.?").unwrap());

static SPACED_COLON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d)\s*:\s*(\d{2})\b").unwrap());

static DOTTED_CLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})\.(\d{2})(am|pm)\b").unwrap());

/// Canonical text handed to every extraction stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText {
    pub text: String,
    /// Whether the secondary fragment was folded in.
    pub merged_secondary: bool,
    /// Why a provided secondary fragment was left out.
    pub secondary_note: Option<String>,
}

/// Canonicalizes text and decides whether to merge a secondary fragment.
///
/// Pure and allocation-light; no external calls.
#[derive(Debug, Clone)]
pub struct TextNormalizer {
    /// Word-set Jaccard similarity at or above which fragments are duplicates.
    duplicate_threshold: f64,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TextNormalizer {
    pub fn new() -> Self {
        Self {
            duplicate_threshold: 0.8,
        }
    }

    pub fn with_duplicate_threshold(mut self, threshold: f64) -> Self {
        self.duplicate_threshold = threshold;
        self
    }

    /// Canonicalize whitespace, punctuation and time artifacts.
    pub fn canonicalize(&self, text: &str) -> String {
        let mapped: String = text
            .chars()
            .map(|c| match c {
                '\u{00A0}' | '\u{2007}' | '\u{202F}' | '\t' | '\n' | '\r' => ' ',
                '\u{2010}'..='\u{2015}' | '\u{2212}' => '-',
                '\u{2018}' | '\u{2019}' | '\u{02BC}' => '\'',
                '\u{201C}' | '\u{201D}' => '"',
                other => other,
            })
            .collect();

        let glued = MERIDIEM.replace_all(&mapped, |caps: &Captures| {
            format!("{}{}m", &caps[1], caps[2].to_ascii_lowercase())
        });
        let tightened = SPACED_COLON.replace_all(&glued, "$1:$2");
        let dotted = DOTTED_CLOCK.replace_all(&tightened, "$1:$2$3");

        dotted.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Canonicalize the primary text and merge the secondary fragment when
    /// it is neither a near-duplicate nor lexically redundant.
    pub fn normalize(&self, primary: &str, secondary: Option<&str>) -> NormalizedText {
        let primary = self.canonicalize(primary);

        let Some(secondary) = secondary.map(|s| self.canonicalize(s)) else {
            return NormalizedText {
                text: primary,
                merged_secondary: false,
                secondary_note: None,
            };
        };

        if secondary.is_empty() {
            return NormalizedText {
                text: primary,
                merged_secondary: false,
                secondary_note: None,
            };
        }

        if primary.is_empty() {
            return NormalizedText {
                text: secondary,
                merged_secondary: true,
                secondary_note: None,
            };
        }

        if self.is_near_duplicate(&primary, &secondary) {
            return NormalizedText {
                text: primary,
                merged_secondary: false,
                secondary_note: Some("secondary text ignored: near-duplicate of primary".into()),
            };
        }

        if !is_complementary(&Cues::detect(&primary), &Cues::detect(&secondary)) {
            return NormalizedText {
                text: primary,
                merged_secondary: false,
                secondary_note: Some("secondary text ignored: adds no complementary cue".into()),
            };
        }

        NormalizedText {
            text: format!("{} {}", primary, secondary),
            merged_secondary: true,
            secondary_note: None,
        }
    }

    fn is_near_duplicate(&self, a: &str, b: &str) -> bool {
        let a_lower = a.to_lowercase();
        let b_lower = b.to_lowercase();
        if a_lower.contains(&b_lower) || b_lower.contains(&a_lower) {
            return true;
        }

        let a_words: HashSet<String> = lexicon::words(a).into_iter().collect();
        let b_words: HashSet<String> = lexicon::words(b).into_iter().collect();
        let union = a_words.union(&b_words).count();
        if union == 0 {
            return true;
        }
        let intersection = a_words.intersection(&b_words).count();
        intersection as f64 / union as f64 >= self.duplicate_threshold
    }
}

/// One fragment carries a date and the other a time, or one a location and
/// the other an event.
fn is_complementary(a: &Cues, b: &Cues) -> bool {
    (a.date && b.time)
        || (a.time && b.date)
        || (a.location && b.event)
        || (a.event && b.location)
}
