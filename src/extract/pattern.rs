//! Deterministic rule-based first pass
//!
//! Temporal fields go through [`TemporalScan`]. Location, title and
//! description are read from the same canonical text, with title taking
//! whatever the other rules left unclaimed.

use super::lexicon::{self, EVENT_KEYWORDS, ONLINE_VENUES, VENUE_KEYWORDS};
use super::temporal::{self, TemporalScan};
use crate::config::ExtractionConfig;
use crate::event::{Field, FieldMap, FieldResult, FieldValue, Source, Span};
use chrono::NaiveDateTime;
use regex::Regex;
use std::sync::LazyLock;

static ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{1,5}\s+(?:[A-Z][A-Za-z]*\s+){1,3}(?:St|Street|Ave|Avenue|Rd|Road|Blvd|Boulevard|Dr|Drive|Ln|Lane|Way|Pl|Place|Ct|Court)\b\.?")
        .unwrap()
});

static ONLINE: LazyLock<Regex> = LazyLock::new(|| {
    let aliases = ONLINE_VENUES
        .iter()
        .map(|(alias, _)| regex::escape(alias).replace(' ', r"\s+"))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:on|via|over)\s+({})\b", aliases)).unwrap()
});

static ROOM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:[Rr]oom|[Rr]m\.?|[Ss]uite)\s+[A-Z0-9][A-Za-z0-9-]*\b").unwrap()
});

static PREPOSITION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:\b(?:at|in)\b|@)\s*").unwrap());

static DESCRIPTION_CUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:notes?|agenda|details|description)\s*:\s*(.+)$").unwrap()
});

/// Compile every rule table now instead of on first match.
pub(crate) fn compile_rules() {
    lexicon::compile_rules();
    temporal::compile_rules();
    LazyLock::force(&ADDRESS);
    LazyLock::force(&ONLINE);
    LazyLock::force(&ROOM);
    LazyLock::force(&PREPOSITION);
    LazyLock::force(&DESCRIPTION_CUE);
}

/// Words that end a location phrase.
const LOCATION_STOPS: &[&str] = &[
    "at", "on", "for", "with", "to", "from", "by", "until", "till", "and", "about", "re",
    "regarding", "today", "tonight", "tomorrow", "next", "this", "in", "after", "before",
    "around", "then", "but", "so", "because", "if", "when",
];

/// Phrase starts that are never venues.
const NOT_A_VENUE: &[&str] = &[
    "a", "an", "one", "two", "three", "four", "five", "half", "least", "most", "person",
    "progress", "time", "case", "order", "advance", "mind",
];

const LEAD_INS: &[&str] = &[
    "remind me to",
    "remind me about",
    "reminder to",
    "reminder:",
    "reminder",
    "don't forget to",
    "dont forget to",
    "schedule a",
    "schedule an",
    "schedule",
    "set up a",
    "set up an",
    "set up",
    "book a",
    "book an",
    "book",
    "add a",
    "add an",
    "add",
    "create a",
    "create",
    "let's have a",
    "let's do",
    "let's",
    "lets",
    "please",
    "i have a",
    "i have an",
    "i have",
    "we have a",
    "we have",
];

const EDGE_STOPWORDS: &[&str] = &[
    "at", "on", "in", "for", "from", "to", "by", "with", "and", "the", "a", "an", "until",
    "till", "is", "this", "next", "or", "@", "-", "of", "around", "about",
];

const KEYWORD_TITLE: f64 = 0.90;
const SHORT_TITLE: f64 = 0.60;
const LONG_TITLE: f64 = 0.50;
const ADDRESS_LOCATION: f64 = 0.95;
const ONLINE_LOCATION: f64 = 0.90;
const ROOM_LOCATION: f64 = 0.85;
const VENUE_PHRASE: f64 = 0.90;
const PROPER_PHRASE: f64 = 0.75;
const PLAIN_PHRASE: f64 = 0.45;
const CUED_DESCRIPTION: f64 = 0.95;
const VERBATIM_DESCRIPTION: f64 = 0.85;

/// A location reading: the value, the text it claims and how sure we are.
#[derive(Debug, Clone, PartialEq)]
struct LocationMatch {
    value: String,
    /// Includes the leading preposition so title masking removes it too.
    claim: Span,
    span: Span,
    confidence: f64,
}

/// Deterministic, pure, bounded by input length.
#[derive(Debug, Clone)]
pub struct PatternExtractor {
    default_duration_minutes: i64,
}

impl Default for PatternExtractor {
    fn default() -> Self {
        Self::from_config(&ExtractionConfig::default())
    }
}

impl PatternExtractor {
    /// Compiles the rule tables up front so the first request's field
    /// timeouts only measure matching.
    pub fn new(default_duration_minutes: i64) -> Self {
        compile_rules();
        Self {
            default_duration_minutes,
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(config.default_duration_minutes)
    }

    /// Resolve one field. `resolved` holds already-settled dependencies
    /// (start and duration for end).
    pub fn extract(
        &self,
        field: Field,
        text: &str,
        reference: NaiveDateTime,
        resolved: &FieldMap,
    ) -> Option<FieldResult> {
        let today = reference.date();
        match field {
            Field::Start => TemporalScan::scan(text, today).resolve_start(today),
            Field::Duration => TemporalScan::scan(text, today).resolve_duration(),
            Field::End => self.derive_end(text, reference, resolved),
            Field::Title => title(text, today),
            Field::Location => {
                let scan = TemporalScan::scan(text, today);
                location(text, &scan.spans()).map(|m| {
                    FieldResult::new(Field::Location, FieldValue::Text(m.value), Source::Pattern, m.confidence)
                        .with_span(m.span)
                })
            }
            Field::Description => Some(description(text)),
        }
    }

    /// End from an explicit end time, else start plus the stated or default
    /// duration. Used again after later stages settle start.
    pub fn derive_end(&self, text: &str, reference: NaiveDateTime, resolved: &FieldMap) -> Option<FieldResult> {
        let today = reference.date();
        TemporalScan::scan(text, today).resolve_end(
            today,
            resolved.get(&Field::Start),
            resolved.get(&Field::Duration),
            self.default_duration_minutes,
        )
    }
}

fn inside_any(pos: usize, spans: &[Span]) -> bool {
    spans.iter().any(|s| s.start <= pos && pos < s.end)
}

/// Candidate locations, earliest offset first.
fn location_matches(text: &str, temporal: &[Span]) -> Vec<LocationMatch> {
    let mut found = Vec::new();

    for m in ADDRESS.find_iter(text) {
        let span = Span::new(m.start(), m.end());
        found.push(LocationMatch {
            value: m.as_str().trim_end_matches('.').to_string(),
            claim: extend_over_preposition(text, span),
            span,
            confidence: ADDRESS_LOCATION,
        });
    }

    for caps in ONLINE.captures_iter(text) {
        let (Some(whole), Some(alias)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let key = alias.as_str().to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ");
        let Some((_, display)) = ONLINE_VENUES.iter().find(|(a, _)| *a == key) else {
            continue;
        };
        let span = Span::new(whole.start(), whole.end());
        found.push(LocationMatch {
            value: display.to_string(),
            claim: span,
            span: Span::new(alias.start(), alias.end()),
            confidence: ONLINE_LOCATION,
        });
    }

    for m in ROOM.find_iter(text) {
        let span = Span::new(m.start(), m.end());
        found.push(LocationMatch {
            value: m.as_str().to_string(),
            claim: extend_over_preposition(text, span),
            span,
            confidence: ROOM_LOCATION,
        });
    }

    for m in PREPOSITION.find_iter(text) {
        if inside_any(m.start(), temporal) || inside_any(m.end(), temporal) {
            continue;
        }
        if let Some(phrase) = venue_phrase(text, m.end(), temporal) {
            found.push(LocationMatch {
                claim: Span::new(m.start(), phrase.span.end),
                ..phrase
            });
        }
    }

    found.sort_by(|a, b| {
        a.span
            .start
            .cmp(&b.span.start)
            .then(b.confidence.total_cmp(&a.confidence))
            .then(b.span.len().cmp(&a.span.len()))
    });
    found
}

/// Read a venue phrase starting at `from`, stopping at punctuation, a stop
/// word or a temporal mention.
fn venue_phrase(text: &str, from: usize, temporal: &[Span]) -> Option<LocationMatch> {
    let rest = &text[from..];
    let first = rest.chars().next()?;
    if first.is_ascii_digit() {
        return None;
    }

    let mut end = from;
    let mut words: Vec<&str> = Vec::new();
    for (offset, word) in word_offsets(rest) {
        let start = from + offset;
        if inside_any(start, temporal) || words.len() == 6 {
            break;
        }
        let bare = word.trim_end_matches(|c: char| ",.;!?)".contains(c));
        let lower = bare.to_lowercase();
        if bare.is_empty() || LOCATION_STOPS.contains(&lower.as_str()) {
            break;
        }
        if words.is_empty() && NOT_A_VENUE.contains(&lower.as_str()) {
            return None;
        }
        words.push(bare);
        end = start + bare.len();
        if bare.len() != word.len() {
            break;
        }
    }

    let first_word = *words.first()?;
    let mut start = from;
    let mut phrase_words: &[&str] = &words;
    if first_word.eq_ignore_ascii_case("the") {
        if words.len() == 1 {
            return None;
        }
        phrase_words = &words[1..];
        start = from + rest.find(phrase_words[0])?;
    }

    let lowered: Vec<String> = phrase_words.iter().map(|w| w.to_lowercase()).collect();
    let confidence = if lexicon::contains_any_word(&lowered, VENUE_KEYWORDS) {
        VENUE_PHRASE
    } else if phrase_words[0].chars().next().is_some_and(|c| c.is_uppercase()) {
        PROPER_PHRASE
    } else {
        PLAIN_PHRASE
    };

    let span = Span::new(start, end);
    Some(LocationMatch {
        value: text[span.start..span.end].to_string(),
        claim: span,
        span,
        confidence,
    })
}

fn word_offsets(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.split(' ')
        .scan(0usize, |offset, word| {
            let at = *offset;
            *offset += word.len() + 1;
            Some((at, word))
        })
        .filter(|(_, w)| !w.is_empty())
}

/// Grow a span leftwards over one preceding `at`/`in`/`@`.
fn extend_over_preposition(text: &str, span: Span) -> Span {
    let before = text[..span.start].trim_end();
    for prep in ["at", "in", "@", "on", "via"] {
        if let Some(cut) = strip_suffix_ignore_case(before, prep) {
            let boundary = before[..cut].chars().next_back().map_or(true, |c| !c.is_alphanumeric());
            if boundary || prep == "@" {
                return Span::new(cut, span.end);
            }
        }
    }
    span
}

fn location(text: &str, temporal: &[Span]) -> Option<LocationMatch> {
    location_matches(text, temporal).into_iter().next()
}

fn description(text: &str) -> FieldResult {
    if let Some(body) = DESCRIPTION_CUE.captures(text).and_then(|c| c.get(1)) {
        let value = body.as_str().trim();
        if !value.is_empty() {
            return FieldResult::new(
                Field::Description,
                FieldValue::Text(value.to_string()),
                Source::Pattern,
                CUED_DESCRIPTION,
            )
            .with_span(Span::new(body.start(), body.end()));
        }
    }
    FieldResult::new(
        Field::Description,
        FieldValue::Text(text.to_string()),
        Source::Pattern,
        VERBATIM_DESCRIPTION,
    )
    .with_span(Span::new(0, text.len()))
}

/// Title is what remains once temporal, location and description text is
/// claimed and lead-in filler is stripped.
fn title(text: &str, today: chrono::NaiveDate) -> Option<FieldResult> {
    let scan = TemporalScan::scan(text, today);
    let temporal = scan.spans();
    let mut claimed: Vec<Span> = temporal.iter().map(|s| extend_over_preposition(text, *s)).collect();
    claimed.extend(location_matches(text, &temporal).into_iter().map(|m| m.claim));
    if let Some(whole) = DESCRIPTION_CUE.find(text) {
        claimed.push(Span::new(whole.start(), whole.end()));
    }

    let mut remaining = String::with_capacity(text.len());
    for (i, c) in text.char_indices() {
        if inside_any(i, &claimed) {
            if !remaining.ends_with('|') {
                remaining.push('|');
            }
        } else {
            remaining.push(c);
        }
    }

    let segments: Vec<String> = remaining
        .split(|c: char| matches!(c, '|' | ',' | ';' | '!' | '?' | '(' | ')'))
        .map(clean_segment)
        .filter(|s| !s.is_empty())
        .collect();
    let value = strip_lead_in(&segments.join(" "));
    if value.is_empty() {
        return None;
    }

    let words = lexicon::words(&value);
    let confidence = if lexicon::contains_any_word(&words, EVENT_KEYWORDS) {
        KEYWORD_TITLE
    } else if words.len() <= 6 {
        SHORT_TITLE
    } else {
        LONG_TITLE
    };

    let span = text.find(value.as_str()).map(|start| Span::new(start, start + value.len()));
    let result = FieldResult::new(Field::Title, FieldValue::Text(value), Source::Pattern, confidence);
    Some(match span {
        Some(span) => result.with_span(span),
        None => result,
    })
}

fn clean_segment(segment: &str) -> String {
    let mut words: Vec<&str> = segment.split_whitespace().collect();
    while words
        .first()
        .is_some_and(|w| EDGE_STOPWORDS.contains(&w.to_lowercase().as_str()))
    {
        words.remove(0);
    }
    while words
        .last()
        .is_some_and(|w| EDGE_STOPWORDS.contains(&w.to_lowercase().trim_end_matches('.')))
    {
        words.pop();
    }
    words
        .join(" ")
        .trim_matches(|c: char| c == '.' || c == '-' || c == ':' || c == '"')
        .trim()
        .to_string()
}

fn strip_lead_in(title: &str) -> String {
    let mut current = title.trim().to_string();
    loop {
        let Some(rest) = LEAD_INS.iter().find_map(|lead| {
            let rest = strip_prefix_ignore_case(&current, lead)?;
            rest.chars().next().map_or(true, |c| !c.is_alphanumeric()).then_some(rest)
        }) else {
            break;
        };
        let stripped = rest.trim_start_matches([' ', ':']).to_string();
        if stripped.is_empty() {
            break;
        }
        current = clean_segment(&stripped);
    }
    current
}

/// `text` after an ASCII-case-insensitive `prefix`. Never splits a char.
fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &text[prefix.len()..])
}

/// Byte offset where an ASCII-case-insensitive `suffix` starts.
fn strip_suffix_ignore_case(text: &str, suffix: &str) -> Option<usize> {
    let cut = text.len().checked_sub(suffix.len())?;
    let tail = text.get(cut..)?;
    tail.eq_ignore_ascii_case(suffix).then_some(cut)
}
