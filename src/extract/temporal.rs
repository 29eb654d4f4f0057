//! Rule-based temporal scanning and resolution
//!
//! A scan collects every date, time, range, day-part and duration mention in
//! the canonical text. Overlapping matches are settled by precedence: the
//! match starting at the earliest offset wins, and among equal offsets the
//! most specific rule wins. Conflicting non-overlapping mentions are then
//! settled by recency: the last stated value wins.

use super::lexicon::{self, MONTH_ALTERNATION, OVERRIDE_CUES, VAGUE_CUES, WEEKDAY_ALTERNATION};
use crate::event::{Field, FieldResult, FieldValue, Source, Span, MAX_DURATION_MINUTES};
use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Timelike, Weekday};
use regex::{Captures, Match, Regex};
use std::sync::LazyLock;

const EXPLICIT_DATETIME: f64 = 0.95;
const TIME_IMPLIED_DATE: f64 = 0.88;
const DATE_ONLY: f64 = 0.85;
const DAY_PART: f64 = 0.60;
const DAY_PART_ONLY: f64 = 0.55;
const AMBIGUOUS_HOUR: f64 = 0.65;
const VAGUE_DATE: f64 = 0.50;
const CONFLICTING: f64 = 0.60;
const OVERRIDDEN: f64 = 0.88;
const EXPLICIT_END: f64 = 0.90;
const END_WITHOUT_START: f64 = 0.70;
const EXPLICIT_DURATION: f64 = 0.90;
const DEFAULT_DURATION: f64 = 0.80;

static RANGE_12H: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?::([0-5]\d))?\s*(am|pm)?\s*(?:-|to|until|till)\s*(\d{1,2})(?::([0-5]\d))?\s*(am|pm)\b")
        .unwrap()
});

static BETWEEN_12H: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bbetween\s+(\d{1,2})(?::([0-5]\d))?\s*(am|pm)?\s+and\s+(\d{1,2})(?::([0-5]\d))?\s*(am|pm)\b")
        .unwrap()
});

static RANGE_24H: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([01]?\d|2[0-3]):([0-5]\d)\s*(?:-|to|until|till)\s*([01]?\d|2[0-3]):([0-5]\d)\b")
        .unwrap()
});

static TIME_12H: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?::([0-5]\d))?\s*(am|pm)\b").unwrap()
});

static TIME_24H: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([01]?\d|2[0-3]):([0-5]\d)\b").unwrap());

static NOON_MIDNIGHT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(noon|midday|midnight)\b").unwrap());

static BARE_HOUR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\b(?:at|by|around)\s+|@\s*)(\d{1,2})\b(?:\s*o'?clock\b)?").unwrap()
});

static RELATIVE_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(day after tomorrow|today|tonight|tomorrow|tmrw|tmr)\b").unwrap()
});

static WEEKDAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:(this|next|coming)\s+)?({})\b\.?",
        WEEKDAY_ALTERNATION
    ))
    .unwrap()
});

static WEEKEND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(this|next)\s+weekend\b").unwrap());

static MONTH_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b({})\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?(?:,?\s+(\d{{4}}))?\b",
        MONTH_ALTERNATION
    ))
    .unwrap()
});

static DAY_MONTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?({})\b\.?(?:,?\s+(\d{{4}})\b)?",
        MONTH_ALTERNATION
    ))
    .unwrap()
});

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").unwrap());

static NUMERIC_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})(?:/(\d{2,4}))?\b").unwrap());

static DAY_PART_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:(?:in\s+the|this)\s+)?(morning|afternoon|evening|night)\b").unwrap()
});

static DURATION_FOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bfor\s+(an?|half\s+an?|one|two|three|four|five|six|\d+(?:\.\d+)?)\s*(hours?|hrs?|h|minutes?|mins?|m)\b(?:\s+(?:and\s+)?(\d+)\s*(?:minutes?|mins?|m)\b)?")
        .unwrap()
});

static DURATION_LONG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d+(?:\.\d+)?)\s*(hours?|hrs?|minutes?|mins?)\s+long\b").unwrap()
});

static OVERRIDE: LazyLock<Regex> = LazyLock::new(|| phrase_regex(OVERRIDE_CUES));

static VAGUE: LazyLock<Regex> = LazyLock::new(|| phrase_regex(VAGUE_CUES));

/// Compile every rule table now instead of on first match.
pub(crate) fn compile_rules() {
    LazyLock::force(&RANGE_12H);
    LazyLock::force(&BETWEEN_12H);
    LazyLock::force(&RANGE_24H);
    LazyLock::force(&TIME_12H);
    LazyLock::force(&TIME_24H);
    LazyLock::force(&NOON_MIDNIGHT);
    LazyLock::force(&BARE_HOUR);
    LazyLock::force(&RELATIVE_DAY);
    LazyLock::force(&WEEKDAY);
    LazyLock::force(&WEEKEND);
    LazyLock::force(&MONTH_DAY);
    LazyLock::force(&DAY_MONTH);
    LazyLock::force(&ISO_DATE);
    LazyLock::force(&NUMERIC_DATE);
    LazyLock::force(&DAY_PART_RE);
    LazyLock::force(&DURATION_FOR);
    LazyLock::force(&DURATION_LONG);
    LazyLock::force(&OVERRIDE);
    LazyLock::force(&VAGUE);
}

fn phrase_regex(phrases: &[&str]) -> Regex {
    let alternation = phrases
        .iter()
        .map(|p| regex::escape(p).replace(' ', r"\s+"))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternation)).unwrap()
}

/// Whether a time was stated as a start or an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRole {
    Start,
    End,
}

/// A clock time, or a time range when `end` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeMention {
    pub span: Span,
    pub time: NaiveTime,
    pub end: Option<NaiveTime>,
    pub role: TimeRole,
    /// Bare hour with no meridiem (`at 3`).
    pub ambiguous: bool,
    specificity: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DateMention {
    pub span: Span,
    pub date: NaiveDate,
    /// Hour implied by the word itself (`tonight`).
    pub implied_hour: Option<u32>,
    pub vague: bool,
    specificity: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DurationMention {
    pub span: Span,
    pub minutes: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayPartMention {
    pub span: Span,
    pub hour: u32,
}

/// Every temporal mention in one text, de-overlapped and in text order.
#[derive(Debug, Clone, Default)]
pub struct TemporalScan {
    pub times: Vec<TimeMention>,
    pub dates: Vec<DateMention>,
    pub durations: Vec<DurationMention>,
    pub day_parts: Vec<DayPartMention>,
    pub overrides: Vec<Span>,
    pub vague: Vec<Span>,
    /// Date-shaped text naming no real day ("2/30"). Claimed, never resolved.
    pub impossible_dates: Vec<Span>,
}

/// The winner among conflicting mentions plus the values it displaced.
#[derive(Debug)]
struct Recent<'a, T> {
    chosen: &'a T,
    displaced: Vec<&'a T>,
}

impl<'a, T> Recent<'a, T> {
    fn conflict(&self) -> bool {
        !self.displaced.is_empty()
    }
}

fn span_of(m: Match<'_>) -> Span {
    Span::new(m.start(), m.end())
}

fn num(caps: &Captures<'_>, i: usize) -> Option<u32> {
    caps.get(i).and_then(|m| m.as_str().parse().ok())
}

fn clock(hour: u32, minute: u32, meridiem: &str) -> Option<NaiveTime> {
    if hour == 0 || hour > 12 {
        return None;
    }
    let hour = match (meridiem.to_ascii_lowercase().as_str(), hour) {
        ("am", 12) => 0,
        ("am", h) => h,
        ("pm", 12) => 12,
        (_, h) => h + 12,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Keep non-overlapping candidates: earliest start first, then the most
/// specific, then the longest.
fn select<T>(mut items: Vec<T>, key: impl Fn(&T) -> (Span, u8)) -> Vec<T> {
    items.sort_by(|a, b| {
        let (sa, pa) = key(a);
        let (sb, pb) = key(b);
        sa.start
            .cmp(&sb.start)
            .then(pb.cmp(&pa))
            .then(sb.len().cmp(&sa.len()))
    });

    let mut kept: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        let span = key(&item).0;
        if kept.last().map_or(true, |last| !key(last).0.overlaps(&span)) {
            kept.push(item);
        }
    }
    kept
}

/// Last-stated value wins; earlier distinct values are displaced.
fn most_recent<'a, T, V: PartialEq>(items: &[&'a T], value: impl Fn(&T) -> V) -> Option<Recent<'a, T>> {
    let chosen = *items.last()?;
    let chosen_value = value(chosen);
    let mut displaced: Vec<&'a T> = Vec::new();
    for item in &items[..items.len() - 1] {
        let v = value(*item);
        if v != chosen_value && !displaced.iter().any(|d| value(*d) == v) {
            displaced.push(*item);
        }
    }
    Some(Recent { chosen, displaced })
}

fn role_before(text: &str, start: usize) -> TimeRole {
    const END_CUES: &[&str] = &[
        "until", "till", "til", "ends at", "end at", "ending at", "finishes at", "finish at",
        "through",
    ];
    let before = text[..start].trim_end().to_lowercase();
    let is_end = END_CUES.iter().any(|cue| {
        before.ends_with(cue)
            && before[..before.len() - cue.len()]
                .chars()
                .next_back()
                .map_or(true, |c| !c.is_alphanumeric())
    });
    if is_end {
        TimeRole::End
    } else {
        TimeRole::Start
    }
}

fn upcoming_weekday(today: NaiveDate, target: Weekday, modifier: Option<&str>) -> NaiveDate {
    let ahead = (target.num_days_from_monday() as i64
        - today.weekday().num_days_from_monday() as i64)
        .rem_euclid(7);
    let ahead = match modifier {
        Some(m) if ahead == 0 && m.eq_ignore_ascii_case("next") => 7,
        _ => ahead,
    };
    today + Duration::days(ahead)
}

/// A month/day with no year rolls to next year once it has passed.
pub(crate) fn calendar_date(today: NaiveDate, year: Option<i32>, month: u32, day: u32) -> Option<NaiveDate> {
    match year {
        Some(y) => NaiveDate::from_ymd_opt(if y < 100 { 2000 + y } else { y }, month, day),
        None => {
            let this_year = NaiveDate::from_ymd_opt(today.year(), month, day)?;
            if this_year < today {
                NaiveDate::from_ymd_opt(today.year() + 1, month, day)
            } else {
                Some(this_year)
            }
        }
    }
}

/// Bare hours read as business hours: 1–7 are afternoon, 8–11 morning.
pub(crate) fn bare_hour(hour: u32) -> Option<(NaiveTime, bool)> {
    match hour {
        1..=7 => NaiveTime::from_hms_opt(hour + 12, 0, 0).map(|t| (t, true)),
        8..=12 => NaiveTime::from_hms_opt(hour, 0, 0).map(|t| (t, true)),
        13..=23 => NaiveTime::from_hms_opt(hour, 0, 0).map(|t| (t, false)),
        _ => None,
    }
}

impl TemporalScan {
    pub fn scan(text: &str, today: NaiveDate) -> Self {
        let (dates, impossible_dates) = scan_dates(text, today);
        Self {
            times: scan_times(text),
            dates,
            durations: scan_durations(text),
            day_parts: DAY_PART_RE
                .captures_iter(text)
                .filter_map(|caps| {
                    let hour = lexicon::period_hour(caps.get(1)?.as_str())?;
                    Some(DayPartMention {
                        span: span_of(caps.get(0)?),
                        hour,
                    })
                })
                .collect(),
            overrides: OVERRIDE.find_iter(text).map(span_of).collect(),
            vague: VAGUE.find_iter(text).map(span_of).collect(),
            impossible_dates,
        }
    }

    /// Spans of every temporal mention, for masking out of free text.
    pub fn spans(&self) -> Vec<Span> {
        self.times
            .iter()
            .map(|t| t.span)
            .chain(self.dates.iter().map(|d| d.span))
            .chain(self.durations.iter().map(|d| d.span))
            .chain(self.day_parts.iter().map(|d| d.span))
            .chain(self.overrides.iter().copied())
            .chain(self.vague.iter().copied())
            .chain(self.impossible_dates.iter().copied())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty() && self.dates.is_empty() && self.day_parts.is_empty()
    }

    fn start_times(&self) -> Vec<&TimeMention> {
        self.times.iter().filter(|t| t.role == TimeRole::Start).collect()
    }

    fn recent_start_time(&self) -> Option<Recent<'_, TimeMention>> {
        most_recent(&self.start_times(), |t| t.time)
    }

    fn recent_date(&self) -> Option<Recent<'_, DateMention>> {
        let dates: Vec<&DateMention> = self.dates.iter().collect();
        most_recent(&dates, |d| d.date)
    }

    fn overridden(&self, earliest: usize) -> bool {
        self.overrides.iter().any(|o| o.start >= earliest)
    }

    /// Resolve the start date-time.
    pub fn resolve_start(&self, today: NaiveDate) -> Option<FieldResult> {
        let time = self.recent_start_time();
        let date = self.recent_date();
        let day_part = self.day_parts.last();

        let (value, mut confidence, span) = match (&time, &date) {
            (Some(t), Some(d)) => (
                FieldValue::DateTime(d.chosen.date.and_time(t.chosen.time)),
                EXPLICIT_DATETIME,
                t.chosen.span,
            ),
            (Some(t), None) => (
                FieldValue::DateTime(today.and_time(t.chosen.time)),
                TIME_IMPLIED_DATE,
                t.chosen.span,
            ),
            (None, Some(d)) => {
                let hour = d.chosen.implied_hour.or(day_part.map(|p| p.hour));
                match hour.and_then(|h| NaiveTime::from_hms_opt(h, 0, 0)) {
                    Some(at) => (FieldValue::DateTime(d.chosen.date.and_time(at)), DAY_PART, d.chosen.span),
                    None => (FieldValue::Date(d.chosen.date), DATE_ONLY, d.chosen.span),
                }
            }
            (None, None) => {
                let part = day_part?;
                let at = NaiveTime::from_hms_opt(part.hour, 0, 0)?;
                (FieldValue::DateTime(today.and_time(at)), DAY_PART_ONLY, part.span)
            }
        };

        if time.as_ref().is_some_and(|t| t.chosen.ambiguous) {
            confidence = confidence.min(AMBIGUOUS_HOUR);
        }
        if date.as_ref().is_some_and(|d| d.chosen.vague) {
            confidence = confidence.min(VAGUE_DATE);
        }

        let mut alternatives = Vec::new();
        let mut earliest_displaced: Option<usize> = None;
        if let Some(t) = &time {
            let base = date.as_ref().map(|d| d.chosen.date).unwrap_or(today);
            for displaced in &t.displaced {
                alternatives.push(FieldValue::DateTime(base.and_time(displaced.time)));
                earliest_displaced = Some(earliest_displaced.map_or(displaced.span.start, |e| e.min(displaced.span.start)));
            }
        }
        if let Some(d) = &date {
            for displaced in &d.displaced {
                alternatives.push(match time.as_ref() {
                    Some(t) => FieldValue::DateTime(displaced.date.and_time(t.chosen.time)),
                    None => FieldValue::Date(displaced.date),
                });
                earliest_displaced = Some(earliest_displaced.map_or(displaced.span.start, |e| e.min(displaced.span.start)));
            }
        }

        let conflict = time.as_ref().is_some_and(|t| t.conflict()) || date.as_ref().is_some_and(|d| d.conflict());
        if conflict {
            let cued = earliest_displaced.is_some_and(|e| self.overridden(e));
            confidence = confidence.min(if cued { OVERRIDDEN } else { CONFLICTING });
        }

        Some(
            FieldResult::new(Field::Start, value, Source::Pattern, confidence)
                .with_span(span)
                .with_alternatives(alternatives),
        )
    }

    /// Resolve a stated duration. The last stated one wins.
    pub fn resolve_duration(&self) -> Option<FieldResult> {
        let durations: Vec<&DurationMention> = self.durations.iter().collect();
        let recent = most_recent(&durations, |d| d.minutes)?;
        let confidence = if recent.conflict() {
            CONFLICTING
        } else {
            EXPLICIT_DURATION
        };
        let alternatives = recent
            .displaced
            .iter()
            .map(|d| FieldValue::Minutes(d.minutes))
            .collect();
        Some(
            FieldResult::new(
                Field::Duration,
                FieldValue::Minutes(recent.chosen.minutes),
                Source::Pattern,
                confidence,
            )
            .with_span(recent.chosen.span)
            .with_alternatives(alternatives),
        )
    }

    /// Explicit end: the range end of the chosen start, else the last
    /// `until`-style time.
    fn explicit_end(&self) -> Option<(NaiveTime, Span)> {
        if let Some(recent) = self.recent_start_time() {
            if let Some(end) = recent.chosen.end {
                return Some((end, recent.chosen.span));
            }
        }
        self.times
            .iter()
            .filter(|t| t.role == TimeRole::End)
            .last()
            .map(|t| (t.time, t.span))
    }

    /// Resolve the end from an explicit end time, else derive it from the
    /// resolved start plus duration (stated or default).
    pub fn resolve_end(
        &self,
        today: NaiveDate,
        start: Option<&FieldResult>,
        duration: Option<&FieldResult>,
        default_minutes: i64,
    ) -> Option<FieldResult> {
        let start_at = start.and_then(|s| s.value.as_datetime());

        if let Some((end_time, span)) = self.explicit_end() {
            let base = start_at
                .map(|s| s.date())
                .or_else(|| self.recent_date().map(|d| d.chosen.date))
                .unwrap_or(today);
            let mut end = base.and_time(end_time);
            if let Some(s) = start_at {
                // Evening start with an early-morning end crosses midnight.
                if end < s && s.hour() >= 18 && end_time.hour() <= 6 {
                    end = end.checked_add_signed(Duration::days(1))?;
                }
            }
            let confidence = if start.is_some() {
                EXPLICIT_END
            } else {
                END_WITHOUT_START
            };
            return Some(
                FieldResult::new(Field::End, FieldValue::DateTime(end), Source::Pattern, confidence)
                    .with_span(span),
            );
        }

        let start = start?;
        let value = match &start.value {
            FieldValue::Date(d) => {
                return Some(FieldResult::new(
                    Field::End,
                    FieldValue::Date(d.succ_opt()?),
                    Source::Pattern,
                    start.confidence(),
                ));
            }
            other => other.as_datetime()?,
        };

        let (minutes, confidence) = match duration.and_then(|d| d.value.as_minutes().map(|m| (m, d.confidence()))) {
            Some((minutes, duration_confidence)) => (minutes, start.confidence().min(duration_confidence)),
            None => (default_minutes, start.confidence().min(DEFAULT_DURATION)),
        };
        // An unrepresentable end is left unresolved.
        let end = value.checked_add_signed(Duration::try_minutes(minutes)?)?;

        Some(FieldResult::new(
            Field::End,
            FieldValue::DateTime(end),
            Source::Pattern,
            confidence,
        ))
    }
}

fn scan_times(text: &str) -> Vec<TimeMention> {
    let mut candidates = Vec::new();

    for caps in RANGE_12H.captures_iter(text).chain(BETWEEN_12H.captures_iter(text)) {
        let Some(whole) = caps.get(0) else { continue };
        let Some((start, end)) = range_12h(&caps) else {
            continue;
        };
        candidates.push(TimeMention {
            span: span_of(whole),
            time: start,
            end: Some(end),
            role: TimeRole::Start,
            ambiguous: false,
            specificity: 6,
        });
    }

    for caps in RANGE_24H.captures_iter(text) {
        let (Some(whole), Some(h1), Some(m1), Some(h2), Some(m2)) =
            (caps.get(0), num(&caps, 1), num(&caps, 2), num(&caps, 3), num(&caps, 4))
        else {
            continue;
        };
        if let (Some(start), Some(end)) = (
            NaiveTime::from_hms_opt(h1, m1, 0),
            NaiveTime::from_hms_opt(h2, m2, 0),
        ) {
            candidates.push(TimeMention {
                span: span_of(whole),
                time: start,
                end: Some(end),
                role: TimeRole::Start,
                ambiguous: false,
                specificity: 5,
            });
        }
    }

    for caps in TIME_12H.captures_iter(text) {
        let (Some(whole), Some(hour), Some(meridiem)) = (caps.get(0), num(&caps, 1), caps.get(3))
        else {
            continue;
        };
        let has_minutes = caps.get(2).is_some();
        if let Some(time) = clock(hour, num(&caps, 2).unwrap_or(0), meridiem.as_str()) {
            candidates.push(TimeMention {
                span: span_of(whole),
                time,
                end: None,
                role: role_before(text, whole.start()),
                ambiguous: false,
                specificity: if has_minutes { 4 } else { 3 },
            });
        }
    }

    for caps in TIME_24H.captures_iter(text) {
        let (Some(whole), Some(hour), Some(minute)) = (caps.get(0), num(&caps, 1), num(&caps, 2))
        else {
            continue;
        };
        if let Some(time) = NaiveTime::from_hms_opt(hour, minute, 0) {
            candidates.push(TimeMention {
                span: span_of(whole),
                time,
                end: None,
                role: role_before(text, whole.start()),
                ambiguous: false,
                specificity: 3,
            });
        }
    }

    for m in NOON_MIDNIGHT.find_iter(text) {
        let hour = if m.as_str().eq_ignore_ascii_case("midnight") { 0 } else { 12 };
        if let Some(time) = NaiveTime::from_hms_opt(hour, 0, 0) {
            candidates.push(TimeMention {
                span: span_of(m),
                time,
                end: None,
                role: role_before(text, m.start()),
                ambiguous: false,
                specificity: 3,
            });
        }
    }

    for caps in BARE_HOUR.captures_iter(text) {
        let Some(digits) = caps.get(1) else { continue };
        if text[digits.end()..].starts_with(':') || text[digits.end()..].starts_with('/') {
            continue;
        }
        let Some((time, ambiguous)) = digits.as_str().parse().ok().and_then(bare_hour) else {
            continue;
        };
        candidates.push(TimeMention {
            span: span_of(digits),
            time,
            end: None,
            role: role_before(text, caps.get(0).map_or(digits.start(), |m| m.start())),
            ambiguous,
            specificity: 1,
        });
    }

    select(candidates, |t| (t.span, t.specificity))
}

/// Groups: start hour, start minute, start meridiem, end hour, end minute,
/// end meridiem.
fn range_12h(caps: &Captures<'_>) -> Option<(NaiveTime, NaiveTime)> {
    let end_meridiem = caps.get(6)?.as_str();
    let end = clock(num(caps, 4)?, num(caps, 5).unwrap_or(0), end_meridiem)?;
    let (h1, m1) = (num(caps, 1)?, num(caps, 2).unwrap_or(0));
    let start = match caps.get(3) {
        Some(meridiem) => clock(h1, m1, meridiem.as_str())?,
        None => {
            // "11-1pm": inherit the end meridiem unless that puts start after end.
            let flipped = if end_meridiem.eq_ignore_ascii_case("pm") { "am" } else { "pm" };
            match (clock(h1, m1, end_meridiem), clock(h1, m1, flipped)) {
                (Some(same), Some(other)) if same > end && other <= end => other,
                (same, _) => same?,
            }
        }
    };
    Some((start, end))
}

fn scan_dates(text: &str, today: NaiveDate) -> (Vec<DateMention>, Vec<Span>) {
    let mut candidates = Vec::new();
    let mut impossible = Vec::new();
    let mut push = |span: Span, date: NaiveDate, implied_hour: Option<u32>, vague: bool, specificity: u8| {
        candidates.push(DateMention {
            span,
            date,
            implied_hour,
            vague,
            specificity,
        });
    };

    for caps in RELATIVE_DAY.captures_iter(text) {
        let Some(m) = caps.get(1) else { continue };
        let (offset, implied_hour) = match m.as_str().to_ascii_lowercase().as_str() {
            "today" => (0, None),
            "tonight" => (0, Some(19)),
            "day after tomorrow" => (2, None),
            _ => (1, None),
        };
        push(span_of(m), today + Duration::days(offset), implied_hour, false, 3);
    }

    for caps in WEEKDAY.captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(2)) else {
            continue;
        };
        let Some(weekday) = lexicon::weekday_from(name.as_str()) else {
            continue;
        };
        let modifier = caps.get(1).map(|m| m.as_str());
        let specificity = if modifier.is_some() { 3 } else { 2 };
        push(
            span_of(whole),
            upcoming_weekday(today, weekday, modifier),
            None,
            false,
            specificity,
        );
    }

    for caps in WEEKEND.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let next = caps.get(1).is_some_and(|m| m.as_str().eq_ignore_ascii_case("next"));
        let saturday = upcoming_weekday(today, Weekday::Sat, None);
        let date = if next && saturday - today < Duration::days(2) {
            saturday + Duration::days(7)
        } else {
            saturday
        };
        push(span_of(whole), date, None, true, 1);
    }

    for caps in MONTH_DAY.captures_iter(text) {
        let (Some(whole), Some(month), Some(day)) = (
            caps.get(0),
            caps.get(1).and_then(|m| lexicon::month_from(m.as_str())),
            num(&caps, 2),
        ) else {
            continue;
        };
        let year = caps.get(3).and_then(|m| m.as_str().parse().ok());
        match calendar_date(today, year, month, day) {
            Some(date) => push(span_of(whole), date, None, false, if year.is_some() { 5 } else { 4 }),
            None if plausible_day(month, day) => impossible.push(span_of(whole)),
            None => {}
        }
    }

    for caps in DAY_MONTH.captures_iter(text) {
        let (Some(whole), Some(day), Some(month)) = (
            caps.get(0),
            num(&caps, 1),
            caps.get(2).and_then(|m| lexicon::month_from(m.as_str())),
        ) else {
            continue;
        };
        let year = caps.get(3).and_then(|m| m.as_str().parse().ok());
        match calendar_date(today, year, month, day) {
            Some(date) => push(span_of(whole), date, None, false, if year.is_some() { 5 } else { 4 }),
            None if plausible_day(month, day) => impossible.push(span_of(whole)),
            None => {}
        }
    }

    for caps in ISO_DATE.captures_iter(text) {
        let (Some(whole), Some(year), Some(month), Some(day)) =
            (caps.get(0), num(&caps, 1), num(&caps, 2), num(&caps, 3))
        else {
            continue;
        };
        match NaiveDate::from_ymd_opt(year as i32, month, day) {
            Some(date) => push(span_of(whole), date, None, false, 5),
            None if plausible_day(month, day) => impossible.push(span_of(whole)),
            None => {}
        }
    }

    for caps in NUMERIC_DATE.captures_iter(text) {
        let (Some(whole), Some(month), Some(day)) = (caps.get(0), num(&caps, 1), num(&caps, 2))
        else {
            continue;
        };
        let year = num(&caps, 3).map(|y| y as i32);
        match calendar_date(today, year, month, day) {
            Some(date) => push(span_of(whole), date, None, false, if year.is_some() { 5 } else { 4 }),
            None if plausible_day(month, day) => impossible.push(span_of(whole)),
            None => {}
        }
    }

    impossible.sort_by_key(|s| (s.start, s.end));
    (select(candidates, |d| (d.span, d.specificity)), impossible)
}

/// Month and day in range, even if the combination is not a real date.
fn plausible_day(month: u32, day: u32) -> bool {
    (1..=12).contains(&month) && (1..=31).contains(&day)
}

fn scan_durations(text: &str) -> Vec<DurationMention> {
    let mut candidates: Vec<(DurationMention, u8)> = Vec::new();

    for caps in DURATION_FOR.captures_iter(text) {
        let (Some(whole), Some(amount), Some(unit)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let amount_text = amount.as_str().to_ascii_lowercase();
        let quantity = if amount_text.starts_with("half") {
            Some(0.5)
        } else {
            lexicon::number_word(&amount_text).or_else(|| amount_text.parse::<f64>().ok())
        };
        let Some(quantity) = quantity else { continue };
        let extra = num(&caps, 3).unwrap_or(0);
        let total = to_minutes(quantity, unit.as_str()).and_then(|m| bounded_minutes(m as f64 + f64::from(extra)));
        if let Some(minutes) = total {
            candidates.push((
                DurationMention {
                    span: span_of(whole),
                    minutes,
                },
                2,
            ));
        }
    }

    for caps in DURATION_LONG.captures_iter(text) {
        let (Some(whole), Some(quantity), Some(unit)) = (
            caps.get(0),
            caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok()),
            caps.get(2),
        ) else {
            continue;
        };
        if let Some(minutes) = to_minutes(quantity, unit.as_str()) {
            candidates.push((
                DurationMention {
                    span: span_of(whole),
                    minutes,
                },
                1,
            ));
        }
    }

    select(candidates, |(d, specificity)| (d.span, *specificity))
        .into_iter()
        .map(|(d, _)| d)
        .collect()
}

fn to_minutes(quantity: f64, unit: &str) -> Option<i64> {
    let factor = if unit.to_ascii_lowercase().starts_with('h') {
        60.0
    } else {
        1.0
    };
    bounded_minutes(quantity * factor)
}

/// Whole minutes in `1..=MAX_DURATION_MINUTES`, or `None`.
pub(crate) fn bounded_minutes(minutes: f64) -> Option<i64> {
    let minutes = minutes.round();
    (1.0..=MAX_DURATION_MINUTES as f64).contains(&minutes).then_some(minutes as i64)
}
