//! English vocabulary shared by the normalizer, analyzer and extractors
//!
//! Everything here is a cheap lookup or a precompiled regex. Nothing resolves
//! values; that is the extractors' job.

use chrono::Weekday;
use regex::Regex;
use std::sync::LazyLock;

/// Month names as a regex alternation (full names and abbreviations).
pub const MONTH_ALTERNATION: &str = "jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?";

/// Weekday names as a regex alternation. `sat`/`sun` are left out, they
/// collide with ordinary words too often.
pub const WEEKDAY_ALTERNATION: &str = "monday|tuesday|wednesday|thursday|friday|saturday|sunday|mon|tues?|wed|thu(?:rs?)?|fri";

pub const EVENT_KEYWORDS: &[&str] = &[
    "meeting", "meet", "lunch", "dinner", "breakfast", "brunch", "call", "appointment",
    "interview", "standup", "stand-up", "sync", "review", "party", "coffee", "drinks",
    "class", "lecture", "session", "workshop", "conference", "demo", "presentation",
    "dentist", "doctor", "practice", "game", "birthday", "wedding", "webinar", "1:1",
    "one-on-one", "catch-up", "catchup", "checkup", "flight", "concert", "retro",
    "planning", "training", "seminar", "reunion", "hangout", "meetup", "event",
];

pub const VENUE_KEYWORDS: &[&str] = &[
    "room", "office", "conference", "hall", "building", "cafe", "café", "coffee", "restaurant",
    "bar", "pub", "park", "library", "center", "centre", "studio", "gym", "hospital",
    "clinic", "school", "campus", "hotel", "lobby", "floor", "suite", "kitchen",
    "auditorium", "theater", "theatre", "stadium", "airport", "station", "church", "home",
    "house", "place", "store", "mall", "arena", "bistro", "diner", "pavilion", "court",
];

/// Online venues, lowercase alias mapped to display name.
pub const ONLINE_VENUES: &[(&str, &str)] = &[
    ("zoom", "Zoom"),
    ("microsoft teams", "Microsoft Teams"),
    ("teams", "Microsoft Teams"),
    ("google meet", "Google Meet"),
    ("meet", "Google Meet"),
    ("skype", "Skype"),
    ("webex", "Webex"),
    ("discord", "Discord"),
    ("slack", "Slack"),
    ("hangouts", "Google Hangouts"),
];

/// Day-part words and the hour they imply.
pub const PERIOD_WORDS: &[(&str, u32)] = &[
    ("morning", 9),
    ("afternoon", 14),
    ("evening", 18),
    ("night", 20),
];

/// Temporal phrases too vague for deterministic resolution.
pub const VAGUE_CUES: &[&str] = &[
    "sometime",
    "some time",
    "next week",
    "next month",
    "this week",
    "later",
    "soon",
    "at some point",
    "whenever",
    "one of these days",
    "end of the week",
];

/// Phrases that announce a replacement for an earlier time or date.
pub const OVERRIDE_CUES: &[&str] = &[
    "moved to",
    "changed to",
    "rescheduled to",
    "rescheduled for",
    "reschedule to",
    "pushed to",
    "pushed back to",
    "now at",
    "instead",
    "actually",
];

static TIME_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\d{1,2}(?::\d{2})?\s*(?:am|pm)\b|\b\d{1,2}:\d{2}\b|\b(?:noon|midday|midnight)\b")
        .unwrap()
});

static DATE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:today|tonight|tomorrow|tmrw|(?:{})|(?:{})\.?\s+\d{{1,2}}|\d{{1,2}}(?:st|nd|rd|th)?\s+(?:of\s+)?(?:{})|\d{{4}}-\d{{2}}-\d{{2}}|\d{{1,2}}/\d{{1,2}}(?:/\d{{2,4}})?)\b",
        WEEKDAY_ALTERNATION, MONTH_ALTERNATION, MONTH_ALTERNATION
    ))
    .unwrap()
});

static LOCATION_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\b(?:at|in)\s+(?:the\s+)?[A-Z]|@\s*\w|\b\d{1,5}\s+[A-Z][a-z]+\s+(?:St|Street|Ave|Avenue|Rd|Road|Blvd|Dr|Drive|Ln|Lane|Way)\b)")
        .unwrap()
});

static BARE_HOUR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bat\s+\d{1,2}\b").unwrap());

static DURATION_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:for\s+(?:an?|half\s+an?|one|two|three|four|\d+(?:\.\d+)?)\s*(?:hours?|hrs?|minutes?|mins?)|\d+(?:\.\d+)?\s*(?:hours?|hrs?|minutes?|mins?)\s+long)\b")
        .unwrap()
});

static RANGE_OR_END_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:until|till|til|ends?\s+at)\s+\d|\d\s*(?:am|pm)?\s*(?:-|to)\s*\d{1,2}(?::\d{2})?\s*(?:am|pm)|\d:\d{2}\s*(?:-|to)\s*\d|\bbetween\s+\d{1,2}(?::\d{2})?\s*(?:am|pm)?\s+and\s+\d")
        .unwrap()
});

/// Compile every rule table now instead of on first match.
pub(crate) fn compile_rules() {
    LazyLock::force(&TIME_TOKEN);
    LazyLock::force(&DATE_TOKEN);
    LazyLock::force(&LOCATION_TOKEN);
    LazyLock::force(&BARE_HOUR);
    LazyLock::force(&DURATION_TOKEN);
    LazyLock::force(&RANGE_OR_END_TOKEN);
}

pub fn weekday_from(word: &str) -> Option<Weekday> {
    let w = word.trim_end_matches('.').to_ascii_lowercase();
    let weekday = match w.as_str() {
        "monday" | "mon" => Weekday::Mon,
        "tuesday" | "tue" | "tues" => Weekday::Tue,
        "wednesday" | "wed" => Weekday::Wed,
        "thursday" | "thu" | "thur" | "thurs" => Weekday::Thu,
        "friday" | "fri" => Weekday::Fri,
        "saturday" => Weekday::Sat,
        "sunday" => Weekday::Sun,
        _ => return None,
    };
    Some(weekday)
}

pub fn month_from(word: &str) -> Option<u32> {
    let w = word.trim_end_matches('.').to_ascii_lowercase();
    let month = match w.get(..3)? {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// Number words that show up in durations.
pub fn number_word(word: &str) -> Option<f64> {
    let n = match word.to_ascii_lowercase().as_str() {
        "a" | "an" | "one" => 1.0,
        "two" => 2.0,
        "three" => 3.0,
        "four" => 4.0,
        "five" => 5.0,
        "six" => 6.0,
        "half" => 0.5,
        _ => return None,
    };
    Some(n)
}

pub fn period_hour(word: &str) -> Option<u32> {
    let w = word.to_ascii_lowercase();
    PERIOD_WORDS
        .iter()
        .find(|(name, _)| *name == w)
        .map(|(_, hour)| *hour)
}

/// Lowercase alphanumeric words of a text.
pub fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '-' || c == ':' || c == '\''))
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

pub fn contains_any_word(words: &[String], vocabulary: &[&str]) -> bool {
    words.iter().any(|w| vocabulary.contains(&w.as_str()))
}

fn contains_phrase(lower: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| {
        lower.match_indices(p).any(|(idx, _)| {
            let before = lower[..idx].chars().next_back();
            let after = lower[idx + p.len()..].chars().next();
            !before.is_some_and(|c| c.is_alphanumeric()) && !after.is_some_and(|c| c.is_alphanumeric())
        })
    })
}

/// Lexical cues present in a text fragment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cues {
    /// Digit+separator or am/pm time token.
    pub time: bool,
    /// Bare `at N` with no minutes or meridiem.
    pub bare_hour: bool,
    /// Weekday, month, relative day or numeric date.
    pub date: bool,
    /// Morning/afternoon/evening style day part.
    pub period: bool,
    pub vague: bool,
    pub duration: bool,
    /// Explicit end: range connector or until/till.
    pub end: bool,
    /// Any of `place`, `online` or `venue_keyword`.
    pub location: bool,
    /// `at|in` + capitalised word, `@`, or a street address.
    pub place: bool,
    pub venue_keyword: bool,
    pub online: bool,
    pub event: bool,
    pub override_cue: bool,
}

impl Cues {
    pub fn detect(text: &str) -> Self {
        let lower = text.to_lowercase();
        let words = words(text);
        let online = ONLINE_VENUES.iter().any(|(alias, _)| {
            let on = format!("on {}", alias);
            let via = format!("via {}", alias);
            contains_phrase(&lower, &[on.as_str(), via.as_str()])
        });
        let venue_keyword = contains_any_word(&words, VENUE_KEYWORDS);
        let place = LOCATION_TOKEN.is_match(text);

        Self {
            time: TIME_TOKEN.is_match(text),
            bare_hour: BARE_HOUR.is_match(text),
            date: DATE_TOKEN.is_match(text) || contains_phrase(&lower, &["weekend"]),
            period: PERIOD_WORDS.iter().any(|(w, _)| words.iter().any(|x| x == w)),
            vague: contains_phrase(&lower, VAGUE_CUES),
            duration: DURATION_TOKEN.is_match(text),
            end: RANGE_OR_END_TOKEN.is_match(text),
            location: place || online || venue_keyword,
            place,
            venue_keyword,
            online,
            event: contains_any_word(&words, EVENT_KEYWORDS),
            override_cue: contains_phrase(&lower, OVERRIDE_CUES),
        }
    }

    /// Any cue that points at a start time or date.
    pub fn temporal(&self) -> bool {
        self.time || self.bare_hour || self.date || self.period || self.vague
    }
}
