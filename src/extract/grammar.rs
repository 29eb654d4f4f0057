//! Grammar-driven backup extraction for temporal fields
//!
//! Tokenizes the text and runs a small recursive-descent grammar over date,
//! clock and duration phrases. It accepts forms the rule table does not
//! (`half past three`, `quarter to five`, `three thirty pm`, `in 3 days`,
//! `the 15th`, `an hour and a half`) and scores each parse by completeness.
//!
//! ```text
//! moment   := date [at|@|,] clock | clock [on] date | clock | date
//! clock    := noon | midnight | half past H | quarter (past|to) H
//!           | H [: MM | minute-word] [am|pm | in the morning|afternoon|evening] [o'clock]
//! date     := today | tonight | tomorrow | day after tomorrow | [this|next] weekday
//!           | month [the] D[th] [, YYYY] | [the] D[th] [of] month [YYYY]
//!           | M / D [/ YY[YY]] | in N (days|weeks) | the D(st|nd|rd|th)
//! duration := [for] quantity unit [[and] quantity unit | and a half]
//! ```

use super::lexicon;
use super::source::{Candidate, CandidateRequest, CandidateSource, SourceError};
use super::temporal::{bare_hour, bounded_minutes, calendar_date};
use crate::config::{ConfidenceConfig, HIGH_CONFIDENCE};
use crate::event::{Field, FieldValue, Span};
use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

const FULL_MONTHS: [&str; 12] = [
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december",
];

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(u32),
    Decimal(f64),
    Word(String),
    Colon,
    Slash,
    Comma,
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    tok: Tok,
    span: Span,
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if c.is_ascii_digit() {
            let mut end = start + c.len_utf8();
            while let Some(&(i, d)) = chars.peek() {
                if !d.is_ascii_digit() {
                    break;
                }
                end = i + d.len_utf8();
                chars.next();
            }
            // 1.5 reads as a decimal, but 6.30 was already rewritten to 6:30.
            let mut decimal_end = None;
            if let Some(&(dot, '.')) = chars.peek() {
                let rest = &text[dot + 1..];
                let digits = rest.chars().take_while(|d| d.is_ascii_digit()).count();
                if digits > 0 {
                    decimal_end = Some(dot + 1 + digits);
                }
            }
            match decimal_end {
                Some(dec_end) => {
                    while chars.peek().is_some_and(|&(i, _)| i < dec_end) {
                        chars.next();
                    }
                    let value = text[start..dec_end].parse().unwrap_or(0.0);
                    tokens.push(Token {
                        tok: Tok::Decimal(value),
                        span: Span::new(start, dec_end),
                    });
                }
                None => {
                    let value = text[start..end].parse().unwrap_or(u32::MAX);
                    tokens.push(Token {
                        tok: Tok::Num(value),
                        span: Span::new(start, end),
                    });
                }
            }
        } else if c.is_alphabetic() {
            let mut end = start + c.len_utf8();
            while let Some(&(i, d)) = chars.peek() {
                if !(d.is_alphabetic() || d == '\'') {
                    break;
                }
                end = i + d.len_utf8();
                chars.next();
            }
            tokens.push(Token {
                tok: Tok::Word(text[start..end].to_lowercase()),
                span: Span::new(start, end),
            });
        } else {
            let tok = match c {
                ':' => Tok::Colon,
                '/' => Tok::Slash,
                ',' => Tok::Comma,
                '@' => Tok::Word("@".into()),
                _ => continue,
            };
            tokens.push(Token {
                tok,
                span: Span::new(start, start + c.len_utf8()),
            });
        }
    }
    tokens
}

fn hour_word(word: &str) -> Option<u32> {
    let n = match word {
        "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "eleven" => 11,
        "twelve" => 12,
        _ => return None,
    };
    Some(n)
}

fn minute_word(word: &str) -> Option<u32> {
    let n = match word {
        "fifteen" => 15,
        "twenty" => 20,
        "thirty" => 30,
        "forty" => 40,
        "fifty" => 50,
        _ => return None,
    };
    Some(n)
}

fn month_word(word: &str) -> Option<u32> {
    let month = lexicon::month_from(word)?;
    let full = FULL_MONTHS[(month - 1) as usize];
    (word.len() >= 3 && full.starts_with(word.trim_end_matches('.'))).then_some(month)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Clock {
    time: NaiveTime,
    /// Meridiem, minutes or 24h hour made the reading unambiguous.
    explicit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct DatePart {
    date: NaiveDate,
    /// Hour implied by the word itself (`tonight`).
    implied_hour: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
enum Phrase {
    Moment {
        date: Option<DatePart>,
        clock: Option<Clock>,
    },
    Until(Clock),
    Length(i64),
}

#[derive(Debug, Clone, PartialEq)]
struct Parsed {
    phrase: Phrase,
    span: Span,
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    today: NaiveDate,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token], today: NaiveDate) -> Self {
        Self {
            tokens,
            pos: 0,
            today,
        }
    }

    fn peek(&self) -> Option<&'a Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn peek_word(&self) -> Option<&'a str> {
        match self.peek() {
            Some(Tok::Word(w)) => Some(w.as_str()),
            _ => None,
        }
    }

    fn previous_word(&self) -> Option<&'a str> {
        let prev = self.pos.checked_sub(1)?;
        match &self.tokens.get(prev)?.tok {
            Tok::Word(w) => Some(w.as_str()),
            _ => None,
        }
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if self.peek_word() == Some(word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_any(&mut self, words: &[&str]) -> Option<&'a str> {
        let w = self.peek_word()?;
        if words.contains(&w) {
            self.pos += 1;
            Some(w)
        } else {
            None
        }
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn attempt<T>(&mut self, rule: impl FnOnce(&mut Self) -> Option<T>) -> Option<T> {
        let save = self.pos;
        let out = rule(self);
        if out.is_none() {
            self.pos = save;
        }
        out
    }

    fn number(&mut self) -> Option<u32> {
        match self.peek()? {
            Tok::Num(n) => {
                self.pos += 1;
                Some(*n)
            }
            Tok::Word(w) => {
                let n = hour_word(w)?;
                self.pos += 1;
                Some(n)
            }
            _ => None,
        }
    }

    fn ordinal_suffix(&mut self) {
        self.eat_any(&["st", "nd", "rd", "th"]);
    }

    fn span_from(&self, start: usize) -> Span {
        let first = &self.tokens[start].span;
        let last = &self.tokens[self.pos.saturating_sub(1).max(start)].span;
        Span::new(first.start, last.end)
    }

    // clock := noon | midnight | half past H | quarter (past|to) H | H [..]
    fn clock(&mut self, anchored: bool) -> Option<Clock> {
        if self.eat_any(&["noon", "midday"]).is_some() {
            return Some(Clock {
                time: NaiveTime::from_hms_opt(12, 0, 0)?,
                explicit: true,
            });
        }
        if self.eat_word("midnight") {
            return Some(Clock {
                time: NaiveTime::MIN,
                explicit: true,
            });
        }
        if let Some(clock) = self.attempt(|p| p.relative_clock()) {
            return Some(clock);
        }
        self.attempt(|p| p.numeric_clock(anchored))
    }

    fn relative_clock(&mut self) -> Option<Clock> {
        let (offset, past) = match self.eat_any(&["half", "quarter"])? {
            "half" => {
                self.eat_word("past").then_some(())?;
                (30, true)
            }
            _ => match self.eat_any(&["past", "to"])? {
                "past" => (15, true),
                _ => (15, false),
            },
        };
        let hour = self.number()?;
        let meridiem = self.meridiem();
        let (base, explicit) = match meridiem {
            Some(m) => (clock_12h(hour, 0, m)?, true),
            None => bare_hour(hour).map(|(t, ambiguous)| (t, !ambiguous))?,
        };
        let time = if past {
            base + Duration::minutes(offset)
        } else {
            base - Duration::minutes(offset)
        };
        Some(Clock { time, explicit })
    }

    fn numeric_clock(&mut self, anchored: bool) -> Option<Clock> {
        let hour = self.number()?;
        let mut minute = None;
        if self.eat(&Tok::Colon) {
            match self.peek()? {
                Tok::Num(m) if *m < 60 => {
                    minute = Some(*m);
                    self.pos += 1;
                }
                _ => return None,
            }
        } else if let Some(tens) = self.peek_word().and_then(minute_word) {
            self.pos += 1;
            let ones = self.peek_word().and_then(hour_word).filter(|n| *n < 10);
            if ones.is_some() {
                self.pos += 1;
            }
            minute = Some(tens + ones.unwrap_or(0));
        }
        let meridiem = self.meridiem();
        let oclock = self.eat_any(&["o'clock", "oclock"]).is_some();

        if meridiem.is_none() && minute.is_none() && !oclock && !anchored {
            return None;
        }

        let minute_value = minute.unwrap_or(0);
        match meridiem {
            Some(m) => Some(Clock {
                time: clock_12h(hour, minute_value, m)?,
                explicit: true,
            }),
            None if hour >= 13 || (hour == 0 && minute.is_some()) => Some(Clock {
                time: NaiveTime::from_hms_opt(hour, minute_value, 0)?,
                explicit: minute.is_some(),
            }),
            None => {
                let (base, ambiguous) = bare_hour(hour)?;
                Some(Clock {
                    time: base.with_minute(minute_value)?,
                    explicit: !ambiguous,
                })
            }
        }
    }

    /// `am`/`pm` or a day-part phrase. Returns true for pm.
    fn meridiem(&mut self) -> Option<bool> {
        if let Some(m) = self.eat_any(&["am", "pm"]) {
            return Some(m == "pm");
        }
        self.attempt(|p| {
            p.eat_word("in").then_some(())?;
            p.eat_word("the").then_some(())?;
            match p.eat_any(&["morning", "afternoon", "evening"])? {
                "morning" => Some(false),
                _ => Some(true),
            }
        })
    }

    fn date(&mut self) -> Option<DatePart> {
        let today = self.today;
        let plain = |date| DatePart {
            date,
            implied_hour: None,
        };

        if let Some(w) = self.eat_any(&["today", "tonight", "tomorrow", "tmrw", "tmr"]) {
            return Some(match w {
                "today" => plain(today),
                "tonight" => DatePart {
                    date: today,
                    implied_hour: Some(19),
                },
                _ => plain(today.succ_opt()?),
            });
        }
        if let Some(date) = self.attempt(|p| {
            p.eat_word("day").then_some(())?;
            p.eat_word("after").then_some(())?;
            p.eat_word("tomorrow").then_some(())?;
            today.checked_add_signed(Duration::days(2))
        }) {
            return Some(plain(date));
        }
        if let Some(date) = self.attempt(|p| p.weekday_date()) {
            return Some(plain(date));
        }
        if let Some(date) = self.attempt(|p| p.month_first()) {
            return Some(plain(date));
        }
        if let Some(date) = self.attempt(|p| p.day_first()) {
            return Some(plain(date));
        }
        if let Some(date) = self.attempt(|p| p.numeric_date()) {
            return Some(plain(date));
        }
        if let Some(date) = self.attempt(|p| p.offset_date()) {
            return Some(plain(date));
        }
        self.attempt(|p| p.day_of_month()).map(plain)
    }

    fn weekday_date(&mut self) -> Option<NaiveDate> {
        let next = match self.eat_any(&["this", "next", "coming"]) {
            Some(m) => m == "next",
            None => false,
        };
        let weekday = self.peek_word().and_then(lexicon::weekday_from)?;
        self.pos += 1;
        let ahead = (weekday.num_days_from_monday() as i64
            - self.today.weekday().num_days_from_monday() as i64)
            .rem_euclid(7);
        let ahead = if next && ahead == 0 { 7 } else { ahead };
        self.today.checked_add_signed(Duration::days(ahead))
    }

    fn month_first(&mut self) -> Option<NaiveDate> {
        let month = self.peek_word().and_then(month_word)?;
        self.pos += 1;
        self.eat_word("the");
        let day = match self.peek()? {
            Tok::Num(d) => *d,
            _ => return None,
        };
        self.pos += 1;
        self.ordinal_suffix();
        let year = self.attempt(|p| {
            p.eat(&Tok::Comma);
            match p.peek()? {
                Tok::Num(y) if *y >= 1000 => {
                    p.pos += 1;
                    Some(*y as i32)
                }
                _ => None,
            }
        });
        calendar_date(self.today, year, month, day)
    }

    fn day_first(&mut self) -> Option<NaiveDate> {
        self.eat_word("the");
        let day = match self.peek()? {
            Tok::Num(d) => *d,
            _ => return None,
        };
        self.pos += 1;
        self.ordinal_suffix();
        self.eat_word("of");
        let month = self.peek_word().and_then(month_word)?;
        self.pos += 1;
        let year = match self.peek() {
            Some(Tok::Num(y)) if *y >= 1000 => {
                self.pos += 1;
                Some(*y as i32)
            }
            _ => None,
        };
        calendar_date(self.today, year, month, day)
    }

    fn numeric_date(&mut self) -> Option<NaiveDate> {
        let month = match self.peek()? {
            Tok::Num(m) => *m,
            _ => return None,
        };
        self.pos += 1;
        self.eat(&Tok::Slash).then_some(())?;
        let day = match self.peek()? {
            Tok::Num(d) => *d,
            _ => return None,
        };
        self.pos += 1;
        let year = self.attempt(|p| {
            p.eat(&Tok::Slash).then_some(())?;
            match p.peek()? {
                Tok::Num(y) => {
                    p.pos += 1;
                    Some(*y as i32)
                }
                _ => None,
            }
        });
        calendar_date(self.today, year, month, day)
    }

    fn offset_date(&mut self) -> Option<NaiveDate> {
        self.eat_word("in").then_some(())?;
        let n = self.number().or_else(|| self.eat_any(&["a", "an"]).map(|_| 1))?;
        let days = match self.eat_any(&["day", "days", "week", "weeks"])? {
            "day" | "days" => n as i64,
            _ => n as i64 * 7,
        };
        self.today.checked_add_signed(Duration::try_days(days)?)
    }

    fn day_of_month(&mut self) -> Option<NaiveDate> {
        self.eat_word("the").then_some(())?;
        let day = match self.peek()? {
            Tok::Num(d) => *d,
            _ => return None,
        };
        self.pos += 1;
        self.eat_any(&["st", "nd", "rd", "th"])?;
        let this_month = NaiveDate::from_ymd_opt(self.today.year(), self.today.month(), day);
        match this_month {
            Some(d) if d >= self.today => Some(d),
            _ => {
                let (y, m) = if self.today.month() == 12 {
                    (self.today.year() + 1, 1)
                } else {
                    (self.today.year(), self.today.month() + 1)
                };
                NaiveDate::from_ymd_opt(y, m, day)
            }
        }
    }

    // duration := [for] quantity unit [[and] quantity unit | and a half]
    fn duration(&mut self) -> Option<i64> {
        self.eat_word("for");
        let mut total = self.quantity_with_unit()?;
        if let Some(extra) = self.attempt(|p| {
            p.eat_word("and");
            p.quantity_with_unit()
        }) {
            total += extra;
        }
        bounded_minutes(total)
    }

    /// Minutes for one `quantity unit` group, including `and a half`.
    fn quantity_with_unit(&mut self) -> Option<f64> {
        let mut quantity = self.quantity()?;
        if self
            .attempt(|p| {
                p.eat_word("and").then_some(())?;
                p.eat_word("a").then_some(())?;
                p.eat_word("half").then_some(())
            })
            .is_some()
        {
            quantity += 0.5;
        }
        let factor = match self.eat_any(&["hours", "hour", "hrs", "hr", "h", "minutes", "minute", "mins", "min"])? {
            u if u.starts_with('h') => 60.0,
            _ => 1.0,
        };
        let minutes = quantity * factor;
        let half = self
            .attempt(|p| {
                p.eat_word("and").then_some(())?;
                p.eat_word("a").then_some(())?;
                p.eat_word("half").then_some(())
            })
            .is_some();
        Some(if half { minutes + factor / 2.0 } else { minutes })
    }

    fn quantity(&mut self) -> Option<f64> {
        match self.peek()? {
            Tok::Num(n) => {
                self.pos += 1;
                Some(*n as f64)
            }
            Tok::Decimal(d) => {
                self.pos += 1;
                Some(*d)
            }
            Tok::Word(w) if w == "half" => {
                self.pos += 1;
                self.eat_any(&["a", "an"])?;
                Some(0.5)
            }
            Tok::Word(w) => {
                let n = lexicon::number_word(w).or_else(|| hour_word(w).map(f64::from))?;
                self.pos += 1;
                Some(n)
            }
            _ => None,
        }
    }

    // moment := date [at|@|,] clock | clock [on] date | clock | date
    fn moment(&mut self) -> Option<Phrase> {
        let anchored = matches!(
            self.previous_word(),
            Some("at" | "@" | "around" | "by" | "from" | "about")
        );
        if let Some(date) = self.attempt(|p| p.date()) {
            let clock = self.attempt(|p| {
                p.eat_any(&["at", "@", "around", "by"]);
                p.eat(&Tok::Comma);
                p.clock(true)
            });
            return Some(Phrase::Moment {
                date: Some(date),
                clock,
            });
        }
        let clock = self.attempt(|p| p.clock(anchored))?;
        let date = self.attempt(|p| {
            p.eat_word("on");
            p.date()
        });
        Some(Phrase::Moment {
            date,
            clock: Some(clock),
        })
    }

    fn until(&mut self) -> Option<Phrase> {
        match self.eat_any(&["until", "till", "til", "to", "ends", "end", "ending"])? {
            "ends" | "end" | "ending" => {
                self.eat_word("at").then_some(())?;
            }
            _ => {}
        }
        self.clock(true).map(Phrase::Until)
    }

    /// Scan the whole token stream, longest phrase at each position.
    fn phrases(&mut self) -> Vec<Parsed> {
        let mut out = Vec::new();
        while self.pos < self.tokens.len() {
            let start = self.pos;
            let phrase = self
                .attempt(|p| p.until())
                .or_else(|| self.attempt(|p| p.duration().map(Phrase::Length)))
                .or_else(|| self.attempt(|p| p.moment()));
            match phrase {
                Some(phrase) if self.pos > start => {
                    let span = self.span_from(start);
                    out.push(Parsed { phrase, span });
                }
                _ => self.pos = start + 1,
            }
        }
        out
    }
}

fn clock_12h(hour: u32, minute: u32, pm: bool) -> Option<NaiveTime> {
    if hour == 0 || hour > 12 {
        return None;
    }
    let hour = match (pm, hour) {
        (false, 12) => 0,
        (true, 12) => 12,
        (true, h) => h + 12,
        (false, h) => h,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Grammar confidence never reaches the high band.
pub const GRAMMAR_CEILING: f64 = HIGH_CONFIDENCE - 0.01;

/// Deterministic grammar parser for start, duration and end.
///
/// Confidence sits inside the medium band: `floor + completeness × (high −
/// floor)`, kept strictly below the high threshold.
#[derive(Debug, Clone)]
pub struct GrammarBackupExtractor {
    floor: f64,
}

impl Default for GrammarBackupExtractor {
    fn default() -> Self {
        Self::new(ConfidenceConfig::default().medium_floor)
    }
}

impl GrammarBackupExtractor {
    pub fn new(medium_floor: f64) -> Self {
        Self {
            floor: medium_floor,
        }
    }

    pub fn from_config(config: &ConfidenceConfig) -> Self {
        Self::new(config.medium_floor)
    }

    pub fn supports(field: Field) -> bool {
        field.is_temporal()
    }

    fn band(&self, completeness: f64) -> f64 {
        let completeness = completeness.clamp(0.0, 1.0);
        (self.floor + completeness * (HIGH_CONFIDENCE - self.floor)).min(GRAMMAR_CEILING)
    }

    /// Parse `text` and propose candidates for the supported fields in
    /// `fields`. Context values (a resolved start) anchor end times.
    pub fn extract(&self, request: &CandidateRequest) -> Vec<Candidate> {
        let tokens = tokenize(&request.text);
        let today = request.reference.date();
        let phrases = Parser::new(&tokens, today).phrases();

        let mut out = Vec::new();
        let mut start: Option<NaiveDateTime> = request
            .context
            .get(&Field::Start)
            .and_then(|v| v.as_datetime());

        if request.fields.contains(&Field::Start) {
            if let Some(candidate) = self.start(&phrases, today) {
                start = start.or(candidate.value.as_datetime());
                out.push(candidate);
            }
        }
        if request.fields.contains(&Field::Duration) {
            out.extend(self.duration(&phrases));
        }
        if request.fields.contains(&Field::End) {
            out.extend(self.end(&phrases, start, today));
        }
        out
    }

    fn start(&self, phrases: &[Parsed], today: NaiveDate) -> Option<Candidate> {
        let moments: Vec<(&Parsed, Option<DatePart>, Option<Clock>)> = phrases
            .iter()
            .filter_map(|p| match &p.phrase {
                Phrase::Moment { date, clock } => Some((p, *date, *clock)),
                _ => None,
            })
            .collect();

        let clocks: Vec<(&Parsed, Clock)> = moments
            .iter()
            .filter_map(|(p, _, c)| c.map(|c| (*p, c)))
            .collect();
        let dates: Vec<DatePart> = moments.iter().filter_map(|(_, d, _)| *d).collect();

        let clock = clocks.last().map(|(_, c)| *c);
        let date = dates.last().copied();
        let span = clocks
            .last()
            .map(|(p, _)| p.span)
            .or_else(|| moments.last().map(|(p, _, _)| p.span))?;

        let (value, mut completeness) = match (date, clock) {
            (Some(d), Some(c)) => (
                FieldValue::DateTime(d.date.and_time(c.time)),
                if c.explicit { 1.0 } else { 0.6 },
            ),
            (None, Some(c)) => (
                FieldValue::DateTime(today.and_time(c.time)),
                if c.explicit { 0.8 } else { 0.45 },
            ),
            (Some(d), None) => match d.implied_hour.and_then(|h| NaiveTime::from_hms_opt(h, 0, 0)) {
                Some(at) => (FieldValue::DateTime(d.date.and_time(at)), 0.4),
                None => (FieldValue::Date(d.date), 0.7),
            },
            (None, None) => return None,
        };

        let mut distinct: Vec<NaiveTime> = Vec::new();
        for (_, c) in &clocks {
            if !distinct.contains(&c.time) {
                distinct.push(c.time);
            }
        }
        if distinct.len() > 1 {
            completeness *= 0.5;
        }

        Some(Candidate::new(Field::Start, value, self.band(completeness)).with_span(span))
    }

    fn duration(&self, phrases: &[Parsed]) -> Option<Candidate> {
        let lengths: Vec<(&Parsed, i64)> = phrases
            .iter()
            .filter_map(|p| match p.phrase {
                Phrase::Length(m) => Some((p, m)),
                _ => None,
            })
            .collect();
        let (parsed, minutes) = *lengths.last()?;
        let conflicting = lengths.iter().any(|(_, m)| *m != minutes);
        let completeness = if conflicting { 0.5 } else { 1.0 };
        Some(
            Candidate::new(Field::Duration, FieldValue::Minutes(minutes), self.band(completeness))
                .with_span(parsed.span),
        )
    }

    fn end(&self, phrases: &[Parsed], start: Option<NaiveDateTime>, today: NaiveDate) -> Option<Candidate> {
        let (parsed, clock) = phrases.iter().rev().find_map(|p| match p.phrase {
            Phrase::Until(c) => Some((p, c)),
            _ => None,
        })?;
        let base = start.map(|s| s.date()).unwrap_or(today);
        let mut end = base.and_time(clock.time);
        if let Some(s) = start {
            if end < s && s.hour() >= 18 && clock.time.hour() <= 6 {
                end = end.checked_add_signed(Duration::days(1))?;
            }
            if end < s {
                return None;
            }
        }
        let completeness = match (clock.explicit, start.is_some()) {
            (true, true) => 1.0,
            (true, false) | (false, true) => 0.6,
            (false, false) => 0.3,
        };
        Some(
            Candidate::new(Field::End, FieldValue::DateTime(end), self.band(completeness))
                .with_span(parsed.span),
        )
    }
}

#[async_trait]
impl CandidateSource for GrammarBackupExtractor {
    fn name(&self) -> &str {
        "grammar"
    }

    async fn candidates(&self, request: &CandidateRequest) -> Result<Vec<Candidate>, SourceError> {
        Ok(self.extract(request))
    }
}
