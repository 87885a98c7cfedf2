//! Natural-language parsing of reservation requests.
//!
//! Handles short English sentences in a constrained grammar:
//! "book 2 tonight 8pm at Prozdor", "reservation for 4 tomorrow 7:30pm at
//! Machneyuda", "dinner next Friday 9pm, 3 people, Taizu". Party size, date,
//! time, and venue are extracted in independent passes, so clause order
//! never matters. Relative dates resolve against an explicit reference
//! instant rather than the system clock.

use std::collections::HashSet;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;

use crate::error::ParseError;
use crate::profile::UserProfile;

/// Largest party the upstream platform accepts through the web flow.
pub const MAX_PARTY_SIZE: u32 = 20;

/// A validated reservation request. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationIntent {
    pub party_size: u32,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub venue_query: String,
    /// The text the intent was extracted from, kept for logging.
    pub raw: String,
}

impl ReservationIntent {
    /// Human-readable date like "Thursday, March 6".
    pub fn display_date(&self) -> String {
        self.date.format("%A, %B %-d").to_string()
    }

    /// 24-hour `HH:MM` for user-facing text.
    pub fn display_time(&self) -> String {
        self.time.format("%H:%M").to_string()
    }
}

/// Knobs controlling the parser's fallback behavior.
#[derive(Debug, Clone)]
pub struct ParserOptions {
    /// Party size to assume when the text carries no usable number.
    /// `None` makes a missing party size a hard parse failure.
    pub fallback_party_size: Option<u32>,
    /// Time to assume when the text carries no time phrase at all.
    /// `None` makes a missing time a hard parse failure.
    pub fallback_time: Option<NaiveTime>,
    /// Time implied by "tonight" when no explicit time is given.
    pub evening_default: NaiveTime,
    /// Bare hours below this (with no am/pm, booking for today) read as PM.
    pub pm_cutover_hour: u32,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            fallback_party_size: None,
            fallback_time: None,
            evening_default: NaiveTime::from_hms_opt(20, 0, 0).unwrap_or_default(),
            pm_cutover_hour: 7,
        }
    }
}

impl ParserOptions {
    /// Options seeded from a diner profile's saved preferences.
    pub fn from_profile(profile: &UserProfile) -> Self {
        Self {
            fallback_party_size: Some(profile.party_size),
            fallback_time: Some(profile.preferred_time),
            ..Self::default()
        }
    }
}

/// Words stripped before a venue name is extracted.
const NOISE_WORDS: &[&str] = &[
    "book", "reserve", "make", "a", "table", "reservation", "for", "at", "in", "the",
    "restaurant", "tonight", "today", "tomorrow", "next", "people", "person", "persons",
    "guests", "guest", "pax", "dinner", "lunch", "breakfast", "brunch", "seats", "seat",
    "diners", "please", "me", "us", "want", "need", "get", "find", "search", "check",
    "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday", "mon",
    "tue", "tues", "wed", "thu", "thur", "thurs", "fri", "sat", "sun", "am", "pm", "on",
    "this",
];

/// Extracts [`ReservationIntent`] values from free text.
pub struct RequestParser {
    options: ParserOptions,
    noise: HashSet<&'static str>,
    iso_date: Regex,
    slash_date: Regex,
    weekday: Regex,
    month_day: Regex,
    day_month: Regex,
    today_word: Regex,
    tomorrow_word: Regex,
    tonight_word: Regex,
    colon_time: Regex,
    meridiem_hour: Regex,
    at_hour: Regex,
    count_party: Regex,
    party_of: Regex,
    for_party: Regex,
    booking_party: Regex,
    bare_party: Regex,
    at_span: Regex,
    in_span: Regex,
    word: Regex,
}

impl RequestParser {
    pub fn new(options: ParserOptions) -> Self {
        const WEEKDAYS: &str =
            "monday|mon|tuesday|tues|tue|wednesday|wed|thursday|thurs|thur|thu|friday|fri|saturday|sat|sunday|sun";
        const MONTHS: &str = "january|jan|february|feb|march|mar|april|apr|may|june|jun|july|jul|august|aug|september|sept|sep|october|oct|november|nov|december|dec";
        const COUNT_WORDS: &str = "people|persons|person|guests|guest|pax|seats|seat|diners";

        Self {
            options,
            noise: NOISE_WORDS.iter().copied().collect(),
            iso_date: Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").unwrap(),
            slash_date: Regex::new(r"\b(\d{1,2})[/\-](\d{1,2})\b").unwrap(),
            weekday: Regex::new(&format!(r"(?i)\b(next\s+)?({WEEKDAYS})\b")).unwrap(),
            month_day: Regex::new(&format!(r"(?i)\b({MONTHS})\s+(\d{{1,2}})\b")).unwrap(),
            day_month: Regex::new(&format!(r"(?i)\b(\d{{1,2}})\s+({MONTHS})\b")).unwrap(),
            today_word: Regex::new(r"(?i)\b(?:tonight|today)\b").unwrap(),
            tomorrow_word: Regex::new(r"(?i)\btomorrow\b").unwrap(),
            tonight_word: Regex::new(r"(?i)\btonight\b").unwrap(),
            colon_time: Regex::new(r"(?i)\b(\d{1,2}):(\d{2})(?::\d{2})?\s*(am|pm)?\b").unwrap(),
            meridiem_hour: Regex::new(r"(?i)\b(\d{1,2})\s*(am|pm)\b").unwrap(),
            at_hour: Regex::new(r"(?i)\bat\s+(\d{1,2})\b").unwrap(),
            count_party: Regex::new(&format!(r"(?i)\b(\d{{1,2}})\s+(?:{COUNT_WORDS})\b"))
                .unwrap(),
            party_of: Regex::new(r"(?i)\bparty\s+of\s+(\d{1,2})\b").unwrap(),
            for_party: Regex::new(r"(?i)\b(?:table\s+)?for\s+(\d{1,2})\b").unwrap(),
            booking_party: Regex::new(r"(?i)\b(?:book|reserve)\s+(?:us\s+|me\s+|a\s+)?(\d{1,2})\b")
                .unwrap(),
            bare_party: Regex::new(r"\b([2-9])\b").unwrap(),
            at_span: Regex::new(
                r"(?i)\bat\s+([a-z][a-z '\-]+?)(?:\s*$|[,.!?]|\s+(?:on|this|next|tonight|tomorrow|\d))",
            )
            .unwrap(),
            in_span: Regex::new(r"(?i)\bin\s+([a-z][a-z '\-]+?)(?:\s*$|[,.!?])").unwrap(),
            word: Regex::new(r"[A-Za-z][A-Za-z'’\-]*").unwrap(),
        }
    }

    /// Parse a reservation request against a reference instant.
    ///
    /// Fails when no party size, no time, or no venue fragment can be
    /// extracted (subject to the configured fallbacks) or when an explicit
    /// date lies in the past.
    pub fn parse(
        &self,
        text: &str,
        reference_now: NaiveDateTime,
    ) -> Result<ReservationIntent, ParseError> {
        let today = reference_now.date();
        let date = self.extract_date(text, today)?.unwrap_or(today);
        let time = self.extract_time(text, date, today)?;
        let party_size = self.extract_party_size(text)?;
        let venue_query = self.extract_venue(text)?;

        Ok(ReservationIntent {
            party_size,
            date,
            time,
            venue_query,
            raw: text.to_string(),
        })
    }

    // ----- date ------------------------------------------------------------

    fn extract_date(&self, text: &str, today: NaiveDate) -> Result<Option<NaiveDate>, ParseError> {
        if let Some(caps) = self.weekday.captures(text) {
            let target = weekday_number(&caps[2].to_lowercase());
            let current = today.weekday().num_days_from_monday() as i64;
            let mut days_ahead = (target - current).rem_euclid(7);
            // "next <weekday>" always skips this week's occurrence.
            if caps.get(1).is_some() {
                days_ahead += 7;
            }
            return Ok(Some(today + Duration::days(days_ahead)));
        }

        if self.today_word.is_match(text) {
            return Ok(Some(today));
        }
        if self.tomorrow_word.is_match(text) {
            return Ok(Some(today + Duration::days(1)));
        }

        let month_day = self
            .month_day
            .captures(text)
            .map(|caps| (caps[1].to_lowercase(), caps[2].to_string(), caps[0].to_string()))
            .or_else(|| {
                self.day_month
                    .captures(text)
                    .map(|caps| (caps[2].to_lowercase(), caps[1].to_string(), caps[0].to_string()))
            });
        if let Some((month_name, day_digits, matched)) = month_day {
            let month = month_number(&month_name);
            let day: u32 = day_digits
                .parse()
                .map_err(|_| ParseError::InvalidDate { text: matched.clone() })?;
            let date = roll_forward(today, month, day)
                .ok_or(ParseError::InvalidDate { text: matched })?;
            return Ok(Some(date));
        }

        if let Some(caps) = self.iso_date.captures(text) {
            let matched = caps[0].to_string();
            let (year, month, day) = (parse_u32(&caps[1]), parse_u32(&caps[2]), parse_u32(&caps[3]));
            let date = NaiveDate::from_ymd_opt(year as i32, month, day)
                .ok_or(ParseError::InvalidDate { text: matched })?;
            if date < today {
                return Err(ParseError::DateInPast { date });
            }
            return Ok(Some(date));
        }

        if let Some(caps) = self.slash_date.captures(text) {
            let (a, b) = (parse_u32(&caps[1]), parse_u32(&caps[2]));
            // Guess DD/MM vs MM/DD by plausibility.
            for (month, day) in [(b, a), (a, b)] {
                if (1..=12).contains(&month) {
                    if let Some(date) = roll_forward(today, month, day) {
                        return Ok(Some(date));
                    }
                }
            }
        }

        Ok(None)
    }

    // ----- time ------------------------------------------------------------

    fn extract_time(
        &self,
        text: &str,
        date: NaiveDate,
        today: NaiveDate,
    ) -> Result<NaiveTime, ParseError> {
        // Date digits look like times; drop them before matching.
        let cleaned = self.remove_matches(text, &[&self.iso_date, &self.slash_date]);

        if let Some(caps) = self.colon_time.captures(&cleaned) {
            let matched = caps[0].trim().to_string();
            let hour = parse_u32(&caps[1]);
            let minute = parse_u32(&caps[2]);
            let meridiem = caps.get(3).map(|m| m.as_str().to_lowercase());
            if hour > 23 || minute > 59 {
                return Err(ParseError::InvalidTime { text: matched });
            }
            let hour = self.to_24_hour(hour, meridiem.as_deref(), date, today, &matched)?;
            return NaiveTime::from_hms_opt(hour, minute, 0)
                .ok_or(ParseError::InvalidTime { text: matched });
        }

        if let Some(caps) = self.meridiem_hour.captures(&cleaned) {
            let matched = caps[0].trim().to_string();
            let hour = parse_u32(&caps[1]);
            let meridiem = caps[2].to_lowercase();
            if hour > 23 {
                return Err(ParseError::InvalidTime { text: matched });
            }
            let hour = self.to_24_hour(hour, Some(&meridiem), date, today, &matched)?;
            return NaiveTime::from_hms_opt(hour, 0, 0)
                .ok_or(ParseError::InvalidTime { text: matched });
        }

        if let Some(caps) = self.at_hour.captures(&cleaned) {
            let hour = parse_u32(&caps[1]);
            // A bare "at N" above 23 is probably not a time at all.
            if hour <= 23 {
                let matched = caps[0].trim().to_string();
                let hour = self.to_24_hour(hour, None, date, today, &matched)?;
                return NaiveTime::from_hms_opt(hour, 0, 0)
                    .ok_or(ParseError::InvalidTime { text: matched });
            }
        }

        if self.tonight_word.is_match(text) {
            return Ok(self.options.evening_default);
        }
        self.options.fallback_time.ok_or(ParseError::MissingTime)
    }

    /// Resolve am/pm markers, and bias markerless hours below the cutover
    /// toward the evening when the booking is for today.
    fn to_24_hour(
        &self,
        hour: u32,
        meridiem: Option<&str>,
        date: NaiveDate,
        today: NaiveDate,
        matched: &str,
    ) -> Result<u32, ParseError> {
        match meridiem {
            Some("pm") if hour < 12 => Ok(hour + 12),
            // "20:30pm" carries a redundant marker; the hour is already 24-hour.
            Some("pm") => Ok(hour),
            Some("am") if hour == 12 => Ok(0),
            Some("am") if hour < 12 => Ok(hour),
            Some("am") => Err(ParseError::InvalidTime {
                text: matched.to_string(),
            }),
            Some(_) => Err(ParseError::InvalidTime {
                text: matched.to_string(),
            }),
            None if hour >= 1 && hour < self.options.pm_cutover_hour.min(12) && date == today => {
                Ok(hour + 12)
            }
            None => Ok(hour),
        }
    }

    // ----- party size ------------------------------------------------------

    fn extract_party_size(&self, text: &str) -> Result<u32, ParseError> {
        // Times and dates first, so their digits can never read as a party.
        let stripped = self.remove_matches(
            text,
            &[
                &self.iso_date,
                &self.slash_date,
                &self.month_day,
                &self.day_month,
                &self.colon_time,
                &self.meridiem_hour,
                &self.at_hour,
            ],
        );

        for pattern in [
            &self.count_party,
            &self.party_of,
            &self.for_party,
            &self.booking_party,
            &self.bare_party,
        ] {
            if let Some(caps) = pattern.captures(&stripped) {
                let size = parse_u32(&caps[1]);
                if (1..=MAX_PARTY_SIZE).contains(&size) {
                    return Ok(size);
                }
                return Err(ParseError::PartySizeOutOfRange {
                    size: size as i64,
                    max: MAX_PARTY_SIZE,
                });
            }
        }

        if stripped.chars().any(|c| c.is_ascii_digit()) {
            // A number is present but not attributable to a party size;
            // guessing here would book for the wrong headcount.
            return Err(ParseError::MissingPartySize);
        }
        self.options
            .fallback_party_size
            .ok_or(ParseError::MissingPartySize)
    }

    // ----- venue -----------------------------------------------------------

    fn extract_venue(&self, text: &str) -> Result<String, ParseError> {
        if let Some(caps) = self.at_span.captures(text) {
            let name = self.trim_trailing_noise(caps[1].trim());
            if !name.is_empty() {
                return Ok(name);
            }
        }

        if let Some(caps) = self.in_span.captures(text) {
            let kept: Vec<&str> = caps[1]
                .split_whitespace()
                .filter(|word| !self.noise.contains(word.to_lowercase().as_str()))
                .collect();
            if !kept.is_empty() {
                return Ok(kept.join(" "));
            }
        }

        let capitalized: Vec<&str> = self
            .word
            .find_iter(text)
            .map(|m| m.as_str())
            .filter(|word| {
                word.chars().next().is_some_and(|c| c.is_uppercase())
                    && !self.noise.contains(word.to_lowercase().as_str())
            })
            .collect();
        if !capitalized.is_empty() {
            return Ok(capitalized.join(" "));
        }

        // Last resort: whatever survives once every recognized token is gone.
        let residue = self.remove_matches(
            text,
            &[
                &self.iso_date,
                &self.slash_date,
                &self.month_day,
                &self.day_month,
                &self.colon_time,
                &self.meridiem_hour,
                &self.at_hour,
                &self.count_party,
                &self.party_of,
                &self.for_party,
                &self.booking_party,
            ],
        );
        let leftover: Vec<&str> = residue
            .split_whitespace()
            .map(|word| word.trim_matches(|c: char| c.is_ascii_punctuation()))
            .filter(|word| {
                !word.is_empty()
                    && !word.chars().all(|c| c.is_ascii_digit())
                    && !self.noise.contains(word.to_lowercase().as_str())
            })
            .collect();
        if !leftover.is_empty() {
            return Ok(leftover.join(" "));
        }

        Err(ParseError::MissingVenue)
    }

    fn trim_trailing_noise(&self, name: &str) -> String {
        let mut parts: Vec<&str> = name.split_whitespace().collect();
        while let Some(last) = parts.last() {
            if self.noise.contains(last.to_lowercase().as_str()) {
                parts.pop();
            } else {
                break;
            }
        }
        parts.join(" ")
    }

    // ----- helpers ----------------------------------------------------------

    /// Remove every span matched by any of `patterns`. Match ranges fall on
    /// character boundaries, so the surviving bytes remain valid UTF-8.
    fn remove_matches(&self, text: &str, patterns: &[&Regex]) -> String {
        let mut keep = vec![true; text.len()];
        for pattern in patterns {
            for found in pattern.find_iter(text) {
                keep[found.range()].fill(false);
            }
        }
        let bytes: Vec<u8> = text
            .bytes()
            .zip(keep)
            .filter_map(|(byte, kept)| kept.then_some(byte))
            .collect();
        String::from_utf8(bytes).unwrap_or_else(|_| text.to_string())
    }
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new(ParserOptions::default())
    }
}

fn parse_u32(digits: &str) -> u32 {
    digits.parse().unwrap_or(0)
}

/// Monday = 0 through Sunday = 6, matching `num_days_from_monday`.
fn weekday_number(name: &str) -> i64 {
    match name {
        "monday" | "mon" => 0,
        "tuesday" | "tues" | "tue" => 1,
        "wednesday" | "wed" => 2,
        "thursday" | "thurs" | "thur" | "thu" => 3,
        "friday" | "fri" => 4,
        "saturday" | "sat" => 5,
        _ => 6,
    }
}

fn month_number(name: &str) -> u32 {
    match name {
        "january" | "jan" => 1,
        "february" | "feb" => 2,
        "march" | "mar" => 3,
        "april" | "apr" => 4,
        "may" => 5,
        "june" | "jun" => 6,
        "july" | "jul" => 7,
        "august" | "aug" => 8,
        "september" | "sept" | "sep" => 9,
        "october" | "oct" => 10,
        "november" | "nov" => 11,
        _ => 12,
    }
}

/// Build a date in the current year, rolling to next year when already past.
fn roll_forward(today: NaiveDate, month: u32, day: u32) -> Option<NaiveDate> {
    let date = NaiveDate::from_ymd_opt(today.year(), month, day)?;
    if date < today {
        NaiveDate::from_ymd_opt(today.year() + 1, month, day)
    } else {
        Some(date)
    }
}
