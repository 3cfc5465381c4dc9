//! Date/time normalization for task scheduling
//!
//! Resolves partial date/time expressions (relative words, explicit ISO
//! dates, clock times) against a reference "now" into a fully-specified
//! instant. Parse failures are never errors here; every unresolvable
//! component falls back to a default.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use lazy_static::lazy_static;
use regex::Regex;

/// Canonical absolute timestamp format, `YYYY-MM-DD HH:MM:SS`.
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Canonical time-of-day format, `HH:MM:SS`.
pub const TIME_FORMAT: &str = "%H:%M:%S";

lazy_static! {
    static ref DATE_RE: Regex = Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").unwrap();
    static ref TIME_RE: Regex = Regex::new(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*(am|pm)?\b").unwrap();
}

/// Resolve free text against the reference instant.
///
/// "tomorrow"/"today" pick the date, an explicit `YYYY-MM-DD` overrides
/// it, and a clock time (`H`, `H:MM`, optional am/pm) overrides the
/// default midnight. With no signal at all the reference instant is
/// returned verbatim.
pub fn resolve_utterance(utterance: &str, now: NaiveDateTime) -> NaiveDateTime {
    let lowered = utterance.to_lowercase();

    let mut date_part: Option<NaiveDate> = None;
    if lowered.contains("tomorrow") {
        date_part = Some(now.date() + Duration::days(1));
    } else if lowered.contains("today") {
        date_part = Some(now.date());
    }

    // An explicit ISO date anywhere in the text wins over relative words.
    let mut date_span: Option<(usize, usize)> = None;
    if let Some(caps) = DATE_RE.captures(utterance) {
        if let Some(whole) = caps.get(0) {
            let parsed = caps[1]
                .parse::<i32>()
                .ok()
                .zip(caps[2].parse::<u32>().ok())
                .zip(caps[3].parse::<u32>().ok())
                .and_then(|((y, m), d)| NaiveDate::from_ymd_opt(y, m, d));
            if let Some(date) = parsed {
                date_part = Some(date);
                date_span = Some((whole.start(), whole.end()));
            }
        }
    }

    let mut time_part: Option<NaiveTime> = None;
    for caps in TIME_RE.captures_iter(utterance) {
        let Some(whole) = caps.get(0) else { continue };

        // Digits belonging to the explicit date are not a clock time.
        if let Some((start, end)) = date_span {
            if whole.start() < end && whole.end() > start {
                continue;
            }
        }

        let Some(hour_match) = caps.get(1) else { continue };
        let Ok(mut hour) = hour_match.as_str().parse::<u32>() else { continue };
        let minute: u32 = caps
            .get(2)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);

        match caps.get(3).map(|m| m.as_str().to_lowercase()).as_deref() {
            Some("pm") if hour != 12 => hour += 12,
            Some("am") if hour == 12 => hour = 0,
            _ => {}
        }

        // Out-of-range candidates (e.g. a stray "75") are ignored.
        if let Some(time) = NaiveTime::from_hms_opt(hour, minute, 0) {
            time_part = Some(time);
            break;
        }
    }

    match (date_part, time_part) {
        (Some(date), Some(time)) => NaiveDateTime::new(date, time),
        (Some(date), None) => NaiveDateTime::new(date, NaiveTime::MIN),
        (None, Some(time)) => NaiveDateTime::new(now.date(), time),
        (None, None) => now,
    }
}

/// Resolve extracted `date`/`time` fields against the reference instant.
///
/// `date_s` is expected as `YYYY-MM-DD` and falls back to the reference
/// day; `time_s` is tried as `HH:MM:SS` then `HH:MM` and falls back to
/// midnight. The result is always fully specified.
pub fn resolve_fields(date_s: &str, time_s: &str, now: NaiveDateTime) -> NaiveDateTime {
    let date = if date_s.is_empty() {
        now.date()
    } else {
        NaiveDate::parse_from_str(date_s, "%Y-%m-%d").unwrap_or_else(|_| now.date())
    };

    let time = if time_s.is_empty() {
        NaiveTime::MIN
    } else {
        NaiveTime::parse_from_str(time_s, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(time_s, "%H:%M"))
            .unwrap_or(NaiveTime::MIN)
    };

    NaiveDateTime::new(date, time)
}

/// Format the canonical `YYYY-MM-DD HH:MM:SS` string.
pub fn date_full(instant: &NaiveDateTime) -> String {
    instant.format(DATE_TIME_FORMAT).to_string()
}

/// Format the `HH:MM:SS` time-of-day string.
pub fn time_only(instant: &NaiveDateTime) -> String {
    instant.format(TIME_FORMAT).to_string()
}
