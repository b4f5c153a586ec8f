//! Natural-language date search over scraped date text.
//!
//! Listing sites render event times in free-form English ("Saturday, March
//! 15 · 6:00 PM - 9:00 PM EDT"). [`search_dates`] finds every date and time
//! mention in such text and assembles them into naive timestamps in text
//! order; [`resolve_range`] turns those into a start/end pair.
//!
//! The start/end rules are heuristics inherited from how the listing sites
//! happen to format their pages, not guarantees:
//! - a single timestamp is assumed to last [`DEFAULT_DURATION_HOURS`];
//! - with two or more, the last two are taken as start and end.

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone,
};
use chrono_tz::Tz;
use regex::{Captures, Regex};

use crate::error::AppError;

/// Assumed length of an event when only its start is known.
pub const DEFAULT_DURATION_HOURS: i64 = 2;

/// A date without a year is moved to next year when it would otherwise fall
/// more than this many days before the reference date.
const ROLLOVER_DAYS: i64 = 30;

const MONTHS: &str = "january|february|march|april|may|june|july|august|september|october|november|december|sept|jan|feb|mar|apr|jun|jul|aug|sep|oct|nov|dec";

static ISO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})(?:[T ](\d{2}):(\d{2}))?").expect("valid regex")
});
static MONTH_DAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b({MONTHS})\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?\b(?:,?\s+(\d{{4}})\b)?"
    ))
    .expect("valid regex")
});
static DAY_MONTH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?({MONTHS})\b\.?(?:,?\s+(\d{{4}})\b)?"
    ))
    .expect("valid regex")
});
static NUMERIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})/(\d{1,2})(?:/(\d{4}|\d{2}))?\b").expect("valid regex")
});
static RELATIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(today|tonight|tomorrow)\b").expect("valid regex"));
static RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*(am|pm|a\.m\.|p\.m\.)?\s*(?:-|–|—|to)\s*(\d{1,2})(?::(\d{2}))?\s*(am\b|pm\b|a\.m\.|p\.m\.)",
    )
    .expect("valid regex")
});
static MERIDIEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*(am\b|pm\b|a\.m\.|p\.m\.)").expect("valid regex")
});
static CLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([01]?\d|2[0-3]):([0-5]\d)\b").expect("valid regex"));
static NAMED_TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(noon|midnight)\b").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Date(NaiveDate),
    Time(NaiveTime),
    Range(NaiveTime, NaiveTime),
    DateTime(NaiveDate, NaiveTime),
}

#[derive(Debug)]
struct Candidate {
    start: usize,
    end: usize,
    token: Token,
}

/// Find every date/time mention in `text`, relative to `reference` (today's
/// date in the source's zone), as naive timestamps in text order.
///
/// Each time attaches to the most recent date before it. Times that come
/// before any date ("7pm on March 15") attach to the first date that follows,
/// or to `reference` when the text has no date at all. A date not followed by
/// any time yields midnight. A time range whose end is earlier than its start
/// ("9pm - 1am") ends on the following day.
pub fn search_dates(text: &str, reference: NaiveDate) -> Vec<NaiveDateTime> {
    let mut out = Vec::new();
    let mut current: Option<NaiveDate> = None;
    let mut pending: Option<NaiveDate> = None;
    let mut leading: Vec<Token> = Vec::new();

    for token in tokenize(text, reference) {
        match token {
            Token::Date(date) => {
                if let Some(undated) = pending.replace(date) {
                    out.push(undated.and_time(NaiveTime::MIN));
                }
                if !leading.is_empty() {
                    pending = None;
                    for time in leading.drain(..) {
                        push_times(&mut out, date, time);
                    }
                }
                current = Some(date);
            }
            Token::Time(_) | Token::Range(..) => match current {
                Some(date) => {
                    pending = None;
                    push_times(&mut out, date, token);
                }
                None => leading.push(token),
            },
            Token::DateTime(date, time) => {
                if let Some(undated) = pending.take() {
                    out.push(undated.and_time(NaiveTime::MIN));
                }
                for earlier in leading.drain(..) {
                    push_times(&mut out, date, earlier);
                }
                current = Some(date);
                out.push(date.and_time(time));
            }
        }
    }
    for time in leading {
        push_times(&mut out, reference, time);
    }
    if let Some(undated) = pending {
        out.push(undated.and_time(NaiveTime::MIN));
    }
    out
}

fn push_times(out: &mut Vec<NaiveDateTime>, date: NaiveDate, token: Token) {
    match token {
        Token::Time(time) => out.push(date.and_time(time)),
        Token::Range(from, to) => {
            out.push(date.and_time(from));
            out.push(overnight(date, from, to).and_time(to));
        }
        Token::Date(_) | Token::DateTime(..) => {}
    }
}

/// Date on which `to` falls when a span starting at `from` on `date` ends at `to`.
fn overnight(date: NaiveDate, from: NaiveTime, to: NaiveTime) -> NaiveDate {
    if to < from {
        date.succ_opt().unwrap_or(date)
    } else {
        date
    }
}

/// Pick a start and end from search results. `None` when nothing was found.
///
/// An end earlier than the start on the same day is moved to the next day.
pub fn resolve_range(matches: &[NaiveDateTime]) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let (start, end) = match matches {
        [] => return None,
        [only] => (*only, *only + TimeDelta::hours(DEFAULT_DURATION_HOURS)),
        [.., start, end] => (*start, *end),
    };
    if start.date() == end.date() {
        let day = overnight(end.date(), start.time(), end.time());
        return Some((start, day.and_time(end.time())));
    }
    Some((start, end))
}

/// Attach `tz` to a wall-clock time without shifting it.
///
/// In a DST fold the earlier instant wins; a time inside a DST gap is moved
/// forward one hour.
pub fn bind_timezone(naive: NaiveDateTime, tz: Tz) -> DateTime<FixedOffset> {
    if let Some(dt) = tz.from_local_datetime(&naive).earliest() {
        return dt.fixed_offset();
    }
    let shifted = naive + TimeDelta::hours(1);
    match tz.from_local_datetime(&shifted).earliest() {
        Some(dt) => dt.fixed_offset(),
        None => tz.from_utc_datetime(&naive).fixed_offset(),
    }
}

/// Search `raw`, resolve a start/end pair, and bind both to `tz`.
pub fn parse_event_window(
    raw: &str,
    reference: NaiveDate,
    tz: Tz,
) -> Result<(DateTime<FixedOffset>, DateTime<FixedOffset>), AppError> {
    let matches = search_dates(raw, reference);
    let (start, end) =
        resolve_range(&matches).ok_or_else(|| AppError::NoDateFound(raw.trim().to_string()))?;
    Ok((bind_timezone(start, tz), bind_timezone(end, tz)))
}

fn tokenize(text: &str, reference: NaiveDate) -> Vec<Token> {
    let mut candidates = Vec::new();

    collect(&mut candidates, text, &ISO_RE, |caps| {
        let date = NaiveDate::from_ymd_opt(number(caps, 1)?, number(caps, 2)?, number(caps, 3)?)?;
        match (number(caps, 4), number(caps, 5)) {
            (Some(h), Some(m)) => Some(Token::DateTime(date, NaiveTime::from_hms_opt(h, m, 0)?)),
            _ => Some(Token::Date(date)),
        }
    });
    collect(&mut candidates, text, &MONTH_DAY_RE, |caps| {
        let month = month_number(caps.get(1)?.as_str())?;
        infer_date(month, number(caps, 2)?, number(caps, 3), reference).map(Token::Date)
    });
    collect(&mut candidates, text, &DAY_MONTH_RE, |caps| {
        let month = month_number(caps.get(2)?.as_str())?;
        infer_date(month, number(caps, 1)?, number(caps, 3), reference).map(Token::Date)
    });
    collect(&mut candidates, text, &NUMERIC_RE, |caps| {
        let year = number::<i32>(caps, 3).map(|y| if y < 100 { 2000 + y } else { y });
        infer_date(number(caps, 1)?, number(caps, 2)?, year, reference).map(Token::Date)
    });
    collect(&mut candidates, text, &RELATIVE_RE, |caps| {
        let word = caps.get(1)?.as_str().to_lowercase();
        let date = if word == "tomorrow" {
            reference.succ_opt()?
        } else {
            reference
        };
        Some(Token::Date(date))
    });
    collect(&mut candidates, text, &RANGE_RE, |caps| {
        let end_meridiem = caps.get(6)?.as_str();
        let to = meridiem_time(number(caps, 4)?, number(caps, 5).unwrap_or(0), end_meridiem)?;
        let (hour, minute) = (number(caps, 1)?, number(caps, 2).unwrap_or(0));
        let from = match caps.get(3) {
            Some(meridiem) => meridiem_time(hour, minute, meridiem.as_str())?,
            None => {
                let inherited = meridiem_time(hour, minute, end_meridiem)?;
                if inherited > to {
                    meridiem_time(hour, minute, "am")?
                } else {
                    inherited
                }
            }
        };
        Some(Token::Range(from, to))
    });
    collect(&mut candidates, text, &MERIDIEM_RE, |caps| {
        meridiem_time(
            number(caps, 1)?,
            number(caps, 2).unwrap_or(0),
            caps.get(3)?.as_str(),
        )
        .map(Token::Time)
    });
    collect(&mut candidates, text, &CLOCK_RE, |caps| {
        NaiveTime::from_hms_opt(number(caps, 1)?, number(caps, 2)?, 0).map(Token::Time)
    });
    collect(&mut candidates, text, &NAMED_TIME_RE, |caps| {
        let hour = if caps.get(1)?.as_str().eq_ignore_ascii_case("noon") {
            12
        } else {
            0
        };
        NaiveTime::from_hms_opt(hour, 0, 0).map(Token::Time)
    });

    // Earliest start wins; among equal starts, the longest.
    candidates.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
    let mut tokens = Vec::new();
    let mut covered = 0;
    for candidate in candidates {
        if candidate.start >= covered {
            covered = candidate.end;
            tokens.push(candidate.token);
        }
    }
    tokens
}

fn collect<F>(candidates: &mut Vec<Candidate>, text: &str, re: &Regex, build: F)
where
    F: Fn(&Captures) -> Option<Token>,
{
    for caps in re.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if let Some(token) = build(&caps) {
            candidates.push(Candidate {
                start: whole.start(),
                end: whole.end(),
                token,
            });
        }
    }
}

fn number<T: FromStr>(caps: &Captures, index: usize) -> Option<T> {
    caps.get(index)?.as_str().parse().ok()
}

fn month_number(name: &str) -> Option<u32> {
    let prefix: String = name.chars().take(3).collect::<String>().to_lowercase();
    let month = match prefix.as_str() {
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

fn infer_date(month: u32, day: u32, year: Option<i32>, reference: NaiveDate) -> Option<NaiveDate> {
    if let Some(year) = year {
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    let this_year = NaiveDate::from_ymd_opt(reference.year(), month, day);
    match this_year {
        Some(date) if date >= reference - TimeDelta::days(ROLLOVER_DAYS) => Some(date),
        _ => NaiveDate::from_ymd_opt(reference.year() + 1, month, day),
    }
}

/// 12-hour clock to `NaiveTime`; `meridiem` is any of am/pm/a.m./p.m.
fn meridiem_time(hour: u32, minute: u32, meridiem: &str) -> Option<NaiveTime> {
    if hour == 0 || hour > 12 {
        return None;
    }
    let pm = meridiem.starts_with(['p', 'P']);
    let hour = hour % 12 + if pm { 12 } else { 0 };
    NaiveTime::from_hms_opt(hour, minute, 0)
}
