//! Pinned timestamp parsing and the canonical naive rendering.
//!
//! Accepted inputs:
//!
//! | Shape | Example |
//! |-------|---------|
//! | date only | `2023-01-02` |
//! | minutes | `2023-01-02 08:15`, `2023-01-02T08:15` |
//! | seconds | `2023-01-02 08:15:30`, `2023-01-02T08:15:30` |
//! | fraction (1-9 digits) | `2023-01-02 08:15:30.123456` |
//! | zone designator | `...Z`, `... UTC`, `...+02:00`, `...-0500`, `...+01` |
//!
//! Zone designators are discarded and the wall-clock reading is kept; fractional
//! seconds are truncated. Anything else is rejected.

use time::macros::format_description;
use time::{Date, PrimitiveDateTime, Time};

use crate::error::PipelineError;

/// Parse a timestamp under the pinned format set.
pub fn parse_timestamp(input: &str) -> Option<PrimitiveDateTime> {
    let trimmed = input.trim();
    if trimmed.len() < 10 || !trimmed.is_char_boundary(10) {
        return None;
    }

    let (date_part, rest) = trimmed.split_at(10);
    let date = Date::parse(date_part, format_description!("[year]-[month]-[day]")).ok()?;
    if rest.is_empty() {
        return Some(date.midnight());
    }

    let clock = rest.strip_prefix(|ch: char| ch == 'T' || ch == ' ')?;
    let clock = strip_zone(clock)?;
    let clock = strip_fraction(clock)?;
    let time = parse_clock(clock)?;

    Some(PrimitiveDateTime::new(date, time))
}

/// Parse a calendar date in `YYYY-MM-DD` form.
pub fn parse_date(input: &str) -> Result<Date, PipelineError> {
    Date::parse(input.trim(), format_description!("[year]-[month]-[day]")).map_err(|_| {
        PipelineError::InvalidDate {
            value: input.to_owned(),
        }
    })
}

/// Render as `YYYY-MM-DD HH:MM:SS`.
pub fn format_timestamp(value: PrimitiveDateTime) -> String {
    format!(
        "{} {:02}:{:02}:{:02}",
        format_date(value.date()),
        value.hour(),
        value.minute(),
        value.second()
    )
}

/// Render as `YYYY-MM-DD`.
pub fn format_date(value: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        value.year(),
        u8::from(value.month()),
        value.day()
    )
}

fn strip_zone(clock: &str) -> Option<&str> {
    if let Some(stripped) = clock.strip_suffix(" UTC") {
        return Some(stripped);
    }
    if let Some(stripped) = clock.strip_suffix('Z') {
        return Some(stripped);
    }

    let Some(position) = clock.find(['+', '-']) else {
        return Some(clock);
    };
    let offset = &clock[position + 1..];
    let well_formed = match offset.len() {
        2 | 4 => offset.bytes().all(|byte| byte.is_ascii_digit()),
        5 => {
            let bytes = offset.as_bytes();
            bytes[2] == b':'
                && bytes[..2].iter().all(u8::is_ascii_digit)
                && bytes[3..].iter().all(u8::is_ascii_digit)
        }
        _ => false,
    };

    well_formed.then(|| &clock[..position])
}

fn strip_fraction(clock: &str) -> Option<&str> {
    match clock.split_once('.') {
        None => Some(clock),
        Some((whole, fraction)) => {
            let valid = (1..=9).contains(&fraction.len())
                && fraction.bytes().all(|byte| byte.is_ascii_digit());
            valid.then_some(whole)
        }
    }
}

fn parse_clock(clock: &str) -> Option<Time> {
    match clock.len() {
        5 => Time::parse(clock, format_description!("[hour]:[minute]")).ok(),
        8 => Time::parse(clock, format_description!("[hour]:[minute]:[second]")).ok(),
        _ => None,
    }
}
