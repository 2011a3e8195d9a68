//! Deterministic resolution of temporal values.
//!
//! Dates never go to the network: a value is parsed, its precision detected,
//! and the result normalized to the `+YYYY-MM-DDT00:00:00Z` time format with
//! unknown components zeroed.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How precisely a temporal value is known
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Century,
    Decade,
    Year,
    Month,
    Day,
}

impl Precision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Century => "century",
            Precision::Decade => "decade",
            Precision::Year => "year",
            Precision::Month => "month",
            Precision::Day => "day",
        }
    }

    /// Numeric precision code used by wikibase time values
    pub fn wikibase_code(&self) -> u8 {
        match self {
            Precision::Century => 7,
            Precision::Decade => 8,
            Precision::Year => 9,
            Precision::Month => 10,
            Precision::Day => 11,
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed temporal value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalValue {
    /// Normalized time string, e.g. `+1990-00-00T00:00:00Z`
    pub time: String,
    pub precision: Precision,
}

impl TemporalValue {
    fn new(year: i32, month: u32, day: u32, precision: Precision) -> Self {
        Self {
            time: format!("+{:04}-{:02}-{:02}T00:00:00Z", year, month, day),
            precision,
        }
    }
}

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Parse a raw value as a date, returning None when it is not one.
pub fn parse(raw: &str) -> Option<TemporalValue> {
    parse_normalized(&normalize(raw))
}

/// Parse a value whose property declares no datatype.
///
/// Only unambiguous shapes count here: a bare year must be four digits with no
/// leading zero, so "747" or "007" stay ordinary values.
pub fn parse_untyped(raw: &str) -> Option<TemporalValue> {
    let value = normalize(raw);
    let parsed = parse_normalized(&value)?;
    if parsed.precision == Precision::Year && (value.len() != 4 || value.starts_with('0')) {
        return None;
    }
    Some(parsed)
}

fn normalize(raw: &str) -> String {
    let value = raw.trim().to_lowercase();
    match value.strip_prefix("the ") {
        Some(rest) => rest.to_string(),
        None => value,
    }
}

fn parse_normalized(value: &str) -> Option<TemporalValue> {
    if value.is_empty() {
        return None;
    }
    parse_decade(value)
        .or_else(|| parse_century(value))
        .or_else(|| parse_iso(value))
        .or_else(|| parse_slashed(value))
        .or_else(|| parse_textual(value))
}

/// "1990s"
fn parse_decade(value: &str) -> Option<TemporalValue> {
    let digits = value.strip_suffix('s')?.trim_end_matches('\'');
    if digits.len() != 4 || !digits.ends_with('0') {
        return None;
    }
    let year = nonzero_year(parse_digits(digits)?)?;
    Some(TemporalValue::new(year, 0, 0, Precision::Decade))
}

/// "19th century"
fn parse_century(value: &str) -> Option<TemporalValue> {
    let ordinal = value.strip_suffix("century")?.trim();
    let number = ["st", "nd", "rd", "th"].iter().find_map(|suffix| ordinal.strip_suffix(suffix))?;
    let century: i32 = parse_digits(number)?;
    if !(1..=21).contains(&century) {
        return None;
    }
    Some(TemporalValue::new((century - 1) * 100 + 1, 0, 0, Precision::Century))
}

/// "2020", "2020-05", "2020-05-17"
fn parse_iso(value: &str) -> Option<TemporalValue> {
    let parts: Vec<&str> = value.split('-').collect();
    match parts.as_slice() {
        [year] if (3..=4).contains(&year.len()) => {
            Some(TemporalValue::new(nonzero_year(parse_digits(year)?)?, 0, 0, Precision::Year))
        }
        [year, month] if year.len() == 4 && month.len() == 2 => {
            let month = valid_month(parse_digits(month)?)?;
            Some(TemporalValue::new(nonzero_year(parse_digits(year)?)?, month, 0, Precision::Month))
        }
        [year, month, day] if year.len() == 4 && month.len() == 2 && day.len() == 2 => {
            day_value(parse_digits(year)?, parse_digits(month)?, parse_digits(day)?)
        }
        _ => None,
    }
}

/// "17/05/2020", day first
fn parse_slashed(value: &str) -> Option<TemporalValue> {
    let parts: Vec<&str> = value.split('/').collect();
    match parts.as_slice() {
        [day, month, year] if year.len() == 4 && day.len() <= 2 && month.len() <= 2 => {
            day_value(parse_digits(year)?, parse_digits(month)?, parse_digits(day)?)
        }
        _ => None,
    }
}

/// "17 May 2020", "May 17, 2020", "May 2020"
fn parse_textual(value: &str) -> Option<TemporalValue> {
    let cleaned = value.replace(',', " ");
    let tokens: Vec<&str> = cleaned.split_whitespace().collect();
    match tokens.as_slice() {
        [month, year] => {
            let month = month_number(month)?;
            Some(TemporalValue::new(four_digit_year(year)?, month, 0, Precision::Month))
        }
        [first, second, year] => {
            let year = four_digit_year(year)?;
            if let Some(month) = month_number(first) {
                day_value(year, month, parse_digits(second.trim_end_matches(char::is_alphabetic))?)
            } else {
                let month = month_number(second)?;
                day_value(year, month, parse_digits(first.trim_end_matches(char::is_alphabetic))?)
            }
        }
        _ => None,
    }
}

fn day_value(year: i32, month: u32, day: u32) -> Option<TemporalValue> {
    nonzero_year(year)?;
    NaiveDate::from_ymd_opt(year, month, day)?;
    Some(TemporalValue::new(year, month, day, Precision::Day))
}

fn month_number(token: &str) -> Option<u32> {
    let token = token.trim_end_matches('.');
    if token.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .position(|m| *m == token || (token.len() == 3 && m.starts_with(token)))
        .map(|i| i as u32 + 1)
}

fn valid_month(month: u32) -> Option<u32> {
    (1..=12).contains(&month).then_some(month)
}

fn four_digit_year(token: &str) -> Option<i32> {
    if token.len() != 4 {
        return None;
    }
    nonzero_year(parse_digits(token)?)
}

/// The calendar has no year 0
fn nonzero_year(year: i32) -> Option<i32> {
    (year != 0).then_some(year)
}

fn parse_digits<T: std::str::FromStr>(token: &str) -> Option<T> {
    if token.is_empty() || !token.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}
