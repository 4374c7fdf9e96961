//! Lightweight cron-style time expressions.
//! Format: "MIN HOUR DOM MON DOW" (5 fields, no seconds).
//! Each field is `*` or a single number. Example: "0 19 * * *" = every day at 19:00.
//!
//! Day-of-month and day-of-week are ANDed when both are set, so "0 8 13 * 5"
//! only fires on Friday the 13th.

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike};
use std::fmt;
use std::str::FromStr;

use korona_core::error::{KoronaError, Result};

/// Upper bound for the minute-by-minute search (4 years incl. one leap day).
const SEARCH_LIMIT_MINUTES: i64 = (4 * 365 + 1) * 24 * 60;

/// A single field constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Any,
    Exact(u32),
}

impl Field {
    fn matches(self, value: u32) -> bool {
        match self {
            Field::Any => true,
            Field::Exact(n) => n == value,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Any => write!(f, "*"),
            Field::Exact(n) => write!(f, "{n}"),
        }
    }
}

/// Field names and valid ranges, in expression order.
const FIELDS: [(&str, u32, u32); 5] = [
    ("minute", 0, 59),
    ("hour", 0, 23),
    ("day-of-month", 1, 31),
    ("month", 1, 12),
    ("day-of-week", 0, 6),
];

/// A parsed five-field time expression. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeExpression {
    pub minute: Field,
    pub hour: Field,
    pub day_of_month: Field,
    pub month: Field,
    /// 0 = Sunday.
    pub day_of_week: Field,
}

impl TimeExpression {
    /// Parse "MIN HOUR DOM MON DOW".
    pub fn parse(expression: &str) -> Result<Self> {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(KoronaError::parse(format!(
                "'{}' has {} fields, need 5 (MIN HOUR DOM MON DOW)",
                expression,
                parts.len()
            )));
        }

        let mut fields = [Field::Any; 5];
        for (i, (part, (name, min, max))) in parts.iter().zip(FIELDS).enumerate() {
            fields[i] = parse_field(part, name, min, max)?;
        }

        Ok(Self {
            minute: fields[0],
            hour: fields[1],
            day_of_month: fields[2],
            month: fields[3],
            day_of_week: fields[4],
        })
    }

    /// Whether the calendar components of `at` satisfy every field.
    pub fn matches<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> bool {
        self.minute.matches(at.minute())
            && self.hour.matches(at.hour())
            && self.day_of_month.matches(at.day())
            && self.month.matches(at.month())
            && self.day_of_week.matches(at.weekday().num_days_from_sunday())
    }

    /// Next matching minute strictly after the minute containing `after`.
    pub fn next_fire_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Result<DateTime<Tz>> {
        // Truncate to the minute, then step to the following boundary
        let truncated = after.clone()
            - Duration::seconds(i64::from(after.second()))
            - Duration::nanoseconds(i64::from(after.nanosecond()));
        let mut candidate = truncated + Duration::minutes(1);

        for _ in 0..SEARCH_LIMIT_MINUTES {
            if self.matches(&candidate) {
                return Ok(candidate);
            }
            candidate += Duration::minutes(1);
        }

        Err(KoronaError::NoMatch(self.to_string()))
    }
}

impl FromStr for TimeExpression {
    type Err = KoronaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for TimeExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.minute, self.hour, self.day_of_month, self.month, self.day_of_week
        )
    }
}

/// Parse one field: `*` or a plain non-negative number within range.
fn parse_field(field: &str, name: &str, min: u32, max: u32) -> Result<Field> {
    if field == "*" {
        return Ok(Field::Any);
    }

    // u32::from_str accepts a leading '+', which is not valid here
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(KoronaError::parse(format!(
            "{name} field '{field}' must be '*' or a number"
        )));
    }

    let n: u32 = field
        .parse()
        .map_err(|_| KoronaError::parse(format!("{name} field '{field}' is too large")))?;
    if n < min || n > max {
        return Err(KoronaError::parse(format!(
            "{name} field {n} out of range {min}-{max}"
        )));
    }
    Ok(Field::Exact(n))
}
