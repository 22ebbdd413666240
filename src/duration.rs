/// Duration codec: `[[[days:]hours:]minutes:]seconds[.milliseconds]` to and from milliseconds
use std::fmt;
use std::iter;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A wait interval in milliseconds.
pub type Millis = u64;

const MAX_COLONS: usize = 3;

/// How a single numeric field is read.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldPolicy {
    /// Read leading digits and ignore the rest; a field without digits is zero.
    #[default]
    Lenient,
    /// Every character of a field must be an ASCII digit.
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Days,
    Hours,
    Minutes,
    Seconds,
    Milliseconds,
}

impl Unit {
    fn millis(self) -> i64 {
        match self {
            Unit::Days => 86_400_000,
            Unit::Hours => 3_600_000,
            Unit::Minutes => 60_000,
            Unit::Seconds => 1_000,
            Unit::Milliseconds => 1,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Unit::Days => "days",
            Unit::Hours => "hours",
            Unit::Minutes => "minutes",
            Unit::Seconds => "seconds",
            Unit::Milliseconds => "milliseconds",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationError {
    #[error("malformed duration `{0}`")]
    Malformed(String),
    #[error("invalid {unit} field `{field}`")]
    InvalidField { unit: Unit, field: String },
    #[error("{0} must not be negative")]
    Negative(Unit),
    #[error("duration is too large")]
    Overflow,
}

/// Parses a duration such as `1:30:00` or `3:07:42:13.962` into milliseconds.
///
/// Fields are positional and read right to left (seconds, minutes, hours,
/// days), so `420:69` is 420 minutes and 69 seconds. The fractional part is
/// padded on the right, so `.5` is 500 milliseconds.
pub fn parse_duration(input: &str, policy: FieldPolicy) -> Result<Millis, DurationError> {
    if input.contains("::") || input.contains(":.") {
        return Err(DurationError::Malformed(input.to_string()));
    }

    let (clock, fraction) = match input.split_once('.') {
        Some((clock, fraction)) => (clock, Some(fraction)),
        None => (input, None),
    };

    let millis = match fraction {
        Some(fraction) => {
            let padded: String = fraction.chars().chain(iter::repeat('0')).take(3).collect();
            component(&padded, Unit::Milliseconds, policy)?
        }
        None => 0,
    };

    let fields: Vec<&str> = clock.split(':').collect();
    if fields.len() > MAX_COLONS + 1 {
        return Err(DurationError::Malformed(input.to_string()));
    }

    let units = [Unit::Seconds, Unit::Minutes, Unit::Hours, Unit::Days];
    let mut total = millis;
    for (field, unit) in fields.iter().rev().zip(units) {
        total = total
            .checked_add(component(field, unit, policy)?)
            .ok_or(DurationError::Overflow)?;
    }
    // The domain is half-open: i64::MAX itself is out of range.
    if total == i64::MAX {
        return Err(DurationError::Overflow);
    }

    Ok(total as Millis)
}

fn component(field: &str, unit: Unit, policy: FieldPolicy) -> Result<i64, DurationError> {
    let value = match policy {
        FieldPolicy::Lenient => leading_integer(field)?,
        FieldPolicy::Strict => strict_integer(field, unit)?,
    };
    if value < 0 {
        return Err(DurationError::Negative(unit));
    }
    value.checked_mul(unit.millis()).ok_or(DurationError::Overflow)
}

// Whitespace, an optional sign, then as many digits as there are.
fn leading_integer(field: &str) -> Result<i64, DurationError> {
    let field = field.trim_start_matches(|c: char| c.is_ascii_whitespace());
    let (negative, rest) = match field.as_bytes().first() {
        Some(b'-') => (true, &field[1..]),
        Some(b'+') => (false, &field[1..]),
        _ => (false, field),
    };
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let digits = &rest[..end];
    if digits.is_empty() {
        return Ok(0);
    }

    let value: i64 = digits.parse().map_err(|_| DurationError::Overflow)?;
    Ok(if negative { -value } else { value })
}

fn strict_integer(field: &str, unit: Unit) -> Result<i64, DurationError> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DurationError::InvalidField {
            unit,
            field: field.to_string(),
        });
    }
    field.parse().map_err(|_| DurationError::Overflow)
}

/// Whole-second breakdown of a duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Components {
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

impl Components {
    pub fn from_millis(millis: Millis) -> Self {
        let total = millis / 1000;
        Self {
            days: total / 86_400,
            hours: total / 3_600 % 24,
            minutes: total / 60 % 60,
            seconds: total % 60,
        }
    }
}

impl fmt::Display for Components {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{:02}:{:02}:{:02}",
            self.days, self.hours, self.minutes, self.seconds
        )
    }
}

/// Formats milliseconds as `D:HH:MM:SS`, dropping anything below a second.
pub fn format_duration(millis: Millis) -> String {
    Components::from_millis(millis).to_string()
}
