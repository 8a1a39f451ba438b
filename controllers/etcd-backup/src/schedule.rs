//! Backup schedules.
//!
//! Schedules are written as classic five-field cron expressions
//! (`minute hour day-of-month month day-of-week`, Sunday = 0), as one of the
//! `@daily`-style descriptors, or as `@every <duration>` with a Go-style
//! duration such as `10m` or `1h30m`.

use chrono::{DateTime, Duration, Timelike, Utc};
use std::panic;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("schedule must be a non-empty valid cron expression")]
    Empty,

    #[error("invalid schedule: {0}")]
    Invalid(String),

    #[error("(panic) invalid schedule: {0}")]
    Panic(String),
}

/// A parsed backup schedule.
#[derive(Debug, Clone)]
pub enum Schedule {
    Cron(cron::Schedule),
    /// Fixed interval, whole seconds, at least one second.
    Every(Duration),
}

impl Schedule {
    pub fn parse(expression: &str) -> Result<Self, ScheduleError> {
        let expression = expression.trim();
        if expression.is_empty() {
            return Err(ScheduleError::Empty);
        }

        if let Some(interval) = expression.strip_prefix("@every ") {
            let interval = parse_go_duration(interval.trim()).ok_or_else(|| {
                ScheduleError::Invalid(format!("failed to parse duration {expression}"))
            })?;
            let seconds = interval.num_seconds().max(1);
            return Ok(Self::Every(Duration::seconds(seconds)));
        }

        let six_fields = to_six_fields(expression)?;
        match panic::catch_unwind(|| cron::Schedule::from_str(&six_fields)) {
            Ok(Ok(schedule)) => Ok(Self::Cron(schedule)),
            Ok(Err(e)) => Err(ScheduleError::Invalid(e.to_string())),
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<String>()
                    .cloned()
                    .or_else(|| payload.downcast_ref::<&str>().map(ToString::to_string))
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(ScheduleError::Panic(reason))
            }
        }
    }

    /// First activation strictly after `time`.
    pub fn next_after(&self, time: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Cron(schedule) => schedule.after(&time).next(),
            Self::Every(interval) => {
                let truncated = time.with_nanosecond(0)?;
                truncated.checked_add_signed(*interval)
            }
        }
    }
}

/// Translates a descriptor or five-field expression into the
/// `sec min hour dom month dow` form understood by the cron parser.
fn to_six_fields(expression: &str) -> Result<String, ScheduleError> {
    let descriptor = match expression {
        "@yearly" | "@annually" => Some("0 0 0 1 1 *"),
        "@monthly" => Some("0 0 0 1 * *"),
        "@weekly" => Some("0 0 0 * * 1"),
        "@daily" | "@midnight" => Some("0 0 0 * * *"),
        "@hourly" => Some("0 0 * * * *"),
        _ => None,
    };
    if let Some(descriptor) = descriptor {
        return Ok(descriptor.to_string());
    }
    if expression.starts_with('@') {
        return Err(ScheduleError::Invalid(format!(
            "unrecognized descriptor: {expression}"
        )));
    }

    let fields: Vec<&str> = expression.split_whitespace().collect();
    let [minute, hour, day_of_month, month, day_of_week] = fields.as_slice() else {
        return Err(ScheduleError::Invalid(format!(
            "expected exactly 5 fields, found {}: {expression}",
            fields.len()
        )));
    };

    Ok(format!(
        "0 {minute} {hour} {day_of_month} {month} {}",
        shift_day_of_week(day_of_week)
    ))
}

/// Classic cron counts weekdays from Sunday = 0, the parser from Sunday = 1.
/// Step values after `/` are counts and stay as they are.
fn shift_day_of_week(field: &str) -> String {
    field
        .split(',')
        .map(|item| {
            let (range, step) = match item.split_once('/') {
                Some((range, step)) => (range, Some(step)),
                None => (item, None),
            };
            let range = range
                .split('-')
                .map(|bound| match bound.parse::<u32>() {
                    Ok(day) => (day + 1).to_string(),
                    Err(_) => bound.to_string(),
                })
                .collect::<Vec<_>>()
                .join("-");
            match step {
                Some(step) => format!("{range}/{step}"),
                None => range,
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Parses durations like `300ms`, `1.5h` or `2h45m`.
fn parse_go_duration(input: &str) -> Option<Duration> {
    const UNITS: [(&str, u128); 8] = [
        ("ns", 1),
        ("us", 1_000),
        ("µs", 1_000),
        ("μs", 1_000),
        ("ms", 1_000_000),
        ("s", 1_000_000_000),
        ("m", 60_000_000_000),
        ("h", 3_600_000_000_000),
    ];

    if input.is_empty() {
        return None;
    }
    if input == "0" {
        return Some(Duration::zero());
    }

    let mut rest = input;
    let mut total: u128 = 0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_len);
        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        if whole.is_empty() && fraction.is_empty() {
            return None;
        }

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let (_, scale) = UNITS.iter().find(|(name, _)| *name == unit)?;

        let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
        let mut value = whole.checked_mul(*scale)?;
        if !fraction.is_empty() {
            let digits: u128 = fraction.parse().ok()?;
            let divisor = 10u128.checked_pow(u32::try_from(fraction.len()).ok()?)?;
            value = value.checked_add(digits.checked_mul(*scale)? / divisor)?;
        }

        total = total.checked_add(value)?;
        rest = tail;
    }

    let nanos = i64::try_from(total).ok()?;
    Some(Duration::nanoseconds(nanos))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(seconds, 0).unwrap()
    }

    #[test]
    fn test_five_field_expression_runs_on_the_minute() {
        let schedule = Schedule::parse("*/10 * * * *").unwrap();
        assert_eq!(schedule.next_after(at(60)), Some(at(600)));
        assert_eq!(schedule.next_after(at(600)), Some(at(1200)));
    }

    #[test]
    fn test_every_counts_from_the_last_activation() {
        let schedule = Schedule::parse("@every 10m").unwrap();
        assert_eq!(schedule.next_after(at(60)), Some(at(660)));

        let schedule = Schedule::parse("@every 120h").unwrap();
        assert_eq!(schedule.next_after(at(0)), Some(at(3600 * 120)));
    }

    #[test]
    fn test_every_is_at_least_one_second() {
        let schedule = Schedule::parse("@every 300ms").unwrap();
        assert_eq!(schedule.next_after(at(5)), Some(at(6)));
    }

    #[test]
    fn test_sunday_is_day_zero() {
        // 1970-01-04 was a Sunday
        let schedule = Schedule::parse("0 0 * * 0").unwrap();
        assert_eq!(schedule.next_after(at(0)), Some(at(3 * 86_400)));
        assert_eq!(shift_day_of_week("1-5,0/2"), "2-6,1/2");
        assert_eq!(shift_day_of_week("MON-FRI"), "MON-FRI");
    }

    #[test]
    fn test_descriptors() {
        let schedule = Schedule::parse("@daily").unwrap();
        assert_eq!(schedule.next_after(at(60)), Some(at(86_400)));
        assert!(Schedule::parse("@fortnightly").is_err());
    }

    #[test]
    fn test_invalid_schedules_are_errors() {
        assert_eq!(Schedule::parse("  ").unwrap_err(), ScheduleError::Empty);
        assert!(matches!(
            Schedule::parse("* * * *"),
            Err(ScheduleError::Invalid(_))
        ));
        assert!(matches!(
            Schedule::parse("61 * * * *"),
            Err(ScheduleError::Invalid(_))
        ));
        assert!(Schedule::parse("@every soon").is_err());
    }

    #[test]
    fn test_go_durations() {
        assert_eq!(parse_go_duration("1h30m"), Some(Duration::minutes(90)));
        assert_eq!(parse_go_duration("1.5h"), Some(Duration::minutes(90)));
        assert_eq!(parse_go_duration("250ms"), Some(Duration::milliseconds(250)));
        assert_eq!(parse_go_duration("10"), None);
        assert_eq!(parse_go_duration("h"), None);
    }
}
