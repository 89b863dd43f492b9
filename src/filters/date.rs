//! Date filters: relative time and moment-style formatting

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::HashMap;

use super::{Filter, Safety};
use crate::template::{Result, Value};

lazy_static! {
    static ref MOMENT_TOKEN_RE: Regex = Regex::new(
        r"YYYY|YY|MMMM|MMM|MM|M|DDDD|DD|D|dddd|ddd|HH|H|hh|h|mm|m|ss|s|SSS|ZZ|A|a"
    )
    .unwrap();
}

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;
const WEEK: i64 = 7 * DAY;
const MONTH: i64 = 30 * DAY;
const YEAR: i64 = 365 * DAY;

const CHUNKS: [(i64, &str); 6] = [
    (YEAR, "year"),
    (MONTH, "month"),
    (WEEK, "week"),
    (DAY, "day"),
    (HOUR, "hour"),
    (MINUTE, "minute"),
];

pub(super) fn register(filters: &mut HashMap<String, Filter>) {
    filters.insert(
        "timeSince".into(),
        Filter::raw(Safety::Always, |v, arg| {
            Ok(relative(v, arg, |date, now| time_since(date, now)))
        }),
    );
    filters.insert(
        "timeUntil".into(),
        Filter::raw(Safety::Always, |v, arg| {
            Ok(relative(v, arg, |date, now| time_until(date, now)))
        }),
    );
    filters.insert("date".into(), Filter::raw(Safety::IfArg, format_date));
}

fn relative<F>(value: &Value, arg: Option<&Value>, f: F) -> Value
where
    F: Fn(&DateTime<FixedOffset>, &DateTime<FixedOffset>) -> String,
{
    let Some(date) = to_datetime(value) else {
        return Value::String(String::new());
    };
    let now = arg
        .and_then(to_datetime)
        .unwrap_or_else(|| Utc::now().fixed_offset());
    Value::String(f(&date, &now))
}

/// Coerce a value to a date: dates, RFC 3339 / common date strings, or
/// millisecond timestamps
pub(crate) fn to_datetime(value: &Value) -> Option<DateTime<FixedOffset>> {
    match value {
        Value::Date(d) => Some(*d),
        Value::Number(ms) => Utc
            .timestamp_millis_opt(*ms as i64)
            .single()
            .map(|d| d.fixed_offset()),
        Value::String(s) | Value::Markup(s) => parse_date(s),
        _ => None,
    }
}

fn parse_date(s: &str) -> Option<DateTime<FixedOffset>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }

    let formats = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];
    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&dt).fixed_offset());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt).fixed_offset())
}

/// Time elapsed from `date` to `now`, e.g. `"4 days, 6 hours"`
pub fn time_since(date: &DateTime<FixedOffset>, now: &DateTime<FixedOffset>) -> String {
    let seconds = now.signed_duration_since(*date).num_seconds();
    if seconds < MINUTE {
        return "0 minutes".to_string();
    }

    for (i, (unit_secs, name)) in CHUNKS.iter().enumerate() {
        let count = seconds / unit_secs;
        if count == 0 {
            continue;
        }
        let mut out = plural(count, name);
        if let Some((next_secs, next_name)) = CHUNKS.get(i + 1) {
            let rest = (seconds - count * unit_secs) / next_secs;
            if rest > 0 {
                out.push_str(", ");
                out.push_str(&plural(rest, next_name));
            }
        }
        return out;
    }
    "0 minutes".to_string()
}

/// Time remaining from `now` until `date`
pub fn time_until(date: &DateTime<FixedOffset>, now: &DateTime<FixedOffset>) -> String {
    time_since(now, date)
}

fn plural(count: i64, name: &str) -> String {
    if count == 1 {
        format!("1 {}", name)
    } else {
        format!("{} {}s", count, name)
    }
}

fn format_date(value: &Value, arg: Option<&Value>) -> Result<Value> {
    let Some(date) = to_datetime(value) else {
        return Ok(Value::String(String::new()));
    };
    let format = arg
        .map(|a| a.to_output_string())
        .unwrap_or_else(|| "YYYY-MM-DD".into());
    Ok(Value::String(date.format(&moment_to_chrono_format(&format)).to_string()))
}

/// Convert Moment.js format to chrono format
fn moment_to_chrono_format(format: &str) -> String {
    let escaped = format.replace('%', "%%");
    MOMENT_TOKEN_RE
        .replace_all(&escaped, |caps: &Captures| {
            let spec = match &caps[0] {
                "YYYY" => "%Y",
                "YY" => "%y",
                "MMMM" => "%B",
                "MMM" => "%b",
                "MM" => "%m",
                "M" => "%-m",
                "DDDD" => "%j",
                "DD" => "%d",
                "D" => "%-d",
                "dddd" => "%A",
                "ddd" => "%a",
                "HH" => "%H",
                "H" => "%-H",
                "hh" => "%I",
                "h" => "%-I",
                "mm" => "%M",
                "m" => "%-M",
                "ss" => "%S",
                "s" => "%-S",
                "SSS" => "%3f",
                "ZZ" => "%z",
                "A" => "%p",
                _ => "%P",
            };
            spec.to_string()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    #[test]
    fn test_time_since() {
        let now = at("2024-01-15T12:00:00Z");
        assert_eq!(time_since(&at("2024-01-15T11:59:30Z"), &now), "0 minutes");
        assert_eq!(time_since(&at("2024-01-15T11:00:00Z"), &now), "1 hour");
        assert_eq!(
            time_since(&at("2024-01-11T06:00:00Z"), &now),
            "4 days, 6 hours"
        );
        assert_eq!(time_since(&at("2024-01-01T12:00:00Z"), &now), "2 weeks");
        assert_eq!(time_since(&now, &at("2024-01-01T00:00:00Z")), "0 minutes");
    }

    #[test]
    fn test_time_until() {
        let now = at("2024-01-15T12:00:00Z");
        assert_eq!(time_until(&at("2024-01-15T12:30:00Z"), &now), "30 minutes");
    }

    #[test]
    fn test_relative_filter_with_string_dates() {
        let out = relative(
            &Value::from("2024-01-14"),
            Some(&Value::from("2024-01-15T00:00:00Z")),
            |d, n| time_since(d, n),
        );
        assert_eq!(out.to_output_string(), "1 day");
    }

    #[test]
    fn test_moment_to_chrono() {
        assert_eq!(moment_to_chrono_format("YYYY-MM-DD"), "%Y-%m-%d");
        assert_eq!(moment_to_chrono_format("HH:mm:ss"), "%H:%M:%S");
        assert_eq!(moment_to_chrono_format("MMmm 100%"), "%m%M 100%%");
    }

    #[test]
    fn test_format_date() {
        let out = format_date(
            &Value::from("2024-01-05T10:30:00Z"),
            Some(&Value::from("MMMM D, YYYY")),
        )
        .unwrap();
        assert_eq!(out.to_output_string(), "January 5, 2024");
    }
}
