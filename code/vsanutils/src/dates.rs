use anyhow::{Context, Result};
use chrono::prelude::DateTime;
use chrono::{Duration, NaiveDateTime, TimeZone, Utc};

pub type Timestamp = DateTime<Utc>;

pub const LATENCY_WIDTH: usize = 24;

pub fn parse_trace_timestamp(date: &str, time: &str) -> Result<Timestamp> {
    let text = format!("{date} {time}");
    let naive = NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f")
        .with_context(|| format!("Invalid trace timestamp {text}"))?;
    Ok(Utc.from_utc_datetime(&naive))
}

pub fn format_trace_timestamp(t: Timestamp) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// Leading units that are zero are omitted (hours, minutes, seconds, milliseconds) but the
/// microseconds are always there, zero-padded to three digits.  The other units are not padded.
/// Hours are not folded into days.

pub fn format_latency(d: Duration) -> String {
    let secs = d.num_seconds();
    let sub_us = (d - Duration::seconds(secs)).num_microseconds().unwrap_or(0);
    let hours = secs / 3600;
    let minutes = (secs / 60) % 60;
    let seconds = secs % 60;
    let millis = sub_us / 1000;
    let micros = sub_us % 1000;

    let mut s = format!("{micros:03}us");
    if millis != 0 {
        s = format!("{millis}ms {s}");
    }
    if seconds != 0 {
        s = format!("{seconds}s {s}");
    }
    if minutes != 0 {
        s = format!("{minutes}min {s}");
    }
    if hours != 0 {
        s = format!("{hours}h {s}");
    }
    format!("{:>w$}", s, w = LATENCY_WIDTH)
}

#[test]
fn test_parse_trace_timestamp() {
    let t = parse_trace_timestamp("2019-05-06", "10:11:12.000908").unwrap();
    assert!(format_trace_timestamp(t) == "2019-05-06T10:11:12.000908");
    assert!(parse_trace_timestamp("2019-05-06", "10:11").is_err());
    assert!(parse_trace_timestamp("2019-13-06", "10:11:12.000000").is_err());
}

#[test]
fn test_format_latency_micros_only() {
    let s = format_latency(Duration::microseconds(908));
    assert_eq!(s.len(), 24);
    assert!(s.ends_with("908us"));
    assert_eq!(s.trim_start(), "908us");
}

#[test]
fn test_format_latency_minutes() {
    let d = Duration::minutes(1) + Duration::seconds(2) + Duration::milliseconds(500);
    let s = format_latency(d);
    assert_eq!(s.len(), 24);
    assert_eq!(s.trim_start(), "1min 2s 500ms 000us");
}

#[test]
fn test_format_latency_inner_zero_units() {
    // An inner zero unit is still omitted, it is not only leading zeroes that go away.
    let d = Duration::hours(2) + Duration::microseconds(5);
    assert_eq!(format_latency(d).trim_start(), "2h 005us");

    let d = Duration::seconds(10) + Duration::milliseconds(50);
    assert_eq!(format_latency(d).trim_start(), "10s 50ms 000us");

    assert_eq!(format_latency(Duration::zero()).trim_start(), "000us");
}
