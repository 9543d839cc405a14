use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use crate::error::{AppError, Result};

const MIN_INTERVAL: Duration = Duration::from_millis(1);

fn duration_regex() -> &'static Regex {
    static PART: OnceLock<Regex> = OnceLock::new();
    PART.get_or_init(|| {
        Regex::new(r"(\d+(?:\.\d*)?|\.\d+)(ns|us|µs|μs|ms|s|m|h)").expect("duration pattern is valid")
    })
}

fn unit_nanos(unit: &str) -> f64 {
    match unit {
        "ns" => 1.0,
        "us" | "µs" | "μs" => 1e3,
        "ms" => 1e6,
        "s" => 1e9,
        "m" => 60.0 * 1e9,
        _ => 3600.0 * 1e9,
    }
}

/// Parses a scrape interval such as `30s`, `1m30s` or `1.5h`. Intervals
/// under one millisecond are rejected.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let invalid = || AppError::Usage(format!("invalid duration '{input}'"));

    let mut nanos = 0f64;
    let mut consumed = 0;
    for caps in duration_regex().captures_iter(input) {
        let whole = caps.get(0).ok_or_else(invalid)?;
        if whole.start() != consumed {
            return Err(invalid());
        }
        consumed = whole.end();

        let value: f64 = caps[1].parse().map_err(|_| invalid())?;
        nanos += value * unit_nanos(&caps[2]);
    }
    if consumed == 0 || consumed != input.len() {
        return Err(invalid());
    }

    if !nanos.is_finite() || nanos >= u64::MAX as f64 {
        return Err(invalid());
    }
    let duration = Duration::from_nanos(nanos.round() as u64);
    if duration < MIN_INTERVAL {
        return Err(AppError::Usage(format!(
            "interval '{input}' is shorter than the 1ms minimum"
        )));
    }
    Ok(duration)
}
