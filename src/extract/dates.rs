use std::sync::LazyLock;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;

static RELATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\d+)\s*(m|mins?|minutes?|h|hrs?|hours?|d|days?)\s+ago$")
        .expect("valid relative time regex")
});

const DATE_FORMATS: &[&str] = &["%B %d, %Y", "%b %d, %Y", "%Y-%m-%d", "%m/%d/%Y"];
const TIME_FORMATS: &[&str] = &["%I:%M %p", "%H:%M"];

/// Parses the timestamps the site prints on cards and bylines, e.g.
/// `April 03, 2023 — 09:28 pm EDT`, `Apr 3, 2023` or `5 hours ago`.
///
/// Relative forms are resolved against `now`. The timezone suffix is ignored.
pub fn parse_site_timestamp(text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(caps) = RELATIVE.captures(text) {
        let amount: i64 = caps[1].parse().ok()?;
        let unit = caps[2].to_ascii_lowercase();
        let delta = match unit.chars().next()? {
            'm' => Duration::minutes(amount),
            'h' => Duration::hours(amount),
            _ => Duration::days(amount),
        };
        return now.checked_sub_signed(delta);
    }

    let (date_part, time_part) = match text.split_once('—') {
        Some((date, time)) => (date.trim(), Some(time.trim())),
        None => (text, None),
    };

    let date = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())?;
    let time = time_part.and_then(parse_time).unwrap_or(NaiveTime::MIN);
    Some(date.and_time(time))
}

fn parse_time(text: &str) -> Option<NaiveTime> {
    // "09:28 pm EDT" -> "09:28 pm"
    let without_zone = match text.rsplit_once(' ') {
        Some((head, zone)) if zone.chars().all(|c| c.is_ascii_alphabetic()) && zone.len() >= 3 => head,
        _ => text,
    };
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(without_zone.trim(), fmt).ok())
}
