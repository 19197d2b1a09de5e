//! Date parsing and formatting for front matter and templates.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Parse `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` or RFC 3339 into a calendar date.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.date());
    }
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive())
}

/// English month name for `1..=12`.
pub fn month_name(month: u32) -> Option<&'static str> {
    MONTH_NAMES.get(month.checked_sub(1)? as usize).copied()
}

/// Long form, e.g. `October 10, 2008`.
pub fn long_date(date: NaiveDate) -> String {
    let month = month_name(date.month()).unwrap_or_default();
    format!("{month} {}, {}", date.day(), date.year())
}

/// RFC 822 timestamp at midnight UTC, as used by RSS.
pub fn rfc822(date: NaiveDate) -> String {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().format("%a, %d %b %Y %H:%M:%S %z").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("2008-10-10"), Some(ymd(2008, 10, 10)));
        assert_eq!(parse_date("2008-10-10 12:30:00"), Some(ymd(2008, 10, 10)));
        assert_eq!(parse_date("2008-10-10T12:30:00Z"), Some(ymd(2008, 10, 10)));
        assert_eq!(parse_date(" 2008-10-10 "), Some(ymd(2008, 10, 10)));
    }

    #[test]
    fn test_parse_date_invalid() {
        assert_eq!(parse_date("2008-13-01"), None);
        assert_eq!(parse_date("yesterday"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn test_month_name() {
        assert_eq!(month_name(1), Some("January"));
        assert_eq!(month_name(12), Some("December"));
        assert_eq!(month_name(0), None);
        assert_eq!(month_name(13), None);
    }

    #[test]
    fn test_long_date() {
        assert_eq!(long_date(ymd(2008, 10, 10)), "October 10, 2008");
    }

    #[test]
    fn test_rfc822() {
        assert_eq!(rfc822(ymd(2008, 10, 10)), "Fri, 10 Oct 2008 00:00:00 +0000");
    }
}
