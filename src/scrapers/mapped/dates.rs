//! Date post-processing.
//!
//! Scraper definitions write date formats as reference layouts built from the
//! instant `Mon Jan 2 15:04:05 MST 2006` (`January 2, 2006`, `02/01/06`, ...).
//! They are translated to chrono strftime items before parsing.

use chrono::format::{self, Parsed, StrftimeItems};
use chrono::{DateTime, Duration, Local, NaiveDate};

/// Output format of every date-producing action.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Layout tokens, longest first where they share a prefix.
const LAYOUT_TOKENS: &[(&str, &str, Component)] = &[
    ("January", "%B", Component::Month),
    ("Monday", "%A", Component::None),
    ("2006", "%Y", Component::Year),
    ("Jan", "%b", Component::Month),
    ("Mon", "%a", Component::None),
    ("MST", "%Z", Component::None),
    ("002", "%j", Component::Ordinal),
    ("_2", "%e", Component::Day),
    ("-07:00", "%:z", Component::None),
    ("-0700", "%z", Component::None),
    ("Z07:00", "%:z", Component::None),
    ("Z0700", "%z", Component::None),
    ("15", "%H", Component::None),
    ("01", "%m", Component::Month),
    ("02", "%d", Component::Day),
    ("03", "%I", Component::None),
    ("04", "%M", Component::None),
    ("05", "%S", Component::None),
    ("06", "%y", Component::Year),
    ("PM", "%p", Component::None),
    ("pm", "%P", Component::None),
    ("1", "%m", Component::Month),
    ("2", "%d", Component::Day),
    ("3", "%I", Component::None),
    ("4", "%M", Component::None),
    ("5", "%S", Component::None),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Component {
    None,
    Year,
    Month,
    Day,
    Ordinal,
}

/// A reference layout translated to a strftime string.
#[derive(Debug, Default, PartialEq, Eq)]
struct Layout {
    strftime: String,
    has_year: bool,
    has_month: bool,
    has_day: bool,
    has_ordinal: bool,
}

fn translate_layout(layout: &str) -> Layout {
    let mut out = Layout::default();
    let mut rest = layout;

    'scan: while !rest.is_empty() {
        for (token, item, component) in LAYOUT_TOKENS {
            if let Some(tail) = rest.strip_prefix(token) {
                out.strftime.push_str(item);
                match component {
                    Component::Year => out.has_year = true,
                    Component::Month => out.has_month = true,
                    Component::Day => out.has_day = true,
                    Component::Ordinal => out.has_ordinal = true,
                    Component::None => {}
                }
                rest = tail;
                continue 'scan;
            }
        }

        // fractional seconds: ".000" or ".999"
        if let Some(tail) = rest.strip_prefix('.') {
            let digits = tail.chars().take_while(|c| *c == '0' || *c == '9').count();
            if digits > 0 && !tail[digits..].starts_with(|c: char| c.is_ascii_digit()) {
                out.strftime.push_str("%.f");
                rest = &tail[digits..];
                continue;
            }
        }

        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            if c == '%' {
                out.strftime.push_str("%%");
            } else {
                out.strftime.push(c);
            }
        }
        rest = chars.as_str();
    }

    out
}

fn parse_with_layout(layout: &str, value: &str) -> Result<NaiveDate, String> {
    let layout = translate_layout(layout);
    let mut parsed = Parsed::new();
    format::parse(&mut parsed, value.trim(), StrftimeItems::new(&layout.strftime))
        .map_err(|e| e.to_string())?;

    // unset components default the way the reference layouts do
    if !layout.has_year {
        let _ = parsed.set_year(0);
    }
    if !layout.has_ordinal {
        if !layout.has_month {
            let _ = parsed.set_month(1);
        }
        if !layout.has_day {
            let _ = parsed.set_day(1);
        }
    }

    parsed.to_naive_date().map_err(|e| e.to_string())
}

/// Normalise `value` to `YYYY-MM-DD` using `layout`.
///
/// `today` and `yesterday` are recognised regardless of layout, `unix` parses
/// a seconds timestamp, and an empty layout returns the value unchanged. Any
/// parse failure returns the original value.
pub fn parse_date(layout: &str, value: &str, today: NaiveDate) -> String {
    match value.to_lowercase().as_str() {
        "today" => return today.format(DATE_FORMAT).to_string(),
        "yesterday" => return (today - Duration::days(1)).format(DATE_FORMAT).to_string(),
        _ => {}
    }

    if layout.is_empty() {
        return value.to_string();
    }

    if layout == "unix" {
        let Ok(secs) = value.trim().parse::<i64>() else {
            tracing::warn!("Error parsing date string '{}' using unix timestamp format", value);
            return value.to_string();
        };
        return match DateTime::from_timestamp(secs, 0) {
            Some(dt) => dt.with_timezone(&Local).format(DATE_FORMAT).to_string(),
            None => value.to_string(),
        };
    }

    match parse_with_layout(layout, value) {
        Ok(date) => date.format(DATE_FORMAT).to_string(),
        Err(e) => {
            tracing::warn!(
                "Error parsing date string '{}' using format '{}': {}",
                value,
                layout,
                e
            );
            value.to_string()
        }
    }
}

/// Interpret `value` as a number of days before `today`.
pub fn subtract_days(value: &str, today: NaiveDate) -> String {
    match value.trim().parse::<i64>() {
        Ok(days) => (today - Duration::days(days)).format(DATE_FORMAT).to_string(),
        Err(e) => {
            tracing::warn!("Error parsing day string {}: {}", value, e);
            value.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    #[test]
    fn test_translate_layout() {
        assert_eq!(translate_layout("January 2, 2006").strftime, "%B %d, %Y");
        assert_eq!(translate_layout("02/01/06").strftime, "%d/%m/%y");
        assert_eq!(translate_layout("2006-01-02T15:04:05.000Z07:00").strftime, "%Y-%m-%dT%H:%M:%S%.f%:z");
        assert_eq!(translate_layout("Jan _2 2006 100%").strftime, "%b %e %Y %m00%%");
    }

    #[test]
    fn test_parse_long_month() {
        assert_eq!(parse_date("January 2, 2006", "March 7, 2021", today()), "2021-03-07");
    }

    #[test]
    fn test_parse_short_numeric() {
        assert_eq!(parse_date("02.01.2006", "24.12.2019", today()), "2019-12-24");
        assert_eq!(parse_date("1/2/06", "7/4/99", today()), "1999-07-04");
    }

    #[test]
    fn test_parse_missing_day_defaults_to_first() {
        assert_eq!(parse_date("Jan 2006", "Feb 2020", today()), "2020-02-01");
    }

    #[test]
    fn test_parse_failure_returns_value() {
        assert_eq!(parse_date("2006-01-02", "not a date", today()), "not a date");
    }

    #[test]
    fn test_relative_words() {
        assert_eq!(parse_date("2006-01-02", "Today", today()), "2024-03-15");
        assert_eq!(parse_date("", "yesterday", today()), "2024-03-14");
    }

    #[test]
    fn test_empty_layout_passes_through() {
        assert_eq!(parse_date("", "some text", today()), "some text");
    }

    #[test]
    fn test_unix_timestamp() {
        let out = parse_date("unix", "1700000000", today());
        assert!(out == "2023-11-14" || out == "2023-11-15");
        assert_eq!(parse_date("unix", "abc", today()), "abc");
    }

    #[test]
    fn test_subtract_days() {
        assert_eq!(subtract_days("5", today()), "2024-03-10");
        assert_eq!(subtract_days("five", today()), "five");
    }
}
