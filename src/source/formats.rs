//! Number-format handling for spreadsheet cells.
//!
//! Spreadsheets store dates as serial numbers and only the cell's number
//! format tells them apart from plain numbers. This module detects date
//! formats, converts serials to `chrono` values and maps the native format
//! code of a cell to the strftime pattern used for its text.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Pattern used for date cells whose format code has no table entry.
pub const DEFAULT_DATE_PATTERN: &str = "%Y.%m.%d.";

static BRACKETS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]").expect("valid regex"));

static LITERALS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""[^"]*"|\\.|_.|\*."#).expect("valid regex"));

static ELAPSED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(h{1,2}|m{1,2}|s{1,2})$").expect("valid regex"));

/// Removes quoted text, escapes, padding directives and bracketed
/// modifiers (colors, locales) from the first section of a format code.
/// Elapsed-time brackets such as `[h]` keep their letter.
fn strip_format(code: &str) -> String {
    let section = code.split(';').next().unwrap_or_default();
    let without_literals = LITERALS.replace_all(section, "");
    BRACKETS
        .replace_all(&without_literals, |caps: &Captures<'_>| {
            let inner = caps.get(1).map_or("", |m| m.as_str());
            if ELAPSED.is_match(inner) {
                inner.to_owned()
            } else {
                String::new()
            }
        })
        .into_owned()
}

/// Whether an Excel number format code renders its value as a date or time.
pub fn is_date_format(code: &str) -> bool {
    strip_format(code)
        .chars()
        .any(|c| matches!(c.to_ascii_lowercase(), 'd' | 'm' | 'h' | 'y' | 's'))
}

/// Whether a date format shows only a time of day.
fn is_time_only_format(code: &str) -> bool {
    !strip_format(code)
        .chars()
        .any(|c| matches!(c.to_ascii_lowercase(), 'd' | 'y'))
}

/// Format codes for the built-in number format ids a workbook may reference
/// without declaring them.
pub fn builtin_format(id: u32) -> Option<&'static str> {
    Some(match id {
        0 => "General",
        1 => "0",
        2 => "0.00",
        3 => "#,##0",
        4 => "#,##0.00",
        9 => "0%",
        10 => "0.00%",
        11 => "0.00E+00",
        12 => "# ?/?",
        13 => "# ??/??",
        14 => "mm-dd-yy",
        15 => "d-mmm-yy",
        16 => "d-mmm",
        17 => "mmm-yy",
        18 => "h:mm AM/PM",
        19 => "h:mm:ss AM/PM",
        20 => "h:mm",
        21 => "h:mm:ss",
        22 => "m/d/yy h:mm",
        37 => "#,##0 ;(#,##0)",
        38 => "#,##0 ;[Red](#,##0)",
        39 => "#,##0.00;(#,##0.00)",
        40 => "#,##0.00;[Red](#,##0.00)",
        45 => "mm:ss",
        46 => "[h]:mm:ss",
        47 => "mmss.0",
        48 => "##0.0E+0",
        49 => "@",
        _ => return None,
    })
}

/// Converts a spreadsheet serial number to a date-time.
///
/// In the 1900 system serials below 60 precede the nonexistent 1900-02-29
/// and are shifted by one day.
pub fn serial_to_datetime(serial: f64, date1904: bool) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let epoch = if date1904 {
        NaiveDate::from_ymd_opt(1904, 1, 1)?
    } else if serial < 60.0 {
        NaiveDate::from_ymd_opt(1899, 12, 31)?
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)?
    };
    let millis = (serial * 86_400_000.0).round();
    if millis > i64::MAX as f64 {
        return None;
    }
    epoch
        .and_time(NaiveTime::MIN)
        .checked_add_signed(TimeDelta::milliseconds(millis as i64))
}

/// Parses the ISO 8601 text stored in `t="d"` cells.
pub fn parse_iso_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim().trim_end_matches('Z');
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

/// Lookup from a workbook's native date format code to an output pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateFormatTable {
    entries: BTreeMap<String, String>,
    fallback: String,
}

impl Default for DateFormatTable {
    fn default() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            r#"yyyy"년"\ m"월"\ d"일";@"#.to_owned(),
            "%Y년 %-m월 %-d일".to_owned(),
        );
        entries.insert("yyyy/mm/dd/".to_owned(), "%Y.%m.%d.".to_owned());
        Self {
            entries,
            fallback: DEFAULT_DATE_PATTERN.to_owned(),
        }
    }
}

impl DateFormatTable {
    /// Default table extended (or overridden) by `extra` entries.
    pub fn with_entries(extra: &BTreeMap<String, String>) -> Self {
        let mut table = Self::default();
        for (code, pattern) in extra {
            table.entries.insert(code.clone(), pattern.clone());
        }
        table
    }

    pub fn pattern_for(&self, code: &str) -> &str {
        self.entries.get(code).unwrap_or(&self.fallback)
    }

    /// Renders a date cell. Time-only formats with a sub-day serial render as
    /// a clock time instead of a date.
    pub fn render(&self, code: &str, value: NaiveDateTime) -> String {
        let first_day = NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN);
        if is_time_only_format(code) && value.date() <= first_day {
            return value.format("%H:%M:%S").to_string();
        }
        value.format(self.pattern_for(code)).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_format_detection() {
        assert!(is_date_format("yyyy/mm/dd/"));
        assert!(is_date_format(r#"yyyy"년"\ m"월"\ d"일";@"#));
        assert!(is_date_format("mm-dd-yy"));
        assert!(is_date_format("[h]:mm:ss"));
        assert!(is_date_format("[$-412]yyyy-mm-dd"));
        assert!(!is_date_format("General"));
        assert!(!is_date_format("#,##0"));
        assert!(!is_date_format("[Red]0.00"));
        assert!(!is_date_format(r#"0" days""#));
        assert!(!is_date_format("@"));
    }

    #[test]
    fn test_serial_conversion() {
        let dt = serial_to_datetime(45_658.0, false).unwrap();
        assert_eq!(dt.date(), NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());

        let noon = serial_to_datetime(45_658.5, false).unwrap();
        assert_eq!(noon.format("%H:%M").to_string(), "12:00");

        let early = serial_to_datetime(1.0, false).unwrap();
        assert_eq!(early.date(), NaiveDate::from_ymd_opt(1900, 1, 1).unwrap());

        let mac = serial_to_datetime(0.0, true).unwrap();
        assert_eq!(mac.date(), NaiveDate::from_ymd_opt(1904, 1, 1).unwrap());

        assert!(serial_to_datetime(f64::NAN, false).is_none());
    }

    #[test]
    fn test_table_lookup_and_fallback() {
        let table = DateFormatTable::default();
        let dt = NaiveDate::from_ymd_opt(2025, 3, 7)
            .unwrap()
            .and_time(NaiveTime::MIN);

        assert_eq!(
            table.render(r#"yyyy"년"\ m"월"\ d"일";@"#, dt),
            "2025년 3월 7일"
        );
        assert_eq!(table.render("yyyy/mm/dd/", dt), "2025.03.07.");
        assert_eq!(table.render("mm-dd-yy", dt), "2025.03.07.");
    }

    #[test]
    fn test_table_extension() {
        let mut extra = BTreeMap::new();
        extra.insert("mm-dd-yy".to_owned(), "%m/%d/%Y".to_owned());
        let table = DateFormatTable::with_entries(&extra);
        assert_eq!(table.pattern_for("mm-dd-yy"), "%m/%d/%Y");
        assert_eq!(table.pattern_for("yyyy/mm/dd/"), "%Y.%m.%d.");
    }

    #[test]
    fn test_time_only_render() {
        let table = DateFormatTable::default();
        let dt = serial_to_datetime(0.75, false).unwrap();
        assert_eq!(table.render("h:mm", dt), "18:00:00");
    }

    #[test]
    fn test_parse_iso() {
        let dt = parse_iso_datetime("2024-02-29T08:30:00").unwrap();
        assert_eq!(dt.format("%Y.%m.%d %H:%M").to_string(), "2024.02.29 08:30");
        assert!(parse_iso_datetime("2024-02-29").is_some());
        assert!(parse_iso_datetime("yesterday").is_none());
    }
}
