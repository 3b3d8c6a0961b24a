//! Column type declarations and the presentation step that applies them.
//!
//! Conversion is best effort: a cell that does not parse as the declared type
//! keeps its original text. Outputs always parse back to the same value, so
//! applying the same declarations twice changes nothing the second time.

use super::dataset::Dataset;
use super::formats::DEFAULT_DATE_PATTERN;
use crate::error::{FormfillError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Input patterns tried after the declared output pattern.
const DATE_INPUT_PATTERNS: &[&str] = &[
    "%Y-%m-%d",
    "%Y.%m.%d.",
    "%Y.%m.%d",
    "%Y/%m/%d",
    "%Y%m%d",
    "%Y년 %m월 %d일",
];

const DATETIME_INPUT_PATTERNS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Presentation of numeric columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NumericFormat {
    /// `1,234,567`
    #[default]
    Thousands,
    /// `1234567`
    Integer,
    /// `1234.50`
    Fixed2,
    /// `1234.5`
    Trimmed,
}

/// Declared type of one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColumnType {
    Text,
    Numeric {
        #[serde(default)]
        format: NumericFormat,
    },
    Date {
        /// strftime pattern of the rendered date
        #[serde(default = "default_date_pattern")]
        pattern: String,
    },
}

fn default_date_pattern() -> String {
    DEFAULT_DATE_PATTERN.to_owned()
}

impl ColumnType {
    /// Converts one cell; values that do not parse are returned unchanged.
    pub fn convert(&self, text: &str) -> String {
        match self {
            Self::Text => text.to_owned(),
            Self::Numeric { format } => {
                parse_number(text).map_or_else(|| text.to_owned(), |n| format_number(n, *format))
            }
            Self::Date { pattern } => parse_date(text, pattern)
                .map_or_else(|| text.to_owned(), |dt| dt.format(pattern).to_string()),
        }
    }
}

/// Returns a copy of `dataset` with every declared column converted.
///
/// # Errors
///
/// [`FormfillError::Configuration`] when a declaration names a column the
/// dataset does not have.
pub fn apply_column_types(
    dataset: &Dataset,
    declarations: &BTreeMap<String, ColumnType>,
) -> Result<Dataset> {
    let mut typed = dataset.clone();
    for (column, column_type) in declarations {
        let index = dataset.column_index(column).ok_or_else(|| {
            FormfillError::Configuration(format!(
                "column type declared for unknown column '{column}'"
            ))
        })?;
        if *column_type == ColumnType::Text {
            continue;
        }
        typed = typed.map_column(index, |text| column_type.convert(text));
    }
    Ok(typed)
}

fn parse_number(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

/// Integer formats truncate toward zero.
fn format_number(n: f64, format: NumericFormat) -> String {
    match format {
        NumericFormat::Thousands => {
            let whole = n.trunc();
            let sign = if whole < 0.0 { "-" } else { "" };
            format!("{sign}{}", group_thousands(&format!("{:.0}", whole.abs())))
        }
        NumericFormat::Integer => format!("{:.0}", n.trunc()),
        NumericFormat::Fixed2 => format!("{n:.2}"),
        NumericFormat::Trimmed => {
            let fixed = format!("{n:.6}");
            let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
            if trimmed == "-0" {
                "0".to_owned()
            } else {
                trimmed.to_owned()
            }
        }
    }
}

fn parse_date(text: &str, output_pattern: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    std::iter::once(output_pattern)
        .chain(DATE_INPUT_PATTERNS.iter().copied())
        .find_map(|pattern| {
            NaiveDate::parse_from_str(text, pattern)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .or_else(|| {
            std::iter::once(output_pattern)
                .chain(DATETIME_INPUT_PATTERNS.iter().copied())
                .find_map(|pattern| NaiveDateTime::parse_from_str(text, pattern).ok())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dataset() -> Dataset {
        Dataset::new(
            vec!["금액".to_owned(), "계약일".to_owned(), "비고".to_owned()],
            vec![
                (2, vec![Some("30000000".to_owned()), Some("2025-03-07".to_owned()), Some("a".to_owned())]),
                (3, vec![Some("미정".to_owned()), Some("추후".to_owned()), None]),
                (4, vec![Some("-1234.5".to_owned()), None, Some("b".to_owned())]),
            ],
        )
    }

    fn declarations() -> BTreeMap<String, ColumnType> {
        let mut decl = BTreeMap::new();
        decl.insert(
            "금액".to_owned(),
            ColumnType::Numeric {
                format: NumericFormat::Thousands,
            },
        );
        decl.insert(
            "계약일".to_owned(),
            ColumnType::Date {
                pattern: "%Y년 %-m월 %-d일".to_owned(),
            },
        );
        decl.insert("비고".to_owned(), ColumnType::Text);
        decl
    }

    #[test]
    fn test_apply_converts_declared_columns() {
        let typed = apply_column_types(&dataset(), &declarations()).unwrap();
        assert_eq!(typed.rows()[0].cell(0), Some("30,000,000"));
        assert_eq!(typed.rows()[0].cell(1), Some("2025년 3월 7일"));
        assert_eq!(typed.rows()[2].cell(0), Some("-1,234"));
    }

    #[test]
    fn test_unparseable_values_are_kept() {
        let typed = apply_column_types(&dataset(), &declarations()).unwrap();
        assert_eq!(typed.rows()[1].cell(0), Some("미정"));
        assert_eq!(typed.rows()[1].cell(1), Some("추후"));
        assert_eq!(typed.rows()[2].cell(1), None);
    }

    #[test]
    fn test_apply_is_idempotent() {
        let once = apply_column_types(&dataset(), &declarations()).unwrap();
        let twice = apply_column_types(&once, &declarations()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_original_is_untouched() {
        let original = dataset();
        let _typed = apply_column_types(&original, &declarations()).unwrap();
        assert_eq!(original.rows()[0].cell(0), Some("30000000"));
    }

    #[test]
    fn test_unknown_column_is_configuration_error() {
        let mut decl = declarations();
        decl.insert("없는열".to_owned(), ColumnType::Text);
        assert!(matches!(
            apply_column_types(&dataset(), &decl),
            Err(FormfillError::Configuration(_))
        ));
    }

    #[test]
    fn test_numeric_formats() {
        assert_eq!(format_number(1_234_567.891, NumericFormat::Thousands), "1,234,567");
        assert_eq!(format_number(999.0, NumericFormat::Thousands), "999");
        assert_eq!(format_number(1_234_567.891, NumericFormat::Integer), "1234567");
        assert_eq!(format_number(1234.5, NumericFormat::Fixed2), "1234.50");
        assert_eq!(format_number(1234.5, NumericFormat::Trimmed), "1234.5");
        assert_eq!(format_number(1200.0, NumericFormat::Trimmed), "1200");
        assert_eq!(parse_number(" 1,234 "), Some(1234.0));
        assert_eq!(parse_number("12a"), None);
    }

    #[test]
    fn test_column_type_deserializes() {
        let json = r#"{"type": "numeric", "format": "fixed2"}"#;
        let parsed: ColumnType = serde_json::from_str(json).unwrap();
        assert_eq!(
            parsed,
            ColumnType::Numeric {
                format: NumericFormat::Fixed2
            }
        );
        let date: ColumnType = serde_json::from_str(r#"{"type": "date"}"#).unwrap();
        assert_eq!(
            date,
            ColumnType::Date {
                pattern: "%Y.%m.%d.".to_owned()
            }
        );
    }

    fn numeric_format() -> impl Strategy<Value = NumericFormat> {
        prop_oneof![
            Just(NumericFormat::Thousands),
            Just(NumericFormat::Integer),
            Just(NumericFormat::Fixed2),
            Just(NumericFormat::Trimmed),
        ]
    }

    proptest! {
        #[test]
        fn numeric_conversion_is_idempotent(n in -1.0e9_f64..1.0e9, format in numeric_format()) {
            let column = ColumnType::Numeric { format };
            let once = column.convert(&n.to_string());
            prop_assert_eq!(column.convert(&once), once);
        }

        #[test]
        fn non_numeric_text_is_kept(text in "[가-힣a-z ]{1,12}") {
            let column = ColumnType::Numeric { format: NumericFormat::Thousands };
            prop_assert_eq!(column.convert(&text), text);
        }
    }
}
