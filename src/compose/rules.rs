//! Field composition rules as written in the run configuration.
//!
//! A mapping entry is either a bare column name or a rule object:
//!
//! ```json
//! {
//!   "성명": "성명",
//!   "발주처": { "rule": "fixed", "value": "김응태" },
//!   "주소": { "rule": "concat", "columns": ["시", "구"], "separator": " " },
//!   "성명_을": { "rule": "particle", "columns": ["성명"], "particle": "을/를" }
//! }
//! ```

use super::particle::Particle;
use serde::{Deserialize, Serialize};

/// One entry of `field_mapping`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldSpec {
    /// Shorthand for [`FieldRule::Column`]
    Column(String),
    Rule(FieldRule),
}

impl FieldSpec {
    pub fn into_rule(self) -> FieldRule {
        match self {
            Self::Column(column) => FieldRule::Column { column },
            Self::Rule(rule) => rule,
        }
    }
}

impl From<FieldRule> for FieldSpec {
    fn from(rule: FieldRule) -> Self {
        Self::Rule(rule)
    }
}

/// How a placeholder's value is built from a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum FieldRule {
    /// The row's value for one column; empty cells become `""`
    Column { column: String },

    /// The same literal for every row
    Fixed { value: String },

    /// Column values joined in the listed order
    Concat {
        columns: Vec<String>,
        #[serde(default = "default_separator")]
        separator: String,
        /// Optional literal placed among the joined values
        #[serde(default, skip_serializing_if = "Option::is_none")]
        literal: Option<Literal>,
    },

    /// One column followed directly by a particle, e.g. `홍길동을`
    Particle {
        /// Must name exactly one column
        columns: Vec<String>,
        particle: Particle,
    },
}

impl FieldRule {
    /// Column names this rule reads.
    pub fn columns(&self) -> &[String] {
        match self {
            Self::Column { column } => std::slice::from_ref(column),
            Self::Fixed { .. } => &[],
            Self::Concat { columns, .. } | Self::Particle { columns, .. } => columns,
        }
    }
}

/// A literal inserted into a concatenation before the value at `position`.
///
/// `position` 0 puts it first; a position past the last column appends it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Literal {
    pub position: usize,
    pub text: String,
}

fn default_separator() -> String {
    " ".to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_mapping_deserializes() {
        let json = r#"{
            "name": "성명",
            "client": { "rule": "fixed", "value": "김응태" },
            "address": { "rule": "concat", "columns": ["시", "구"] },
            "period": {
                "rule": "concat",
                "columns": ["시작일", "종료일"],
                "separator": " ",
                "literal": { "position": 1, "text": "~" }
            },
            "name_obj": { "rule": "particle", "columns": ["성명"], "particle": "을" }
        }"#;
        let mapping: BTreeMap<String, FieldSpec> = serde_json::from_str(json).unwrap();

        assert_eq!(mapping["name"], FieldSpec::Column("성명".to_owned()));
        assert_eq!(
            mapping["client"].clone().into_rule(),
            FieldRule::Fixed {
                value: "김응태".to_owned()
            }
        );
        match mapping["address"].clone().into_rule() {
            FieldRule::Concat {
                separator, literal, ..
            } => {
                assert_eq!(separator, " ");
                assert!(literal.is_none());
            }
            other => panic!("unexpected rule {other:?}"),
        }
        match mapping["period"].clone().into_rule() {
            FieldRule::Concat { literal, .. } => {
                assert_eq!(
                    literal,
                    Some(Literal {
                        position: 1,
                        text: "~".to_owned()
                    })
                );
            }
            other => panic!("unexpected rule {other:?}"),
        }
        match mapping["name_obj"].clone().into_rule() {
            FieldRule::Particle { columns, particle } => {
                assert_eq!(columns, vec!["성명".to_owned()]);
                assert_eq!(particle, Particle::Object);
            }
            other => panic!("unexpected rule {other:?}"),
        }
    }

    #[test]
    fn test_unknown_particle_is_rejected_when_parsing() {
        let json = r#"{ "rule": "particle", "columns": ["성명"], "particle": "???" }"#;
        assert!(serde_json::from_str::<FieldSpec>(json).is_err());
    }

    #[test]
    fn test_columns_lists_references() {
        let rule = FieldSpec::Column("성명".to_owned()).into_rule();
        assert_eq!(rule.columns(), ["성명".to_owned()]);
        let fixed = FieldRule::Fixed {
            value: "x".to_owned(),
        };
        assert!(fixed.columns().is_empty());
    }
}
