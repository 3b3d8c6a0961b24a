//! Output file names for generated documents.
//!
//! Every file is named `{workflow}_{identity}`. The identity comes from the
//! configured [`NamingStrategy`], falling back from an explicit suffix list to
//! the row's key values and finally to its ordinal.

use crate::session::{sanitize_file_stem, stem_with_suffix};
use crate::source::Row;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum NamingStrategy {
    /// `suffixes[i]` names the i-th dataset row
    Suffixes { suffixes: Vec<String> },

    /// Key column values joined with `separator`
    KeyColumns {
        #[serde(default = "default_separator")]
        separator: String,
    },

    /// The row's 1-based position in the dataset
    Ordinal,
}

impl Default for NamingStrategy {
    fn default() -> Self {
        Self::KeyColumns {
            separator: default_separator(),
        }
    }
}

fn default_separator() -> String {
    "_".to_owned()
}

impl NamingStrategy {
    /// Identity part of the file name for `row`.
    ///
    /// `key_indices` are the dataset positions of the key columns.
    pub fn identity(&self, row: &Row, key_indices: &[usize]) -> String {
        let ordinal = || row.id.ordinal.to_string();
        let keys = |separator: &str| {
            let values: Vec<&str> = key_indices
                .iter()
                .filter_map(|&index| row.cell(index))
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .collect();
            (!values.is_empty()).then(|| values.join(separator))
        };

        match self {
            Self::Suffixes { suffixes } => row
                .id
                .ordinal
                .checked_sub(1)
                .and_then(|index| suffixes.get(index))
                .map(|suffix| suffix.trim())
                .filter(|suffix| !suffix.is_empty())
                .map(str::to_owned)
                .or_else(|| keys(&default_separator()))
                .unwrap_or_else(ordinal),
            Self::KeyColumns { separator } => keys(separator).unwrap_or_else(ordinal),
            Self::Ordinal => ordinal(),
        }
    }
}

/// Hands out distinct file stems for one run.
///
/// The second stem that would collide with an earlier one gets `_2`, the
/// third `_3`, and so on. Stems are compared case-insensitively, as on Windows.
/// Every stem handed out is already sanitized and within the length budget,
/// so saving under it does not shorten it again.
#[derive(Debug, Clone)]
pub struct BaseNames {
    workflow: String,
    used: HashSet<String>,
}

impl BaseNames {
    pub fn new(workflow: &str) -> Self {
        Self {
            workflow: workflow.to_owned(),
            used: HashSet::new(),
        }
    }

    pub fn next(&mut self, identity: &str) -> String {
        let stem = sanitize_file_stem(&format!("{}_{identity}", self.workflow));
        let mut candidate = stem.clone();
        let mut counter = 1;
        while !self.used.insert(candidate.to_lowercase()) {
            counter += 1;
            candidate = stem_with_suffix(&stem, &format!("_{counter}"));
        }
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Dataset;

    fn dataset() -> Dataset {
        Dataset::new(
            vec!["성명".to_owned(), "사번".to_owned(), "부서".to_owned()],
            vec![
                (3, vec![Some("홍길동".to_owned()), Some("1001".to_owned()), Some("영업".to_owned())]),
                (4, vec![Some("김철수".to_owned()), Some(" ".to_owned()), None]),
                (5, vec![None, None, None]),
            ],
        )
    }

    #[test]
    fn test_key_columns() {
        let ds = dataset();
        let strategy = NamingStrategy::default();
        assert_eq!(strategy.identity(&ds.rows()[0], &[0, 1]), "홍길동_1001");
        assert_eq!(strategy.identity(&ds.rows()[1], &[0, 1]), "김철수");
        assert_eq!(strategy.identity(&ds.rows()[2], &[0, 1]), "3");

        let dashed = NamingStrategy::KeyColumns {
            separator: "-".to_owned(),
        };
        assert_eq!(dashed.identity(&ds.rows()[0], &[1, 0]), "1001-홍길동");
    }

    #[test]
    fn test_suffixes_fall_back_to_keys_then_ordinal() {
        let ds = dataset();
        let strategy = NamingStrategy::Suffixes {
            suffixes: vec!["첫째".to_owned(), String::new()],
        };
        assert_eq!(strategy.identity(&ds.rows()[0], &[0]), "첫째");
        assert_eq!(strategy.identity(&ds.rows()[1], &[0]), "김철수");
        assert_eq!(strategy.identity(&ds.rows()[2], &[0]), "3");
    }

    #[test]
    fn test_ordinal() {
        let ds = dataset();
        assert_eq!(NamingStrategy::Ordinal.identity(&ds.rows()[1], &[0]), "2");
    }

    #[test]
    fn test_collisions_get_counters() {
        let mut names = BaseNames::new("계약서");
        assert_eq!(names.next("홍길동"), "계약서_홍길동");
        assert_eq!(names.next("홍길동"), "계약서_홍길동_2");
        assert_eq!(names.next("김철수"), "계약서_김철수");
        assert_eq!(names.next("홍길동"), "계약서_홍길동_3");
    }

    #[test]
    fn test_collisions_after_sanitizing() {
        let mut names = BaseNames::new("doc");
        assert_eq!(names.next("a/b"), "doc_a_b");
        assert_eq!(names.next("a:b"), "doc_a_b_2");
        assert_eq!(names.next("A_B"), "doc_A_B_3");
    }

    #[test]
    fn test_long_identities_stay_distinct_once_saved() {
        let mut names = BaseNames::new("계약서");
        let identity = "가".repeat(250);
        let first = names.next(&identity);
        let second = names.next(&identity);
        assert_ne!(first, second);
        assert!(second.ends_with("_2"));
        for stem in [&first, &second] {
            assert!(stem.len() <= crate::session::filename::MAX_STEM_BYTES);
            assert_eq!(&sanitize_file_stem(stem), stem);
        }
    }

    #[test]
    fn test_strategy_deserializes() {
        let parsed: NamingStrategy = serde_json::from_str(r#"{"strategy": "key_columns"}"#).unwrap();
        assert_eq!(parsed, NamingStrategy::default());
        let parsed: NamingStrategy =
            serde_json::from_str(r#"{"strategy": "suffixes", "suffixes": ["a", "b"]}"#).unwrap();
        assert!(matches!(parsed, NamingStrategy::Suffixes { suffixes } if suffixes.len() == 2));
    }
}
