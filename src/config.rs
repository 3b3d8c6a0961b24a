//! Run configuration.
//!
//! One JSON file describes a whole run: where the template and the workbook
//! are, which rows to read, how each placeholder is filled and how the output
//! files are named. [`RunConfig::from_file`] parses and validates it once; the
//! validated value is then passed down to the reader and the batch executor.

use crate::batch::{BatchPlan, NamingStrategy};
use crate::compose::{FieldRule, FieldSpec, Literal, Particle};
use crate::engine::RenditionOptions;
use crate::error::{FormfillError, Result};
use crate::session::sanitize_file_stem;
use crate::source::{ColumnType, DateFormatTable, NumericFormat, ReadOptions};
use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const MAX_WORKFLOW_NAME_CHARS: usize = 50;

/// Name of the report the CLI writes next to the generated files.
pub const REPORT_FILE_NAME: &str = "run_report.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Prefix of every generated file name
    pub workflow_name: String,

    pub template_path: PathBuf,

    /// `.xlsx` workbook holding one record per row
    pub source_path: PathBuf,

    /// Worksheet name; the workbook's active sheet when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,

    /// 1-based row holding the column names
    #[serde(default = "default_header_row")]
    pub header_row: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_row: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_row: Option<u32>,

    /// Rows with any of these cells empty are skipped
    pub key_columns: Vec<String>,

    /// Placeholder name to column name or rule
    #[serde(default)]
    pub field_mapping: BTreeMap<String, FieldSpec>,

    /// Named literals usable wherever a column name is expected
    #[serde(default)]
    pub fixed_values: BTreeMap<String, String>,

    #[serde(default)]
    pub column_types: BTreeMap<String, ColumnType>,

    /// Extra spreadsheet date format codes mapped to strftime patterns
    #[serde(default)]
    pub date_formats: BTreeMap<String, String>,

    #[serde(default)]
    pub naming: NamingStrategy,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,

    #[serde(default)]
    pub rendition: RenditionOptions,
}

fn default_header_row() -> u32 {
    1
}

impl RunConfig {
    /// Loads and validates a configuration file.
    ///
    /// Relative `template_path`, `source_path` and `output_dir` are resolved
    /// against the directory of the configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            FormfillError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut config = Self::parse(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_relative_paths(base);
        }
        config.validate()?;
        tracing::debug!("Loaded run configuration from {}", path.display());
        Ok(config)
    }

    /// Parses and validates a configuration from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        let config = Self::parse(json)?;
        config.validate()?;
        Ok(config)
    }

    fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| FormfillError::Configuration(format!("invalid run configuration: {e}")))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_json()?)?;
        Ok(())
    }

    fn resolve_relative_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.template_path);
        resolve(&mut self.source_path);
        if let Some(dir) = self.output_dir.as_mut() {
            resolve(dir);
        }
    }

    /// Checks everything that can be checked without opening any file.
    ///
    /// # Errors
    ///
    /// [`FormfillError::Configuration`] listing every problem found.
    pub fn validate(&self) -> Result<()> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(FormfillError::Configuration(problems.join("; ")))
        }
    }

    fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        let name_len = self.workflow_name.trim().chars().count();
        if name_len == 0 || name_len > MAX_WORKFLOW_NAME_CHARS {
            problems.push(format!(
                "workflow_name must be 1 to {MAX_WORKFLOW_NAME_CHARS} characters"
            ));
        }
        if self.header_row == 0 {
            problems.push("header_row must be 1 or greater".to_owned());
        }
        if let Some(start) = self.start_row
            && start <= self.header_row
        {
            problems.push(format!(
                "start_row {start} must come after header_row {}",
                self.header_row
            ));
        }
        if let Some(end) = self.end_row
            && end < self.first_data_row()
        {
            problems.push(format!(
                "end_row {end} is before the first data row {}",
                self.first_data_row()
            ));
        }

        if self.key_columns.is_empty() {
            problems.push("at least one key column is required".to_owned());
        }
        if self.key_columns.iter().any(|k| k.trim().is_empty()) {
            problems.push("key column names must not be blank".to_owned());
        }
        if self.field_mapping.is_empty() {
            problems.push("field_mapping is empty".to_owned());
        }

        if let NamingStrategy::Suffixes { suffixes } = &self.naming
            && suffixes.is_empty()
        {
            problems.push("naming strategy 'suffixes' needs at least one suffix".to_owned());
        }

        for (column, column_type) in &self.column_types {
            if let ColumnType::Date { pattern } = column_type
                && !is_valid_pattern(pattern)
            {
                problems.push(format!("invalid date pattern '{pattern}' for column '{column}'"));
            }
        }
        for (code, pattern) in &self.date_formats {
            if !is_valid_pattern(pattern) {
                problems.push(format!("invalid date pattern '{pattern}' for format '{code}'"));
            }
        }

        if self.rendition.enabled && self.rendition.command.trim().is_empty() {
            problems.push("rendition command is empty".to_owned());
        }

        problems
    }

    fn first_data_row(&self) -> u32 {
        self.start_row.unwrap_or(self.header_row + 1)
    }

    pub fn read_options(&self) -> ReadOptions {
        ReadOptions {
            sheet: self.sheet.clone(),
            header_row: self.header_row,
            start_row: self.start_row,
            end_row: self.end_row,
            key_columns: self.key_columns.clone(),
            date_formats: DateFormatTable::with_entries(&self.date_formats),
        }
    }

    /// Configured output directory, or a folder named after the workflow in
    /// the system temp directory.
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(|| {
            std::env::temp_dir().join(sanitize_file_stem(self.workflow_name.trim()))
        })
    }

    pub fn batch_plan(&self, output_dir: PathBuf) -> BatchPlan {
        BatchPlan {
            workflow_name: self.workflow_name.trim().to_owned(),
            template_path: self.template_path.clone(),
            output_dir,
            field_mapping: self.field_mapping.clone(),
            fixed_values: self.fixed_values.clone(),
            key_columns: self.key_columns.clone(),
            naming: self.naming.clone(),
        }
    }

    /// A complete configuration showing every rule kind.
    pub fn example() -> Self {
        let columns = |names: &[&str]| names.iter().map(|n| (*n).to_owned()).collect();
        let field_mapping = BTreeMap::from([
            ("성명".to_owned(), FieldSpec::Column("성명".to_owned())),
            (
                "발주처".to_owned(),
                FieldRule::Column {
                    column: "발주처".to_owned(),
                }
                .into(),
            ),
            (
                "계약기간".to_owned(),
                FieldRule::Concat {
                    columns: columns(&["계약시작일", "계약종료일"]),
                    separator: " ".to_owned(),
                    literal: Some(Literal {
                        position: 1,
                        text: "~".to_owned(),
                    }),
                }
                .into(),
            ),
            (
                "성명_을".to_owned(),
                FieldRule::Particle {
                    columns: columns(&["성명"]),
                    particle: Particle::Object,
                }
                .into(),
            ),
        ]);

        Self {
            workflow_name: "계약서".to_owned(),
            template_path: PathBuf::from("contract_template.docx"),
            source_path: PathBuf::from("contract_fill.xlsx"),
            sheet: None,
            header_row: 2,
            start_row: None,
            end_row: None,
            key_columns: columns(&["성명"]),
            field_mapping,
            fixed_values: BTreeMap::from([("발주처".to_owned(), "김응태".to_owned())]),
            column_types: BTreeMap::from([
                (
                    "총 계약금액".to_owned(),
                    ColumnType::Numeric {
                        format: NumericFormat::Thousands,
                    },
                ),
                (
                    "계약시작일".to_owned(),
                    ColumnType::Date {
                        pattern: "%Y년 %-m월 %-d일".to_owned(),
                    },
                ),
            ]),
            date_formats: BTreeMap::new(),
            naming: NamingStrategy::default(),
            output_dir: Some(PathBuf::from("output")),
            rendition: RenditionOptions::default(),
        }
    }
}

fn is_valid_pattern(pattern: &str) -> bool {
    !pattern.is_empty() && !StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error))
}
