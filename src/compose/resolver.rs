//! Resolves every placeholder value for one row.
//!
//! [`Composer::new`] checks the rules once against the dataset's columns and
//! the configured fixed values, so a misspelt column stops the run before any
//! document is opened. [`Composer::resolve`] then evaluates each rule for a
//! row on its own; a failing rule is reported per field and does not stop the
//! others.

use super::particle::Particle;
use super::rules::{FieldRule, FieldSpec, Literal};
use crate::error::{FormfillError, Result};
use crate::source::Row;
use std::collections::BTreeMap;

/// Where a referenced name's value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    Column(usize),
    Fixed(String),
}

impl Source {
    fn value<'a>(&'a self, row: &'a Row) -> &'a str {
        match self {
            Self::Column(index) => row.cell(*index).unwrap_or_default(),
            Self::Fixed(value) => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Plan {
    Value(Source),
    Concat {
        sources: Vec<Source>,
        separator: String,
        literal: Option<Literal>,
    },
    Particle {
        source: Source,
        particle: Particle,
    },
}

/// A field that could not be composed for one row.
#[derive(Debug)]
pub struct FieldFailure {
    pub field: String,
    pub error: FormfillError,
}

impl std::fmt::Display for FieldFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.error)
    }
}

/// Outcome of resolving one row.
#[derive(Debug, Default)]
pub struct Resolution {
    /// Placeholder name to value, for every field that resolved
    pub values: BTreeMap<String, String>,
    pub failures: Vec<FieldFailure>,
}

impl Resolution {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// All failures of the row folded into one row-level error, so the report
    /// names every field that needs fixing.
    pub fn error(&self) -> Option<FormfillError> {
        if self.failures.is_empty() {
            return None;
        }
        let (fields, messages): (Vec<&str>, Vec<String>) = self
            .failures
            .iter()
            .map(|failure| match &failure.error {
                FormfillError::Composition { field, message } => (field.as_str(), message.clone()),
                other => (failure.field.as_str(), other.to_string()),
            })
            .unzip();
        Some(FormfillError::Composition {
            field: fields.join(", "),
            message: messages.join("; "),
        })
    }
}

/// Validated rules, ready to be evaluated row by row.
#[derive(Debug, Clone)]
pub struct Composer {
    fields: Vec<(String, Plan)>,
}

impl Composer {
    /// Checks `mapping` against the dataset `columns` and `fixed_values`.
    ///
    /// A referenced name is looked up among the dataset columns first and the
    /// fixed values second. A concatenation with no columns and no literal is
    /// skipped with a warning; its placeholder is left unbound.
    ///
    /// # Errors
    ///
    /// [`FormfillError::Configuration`] listing every rule that references an
    /// unknown name or a particle rule without exactly one column.
    pub fn new(
        mapping: &BTreeMap<String, FieldSpec>,
        columns: &[String],
        fixed_values: &BTreeMap<String, String>,
    ) -> Result<Self> {
        let lookup = |name: &str| -> Option<Source> {
            columns
                .iter()
                .position(|c| c == name)
                .map(Source::Column)
                .or_else(|| fixed_values.get(name).cloned().map(Source::Fixed))
        };

        let mut problems = Vec::new();
        let mut fields = Vec::new();

        for (field, spec) in mapping {
            let rule = spec.clone().into_rule();
            let missing: Vec<&str> = rule
                .columns()
                .iter()
                .map(String::as_str)
                .filter(|&name| lookup(name).is_none())
                .collect();
            if !missing.is_empty() {
                problems.push(format!(
                    "field '{field}' references unknown column(s): {}",
                    missing.join(", ")
                ));
                continue;
            }

            let plan = match rule {
                FieldRule::Column { column } => lookup(column.as_str()).map(Plan::Value),
                FieldRule::Fixed { value } => Some(Plan::Value(Source::Fixed(value))),
                FieldRule::Concat {
                    columns,
                    separator,
                    literal,
                } => {
                    if columns.is_empty() && literal.is_none() {
                        tracing::warn!(
                            "Field '{}' has no columns to join; it will be left unfilled",
                            field
                        );
                        continue;
                    }
                    Some(Plan::Concat {
                        sources: columns.iter().filter_map(|c| lookup(c.as_str())).collect(),
                        separator,
                        literal,
                    })
                }
                FieldRule::Particle { columns, particle } => match columns.as_slice() {
                    [column] => lookup(column.as_str())
                        .map(|source| Plan::Particle { source, particle }),
                    _ => {
                        problems.push(format!(
                            "field '{field}' needs exactly one column for a particle, got {}",
                            columns.len()
                        ));
                        continue;
                    }
                },
            };
            if let Some(plan) = plan {
                fields.push((field.clone(), plan));
            }
        }

        if !problems.is_empty() {
            return Err(FormfillError::Configuration(problems.join("; ")));
        }
        Ok(Self { fields })
    }

    /// Placeholder names this composer produces values for.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn resolve(&self, row: &Row) -> Resolution {
        let mut resolution = Resolution::default();
        for (field, plan) in &self.fields {
            match evaluate(plan, row) {
                Ok(value) => {
                    resolution.values.insert(field.clone(), value);
                }
                Err(error) => {
                    tracing::debug!("Row {}: field '{}' failed: {}", row.id, field, error);
                    resolution.failures.push(FieldFailure {
                        field: field.clone(),
                        error,
                    });
                }
            }
        }
        resolution
    }
}

fn evaluate(plan: &Plan, row: &Row) -> Result<String> {
    match plan {
        Plan::Value(source) => Ok(source.value(row).to_owned()),
        Plan::Concat {
            sources,
            separator,
            literal,
        } => {
            let mut parts: Vec<&str> = sources.iter().map(|s| s.value(row)).collect();
            if let Some(Literal { position, text }) = literal {
                parts.insert((*position).min(parts.len()), text);
            }
            Ok(parts.join(separator))
        }
        Plan::Particle { source, particle } => particle.attach(source.value(row)),
    }
}
