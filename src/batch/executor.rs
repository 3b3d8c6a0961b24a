//! Batch execution.
//!
//! Validates the field rules against the dataset, opens the template once and
//! then fills, names and saves one document per row. Row-level problems are
//! recorded in the [`RunReport`] and the run moves on; configuration and
//! template problems end the run.

use super::naming::{BaseNames, NamingStrategy};
use super::report::{RowOutcome, RowStatus, RunReport};
use crate::compose::{Composer, FieldSpec};
use crate::engine::DocumentEngine;
use crate::error::{FormfillError, Result};
use crate::session::DocumentSession;
use crate::source::{Dataset, Row, RowId};
use chrono::Local;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Everything a run needs besides the dataset and the engine.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    /// Prefix of every output file name
    pub workflow_name: String,
    pub template_path: PathBuf,
    pub output_dir: PathBuf,
    /// Placeholder name to rule
    pub field_mapping: BTreeMap<String, FieldSpec>,
    /// Named literals that rules may reference like columns
    pub fixed_values: BTreeMap<String, String>,
    pub key_columns: Vec<String>,
    pub naming: NamingStrategy,
}

/// Progress notification, sent before each row is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// 1-based
    pub current: usize,
    pub total: usize,
    pub row: RowId,
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "row {} of {}", self.current, self.total)
    }
}

/// Generates one document per dataset row.
///
/// # Errors
///
/// [`FormfillError::Configuration`] before the template is opened when a rule
/// or key column names something the dataset does not have;
/// [`FormfillError::TemplateOpen`] and [`FormfillError::UnknownField`] when the
/// template cannot be used. The engine is released on every path.
pub fn generate<E: DocumentEngine>(
    engine: E,
    dataset: &Dataset,
    plan: &BatchPlan,
    mut on_progress: impl FnMut(&Progress),
) -> Result<RunReport> {
    let start = std::time::Instant::now();
    let started_at = Local::now().to_rfc3339();

    let key_indices = key_indices(dataset, &plan.key_columns)?;
    let composer = Composer::new(&plan.field_mapping, dataset.columns(), &plan.fixed_values)?;

    let mut session = DocumentSession::new(engine);
    let template_fields = session.open(&plan.template_path)?.to_vec();
    log_unmapped_fields(&template_fields, &composer);

    let mut names = BaseNames::new(&plan.workflow_name);
    let total = dataset.len();
    let mut rows = Vec::with_capacity(total);

    for (index, row) in dataset.rows().iter().enumerate() {
        let progress = Progress {
            current: index + 1,
            total,
            row: row.id,
        };
        tracing::info!("Processing {} ({})", progress, row.id);
        on_progress(&progress);

        let status = match fill_row(&mut session, &composer, row) {
            Ok(()) => {
                let identity = plan.naming.identity(row, &key_indices);
                let base = names.next(&identity);
                match session.persist(&plan.output_dir, &base) {
                    Ok(artifacts) => RowStatus::Success { artifacts },
                    Err(err) if err.is_row_level() => row_failure(row, &err),
                    Err(err) => return Err(err),
                }
            }
            Err(err) if err.is_row_level() => row_failure(row, &err),
            Err(err) => return Err(err),
        };
        rows.push(RowOutcome { row: row.id, status });
    }

    session.release();

    let report = RunReport {
        workflow: plan.workflow_name.clone(),
        output_dir: plan.output_dir.clone(),
        started_at,
        rows,
        duration: start.elapsed(),
    };
    tracing::info!("{}", report.summary());
    Ok(report)
}

/// Resolves and binds every field of `row`; nothing is bound if any field fails.
fn fill_row<E: DocumentEngine>(
    session: &mut DocumentSession<E>,
    composer: &Composer,
    row: &Row,
) -> Result<()> {
    let resolution = composer.resolve(row);
    if let Some(err) = resolution.error() {
        for failure in &resolution.failures {
            tracing::warn!("Row {}: {}", row.id, failure);
        }
        return Err(err);
    }
    for (field, value) in &resolution.values {
        session.bind(field, value)?;
    }
    Ok(())
}

fn row_failure(row: &Row, err: &FormfillError) -> RowStatus {
    tracing::warn!("Row {} skipped: {}", row.id, err);
    RowStatus::Failure {
        error: err.to_string(),
    }
}

fn key_indices(dataset: &Dataset, key_columns: &[String]) -> Result<Vec<usize>> {
    if key_columns.is_empty() {
        return Err(FormfillError::Configuration(
            "at least one key column is required".to_owned(),
        ));
    }
    key_columns
        .iter()
        .map(|key| {
            dataset.column_index(key).ok_or_else(|| {
                FormfillError::Configuration(format!("key column '{key}' is not in the dataset"))
            })
        })
        .collect()
}

/// Template placeholders no rule fills keep their template text.
fn log_unmapped_fields(template_fields: &[String], composer: &Composer) {
    let mapped: Vec<&str> = composer.field_names().collect();
    let unmapped: Vec<&str> = template_fields
        .iter()
        .map(String::as_str)
        .filter(|field| {
            !mapped.iter().any(|name| {
                field == name || field.strip_prefix(name).is_some_and(|rest| rest.starts_with("{{"))
            })
        })
        .collect();
    if !unmapped.is_empty() {
        tracing::info!("Placeholders left as in the template: {}", unmapped.join(", "));
    }
}
