//! Turns a worksheet into a [`Dataset`].
//!
//! The header row names the columns, rows between `start_row` and `end_row`
//! become records, and every record must have all of its key cells filled.

use super::dataset::{Dataset, is_blank};
use super::formats::{DateFormatTable, is_date_format, parse_iso_datetime, serial_to_datetime};
use super::grid::{CellValue, Grid, RawCell};
use super::xlsx;
use crate::error::{FormfillError, Result};
use std::path::Path;

/// Where the table lives in the sheet and which columns identify a record.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Sheet name; `None` reads the active sheet
    pub sheet: Option<String>,
    /// 1-based row holding the column names
    pub header_row: u32,
    /// First data row, defaults to the row after the header
    pub start_row: Option<u32>,
    /// Last data row, defaults to the last populated row
    pub end_row: Option<u32>,
    pub key_columns: Vec<String>,
    pub date_formats: DateFormatTable,
}

impl ReadOptions {
    pub fn new(header_row: u32, key_columns: Vec<String>) -> Self {
        Self {
            sheet: None,
            header_row,
            start_row: None,
            end_row: None,
            key_columns,
            date_formats: DateFormatTable::default(),
        }
    }
}

/// Reads an `.xlsx` file into a dataset.
///
/// # Errors
///
/// [`FormfillError::SourceRead`] when the workbook, sheet, header or rows are
/// unusable; [`FormfillError::Configuration`] when the key columns are empty
/// or not present in the header.
pub fn read(path: &Path, options: &ReadOptions) -> Result<Dataset> {
    let grid = xlsx::load_grid(path, options.sheet.as_deref())?;
    let dataset = read_grid(&grid, options)?;
    tracing::info!(
        "Loaded {} rows x {} columns from {}",
        dataset.len(),
        dataset.columns().len(),
        path.display()
    );
    Ok(dataset)
}

/// Builds a dataset from an already loaded grid.
///
/// # Errors
///
/// See [`read`].
pub fn read_grid(grid: &Grid, options: &ReadOptions) -> Result<Dataset> {
    if options.key_columns.is_empty() {
        return Err(FormfillError::Configuration(
            "at least one key column is required".to_owned(),
        ));
    }

    let header_cells = grid
        .row(options.header_row)
        .ok_or_else(|| {
            FormfillError::SourceRead(format!(
                "header row {} is beyond the end of the sheet",
                options.header_row
            ))
        })?;
    let mut columns: Vec<String> = header_cells
        .iter()
        .map(|cell| decode_cell(cell, &options.date_formats, grid.date1904).unwrap_or_default())
        .collect();
    while columns.last().is_some_and(|name| name.trim().is_empty()) {
        columns.pop();
    }
    if columns.is_empty() {
        return Err(FormfillError::SourceRead(format!(
            "no header found in row {}",
            options.header_row
        )));
    }

    let key_indices = options
        .key_columns
        .iter()
        .map(|key| {
            columns.iter().position(|c| c == key).ok_or_else(|| {
                FormfillError::Configuration(format!(
                    "key column '{key}' is not in the header row"
                ))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let start = options
        .start_row
        .unwrap_or_else(|| options.header_row.saturating_add(1));
    let last_row = grid.last_row();
    let end = options.end_row.map_or(last_row, |end| end.min(last_row));

    let mut rows = Vec::new();
    let mut skipped = 0_usize;
    for row_number in start..=end {
        let cells: Vec<Option<String>> = grid
            .row(row_number)
            .unwrap_or_default()
            .iter()
            .take(columns.len())
            .map(|cell| decode_cell(cell, &options.date_formats, grid.date1904))
            .collect();

        let missing_key = key_indices
            .iter()
            .any(|&idx| is_blank(cells.get(idx).and_then(Option::as_deref)));
        if missing_key {
            skipped += 1;
            continue;
        }
        rows.push((row_number, cells));
    }

    if skipped > 0 {
        tracing::debug!("Skipped {} rows with empty key columns", skipped);
    }
    if rows.is_empty() {
        return Err(FormfillError::SourceRead(format!(
            "no rows between {start} and {end} have all key columns ({}) filled",
            options.key_columns.join(", ")
        )));
    }

    Ok(Dataset::new(columns, rows))
}

/// Canonical text of a cell; `None` for empty cells.
///
/// Date-formatted date values are rendered through `table`; everything else
/// uses its plain printable form.
pub fn decode_cell(cell: &RawCell, table: &DateFormatTable, date1904: bool) -> Option<String> {
    let date_code = cell
        .number_format
        .as_deref()
        .filter(|code| is_date_format(code));

    match (&cell.value, date_code) {
        (CellValue::Empty, _) => None,
        (CellValue::Number(serial), Some(code)) => Some(
            serial_to_datetime(*serial, date1904)
                .map_or_else(|| number_text(*serial), |dt| table.render(code, dt)),
        ),
        (CellValue::IsoDate(text), code) => Some(
            parse_iso_datetime(text).map_or_else(
                || text.clone(),
                |dt| table.render(code.unwrap_or_default(), dt),
            ),
        ),
        (CellValue::Number(n), None) => Some(number_text(*n)),
        (CellValue::Text(text) | CellValue::Error(text), _) => Some(text.clone()),
        (CellValue::Bool(b), _) => Some(if *b { "TRUE" } else { "FALSE" }.to_owned()),
    }
}

/// Integral values print without a decimal point, others in shortest form.
fn number_text(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}
