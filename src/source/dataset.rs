//! In-memory table produced by the reader.

use serde::Serialize;

/// Identity of a row, fixed at ingestion time.
///
/// `source_row` is the 1-based row number in the sheet; `ordinal` is the
/// 1-based position among the rows that survived the key filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RowId {
    pub source_row: u32,
    pub ordinal: usize,
}

impl std::fmt::Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} (sheet row {})", self.ordinal, self.source_row)
    }
}

/// One record: a value per dataset column, in column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub id: RowId,
    cells: Vec<Option<String>>,
}

impl Row {
    pub fn cells(&self) -> &[Option<String>] {
        &self.cells
    }

    pub fn cell(&self, index: usize) -> Option<&str> {
        self.cells.get(index).and_then(|c| c.as_deref())
    }
}

/// Ordered columns and rows. Every row has exactly one cell per column.
///
/// Datasets are never edited in place; transformations such as
/// [`crate::source::typing::apply_column_types`] return a new value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Dataset {
    /// Builds a dataset, padding or truncating each row to the column count.
    pub fn new(columns: Vec<String>, rows: impl IntoIterator<Item = (u32, Vec<Option<String>>)>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(idx, (source_row, mut cells))| {
                cells.resize(width, None);
                Row {
                    id: RowId {
                        source_row,
                        ordinal: idx + 1,
                    },
                    cells,
                }
            })
            .collect();
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name. Duplicate names resolve to the first match.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Value of `column` in `row`, `None` for null cells or unknown columns.
    pub fn value<'a>(&self, row: &'a Row, column: &str) -> Option<&'a str> {
        self.column_index(column).and_then(|idx| row.cell(idx))
    }

    /// Returns a copy with every cell of `column` passed through `convert`.
    pub(crate) fn map_column<F>(&self, index: usize, mut convert: F) -> Self
    where
        F: FnMut(&str) -> String,
    {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut cells = row.cells.clone();
                if let Some(Some(value)) = cells.get_mut(index) {
                    *value = convert(value);
                }
                Row { id: row.id, cells }
            })
            .collect();
        Self {
            columns: self.columns.clone(),
            rows,
        }
    }
}

/// True when a key cell is missing or blank after trimming.
pub fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}
