//! Raw cell grid of one worksheet, before header and key handling.

/// Stored value of a cell, as the workbook recorded it.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    /// Error cells such as `#DIV/0!`
    Error(String),
    /// ISO 8601 text of a `t="d"` cell
    IsoDate(String),
}

/// A cell value plus the number format code applied to it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCell {
    pub value: CellValue,
    pub number_format: Option<String>,
}

impl RawCell {
    pub const EMPTY: Self = Self {
        value: CellValue::Empty,
        number_format: None,
    };

    pub fn text(value: impl Into<String>) -> Self {
        Self {
            value: CellValue::Text(value.into()),
            number_format: None,
        }
    }

    pub fn number(value: f64) -> Self {
        Self {
            value: CellValue::Number(value),
            number_format: None,
        }
    }

    /// A serial date cell carrying a date number format.
    pub fn date_serial(serial: f64, format: impl Into<String>) -> Self {
        Self {
            value: CellValue::Number(serial),
            number_format: Some(format.into()),
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.number_format = Some(format.into());
        self
    }
}

/// Worksheet cells addressed by 1-based row and column numbers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid {
    rows: Vec<Vec<RawCell>>,
    /// Workbook uses the 1904 date system
    pub date1904: bool,
}

impl Grid {
    pub fn new(date1904: bool) -> Self {
        Self {
            rows: Vec::new(),
            date1904,
        }
    }

    /// Builds a grid whose first vector is sheet row 1.
    pub fn from_rows(rows: Vec<Vec<RawCell>>) -> Self {
        Self {
            rows,
            date1904: false,
        }
    }

    pub fn set(&mut self, row: u32, column: u32, cell: RawCell) {
        let (Some(r), Some(c)) = (
            (row as usize).checked_sub(1),
            (column as usize).checked_sub(1),
        ) else {
            return;
        };
        if self.rows.len() <= r {
            self.rows.resize_with(r + 1, Vec::new);
        }
        if let Some(cells) = self.rows.get_mut(r) {
            if cells.len() <= c {
                cells.resize(c + 1, RawCell::EMPTY);
            }
            if let Some(slot) = cells.get_mut(c) {
                *slot = cell;
            }
        }
    }

    /// Cells of a 1-based sheet row; rows past the end are `None`.
    pub fn row(&self, row: u32) -> Option<&[RawCell]> {
        (row as usize)
            .checked_sub(1)
            .and_then(|r| self.rows.get(r))
            .map(Vec::as_slice)
    }

    /// Number of the last row holding at least one non-empty cell.
    pub fn last_row(&self) -> u32 {
        self.rows
            .iter()
            .rposition(|cells| cells.iter().any(|c| c.value != CellValue::Empty))
            .map_or(0, |idx| (idx + 1) as u32)
    }
}
