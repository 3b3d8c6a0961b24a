//! Tabular source ingestion.
//!
//! - [`xlsx`]: reads a worksheet of an `.xlsx` workbook into a raw [`Grid`]
//! - [`reader`]: header detection, row range, key filtering and cell decoding
//! - [`dataset`]: the immutable table handed to composition
//! - [`typing`]: numeric/date presentation applied to declared columns
//! - [`formats`]: date format detection and the format-code lookup table
//!
//! ```no_run
//! use formfill::source::{ReadOptions, read};
//! use std::path::Path;
//!
//! let options = ReadOptions::new(1, vec!["성명".to_owned()]);
//! let dataset = read(Path::new("contract_fill.xlsx"), &options)?;
//! println!("{} records", dataset.len());
//! # Ok::<(), formfill::error::FormfillError>(())
//! ```

pub mod dataset;
pub mod formats;
pub mod grid;
pub mod reader;
pub mod typing;
pub mod xlsx;

pub use dataset::{Dataset, Row, RowId};
pub use formats::DateFormatTable;
pub use grid::{CellValue, Grid, RawCell};
pub use reader::{ReadOptions, read, read_grid};
pub use typing::{ColumnType, NumericFormat, apply_column_types};
