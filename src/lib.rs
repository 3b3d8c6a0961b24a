//! # formfill
//!
//! Fills the named placeholders of a document template once per spreadsheet
//! row and saves each result as an editable document plus an optional PDF.
//!
//! ## Quick Start
//!
//! ```no_run
//! use formfill::config::RunConfig;
//! use formfill::engine::DocxEngine;
//! use formfill::{batch, source};
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = RunConfig::from_file("run.json")?;
//! let dataset = source::read(&config.source_path, &config.read_options())?;
//! let dataset = source::apply_column_types(&dataset, &config.column_types)?;
//!
//! let plan = config.batch_plan(config.output_dir());
//! let engine = DocxEngine::new(config.rendition.clone());
//! let report = batch::generate(engine, &dataset, &plan, |_| {})?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Modules
//!
//! - [`source`]: reads an xlsx sheet into a [`source::Dataset`] of display strings
//! - [`compose`]: turns a row into field values, including Korean particle selection
//! - [`engine`]: the document engine seam and its docx implementation
//! - [`session`]: open template, bind fields, persist, release
//! - [`batch`]: runs a whole dataset and produces a [`batch::RunReport`]
//! - [`config`]: JSON run configuration and its validation
//! - [`logging`]: tracing setup
//! - [`error`]: error types and handling utilities

#![warn(clippy::all, rust_2018_idioms)]

pub mod batch;
pub mod compose;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod session;
pub mod source;
