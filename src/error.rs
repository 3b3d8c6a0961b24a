//! Centralized error handling for formfill.
//!
//! The variants follow the run's failure taxonomy. Some are fatal for a whole
//! run and stop it before (or during) document work:
//!
//! - [`FormfillError::SourceRead`]: the workbook, sheet, header or rows are unusable
//! - [`FormfillError::Configuration`]: the run configuration references something that
//!   does not exist, or is otherwise invalid
//! - [`FormfillError::TemplateOpen`] and [`FormfillError::UnknownField`]: the
//!   template cannot be used
//!
//! Others are recorded against a single row and the batch carries on:
//!
//! - [`FormfillError::InvalidSuffixTarget`], [`FormfillError::Composition`]
//! - [`FormfillError::Persist`]
//!
//! ```
//! use formfill::error::FormfillError;
//!
//! fn is_row_level(err: &FormfillError) -> bool {
//!     err.is_row_level()
//! }
//!
//! assert!(is_row_level(&FormfillError::InvalidSuffixTarget));
//! assert!(!is_row_level(&FormfillError::Configuration("no key columns".to_owned())));
//! ```
//!
//! The `ResultExt` trait adds `.context()` to any `Result` whose error converts
//! into [`FormfillError`]:
//!
//! ```no_run
//! use formfill::error::ResultExt as _;
//!
//! fn load() -> formfill::error::Result<String> {
//!     let text = std::fs::read_to_string("run.json").context("Failed to read run config")?;
//!     Ok(text)
//! }
//! ```

use std::fmt;

/// Main error type for formfill operations.
#[derive(Debug)]
pub enum FormfillError {
    /// The tabular source could not be read (no header, no rows, missing sheet)
    SourceRead(String),

    /// The run configuration is invalid
    Configuration(String),

    /// The template could not be opened by the document engine
    TemplateOpen(String),

    /// A value was bound to a placeholder the template does not have
    UnknownField(String),

    /// A particle suffix was requested for an empty word
    InvalidSuffixTarget,

    /// A single field could not be composed
    Composition { field: String, message: String },

    /// Writing a row's artifacts failed
    Persist(String),

    /// A session operation was called in the wrong state
    SessionState(String),

    /// I/O errors
    Io(std::io::Error),

    /// JSON (de)serialization errors
    Json(serde_json::Error),

    /// Generic error with context
    Other(String),
}

impl FormfillError {
    /// Whether this error is recorded against one row instead of aborting the run.
    pub fn is_row_level(&self) -> bool {
        matches!(
            self,
            Self::InvalidSuffixTarget | Self::Composition { .. } | Self::Persist(_)
        )
    }
}

impl fmt::Display for FormfillError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceRead(msg) => write!(f, "Source read error: {msg}"),
            Self::Configuration(msg) => write!(f, "Configuration error: {msg}"),
            Self::TemplateOpen(msg) => write!(f, "Template open error: {msg}"),
            Self::UnknownField(name) => write!(f, "Unknown template field: {name}"),
            Self::InvalidSuffixTarget => {
                write!(f, "Invalid suffix target: cannot attach a particle to an empty value")
            }
            Self::Composition { field, message } => {
                write!(f, "Failed to compose field '{field}': {message}")
            }
            Self::Persist(msg) => write!(f, "Persist error: {msg}"),
            Self::SessionState(msg) => write!(f, "Session state error: {msg}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Json(e) => write!(f, "JSON error: {e}"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for FormfillError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FormfillError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for FormfillError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

impl From<anyhow::Error> for FormfillError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(format!("{err:#}"))
    }
}

/// Result type alias for formfill operations.
pub type Result<T> = std::result::Result<T, FormfillError>;

/// Extension trait to add context to results.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<FormfillError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err: FormfillError = e.into();
            FormfillError::Other(format!("{}: {}", msg.into(), err))
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err: FormfillError = e.into();
            FormfillError::Other(format!("{}: {}", f(), err))
        })
    }
}
