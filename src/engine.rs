//! Document engine abstraction.
//!
//! An engine is a stateful capability that opens one template, accepts text
//! for its placeholders and saves the result. [`crate::session::DocumentSession`]
//! drives it and enforces the open/bind/persist/release order, so engines only
//! report failures; they do not track session state themselves.

pub mod docx;

use std::path::Path;

pub use docx::{DocxEngine, RenditionOptions};

/// Which artifact [`DocumentEngine::save_as`] writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaveFormat {
    /// The editable document, e.g. `.docx`
    Primary,
    /// The fixed-layout copy, e.g. `.pdf`
    Rendition,
}

pub trait DocumentEngine {
    /// Loads `template` and returns its placeholder names in document order.
    fn open(&mut self, template: &Path) -> anyhow::Result<Vec<String>>;

    /// Sets the text of one placeholder, replacing any earlier value.
    fn put_field_text(&mut self, field: &str, value: &str) -> anyhow::Result<()>;

    /// Writes the current document to `path` in `format`.
    fn save_as(&mut self, path: &Path, format: SaveFormat) -> anyhow::Result<()>;

    /// File extension of the primary artifact, without the dot.
    fn primary_extension(&self) -> &str;

    /// File extension of the rendition, `None` when renditions are off.
    fn rendition_extension(&self) -> Option<&str>;

    /// Discards the open document. Must be safe to call more than once.
    fn quit(&mut self);
}

impl<E: DocumentEngine + ?Sized> DocumentEngine for Box<E> {
    fn open(&mut self, template: &Path) -> anyhow::Result<Vec<String>> {
        (**self).open(template)
    }

    fn put_field_text(&mut self, field: &str, value: &str) -> anyhow::Result<()> {
        (**self).put_field_text(field, value)
    }

    fn save_as(&mut self, path: &Path, format: SaveFormat) -> anyhow::Result<()> {
        (**self).save_as(path, format)
    }

    fn primary_extension(&self) -> &str {
        (**self).primary_extension()
    }

    fn rendition_extension(&self) -> Option<&str> {
        (**self).rendition_extension()
    }

    fn quit(&mut self) {
        (**self).quit();
    }
}
