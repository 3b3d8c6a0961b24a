//! Template document session.
//!
//! A [`DocumentSession`] owns one [`DocumentEngine`] for the length of a run
//! and moves through three states:
//!
//! ```text
//! Unopened --open--> TemplateOpen --release--> Closed
//! ```
//!
//! `bind` and `persist` are only valid while the template is open. `release`
//! is terminal and idempotent, and runs automatically when the session is
//! dropped, so the engine is shut down on every exit path.

pub mod filename;

use crate::engine::{DocumentEngine, SaveFormat};
use crate::error::{FormfillError, Result};
use std::path::{Path, PathBuf};

pub use filename::{sanitize_file_stem, stem_with_suffix};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unopened,
    /// Holds the template's placeholder names
    TemplateOpen { fields: Vec<String> },
    Closed,
}

impl SessionState {
    fn label(&self) -> &'static str {
        match self {
            Self::Unopened => "unopened",
            Self::TemplateOpen { .. } => "open",
            Self::Closed => "closed",
        }
    }
}

pub struct DocumentSession<E: DocumentEngine> {
    engine: E,
    state: SessionState,
}

impl<E: DocumentEngine> DocumentSession<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            state: SessionState::Unopened,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Placeholder names of the open template; empty when none is open.
    pub fn fields(&self) -> &[String] {
        match &self.state {
            SessionState::TemplateOpen { fields } => fields,
            SessionState::Unopened | SessionState::Closed => &[],
        }
    }

    /// Opens `template` and returns its placeholder names.
    ///
    /// # Errors
    ///
    /// [`FormfillError::SessionState`] if the session was already opened,
    /// [`FormfillError::TemplateOpen`] if the file is missing or the engine
    /// rejects it.
    pub fn open(&mut self, template: &Path) -> Result<&[String]> {
        if self.state != SessionState::Unopened {
            return Err(FormfillError::SessionState(format!(
                "cannot open a template in a session that is {}",
                self.state.label()
            )));
        }
        if !template.is_file() {
            return Err(FormfillError::TemplateOpen(format!(
                "template not found: {}",
                template.display()
            )));
        }

        let fields = self.engine.open(template).map_err(|e| {
            FormfillError::TemplateOpen(format!("{}: {e:#}", template.display()))
        })?;
        tracing::debug!("Template fields: {:?}", fields);
        self.state = SessionState::TemplateOpen { fields };
        Ok(self.fields())
    }

    /// Sets `value` on placeholder `name`, overwriting earlier values.
    ///
    /// A bare name such as `성명` also binds every indexed occurrence
    /// `성명{{0}}`, `성명{{1}}`, ... Returns how many placeholders were set.
    ///
    /// # Errors
    ///
    /// [`FormfillError::UnknownField`] when nothing in the template matches.
    pub fn bind(&mut self, name: &str, value: &str) -> Result<usize> {
        let SessionState::TemplateOpen { fields } = &self.state else {
            return Err(FormfillError::SessionState(format!(
                "cannot bind '{name}' in a session that is {}",
                self.state.label()
            )));
        };

        let targets = matching_fields(fields, name);
        if targets.is_empty() {
            return Err(FormfillError::UnknownField(name.to_owned()));
        }
        for target in &targets {
            self.engine
                .put_field_text(target, value)
                .map_err(|e| FormfillError::Other(format!("failed to bind '{target}': {e:#}")))?;
        }
        Ok(targets.len())
    }

    /// Writes the primary document and, when the engine produces one, the
    /// rendition to `directory` under a sanitized `base_name`.
    ///
    /// Bindings are kept, so the session can persist again after more binds.
    /// If a later save fails, files already written by this call are removed,
    /// so a failed row leaves nothing behind.
    ///
    /// # Errors
    ///
    /// [`FormfillError::Persist`] when the directory or a file cannot be written.
    pub fn persist(&mut self, directory: &Path, base_name: &str) -> Result<Vec<PathBuf>> {
        if !matches!(self.state, SessionState::TemplateOpen { .. }) {
            return Err(FormfillError::SessionState(format!(
                "cannot persist in a session that is {}",
                self.state.label()
            )));
        }

        std::fs::create_dir_all(directory).map_err(|e| {
            FormfillError::Persist(format!("cannot create {}: {e}", directory.display()))
        })?;

        let stem = sanitize_file_stem(base_name);
        let mut formats = vec![(SaveFormat::Primary, self.engine.primary_extension().to_owned())];
        if let Some(extension) = self.engine.rendition_extension() {
            formats.push((SaveFormat::Rendition, extension.to_owned()));
        }

        let mut written = Vec::with_capacity(formats.len());
        for (format, extension) in formats {
            let path = directory.join(format!("{stem}.{extension}"));
            if let Err(e) = self.engine.save_as(&path, format) {
                remove_partial(&written);
                return Err(FormfillError::Persist(format!(
                    "failed to save {}: {e:#}",
                    path.display()
                )));
            }
            written.push(path);
        }
        Ok(written)
    }

    /// Shuts the engine down. Calling it again does nothing.
    pub fn release(&mut self) {
        match self.state {
            SessionState::TemplateOpen { .. } => {
                self.engine.quit();
                tracing::debug!("Document session released");
            }
            SessionState::Unopened | SessionState::Closed => {}
        }
        self.state = SessionState::Closed;
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }
}

impl<E: DocumentEngine> Drop for DocumentSession<E> {
    fn drop(&mut self) {
        self.release();
    }
}

fn remove_partial(written: &[PathBuf]) {
    for path in written {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!("Could not remove partial output {}: {}", path.display(), e);
        }
    }
}

/// `name` itself if the template has it, otherwise every `name{{k}}`.
fn matching_fields(fields: &[String], name: &str) -> Vec<String> {
    if fields.iter().any(|f| f == name) {
        return vec![name.to_owned()];
    }
    fields
        .iter()
        .filter(|f| {
            f.strip_prefix(name)
                .and_then(|rest| rest.strip_prefix("{{"))
                .and_then(|rest| rest.strip_suffix("}}"))
                .is_some_and(|index| !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()))
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorder {
        calls: Rc<RefCell<Vec<String>>>,
        fields: Vec<String>,
        fail_save: bool,
        fail_rendition: bool,
    }

    impl DocumentEngine for Recorder {
        fn open(&mut self, _template: &Path) -> anyhow::Result<Vec<String>> {
            self.calls.borrow_mut().push("open".to_owned());
            Ok(self.fields.clone())
        }

        fn put_field_text(&mut self, field: &str, value: &str) -> anyhow::Result<()> {
            self.calls.borrow_mut().push(format!("put {field}={value}"));
            Ok(())
        }

        fn save_as(&mut self, path: &Path, format: SaveFormat) -> anyhow::Result<()> {
            if self.fail_save || (self.fail_rendition && format == SaveFormat::Rendition) {
                anyhow::bail!("disk full");
            }
            std::fs::write(path, b"")?;
            let name = path.file_name().unwrap_or_default().to_string_lossy();
            self.calls.borrow_mut().push(format!("save {name}"));
            Ok(())
        }

        fn primary_extension(&self) -> &str {
            "docx"
        }

        fn rendition_extension(&self) -> Option<&str> {
            Some("pdf")
        }

        fn quit(&mut self) {
            self.calls.borrow_mut().push("quit".to_owned());
        }
    }

    fn session(fields: &[&str]) -> (DocumentSession<Recorder>, Rc<RefCell<Vec<String>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let engine = Recorder {
            calls: Rc::clone(&calls),
            fields: fields.iter().map(|f| (*f).to_owned()).collect(),
            fail_save: false,
            fail_rendition: false,
        };
        (DocumentSession::new(engine), calls)
    }

    fn template_file(dir: &Path) -> PathBuf {
        let path = dir.join("template.docx");
        std::fs::write(&path, b"template").unwrap();
        path
    }

    #[test]
    fn test_open_then_bind_and_persist() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, calls) = session(&["성명{{0}}", "성명{{1}}", "주소{{0}}"]);
        let fields = session.open(&template_file(dir.path())).unwrap().to_vec();
        assert_eq!(fields.len(), 3);

        assert_eq!(session.bind("성명", "홍길동").unwrap(), 2);
        assert_eq!(session.bind("주소{{0}}", "서울").unwrap(), 1);

        let out = dir.path().join("nested").join("out");
        let written = session.persist(&out, "계약서_홍길동").unwrap();
        assert_eq!(
            written,
            vec![out.join("계약서_홍길동.docx"), out.join("계약서_홍길동.pdf")]
        );
        assert!(written.iter().all(|p| p.exists()));
        assert!(matches!(session.state(), SessionState::TemplateOpen { .. }));

        assert_eq!(
            *calls.borrow(),
            vec![
                "open",
                "put 성명{{0}}=홍길동",
                "put 성명{{1}}=홍길동",
                "put 주소{{0}}=서울",
                "save 계약서_홍길동.docx",
                "save 계약서_홍길동.pdf",
            ]
        );
    }

    #[test]
    fn test_unknown_field() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _) = session(&["성명{{0}}"]);
        session.open(&template_file(dir.path())).unwrap();
        assert!(matches!(
            session.bind("주소", "x"),
            Err(FormfillError::UnknownField(name)) if name == "주소"
        ));
        assert!(matches!(
            session.bind("성", "x"),
            Err(FormfillError::UnknownField(_))
        ));
    }

    #[test]
    fn test_state_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let template = template_file(dir.path());
        let (mut session, _) = session(&["a{{0}}"]);
        assert!(matches!(
            session.bind("a", "x"),
            Err(FormfillError::SessionState(_))
        ));
        assert!(matches!(
            session.persist(dir.path(), "x"),
            Err(FormfillError::SessionState(_))
        ));

        session.open(&template).unwrap();
        assert!(matches!(
            session.open(&template),
            Err(FormfillError::SessionState(_))
        ));

        session.release();
        assert!(session.is_closed());
        assert!(session.fields().is_empty());
        assert!(matches!(
            session.bind("a", "x"),
            Err(FormfillError::SessionState(_))
        ));
    }

    #[test]
    fn test_missing_template() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, calls) = session(&[]);
        let result = session.open(&dir.path().join("missing.docx"));
        assert!(matches!(result, Err(FormfillError::TemplateOpen(_))));
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_release_is_idempotent_and_runs_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, calls) = session(&[]);
        session.open(&template_file(dir.path())).unwrap();
        session.release();
        session.release();
        drop(session);
        assert_eq!(calls.borrow().iter().filter(|c| *c == "quit").count(), 1);

        let (mut dropped, calls) = self::session(&[]);
        dropped.open(&template_file(dir.path())).unwrap();
        drop(dropped);
        assert_eq!(calls.borrow().last().map(String::as_str), Some("quit"));
    }

    #[test]
    fn test_persist_failure_is_row_level() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _) = session(&[]);
        session.engine.fail_save = true;
        session.open(&template_file(dir.path())).unwrap();
        let err = session.persist(dir.path(), "a").unwrap_err();
        assert!(matches!(err, FormfillError::Persist(_)));
        assert!(err.is_row_level());
    }

    #[test]
    fn test_failed_rendition_removes_primary() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, calls) = session(&[]);
        session.engine.fail_rendition = true;
        session.open(&template_file(dir.path())).unwrap();

        let out = dir.path().join("out");
        let err = session.persist(&out, "계약서_홍길동").unwrap_err();
        assert!(matches!(err, FormfillError::Persist(_)));
        assert!(calls.borrow().iter().any(|c| c == "save 계약서_홍길동.docx"));
        assert!(!out.join("계약서_홍길동.docx").exists());
        assert!(!out.join("계약서_홍길동.pdf").exists());
    }

    #[test]
    fn test_persist_sanitizes_base_name() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _) = session(&[]);
        session.open(&template_file(dir.path())).unwrap();
        let written = session.persist(dir.path(), "a/b:c. ").unwrap();
        assert_eq!(written[0], dir.path().join("a_b_c.docx"));
    }

    #[test]
    fn test_matching_fields() {
        let fields: Vec<String> = ["a{{0}}", "a{{1}}", "ab{{0}}", "a{{x}}", "b"]
            .iter()
            .map(|f| (*f).to_owned())
            .collect();
        assert_eq!(matching_fields(&fields, "a"), vec!["a{{0}}", "a{{1}}"]);
        assert_eq!(matching_fields(&fields, "b"), vec!["b"]);
        assert!(matching_fields(&fields, "c").is_empty());
    }
}
