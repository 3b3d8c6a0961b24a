//! `.docx` engine built on `zip` and `quick-xml`.
//!
//! Placeholders are content controls (`w:sdt`) named by their tag, or by their
//! alias when the tag is missing. A name can occur several times; occurrence
//! `k` of name `n` is exposed as `n{{k}}`, counting through the document body
//! first and then the header and footer parts in part-name order.
//!
//! Bound values are kept in memory and written into a fresh copy of the
//! template on every save, so the template itself is never modified. The PDF
//! rendition is produced by an external converter (LibreOffice by default).

use anyhow::{Context as _, Result, bail};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Cursor, Read as _, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::{DocumentEngine, SaveFormat};

const MAIN_PART: &str = "word/document.xml";

/// External converter used for the fixed-layout rendition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenditionOptions {
    /// Executable invoked as `<command> --headless --convert-to pdf --outdir <dir> <file>`
    #[serde(default = "default_command")]
    pub command: String,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for RenditionOptions {
    fn default() -> Self {
        Self {
            command: default_command(),
            enabled: default_true(),
        }
    }
}

impl RenditionOptions {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

fn default_command() -> String {
    if cfg!(target_os = "windows") {
        "soffice.exe".to_owned()
    } else {
        "soffice".to_owned()
    }
}

fn default_true() -> bool {
    true
}

/// Name of occurrence `index` of placeholder `base`.
pub fn field_name(base: &str, index: usize) -> String {
    format!("{base}{{{{{index}}}}}")
}

struct Entry {
    name: String,
    data: Vec<u8>,
    is_dir: bool,
}

struct Template {
    path: PathBuf,
    entries: Vec<Entry>,
    /// Indices into `entries` of the parts scanned for placeholders, in scan order
    parts: Vec<usize>,
    fields: Vec<String>,
}

pub struct DocxEngine {
    rendition: RenditionOptions,
    template: Option<Template>,
    bindings: BTreeMap<String, String>,
}

impl DocxEngine {
    pub fn new(rendition: RenditionOptions) -> Self {
        Self {
            rendition,
            template: None,
            bindings: BTreeMap::new(),
        }
    }

    fn template(&self) -> Result<&Template> {
        self.template
            .as_ref()
            .context("no template is open in the docx engine")
    }

    /// The template with every binding applied, as `.docx` bytes.
    fn render(&self) -> Result<Vec<u8>> {
        let template = self.template()?;
        let mut counters = BTreeMap::new();
        let mut rewritten = BTreeMap::new();
        for &index in &template.parts {
            let entry = &template.entries[index];
            let xml = rewrite_part(&entry.data, &self.bindings, &mut counters, &mut Vec::new())
                .with_context(|| format!("failed to fill {}", entry.name))?;
            rewritten.insert(index, xml);
        }

        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (index, entry) in template.entries.iter().enumerate() {
            if entry.is_dir {
                zip.add_directory(entry.name.as_str(), options)?;
                continue;
            }
            zip.start_file(entry.name.as_str(), options)?;
            let data = rewritten.get(&index).unwrap_or(&entry.data);
            zip.write_all(data)?;
        }
        Ok(zip.finish()?.into_inner())
    }
}

impl DocumentEngine for DocxEngine {
    fn open(&mut self, template: &Path) -> Result<Vec<String>> {
        let loaded = load_template(template)?;
        tracing::info!(
            "Opened template {} with {} placeholders",
            loaded.path.display(),
            loaded.fields.len()
        );
        let fields = loaded.fields.clone();
        self.template = Some(loaded);
        self.bindings.clear();
        Ok(fields)
    }

    fn put_field_text(&mut self, field: &str, value: &str) -> Result<()> {
        let template = self.template()?;
        if !template.fields.iter().any(|f| f == field) {
            bail!("template has no placeholder '{field}'");
        }
        self.bindings.insert(field.to_owned(), value.to_owned());
        Ok(())
    }

    fn save_as(&mut self, path: &Path, format: SaveFormat) -> Result<()> {
        let document = self.render()?;
        match format {
            SaveFormat::Primary => std::fs::write(path, document)
                .with_context(|| format!("failed to write {}", path.display())),
            SaveFormat::Rendition => {
                if !self.rendition.enabled {
                    bail!("renditions are disabled");
                }
                convert_to_pdf(&self.rendition.command, &document, path)
            }
        }
    }

    fn primary_extension(&self) -> &str {
        "docx"
    }

    fn rendition_extension(&self) -> Option<&str> {
        self.rendition.enabled.then_some("pdf")
    }

    fn quit(&mut self) {
        if let Some(template) = self.template.take() {
            tracing::debug!("Closed template {}", template.path.display());
        }
        self.bindings.clear();
    }
}

fn load_template(path: &Path) -> Result<Template> {
    let file =
        File::open(path).with_context(|| format!("cannot open template {}", path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("{} is not a docx document", path.display()))?;

    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        let mut data = Vec::new();
        let is_dir = file.is_dir();
        if !is_dir {
            file.read_to_end(&mut data)
                .with_context(|| format!("failed to read {}", file.name()))?;
        }
        entries.push(Entry {
            name: file.name().to_owned(),
            data,
            is_dir,
        });
    }

    let parts = content_parts(&entries);
    if parts.first().is_none_or(|&i| entries[i].name != MAIN_PART) {
        bail!("{} has no {MAIN_PART}", path.display());
    }

    let mut counters = BTreeMap::new();
    let mut fields = Vec::new();
    for &index in &parts {
        let entry = &entries[index];
        rewrite_part(&entry.data, &BTreeMap::new(), &mut counters, &mut fields)
            .with_context(|| format!("failed to parse {}", entry.name))?;
    }

    Ok(Template {
        path: path.to_path_buf(),
        entries,
        parts,
        fields,
    })
}

/// The main document part, then headers and footers sorted by part name.
fn content_parts(entries: &[Entry]) -> Vec<usize> {
    let is_margin_part = |name: &str| {
        name.strip_prefix("word/").is_some_and(|rest| {
            (rest.starts_with("header") || rest.starts_with("footer"))
                && rest.ends_with(".xml")
                && !rest.contains('/')
        })
    };
    let mut margins: Vec<(&str, usize)> = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| is_margin_part(&e.name))
        .map(|(i, e)| (e.name.as_str(), i))
        .collect();
    margins.sort_unstable();

    entries
        .iter()
        .position(|e| e.name == MAIN_PART)
        .into_iter()
        .chain(margins.into_iter().map(|(_, i)| i))
        .collect()
}

fn convert_to_pdf(command: &str, document: &[u8], target: &Path) -> Result<()> {
    let staging = tempfile::tempdir().context("failed to create a staging directory")?;
    let source = staging.path().join("render.docx");
    std::fs::write(&source, document).context("failed to stage document for conversion")?;

    tracing::debug!("Running {} for {}", command, target.display());
    let output = Command::new(command)
        .arg("--headless")
        .arg("--convert-to")
        .arg("pdf")
        .arg("--outdir")
        .arg(staging.path())
        .arg(&source)
        .output()
        .with_context(|| format!("failed to run '{command}'"))?;

    if !output.status.success() {
        bail!(
            "'{command}' exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let produced = staging.path().join("render.pdf");
    if !produced.exists() {
        bail!("'{command}' finished without producing a PDF");
    }
    std::fs::copy(&produced, target)
        .with_context(|| format!("failed to write {}", target.display()))?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Start,
    Empty,
    End,
    Text,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Sdt,
    SdtPr,
    SdtContent,
    FieldTag,
    Alias,
    ShowingPlaceholder,
    Text,
    Paragraph,
    Other,
}

fn classify(event: &Event<'_>) -> (Kind, Tag) {
    let (kind, name) = match event {
        Event::Start(e) => (Kind::Start, e.name()),
        Event::Empty(e) => (Kind::Empty, e.name()),
        Event::End(e) => (Kind::End, e.name()),
        Event::Text(_) | Event::CData(_) => return (Kind::Text, Tag::Other),
        _ => return (Kind::Other, Tag::Other),
    };
    let tag = match name.as_ref() {
        b"w:sdt" => Tag::Sdt,
        b"w:sdtPr" => Tag::SdtPr,
        b"w:sdtContent" => Tag::SdtContent,
        b"w:tag" => Tag::FieldTag,
        b"w:alias" => Tag::Alias,
        b"w:showingPlcHdr" => Tag::ShowingPlaceholder,
        b"w:t" => Tag::Text,
        b"w:p" => Tag::Paragraph,
        _ => Tag::Other,
    };
    (kind, tag)
}

fn val_attribute(event: &Event<'_>) -> Option<String> {
    let (Event::Start(e) | Event::Empty(e)) = event else {
        return None;
    };
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == b"val")
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// State of one open `w:sdt` element.
#[derive(Default)]
struct Frame {
    tag: Option<String>,
    alias: Option<String>,
    in_properties: bool,
    in_content: bool,
    /// Bound value of this occurrence, if any
    value: Option<String>,
    filled: bool,
    /// `w:sdtPr` children, held until the name is known
    buffered: Vec<Event<'static>>,
}

impl Frame {
    fn assign_name(
        &mut self,
        bindings: &BTreeMap<String, String>,
        counters: &mut BTreeMap<String, usize>,
        found: &mut Vec<String>,
    ) {
        let Some(base) = self.tag.take().or_else(|| self.alias.take()) else {
            return;
        };
        let next = counters.entry(base.clone()).or_insert(0);
        let name = field_name(&base, *next);
        *next += 1;
        self.value = bindings.get(&name).cloned();
        found.push(name);
    }

    /// The bound value, the first time it is asked for inside the content.
    fn take_unfilled(&mut self) -> Option<String> {
        if !self.in_content || self.filled {
            return None;
        }
        let value = self.value.clone()?;
        self.filled = true;
        Some(value)
    }

    fn replaces_text(&self) -> bool {
        self.in_content && self.value.is_some()
    }
}

/// Streams one part, collecting placeholder names into `found` and writing
/// bound values into their controls.
///
/// A bound control keeps its run formatting: the value goes into its first
/// `w:t`, later `w:t` elements are dropped, and a run is added when the
/// control has no text at all. Its `w:showingPlcHdr` marker is removed.
fn rewrite_part(
    xml: &[u8],
    bindings: &BTreeMap<String, String>,
    counters: &mut BTreeMap<String, usize>,
    found: &mut Vec<String>,
) -> Result<Vec<u8>> {
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut frames: Vec<Frame> = Vec::new();
    let mut skipping_text = false;

    loop {
        let event = reader.read_event().context("malformed document XML")?;
        if matches!(event, Event::Eof) {
            break;
        }
        let (kind, tag) = classify(&event);

        if skipping_text {
            if (kind, tag) == (Kind::End, Tag::Text) {
                skipping_text = false;
            }
            continue;
        }

        if let Some(frame) = frames.last_mut().filter(|f| f.in_properties) {
            match (kind, tag) {
                (Kind::End, Tag::SdtPr) => {
                    frame.in_properties = false;
                    frame.assign_name(bindings, counters, found);
                    let bound = frame.value.is_some();
                    for buffered in frame.buffered.drain(..) {
                        if bound && classify(&buffered).1 == Tag::ShowingPlaceholder {
                            continue;
                        }
                        writer.write_event(buffered)?;
                    }
                    writer.write_event(event)?;
                }
                (Kind::Start | Kind::Empty, Tag::FieldTag) => {
                    frame.tag = val_attribute(&event);
                    frame.buffered.push(event.into_owned());
                }
                (Kind::Start | Kind::Empty, Tag::Alias) => {
                    frame.alias = val_attribute(&event);
                    frame.buffered.push(event.into_owned());
                }
                _ => frame.buffered.push(event.into_owned()),
            }
            continue;
        }

        match (kind, tag) {
            (Kind::Start, Tag::Sdt) => frames.push(Frame::default()),
            (Kind::End, Tag::Sdt) => {
                frames.pop();
            }
            (Kind::Start, Tag::SdtPr) => {
                if let Some(frame) = frames.last_mut() {
                    frame.in_properties = true;
                }
            }
            (Kind::Start, Tag::SdtContent) => {
                if let Some(frame) = frames.last_mut() {
                    frame.in_content = true;
                }
            }
            (Kind::Start | Kind::Empty, Tag::Text)
                if frames.last().is_some_and(Frame::replaces_text) =>
            {
                if let Some(value) = frames.last_mut().and_then(Frame::take_unfilled) {
                    write_text(&mut writer, &value)?;
                }
                skipping_text = kind == Kind::Start;
                continue;
            }
            (Kind::End, Tag::Paragraph | Tag::SdtContent) => {
                if let Some(value) = frames.last_mut().and_then(Frame::take_unfilled) {
                    writer.write_event(Event::Start(BytesStart::new("w:r")))?;
                    write_text(&mut writer, &value)?;
                    writer.write_event(Event::End(BytesEnd::new("w:r")))?;
                }
                if tag == Tag::SdtContent
                    && let Some(frame) = frames.last_mut()
                {
                    frame.in_content = false;
                }
            }
            _ => {}
        }
        writer.write_event(event)?;
    }

    Ok(writer.into_inner())
}

/// Writes `value` as `w:t` elements, turning line breaks into `w:br`.
fn write_text<W: Write>(writer: &mut Writer<W>, value: &str) -> Result<()> {
    for (index, line) in value.split('\n').enumerate() {
        if index > 0 {
            writer.write_event(Event::Empty(BytesStart::new("w:br")))?;
        }
        let start = BytesStart::new("w:t").with_attributes([("xml:space", "preserve")]);
        writer.write_event(Event::Start(start))?;
        writer.write_event(Event::Text(BytesText::new(line.trim_end_matches('\r'))))?;
        writer.write_event(Event::End(BytesEnd::new("w:t")))?;
    }
    Ok(())
}
