//! Minimal `.xlsx` reader.
//!
//! Reads only what the generator needs: sheet names, the active sheet, shared
//! strings, the number format of every cell style and the cell values
//! themselves. Formulas are not evaluated; their cached values are used.

use super::formats::builtin_format;
use super::grid::{CellValue, Grid, RawCell};
use crate::error::{FormfillError, Result};
use anyhow::{Context as _, anyhow};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use zip::ZipArchive;
use zip::result::ZipError;

#[derive(Debug, Default)]
struct WorkbookInfo {
    /// (sheet name, relationship id)
    sheets: Vec<(String, String)>,
    active_tab: usize,
    date1904: bool,
}

/// Names of the worksheets in workbook order.
///
/// # Errors
///
/// Fails with [`FormfillError::SourceRead`] when the file is not a readable workbook.
pub fn sheet_names(path: &Path) -> Result<Vec<String>> {
    let mut archive = open_archive(path)?;
    let info = read_workbook(&mut archive).map_err(source_error(path))?;
    Ok(info.sheets.into_iter().map(|(name, _)| name).collect())
}

/// Loads one worksheet into a [`Grid`]. `sheet` selects by name; `None`
/// selects the sheet that was active when the workbook was saved.
///
/// # Errors
///
/// Fails with [`FormfillError::SourceRead`] when the file cannot be opened,
/// is not a workbook, or has no sheet with the requested name.
pub fn load_grid(path: &Path, sheet: Option<&str>) -> Result<Grid> {
    let mut archive = open_archive(path)?;
    let info = read_workbook(&mut archive).map_err(source_error(path))?;

    let (name, rel_id) = match sheet {
        Some(wanted) => info
            .sheets
            .iter()
            .find(|(name, _)| name == wanted)
            .ok_or_else(|| {
                FormfillError::SourceRead(format!(
                    "sheet '{wanted}' not found in {}",
                    path.display()
                ))
            })?,
        None => info
            .sheets
            .get(info.active_tab)
            .or_else(|| info.sheets.first())
            .ok_or_else(|| {
                FormfillError::SourceRead(format!("{} contains no worksheets", path.display()))
            })?,
    };
    tracing::debug!("Reading sheet '{}' from {}", name, path.display());

    let mut load = || -> anyhow::Result<Grid> {
        let rels = read_part(&mut archive, "xl/_rels/workbook.xml.rels")?
            .map(|xml| parse_relationships(&xml))
            .transpose()?
            .unwrap_or_default();
        let target = rels
            .get(rel_id)
            .ok_or_else(|| anyhow!("no relationship target for sheet '{name}'"))?;
        let part = resolve_target(target);

        let shared = read_part(&mut archive, "xl/sharedStrings.xml")?
            .map(|xml| parse_shared_strings(&xml))
            .transpose()?
            .unwrap_or_default();
        let styles = read_part(&mut archive, "xl/styles.xml")?
            .map(|xml| parse_styles(&xml))
            .transpose()?
            .unwrap_or_default();
        let sheet_xml = read_part(&mut archive, &part)?
            .ok_or_else(|| anyhow!("worksheet part '{part}' is missing"))?;

        parse_sheet(&sheet_xml, &shared, &styles, info.date1904)
    };
    load().map_err(source_error(path))
}

fn open_archive(path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(path).map_err(|e| {
        FormfillError::SourceRead(format!("cannot open {}: {e}", path.display()))
    })?;
    ZipArchive::new(file).map_err(|e| {
        FormfillError::SourceRead(format!("{} is not an xlsx workbook: {e}", path.display()))
    })
}

fn source_error(path: &Path) -> impl Fn(anyhow::Error) -> FormfillError + '_ {
    move |e| FormfillError::SourceRead(format!("{}: {e:#}", path.display()))
}

fn read_part<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> anyhow::Result<Option<String>> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("failed to read part {name}")),
    };
    let mut content = String::new();
    file.read_to_string(&mut content)
        .with_context(|| format!("part {name} is not UTF-8 text"))?;
    Ok(Some(content))
}

fn read_workbook<R: Read + Seek>(archive: &mut ZipArchive<R>) -> anyhow::Result<WorkbookInfo> {
    let xml = read_part(archive, "xl/workbook.xml")?
        .ok_or_else(|| anyhow!("xl/workbook.xml is missing"))?;
    parse_workbook(&xml)
}

/// Worksheet targets are relative to `xl/` unless they start with `/`.
fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_owned(),
        None => format!("xl/{target}"),
    }
}

fn attr(e: &BytesStart<'_>, local: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == local.as_bytes())
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn parse_workbook(xml: &str) -> anyhow::Result<WorkbookInfo> {
    let mut reader = Reader::from_str(xml);
    let mut info = WorkbookInfo::default();
    loop {
        match reader.read_event().context("malformed workbook.xml")? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"sheet" => {
                    let name = attr(&e, "name").unwrap_or_default();
                    let id = attr(&e, "id").unwrap_or_default();
                    info.sheets.push((name, id));
                }
                b"workbookPr" => {
                    info.date1904 =
                        matches!(attr(&e, "date1904").as_deref(), Some("1" | "true"));
                }
                b"workbookView" => {
                    info.active_tab = attr(&e, "activeTab")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0);
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(info)
}

fn parse_relationships(xml: &str) -> anyhow::Result<HashMap<String, String>> {
    let mut reader = Reader::from_str(xml);
    let mut rels = HashMap::new();
    loop {
        match reader.read_event().context("malformed workbook relationships")? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) = (attr(&e, "Id"), attr(&e, "Target")) {
                    rels.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(rels)
}

/// Plain text of every `<si>` item; phonetic runs (`<rPh>`) are skipped.
fn parse_shared_strings(xml: &str) -> anyhow::Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_t = false;
    let mut phonetic_depth = 0_usize;
    loop {
        match reader.read_event().context("malformed sharedStrings.xml")? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_t = true,
                b"rPh" => phonetic_depth += 1,
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.push(std::mem::take(&mut current)),
                b"t" => in_t = false,
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Text(t) if in_t && phonetic_depth == 0 => {
                current.push_str(&t.unescape().context("bad text in shared string")?);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(strings)
}

/// Number format code of every cell style (`cellXfs`), indexed by style id.
fn parse_styles(xml: &str) -> anyhow::Result<Vec<Option<String>>> {
    let mut reader = Reader::from_str(xml);
    let mut custom: HashMap<u32, String> = HashMap::new();
    let mut xf_format_ids = Vec::new();
    let mut in_cell_xfs = false;
    loop {
        match reader.read_event().context("malformed styles.xml")? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"numFmt" => {
                    if let (Some(id), Some(code)) = (
                        attr(&e, "numFmtId").and_then(|v| v.parse().ok()),
                        attr(&e, "formatCode"),
                    ) {
                        custom.insert(id, code);
                    }
                }
                b"cellXfs" => in_cell_xfs = true,
                b"xf" if in_cell_xfs => {
                    let id: u32 = attr(&e, "numFmtId")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0);
                    xf_format_ids.push(id);
                }
                _ => {}
            },
            Event::End(e) if e.local_name().as_ref() == b"cellXfs" => in_cell_xfs = false,
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(xf_format_ids
        .into_iter()
        .map(|id| {
            custom
                .get(&id)
                .cloned()
                .or_else(|| builtin_format(id).map(str::to_owned))
        })
        .collect())
}

/// Splits an `A1` reference into 1-based (row, column).
fn parse_reference(reference: &str) -> Option<(u32, u32)> {
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty() {
        return None;
    }
    let column = letters.chars().try_fold(0_u32, |acc, c| {
        let c = c.to_ascii_uppercase();
        c.is_ascii_uppercase()
            .then(|| acc * 26 + (u32::from(c) - u32::from('A') + 1))
    })?;
    Some((digits.parse().ok()?, column))
}

#[derive(Default)]
struct PendingCell {
    row: u32,
    column: u32,
    kind: Option<String>,
    style: Option<usize>,
    text: String,
}

impl PendingCell {
    fn finish(self, shared: &[String], styles: &[Option<String>]) -> anyhow::Result<RawCell> {
        let value = match self.kind.as_deref() {
            Some("s") => {
                let idx: usize = self
                    .text
                    .trim()
                    .parse()
                    .with_context(|| format!("bad shared string index '{}'", self.text))?;
                CellValue::Text(
                    shared
                        .get(idx)
                        .cloned()
                        .ok_or_else(|| anyhow!("shared string {idx} out of range"))?,
                )
            }
            Some("inlineStr" | "str") => CellValue::Text(self.text),
            Some("b") => CellValue::Bool(self.text.trim() == "1"),
            Some("e") => CellValue::Error(self.text),
            Some("d") => CellValue::IsoDate(self.text),
            _ if self.text.is_empty() => CellValue::Empty,
            _ => match self.text.trim().parse::<f64>() {
                Ok(n) => CellValue::Number(n),
                Err(_) => CellValue::Text(self.text),
            },
        };
        let number_format = self
            .style
            .and_then(|s| styles.get(s).cloned().flatten());
        Ok(RawCell {
            value,
            number_format,
        })
    }
}

fn parse_sheet(
    xml: &str,
    shared: &[String],
    styles: &[Option<String>],
    date1904: bool,
) -> anyhow::Result<Grid> {
    let mut reader = Reader::from_str(xml);
    let mut grid = Grid::new(date1904);
    let mut row_number = 0_u32;
    let mut last_column = 0_u32;
    let mut cell: Option<PendingCell> = None;
    let mut capture = false;
    let mut phonetic_depth = 0_usize;

    loop {
        match reader.read_event().context("malformed worksheet")? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => {
                    row_number = attr(&e, "r")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(row_number + 1);
                    last_column = 0;
                }
                b"c" => {
                    let (row, column) = attr(&e, "r")
                        .and_then(|r| parse_reference(&r))
                        .unwrap_or((row_number, last_column + 1));
                    last_column = column;
                    cell = Some(PendingCell {
                        row,
                        column,
                        kind: attr(&e, "t"),
                        style: attr(&e, "s").and_then(|v| v.parse().ok()),
                        text: String::new(),
                    });
                }
                b"v" | b"t" => capture = cell.is_some(),
                b"rPh" => phonetic_depth += 1,
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"row" => {
                    row_number = attr(&e, "r")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(row_number + 1);
                }
                b"c" => {
                    last_column = attr(&e, "r")
                        .and_then(|r| parse_reference(&r))
                        .map_or(last_column + 1, |(_, c)| c);
                }
                _ => {}
            },
            Event::Text(t) if capture && phonetic_depth == 0 => {
                if let Some(pending) = cell.as_mut() {
                    pending.text.push_str(&t.unescape().context("bad cell text")?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => capture = false,
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                b"c" => {
                    if let Some(pending) = cell.take() {
                        let (row, column) = (pending.row, pending.column);
                        grid.set(row, column, pending.finish(shared, styles)?);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reference() {
        assert_eq!(parse_reference("A1"), Some((1, 1)));
        assert_eq!(parse_reference("AB12"), Some((12, 28)));
        assert_eq!(parse_reference("12"), None);
        assert_eq!(parse_reference("A"), None);
    }

    #[test]
    fn test_parse_styles_resolves_builtin_and_custom() {
        let xml = r#"<styleSheet>
            <numFmts count="1"><numFmt numFmtId="176" formatCode="yyyy/mm/dd/"/></numFmts>
            <cellStyleXfs count="1"><xf numFmtId="3"/></cellStyleXfs>
            <cellXfs count="3"><xf numFmtId="0"/><xf numFmtId="14"/><xf numFmtId="176"/></cellXfs>
        </styleSheet>"#;
        let styles = parse_styles(xml).unwrap();
        assert_eq!(styles.len(), 3);
        assert_eq!(styles[1].as_deref(), Some("mm-dd-yy"));
        assert_eq!(styles[2].as_deref(), Some("yyyy/mm/dd/"));
    }

    #[test]
    fn test_shared_strings_skip_phonetics() {
        let xml = r#"<sst><si><t>성명</t></si><si><r><t>홍</t></r><r><t>길동</t></r><rPh><t>x</t></rPh></si><si/></sst>"#;
        let strings = parse_shared_strings(xml).unwrap();
        assert_eq!(strings, vec!["성명", "홍길동", ""]);
    }

    #[test]
    fn test_parse_sheet_cell_kinds() {
        let xml = r#"<worksheet><sheetData>
            <row r="1"><c r="A1" t="s"><v>0</v></c><c r="C1" t="inlineStr"><is><t>금액</t></is></c></row>
            <row r="2"><c r="A2" s="1"><v>45658</v></c><c r="B2" t="b"><v>1</v></c><c r="C2"><v>1500000</v></c></row>
            <row r="4"><c r="A4" t="e"><v>#N/A</v></c><c r="B4" t="str"><v>계산</v></c></row>
        </sheetData></worksheet>"#;
        let shared = vec!["성명".to_owned()];
        let styles = vec![None, Some("mm-dd-yy".to_owned())];
        let grid = parse_sheet(xml, &shared, &styles, false).unwrap();

        let header = grid.row(1).unwrap();
        assert_eq!(header[0].value, CellValue::Text("성명".to_owned()));
        assert_eq!(header[1].value, CellValue::Empty);
        assert_eq!(header[2].value, CellValue::Text("금액".to_owned()));

        let data = grid.row(2).unwrap();
        assert_eq!(data[0].value, CellValue::Number(45658.0));
        assert_eq!(data[0].number_format.as_deref(), Some("mm-dd-yy"));
        assert_eq!(data[1].value, CellValue::Bool(true));
        assert_eq!(data[2].value, CellValue::Number(1_500_000.0));

        assert_eq!(grid.row(3), Some(&[][..]));
        let last = grid.row(4).unwrap();
        assert_eq!(last[0].value, CellValue::Error("#N/A".to_owned()));
        assert_eq!(last[1].value, CellValue::Text("계산".to_owned()));
    }

    #[test]
    fn test_parse_workbook_info() {
        let xml = r#"<workbook xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
            <workbookPr date1904="1"/>
            <bookViews><workbookView activeTab="1"/></bookViews>
            <sheets><sheet name="명단" sheetId="1" r:id="rId1"/><sheet name="계약" sheetId="2" r:id="rId2"/></sheets>
        </workbook>"#;
        let info = parse_workbook(xml).unwrap();
        assert!(info.date1904);
        assert_eq!(info.active_tab, 1);
        assert_eq!(info.sheets[1], ("계약".to_owned(), "rId2".to_owned()));
    }

    #[test]
    fn test_resolve_target() {
        assert_eq!(resolve_target("worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
        assert_eq!(resolve_target("/xl/worksheets/sheet2.xml"), "xl/worksheets/sheet2.xml");
    }
}
