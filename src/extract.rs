//! Content extraction: file bytes plus a declared type become plain UTF-8 text.
//!
//! Pure transform with no side effects. Supported kinds are the closed
//! [`FileKind`] set; anything else fails with
//! [`ExtractError::UnsupportedFormat`]. Input a parser cannot fully process,
//! including input over one of the safety limits below, fails with
//! [`ExtractError::CorruptFile`]. Nothing is ever truncated silently.
//!
//! Output is normalized: a leading BOM is removed and CRLF / CR line endings
//! become LF.

use std::io::Read;
use std::panic::{self, AssertUnwindSafe};

use quick_xml::events::Event;
use quick_xml::Reader;

use workspace_rag_core::error::ExtractError;
use workspace_rag_core::models::FileKind;

/// Maximum worksheets in an xlsx.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum non-empty cells per worksheet.
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Maximum decompressed bytes of a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn corrupt(e: impl std::fmt::Display) -> ExtractError {
    ExtractError::CorruptFile(e.to_string())
}

/// Parse the declared type tag, then extract.
pub fn extract_declared(bytes: &[u8], declared: &str) -> Result<String, ExtractError> {
    extract_text(bytes, FileKind::parse(declared)?)
}

/// Extract normalized plain text from `bytes` of the given kind.
pub fn extract_text(bytes: &[u8], kind: FileKind) -> Result<String, ExtractError> {
    let text = match kind {
        FileKind::Text | FileKind::Markdown => decode_utf8(bytes)?,
        FileKind::Csv => extract_delimited(bytes, b',')?,
        FileKind::Tsv => extract_delimited(bytes, b'\t')?,
        FileKind::Json => extract_json(bytes)?,
        FileKind::Pdf => extract_pdf(bytes)?,
        FileKind::Docx => extract_docx(bytes)?,
        FileKind::Pptx => extract_pptx(bytes)?,
        FileKind::Xlsx => extract_xlsx(bytes)?,
    };
    Ok(normalize(&text))
}

/// Strip a leading BOM and convert CRLF / CR line endings to LF.
pub fn normalize(text: &str) -> String {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    text.replace("\r\n", "\n").replace('\r', "\n")
}

fn decode_utf8(bytes: &[u8]) -> Result<String, ExtractError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| corrupt(format!("invalid UTF-8: {}", e)))?;
    Ok(text.strip_prefix('\u{feff}').unwrap_or(text).to_string())
}

// ============ Delimited text ============

/// One block per record, one `column: value` line per non-empty cell.
fn extract_delimited(bytes: &[u8], delimiter: u8) -> Result<String, ExtractError> {
    let text = decode_utf8(bytes)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(corrupt)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut blocks = Vec::new();
    for record in reader.records() {
        let record = record.map_err(corrupt)?;
        let lines: Vec<String> = record
            .iter()
            .enumerate()
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(i, value)| {
                let column = headers
                    .get(i)
                    .filter(|h| !h.is_empty())
                    .cloned()
                    .unwrap_or_else(|| format!("column {}", i + 1));
                format!("{}: {}", column, value.trim())
            })
            .collect();
        if !lines.is_empty() {
            blocks.push(lines.join("\n"));
        }
    }

    if blocks.is_empty() {
        // Header-only files still carry their column names.
        return Ok(headers.join(" "));
    }
    Ok(blocks.join("\n\n"))
}

// ============ JSON ============

fn extract_json(bytes: &[u8]) -> Result<String, ExtractError> {
    let text = decode_utf8(bytes)?;
    let value: serde_json::Value = serde_json::from_str(&text).map_err(corrupt)?;
    serde_json::to_string_pretty(&value).map_err(corrupt)
}

// ============ PDF ============

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    // pdf-extract panics on some malformed inputs.
    match panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem(bytes)
    })) {
        Ok(result) => result.map_err(corrupt),
        Err(_) => Err(corrupt("PDF parser aborted on malformed input")),
    }
}

// ============ OOXML ============

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(corrupt)
}

fn read_zip_entry_bounded(
    archive: &mut Archive<'_>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| corrupt(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(corrupt)?;
    if out.len() as u64 >= max_bytes {
        return Err(corrupt(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

/// Entry names `{prefix}{n}.xml`, ordered by `n`.
fn numbered_entries(archive: &Archive<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
    extract_runs(&xml)
}

fn extract_pptx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let slides = numbered_entries(&archive, "ppt/slides/slide");
    if slides.is_empty() {
        return Err(corrupt("presentation has no slides"));
    }

    let mut parts = Vec::new();
    for name in slides {
        let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        let text = extract_runs(&xml)?;
        if !text.is_empty() {
            parts.push(text);
        }
    }
    Ok(parts.join("\n\n"))
}

/// Text of `<t>` runs (`w:t` in Word, `a:t` in DrawingML). Paragraph ends
/// (`<p>`) and explicit breaks become newlines, tabs become `\t`.
fn extract_runs(xml: &[u8]) -> Result<String, ExtractError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut in_t = false;

    loop {
        match reader.read_event_into(&mut buf).map_err(corrupt)? {
            Event::Start(e) if e.local_name().as_ref() == b"t" => in_t = true,
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"p" => {
                    if !out.is_empty() && !out.ends_with('\n') {
                        out.push('\n');
                    }
                }
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" => out.push('\t'),
                b"br" | b"cr" => out.push('\n'),
                _ => {}
            },
            Event::Text(te) if in_t => out.push_str(&te.unescape().map_err(corrupt)?),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(out.trim_end().to_string())
}

fn extract_xlsx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let shared_strings = read_shared_strings(&mut archive)?;
    let sheets = numbered_entries(&archive, "xl/worksheets/sheet");
    if sheets.len() > XLSX_MAX_SHEETS {
        return Err(corrupt(format!(
            "workbook has {} sheets, limit is {}",
            sheets.len(),
            XLSX_MAX_SHEETS
        )));
    }

    let mut parts = Vec::new();
    for name in sheets {
        let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        let cells = extract_sheet_cells(&xml, &shared_strings)?;
        if !cells.is_empty() {
            parts.push(cells.join(" "));
        }
    }
    Ok(parts.join("\n"))
}

fn read_shared_strings(archive: &mut Archive<'_>) -> Result<Vec<String>, ExtractError> {
    const SHARED: &str = "xl/sharedStrings.xml";
    if !archive.file_names().any(|n| n == SHARED) {
        return Ok(Vec::new());
    }
    let xml = read_zip_entry_bounded(archive, SHARED, MAX_XML_ENTRY_BYTES)?;

    let mut reader = Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_t = false;

    loop {
        match reader.read_event_into(&mut buf).map_err(corrupt)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_t = true,
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.push(std::mem::take(&mut current)),
                b"t" => in_t = false,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Text(te) if in_t => current.push_str(&te.unescape().map_err(corrupt)?),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum CellType {
    Shared,
    Inline,
    Literal,
}

fn extract_sheet_cells(xml: &[u8], shared_strings: &[String]) -> Result<Vec<String>, ExtractError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut cells: Vec<String> = Vec::new();
    let mut cell_type = CellType::Literal;
    let mut in_value = false;
    let mut value = String::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(corrupt)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"c" => {
                    value.clear();
                    cell_type = CellType::Literal;
                    for attr in e.attributes() {
                        let attr = attr.map_err(corrupt)?;
                        if attr.key.local_name().as_ref() == b"t" {
                            cell_type = match attr.value.as_ref() {
                                b"s" => CellType::Shared,
                                b"inlineStr" => CellType::Inline,
                                _ => CellType::Literal,
                            };
                        }
                    }
                }
                b"v" => in_value = cell_type != CellType::Inline,
                b"t" => in_value = cell_type == CellType::Inline,
                _ => {}
            },
            Event::Text(te) if in_value => value.push_str(&te.unescape().map_err(corrupt)?),
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    let raw = value.trim();
                    if !raw.is_empty() {
                        let text = match cell_type {
                            CellType::Shared => {
                                let idx: usize = raw.parse().map_err(|_| {
                                    corrupt(format!("invalid shared string index: {}", raw))
                                })?;
                                shared_strings.get(idx).cloned().ok_or_else(|| {
                                    corrupt(format!("shared string index {} out of range", idx))
                                })?
                            }
                            CellType::Inline | CellType::Literal => raw.to_string(),
                        };
                        if cells.len() >= XLSX_MAX_CELLS_PER_SHEET {
                            return Err(corrupt(format!(
                                "sheet exceeds {} cells",
                                XLSX_MAX_CELLS_PER_SHEET
                            )));
                        }
                        cells.push(text);
                    }
                    value.clear();
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(cells)
}
