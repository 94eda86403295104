//! Readers for delimited text and spreadsheet workbooks.
//!
//! Every cell comes out as a string. Type inference is the job builder's
//! concern, not the reader's.

use std::fmt::Display;
use std::io::Cursor;

use calamine::{Data, DataType, Ods, Range, Reader, Xls, Xlsb, Xlsx, open_workbook_auto_from_rs};
use tracing::{debug, warn};

use super::Table;
use crate::domain::errors::IngestError;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

const DELIMITERS: [u8; 3] = [b',', b';', b'\t'];

/// Text encodings tried for delimited input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Latin1,
}

/// Decode bytes as UTF-8 (BOM stripped), falling back to Latin-1.
pub fn decode_text(bytes: &[u8]) -> (String, TextEncoding) {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => (text.to_string(), TextEncoding::Utf8),
        Err(_) => (decode_latin1(bytes), TextEncoding::Latin1),
    }
}

/// Every byte maps to the code point of the same value.
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Pick the delimiter that occurs most often in the header line.
pub fn sniff_delimiter(text: &str) -> u8 {
    let header = text.lines().find(|line| !line.trim().is_empty()).unwrap_or("");
    DELIMITERS
        .iter()
        .copied()
        .max_by_key(|&d| {
            let hits = header.bytes().filter(|&b| b == d).count();
            // ties go to the earlier entry
            (hits, std::cmp::Reverse(DELIMITERS.iter().position(|&x| x == d)))
        })
        .filter(|&d| header.bytes().any(|b| b == d))
        .unwrap_or(b',')
}

pub fn read_delimited(file: &str, bytes: &[u8]) -> Result<Table, IngestError> {
    let (text, encoding) = decode_text(bytes);
    debug!(file, ?encoding, "decoded delimited upload");
    parse_delimited(file, &text)
}

/// Last-resort path for workbooks that no spreadsheet engine could open.
pub fn read_latin1_delimited(file: &str, bytes: &[u8]) -> Result<Table, IngestError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let text = decode_latin1(bytes);
    if text.contains('\0') {
        return Err(IngestError::Delimited {
            file: file.to_string(),
            reason: "content is binary".to_string(),
        });
    }
    parse_delimited(file, &text)
}

fn parse_delimited(file: &str, text: &str) -> Result<Table, IngestError> {
    let delimited_err = |reason: String| IngestError::Delimited {
        file: file.to_string(),
        reason,
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(text))
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| delimited_err(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| delimited_err(e.to_string()))?;
        let row: Vec<String> = record.iter().map(str::to_string).collect();
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        rows.push(row);
    }

    Table::new(file, headers, rows)
}

/// Workbook formats recognised by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkbookKind {
    Xlsx,
    Xlsb,
    Xls,
    Ods,
}

impl WorkbookKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "xlsx" | "xlsm" => Some(WorkbookKind::Xlsx),
            "xlsb" => Some(WorkbookKind::Xlsb),
            "xls" => Some(WorkbookKind::Xls),
            "ods" => Some(WorkbookKind::Ods),
            _ => None,
        }
    }
}

/// Read the first sheet of a workbook.
///
/// Tries the extension-specific engine, then content sniffing, then treats the
/// bytes as Latin-1 delimited text. Fails only when all three fail.
pub fn read_workbook(file: &str, bytes: &[u8], kind: WorkbookKind) -> Result<Table, IngestError> {
    let mut reasons = Vec::new();

    let primary = {
        let cursor = Cursor::new(bytes.to_vec());
        match kind {
            WorkbookKind::Xlsx => open_with::<Xlsx<_>>(cursor),
            WorkbookKind::Xlsb => open_with::<Xlsb<_>>(cursor),
            WorkbookKind::Xls => open_with::<Xls<_>>(cursor),
            WorkbookKind::Ods => open_with::<Ods<_>>(cursor),
        }
    };
    match primary {
        Ok(range) => return range_to_table(file, &range),
        Err(reason) => {
            warn!(file, ?kind, %reason, "primary workbook engine failed");
            reasons.push(format!("{kind:?}: {reason}"));
        }
    }

    match open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| e.to_string())
        .and_then(first_sheet)
    {
        Ok(range) => return range_to_table(file, &range),
        Err(reason) => {
            warn!(file, %reason, "auto-detected workbook engine failed");
            reasons.push(format!("auto: {reason}"));
        }
    }

    read_latin1_delimited(file, bytes).map_err(|e| {
        reasons.push(format!("latin-1 text: {e}"));
        IngestError::Workbook {
            file: file.to_string(),
            reason: reasons.join("; "),
        }
    })
}

fn open_with<R>(cursor: Cursor<Vec<u8>>) -> Result<Range<Data>, String>
where
    R: Reader<Cursor<Vec<u8>>>,
    R::Error: Display,
{
    let workbook = R::new(cursor).map_err(|e| e.to_string())?;
    first_sheet(workbook)
}

fn first_sheet<R>(mut workbook: R) -> Result<Range<Data>, String>
where
    R: Reader<Cursor<Vec<u8>>>,
    R::Error: Display,
{
    match workbook.worksheet_range_at(0) {
        Some(Ok(range)) => Ok(range),
        Some(Err(e)) => Err(e.to_string()),
        None => Err("workbook has no sheets".to_string()),
    }
}

fn range_to_table(file: &str, range: &Range<Data>) -> Result<Table, IngestError> {
    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .map(|cells| cells.iter().map(|c| render_cell(c).trim().to_string()).collect())
        .unwrap_or_default();

    let rows: Vec<Vec<String>> = rows
        .map(|cells| cells.iter().map(render_cell).collect::<Vec<_>>())
        .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
        .collect();

    Table::new(file, headers, rows)
}

/// Render one cell the way an operator would have typed it.
pub fn render_cell(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::DateTime(_) | Data::DateTimeIso(_) => cell
            .as_datetime()
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| cell.to_string()),
        other => other.to_string(),
    }
}
