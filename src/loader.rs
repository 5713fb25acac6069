//! Table loading from uploaded bytes.
//!
//! Supported formats, picked by file extension:
//!
//! | Extension | Reader |
//! |-----------|--------|
//! | `.csv` | `csv`, comma separated |
//! | `.tsv`, `.tab` | `csv`, tab separated |
//! | `.txt` | `csv`, delimiter sniffed from the header line |
//! | `.xlsx` | first worksheet of the OOXML workbook |
//!
//! The first row is the header. Cells matching a missing-value marker
//! (see [`NA_VALUES`]) load as nulls. A column whose non-null cells all
//! parse as numbers is loaded as numbers; any other column keeps its cells
//! as text (XLSX cells keep their stored type). Blank headers become
//! `Unnamed: {i}`; repeated headers get `.1`, `.2`, … suffixes.
//!
//! Everything is parsed from memory; nothing is written to disk.

use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read};
use std::path::Path;

use chrono::NaiveDate;
use mdna_core::table::{format_number, Table, Value};
use thiserror::Error;
use tracing::debug;

/// Cell texts treated as missing.
pub const NA_VALUES: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Cells read from one worksheet before giving up.
const XLSX_MAX_CELLS: usize = 1_000_000;
/// Worksheet bounds of the OOXML format (`XFD1048576`).
const XLSX_MAX_ROWS: usize = 1_048_576;
const XLSX_MAX_COLUMNS: usize = 16_384;
/// Maximum decompressed bytes read from a single ZIP entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to parse {format} data: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Tsv,
    Text,
    Xlsx,
}

impl FileFormat {
    /// Resolve a format from a file name (or a bare extension).
    pub fn from_name(name: &str) -> Result<Self, LoadError> {
        let ext = match name.rsplit_once('.') {
            Some((_, ext)) => ext,
            None => name,
        }
        .to_ascii_lowercase();

        match ext.as_str() {
            "csv" => Ok(FileFormat::Csv),
            "tsv" | "tab" => Ok(FileFormat::Tsv),
            "txt" => Ok(FileFormat::Text),
            "xlsx" | "xlsm" => Ok(FileFormat::Xlsx),
            "xls" => Err(LoadError::UnsupportedFormat(
                "legacy .xls workbooks are not supported; save the file as .xlsx or .csv".to_string(),
            )),
            _ => Err(LoadError::UnsupportedFormat(format!(
                "'{}' (expected .csv, .tsv, .txt or .xlsx)",
                name
            ))),
        }
    }

    fn label(self) -> &'static str {
        match self {
            FileFormat::Csv => "CSV",
            FileFormat::Tsv => "TSV",
            FileFormat::Text => "text",
            FileFormat::Xlsx => "XLSX",
        }
    }
}

/// Parse `bytes` as the format named by `format_hint` (a file name or extension).
pub fn load_table(bytes: &[u8], format_hint: &str) -> Result<Table, LoadError> {
    let format = FileFormat::from_name(format_hint)?;
    let table = match format {
        FileFormat::Csv => parse_delimited(bytes, b',', format)?,
        FileFormat::Tsv => parse_delimited(bytes, b'\t', format)?,
        FileFormat::Text => parse_delimited(bytes, sniff_delimiter(bytes), format)?,
        FileFormat::Xlsx => parse_xlsx(bytes)?,
    };
    debug!(
        format = format.label(),
        rows = table.len(),
        columns = table.columns().len(),
        "table loaded"
    );
    Ok(table)
}

/// Read a file from disk and parse it by its extension.
pub fn load_path(path: &Path) -> Result<Table, LoadError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    // Reject by extension before touching the file.
    FileFormat::from_name(&name)?;
    let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_table(&bytes, &name)
}

/// A cell before column typing.
#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Missing,
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

impl Cell {
    fn from_text(s: &str) -> Cell {
        let s = s.trim();
        if NA_VALUES.contains(&s) {
            Cell::Missing
        } else {
            Cell::Text(s.to_string())
        }
    }

    fn header_label(&self) -> Option<String> {
        match self {
            Cell::Missing => None,
            Cell::Text(s) if s.is_empty() => None,
            Cell::Text(s) => Some(s.clone()),
            Cell::Number(n) => Some(format_number(*n)),
            Cell::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
        }
    }

    fn number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            Cell::Text(s) => s.parse::<f64>().ok(),
            _ => None,
        }
    }
}

fn parse_error(format: FileFormat, message: impl Into<String>) -> LoadError {
    LoadError::Parse {
        format: format.label(),
        message: message.into(),
    }
}

fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let first_line = bytes.split(|b| *b == b'\n').next().unwrap_or_default();
    [b'\t', b';', b'|']
        .into_iter()
        .find(|d| first_line.contains(d))
        .unwrap_or(b',')
}

fn parse_delimited(bytes: &[u8], delimiter: u8, format: FileFormat) -> Result<Table, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| parse_error(format, e.to_string()))?
        .clone();
    if headers.is_empty() || (headers.len() == 1 && headers[0].trim().is_empty()) {
        return Err(parse_error(format, "no columns to parse from file"));
    }

    let header_cells: Vec<Cell> = headers.iter().map(|h| Cell::Text(h.trim().to_string())).collect();
    let width = header_cells.len();

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| parse_error(format, e.to_string()))?;
        if record.len() > width {
            // +2: one for the header line, one for 1-based numbering.
            return Err(parse_error(
                format,
                format!(
                    "line {}: expected {} fields, saw {}",
                    idx + 2,
                    width,
                    record.len()
                ),
            ));
        }
        let mut row: Vec<Cell> = record.iter().map(Cell::from_text).collect();
        row.resize(width, Cell::Missing);
        rows.push(row);
    }

    build_table(&header_cells, rows, format)
}

/// Name columns, drop blank rows and type each column.
fn build_table(header: &[Cell], rows: Vec<Vec<Cell>>, format: FileFormat) -> Result<Table, LoadError> {
    let columns = column_names(header);
    let width = columns.len();

    let rows: Vec<Vec<Cell>> = rows
        .into_iter()
        .filter(|r| r.iter().any(|c| *c != Cell::Missing))
        .map(|mut r| {
            r.resize(width, Cell::Missing);
            r
        })
        .collect();

    let numeric: Vec<bool> = (0..width)
        .map(|col| {
            rows.iter()
                .map(|r| &r[col])
                .filter(|c| **c != Cell::Missing)
                .all(|c| c.number().is_some())
        })
        .collect();

    let values: Vec<Vec<Value>> = rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .zip(&numeric)
                .map(|(cell, is_numeric)| match cell {
                    Cell::Missing => Value::Null,
                    c if *is_numeric => c.number().map(Value::Number).unwrap_or(Value::Null),
                    Cell::Number(n) => Value::Number(n),
                    Cell::Date(d) => Value::Date(d),
                    Cell::Text(s) => Value::Text(s),
                })
                .collect::<Vec<Value>>()
        })
        .collect();

    Table::new(columns, values).map_err(|e| parse_error(format, e.to_string()))
}

fn column_names(header: &[Cell]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut names = Vec::with_capacity(header.len());

    for (i, cell) in header.iter().enumerate() {
        let base = cell
            .header_label()
            .unwrap_or_else(|| format!("Unnamed: {}", i));
        let mut name = base.clone();
        while seen.contains(&name) {
            let n = counts.entry(base.clone()).or_insert(0);
            *n += 1;
            name = format!("{}.{}", base, n);
        }
        seen.insert(name.clone());
        names.push(name);
    }
    names
}

// ============ XLSX ============

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

fn xlsx_error(message: impl std::fmt::Display) -> LoadError {
    parse_error(FileFormat::Xlsx, message.to_string())
}

fn parse_xlsx(bytes: &[u8]) -> Result<Table, LoadError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(xlsx_error)?;
    let shared_strings = read_shared_strings(&mut archive)?;
    let date_styles = read_date_styles(&mut archive)?;

    let sheet = first_worksheet_name(&archive)
        .ok_or_else(|| xlsx_error("workbook contains no worksheets"))?;
    let xml = read_zip_entry_bounded(&mut archive, &sheet, MAX_XML_ENTRY_BYTES)?;
    let mut grid = read_sheet_cells(&xml, &shared_strings, &date_styles)?;

    grid.retain(|r| r.iter().any(|c| *c != Cell::Missing));
    if grid.is_empty() {
        return Err(xlsx_error("no columns to parse from file"));
    }
    let header = grid.remove(0);
    build_table(&header, grid, FileFormat::Xlsx)
}

fn read_zip_entry_bounded(
    archive: &mut Archive<'_>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, LoadError> {
    let entry = archive.by_name(name).map_err(xlsx_error)?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(xlsx_error)?;
    if out.len() as u64 >= max_bytes {
        return Err(xlsx_error(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn first_worksheet_name(archive: &Archive<'_>) -> Option<String> {
    archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .min_by_key(|name| {
            name.trim_start_matches("xl/worksheets/sheet")
                .trim_end_matches(".xml")
                .parse::<u32>()
                .unwrap_or(u32::MAX)
        })
        .map(|s| s.to_string())
}

fn read_shared_strings(archive: &mut Archive<'_>) -> Result<Vec<String>, LoadError> {
    if archive.index_for_name("xl/sharedStrings.xml").is_none() {
        return Ok(Vec::new());
    }
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES)?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(te)) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&te.unescape().map_err(xlsx_error)?);
                }
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"si" => strings.push(current.take().unwrap_or_default()),
                b"t" => in_t = false,
                _ => {}
            },
            Ok(quick_xml::events::Event::Empty(e)) if e.local_name().as_ref() == b"si" => {
                strings.push(String::new());
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(xlsx_error(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Indices into `cellXfs` whose number format displays a date.
fn read_date_styles(archive: &mut Archive<'_>) -> Result<HashSet<usize>, LoadError> {
    if archive.index_for_name("xl/styles.xml").is_none() {
        return Ok(HashSet::new());
    }
    let xml = read_zip_entry_bounded(archive, "xl/styles.xml", MAX_XML_ENTRY_BYTES)?;
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();

    let mut custom_formats: HashMap<u32, String> = HashMap::new();
    let mut xf_formats: Vec<u32> = Vec::new();
    let mut in_cell_xfs = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) | Ok(quick_xml::events::Event::Empty(e)) => {
                match e.local_name().as_ref() {
                    b"numFmt" => {
                        let id = attr(&e, b"numFmtId").and_then(|v| v.parse().ok());
                        let code = attr(&e, b"formatCode");
                        if let (Some(id), Some(code)) = (id, code) {
                            custom_formats.insert(id, code);
                        }
                    }
                    b"cellXfs" => in_cell_xfs = true,
                    b"xf" if in_cell_xfs => {
                        let id = attr(&e, b"numFmtId")
                            .and_then(|v| v.parse().ok())
                            .unwrap_or(0);
                        xf_formats.push(id);
                    }
                    _ => {}
                }
            }
            Ok(quick_xml::events::Event::End(e)) if e.local_name().as_ref() == b"cellXfs" => {
                in_cell_xfs = false;
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(xlsx_error(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(xf_formats
        .iter()
        .enumerate()
        .filter(|(_, id)| is_date_format(**id, custom_formats.get(id).map(String::as_str)))
        .map(|(i, _)| i)
        .collect())
}

fn is_date_format(id: u32, custom: Option<&str>) -> bool {
    match custom {
        None => matches!(id, 14..=22 | 27..=36 | 45..=47 | 50..=58),
        Some(code) => {
            // Ignore quoted literals and bracketed sections such as [Red] or [$-409].
            let mut plain = String::new();
            let mut in_quote = false;
            let mut in_bracket = false;
            for c in code.chars() {
                match c {
                    '"' => in_quote = !in_quote,
                    '[' if !in_quote => in_bracket = true,
                    ']' if !in_quote => in_bracket = false,
                    _ if !in_quote && !in_bracket => plain.push(c.to_ascii_lowercase()),
                    _ => {}
                }
            }
            plain.contains('d') || plain.contains('y')
        }
    }
}

fn attr(e: &quick_xml::events::BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Zero-based column of an `A1`-style reference.
fn column_of(reference: &str) -> Option<usize> {
    let letters: Vec<u8> = reference
        .bytes()
        .take_while(u8::is_ascii_alphabetic)
        .map(|b| b.to_ascii_uppercase())
        .collect();
    if letters.is_empty() {
        return None;
    }
    let n = letters.iter().try_fold(0usize, |acc, b| {
        acc.checked_mul(26)?.checked_add((b - b'A' + 1) as usize)
    })?;
    Some(n - 1)
}

/// Row index from a `<row r>` attribute, or the next row when absent.
fn row_index(e: &quick_xml::events::BytesStart<'_>, next_row: usize) -> Result<usize, LoadError> {
    let row = match attr(e, b"r") {
        Some(r) => r
            .parse::<usize>()
            .ok()
            .filter(|r| (1..=XLSX_MAX_ROWS).contains(r))
            .ok_or_else(|| xlsx_error(format!("invalid row number '{}'", r)))?
            - 1,
        None => next_row,
    };
    if row >= XLSX_MAX_ROWS {
        return Err(xlsx_error(format!("worksheet has more than {} rows", XLSX_MAX_ROWS)));
    }
    Ok(row)
}

/// Column index from a `<c r>` attribute, or the next column when absent.
fn cell_column(
    e: &quick_xml::events::BytesStart<'_>,
    next_column: usize,
) -> Result<usize, LoadError> {
    let column = match attr(e, b"r") {
        Some(r) => column_of(&r)
            .filter(|c| *c < XLSX_MAX_COLUMNS)
            .ok_or_else(|| xlsx_error(format!("invalid cell reference '{}'", r)))?,
        None => next_column,
    };
    if column >= XLSX_MAX_COLUMNS {
        return Err(xlsx_error(format!(
            "worksheet has more than {} columns",
            XLSX_MAX_COLUMNS
        )));
    }
    Ok(column)
}

fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_days(chrono::Days::new(serial.floor() as u64))
}

#[derive(Default)]
struct PendingCell {
    column: usize,
    kind: Option<String>,
    style: Option<usize>,
    text: String,
}

fn read_sheet_cells(
    xml: &[u8],
    shared_strings: &[String],
    date_styles: &HashSet<usize>,
) -> Result<Vec<Vec<Cell>>, LoadError> {
    let mut grid: Vec<Vec<Cell>> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut row: usize = 0;
    let mut next_column: usize = 0;
    let mut cell: Option<PendingCell> = None;
    let mut in_value = false;
    let mut cell_count = 0usize;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => {
                    row = row_index(&e, grid.len())?;
                    next_column = 0;
                }
                b"c" => {
                    let column = cell_column(&e, next_column)?;
                    next_column = column + 1;
                    cell = Some(PendingCell {
                        column,
                        kind: attr(&e, b"t"),
                        style: attr(&e, b"s").and_then(|s| s.parse().ok()),
                        text: String::new(),
                    });
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Empty(e)) if e.local_name().as_ref() == b"c" => {
                next_column = cell_column(&e, next_column)? + 1;
            }
            Ok(quick_xml::events::Event::Text(te)) if in_value => {
                if let Some(c) = cell.as_mut() {
                    c.text.push_str(&te.unescape().map_err(xlsx_error)?);
                }
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    if let Some(pending) = cell.take() {
                        cell_count += 1;
                        if cell_count > XLSX_MAX_CELLS {
                            return Err(xlsx_error(format!(
                                "worksheet has more than {} cells",
                                XLSX_MAX_CELLS
                            )));
                        }
                        let value = convert_cell(
                            pending.kind.as_deref(),
                            pending.style,
                            &pending.text,
                            shared_strings,
                            date_styles,
                        );
                        if grid.len() <= row {
                            grid.resize(row + 1, Vec::new());
                        }
                        let cells = &mut grid[row];
                        if cells.len() <= pending.column {
                            cells.resize(pending.column + 1, Cell::Missing);
                        }
                        cells[pending.column] = value;
                    }
                }
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(xlsx_error(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(grid)
}

fn convert_cell(
    kind: Option<&str>,
    style: Option<usize>,
    text: &str,
    shared_strings: &[String],
    date_styles: &HashSet<usize>,
) -> Cell {
    match kind {
        Some("s") => text
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|i| shared_strings.get(i))
            .map(|s| Cell::from_text(s))
            .unwrap_or(Cell::Missing),
        Some("inlineStr") | Some("str") => Cell::from_text(text),
        Some("b") => Cell::Text((if text.trim() == "1" { "TRUE" } else { "FALSE" }).to_string()),
        Some("e") => Cell::Missing,
        Some("d") => {
            let t = text.trim();
            t.get(..10)
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
                .map(Cell::Date)
                .unwrap_or_else(|| Cell::from_text(t))
        }
        _ => match text.trim().parse::<f64>() {
            Ok(n) if style.is_some_and(|s| date_styles.contains(&s)) => {
                excel_serial_to_date(n).map(Cell::Date).unwrap_or(Cell::Number(n))
            }
            Ok(n) => Cell::Number(n),
            Err(_) => Cell::from_text(text),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdna_core::table::ColumnKind;
    use std::io::Write;

    #[test]
    fn test_format_from_name() {
        assert_eq!(FileFormat::from_name("q.csv").unwrap(), FileFormat::Csv);
        assert_eq!(FileFormat::from_name("Q.XLSX").unwrap(), FileFormat::Xlsx);
        assert_eq!(FileFormat::from_name("tsv").unwrap(), FileFormat::Tsv);
        assert!(matches!(
            FileFormat::from_name("report.pdf"),
            Err(LoadError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            FileFormat::from_name("old.xls"),
            Err(LoadError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_csv_numeric_and_text_columns() {
        let csv = "Quarter,Revenue,Expenses,Notes\n\
                   2023-Q1,1000,600,ok\n\
                   2023-Q2,1200.5,NA,\n\
                   2023-Q3,,700,late\n";
        let t = load_table(csv.as_bytes(), "data.csv").unwrap();
        assert_eq!(t.columns(), ["Quarter", "Revenue", "Expenses", "Notes"]);
        assert_eq!(t.len(), 3);
        assert_eq!(t.column_kind(0), ColumnKind::Text);
        assert_eq!(t.column_kind(1), ColumnKind::Numeric);
        assert_eq!(t.numeric_values("Revenue"), vec![1000.0, 1200.5]);
        assert_eq!(t.numeric_values("Expenses"), vec![600.0, 700.0]);
        assert_eq!(t.rows()[1].values[3], Value::Null);
    }

    #[test]
    fn test_mixed_column_stays_text() {
        let t = load_table(b"Revenue\n100\nunknown\n", "x.csv").unwrap();
        assert_eq!(t.column_kind(0), ColumnKind::Text);
        assert_eq!(t.rows()[0].values[0], Value::Text("100".to_string()));
    }

    #[test]
    fn test_header_names() {
        let t = load_table(b"a,,a,a\n1,2,3,4\n", "x.csv").unwrap();
        assert_eq!(t.columns(), ["a", "Unnamed: 1", "a.1", "a.2"]);
    }

    #[test]
    fn test_short_rows_padded_long_rows_rejected() {
        let t = load_table(b"a,b\n1\n", "x.csv").unwrap();
        assert_eq!(t.rows()[0].values, vec![Value::Number(1.0), Value::Null]);

        let err = load_table(b"a,b\n1,2,3\n", "x.csv").unwrap_err();
        assert!(matches!(err, LoadError::Parse { .. }));
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_empty_input_is_parse_error() {
        assert!(matches!(load_table(b"", "x.csv"), Err(LoadError::Parse { .. })));
    }

    #[test]
    fn test_header_only() {
        let t = load_table(b"Date,Revenue\n", "x.csv").unwrap();
        assert!(t.is_empty());
        assert_eq!(t.columns(), ["Date", "Revenue"]);
    }

    #[test]
    fn test_tsv_and_sniffed_text() {
        let t = load_table(b"Period\tSales\n2023\t5\n", "x.tsv").unwrap();
        assert_eq!(t.numeric_values("Sales"), vec![5.0]);

        let t = load_table(b"Period;Sales\n2023;5\n", "x.txt").unwrap();
        assert_eq!(t.numeric_values("Sales"), vec![5.0]);
    }

    fn xlsx(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            for (name, body) in entries {
                zip.start_file(*name, zip::write::SimpleFileOptions::default())
                    .unwrap();
                zip.write_all(body.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn test_xlsx_first_sheet() {
        let shared = r#"<?xml version="1.0"?><sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><si><t>Date</t></si><si><t>Revenue</t></si><si><r><t>Cost </t></r><r><t>of sales</t></r></si></sst>"#;
        let styles = r#"<?xml version="1.0"?><styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><numFmts count="1"><numFmt numFmtId="164" formatCode="yyyy\-mm\-dd"/></numFmts><cellStyleXfs count="1"><xf numFmtId="0"/></cellStyleXfs><cellXfs count="2"><xf numFmtId="0"/><xf numFmtId="164" applyNumberFormat="1"/></cellXfs></styleSheet>"#;
        let sheet1 = r#"<?xml version="1.0"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>
<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c><c r="C1" t="s"><v>2</v></c><c r="D1" t="inlineStr"><is><t>Note</t></is></c></row>
<row r="2"><c r="A2" s="1"><v>44927</v></c><c r="B2"><v>1000</v></c><c r="C2"><v>400</v></c><c r="D2" t="inlineStr"><is><t>first</t></is></c></row>
<row r="3"><c r="A3" s="1"><v>45017</v></c><c r="B3"><v>1250.5</v></c><c r="D3" t="e"><v>#DIV/0!</v></c></row>
</sheetData></worksheet>"#;
        let sheet2 = r#"<?xml version="1.0"?><worksheet><sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>Other</t></is></c></row></sheetData></worksheet>"#;

        let bytes = xlsx(&[
            ("xl/sharedStrings.xml", shared),
            ("xl/styles.xml", styles),
            ("xl/worksheets/sheet2.xml", sheet2),
            ("xl/worksheets/sheet1.xml", sheet1),
        ]);
        let t = load_table(&bytes, "book.xlsx").unwrap();

        assert_eq!(t.columns(), ["Date", "Revenue", "Cost of sales", "Note"]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.column_kind(0), ColumnKind::Date);
        assert_eq!(
            t.rows()[0].values[0],
            Value::Date(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap())
        );
        assert_eq!(
            t.rows()[1].values[0],
            Value::Date(NaiveDate::from_ymd_opt(2023, 4, 1).unwrap())
        );
        assert_eq!(t.numeric_values("Revenue"), vec![1000.0, 1250.5]);
        assert_eq!(t.rows()[1].values[2], Value::Null);
        assert_eq!(t.rows()[1].values[3], Value::Null);
    }

    #[test]
    fn test_xlsx_without_shared_strings() {
        let sheet = r#"<worksheet><sheetData><row><c t="inlineStr"><is><t>Sales</t></is></c></row><row><c><v>7</v></c></row></sheetData></worksheet>"#;
        let bytes = xlsx(&[("xl/worksheets/sheet1.xml", sheet)]);
        let t = load_table(&bytes, "book.xlsx").unwrap();
        assert_eq!(t.numeric_values("Sales"), vec![7.0]);
    }

    #[test]
    fn test_xlsx_not_a_zip() {
        let err = load_table(b"not a zip", "book.xlsx").unwrap_err();
        assert!(matches!(err, LoadError::Parse { format: "XLSX", .. }));
    }

    #[test]
    fn test_date_format_detection() {
        assert!(is_date_format(14, None));
        assert!(!is_date_format(4, None));
        assert!(is_date_format(164, Some("mmm-yy")));
        assert!(is_date_format(165, Some("[$-409]d-mmm-yyyy;@")));
        assert!(!is_date_format(166, Some("#,##0.00")));
        assert!(!is_date_format(167, Some("\"days\" 0")));
        assert_eq!(column_of("AB12"), Some(27));
        assert_eq!(column_of("A1"), Some(0));
        assert_eq!(column_of("ZZZZZZZZZZZZZZZ1"), None);
    }

    fn single_sheet(rows: &str) -> Vec<u8> {
        let sheet = format!("<worksheet><sheetData>{}</sheetData></worksheet>", rows);
        xlsx(&[("xl/worksheets/sheet1.xml", &sheet)])
    }

    #[test]
    fn test_xlsx_row_number_out_of_range() {
        for r in ["18446744073709551615", "1000000000", "1048577", "0", "x"] {
            let bytes = single_sheet(&format!(
                r#"<row r="{}"><c t="inlineStr"><is><t>Sales</t></is></c></row>"#,
                r
            ));
            let err = load_table(&bytes, "book.xlsx").unwrap_err();
            assert!(
                matches!(err, LoadError::Parse { format: "XLSX", .. }),
                "row {} gave {:?}",
                r,
                err
            );
        }
    }

    #[test]
    fn test_xlsx_cell_reference_out_of_range() {
        for r in ["ZZZZZZZZZZZZZZZ1", "XFE1"] {
            let bytes = single_sheet(&format!(
                r#"<row r="1"><c r="{}" t="inlineStr"><is><t>Sales</t></is></c></row>"#,
                r
            ));
            let err = load_table(&bytes, "book.xlsx").unwrap_err();
            assert!(err.to_string().contains("invalid cell reference"), "{}", err);
        }

        let bytes = single_sheet(r#"<row r="1"><c r="ZZZZZZZZZZZZZZZ1"/></row>"#);
        assert!(load_table(&bytes, "book.xlsx").is_err());
    }

    #[test]
    fn test_xlsx_last_valid_cell_loads() {
        let bytes = single_sheet(
            r#"<row r="1"><c r="A1" t="inlineStr"><is><t>Sales</t></is></c><c r="XFD1"><v>1</v></c></row><row r="2"><c r="A2"><v>5</v></c></row>"#,
        );
        let t = load_table(&bytes, "book.xlsx").unwrap();
        assert_eq!(t.columns().len(), XLSX_MAX_COLUMNS);
        assert_eq!(t.numeric_values("Sales"), vec![5.0]);
    }
}
