// 📂 Source Loaders - delimited text and spreadsheets → header-keyed rows
//
// Every loader returns an owned SourceTable. Nothing is shared between load
// steps; callers decide what to join.

use crate::numeric::{parse_leading_number, parse_number, Value};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

// ============================================================================
// CORE TYPES
// ============================================================================

/// Physical format of a source table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceFormat {
    Delimited,
    Spreadsheet,
}

impl SourceFormat {
    pub fn name(&self) -> &str {
        match self {
            SourceFormat::Delimited => "delimited text",
            SourceFormat::Spreadsheet => "spreadsheet",
        }
    }
}

/// Raw cell as read from the source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    Text(String),
    Number(f64),
    Empty,
}

impl Cell {
    /// Text form of the cell. Numbers use their shortest display form.
    pub fn text(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => n.to_string(),
            Cell::Empty => String::new(),
        }
    }

    /// Whole-cell numeric coercion
    pub fn value(&self) -> Value {
        match self {
            Cell::Text(s) => parse_number(s),
            Cell::Number(n) => Value::from_f64(*n),
            Cell::Empty => Value::Missing,
        }
    }

    /// Leading-token numeric coercion, for composite cells like "1,234 (1,000–1,500)"
    pub fn leading_value(&self) -> Value {
        match self {
            Cell::Text(s) => parse_leading_number(s),
            Cell::Number(n) => Value::from_f64(*n),
            Cell::Empty => Value::Missing,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Text(s) => s.is_empty(),
            Cell::Number(_) => false,
            Cell::Empty => true,
        }
    }
}

/// One line of a source table, keyed by header name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRow {
    /// 1-based line in the source (header is line 1)
    pub line_number: usize,

    cells: HashMap<String, Cell>,
}

impl SourceRow {
    pub fn new(line_number: usize, cells: HashMap<String, Cell>) -> Self {
        SourceRow { line_number, cells }
    }

    /// Convenience constructor for text-only rows
    pub fn from_pairs(line_number: usize, pairs: &[(&str, &str)]) -> Self {
        let cells = pairs
            .iter()
            .map(|(k, v)| {
                let cell = if v.is_empty() {
                    Cell::Empty
                } else {
                    Cell::Text((*v).to_string())
                };
                ((*k).to_string(), cell)
            })
            .collect();
        SourceRow { line_number, cells }
    }

    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.cells.get(column)
    }

    /// Cell text, empty when the column is absent
    pub fn text(&self, column: &str) -> String {
        self.get(column).map(Cell::text).unwrap_or_default()
    }

    /// Cell value, Missing when the column is absent
    pub fn value(&self, column: &str) -> Value {
        self.get(column).map(Cell::value).unwrap_or(Value::Missing)
    }

    pub fn leading_value(&self, column: &str) -> Value {
        self.get(column)
            .map(Cell::leading_value)
            .unwrap_or(Value::Missing)
    }
}

/// A fully materialised source table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceTable {
    /// Display name (file name) used in diagnostics
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<SourceRow>,
}

impl SourceTable {
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<SourceRow>) -> Self {
        SourceTable {
            name: name.into(),
            headers,
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.headers.iter().any(|h| h == column)
    }
}

// ============================================================================
// LOADER TRAIT
// ============================================================================

/// TableLoader - one implementation per physical format
pub trait TableLoader: Send + Sync {
    /// Read the whole file. An unreadable file is an error; nothing is retried.
    fn load(&self, file_path: &Path) -> Result<SourceTable>;

    fn format(&self) -> SourceFormat;
}

/// Detect the format from the file extension
///
/// ```
/// use country_pipelines::source::{detect_format, SourceFormat};
/// use std::path::Path;
///
/// assert_eq!(detect_format(Path::new("countries.csv")).unwrap(), SourceFormat::Delimited);
/// assert_eq!(detect_format(Path::new("wb-malaria.xlsx")).unwrap(), SourceFormat::Spreadsheet);
/// ```
pub fn detect_format(file_path: &Path) -> Result<SourceFormat> {
    let extension = file_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "csv" | "txt" => Ok(SourceFormat::Delimited),
        "xlsx" | "xlsm" | "xls" | "ods" => Ok(SourceFormat::Spreadsheet),
        _ => Err(anyhow!(
            "Could not detect table format from file name: {}",
            file_path.display()
        )),
    }
}

/// Factory: loader for a format
pub fn get_loader(format: SourceFormat) -> Box<dyn TableLoader> {
    match format {
        SourceFormat::Delimited => Box::new(CsvLoader::new()),
        SourceFormat::Spreadsheet => Box::new(SpreadsheetLoader::new()),
    }
}

/// Load a table in the given format
pub fn load(file_path: &Path, format: SourceFormat) -> Result<SourceTable> {
    let table = get_loader(format).load(file_path)?;
    info!(
        "loaded {} rows ({}) from {}",
        table.len(),
        format.name(),
        file_path.display()
    );
    Ok(table)
}

/// Load a table, detecting the format from its extension
pub fn load_detected(file_path: &Path) -> Result<SourceTable> {
    let format = detect_format(file_path)?;
    load(file_path, format)
}

fn display_name(file_path: &Path) -> String {
    file_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string()
}

// ============================================================================
// CSV LOADER
// ============================================================================

pub struct CsvLoader;

impl CsvLoader {
    pub fn new() -> Self {
        CsvLoader
    }
}

impl Default for CsvLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl TableLoader for CsvLoader {
    fn load(&self, file_path: &Path) -> Result<SourceTable> {
        use csv::ReaderBuilder;
        use std::fs::File;

        let file = File::open(file_path)
            .with_context(|| format!("Failed to open file: {}", file_path.display()))?;

        // Short and long rows are kept; missing trailing cells are simply absent
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let filename = display_name(file_path);

        let headers: Vec<String> = reader
            .headers()
            .with_context(|| format!("Failed to read CSV header in {}", filename))?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        let mut rows = Vec::new();
        for (index, result) in reader.records().enumerate() {
            let record = result.with_context(|| {
                format!("Failed to parse CSV line {} in {}", index + 2, filename)
            })?;

            let line_number = record
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(index + 2);

            let cells = headers
                .iter()
                .zip(record.iter())
                .map(|(header, raw)| {
                    let cell = if raw.is_empty() {
                        Cell::Empty
                    } else {
                        Cell::Text(raw.to_string())
                    };
                    (header.clone(), cell)
                })
                .collect();

            rows.push(SourceRow::new(line_number, cells));
        }

        Ok(SourceTable::new(filename, headers, rows))
    }

    fn format(&self) -> SourceFormat {
        SourceFormat::Delimited
    }
}

// ============================================================================
// SPREADSHEET LOADER
// ============================================================================

/// Reads the first worksheet; its first row is the header.
pub struct SpreadsheetLoader;

impl SpreadsheetLoader {
    pub fn new() -> Self {
        SpreadsheetLoader
    }
}

impl Default for SpreadsheetLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "spreadsheet")]
impl TableLoader for SpreadsheetLoader {
    fn load(&self, file_path: &Path) -> Result<SourceTable> {
        use calamine::{open_workbook_auto, Reader};

        let mut workbook = open_workbook_auto(file_path)
            .with_context(|| format!("Failed to open spreadsheet: {}", file_path.display()))?;

        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| anyhow!("Spreadsheet has no worksheets: {}", file_path.display()))?
            .with_context(|| {
                format!("Failed to read first worksheet of {}", file_path.display())
            })?;

        // Rows are relative to the first used cell, not to A1
        let first_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);

        let mut sheet_rows = range.rows();
        let headers: Vec<String> = match sheet_rows.next() {
            Some(header_row) => header_row.iter().map(spreadsheet::header_text).collect(),
            None => Vec::new(),
        };

        let rows = sheet_rows
            .enumerate()
            .map(|(index, sheet_row)| {
                let cells = headers
                    .iter()
                    .zip(sheet_row.iter())
                    .map(|(header, data)| (header.clone(), spreadsheet::cell_from_data(data)))
                    .collect();
                SourceRow::new(first_row + index + 2, cells)
            })
            .collect();

        Ok(SourceTable::new(display_name(file_path), headers, rows))
    }

    fn format(&self) -> SourceFormat {
        SourceFormat::Spreadsheet
    }
}

#[cfg(not(feature = "spreadsheet"))]
impl TableLoader for SpreadsheetLoader {
    fn load(&self, file_path: &Path) -> Result<SourceTable> {
        Err(anyhow!(
            "Spreadsheet support not compiled in (enable the `spreadsheet` feature): {}",
            file_path.display()
        ))
    }

    fn format(&self) -> SourceFormat {
        SourceFormat::Spreadsheet
    }
}

#[cfg(feature = "spreadsheet")]
mod spreadsheet {
    use super::Cell;
    use calamine::Data;

    /// Header text; numeric headers like 2000.0 become "2000"
    pub(super) fn header_text(data: &Data) -> String {
        match data {
            Data::String(s) => s.trim().to_string(),
            Data::Float(f) => f.to_string(),
            Data::Int(i) => i.to_string(),
            Data::Empty => String::new(),
            other => other.to_string(),
        }
    }

    pub(super) fn cell_from_data(data: &Data) -> Cell {
        match data {
            Data::Empty => Cell::Empty,
            Data::String(s) if s.is_empty() => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            Data::Float(f) => Cell::Number(*f),
            Data::Int(i) => Cell::Number(*i as f64),
            other => Cell::Text(other.to_string()),
        }
    }

}

// ============================================================================
// TESTS
// ============================================================================
