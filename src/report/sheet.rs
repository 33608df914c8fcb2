//! Thin seam over the spreadsheet file formats: uploaded workbooks are
//! decoded into plain header-keyed rows so the parser never sees the
//! calamine types directly.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use calamine::{Data, Reader, Xlsx, open_workbook};
use chrono::NaiveDateTime;

use crate::error::AppError;

pub const USER_SHEET: &str = "Users";
pub const TASK_SHEET: &str = "Tasks";

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    DateTime(NaiveDateTime),
    Bool(bool),
}

impl CellValue {
    /// String rendering used wherever a column is read as text. Whole
    /// numbers drop the trailing `.0` a float cell would otherwise show.
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            CellValue::DateTime(dt) => dt.to_string(),
            CellValue::Bool(b) => b.to_string(),
        }
    }
}

/// One data row: column header -> cell. Empty cells are absent.
pub type SheetRow = HashMap<String, CellValue>;

#[derive(Debug, Default)]
pub struct ImportWorkbook {
    pub users: Vec<SheetRow>,
    pub tasks: Vec<SheetRow>,
}

pub fn read_import_workbook(path: &Path) -> Result<ImportWorkbook, AppError> {
    let mut workbook: Xlsx<BufReader<File>> = open_workbook(path)?;
    Ok(ImportWorkbook {
        users: read_sheet(&mut workbook, USER_SHEET),
        tasks: read_sheet(&mut workbook, TASK_SHEET),
    })
}

/// A missing sheet is treated as zero rows, matching an upload that only
/// carries one of the two sheets.
fn read_sheet(workbook: &mut Xlsx<BufReader<File>>, name: &str) -> Vec<SheetRow> {
    let range = match workbook.worksheet_range(name) {
        Ok(range) => range,
        Err(_) => return Vec::new(),
    };

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header_row) => header_row.iter().map(|c| c.to_string()).collect(),
        None => return Vec::new(),
    };

    rows.map(|row| {
        let mut out = SheetRow::new();
        for (header, cell) in headers.iter().zip(row.iter()) {
            if header.is_empty() {
                continue;
            }
            if let Some(value) = convert_cell(cell) {
                out.insert(header.clone(), value);
            }
        }
        out
    })
    .collect()
}

fn convert_cell(cell: &Data) -> Option<CellValue> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => Some(CellValue::Text(s.clone())),
        Data::Float(f) => Some(CellValue::Number(*f)),
        Data::Int(i) => Some(CellValue::Number(*i as f64)),
        Data::Bool(b) => Some(CellValue::Bool(*b)),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) => Some(CellValue::DateTime(naive)),
            None => Some(CellValue::Number(dt.as_f64())),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(CellValue::Text(s.clone())),
    }
}
