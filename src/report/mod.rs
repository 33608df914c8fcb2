//! Spreadsheet interchange: workbook reading/writing, row
//! formatting/parsing, and import reconciliation.

pub mod export;
pub mod format;
pub mod import;
pub mod parse;
pub mod sheet;
