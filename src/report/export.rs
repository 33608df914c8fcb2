//! Workbook assembly for exports. Every export variant produces an
//! in-memory xlsx so handlers never touch the filesystem.

use std::collections::HashMap;

use axum::http::header;
use axum::response::{IntoResponse, Response};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::error::AppError;
use crate::models::{Task, User};
use crate::report::format::{TASK_COLUMNS, USER_COLUMNS, task_row, user_row};
use crate::report::sheet::{TASK_SHEET, USER_SHEET};

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// A finished workbook ready to send as a file download.
pub struct ExportFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl IntoResponse for ExportFile {
    fn into_response(self) -> Response {
        let disposition = format!("attachment; filename=\"{}\"", self.filename);
        (
            [
                (header::CONTENT_TYPE, XLSX_MIME.to_string()),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            self.bytes,
        )
            .into_response()
    }
}

/// Header-only Users and Tasks sheets for people preparing an import.
pub fn template_workbook() -> Result<Vec<u8>, AppError> {
    let mut workbook = Workbook::new();
    workbook.push_worksheet(sheet(USER_SHEET, &USER_COLUMNS, &[])?);
    workbook.push_worksheet(sheet(TASK_SHEET, &TASK_COLUMNS, &[])?);
    Ok(workbook.save_to_buffer()?)
}

pub fn users_workbook(
    users: &[User],
    admin_invite_token: &str,
    include_password_hash: bool,
) -> Result<Vec<u8>, AppError> {
    let rows: Vec<Vec<String>> = users
        .iter()
        .map(|u| user_row(u, admin_invite_token, include_password_hash))
        .collect();
    let mut workbook = Workbook::new();
    workbook.push_worksheet(sheet(USER_SHEET, &USER_COLUMNS, &rows)?);
    Ok(workbook.save_to_buffer()?)
}

pub fn tasks_workbook(tasks: &[Task], users: &[User]) -> Result<Vec<u8>, AppError> {
    let mut workbook = Workbook::new();
    workbook.push_worksheet(tasks_sheet(tasks, users)?);
    Ok(workbook.save_to_buffer()?)
}

/// Populated Users sheet next to a header-only Tasks sheet, for handing
/// a team roster to someone who will fill in the task plan.
pub fn users_with_empty_tasks_workbook(
    users: &[User],
    admin_invite_token: &str,
    include_password_hash: bool,
) -> Result<Vec<u8>, AppError> {
    let rows: Vec<Vec<String>> = users
        .iter()
        .map(|u| user_row(u, admin_invite_token, include_password_hash))
        .collect();
    let mut workbook = Workbook::new();
    workbook.push_worksheet(sheet(USER_SHEET, &USER_COLUMNS, &rows)?);
    workbook.push_worksheet(sheet(TASK_SHEET, &TASK_COLUMNS, &[])?);
    Ok(workbook.save_to_buffer()?)
}

pub fn users_and_tasks_workbook(
    users: &[User],
    tasks: &[Task],
    admin_invite_token: &str,
    include_password_hash: bool,
) -> Result<Vec<u8>, AppError> {
    let user_rows: Vec<Vec<String>> = users
        .iter()
        .map(|u| user_row(u, admin_invite_token, include_password_hash))
        .collect();
    let mut workbook = Workbook::new();
    workbook.push_worksheet(sheet(USER_SHEET, &USER_COLUMNS, &user_rows)?);
    workbook.push_worksheet(tasks_sheet(tasks, users)?);
    Ok(workbook.save_to_buffer()?)
}

fn tasks_sheet(tasks: &[Task], users: &[User]) -> Result<Worksheet, AppError> {
    let users_by_id: HashMap<String, User> =
        users.iter().map(|u| (u.id.clone(), u.clone())).collect();
    let rows: Vec<Vec<String>> = tasks.iter().map(|t| task_row(t, &users_by_id)).collect();
    sheet(TASK_SHEET, &TASK_COLUMNS, &rows)
}

/// Blank cells are left unwritten so they come back as absent keys on
/// re-import.
fn sheet(name: &str, columns: &[&str], rows: &[Vec<String>]) -> Result<Worksheet, AppError> {
    let mut worksheet = Worksheet::new();
    worksheet.set_name(name)?;
    for (col, header) in columns.iter().enumerate() {
        worksheet.write_string(0, col as u16, *header)?;
    }
    for (r, row) in rows.iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            if !value.is_empty() {
                worksheet.write_string((r + 1) as u32, c as u16, value)?;
            }
        }
    }
    Ok(worksheet)
}
