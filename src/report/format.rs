//! Row formatting for exports: one record per spreadsheet row, every cell
//! a string. `parse` is the inverse of this module, so the joined formats
//! here (attachments, checklist, dates) must round-trip through it.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Timelike};

use crate::models::{Attachment, Role, Task, TodoItem, User};

pub const USER_COLUMNS: [&str; 9] = [
    "ID",
    "Name",
    "Email",
    "Password",
    "Role",
    "ProfileImage",
    "Admin Key",
    "CreatedAt",
    "UpdatedAt",
];

pub const TASK_COLUMNS: [&str; 12] = [
    "Title",
    "Description",
    "Priority",
    "Status",
    "DueDate",
    "Progress",
    "AssignedTo",
    "CreatedBy",
    "Attachments",
    "Todos",
    "CreatedAt",
    "UpdatedAt",
];

/// Password cells carry the stored hash only when the caller has opted
/// into sensitive fields; otherwise they are blank, and a blank password
/// on re-import keeps the stored hash. The Admin Key column is populated
/// only for admin rows so the sheet can be imported back without
/// tripping the admin-creation gate.
pub fn user_row(user: &User, admin_invite_token: &str, include_password_hash: bool) -> Vec<String> {
    let admin_key = if user.role == Role::Admin {
        admin_invite_token.to_string()
    } else {
        String::new()
    };
    let password = if include_password_hash {
        user.password_hash.clone()
    } else {
        String::new()
    };
    vec![
        user.id.clone(),
        user.name.clone(),
        user.email.clone(),
        password,
        user.role.as_str().to_string(),
        user.profile_image_url.clone().unwrap_or_default(),
        admin_key,
        format_datetime(&user.created_at),
        format_datetime(&user.updated_at),
    ]
}

/// `users_by_id` resolves assignee and creator ids to emails so the sheet
/// is human-editable; ids that no longer resolve are written as-is.
pub fn task_row(task: &Task, users_by_id: &HashMap<String, User>) -> Vec<String> {
    let resolve = |id: &String| -> String {
        users_by_id
            .get(id)
            .map(|u| u.email.clone())
            .unwrap_or_else(|| id.clone())
    };
    vec![
        task.title.clone(),
        task.description.clone(),
        task.priority.as_str().to_string(),
        task.status.as_str().to_string(),
        task.due_date.as_deref().map(format_date).unwrap_or_default(),
        format!("{}%", task.progress),
        task.assigned_to
            .iter()
            .map(resolve)
            .collect::<Vec<_>>()
            .join(", "),
        resolve(&task.created_by),
        format_attachments(&task.attachments),
        format_todos(&task.todo_checklist),
        format_datetime(&task.created_at),
        format_datetime(&task.updated_at),
    ]
}

/// "name (url)" entries joined with ", ".
pub fn format_attachments(attachments: &[Attachment]) -> String {
    attachments
        .iter()
        .map(|a| format!("{} ({})", a.name, a.url))
        .collect::<Vec<_>>()
        .join(", ")
}

/// "text [✔]" / "text [✘]" entries joined with " | ".
pub fn format_todos(todos: &[TodoItem]) -> String {
    todos
        .iter()
        .map(|t| {
            let mark = if t.completed { '✔' } else { '✘' };
            format!("{} [{}]", t.text, mark)
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Day/month/year without zero padding, the form the import date decoder
/// reads back. Unparseable timestamps are written verbatim.
fn format_date(rfc3339: &str) -> String {
    match DateTime::parse_from_rfc3339(rfc3339) {
        Ok(dt) => format!("{}/{}/{}", dt.day(), dt.month(), dt.year()),
        Err(_) => rfc3339.to_string(),
    }
}

fn format_datetime(rfc3339: &str) -> String {
    match DateTime::parse_from_rfc3339(rfc3339) {
        Ok(dt) => format!(
            "{}/{}/{} {:02}:{:02}:{:02}",
            dt.day(),
            dt.month(),
            dt.year(),
            dt.hour(),
            dt.minute(),
            dt.second()
        ),
        Err(_) => rfc3339.to_string(),
    }
}
