//! Import reconciliation: applies parsed workbook rows to the database.
//! Per-row failures are collected, never fatal; rows that already
//! committed stay committed even when later rows fail.

use sqlx::SqlitePool;
use tracing::warn;
use uuid::Uuid;

use crate::auth::hash_password;
use crate::config::AppConfig;
use crate::db::repository;
use crate::error::AppError;
use crate::models::{Task, User};
use crate::report::parse::{parse_task_row, parse_user_row};
use crate::report::sheet::{ImportWorkbook, SheetRow};
use crate::services::sync_task_status;

/// Password for created users whose Password cell is blank. They are
/// expected to change it on first login.
const FALLBACK_IMPORT_PASSWORD: &str = "defaultPassword123";

/// Sheet row numbers as a spreadsheet user sees them: data starts at 2.
fn row_number(index: usize) -> usize {
    index + 2
}

/// Users first so the task sheet can reference users created in the same
/// upload. Returns the combined error list; an empty list means a clean
/// import.
pub async fn import_workbook(
    db: &SqlitePool,
    caller: &User,
    config: &AppConfig,
    workbook: &ImportWorkbook,
) -> Result<Vec<String>, AppError> {
    let mut errors = import_users(db, caller, config, &workbook.users).await?;
    errors.extend(import_tasks(db, &workbook.tasks).await?);
    Ok(errors)
}

/// Matches rows to existing users by ID first, then by email. Matched
/// rows update in place; unmatched rows create. A blank password keeps
/// the stored hash on update and falls back to the default on create.
pub async fn import_users(
    db: &SqlitePool,
    caller: &User,
    config: &AppConfig,
    rows: &[SheetRow],
) -> Result<Vec<String>, AppError> {
    let mut errors = Vec::new();

    for (i, row) in rows.iter().enumerate() {
        let parsed = match parse_user_row(
            row,
            caller.role.is_super_admin(),
            &config.admin_invite_token,
        ) {
            Ok(parsed) => parsed,
            Err(msg) => {
                errors.push(format!("[User Import] row {}: {}", row_number(i), msg));
                continue;
            }
        };

        let existing = match &parsed.id {
            Some(id) => repository::find_user_by_id(db, id).await?,
            None => None,
        };
        let existing = match existing {
            Some(user) => Some(user),
            None => repository::find_user_by_email(db, &parsed.email).await?,
        };

        let now = chrono::Utc::now().to_rfc3339();
        let result = match existing {
            Some(mut user) => {
                user.name = parsed.name;
                user.email = parsed.email;
                user.role = parsed.role;
                user.profile_image_url = parsed.profile_image_url;
                if let Some(password) = &parsed.password {
                    user.password_hash = hash_password(password)?;
                }
                user.updated_at = now;
                repository::update_user(db, &user).await
            }
            None => {
                let password = parsed
                    .password
                    .as_deref()
                    .unwrap_or(FALLBACK_IMPORT_PASSWORD);
                let user = User {
                    id: parsed.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                    name: parsed.name,
                    email: parsed.email,
                    password_hash: hash_password(password)?,
                    role: parsed.role,
                    profile_image_url: parsed.profile_image_url,
                    created_by: None,
                    created_at: now.clone(),
                    updated_at: now,
                };
                repository::insert_user(db, &user).await
            }
        };

        if let Err(e) = result {
            warn!("user import row {} failed to save: {}", row_number(i), e);
            errors.push(format!(
                "[User Import] row {}: Error saving user - {}",
                row_number(i),
                e
            ));
        }
    }

    Ok(errors)
}

/// Matches rows to existing tasks by (title, creator). A match is fully
/// replaced by the row; otherwise a new task is created. Status and
/// progress are resynced from the parsed checklist before every save.
pub async fn import_tasks(
    db: &SqlitePool,
    rows: &[SheetRow],
) -> Result<Vec<String>, AppError> {
    let mut errors = Vec::new();
    // Snapshot taken after the user pass so same-upload users resolve.
    let users = repository::fetch_all_users(db).await?;

    for (i, row) in rows.iter().enumerate() {
        let parsed = match parse_task_row(row, &users) {
            Ok(parsed) => parsed,
            Err(msg) => {
                errors.push(format!("[Task Import] row {}: {}", row_number(i), msg));
                continue;
            }
        };

        let existing =
            repository::find_task_by_title_and_creator(db, &parsed.title, &parsed.created_by)
                .await?;

        let now = chrono::Utc::now().to_rfc3339();
        let is_update = existing.is_some();
        let mut task = match existing {
            Some(task) => Task {
                description: parsed.description,
                priority: parsed.priority,
                status: parsed.status,
                due_date: parsed.due_date,
                progress: parsed.progress,
                assigned_to: parsed.assigned_to,
                attachments: parsed.attachments,
                todo_checklist: parsed.todo_checklist,
                updated_at: now,
                ..task
            },
            None => Task {
                id: Uuid::new_v4().to_string(),
                title: parsed.title,
                description: parsed.description,
                priority: parsed.priority,
                status: parsed.status,
                due_date: parsed.due_date,
                progress: parsed.progress,
                assigned_to: parsed.assigned_to,
                created_by: parsed.created_by,
                attachments: parsed.attachments,
                todo_checklist: parsed.todo_checklist,
                created_at: now.clone(),
                updated_at: now,
            },
        };
        sync_task_status(&mut task);

        let result = if is_update {
            repository::update_task(db, &task).await
        } else {
            repository::insert_task(db, &task).await
        };

        if let Err(e) = result {
            warn!("task import row {} failed to save: {}", row_number(i), e);
            errors.push(format!(
                "[Task Import] row {}: Error saving task - {}",
                row_number(i),
                e
            ));
        }
    }

    Ok(errors)
}
