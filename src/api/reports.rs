use std::collections::HashSet;
use std::io::Write;

use axum::Json;
use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::info;

use crate::auth::CurrentUser;
use crate::db::repository;
use crate::error::AppError;
use crate::models::{Role, Task, User};
use crate::report::export::{
    ExportFile, tasks_workbook, template_workbook, users_and_tasks_workbook,
    users_with_empty_tasks_workbook, users_workbook,
};
use crate::report::import::{import_users, import_workbook};
use crate::report::sheet::read_import_workbook;
use crate::scope::{task_scope, user_scope};
use crate::state::AppState;

/// Opting in puts stored password hashes into the Password column;
/// super-admin only.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportParams {
    #[serde(default)]
    pub include_sensitive: bool,
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Partial failure: committed rows stay committed, the rest are reported
/// row by row with a 400.
fn import_response(errors: Vec<String>, clean_message: &str) -> Response {
    if errors.is_empty() {
        Json(ImportResponse {
            message: clean_message.to_string(),
            errors,
        })
        .into_response()
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(ImportResponse {
                message: "Import finished with errors".to_string(),
                errors,
            }),
        )
            .into_response()
    }
}

fn require_admin(caller: &User) -> Result<(), AppError> {
    if caller.role.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden("Access denied".to_string()))
    }
}

fn check_sensitive_export(caller: &User, params: &ExportParams) -> Result<bool, AppError> {
    if params.include_sensitive && !caller.role.is_super_admin() {
        return Err(AppError::Forbidden(
            "Only the super admin can export sensitive fields".to_string(),
        ));
    }
    Ok(params.include_sensitive)
}

/// The uploaded workbook from a multipart form; the first file field
/// wins, whatever its name.
async fn uploaded_workbook_bytes(mut multipart: Multipart) -> Result<Vec<u8>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| AppError::BadRequest("Invalid multipart upload".to_string()))?
    {
        if field.file_name().is_some() || field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|_| AppError::BadRequest("Invalid multipart upload".to_string()))?;
            return Ok(bytes.to_vec());
        }
    }
    Err(AppError::BadRequest("No Excel file uploaded".to_string()))
}

/// calamine reads from a path, so the upload lands in a temp file that
/// is removed on drop.
fn spool_to_temp_file(bytes: &[u8]) -> Result<NamedTempFile, AppError> {
    let mut file = NamedTempFile::new()?;
    file.write_all(bytes)?;
    Ok(file)
}

pub async fn import_users_sheet(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    multipart: Multipart,
) -> Result<Response, AppError> {
    require_admin(&caller)?;

    let bytes = uploaded_workbook_bytes(multipart).await?;
    let temp = spool_to_temp_file(&bytes)?;
    let workbook = read_import_workbook(temp.path())?;

    let errors = import_users(&state.db, &caller, &state.config, &workbook.users).await?;
    info!(
        "user import by {}: {} rows, {} errors",
        caller.id,
        workbook.users.len(),
        errors.len()
    );
    Ok(import_response(errors, "Users imported successfully"))
}

pub async fn import_full_sheet(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    multipart: Multipart,
) -> Result<Response, AppError> {
    require_admin(&caller)?;

    let bytes = uploaded_workbook_bytes(multipart).await?;
    let temp = spool_to_temp_file(&bytes)?;
    let workbook = read_import_workbook(temp.path())?;

    let errors = import_workbook(&state.db, &caller, &state.config, &workbook).await?;
    info!(
        "full import by {}: {} user rows, {} task rows, {} errors",
        caller.id,
        workbook.users.len(),
        workbook.tasks.len(),
        errors.len()
    );
    Ok(import_response(errors, "Users and tasks imported successfully"))
}

pub async fn export_template(
    CurrentUser(caller): CurrentUser,
) -> Result<ExportFile, AppError> {
    require_admin(&caller)?;
    Ok(ExportFile {
        filename: "import_template.xlsx".to_string(),
        bytes: template_workbook()?,
    })
}

/// Super-admins export every admin and member; admins export members
/// only, under a filename that says so.
pub async fn export_users(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Query(params): Query<ExportParams>,
) -> Result<ExportFile, AppError> {
    let include_sensitive = check_sensitive_export(&caller, &params)?;
    let (users, filename) = scoped_users(&state, &caller).await?;
    Ok(ExportFile {
        filename: format!("{filename}.xlsx"),
        bytes: users_workbook(&users, &state.config.admin_invite_token, include_sensitive)?,
    })
}

pub async fn export_tasks(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
) -> Result<ExportFile, AppError> {
    require_admin(&caller)?;
    let users = repository::fetch_all_users(&state.db).await?;
    let tasks = scoped_tasks(&state, &caller, &users).await?;
    Ok(ExportFile {
        filename: "tasks.xlsx".to_string(),
        bytes: tasks_workbook(&tasks, &users)?,
    })
}

pub async fn export_users_empty_tasks(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Query(params): Query<ExportParams>,
) -> Result<ExportFile, AppError> {
    let include_sensitive = check_sensitive_export(&caller, &params)?;
    let (users, filename) = scoped_users(&state, &caller).await?;
    Ok(ExportFile {
        filename: format!("{filename}-and-empty-tasks.xlsx"),
        bytes: users_with_empty_tasks_workbook(
            &users,
            &state.config.admin_invite_token,
            include_sensitive,
        )?,
    })
}

pub async fn export_users_and_tasks(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Query(params): Query<ExportParams>,
) -> Result<ExportFile, AppError> {
    let include_sensitive = check_sensitive_export(&caller, &params)?;
    let all_users = repository::fetch_all_users(&state.db).await?;
    let (users, filename) = scoped_users(&state, &caller).await?;
    let tasks = scoped_tasks(&state, &caller, &all_users).await?;
    Ok(ExportFile {
        filename: format!("{filename}-and-tasks.xlsx"),
        bytes: users_and_tasks_workbook(
            &users,
            &tasks,
            &state.config.admin_invite_token,
            include_sensitive,
        )?,
    })
}

async fn scoped_users(
    state: &AppState,
    caller: &User,
) -> Result<(Vec<User>, &'static str), AppError> {
    let filename = match caller.role {
        Role::SuperAdmin => "users",
        Role::Admin => "members",
        Role::Member => return Err(AppError::Forbidden("Access denied".to_string())),
    };
    let scope = user_scope(caller);
    let users = repository::fetch_all_users(&state.db)
        .await?
        .into_iter()
        .filter(|u| scope.allows(u))
        .collect();
    Ok((users, filename))
}

async fn scoped_tasks(
    state: &AppState,
    caller: &User,
    all_users: &[User],
) -> Result<Vec<Task>, AppError> {
    let scope = task_scope(caller);
    let member_ids: HashSet<String> = all_users
        .iter()
        .filter(|u| u.role == Role::Member)
        .map(|u| u.id.clone())
        .collect();
    Ok(repository::fetch_all_tasks(&state.db)
        .await?
        .into_iter()
        .filter(|t| scope.allows(t, &member_ids))
        .collect())
}
