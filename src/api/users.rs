use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::auth::{apply_user_update, check_email_available};
use crate::auth::CurrentUser;
use crate::db::repository;
use crate::error::AppError;
use crate::models::{TaskStatus, UpdateUserRequest, User};
use crate::scope::{check_can_manage_user, user_scope};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UserListParams {
    pub search: Option<String>,
}

/// Listing row: the user plus their per-status assigned task counts.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserWithTaskCounts {
    #[serde(flatten)]
    pub user: User,
    pub pending_tasks: usize,
    pub in_progress_tasks: usize,
    pub completed_tasks: usize,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

pub async fn list_users(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Query(params): Query<UserListParams>,
) -> Result<Json<Vec<UserWithTaskCounts>>, AppError> {
    if !caller.role.is_admin() {
        return Err(AppError::Forbidden(
            "Access denied, admin or super admin only".to_string(),
        ));
    }

    let scope = user_scope(&caller);
    let search = params.search.as_deref().map(str::to_lowercase);

    let users: Vec<User> = repository::fetch_all_users(&state.db)
        .await?
        .into_iter()
        .filter(|u| scope.allows(u))
        .filter(|u| match &search {
            Some(needle) => {
                u.name.to_lowercase().contains(needle) || u.email.to_lowercase().contains(needle)
            }
            None => true,
        })
        .collect();

    // One task scan covers every listed user.
    let tasks = repository::fetch_all_tasks(&state.db).await?;
    let rows = users
        .into_iter()
        .map(|user| {
            let mut pending = 0;
            let mut in_progress = 0;
            let mut completed = 0;
            for task in tasks.iter().filter(|t| t.assigned_to.contains(&user.id)) {
                match task.status {
                    TaskStatus::Pending => pending += 1,
                    TaskStatus::InProgress => in_progress += 1,
                    TaskStatus::Completed => completed += 1,
                }
            }
            UserWithTaskCounts {
                user,
                pending_tasks: pending,
                in_progress_tasks: in_progress,
                completed_tasks: completed,
            }
        })
        .collect();

    Ok(Json(rows))
}

pub async fn get_user(
    State(state): State<AppState>,
    CurrentUser(_caller): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<User>, AppError> {
    let user = repository::find_user_by_id(&state.db, &id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(user))
}

pub async fn update_user(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<User>, AppError> {
    let mut target = repository::find_user_by_id(&state.db, &id)
        .await?
        .ok_or(AppError::NotFound)?;
    check_can_manage_user(&caller, &target)?;

    if let Some(email) = &req.email {
        check_email_available(&state, email, &target.id).await?;
    }
    apply_user_update(&mut target, &req, &state)?;
    target.updated_at = chrono::Utc::now().to_rfc3339();
    repository::update_user(&state.db, &target).await?;
    info!("user {} updated by {}", target.id, caller.id);

    Ok(Json(target))
}

pub async fn delete_user(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let target = repository::find_user_by_id(&state.db, &id)
        .await?
        .ok_or(AppError::NotFound)?;
    check_can_manage_user(&caller, &target)?;

    repository::delete_user(&state.db, &target.id).await?;
    info!("user {} deleted by {}", target.id, caller.id);

    Ok(Json(MessageResponse {
        message: "User deleted successfully".to_string(),
    }))
}
