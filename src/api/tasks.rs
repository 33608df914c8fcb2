use std::collections::HashSet;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::api::users::MessageResponse;
use crate::auth::CurrentUser;
use crate::db::repository;
use crate::error::AppError;
use crate::models::{
    NewTaskRequest, Priority, Task, TaskStatus, UpdateChecklistRequest, UpdateTaskRequest, User,
};
use crate::scope::task_scope;
use crate::services::sync_task_status;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TaskListParams {
    pub status: Option<String>,
    pub search: Option<String>,
}

/// Listing row: the task plus a derived checklist completion count.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskWithCount {
    #[serde(flatten)]
    pub task: Task,
    pub completed_todo_count: usize,
}

impl From<Task> for TaskWithCount {
    fn from(task: Task) -> Self {
        let completed_todo_count = task.completed_todo_count();
        TaskWithCount {
            task,
            completed_todo_count,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummary {
    pub total_tasks: usize,
    pub pending_tasks: usize,
    pub in_progress_tasks: usize,
    pub completed_tasks: usize,
}

impl StatusSummary {
    fn for_tasks(tasks: &[Task]) -> Self {
        let count =
            |status: TaskStatus| tasks.iter().filter(|t| t.status == status).count();
        StatusSummary {
            total_tasks: tasks.len(),
            pending_tasks: count(TaskStatus::Pending),
            in_progress_tasks: count(TaskStatus::InProgress),
            completed_tasks: count(TaskStatus::Completed),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskListResponse {
    pub tasks: Vec<TaskWithCount>,
    pub status_summary: StatusSummary,
}

/// Member-role user ids, for the admin task scope.
async fn member_ids(state: &AppState) -> Result<HashSet<String>, AppError> {
    Ok(repository::fetch_all_users(&state.db)
        .await?
        .into_iter()
        .filter(|u| u.role == crate::models::Role::Member)
        .map(|u| u.id)
        .collect())
}

async fn visible_tasks(state: &AppState, caller: &User) -> Result<Vec<Task>, AppError> {
    let scope = task_scope(caller);
    let members = member_ids(state).await?;
    Ok(repository::fetch_all_tasks(&state.db)
        .await?
        .into_iter()
        .filter(|t| scope.allows(t, &members))
        .collect())
}

/// The status summary counts the caller's whole visible set; the status
/// and search query params narrow only the returned rows.
pub async fn list_tasks(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Query(params): Query<TaskListParams>,
) -> Result<Json<TaskListResponse>, AppError> {
    let status_filter = params
        .status
        .as_deref()
        .map(parse_status_filter)
        .transpose()?;
    let search = params.search.as_deref().map(str::to_lowercase);

    let visible = visible_tasks(&state, &caller).await?;
    let status_summary = StatusSummary::for_tasks(&visible);

    let tasks = visible
        .into_iter()
        .filter(|t| status_filter.is_none_or(|status| t.status == status))
        .filter(|t| match &search {
            Some(needle) => {
                t.title.to_lowercase().contains(needle)
                    || t.description.to_lowercase().contains(needle)
            }
            None => true,
        })
        .map(TaskWithCount::from)
        .collect();

    Ok(Json(TaskListResponse {
        tasks,
        status_summary,
    }))
}

pub async fn get_task(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<TaskWithCount>, AppError> {
    let task = repository::find_task_by_id(&state.db, &id)
        .await?
        .ok_or(AppError::NotFound)?;

    if !caller.role.is_admin() && !task.assigned_to.contains(&caller.id) {
        return Err(AppError::Forbidden(
            "Not authorized to view this task".to_string(),
        ));
    }

    Ok(Json(TaskWithCount::from(task)))
}

pub async fn create_task(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Json(req): Json<NewTaskRequest>,
) -> Result<(StatusCode, Json<Task>), AppError> {
    if req.title.trim().is_empty() || req.assigned_to.is_empty() {
        return Err(AppError::BadRequest(
            "Missing required fields or invalid assignedTo".to_string(),
        ));
    }
    validate_assignees(&state, &req.assigned_to).await?;
    validate_attachments(&req.attachments)?;
    let due_date = parse_due_date(&req.due_date)?;

    let now = Utc::now().to_rfc3339();
    let mut task = Task {
        id: Uuid::new_v4().to_string(),
        title: req.title.trim().to_string(),
        description: req.description,
        priority: req.priority,
        status: TaskStatus::Pending,
        due_date: Some(due_date),
        progress: 0,
        assigned_to: req.assigned_to,
        created_by: caller.id.clone(),
        attachments: req.attachments,
        todo_checklist: req.todo_checklist,
        created_at: now.clone(),
        updated_at: now,
    };
    sync_task_status(&mut task);
    repository::insert_task(&state.db, &task).await?;
    info!("task {} created by {}", task.id, caller.id);

    Ok((StatusCode::CREATED, Json(task)))
}

/// Admins may change any field. Assigned members may only touch the
/// checklist; other fields in their payload are ignored.
pub async fn update_task(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<Json<Task>, AppError> {
    let mut task = repository::find_task_by_id(&state.db, &id)
        .await?
        .ok_or(AppError::NotFound)?;

    let is_admin = caller.role.is_admin();
    if !is_admin && !task.assigned_to.contains(&caller.id) {
        return Err(AppError::Forbidden(
            "Not authorized to update this task".to_string(),
        ));
    }

    if is_admin {
        if let Some(title) = req.title {
            if title.trim().is_empty() {
                return Err(AppError::BadRequest("Title cannot be empty".to_string()));
            }
            task.title = title.trim().to_string();
        }
        if let Some(description) = req.description {
            task.description = description;
        }
        if let Some(priority) = req.priority {
            task.priority = priority;
        }
        if let Some(due_date) = req.due_date {
            task.due_date = Some(parse_due_date(&due_date)?);
        }
        if let Some(assigned_to) = req.assigned_to {
            if assigned_to.is_empty() {
                return Err(AppError::BadRequest(
                    "Missing required fields or invalid assignedTo".to_string(),
                ));
            }
            validate_assignees(&state, &assigned_to).await?;
            task.assigned_to = assigned_to;
        }
        if let Some(attachments) = req.attachments {
            validate_attachments(&attachments)?;
            task.attachments = attachments;
        }
    }
    if let Some(todo_checklist) = req.todo_checklist {
        task.todo_checklist = todo_checklist;
    }

    sync_task_status(&mut task);
    task.updated_at = Utc::now().to_rfc3339();
    repository::update_task(&state.db, &task).await?;

    Ok(Json(task))
}

/// Checklist-only update; the route members use to tick items off.
pub async fn update_task_checklist(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateChecklistRequest>,
) -> Result<Json<TaskWithCount>, AppError> {
    let mut task = repository::find_task_by_id(&state.db, &id)
        .await?
        .ok_or(AppError::NotFound)?;

    if !caller.role.is_admin() && !task.assigned_to.contains(&caller.id) {
        return Err(AppError::Forbidden(
            "Not authorized to update this task".to_string(),
        ));
    }

    task.todo_checklist = req.todo_checklist;
    sync_task_status(&mut task);
    task.updated_at = Utc::now().to_rfc3339();
    repository::update_task(&state.db, &task).await?;

    Ok(Json(TaskWithCount::from(task)))
}

pub async fn delete_task(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    if !caller.role.is_super_admin() {
        return Err(AppError::Forbidden(
            "Only the super admin can delete tasks".to_string(),
        ));
    }
    if !repository::delete_task(&state.db, &id).await? {
        return Err(AppError::NotFound);
    }
    info!("task {} deleted by {}", id, caller.id);

    Ok(Json(MessageResponse {
        message: "Task deleted successfully".to_string(),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrioritySummary {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub status_summary: StatusSummary,
    pub priority_summary: PrioritySummary,
    pub overdue_tasks: usize,
    pub recent_tasks: Vec<TaskWithCount>,
}

/// Aggregates over the caller's visible task set.
pub async fn dashboard(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
) -> Result<Json<DashboardResponse>, AppError> {
    let visible = visible_tasks(&state, &caller).await?;

    let priority_count =
        |priority: Priority| visible.iter().filter(|t| t.priority == priority).count();
    let now = Utc::now();
    let overdue_tasks = visible
        .iter()
        .filter(|t| t.status != TaskStatus::Completed)
        .filter(|t| {
            t.due_date
                .as_deref()
                .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
                .is_some_and(|due| due < now)
        })
        .count();

    let status_summary = StatusSummary::for_tasks(&visible);
    let priority_summary = PrioritySummary {
        low: priority_count(Priority::Low),
        medium: priority_count(Priority::Medium),
        high: priority_count(Priority::High),
    };

    // fetch_all_tasks returns newest-first already.
    let recent_tasks = visible
        .into_iter()
        .take(5)
        .map(TaskWithCount::from)
        .collect();

    Ok(Json(DashboardResponse {
        status_summary,
        priority_summary,
        overdue_tasks,
        recent_tasks,
    }))
}

fn parse_status_filter(raw: &str) -> Result<TaskStatus, AppError> {
    match raw.to_lowercase().as_str() {
        "pending" => Ok(TaskStatus::Pending),
        "in-progress" => Ok(TaskStatus::InProgress),
        "completed" => Ok(TaskStatus::Completed),
        _ => Err(AppError::BadRequest(format!("Invalid status \"{raw}\""))),
    }
}

/// Accepts RFC 3339 or a bare YYYY-MM-DD date; stores RFC 3339.
fn parse_due_date(raw: &str) -> Result<String, AppError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc).to_rfc3339());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive).to_rfc3339())
        .ok_or_else(|| AppError::BadRequest("Invalid dueDate format".to_string()))
}

async fn validate_assignees(state: &AppState, assigned_to: &[String]) -> Result<(), AppError> {
    for user_id in assigned_to {
        if repository::find_user_by_id(&state.db, user_id).await?.is_none() {
            return Err(AppError::BadRequest(format!("User not found: {user_id}")));
        }
    }
    Ok(())
}

fn validate_attachments(attachments: &[crate::models::Attachment]) -> Result<(), AppError> {
    for attachment in attachments {
        if attachment.name.trim().is_empty() || attachment.url.trim().is_empty() {
            return Err(AppError::BadRequest(
                "Each attachment must have a name and url".to_string(),
            ));
        }
    }
    Ok(())
}
