use sqlx::{FromRow, SqlitePool};

use crate::error::AppError;
use crate::models::{Attachment, Priority, Task, TaskStatus, TodoItem, User};

const USER_COLUMNS: &str =
    "id, name, email, password_hash, role, profile_image_url, created_by, created_at, updated_at";

const TASK_COLUMNS: &str = "id, title, description, priority, status, due_date, progress, \
     assigned_to, created_by, attachments, todo_checklist, created_at, updated_at";

/// Raw task row; the checklist, attachments and assignee set live in JSON
/// text columns and are decoded on the way out.
#[derive(Debug, FromRow)]
struct TaskRow {
    id: String,
    title: String,
    description: String,
    priority: Priority,
    status: TaskStatus,
    due_date: Option<String>,
    progress: i64,
    assigned_to: String,
    created_by: String,
    attachments: String,
    todo_checklist: String,
    created_at: String,
    updated_at: String,
}

impl TaskRow {
    fn into_task(self) -> Result<Task, AppError> {
        let assigned_to: Vec<String> = serde_json::from_str(&self.assigned_to)?;
        let attachments: Vec<Attachment> = serde_json::from_str(&self.attachments)?;
        let todo_checklist: Vec<TodoItem> = serde_json::from_str(&self.todo_checklist)?;
        Ok(Task {
            id: self.id,
            title: self.title,
            description: self.description,
            priority: self.priority,
            status: self.status,
            due_date: self.due_date,
            progress: self.progress,
            assigned_to,
            created_by: self.created_by,
            attachments,
            todo_checklist,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub async fn insert_user(db: &SqlitePool, user: &User) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, role, profile_image_url, created_by, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&user.id)
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role)
    .bind(&user.profile_image_url)
    .bind(&user.created_by)
    .bind(&user.created_at)
    .bind(&user.updated_at)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn update_user(db: &SqlitePool, user: &User) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE users SET name = ?, email = ?, password_hash = ?, role = ?, \
         profile_image_url = ?, created_by = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role)
    .bind(&user.profile_image_url)
    .bind(&user.created_by)
    .bind(&user.updated_at)
    .bind(&user.id)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn find_user_by_id(db: &SqlitePool, id: &str) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(user)
}

/// Email lookups are case-insensitive (NOCASE column).
pub async fn find_user_by_email(db: &SqlitePool, email: &str) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE email = ?"
    ))
    .bind(email)
    .fetch_optional(db)
    .await?;
    Ok(user)
}

pub async fn fetch_all_users(db: &SqlitePool) -> Result<Vec<User>, AppError> {
    let users = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC"
    ))
    .fetch_all(db)
    .await?;
    Ok(users)
}

pub async fn delete_user(db: &SqlitePool, id: &str) -> Result<bool, AppError> {
    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn insert_task(db: &SqlitePool, task: &Task) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO tasks (id, title, description, priority, status, due_date, progress, \
         assigned_to, created_by, attachments, todo_checklist, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&task.id)
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.priority)
    .bind(task.status)
    .bind(&task.due_date)
    .bind(task.progress)
    .bind(serde_json::to_string(&task.assigned_to)?)
    .bind(&task.created_by)
    .bind(serde_json::to_string(&task.attachments)?)
    .bind(serde_json::to_string(&task.todo_checklist)?)
    .bind(&task.created_at)
    .bind(&task.updated_at)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn update_task(db: &SqlitePool, task: &Task) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE tasks SET title = ?, description = ?, priority = ?, status = ?, due_date = ?, \
         progress = ?, assigned_to = ?, created_by = ?, attachments = ?, todo_checklist = ?, \
         updated_at = ? WHERE id = ?",
    )
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.priority)
    .bind(task.status)
    .bind(&task.due_date)
    .bind(task.progress)
    .bind(serde_json::to_string(&task.assigned_to)?)
    .bind(&task.created_by)
    .bind(serde_json::to_string(&task.attachments)?)
    .bind(serde_json::to_string(&task.todo_checklist)?)
    .bind(&task.updated_at)
    .bind(&task.id)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn find_task_by_id(db: &SqlitePool, id: &str) -> Result<Option<Task>, AppError> {
    let row = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    row.map(TaskRow::into_task).transpose()
}

/// Natural-key lookup used by import reconciliation.
pub async fn find_task_by_title_and_creator(
    db: &SqlitePool,
    title: &str,
    created_by: &str,
) -> Result<Option<Task>, AppError> {
    let row = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE title = ? AND created_by = ?"
    ))
    .bind(title)
    .bind(created_by)
    .fetch_optional(db)
    .await?;
    row.map(TaskRow::into_task).transpose()
}

pub async fn fetch_all_tasks(db: &SqlitePool) -> Result<Vec<Task>, AppError> {
    let rows = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at DESC"
    ))
    .fetch_all(db)
    .await?;
    rows.into_iter().map(TaskRow::into_task).collect()
}

pub async fn delete_task(db: &SqlitePool, id: &str) -> Result<bool, AppError> {
    let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}
