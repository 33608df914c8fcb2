use crate::models::{Task, TaskStatus};

/// Recompute `progress` and `status` from the checklist. Idempotent; must
/// run as the last step before every task persist so the stored status can
/// never drift from checklist content. Values set by the caller are
/// overwritten.
pub fn sync_task_status(task: &mut Task) {
    let total = task.todo_checklist.len();
    let completed = task.completed_todo_count();

    task.progress = if total > 0 {
        ((completed as f64 / total as f64) * 100.0).round() as i64
    } else {
        0
    };

    task.status = if total > 0 && completed == total {
        TaskStatus::Completed
    } else if completed > 0 {
        TaskStatus::InProgress
    } else {
        TaskStatus::Pending
    };
}
