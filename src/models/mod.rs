pub mod task;
pub mod user;

pub use task::{
    Attachment, NewTaskRequest, Priority, Task, TaskStatus, TodoItem, UpdateChecklistRequest,
    UpdateTaskRequest,
};
pub use user::{LoginRequest, RegisterRequest, Role, UpdateUserRequest, User};
