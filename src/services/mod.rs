pub mod status;

pub use status::sync_task_status;
