//! Role-based visibility filters for user and task listings/exports, and
//! the gate for managing other user records.

use std::collections::HashSet;

use crate::error::AppError;
use crate::models::{Role, Task, User};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserScope {
    /// Super-admin: every admin and member (never the super-admin itself).
    AdminsAndMembers,
    /// Admin: members only.
    MembersOnly,
    Denied,
}

impl UserScope {
    pub fn allows(&self, user: &User) -> bool {
        match self {
            UserScope::AdminsAndMembers => {
                matches!(user.role, Role::Admin | Role::Member)
            }
            UserScope::MembersOnly => user.role == Role::Member,
            UserScope::Denied => false,
        }
    }
}

pub fn user_scope(caller: &User) -> UserScope {
    match caller.role {
        Role::SuperAdmin => UserScope::AdminsAndMembers,
        Role::Admin => UserScope::MembersOnly,
        Role::Member => UserScope::Denied,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskScope {
    All,
    /// Admin: tasks they created, plus tasks assigned to any member.
    /// Tasks assigned solely to other admins stay invisible.
    CreatedOrMemberAssigned { admin_id: String },
    AssignedTo(String),
}

impl TaskScope {
    /// `member_ids` is the id set of all member-role users; callers build
    /// it once per request so the same filter backs both the listing and
    /// its status summary.
    pub fn allows(&self, task: &Task, member_ids: &HashSet<String>) -> bool {
        match self {
            TaskScope::All => true,
            TaskScope::CreatedOrMemberAssigned { admin_id } => {
                task.created_by == *admin_id
                    || task.assigned_to.iter().any(|id| member_ids.contains(id))
            }
            TaskScope::AssignedTo(user_id) => task.assigned_to.contains(user_id),
        }
    }
}

pub fn task_scope(caller: &User) -> TaskScope {
    match caller.role {
        Role::SuperAdmin => TaskScope::All,
        Role::Admin => TaskScope::CreatedOrMemberAssigned {
            admin_id: caller.id.clone(),
        },
        Role::Member => TaskScope::AssignedTo(caller.id.clone()),
    }
}

/// Gate for deleting or updating another user record: admins manage
/// members, super-admins manage admins and members, and the super-admin
/// record itself is untouchable.
pub fn check_can_manage_user(caller: &User, target: &User) -> Result<(), AppError> {
    if !caller.role.is_admin() {
        return Err(AppError::Forbidden(
            "Access denied, admin or super admin only".to_string(),
        ));
    }
    match target.role {
        Role::SuperAdmin => Err(AppError::Forbidden(
            "The super admin account cannot be modified or deleted".to_string(),
        )),
        Role::Admin if !caller.role.is_super_admin() => Err(AppError::Forbidden(
            "Only the super admin can manage other admins".to_string(),
        )),
        _ => Ok(()),
    }
}
