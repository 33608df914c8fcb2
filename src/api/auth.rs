use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::{CurrentUser, generate_token, hash_password, verify_password};
use crate::db::repository;
use crate::error::AppError;
use crate::models::{LoginRequest, RegisterRequest, Role, UpdateUserRequest, User};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

fn session_cookie(token: &str) -> Cookie<'static> {
    Cookie::build(("token", token.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(7))
        .build()
}

/// Self-service signup. Role defaults to member; requesting admin
/// requires the invite key.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let name = req.name.trim().to_string();
    let email = req.email.trim().to_lowercase();

    if name.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(AppError::BadRequest("Missing required fields".to_string()));
    }
    if !email.contains('@') {
        return Err(AppError::BadRequest("Invalid email".to_string()));
    }
    if req.password.len() < 6 {
        return Err(AppError::BadRequest(
            "Password must be at least 6 characters".to_string(),
        ));
    }
    if repository::find_user_by_email(&state.db, &email).await?.is_some() {
        return Err(AppError::BadRequest("User already exists".to_string()));
    }

    let role = resolve_requested_role(req.role.as_deref(), req.admin_key.as_deref(), &state)?;

    let now = chrono::Utc::now().to_rfc3339();
    let user = User {
        id: Uuid::new_v4().to_string(),
        name,
        email,
        password_hash: hash_password(&req.password)?,
        role,
        profile_image_url: req.profile_image_url,
        created_by: None,
        created_at: now.clone(),
        updated_at: now,
    };
    repository::insert_user(&state.db, &user).await?;
    info!("registered user {} as {}", user.id, user.role.as_str());

    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    let email = req.email.trim().to_lowercase();

    let user = repository::find_user_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid email or password".to_string()))?;

    if !verify_password(&req.password, &user.password_hash)? {
        return Err(AppError::Unauthorized(
            "Invalid email or password".to_string(),
        ));
    }

    let token = generate_token(&user.id, &state.config.jwt_secret)?;
    let jar = jar.add(session_cookie(&token));
    Ok((jar, Json(AuthResponse { token, user })))
}

pub async fn get_profile(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

/// Profile self-update. A fresh token is issued since the payload the
/// client holds may describe the pre-update account.
pub async fn update_profile(
    State(state): State<AppState>,
    jar: CookieJar,
    CurrentUser(mut user): CurrentUser,
    Json(req): Json<UpdateUserRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    if let Some(email) = &req.email {
        check_email_available(&state, email, &user.id).await?;
    }
    apply_user_update(&mut user, &req, &state)?;
    user.updated_at = chrono::Utc::now().to_rfc3339();
    repository::update_user(&state.db, &user).await?;

    let token = generate_token(&user.id, &state.config.jwt_secret)?;
    let jar = jar.add(session_cookie(&token));
    Ok((jar, Json(AuthResponse { token, user })))
}

/// Duplicate emails would otherwise surface as a constraint violation
/// and a 500; updates get the same 400 the register path gives.
pub async fn check_email_available(
    state: &AppState,
    email: &str,
    own_id: &str,
) -> Result<(), AppError> {
    let email = email.trim().to_lowercase();
    if let Some(other) = repository::find_user_by_email(&state.db, &email).await? {
        if other.id != own_id {
            return Err(AppError::BadRequest("Email already in use".to_string()));
        }
    }
    Ok(())
}

/// Shared between profile self-update and admin updates of other users.
/// Validates and applies in place; timestamps and persistence are the
/// caller's job.
pub fn apply_user_update(
    user: &mut User,
    req: &UpdateUserRequest,
    state: &AppState,
) -> Result<(), AppError> {
    if let Some(name) = &req.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::BadRequest("Name cannot be empty".to_string()));
        }
        user.name = name.to_string();
    }
    if let Some(email) = &req.email {
        let email = email.trim().to_lowercase();
        if !email.contains('@') {
            return Err(AppError::BadRequest("Invalid email".to_string()));
        }
        user.email = email;
    }
    if let Some(password) = &req.password {
        if password.len() < 6 {
            return Err(AppError::BadRequest(
                "Password must be at least 6 characters".to_string(),
            ));
        }
        user.password_hash = hash_password(password)?;
    }
    if let Some(role) = &req.role {
        if user.role.is_super_admin() {
            return Err(AppError::Forbidden(
                "The super admin role cannot be changed".to_string(),
            ));
        }
        user.role = resolve_requested_role(Some(role), req.admin_key.as_deref(), state)?;
    }
    if req.remove_image {
        user.profile_image_url = None;
    } else if let Some(url) = &req.profile_image_url {
        user.profile_image_url = Some(url.clone());
    }
    Ok(())
}

/// "admin" is granted only with the matching invite key; anything other
/// than admin/member is rejected. Super-admin is never assignable here.
fn resolve_requested_role(
    role: Option<&str>,
    admin_key: Option<&str>,
    state: &AppState,
) -> Result<Role, AppError> {
    match role {
        None => Ok(Role::Member),
        Some(raw) => match raw.to_lowercase().as_str() {
            "member" => Ok(Role::Member),
            "admin" => {
                if admin_key == Some(state.config.admin_invite_token.as_str())
                    && !state.config.admin_invite_token.is_empty()
                {
                    Ok(Role::Admin)
                } else {
                    Err(AppError::Forbidden("Invalid admin key".to_string()))
                }
            }
            _ => Err(AppError::BadRequest(format!("Invalid role \"{raw}\""))),
        },
    }
}
