use std::env;

use crate::error::AppError;

/// Process configuration, read once at startup and injected through
/// `AppState`. Business logic never touches the environment directly.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt_secret: String,
    /// Secret that gates admin-role creation (register, profile update,
    /// user import) and populates the exported "Admin Key" column.
    pub admin_invite_token: String,
    pub port: u16,
}

impl AppConfig {
    pub fn new_from_env() -> Result<Self, AppError> {
        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://taskboard.db".to_string());
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| AppError::BadRequest("JWT_SECRET is not set".to_string()))?;
        let admin_invite_token = env::var("ADMIN_INVITE_TOKEN").unwrap_or_default();
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        Ok(Self {
            database_url,
            jwt_secret,
            admin_invite_token,
            port,
        })
    }
}
