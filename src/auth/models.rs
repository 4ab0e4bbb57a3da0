use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AppError;

/// Dashboard roles. Each role owns one area of the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Manages users, organisations, jobs and categories.
    Admin,
    /// Writes posts and uploads media.
    Editor,
    /// Reviews post and job statuses.
    Moderator,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Editor => write!(f, "editor"),
            Role::Moderator => write!(f, "moderator"),
        }
    }
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Editor, Role::Moderator];

    /// Parse a role from a string (case-insensitive).
    pub fn from_str_ci(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "editor" => Some(Role::Editor),
            "moderator" => Some(Role::Moderator),
            _ => None,
        }
    }
}

/// The caller behind a verified session cookie, joined with their user record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    /// Identity platform uid, also the user record id.
    pub uid: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
}

impl SessionUser {
    /// Fail with `Forbidden` unless the user holds one of `allowed`.
    pub fn require(&self, allowed: &[Role]) -> Result<(), AppError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "Role '{}' cannot perform this action",
                self.role
            )))
        }
    }

    pub fn is(&self, role: Role) -> bool {
        self.role == role
    }
}
