use serde::Deserialize;

use crate::auth::models::Role;
use crate::db::models::{ActiveStatus, PostStatus};
use crate::error::AppError;
use crate::rendering::content::{is_valid_slug, slugify};

/// Body of the `PATCH …/status` endpoints.
#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

/// Trimmed value of a required text field; blank counts as missing.
pub fn required(value: Option<&str>, field: &str) -> Result<String, AppError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::BadRequest(format!("{field} is required")))
}

/// Trimmed value of an optional text field; blank becomes `None`.
pub fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn parse_role(value: &str) -> Result<Role, AppError> {
    Role::from_str_ci(value).ok_or_else(|| {
        AppError::BadRequest(format!(
            "Invalid role '{value}'. Expected: admin, editor, moderator"
        ))
    })
}

pub fn parse_post_status(value: &str) -> Result<PostStatus, AppError> {
    PostStatus::from_str_ci(value).ok_or_else(|| {
        AppError::BadRequest(format!(
            "Invalid status '{value}'. Expected: draft, published, archived"
        ))
    })
}

pub fn parse_active_status(value: &str) -> Result<ActiveStatus, AppError> {
    ActiveStatus::from_str_ci(value).ok_or_else(|| {
        AppError::BadRequest(format!(
            "Invalid status '{value}'. Expected: active, inactive"
        ))
    })
}

/// Parse an optional query-string filter; an empty value means "no filter".
pub fn parse_filter<T>(
    value: Option<&str>,
    parse: impl Fn(&str) -> Result<T, AppError>,
) -> Result<Option<T>, AppError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => parse(v).map(Some),
        None => Ok(None),
    }
}

/// The slug to store: the explicit one if given, else derived from `source`.
pub fn resolve_slug(explicit: Option<&str>, source: &str) -> Result<String, AppError> {
    let slug = match optional(explicit) {
        Some(slug) => slug,
        None => slugify(source),
    };

    if !is_valid_slug(&slug) {
        return Err(AppError::BadRequest(format!(
            "Invalid slug '{slug}'. Use lowercase letters, digits and single dashes"
        )));
    }

    Ok(slug)
}
