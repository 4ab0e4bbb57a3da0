use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::api::validation::{
    optional, parse_active_status, parse_filter, required, StatusUpdate,
};
use crate::app::AppState;
use crate::auth::models::{Role, SessionUser};
use crate::auth::session::MessageResponse;
use crate::db::job_repository::JobRepository;
use crate::db::models::{new_id, ActiveStatus, JobFilter, Organisation, OrganisationChanges};
use crate::db::organisation_repository::OrganisationRepository;
use crate::error::AppError;

#[derive(Debug, Default, Deserialize)]
pub struct OrganisationListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganisationRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub website: Option<String>,
    /// Media id of the logo.
    pub logo: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganisationSummary {
    #[serde(flatten)]
    pub organisation: Organisation,
    pub job_count: i64,
}

pub async fn process_list_organisations(
    organisations: &dyn OrganisationRepository,
    jobs: &dyn JobRepository,
    query: &OrganisationListQuery,
) -> Result<Vec<OrganisationSummary>, AppError> {
    let status = parse_filter(query.status.as_deref(), parse_active_status)?;

    let mut job_counts: HashMap<String, i64> = HashMap::new();
    for job in jobs.list(&JobFilter::default()).await? {
        *job_counts.entry(job.organisation_id).or_default() += 1;
    }

    let mut list = organisations.list(status).await?;
    list.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));

    Ok(list
        .into_iter()
        .map(|organisation| OrganisationSummary {
            job_count: job_counts.get(&organisation.id).copied().unwrap_or(0),
            organisation,
        })
        .collect())
}

pub async fn process_create_organisation(
    organisations: &dyn OrganisationRepository,
    request: OrganisationRequest,
) -> Result<Organisation, AppError> {
    let name = required(request.name.as_deref(), "name")?;
    let status = match optional(request.status.as_deref()) {
        Some(s) => parse_active_status(&s)?,
        None => ActiveStatus::Active,
    };

    let now = Utc::now();
    let organisation = Organisation {
        id: new_id(),
        name,
        description: optional(request.description.as_deref()).unwrap_or_default(),
        website: optional(request.website.as_deref()),
        logo: optional(request.logo.as_deref()),
        status,
        created_at: now,
        updated_at: now,
    };

    organisations.create_or_update(organisation.clone()).await?;
    tracing::info!(id = %organisation.id, "organisation created");
    Ok(organisation)
}

pub async fn process_get_organisation(
    organisations: &dyn OrganisationRepository,
    id: &str,
) -> Result<Organisation, AppError> {
    organisations
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Organisation '{id}' not found")))
}

pub async fn process_update_organisation(
    organisations: &dyn OrganisationRepository,
    id: &str,
    request: OrganisationRequest,
) -> Result<Organisation, AppError> {
    let mut changes = OrganisationChanges {
        updated_at: Some(Utc::now()),
        ..Default::default()
    };
    if let Some(name) = request.name.as_deref() {
        changes.name = Some(required(Some(name), "name")?);
    }
    if let Some(description) = request.description.as_deref() {
        changes.description = Some(description.trim().to_string());
    }
    if let Some(website) = request.website.as_deref() {
        changes.website = Some(optional(Some(website)));
    }
    if let Some(logo) = request.logo.as_deref() {
        changes.logo = Some(optional(Some(logo)));
    }
    if let Some(status) = request.status.as_deref() {
        changes.status = Some(parse_active_status(status)?);
    }

    organisations
        .update(id, &changes)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Organisation '{id}' not found")))
}

pub async fn process_set_organisation_status(
    organisations: &dyn OrganisationRepository,
    id: &str,
    status: &str,
) -> Result<Organisation, AppError> {
    let changes = OrganisationChanges {
        status: Some(parse_active_status(status)?),
        updated_at: Some(Utc::now()),
        ..Default::default()
    };

    organisations
        .update(id, &changes)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Organisation '{id}' not found")))
}

pub async fn process_delete_organisation(
    organisations: &dyn OrganisationRepository,
    id: &str,
) -> Result<(), AppError> {
    if !organisations.delete(id).await? {
        return Err(AppError::NotFound(format!("Organisation '{id}' not found")));
    }
    tracing::info!(id = %id, "organisation deleted");
    Ok(())
}

/// Axum handler for `GET /api/organisations`.
pub async fn list_organisations_handler(
    State(state): State<AppState>,
    user: SessionUser,
    Query(query): Query<OrganisationListQuery>,
) -> Result<Json<Vec<OrganisationSummary>>, AppError> {
    user.require(&[Role::Admin, Role::Moderator])?;
    let list = process_list_organisations(
        state.organisation_repo.as_ref(),
        state.job_repo.as_ref(),
        &query,
    )
    .await?;
    Ok(Json(list))
}

/// Axum handler for `POST /api/organisations`.
pub async fn create_organisation_handler(
    State(state): State<AppState>,
    user: SessionUser,
    Json(request): Json<OrganisationRequest>,
) -> Result<Json<Organisation>, AppError> {
    user.require(&[Role::Admin])?;
    let organisation =
        process_create_organisation(state.organisation_repo.as_ref(), request).await?;
    Ok(Json(organisation))
}

/// Axum handler for `GET /api/organisations/{id}`.
pub async fn get_organisation_handler(
    State(state): State<AppState>,
    user: SessionUser,
    Path(id): Path<String>,
) -> Result<Json<Organisation>, AppError> {
    user.require(&[Role::Admin, Role::Moderator])?;
    let organisation = process_get_organisation(state.organisation_repo.as_ref(), &id).await?;
    Ok(Json(organisation))
}

/// Axum handler for `PUT /api/organisations/{id}`.
pub async fn update_organisation_handler(
    State(state): State<AppState>,
    user: SessionUser,
    Path(id): Path<String>,
    Json(request): Json<OrganisationRequest>,
) -> Result<Json<Organisation>, AppError> {
    user.require(&[Role::Admin])?;
    let organisation =
        process_update_organisation(state.organisation_repo.as_ref(), &id, request).await?;
    Ok(Json(organisation))
}

/// Axum handler for `PATCH /api/organisations/{id}/status`.
pub async fn set_organisation_status_handler(
    State(state): State<AppState>,
    user: SessionUser,
    Path(id): Path<String>,
    Json(request): Json<StatusUpdate>,
) -> Result<Json<Organisation>, AppError> {
    user.require(&[Role::Admin, Role::Moderator])?;
    let organisation =
        process_set_organisation_status(state.organisation_repo.as_ref(), &id, &request.status)
            .await?;
    Ok(Json(organisation))
}

/// Axum handler for `DELETE /api/organisations/{id}`.
pub async fn delete_organisation_handler(
    State(state): State<AppState>,
    user: SessionUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require(&[Role::Admin])?;
    process_delete_organisation(state.organisation_repo.as_ref(), &id).await?;
    Ok(Json(MessageResponse {
        message: "Organisation deleted".into(),
    }))
}
