use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use crate::api::validation::{
    optional, parse_active_status, parse_filter, required, StatusUpdate,
};
use crate::app::AppState;
use crate::auth::models::{Role, SessionUser};
use crate::auth::session::MessageResponse;
use crate::db::job_repository::JobRepository;
use crate::db::models::{new_id, ActiveStatus, Job, JobChanges, JobFilter};
use crate::db::organisation_repository::OrganisationRepository;
use crate::error::AppError;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobListQuery {
    pub status: Option<String>,
    pub organisation_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub title: Option<String>,
    pub organisation_id: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub employment_type: Option<String>,
    pub salary: Option<String>,
    pub status: Option<String>,
}

async fn ensure_organisation(
    organisations: &dyn OrganisationRepository,
    id: &str,
) -> Result<(), AppError> {
    if organisations.find_by_id(id).await?.is_none() {
        return Err(AppError::BadRequest(format!(
            "Organisation '{id}' does not exist"
        )));
    }
    Ok(())
}

pub async fn process_list_jobs(
    jobs: &dyn JobRepository,
    query: &JobListQuery,
) -> Result<Vec<Job>, AppError> {
    let filter = JobFilter {
        status: parse_filter(query.status.as_deref(), parse_active_status)?,
        organisation_id: optional(query.organisation_id.as_deref()),
    };

    let mut list = jobs.list(&filter).await?;
    list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(list)
}

pub async fn process_create_job(
    jobs: &dyn JobRepository,
    organisations: &dyn OrganisationRepository,
    actor: &SessionUser,
    request: JobRequest,
) -> Result<Job, AppError> {
    let title = required(request.title.as_deref(), "title")?;
    let organisation_id = required(request.organisation_id.as_deref(), "organisationId")?;
    let description = required(request.description.as_deref(), "description")?;
    let status = match optional(request.status.as_deref()) {
        Some(s) => parse_active_status(&s)?,
        None => ActiveStatus::Active,
    };

    ensure_organisation(organisations, &organisation_id).await?;

    let now = Utc::now();
    let job = Job {
        id: new_id(),
        title,
        organisation_id,
        description,
        location: optional(request.location.as_deref()).unwrap_or_default(),
        employment_type: optional(request.employment_type.as_deref()).unwrap_or_default(),
        salary: optional(request.salary.as_deref()),
        status,
        applications: 0,
        created_by: Some(actor.uid.clone()),
        created_at: now,
        updated_at: now,
    };

    jobs.create_or_update(job.clone()).await?;
    tracing::info!(id = %job.id, organisation = %job.organisation_id, "job created");
    Ok(job)
}

pub async fn process_get_job(jobs: &dyn JobRepository, id: &str) -> Result<Job, AppError> {
    jobs.find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job '{id}' not found")))
}

pub async fn process_update_job(
    jobs: &dyn JobRepository,
    organisations: &dyn OrganisationRepository,
    id: &str,
    request: JobRequest,
) -> Result<Job, AppError> {
    let job = process_get_job(jobs, id).await?;

    let mut changes = JobChanges {
        updated_at: Some(Utc::now()),
        ..Default::default()
    };
    if let Some(title) = request.title.as_deref() {
        changes.title = Some(required(Some(title), "title")?);
    }
    if let Some(organisation_id) = request.organisation_id.as_deref() {
        let organisation_id = required(Some(organisation_id), "organisationId")?;
        if organisation_id != job.organisation_id {
            ensure_organisation(organisations, &organisation_id).await?;
            changes.organisation_id = Some(organisation_id);
        }
    }
    if let Some(description) = request.description.as_deref() {
        changes.description = Some(required(Some(description), "description")?);
    }
    if let Some(location) = request.location.as_deref() {
        changes.location = Some(location.trim().to_string());
    }
    if let Some(employment_type) = request.employment_type.as_deref() {
        changes.employment_type = Some(employment_type.trim().to_string());
    }
    if let Some(salary) = request.salary.as_deref() {
        changes.salary = Some(optional(Some(salary)));
    }
    if let Some(status) = request.status.as_deref() {
        changes.status = Some(parse_active_status(status)?);
    }

    jobs.update(id, &changes)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job '{id}' not found")))
}

pub async fn process_set_job_status(
    jobs: &dyn JobRepository,
    id: &str,
    status: &str,
) -> Result<Job, AppError> {
    let changes = JobChanges {
        status: Some(parse_active_status(status)?),
        updated_at: Some(Utc::now()),
        ..Default::default()
    };

    let job = jobs
        .update(id, &changes)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job '{id}' not found")))?;
    tracing::info!(id = %job.id, status = %job.status, "job status changed");
    Ok(job)
}

pub async fn process_delete_job(jobs: &dyn JobRepository, id: &str) -> Result<(), AppError> {
    if !jobs.delete(id).await? {
        return Err(AppError::NotFound(format!("Job '{id}' not found")));
    }
    tracing::info!(id = %id, "job deleted");
    Ok(())
}

/// Axum handler for `GET /api/jobs`.
pub async fn list_jobs_handler(
    State(state): State<AppState>,
    user: SessionUser,
    Query(query): Query<JobListQuery>,
) -> Result<Json<Vec<Job>>, AppError> {
    user.require(&[Role::Admin, Role::Moderator])?;
    Ok(Json(process_list_jobs(state.job_repo.as_ref(), &query).await?))
}

/// Axum handler for `POST /api/jobs`.
pub async fn create_job_handler(
    State(state): State<AppState>,
    user: SessionUser,
    Json(request): Json<JobRequest>,
) -> Result<Json<Job>, AppError> {
    user.require(&[Role::Admin])?;
    let job = process_create_job(
        state.job_repo.as_ref(),
        state.organisation_repo.as_ref(),
        &user,
        request,
    )
    .await?;
    Ok(Json(job))
}

/// Axum handler for `GET /api/jobs/{id}`.
pub async fn get_job_handler(
    State(state): State<AppState>,
    user: SessionUser,
    Path(id): Path<String>,
) -> Result<Json<Job>, AppError> {
    user.require(&[Role::Admin, Role::Moderator])?;
    Ok(Json(process_get_job(state.job_repo.as_ref(), &id).await?))
}

/// Axum handler for `PUT /api/jobs/{id}`.
pub async fn update_job_handler(
    State(state): State<AppState>,
    user: SessionUser,
    Path(id): Path<String>,
    Json(request): Json<JobRequest>,
) -> Result<Json<Job>, AppError> {
    user.require(&[Role::Admin])?;
    let job = process_update_job(
        state.job_repo.as_ref(),
        state.organisation_repo.as_ref(),
        &id,
        request,
    )
    .await?;
    Ok(Json(job))
}

/// Axum handler for `PATCH /api/jobs/{id}/status`.
pub async fn set_job_status_handler(
    State(state): State<AppState>,
    user: SessionUser,
    Path(id): Path<String>,
    Json(request): Json<StatusUpdate>,
) -> Result<Json<Job>, AppError> {
    user.require(&[Role::Admin, Role::Moderator])?;
    let job = process_set_job_status(state.job_repo.as_ref(), &id, &request.status).await?;
    Ok(Json(job))
}

/// Axum handler for `DELETE /api/jobs/{id}`.
pub async fn delete_job_handler(
    State(state): State<AppState>,
    user: SessionUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require(&[Role::Admin])?;
    process_delete_job(state.job_repo.as_ref(), &id).await?;
    Ok(Json(MessageResponse {
        message: "Job deleted".into(),
    }))
}
