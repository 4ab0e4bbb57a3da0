use axum::extract::{Multipart, Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use crate::api::validation::{optional, required};
use crate::app::AppState;
use crate::auth::models::{Role, SessionUser};
use crate::auth::session::MessageResponse;
use crate::db::media_repository::MediaRepository;
use crate::db::models::{new_id, Media, MediaUsage};
use crate::error::AppError;
use crate::storage::client::StorageClient;

/// Largest accepted upload.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaListQuery {
    pub uploaded_by: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MediaUsageRequest {
    pub kind: Option<String>,
    pub id: Option<String>,
}

/// A file received from the upload form.
#[derive(Debug)]
pub struct MediaUpload {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
    pub used_by: Option<MediaUsage>,
}

pub fn is_allowed_content_type(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    content_type.starts_with("image/")
        || content_type.starts_with("video/")
        || content_type == "application/pdf"
}

fn sanitize_file_name(file_name: &str) -> String {
    let sanitized = file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect::<String>();

    if sanitized.trim_matches(|c| c == '.' || c == '_').is_empty() {
        "upload".to_string()
    } else {
        sanitized
    }
}

fn usage_from(request: MediaUsageRequest) -> Result<MediaUsage, AppError> {
    Ok(MediaUsage {
        kind: required(request.kind.as_deref(), "kind")?,
        id: required(request.id.as_deref(), "id")?,
    })
}

/// Store the bytes, then the metadata record.
///
/// If the record cannot be written the object is removed again.
pub async fn process_upload(
    media: &dyn MediaRepository,
    storage: &dyn StorageClient,
    actor: &SessionUser,
    upload: MediaUpload,
) -> Result<Media, AppError> {
    if upload.data.is_empty() {
        return Err(AppError::BadRequest("File is empty".into()));
    }
    if upload.data.len() > MAX_UPLOAD_BYTES {
        return Err(AppError::BadRequest(format!(
            "File exceeds the {} MiB limit",
            MAX_UPLOAD_BYTES / (1024 * 1024)
        )));
    }
    if !is_allowed_content_type(&upload.content_type) {
        return Err(AppError::BadRequest(format!(
            "File type '{}' is not allowed. Expected an image, a video or a PDF",
            upload.content_type
        )));
    }

    let id = new_id();
    let storage_key = format!("media/{}_{}", id, sanitize_file_name(&upload.file_name));
    let size = upload.data.len() as i64;

    storage
        .put_object(&storage_key, upload.data, &upload.content_type)
        .await?;

    let used_by: Vec<MediaUsage> = upload.used_by.into_iter().collect();
    let record = Media {
        id,
        file_name: upload.file_name,
        content_type: upload.content_type,
        size,
        storage_key,
        uploaded_by: actor.uid.clone(),
        usage_count: used_by.len() as i64,
        used_by,
        created_at: Utc::now(),
    };

    if let Err(e) = media.create_or_update(record.clone()).await {
        if let Err(cleanup) = storage.delete_object(&record.storage_key).await {
            tracing::warn!(key = %record.storage_key, "Failed to remove orphaned object: {cleanup}");
        }
        return Err(e);
    }

    tracing::info!(id = %record.id, key = %record.storage_key, size, "media uploaded");
    Ok(record)
}

pub async fn process_list_media(
    media: &dyn MediaRepository,
    query: &MediaListQuery,
) -> Result<Vec<Media>, AppError> {
    let uploaded_by = optional(query.uploaded_by.as_deref());
    let mut list = media.list(uploaded_by.as_deref()).await?;
    list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(list)
}

pub async fn process_get_media(media: &dyn MediaRepository, id: &str) -> Result<Media, AppError> {
    media
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Media '{id}' not found")))
}

/// Record that `usage` references the media. Recording the same tuple twice
/// is a no-op.
pub async fn process_add_usage(
    media: &dyn MediaRepository,
    id: &str,
    usage: MediaUsage,
) -> Result<Media, AppError> {
    process_get_media(media, id).await?;
    if !media.add_usage(id, &usage).await? {
        tracing::debug!(id = %id, kind = %usage.kind, "usage already recorded");
    }
    process_get_media(media, id).await
}

/// Drop a usage tuple. Removing one that was never recorded is a no-op.
pub async fn process_remove_usage(
    media: &dyn MediaRepository,
    id: &str,
    usage: MediaUsage,
) -> Result<Media, AppError> {
    process_get_media(media, id).await?;
    if !media.remove_usage(id, &usage).await? {
        tracing::debug!(id = %id, kind = %usage.kind, "usage was not recorded");
    }
    process_get_media(media, id).await
}

/// Delete the record, then the object. Refused while anything uses the media.
///
/// The usage check and the record removal are one write, so a usage added
/// after the read still blocks the delete. A failure removing the bytes
/// afterwards is only logged.
pub async fn process_delete_media(
    media: &dyn MediaRepository,
    storage: &dyn StorageClient,
    id: &str,
) -> Result<(), AppError> {
    let record = process_get_media(media, id).await?;

    if !media.delete_unused(id).await? {
        return match media.find_by_id(id).await? {
            Some(current) => Err(AppError::BadRequest(format!(
                "Media is in use by {} item(s)",
                current.usage_count
            ))),
            None => Err(AppError::NotFound(format!("Media '{id}' not found"))),
        };
    }

    if let Err(e) = storage.delete_object(&record.storage_key).await {
        tracing::warn!(key = %record.storage_key, "Media record deleted but object removal failed: {e}");
    }

    tracing::info!(id = %id, key = %record.storage_key, "media deleted");
    Ok(())
}

async fn read_upload(mut multipart: Multipart) -> Result<MediaUpload, AppError> {
    let mut file: Option<(String, String, Vec<u8>)> = None;
    let mut used_by_kind = None;
    let mut used_by_id = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Multipart error: {e}")))?
    {
        match field.name().unwrap_or("") {
            "file" => {
                let file_name = field.file_name().unwrap_or("upload.bin").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read file: {e}")))?;
                file = Some((file_name, content_type, data.to_vec()));
            }
            "usedByKind" => {
                used_by_kind = Some(field.text().await.map_err(|e| {
                    AppError::BadRequest(format!("Failed to read usedByKind: {e}"))
                })?);
            }
            "usedById" => {
                used_by_id = Some(field.text().await.map_err(|e| {
                    AppError::BadRequest(format!("Failed to read usedById: {e}"))
                })?);
            }
            _ => {}
        }
    }

    let (file_name, content_type, data) =
        file.ok_or_else(|| AppError::BadRequest("No file field found in request".into()))?;

    let used_by = match (optional(used_by_kind.as_deref()), optional(used_by_id.as_deref())) {
        (Some(kind), Some(id)) => Some(MediaUsage { kind, id }),
        (None, None) => None,
        _ => {
            return Err(AppError::BadRequest(
                "usedByKind and usedById must be given together".into(),
            ))
        }
    };

    Ok(MediaUpload {
        file_name,
        content_type,
        data,
        used_by,
    })
}

/// Axum handler for `POST /api/media`.
///
/// Accepts a multipart form with a file field named "file" and optional
/// `usedByKind`/`usedById` fields.
pub async fn upload_media_handler(
    State(state): State<AppState>,
    user: SessionUser,
    multipart: Multipart,
) -> Result<Json<Media>, AppError> {
    user.require(&[Role::Admin, Role::Editor])?;
    let upload = read_upload(multipart).await?;
    let record = process_upload(
        state.media_repo.as_ref(),
        state.storage_client.as_ref(),
        &user,
        upload,
    )
    .await?;
    Ok(Json(record))
}

/// Axum handler for `GET /api/media`.
pub async fn list_media_handler(
    State(state): State<AppState>,
    user: SessionUser,
    Query(query): Query<MediaListQuery>,
) -> Result<Json<Vec<Media>>, AppError> {
    user.require(&[Role::Admin, Role::Editor])?;
    Ok(Json(process_list_media(state.media_repo.as_ref(), &query).await?))
}

/// Axum handler for `GET /api/media/{id}`.
pub async fn get_media_handler(
    State(state): State<AppState>,
    user: SessionUser,
    Path(id): Path<String>,
) -> Result<Json<Media>, AppError> {
    user.require(&[Role::Admin, Role::Editor])?;
    Ok(Json(process_get_media(state.media_repo.as_ref(), &id).await?))
}

/// Axum handler for `GET /api/media/{id}/content`.
///
/// Streams the stored bytes back with the recorded content type.
pub async fn media_content_handler(
    State(state): State<AppState>,
    _user: SessionUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let record = process_get_media(state.media_repo.as_ref(), &id).await?;

    let object = state
        .storage_client
        .get_object(&record.storage_key)
        .await?
        .ok_or_else(|| AppError::NotFound("Media content not found".into()))?;

    let content_type = object.content_type.unwrap_or(record.content_type);
    Ok(([(header::CONTENT_TYPE, content_type)], object.content).into_response())
}

/// Axum handler for `POST /api/media/{id}/usage`.
pub async fn add_usage_handler(
    State(state): State<AppState>,
    user: SessionUser,
    Path(id): Path<String>,
    Json(request): Json<MediaUsageRequest>,
) -> Result<Json<Media>, AppError> {
    user.require(&[Role::Admin, Role::Editor])?;
    let usage = usage_from(request)?;
    Ok(Json(process_add_usage(state.media_repo.as_ref(), &id, usage).await?))
}

/// Axum handler for `DELETE /api/media/{id}/usage`.
pub async fn remove_usage_handler(
    State(state): State<AppState>,
    user: SessionUser,
    Path(id): Path<String>,
    Json(request): Json<MediaUsageRequest>,
) -> Result<Json<Media>, AppError> {
    user.require(&[Role::Admin, Role::Editor])?;
    let usage = usage_from(request)?;
    Ok(Json(process_remove_usage(state.media_repo.as_ref(), &id, usage).await?))
}

/// Axum handler for `DELETE /api/media/{id}`.
pub async fn delete_media_handler(
    State(state): State<AppState>,
    user: SessionUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require(&[Role::Admin, Role::Editor])?;
    process_delete_media(state.media_repo.as_ref(), state.storage_client.as_ref(), &id).await?;
    Ok(Json(MessageResponse {
        message: "Media deleted".into(),
    }))
}
