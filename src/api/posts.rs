use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use crate::api::validation::{
    optional, parse_filter, parse_post_status, required, resolve_slug, StatusUpdate,
};
use crate::app::AppState;
use crate::auth::models::{Role, SessionUser};
use crate::auth::session::MessageResponse;
use crate::db::models::{new_id, Post, PostChanges, PostFilter, PostStatus};
use crate::db::post_repository::PostRepository;
use crate::error::AppError;
use crate::rendering::content::{plain_text_excerpt, sanitize_html};

/// Length of the excerpt derived from the content when none is given.
pub const EXCERPT_CHARS: usize = 200;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostListQuery {
    pub status: Option<String>,
    pub created_by: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub created_by: Option<String>,
    pub slug: Option<String>,
    pub excerpt: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub featured_image: Option<String>,
    pub status: Option<String>,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub slug: Option<String>,
    pub excerpt: Option<String>,
    pub categories: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub featured_image: Option<String>,
    pub status: Option<String>,
}

/// Editors only ever act on their own posts.
fn ensure_owner(actor: &SessionUser, post: &Post) -> Result<(), AppError> {
    if actor.is(Role::Editor) && post.created_by != actor.uid {
        return Err(AppError::Forbidden(
            "Editors can only manage their own posts".into(),
        ));
    }
    Ok(())
}

async fn ensure_slug_free(
    posts: &dyn PostRepository,
    slug: &str,
    own_id: Option<&str>,
) -> Result<(), AppError> {
    if let Some(existing) = posts.find_by_slug(slug).await? {
        if Some(existing.id.as_str()) != own_id {
            return Err(AppError::BadRequest(format!(
                "Slug '{slug}' is already in use"
            )));
        }
    }
    Ok(())
}

fn apply_status(post: &mut Post, status: PostStatus) {
    post.status = status;
    if status == PostStatus::Published && post.published_at.is_none() {
        post.published_at = Some(Utc::now());
    }
}

/// `publishedAt` is stamped the first time a post goes live and kept after.
fn status_changes(changes: &mut PostChanges, current: &Post, status: PostStatus) {
    changes.status = Some(status);
    if status == PostStatus::Published && current.published_at.is_none() {
        changes.published_at = Some(Utc::now());
    }
}

fn clean_list(values: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let value = value.trim().to_string();
        if !value.is_empty() && !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

pub async fn process_list_posts(
    posts: &dyn PostRepository,
    actor: &SessionUser,
    query: &PostListQuery,
) -> Result<Vec<Post>, AppError> {
    let created_by = if actor.is(Role::Editor) {
        Some(actor.uid.clone())
    } else {
        optional(query.created_by.as_deref())
    };

    let filter = PostFilter {
        status: parse_filter(query.status.as_deref(), parse_post_status)?,
        created_by,
        category: optional(query.category.as_deref()),
    };

    let mut list = posts.list(&filter).await?;
    list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(list)
}

pub async fn process_create_post(
    posts: &dyn PostRepository,
    actor: &SessionUser,
    request: CreatePostRequest,
) -> Result<Post, AppError> {
    let title = required(request.title.as_deref(), "title")?;
    let content = required(request.content.as_deref(), "content")?;
    let created_by = required(request.created_by.as_deref(), "createdBy")?;

    if actor.is(Role::Editor) && created_by != actor.uid {
        return Err(AppError::Forbidden(
            "Editors can only create posts for themselves".into(),
        ));
    }

    let slug = resolve_slug(request.slug.as_deref(), &title)?;
    ensure_slug_free(posts, &slug, None).await?;

    let status = match optional(request.status.as_deref()) {
        Some(s) => parse_post_status(&s)?,
        None => PostStatus::Draft,
    };

    let content = sanitize_html(&content);
    let excerpt = optional(request.excerpt.as_deref())
        .unwrap_or_else(|| plain_text_excerpt(&content, EXCERPT_CHARS));

    let now = Utc::now();
    let mut post = Post {
        id: new_id(),
        title,
        slug,
        content,
        excerpt,
        status: PostStatus::Draft,
        created_by,
        categories: clean_list(request.categories),
        tags: clean_list(request.tags),
        featured_image: optional(request.featured_image.as_deref()),
        views: 0,
        created_at: now,
        updated_at: now,
        published_at: None,
    };
    apply_status(&mut post, status);

    posts.create_or_update(post.clone()).await?;
    tracing::info!(id = %post.id, slug = %post.slug, "post created");
    Ok(post)
}

pub async fn process_get_post(posts: &dyn PostRepository, id: &str) -> Result<Post, AppError> {
    posts
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Post '{id}' not found")))
}

pub async fn process_update_post(
    posts: &dyn PostRepository,
    actor: &SessionUser,
    id: &str,
    request: UpdatePostRequest,
) -> Result<Post, AppError> {
    let post = process_get_post(posts, id).await?;
    ensure_owner(actor, &post)?;

    let mut changes = PostChanges {
        updated_at: Some(Utc::now()),
        ..Default::default()
    };

    if let Some(title) = request.title.as_deref() {
        changes.title = Some(required(Some(title), "title")?);
    }
    if let Some(content) = request.content.as_deref() {
        changes.content = Some(sanitize_html(&required(Some(content), "content")?));
    }
    if let Some(slug) = request.slug.as_deref() {
        let title = changes.title.as_deref().unwrap_or(&post.title);
        let slug = resolve_slug(Some(slug), title)?;
        ensure_slug_free(posts, &slug, Some(&post.id)).await?;
        changes.slug = Some(slug);
    }

    // An explicit excerpt wins; otherwise follow the content
    let content = changes.content.as_deref().unwrap_or(&post.content);
    changes.excerpt = match optional(request.excerpt.as_deref()) {
        Some(excerpt) => Some(excerpt),
        None if request.excerpt.is_some()
            || changes.content.is_some()
            || post.excerpt.is_empty() =>
        {
            Some(plain_text_excerpt(content, EXCERPT_CHARS))
        }
        None => None,
    };

    if let Some(categories) = request.categories {
        changes.categories = Some(clean_list(categories));
    }
    if let Some(tags) = request.tags {
        changes.tags = Some(clean_list(tags));
    }
    if let Some(image) = request.featured_image.as_deref() {
        changes.featured_image = Some(optional(Some(image)));
    }
    if let Some(status) = request.status.as_deref() {
        status_changes(&mut changes, &post, parse_post_status(status)?);
    }

    posts
        .update(id, &changes)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Post '{id}' not found")))
}

pub async fn process_set_post_status(
    posts: &dyn PostRepository,
    id: &str,
    status: &str,
) -> Result<Post, AppError> {
    let status = parse_post_status(status)?;
    let post = process_get_post(posts, id).await?;

    let mut changes = PostChanges {
        updated_at: Some(Utc::now()),
        ..Default::default()
    };
    status_changes(&mut changes, &post, status);

    let post = posts
        .update(id, &changes)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Post '{id}' not found")))?;
    tracing::info!(id = %post.id, status = %post.status, "post status changed");
    Ok(post)
}

pub async fn process_delete_post(
    posts: &dyn PostRepository,
    actor: &SessionUser,
    id: &str,
) -> Result<(), AppError> {
    let post = process_get_post(posts, id).await?;
    ensure_owner(actor, &post)?;

    if !posts.delete(id).await? {
        return Err(AppError::NotFound(format!("Post '{id}' not found")));
    }
    tracing::info!(id = %id, "post deleted");
    Ok(())
}

pub async fn process_record_view(posts: &dyn PostRepository, id: &str) -> Result<(), AppError> {
    if !posts.increment_views(id).await? {
        return Err(AppError::NotFound(format!("Post '{id}' not found")));
    }
    Ok(())
}

/// Axum handler for `GET /api/posts`.
pub async fn list_posts_handler(
    State(state): State<AppState>,
    user: SessionUser,
    Query(query): Query<PostListQuery>,
) -> Result<Json<Vec<Post>>, AppError> {
    let list = process_list_posts(state.post_repo.as_ref(), &user, &query).await?;
    Ok(Json(list))
}

/// Axum handler for `POST /api/posts`.
pub async fn create_post_handler(
    State(state): State<AppState>,
    user: SessionUser,
    Json(request): Json<CreatePostRequest>,
) -> Result<Json<Post>, AppError> {
    user.require(&[Role::Admin, Role::Editor])?;
    let post = process_create_post(state.post_repo.as_ref(), &user, request).await?;
    Ok(Json(post))
}

/// Axum handler for `GET /api/posts/{id}`.
pub async fn get_post_handler(
    State(state): State<AppState>,
    user: SessionUser,
    Path(id): Path<String>,
) -> Result<Json<Post>, AppError> {
    let post = process_get_post(state.post_repo.as_ref(), &id).await?;
    ensure_owner(&user, &post)?;
    Ok(Json(post))
}

/// Axum handler for `PUT /api/posts/{id}`.
pub async fn update_post_handler(
    State(state): State<AppState>,
    user: SessionUser,
    Path(id): Path<String>,
    Json(request): Json<UpdatePostRequest>,
) -> Result<Json<Post>, AppError> {
    user.require(&[Role::Admin, Role::Editor])?;
    let post = process_update_post(state.post_repo.as_ref(), &user, &id, request).await?;
    Ok(Json(post))
}

/// Axum handler for `PATCH /api/posts/{id}/status`.
pub async fn set_post_status_handler(
    State(state): State<AppState>,
    user: SessionUser,
    Path(id): Path<String>,
    Json(request): Json<StatusUpdate>,
) -> Result<Json<Post>, AppError> {
    user.require(&[Role::Admin, Role::Moderator])?;
    let post = process_set_post_status(state.post_repo.as_ref(), &id, &request.status).await?;
    Ok(Json(post))
}

/// Axum handler for `DELETE /api/posts/{id}`.
pub async fn delete_post_handler(
    State(state): State<AppState>,
    user: SessionUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require(&[Role::Admin, Role::Editor])?;
    process_delete_post(state.post_repo.as_ref(), &user, &id).await?;
    Ok(Json(MessageResponse {
        message: "Post deleted".into(),
    }))
}

/// Axum handler for `POST /api/posts/{id}/views`.
pub async fn record_view_handler(
    State(state): State<AppState>,
    _user: SessionUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    process_record_view(state.post_repo.as_ref(), &id).await?;
    Ok(Json(MessageResponse {
        message: "View recorded".into(),
    }))
}
