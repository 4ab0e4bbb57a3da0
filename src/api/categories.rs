use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::api::validation::{optional, required, resolve_slug};
use crate::app::AppState;
use crate::auth::models::{Role, SessionUser};
use crate::auth::session::MessageResponse;
use crate::db::category_repository::CategoryRepository;
use crate::db::models::{new_id, Category, PostFilter};
use crate::db::post_repository::PostRepository;
use crate::error::AppError;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    #[serde(flatten)]
    pub category: Category,
    pub post_count: i64,
}

async fn ensure_slug_free(
    categories: &dyn CategoryRepository,
    slug: &str,
    own_id: Option<&str>,
) -> Result<(), AppError> {
    match categories.find_by_slug(slug).await? {
        Some(existing) if Some(existing.id.as_str()) != own_id => Err(AppError::BadRequest(
            format!("Slug '{slug}' is already in use"),
        )),
        _ => Ok(()),
    }
}

pub async fn process_list_categories(
    categories: &dyn CategoryRepository,
    posts: &dyn PostRepository,
) -> Result<Vec<CategorySummary>, AppError> {
    let mut post_counts: HashMap<String, i64> = HashMap::new();
    for post in posts.list(&PostFilter::default()).await? {
        for category in post.categories {
            *post_counts.entry(category).or_default() += 1;
        }
    }

    Ok(categories
        .list()
        .await?
        .into_iter()
        .map(|category| CategorySummary {
            post_count: post_counts.get(&category.id).copied().unwrap_or(0),
            category,
        })
        .collect())
}

pub async fn process_create_category(
    categories: &dyn CategoryRepository,
    request: CategoryRequest,
) -> Result<Category, AppError> {
    let name = required(request.name.as_deref(), "name")?;
    let slug = resolve_slug(request.slug.as_deref(), &name)?;
    ensure_slug_free(categories, &slug, None).await?;

    let now = Utc::now();
    let category = Category {
        id: new_id(),
        name,
        slug,
        description: optional(request.description.as_deref()).unwrap_or_default(),
        created_at: now,
        updated_at: now,
    };

    // A concurrent insert of the same slug is caught by the unique index
    categories.create_or_update(category.clone()).await?;
    tracing::info!(id = %category.id, slug = %category.slug, "category created");
    Ok(category)
}

pub async fn process_get_category(
    categories: &dyn CategoryRepository,
    id: &str,
) -> Result<Category, AppError> {
    categories
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Category '{id}' not found")))
}

pub async fn process_update_category(
    categories: &dyn CategoryRepository,
    id: &str,
    request: CategoryRequest,
) -> Result<Category, AppError> {
    let mut category = process_get_category(categories, id).await?;

    if let Some(name) = request.name.as_deref() {
        category.name = required(Some(name), "name")?;
    }
    if let Some(slug) = request.slug.as_deref() {
        let slug = resolve_slug(Some(slug), &category.name)?;
        ensure_slug_free(categories, &slug, Some(&category.id)).await?;
        category.slug = slug;
    }
    if let Some(description) = request.description.as_deref() {
        category.description = description.trim().to_string();
    }
    category.updated_at = Utc::now();

    categories.create_or_update(category.clone()).await?;
    Ok(category)
}

/// Delete the category, then sweep its id out of every post.
///
/// The sweep is best effort: a failure leaves a dangling id behind but the
/// category itself is gone.
pub async fn process_delete_category(
    categories: &dyn CategoryRepository,
    posts: &dyn PostRepository,
    id: &str,
) -> Result<(), AppError> {
    if !categories.delete(id).await? {
        return Err(AppError::NotFound(format!("Category '{id}' not found")));
    }

    match posts.remove_category(id).await {
        Ok(swept) => tracing::info!(id = %id, swept, "category deleted"),
        Err(e) => tracing::warn!(id = %id, "Category deleted but post sweep failed: {e}"),
    }
    Ok(())
}

/// Axum handler for `GET /api/categories`.
pub async fn list_categories_handler(
    State(state): State<AppState>,
    _user: SessionUser,
) -> Result<Json<Vec<CategorySummary>>, AppError> {
    let list =
        process_list_categories(state.category_repo.as_ref(), state.post_repo.as_ref()).await?;
    Ok(Json(list))
}

/// Axum handler for `POST /api/categories`.
pub async fn create_category_handler(
    State(state): State<AppState>,
    user: SessionUser,
    Json(request): Json<CategoryRequest>,
) -> Result<Json<Category>, AppError> {
    user.require(&[Role::Admin])?;
    let category = process_create_category(state.category_repo.as_ref(), request).await?;
    Ok(Json(category))
}

/// Axum handler for `GET /api/categories/{id}`.
pub async fn get_category_handler(
    State(state): State<AppState>,
    _user: SessionUser,
    Path(id): Path<String>,
) -> Result<Json<Category>, AppError> {
    Ok(Json(process_get_category(state.category_repo.as_ref(), &id).await?))
}

/// Axum handler for `PUT /api/categories/{id}`.
pub async fn update_category_handler(
    State(state): State<AppState>,
    user: SessionUser,
    Path(id): Path<String>,
    Json(request): Json<CategoryRequest>,
) -> Result<Json<Category>, AppError> {
    user.require(&[Role::Admin])?;
    let category = process_update_category(state.category_repo.as_ref(), &id, request).await?;
    Ok(Json(category))
}

/// Axum handler for `DELETE /api/categories/{id}`.
pub async fn delete_category_handler(
    State(state): State<AppState>,
    user: SessionUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require(&[Role::Admin])?;
    process_delete_category(state.category_repo.as_ref(), state.post_repo.as_ref(), &id).await?;
    Ok(Json(MessageResponse {
        message: "Category deleted".into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::db::models::{Post, PostStatus};
    use crate::db::post_repository::MockPostRepository;

    fn named(name: &str) -> CategoryRequest {
        CategoryRequest {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    fn post_in(id: &str, categories: &[&str]) -> Post {
        Post {
            id: id.into(),
            title: id.into(),
            slug: id.into(),
            content: "c".into(),
            excerpt: String::new(),
            status: PostStatus::Draft,
            created_by: "ed".into(),
            categories: categories.iter().map(|c| c.to_string()).collect(),
            tags: vec![],
            featured_image: None,
            views: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            published_at: None,
        }
    }

    #[tokio::test]
    async fn test_create_derives_slug() {
        let store = MemoryStore::new();
        let category = process_create_category(&store, named("Release Notes"))
            .await
            .unwrap();
        assert_eq!(category.slug, "release-notes");

        let fetched = process_get_category(&store, &category.id).await.unwrap();
        assert_eq!(fetched.name, "Release Notes");
    }

    #[tokio::test]
    async fn test_duplicate_and_invalid_slugs() {
        let store = MemoryStore::new();
        process_create_category(&store, named("News")).await.unwrap();

        assert!(matches!(
            process_create_category(&store, named("news")).await,
            Err(AppError::BadRequest(_))
        ));

        let invalid = CategoryRequest {
            slug: Some("no spaces".into()),
            ..named("Other")
        };
        assert!(matches!(
            process_create_category(&store, invalid).await,
            Err(AppError::BadRequest(_))
        ));

        assert!(matches!(
            process_create_category(&store, CategoryRequest::default()).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_update_excludes_itself() {
        let store = MemoryStore::new();
        let news = process_create_category(&store, named("News")).await.unwrap();
        process_create_category(&store, named("Tips")).await.unwrap();

        let keep = CategoryRequest {
            slug: Some("news".into()),
            description: Some("Company news".into()),
            ..Default::default()
        };
        let updated = process_update_category(&store, &news.id, keep).await.unwrap();
        assert_eq!(updated.description, "Company news");

        let clash = CategoryRequest {
            slug: Some("tips".into()),
            ..Default::default()
        };
        assert!(matches!(
            process_update_category(&store, &news.id, clash).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_sweeps_posts() {
        let store = MemoryStore::new();
        let news = process_create_category(&store, named("News")).await.unwrap();
        let tips = process_create_category(&store, named("Tips")).await.unwrap();

        PostRepository::create_or_update(&store, post_in("p1", &[news.id.as_str(), tips.id.as_str()]))
            .await
            .unwrap();
        PostRepository::create_or_update(&store, post_in("p2", &[news.id.as_str()]))
            .await
            .unwrap();

        let before = process_list_categories(&store, &store).await.unwrap();
        let news_count = before
            .iter()
            .find(|c| c.category.id == news.id)
            .map(|c| c.post_count);
        assert_eq!(news_count, Some(2));

        process_delete_category(&store, &store, &news.id).await.unwrap();

        let p1 = PostRepository::find_by_id(&store, "p1").await.unwrap().unwrap();
        assert_eq!(p1.categories, vec![tips.id.clone()]);
        let p2 = PostRepository::find_by_id(&store, "p2").await.unwrap().unwrap();
        assert!(p2.categories.is_empty());

        assert!(matches!(
            process_delete_category(&store, &store, &news.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_succeeds_when_sweep_fails() {
        let store = MemoryStore::new();
        let news = process_create_category(&store, named("News")).await.unwrap();

        let mut posts = MockPostRepository::new();
        posts
            .expect_remove_category()
            .times(1)
            .returning(|_| Err(AppError::Database("connection reset".into())));

        process_delete_category(&store, &posts, &news.id).await.unwrap();
        assert!(matches!(
            process_get_category(&store, &news.id).await,
            Err(AppError::NotFound(_))
        ));
    }
}
