use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, patch, post};
use axum::{middleware, Router};
use tera::Tera;
use tower_http::trace::TraceLayer;

use crate::api::media::MAX_UPLOAD_BYTES;
use crate::api::{categories, jobs, media, organisations, posts, stats, users};
use crate::auth::identity::IdentityProvider;
use crate::auth::middleware::role_guard;
use crate::auth::session;
use crate::db::category_repository::CategoryRepository;
use crate::db::job_repository::JobRepository;
use crate::db::media_repository::MediaRepository;
use crate::db::memory::MemoryStore;
use crate::db::organisation_repository::OrganisationRepository;
use crate::db::post_repository::PostRepository;
use crate::db::user_repository::UserRepository;
use crate::pages;
use crate::storage::client::StorageClient;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub user_repo: Arc<dyn UserRepository>,
    pub post_repo: Arc<dyn PostRepository>,
    pub job_repo: Arc<dyn JobRepository>,
    pub organisation_repo: Arc<dyn OrganisationRepository>,
    pub category_repo: Arc<dyn CategoryRepository>,
    pub media_repo: Arc<dyn MediaRepository>,
    pub storage_client: Arc<dyn StorageClient>,
    pub identity: Arc<dyn IdentityProvider>,
    pub templates: Arc<Tera>,
    /// Whether the session cookie carries the `Secure` attribute.
    pub cookie_secure: bool,
    pub demo_mode: bool,
}

impl AppState {
    /// State backed entirely by one in-memory store.
    pub fn with_memory_backends(
        store: Arc<MemoryStore>,
        storage_client: Arc<dyn StorageClient>,
        identity: Arc<dyn IdentityProvider>,
        templates: Arc<Tera>,
    ) -> Self {
        Self {
            user_repo: store.clone(),
            post_repo: store.clone(),
            job_repo: store.clone(),
            organisation_repo: store.clone(),
            category_repo: store.clone(),
            media_repo: store,
            storage_client,
            identity,
            templates,
            cookie_secure: false,
            demo_mode: false,
        }
    }
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login", post(session::login_handler))
        .route("/api/auth/logout", post(session::logout_handler))
        .route("/api/auth/me", get(session::me_handler))
        .route(
            "/api/users",
            get(users::list_users_handler).post(users::create_user_handler),
        )
        .route(
            "/api/users/{id}",
            get(users::get_user_handler)
                .put(users::update_user_handler)
                .delete(users::delete_user_handler),
        )
        .route("/api/editors", get(users::list_editors_handler))
        .route(
            "/api/posts",
            get(posts::list_posts_handler).post(posts::create_post_handler),
        )
        .route(
            "/api/posts/{id}",
            get(posts::get_post_handler)
                .put(posts::update_post_handler)
                .delete(posts::delete_post_handler),
        )
        .route("/api/posts/{id}/status", patch(posts::set_post_status_handler))
        .route("/api/posts/{id}/views", post(posts::record_view_handler))
        .route(
            "/api/jobs",
            get(jobs::list_jobs_handler).post(jobs::create_job_handler),
        )
        .route(
            "/api/jobs/{id}",
            get(jobs::get_job_handler)
                .put(jobs::update_job_handler)
                .delete(jobs::delete_job_handler),
        )
        .route("/api/jobs/{id}/status", patch(jobs::set_job_status_handler))
        .route(
            "/api/organisations",
            get(organisations::list_organisations_handler)
                .post(organisations::create_organisation_handler),
        )
        .route(
            "/api/organisations/{id}",
            get(organisations::get_organisation_handler)
                .put(organisations::update_organisation_handler)
                .delete(organisations::delete_organisation_handler),
        )
        .route(
            "/api/organisations/{id}/status",
            patch(organisations::set_organisation_status_handler),
        )
        .route(
            "/api/categories",
            get(categories::list_categories_handler).post(categories::create_category_handler),
        )
        .route(
            "/api/categories/{id}",
            get(categories::get_category_handler)
                .put(categories::update_category_handler)
                .delete(categories::delete_category_handler),
        )
        .route(
            "/api/media",
            get(media::list_media_handler)
                .post(media::upload_media_handler)
                // Leave room for the multipart framing around a maximum-size file
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 64 * 1024)),
        )
        .route(
            "/api/media/{id}",
            get(media::get_media_handler).delete(media::delete_media_handler),
        )
        .route("/api/media/{id}/content", get(media::media_content_handler))
        .route(
            "/api/media/{id}/usage",
            post(media::add_usage_handler).delete(media::remove_usage_handler),
        )
        .route("/api/stats/overview", get(stats::overview_handler))
        .route("/api/stats/editor", get(stats::editor_stats_handler))
        .route("/api/stats/moderation", get(stats::moderation_stats_handler))
}

fn page_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/admin", get(pages::admin_overview_page))
        .route("/admin/users", get(pages::admin_users_page))
        .route("/admin/users/new", get(pages::admin_new_user_page))
        .route("/admin/editors", get(pages::admin_editors_page))
        .route("/admin/organisations", get(pages::admin_organisations_page))
        .route(
            "/admin/organisations/new",
            get(pages::admin_new_organisation_page),
        )
        .route("/admin/jobs", get(pages::admin_jobs_page))
        .route("/admin/jobs/new", get(pages::admin_new_job_page))
        .route("/admin/categories", get(pages::admin_categories_page))
        .route("/admin/categories/new", get(pages::admin_new_category_page))
        .route("/editor", get(pages::editor_overview_page))
        .route("/editor/posts", get(pages::editor_posts_page))
        .route("/editor/posts/new", get(pages::editor_new_post_page))
        .route("/editor/posts/{id}", get(pages::editor_post_preview_page))
        .route("/editor/media", get(pages::editor_media_page))
        .route("/moderator", get(pages::moderator_overview_page))
        .route("/moderator/posts", get(pages::moderator_posts_page))
        .route("/moderator/jobs", get(pages::moderator_jobs_page))
        .route_layer(middleware::from_fn_with_state(state.clone(), role_guard))
}

/// Build the full application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(pages::root_page))
        .route("/login", get(pages::login_page))
        .merge(page_routes(&state))
        .merge(api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    use crate::auth::demo_auth::DemoIdentityProvider;
    use crate::storage::client::MemoryStorage;

    fn router() -> Router {
        build_router(AppState::with_memory_backends(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryStorage::new()),
            Arc::new(DemoIdentityProvider::new("test-secret")),
            Arc::new(pages::templates().unwrap()),
        ))
    }

    async fn status_of(method: &str, uri: &str) -> (StatusCode, Option<String>) {
        let response = router()
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        (response.status(), location)
    }

    #[tokio::test]
    async fn test_api_requires_session() {
        assert_eq!(status_of("GET", "/api/auth/me").await.0, StatusCode::UNAUTHORIZED);
        assert_eq!(status_of("GET", "/api/stats/overview").await.0, StatusCode::UNAUTHORIZED);
        assert_eq!(status_of("DELETE", "/api/media/m1").await.0, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_pages_redirect_to_login() {
        let (status, location) = status_of("GET", "/moderator/jobs").await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(location.as_deref(), Some("/login"));
    }

    #[tokio::test]
    async fn test_unknown_route_and_method() {
        assert_eq!(status_of("GET", "/api/nothing").await.0, StatusCode::NOT_FOUND);
        assert_eq!(
            status_of("PATCH", "/api/categories").await.0,
            StatusCode::METHOD_NOT_ALLOWED
        );
    }

    #[tokio::test]
    async fn test_logout_needs_no_session() {
        let (status, _) = status_of("POST", "/api/auth/logout").await;
        assert_eq!(status, StatusCode::OK);
    }
}
