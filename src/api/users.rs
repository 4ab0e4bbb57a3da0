use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::api::validation::{optional, parse_active_status, parse_filter, parse_role, required};
use crate::app::AppState;
use crate::auth::identity::IdentityProvider;
use crate::auth::models::{Role, SessionUser};
use crate::auth::session::MessageResponse;
use crate::db::models::{ActiveStatus, PostFilter, PostStatus, User, UserChanges, UserFilter};
use crate::db::post_repository::PostRepository;
use crate::db::user_repository::UserRepository;
use crate::error::AppError;

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    pub role: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub email: Option<String>,
    pub display_name: Option<String>,
    /// Defaults to `editor`.
    pub role: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub display_name: Option<String>,
    pub role: Option<String>,
    pub status: Option<String>,
}

/// An editor together with their post activity.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorSummary {
    #[serde(flatten)]
    pub user: User,
    pub post_count: i64,
    pub published_count: i64,
    pub total_views: i64,
}

pub async fn process_list_users(
    users: &dyn UserRepository,
    query: &UserListQuery,
) -> Result<Vec<User>, AppError> {
    let filter = UserFilter {
        role: parse_filter(query.role.as_deref(), parse_role)?,
        status: parse_filter(query.status.as_deref(), parse_active_status)?,
    };

    let mut list = users.list(&filter).await?;
    list.sort_by(|a, b| a.email.cmp(&b.email));
    Ok(list)
}

/// Create the identity account first, then the dashboard record keyed by its uid.
pub async fn process_create_user(
    identity: &dyn IdentityProvider,
    users: &dyn UserRepository,
    request: CreateUserRequest,
) -> Result<User, AppError> {
    let email = required(request.email.as_deref(), "email")?.to_lowercase();
    if !email.contains('@') {
        return Err(AppError::BadRequest(format!("Invalid email '{email}'")));
    }
    let display_name = required(request.display_name.as_deref(), "displayName")?;
    let password = request.password.unwrap_or_default();
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let role = match optional(request.role.as_deref()) {
        Some(role) => parse_role(&role)?,
        None => Role::Editor,
    };

    if users.find_by_email(&email).await?.is_some() {
        return Err(AppError::BadRequest(format!(
            "A user with email '{email}' already exists"
        )));
    }

    let uid = identity
        .create_account(&email, &password, &display_name)
        .await?;

    let user = User {
        id: uid,
        email,
        display_name,
        role,
        status: ActiveStatus::Active,
        created_at: Utc::now(),
        last_login_at: None,
    };

    if let Err(e) = users.create_or_update(user.clone()).await {
        // Don't leave an account behind that can never sign in
        if let Err(cleanup) = identity.delete_account(&user.id).await {
            tracing::warn!(uid = %user.id, "Failed to roll back identity account: {cleanup}");
        }
        return Err(e);
    }

    tracing::info!(uid = %user.id, role = %user.role, "user created");
    Ok(user)
}

pub async fn process_get_user(users: &dyn UserRepository, id: &str) -> Result<User, AppError> {
    users
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User '{id}' not found")))
}

pub async fn process_update_user(
    users: &dyn UserRepository,
    actor: &SessionUser,
    id: &str,
    request: UpdateUserRequest,
) -> Result<User, AppError> {
    let user = process_get_user(users, id).await?;
    let is_self = actor.uid == user.id;

    let mut changes = UserChanges::default();
    if let Some(display_name) = request.display_name.as_deref() {
        changes.display_name = Some(required(Some(display_name), "displayName")?);
    }
    if let Some(role) = request.role.as_deref() {
        let role = parse_role(role)?;
        if is_self && role != Role::Admin {
            return Err(AppError::BadRequest("You cannot change your own role".into()));
        }
        changes.role = Some(role);
    }
    if let Some(status) = request.status.as_deref() {
        let status = parse_active_status(status)?;
        if is_self && status != ActiveStatus::Active {
            return Err(AppError::BadRequest("You cannot deactivate yourself".into()));
        }
        changes.status = Some(status);
    }

    if changes.is_empty() {
        return Ok(user);
    }
    users
        .update(id, &changes)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User '{id}' not found")))
}

/// Remove the record, then the identity account. A failure on the
/// identity side is only logged: the user can no longer reach the dashboard.
pub async fn process_delete_user(
    identity: &dyn IdentityProvider,
    users: &dyn UserRepository,
    actor: &SessionUser,
    id: &str,
) -> Result<(), AppError> {
    if actor.uid == id {
        return Err(AppError::BadRequest("You cannot delete yourself".into()));
    }

    if !users.delete(id).await? {
        return Err(AppError::NotFound(format!("User '{id}' not found")));
    }

    if let Err(e) = identity.delete_account(id).await {
        tracing::warn!(uid = %id, "Failed to delete identity account: {e}");
    }

    tracing::info!(uid = %id, "user deleted");
    Ok(())
}

pub async fn process_list_editors(
    users: &dyn UserRepository,
    posts: &dyn PostRepository,
) -> Result<Vec<EditorSummary>, AppError> {
    let editors = process_list_users(
        users,
        &UserListQuery {
            role: Some(Role::Editor.to_string()),
            status: None,
        },
    )
    .await?;

    // (posts, published, views) per author
    let mut activity: HashMap<String, (i64, i64, i64)> = HashMap::new();
    for post in posts.list(&PostFilter::default()).await? {
        let entry = activity.entry(post.created_by).or_default();
        entry.0 += 1;
        if post.status == PostStatus::Published {
            entry.1 += 1;
        }
        entry.2 += post.views;
    }

    Ok(editors
        .into_iter()
        .map(|user| {
            let (post_count, published_count, total_views) =
                activity.get(&user.id).copied().unwrap_or_default();
            EditorSummary {
                user,
                post_count,
                published_count,
                total_views,
            }
        })
        .collect())
}

/// Axum handler for `GET /api/users`.
pub async fn list_users_handler(
    State(state): State<AppState>,
    user: SessionUser,
    Query(query): Query<UserListQuery>,
) -> Result<Json<Vec<User>>, AppError> {
    user.require(&[Role::Admin])?;
    Ok(Json(process_list_users(state.user_repo.as_ref(), &query).await?))
}

/// Axum handler for `POST /api/users`.
pub async fn create_user_handler(
    State(state): State<AppState>,
    user: SessionUser,
    Json(request): Json<CreateUserRequest>,
) -> Result<Json<User>, AppError> {
    user.require(&[Role::Admin])?;
    let created =
        process_create_user(state.identity.as_ref(), state.user_repo.as_ref(), request).await?;
    Ok(Json(created))
}

/// Axum handler for `GET /api/users/{id}`.
pub async fn get_user_handler(
    State(state): State<AppState>,
    user: SessionUser,
    Path(id): Path<String>,
) -> Result<Json<User>, AppError> {
    user.require(&[Role::Admin])?;
    Ok(Json(process_get_user(state.user_repo.as_ref(), &id).await?))
}

/// Axum handler for `PUT /api/users/{id}`.
pub async fn update_user_handler(
    State(state): State<AppState>,
    user: SessionUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<User>, AppError> {
    user.require(&[Role::Admin])?;
    let updated = process_update_user(state.user_repo.as_ref(), &user, &id, request).await?;
    Ok(Json(updated))
}

/// Axum handler for `DELETE /api/users/{id}`.
pub async fn delete_user_handler(
    State(state): State<AppState>,
    user: SessionUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require(&[Role::Admin])?;
    process_delete_user(state.identity.as_ref(), state.user_repo.as_ref(), &user, &id).await?;
    Ok(Json(MessageResponse {
        message: "User deleted".into(),
    }))
}

/// Axum handler for `GET /api/editors`.
pub async fn list_editors_handler(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<Json<Vec<EditorSummary>>, AppError> {
    user.require(&[Role::Admin])?;
    let editors =
        process_list_editors(state.user_repo.as_ref(), state.post_repo.as_ref()).await?;
    Ok(Json(editors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::demo_auth::DemoIdentityProvider;
    use crate::db::memory::MemoryStore;
    use crate::db::models::Post;

    fn admin() -> SessionUser {
        SessionUser {
            uid: "admin-1".into(),
            email: "admin@example.com".into(),
            display_name: "Admin".into(),
            role: Role::Admin,
        }
    }

    fn create_request(email: &str) -> CreateUserRequest {
        CreateUserRequest {
            email: Some(email.into()),
            display_name: Some("New Person".into()),
            role: Some("moderator".into()),
            password: Some("secret1".into()),
        }
    }

    fn post(id: &str, author: &str, status: PostStatus, views: i64) -> Post {
        Post {
            id: id.into(),
            title: id.into(),
            slug: id.into(),
            content: "body".into(),
            excerpt: String::new(),
            status,
            created_by: author.into(),
            categories: vec![],
            tags: vec![],
            featured_image: None,
            views,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            published_at: None,
        }
    }

    #[tokio::test]
    async fn test_create_user_creates_account_and_record() {
        let idp = DemoIdentityProvider::new(b"s".to_vec());
        let store = MemoryStore::new();

        let user = process_create_user(&idp, &store, create_request("New@Example.com"))
            .await
            .unwrap();
        assert_eq!(user.email, "new@example.com");
        assert_eq!(user.role, Role::Moderator);
        assert_eq!(user.status, ActiveStatus::Active);

        // The account can sign in and its uid is the record id
        let token = idp.sign_in_with_password("new@example.com", "secret1").await.unwrap();
        let cookie = idp
            .create_session_cookie(&token, std::time::Duration::from_secs(60))
            .await
            .unwrap();
        let claims = idp.verify_session_cookie(&cookie).await.unwrap();
        assert_eq!(claims.uid, user.id);
    }

    #[tokio::test]
    async fn test_create_user_validation() {
        let idp = DemoIdentityProvider::new(b"s".to_vec());
        let store = MemoryStore::new();

        let mut request = create_request("no-at-sign");
        assert!(matches!(
            process_create_user(&idp, &store, request).await,
            Err(AppError::BadRequest(_))
        ));

        request = create_request("a@b.c");
        request.password = Some("12345".into());
        assert!(matches!(
            process_create_user(&idp, &store, request).await,
            Err(AppError::BadRequest(_))
        ));

        request = create_request("a@b.c");
        request.display_name = Some("  ".into());
        assert!(matches!(
            process_create_user(&idp, &store, request).await,
            Err(AppError::BadRequest(_))
        ));

        request = create_request("a@b.c");
        request.role = Some("owner".into());
        assert!(matches!(
            process_create_user(&idp, &store, request).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let idp = DemoIdentityProvider::new(b"s".to_vec());
        let store = MemoryStore::new();

        process_create_user(&idp, &store, create_request("dup@example.com"))
            .await
            .unwrap();
        let result = process_create_user(&idp, &store, create_request("DUP@example.com")).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_list_users_sorted_and_filtered() {
        let idp = DemoIdentityProvider::new(b"s".to_vec());
        let store = MemoryStore::new();
        for email in ["zed@example.com", "amy@example.com"] {
            process_create_user(&idp, &store, create_request(email)).await.unwrap();
        }
        let mut editor = create_request("ed@example.com");
        editor.role = None;
        process_create_user(&idp, &store, editor).await.unwrap();

        let all = process_list_users(&store, &UserListQuery::default()).await.unwrap();
        let emails: Vec<_> = all.iter().map(|u| u.email.as_str()).collect();
        assert_eq!(emails, ["amy@example.com", "ed@example.com", "zed@example.com"]);

        let moderators = process_list_users(
            &store,
            &UserListQuery {
                role: Some("moderator".into()),
                status: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(moderators.len(), 2);

        let bad = process_list_users(
            &store,
            &UserListQuery {
                role: None,
                status: Some("sleeping".into()),
            },
        )
        .await;
        assert!(matches!(bad, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_admin_cannot_demote_or_delete_self() {
        let idp = DemoIdentityProvider::new(b"s".to_vec());
        let store = MemoryStore::new();
        let actor = admin();
        UserRepository::create_or_update(
            &store,
            User {
                id: actor.uid.clone(),
                email: actor.email.clone(),
                display_name: actor.display_name.clone(),
                role: Role::Admin,
                status: ActiveStatus::Active,
                created_at: Utc::now(),
                last_login_at: None,
            },
        )
        .await
        .unwrap();

        let demote = UpdateUserRequest {
            role: Some("editor".into()),
            ..Default::default()
        };
        assert!(matches!(
            process_update_user(&store, &actor, &actor.uid, demote).await,
            Err(AppError::BadRequest(_))
        ));

        assert!(matches!(
            process_delete_user(&idp, &store, &actor, &actor.uid).await,
            Err(AppError::BadRequest(_))
        ));

        // Renaming yourself is fine
        let rename = UpdateUserRequest {
            display_name: Some("Chief".into()),
            ..Default::default()
        };
        let updated = process_update_user(&store, &actor, &actor.uid, rename).await.unwrap();
        assert_eq!(updated.display_name, "Chief");
        assert_eq!(updated.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_update_and_delete_other_user() {
        let idp = DemoIdentityProvider::new(b"s".to_vec());
        let store = MemoryStore::new();
        let created = process_create_user(&idp, &store, create_request("x@example.com"))
            .await
            .unwrap();

        let update = UpdateUserRequest {
            status: Some("inactive".into()),
            role: Some("editor".into()),
            ..Default::default()
        };
        let updated = process_update_user(&store, &admin(), &created.id, update).await.unwrap();
        assert_eq!(updated.status, ActiveStatus::Inactive);
        assert_eq!(updated.role, Role::Editor);

        process_delete_user(&idp, &store, &admin(), &created.id).await.unwrap();
        assert!(matches!(
            process_get_user(&store, &created.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(idp.sign_in_with_password("x@example.com", "secret1").await.is_err());

        assert!(matches!(
            process_delete_user(&idp, &store, &admin(), &created.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    /// Stamps a login right after every read, like a sign-in racing an edit.
    struct LoginAfterRead(MemoryStore);

    #[async_trait::async_trait]
    impl UserRepository for LoginAfterRead {
        async fn create_or_update(&self, user: User) -> Result<(), AppError> {
            UserRepository::create_or_update(&self.0, user).await
        }

        async fn update(
            &self,
            id: &str,
            changes: &UserChanges,
        ) -> Result<Option<User>, AppError> {
            UserRepository::update(&self.0, id, changes).await
        }

        async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
            let found = UserRepository::find_by_id(&self.0, id).await?;
            self.0.record_login(id, Utc::now()).await?;
            Ok(found)
        }

        async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
            self.0.find_by_email(email).await
        }

        async fn list(&self, filter: &UserFilter) -> Result<Vec<User>, AppError> {
            UserRepository::list(&self.0, filter).await
        }

        async fn delete(&self, id: &str) -> Result<bool, AppError> {
            UserRepository::delete(&self.0, id).await
        }

        async fn record_login(
            &self,
            id: &str,
            at: chrono::DateTime<Utc>,
        ) -> Result<(), AppError> {
            self.0.record_login(id, at).await
        }
    }

    #[tokio::test]
    async fn test_update_keeps_login_recorded_meanwhile() {
        let idp = DemoIdentityProvider::new(b"s".to_vec());
        let users = LoginAfterRead(MemoryStore::new());
        let created = process_create_user(&idp, &users.0, create_request("y@example.com"))
            .await
            .unwrap();
        assert!(created.last_login_at.is_none());

        let update = UpdateUserRequest {
            display_name: Some("Renamed".into()),
            ..Default::default()
        };
        let updated = process_update_user(&users, &admin(), &created.id, update)
            .await
            .unwrap();
        assert_eq!(updated.display_name, "Renamed");
        assert_eq!(updated.role, Role::Moderator);
        assert!(updated.last_login_at.is_some());
    }

    #[tokio::test]
    async fn test_update_missing_user() {
        let store = MemoryStore::new();
        let result =
            process_update_user(&store, &admin(), "ghost", UpdateUserRequest::default()).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_editor_summaries() {
        let idp = DemoIdentityProvider::new(b"s".to_vec());
        let store = MemoryStore::new();
        let mut request = create_request("writer@example.com");
        request.role = Some("editor".into());
        let editor = process_create_user(&idp, &store, request).await.unwrap();

        for p in [
            post("p1", &editor.id, PostStatus::Published, 10),
            post("p2", &editor.id, PostStatus::Draft, 3),
            post("p3", "someone-else", PostStatus::Published, 99),
        ] {
            PostRepository::create_or_update(&store, p).await.unwrap();
        }

        let summaries = process_list_editors(&store, &store).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].post_count, 2);
        assert_eq!(summaries[0].published_count, 1);
        assert_eq!(summaries[0].total_views, 13);

        let json = serde_json::to_value(&summaries[0]).unwrap();
        assert_eq!(json["email"], "writer@example.com");
        assert_eq!(json["postCount"], 2);
    }
}
