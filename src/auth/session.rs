use std::time::Duration;

use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::Json;
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::auth::identity::IdentityProvider;
use crate::auth::middleware::role_home;
use crate::auth::models::SessionUser;
use crate::db::models::{ActiveStatus, User};
use crate::db::user_repository::UserRepository;
use crate::error::AppError;

/// Name of the cookie carrying the platform-issued session.
pub const SESSION_COOKIE: &str = "session";

/// How long a session stays valid.
pub const SESSION_TTL: Duration = Duration::from_secs(5 * 24 * 60 * 60);

/// Body of `POST /api/auth/login`. Either an ID token obtained client-side,
/// or an email/password pair to exchange for one.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub id_token: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub message: String,
    pub user: SessionUser,
    pub redirect: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Outcome of a successful login: the cookie value to set and who it is for.
#[derive(Debug)]
pub struct LoginOutcome {
    pub session_cookie: String,
    pub user: SessionUser,
}

fn session_user(user: &User) -> SessionUser {
    SessionUser {
        uid: user.id.clone(),
        email: user.email.clone(),
        display_name: user.display_name.clone(),
        role: user.role,
    }
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

/// Look up the user record behind a verified uid.
///
/// Missing or inactive records are `Forbidden`: the caller proved who they
/// are but has no dashboard access.
pub async fn load_session_user(
    users: &dyn UserRepository,
    uid: &str,
) -> Result<SessionUser, AppError> {
    let user = users
        .find_by_id(uid)
        .await?
        .ok_or_else(|| AppError::Forbidden("No dashboard account for this user".into()))?;

    if user.status != ActiveStatus::Active {
        return Err(AppError::Forbidden("Account is inactive".into()));
    }

    Ok(session_user(&user))
}

/// Core login logic, separated from the HTTP handler for testability.
pub async fn process_login(
    identity: &dyn IdentityProvider,
    users: &dyn UserRepository,
    request: &LoginRequest,
) -> Result<LoginOutcome, AppError> {
    let id_token = match (
        non_blank(request.id_token.as_ref()),
        non_blank(request.email.as_ref()),
        request.password.as_deref().filter(|p| !p.is_empty()),
    ) {
        (Some(token), _, _) => token.to_string(),
        (None, Some(email), Some(password)) => {
            identity.sign_in_with_password(email, password).await?
        }
        _ => {
            return Err(AppError::BadRequest(
                "Provide either idToken or email and password".into(),
            ))
        }
    };

    let session_cookie = identity.create_session_cookie(&id_token, SESSION_TTL).await?;
    let claims = identity.verify_session_cookie(&session_cookie).await?;
    let user = load_session_user(users, &claims.uid).await?;

    users.record_login(&user.uid, Utc::now()).await?;

    Ok(LoginOutcome {
        session_cookie,
        user,
    })
}

/// Resolve the caller from the session cookie.
///
/// No cookie or an invalid one is `Auth` (401); a valid cookie for a
/// missing or inactive account is `Forbidden` (403).
pub async fn resolve_session(state: &AppState, jar: &CookieJar) -> Result<SessionUser, AppError> {
    let cookie = jar
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Auth("Not signed in".into()))?;

    let claims = state.identity.verify_session_cookie(&cookie).await?;
    load_session_user(state.user_repo.as_ref(), &claims.uid).await
}

fn session_cookie(value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::seconds(SESSION_TTL.as_secs() as i64))
        .build()
}

/// Axum handler for `POST /api/auth/login`.
pub async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), AppError> {
    let outcome =
        process_login(state.identity.as_ref(), state.user_repo.as_ref(), &request).await?;

    tracing::info!(uid = %outcome.user.uid, role = %outcome.user.role, "user signed in");

    let redirect = role_home(outcome.user.role).to_string();
    let jar = jar.add(session_cookie(outcome.session_cookie, state.cookie_secure));

    Ok((
        jar,
        Json(LoginResponse {
            message: "Logged in".into(),
            user: outcome.user,
            redirect,
        }),
    ))
}

/// Axum handler for `POST /api/auth/logout`.
pub async fn logout_handler(jar: CookieJar) -> (CookieJar, Json<MessageResponse>) {
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (
        jar,
        Json(MessageResponse {
            message: "Logged out".into(),
        }),
    )
}

/// Axum handler for `GET /api/auth/me`.
pub async fn me_handler(user: SessionUser) -> Json<SessionUser> {
    Json(user)
}

impl FromRequestParts<AppState> for SessionUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Page routes already resolved the session in the guard
        if let Some(user) = parts.extensions.get::<SessionUser>() {
            return Ok(user.clone());
        }

        let jar = CookieJar::from_headers(&parts.headers);
        resolve_session(state, &jar).await
    }
}
