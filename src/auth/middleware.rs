use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};

use crate::app::AppState;
use crate::auth::models::Role;
use crate::auth::session::resolve_session;

/// The dashboard area owned by a role.
pub fn role_home(role: Role) -> &'static str {
    match role {
        Role::Admin => "/admin",
        Role::Editor => "/editor",
        Role::Moderator => "/moderator",
    }
}

/// Where a user with `role` must be sent when they request `path`.
///
/// Returns `None` when the path lies inside the role's own area.
pub fn redirect_target(role: Role, path: &str) -> Option<&'static str> {
    let home = role_home(role);
    let inside = path == home
        || path
            .strip_prefix(home)
            .is_some_and(|rest| rest.starts_with('/'));

    if inside {
        None
    } else {
        Some(home)
    }
}

/// Page guard for the role areas.
///
/// Anonymous callers go to `/login`, callers outside their own area go to
/// their home. Allowed requests carry the `SessionUser` as an extension.
pub async fn role_guard(
    State(state): State<AppState>,
    jar: axum_extra::extract::CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let user = match resolve_session(&state, &jar).await {
        Ok(user) => user,
        Err(e) => {
            tracing::debug!("page access without a valid session: {e}");
            return Redirect::to("/login").into_response();
        }
    };

    if let Some(target) = redirect_target(user.role, request.uri().path()) {
        tracing::debug!(
            uid = %user.uid,
            role = %user.role,
            path = %request.uri().path(),
            "redirecting to role home"
        );
        return Redirect::to(target).into_response();
    }

    request.extensions_mut().insert(user);
    next.run(request).await
}
