#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use chrono::Utc;

use backoffice::app::{build_router, AppState};
use backoffice::auth::demo_auth::{demo_accounts, DemoIdentityProvider};
use backoffice::db::memory::MemoryStore;
use backoffice::db::models::{ActiveStatus, User};
use backoffice::pages;
use backoffice::storage::client::MemoryStorage;

pub const ADMIN_UID: &str = "demo-admin";
pub const EDITOR_UID: &str = "demo-editor";
pub const MODERATOR_UID: &str = "demo-moderator";

/// In-memory backends plus the full application router.
///
/// Every test gets its own store, object storage and identity provider, with
/// user records for the three demo accounts already in place.
pub struct TestEnv {
    pub router: Router,
    pub state: AppState,
    pub storage: Arc<MemoryStorage>,
}

impl TestEnv {
    pub async fn start() -> Self {
        let storage = Arc::new(MemoryStorage::new());
        let mut state = AppState::with_memory_backends(
            Arc::new(MemoryStore::new()),
            storage.clone(),
            Arc::new(DemoIdentityProvider::new(b"integration-secret".to_vec())),
            Arc::new(pages::templates().expect("Templates should compile")),
        );
        state.demo_mode = true;
        state.cookie_secure = false;

        for account in demo_accounts() {
            state
                .user_repo
                .create_or_update(User {
                    id: account.uid,
                    email: account.email,
                    display_name: account.display_name,
                    role: account.role,
                    status: ActiveStatus::Active,
                    created_at: Utc::now(),
                    last_login_at: None,
                })
                .await
                .expect("Failed to seed demo user");
        }

        Self {
            router: build_router(state.clone()),
            state,
            storage,
        }
    }

    /// Build an `axum_test::TestServer` from this environment's router.
    pub fn server(&self) -> axum_test::TestServer {
        axum_test::TestServer::builder()
            .save_cookies()
            .expect_success_by_default()
            .build(self.router.clone())
    }

    /// Build a `TestServer` that does NOT expect success by default (for error tests).
    pub fn server_permissive(&self) -> axum_test::TestServer {
        axum_test::TestServer::builder()
            .save_cookies()
            .build(self.router.clone())
    }

    /// A permissive server already signed in as the demo account `username`
    /// (`admin`, `editor` or `moderator`).
    pub async fn signed_in(&self, username: &str) -> axum_test::TestServer {
        let server = self.server_permissive();
        login(&server, username).await.assert_status_ok();
        server
    }
}

/// Helper: sign in with a demo account's credentials.
pub async fn login(server: &axum_test::TestServer, username: &str) -> axum_test::TestResponse {
    server
        .post("/api/auth/login")
        .json(&serde_json::json!({
            "email": format!("{username}@demo.local"),
            "password": username
        }))
        .await
}

/// Helper: create a post through the API and return its JSON.
pub async fn create_post(
    server: &axum_test::TestServer,
    author: &str,
    title: &str,
    status: &str,
) -> serde_json::Value {
    let response = server
        .post("/api/posts")
        .json(&serde_json::json!({
            "title": title,
            "content": format!("<p>{title} body</p>"),
            "createdBy": author,
            "status": status
        }))
        .await;
    response.assert_status_ok();
    response.json()
}

/// Helper: create an organisation through the API and return its id.
pub async fn create_organisation(server: &axum_test::TestServer, name: &str) -> String {
    let response = server
        .post("/api/organisations")
        .json(&serde_json::json!({ "name": name }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    body["id"].as_str().expect("organisation id").to_string()
}
