mod common;

use axum::http::StatusCode;

fn assert_redirect(response: &axum_test::TestResponse, target: &str) {
    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(response.header("location"), target);
}

#[tokio::test]
async fn anonymous_visitors_are_sent_to_login() {
    let env = common::TestEnv::start().await;
    let server = env.server_permissive();

    for path in ["/", "/admin", "/admin/users", "/editor/posts", "/moderator"] {
        let response = server.get(path).await;
        assert_redirect(&response, "/login");
    }
}

#[tokio::test]
async fn login_page_renders_for_anonymous_visitors() {
    let env = common::TestEnv::start().await;
    let server = env.server_permissive();

    let response = server.get("/login").await;
    response.assert_status_ok();
    let html = response.text();
    assert!(html.contains("Sign in"));
    assert!(html.contains("admin@demo.local"));
}

#[tokio::test]
async fn signed_in_users_land_in_their_area() {
    let env = common::TestEnv::start().await;

    for (username, home) in [
        ("admin", "/admin"),
        ("editor", "/editor"),
        ("moderator", "/moderator"),
    ] {
        let server = env.signed_in(username).await;
        assert_redirect(&server.get("/").await, home);
        assert_redirect(&server.get("/login").await, home);
        server.get(home).await.assert_status_ok();
    }
}

#[tokio::test]
async fn roles_cannot_enter_other_areas() {
    let env = common::TestEnv::start().await;
    let editor = env.signed_in("editor").await;
    let moderator = env.signed_in("moderator").await;
    let admin = env.signed_in("admin").await;

    assert_redirect(&editor.get("/admin/users").await, "/editor");
    assert_redirect(&editor.get("/moderator/posts").await, "/editor");
    assert_redirect(&moderator.get("/editor/media").await, "/moderator");
    assert_redirect(&admin.get("/editor/posts").await, "/admin");
}

#[tokio::test]
async fn admin_pages_render() {
    let env = common::TestEnv::start().await;
    let admin = env.signed_in("admin").await;

    let users = admin.get("/admin/users").await;
    users.assert_status_ok();
    let html = users.text();
    assert!(html.contains("editor@demo.local"));
    assert!(html.contains("moderator@demo.local"));

    for path in [
        "/admin/users/new",
        "/admin/editors",
        "/admin/organisations",
        "/admin/organisations/new",
        "/admin/jobs",
        "/admin/jobs/new",
        "/admin/categories",
        "/admin/categories/new",
    ] {
        admin.get(path).await.assert_status_ok();
    }
}

#[tokio::test]
async fn editor_pages_render_and_preview_own_posts() {
    let env = common::TestEnv::start().await;
    let editor = env.signed_in("editor").await;
    let admin = env.signed_in("admin").await;

    let own = common::create_post(&editor, common::EDITOR_UID, "Preview me", "draft").await;
    let other = common::create_post(&admin, common::ADMIN_UID, "Hands off", "draft").await;

    let posts = editor.get("/editor/posts").await;
    posts.assert_status_ok();
    let html = posts.text();
    assert!(html.contains("Preview me"));
    assert!(!html.contains("Hands off"));

    let preview = editor
        .get(&format!("/editor/posts/{}", own["id"].as_str().unwrap()))
        .await;
    preview.assert_status_ok();
    assert!(preview.text().contains("<p>Preview me body</p>"));

    editor
        .get(&format!("/editor/posts/{}", other["id"].as_str().unwrap()))
        .await
        .assert_status_forbidden();

    editor.get("/editor/posts/new").await.assert_status_ok();
    editor.get("/editor/media").await.assert_status_ok();
}

#[tokio::test]
async fn moderator_pages_render() {
    let env = common::TestEnv::start().await;
    let moderator = env.signed_in("moderator").await;
    let admin = env.signed_in("admin").await;

    common::create_post(&admin, common::ADMIN_UID, "Awaiting review", "draft").await;

    let posts = moderator.get("/moderator/posts").await;
    posts.assert_status_ok();
    assert!(posts.text().contains("Awaiting review"));

    moderator.get("/moderator/jobs").await.assert_status_ok();
}
