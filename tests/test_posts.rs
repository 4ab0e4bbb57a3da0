mod common;

use common::{create_post, EDITOR_UID};

#[tokio::test]
async fn editor_creates_post_with_derived_fields() {
    let env = common::TestEnv::start().await;
    let editor = env.signed_in("editor").await;

    let response = editor
        .post("/api/posts")
        .json(&serde_json::json!({
            "title": "Hello World: A First Post!",
            "content": "<p>Welcome <script>alert(1)</script>to the <b>dashboard</b> today</p>",
            "createdBy": EDITOR_UID,
            "tags": ["intro", " ", "news"]
        }))
        .await;
    response.assert_status_ok();

    let post: serde_json::Value = response.json();
    assert_eq!(post["slug"].as_str(), Some("hello-world-a-first-post"));
    assert_eq!(post["status"].as_str(), Some("draft"));
    assert_eq!(post["views"].as_i64(), Some(0));
    assert_eq!(post["tags"], serde_json::json!(["intro", "news"]));
    assert!(post["publishedAt"].is_null());

    let content = post["content"].as_str().unwrap();
    assert!(!content.contains("<script>"));
    assert!(content.contains("<b>dashboard</b>"));
    assert_eq!(
        post["excerpt"].as_str(),
        Some("Welcome to the dashboard today")
    );
}

#[tokio::test]
async fn editor_cannot_create_for_someone_else() {
    let env = common::TestEnv::start().await;
    let editor = env.signed_in("editor").await;

    let response = editor
        .post("/api/posts")
        .json(&serde_json::json!({
            "title": "Ghost written",
            "content": "<p>x</p>",
            "createdBy": common::ADMIN_UID
        }))
        .await;
    response.assert_status_forbidden();
}

#[tokio::test]
async fn create_post_validation() {
    let env = common::TestEnv::start().await;
    let editor = env.signed_in("editor").await;

    editor
        .post("/api/posts")
        .json(&serde_json::json!({ "content": "<p>x</p>", "createdBy": EDITOR_UID }))
        .await
        .assert_status_bad_request();

    editor
        .post("/api/posts")
        .json(&serde_json::json!({
            "title": "Bad slug",
            "slug": "Not A Slug",
            "content": "<p>x</p>",
            "createdBy": EDITOR_UID
        }))
        .await
        .assert_status_bad_request();

    editor
        .post("/api/posts")
        .json(&serde_json::json!({
            "title": "Bad status",
            "content": "<p>x</p>",
            "createdBy": EDITOR_UID,
            "status": "pending"
        }))
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn duplicate_slug_is_rejected() {
    let env = common::TestEnv::start().await;
    let editor = env.signed_in("editor").await;

    create_post(&editor, EDITOR_UID, "Same title", "draft").await;

    let response = editor
        .post("/api/posts")
        .json(&serde_json::json!({
            "title": "Same title",
            "content": "<p>again</p>",
            "createdBy": EDITOR_UID
        }))
        .await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn editors_only_see_their_own_posts() {
    let env = common::TestEnv::start().await;
    let editor = env.signed_in("editor").await;
    let admin = env.signed_in("admin").await;
    let moderator = env.signed_in("moderator").await;

    let own = create_post(&editor, EDITOR_UID, "Mine", "draft").await;
    let other = create_post(&admin, common::ADMIN_UID, "Admin post", "published").await;

    let listed: Vec<serde_json::Value> = editor
        .get(&format!("/api/posts?createdBy={}", common::ADMIN_UID))
        .await
        .json();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], own["id"]);

    let all: Vec<serde_json::Value> = moderator.get("/api/posts").await.json();
    assert_eq!(all.len(), 2);
    // Newest first
    assert_eq!(all[0]["id"], other["id"]);

    let published: Vec<serde_json::Value> =
        admin.get("/api/posts?status=published").await.json();
    assert_eq!(published.len(), 1);

    let other_id = other["id"].as_str().unwrap();
    editor
        .get(&format!("/api/posts/{other_id}"))
        .await
        .assert_status_forbidden();
    editor
        .put(&format!("/api/posts/{other_id}"))
        .json(&serde_json::json!({ "title": "Hijacked" }))
        .await
        .assert_status_forbidden();
    editor
        .delete(&format!("/api/posts/{other_id}"))
        .await
        .assert_status_forbidden();
}

#[tokio::test]
async fn update_post_regenerates_empty_excerpt() {
    let env = common::TestEnv::start().await;
    let editor = env.signed_in("editor").await;

    let post = create_post(&editor, EDITOR_UID, "Original", "draft").await;
    let id = post["id"].as_str().unwrap();

    let response = editor
        .put(&format!("/api/posts/{id}"))
        .json(&serde_json::json!({
            "title": "Renamed",
            "content": "<p>Fresh words</p>",
            "excerpt": ""
        }))
        .await;
    response.assert_status_ok();

    let updated: serde_json::Value = response.json();
    assert_eq!(updated["title"].as_str(), Some("Renamed"));
    // Slug stays unless asked for
    assert_eq!(updated["slug"].as_str(), Some("original"));
    assert_eq!(updated["excerpt"].as_str(), Some("Fresh words"));
}

#[tokio::test]
async fn moderator_publishes_and_archives() {
    let env = common::TestEnv::start().await;
    let editor = env.signed_in("editor").await;
    let moderator = env.signed_in("moderator").await;

    let post = create_post(&editor, EDITOR_UID, "Needs review", "draft").await;
    let path = format!("/api/posts/{}/status", post["id"].as_str().unwrap());

    let published: serde_json::Value = moderator
        .patch(&path)
        .json(&serde_json::json!({ "status": "published" }))
        .await
        .json();
    assert_eq!(published["status"].as_str(), Some("published"));
    let published_at = published["publishedAt"].clone();
    assert!(!published_at.is_null());

    let archived: serde_json::Value = moderator
        .patch(&path)
        .json(&serde_json::json!({ "status": "archived" }))
        .await
        .json();
    assert_eq!(archived["status"].as_str(), Some("archived"));
    assert_eq!(archived["publishedAt"], published_at);

    moderator
        .patch(&path)
        .json(&serde_json::json!({ "status": "deleted" }))
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn role_restrictions_on_posts() {
    let env = common::TestEnv::start().await;
    let editor = env.signed_in("editor").await;
    let moderator = env.signed_in("moderator").await;

    let post = create_post(&editor, EDITOR_UID, "Guarded", "draft").await;
    let id = post["id"].as_str().unwrap();

    // Editors cannot moderate, moderators cannot author
    editor
        .patch(&format!("/api/posts/{id}/status"))
        .json(&serde_json::json!({ "status": "published" }))
        .await
        .assert_status_forbidden();
    moderator
        .post("/api/posts")
        .json(&serde_json::json!({
            "title": "Nope",
            "content": "<p>x</p>",
            "createdBy": common::MODERATOR_UID
        }))
        .await
        .assert_status_forbidden();
    moderator
        .delete(&format!("/api/posts/{id}"))
        .await
        .assert_status_forbidden();
}

#[tokio::test]
async fn record_view_increments_counter() {
    let env = common::TestEnv::start().await;
    let editor = env.signed_in("editor").await;

    let post = create_post(&editor, EDITOR_UID, "Popular", "published").await;
    let id = post["id"].as_str().unwrap();

    for _ in 0..3 {
        editor
            .post(&format!("/api/posts/{id}/views"))
            .await
            .assert_status_ok();
    }

    let fetched: serde_json::Value = editor.get(&format!("/api/posts/{id}")).await.json();
    assert_eq!(fetched["views"].as_i64(), Some(3));

    editor
        .post("/api/posts/missing/views")
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn delete_post() {
    let env = common::TestEnv::start().await;
    let editor = env.signed_in("editor").await;

    let post = create_post(&editor, EDITOR_UID, "Short lived", "draft").await;
    let path = format!("/api/posts/{}", post["id"].as_str().unwrap());

    editor.delete(&path).await.assert_status_ok();
    editor.get(&path).await.assert_status_not_found();
    editor.delete(&path).await.assert_status_not_found();
}

#[tokio::test]
async fn anonymous_requests_are_unauthorized() {
    let env = common::TestEnv::start().await;
    let server = env.server_permissive();

    server.get("/api/posts").await.assert_status_unauthorized();
    server
        .post("/api/posts")
        .json(&serde_json::json!({ "title": "x" }))
        .await
        .assert_status_unauthorized();
}
