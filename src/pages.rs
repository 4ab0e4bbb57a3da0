use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum_extra::extract::CookieJar;
use serde::Serialize;
use tera::{Context, Tera};

use crate::api::categories::process_list_categories;
use crate::api::jobs::{process_list_jobs, JobListQuery};
use crate::api::media::process_list_media;
use crate::api::organisations::{process_list_organisations, OrganisationListQuery};
use crate::api::posts::{process_get_post, process_list_posts, PostListQuery};
use crate::api::stats::{
    process_editor_stats, process_moderation_stats, process_overview, StatsSources,
};
use crate::api::users::{process_list_editors, process_list_users, UserListQuery};
use crate::app::AppState;
use crate::auth::middleware::role_home;
use crate::auth::models::{Role, SessionUser};
use crate::auth::session::resolve_session;
use crate::db::models::{ActiveStatus, PostStatus};
use crate::error::AppError;
use crate::rendering::content::render_content;

/// Build the template set compiled into the binary.
pub fn templates() -> Result<Tera, tera::Error> {
    let mut tera = Tera::default();
    tera.add_raw_templates(vec![
        ("base.html", include_str!("../templates/base.html")),
        ("login.html", include_str!("../templates/login.html")),
        ("dashboard.html", include_str!("../templates/dashboard.html")),
        ("table_body.html", include_str!("../templates/table_body.html")),
        ("table.html", include_str!("../templates/table.html")),
        ("form.html", include_str!("../templates/form.html")),
        ("post_preview.html", include_str!("../templates/post_preview.html")),
        ("media.html", include_str!("../templates/media.html")),
    ])?;
    Ok(tera)
}

#[derive(Debug, Serialize)]
struct NavLink {
    href: &'static str,
    label: &'static str,
}

fn nav_for(role: Role) -> Vec<NavLink> {
    let links: &[(&'static str, &'static str)] = match role {
        Role::Admin => &[
            ("/admin", "Overview"),
            ("/admin/users", "Users"),
            ("/admin/editors", "Editors"),
            ("/admin/organisations", "Organisations"),
            ("/admin/jobs", "Jobs"),
            ("/admin/categories", "Categories"),
        ],
        Role::Editor => &[
            ("/editor", "Overview"),
            ("/editor/posts", "Posts"),
            ("/editor/media", "Media"),
        ],
        Role::Moderator => &[
            ("/moderator", "Overview"),
            ("/moderator/posts", "Posts"),
            ("/moderator/jobs", "Jobs"),
        ],
    };
    links
        .iter()
        .map(|&(href, label)| NavLink { href, label })
        .collect()
}

#[derive(Debug, Serialize)]
struct Stat {
    label: &'static str,
    value: String,
}

fn stat(label: &'static str, value: impl ToString) -> Stat {
    Stat {
        label,
        value: value.to_string(),
    }
}

#[derive(Debug, Serialize)]
struct Action {
    label: &'static str,
    method: &'static str,
    endpoint: String,
    body: Option<String>,
    confirm: Option<&'static str>,
}

impl Action {
    fn set_status(label: &'static str, endpoint: String, status: &str) -> Self {
        Action {
            label,
            method: "PATCH",
            endpoint,
            body: Some(serde_json::json!({ "status": status }).to_string()),
            confirm: None,
        }
    }

    fn delete(endpoint: String) -> Self {
        Action {
            label: "Delete",
            method: "DELETE",
            endpoint,
            body: None,
            confirm: Some("Delete this item?"),
        }
    }
}

#[derive(Debug, Serialize)]
struct Row {
    href: Option<String>,
    cells: Vec<String>,
    actions: Vec<Action>,
}

#[derive(Debug, Serialize)]
struct Table {
    caption: &'static str,
    columns: Vec<&'static str>,
    rows: Vec<Row>,
    has_actions: bool,
}

impl Table {
    fn new(caption: &'static str, columns: Vec<&'static str>, rows: Vec<Row>) -> Self {
        let has_actions = rows.iter().any(|r| !r.actions.is_empty());
        Self {
            caption,
            columns,
            rows,
            has_actions,
        }
    }
}

#[derive(Debug, Serialize)]
struct Choice {
    value: String,
    label: String,
}

#[derive(Debug, Serialize)]
struct Field {
    name: &'static str,
    label: &'static str,
    kind: &'static str,
    required: bool,
    value: String,
    options: Vec<Choice>,
}

impl Field {
    fn input(name: &'static str, label: &'static str, kind: &'static str, required: bool) -> Self {
        Field {
            name,
            label,
            kind,
            required,
            value: String::new(),
            options: Vec::new(),
        }
    }

    fn select(name: &'static str, label: &'static str, options: Vec<Choice>) -> Self {
        let value = options.first().map(|o| o.value.clone()).unwrap_or_default();
        Field {
            name,
            label,
            kind: "select",
            required: true,
            value,
            options,
        }
    }

    fn checkboxes(name: &'static str, label: &'static str, options: Vec<Choice>) -> Self {
        Field {
            name,
            label,
            kind: "checkboxes",
            required: false,
            value: String::new(),
            options,
        }
    }

    fn hidden(name: &'static str, value: String) -> Self {
        Field {
            name,
            label: "",
            kind: "hidden",
            required: true,
            value,
            options: Vec::new(),
        }
    }
}

fn choices<'a>(values: impl IntoIterator<Item = (&'a str, &'a str)>) -> Vec<Choice> {
    values
        .into_iter()
        .map(|(value, label)| Choice {
            value: value.to_string(),
            label: label.to_string(),
        })
        .collect()
}

#[derive(Debug, Serialize)]
struct Form {
    endpoint: &'static str,
    method: &'static str,
    next: &'static str,
    submit: &'static str,
    fields: Vec<Field>,
}

/// Context shared by every page.
fn base_context(title: &str, user: Option<&SessionUser>, current: &str) -> Context {
    let mut context = Context::new();
    context.insert("title", title);
    context.insert("user", &user);
    context.insert(
        "nav",
        &user.map(|u| nav_for(u.role)).unwrap_or_default(),
    );
    context.insert("current", current);
    context.insert("table", &Option::<Table>::None);
    context.insert("new_href", &Option::<&str>::None);
    context
}

fn render(tera: &Tera, template: &str, context: &Context) -> Result<Html<String>, AppError> {
    tera.render(template, context)
        .map(Html)
        .map_err(|e| AppError::Internal(format!("Failed to render '{template}': {e:?}")))
}

fn dashboard(
    state: &AppState,
    user: &SessionUser,
    title: &str,
    current: &str,
    stats: Vec<Stat>,
    table: Option<Table>,
) -> Result<Html<String>, AppError> {
    let mut context = base_context(title, Some(user), current);
    context.insert("stats", &stats);
    context.insert("table", &table);
    render(&state.templates, "dashboard.html", &context)
}

fn table_page(
    state: &AppState,
    user: &SessionUser,
    title: &str,
    current: &str,
    new_href: Option<&str>,
    table: Table,
) -> Result<Html<String>, AppError> {
    let mut context = base_context(title, Some(user), current);
    context.insert("table", &table);
    context.insert("new_href", &new_href);
    render(&state.templates, "table.html", &context)
}

fn form_page(
    state: &AppState,
    user: &SessionUser,
    title: &str,
    current: &str,
    form: Form,
) -> Result<Html<String>, AppError> {
    let mut context = base_context(title, Some(user), current);
    context.insert("form", &form);
    render(&state.templates, "form.html", &context)
}

fn date(value: &chrono::DateTime<chrono::Utc>) -> String {
    value.format("%Y-%m-%d").to_string()
}

fn active_toggle(endpoint: String, status: ActiveStatus) -> Action {
    match status {
        ActiveStatus::Active => Action::set_status("Deactivate", endpoint, "inactive"),
        ActiveStatus::Inactive => Action::set_status("Activate", endpoint, "active"),
    }
}

/// `GET /`: send the caller to their area, or to the login page.
pub async fn root_page(State(state): State<AppState>, jar: CookieJar) -> Redirect {
    match resolve_session(&state, &jar).await {
        Ok(user) => Redirect::to(role_home(user.role)),
        Err(_) => Redirect::to("/login"),
    }
}

/// `GET /login`. Signed-in callers go straight to their area.
pub async fn login_page(State(state): State<AppState>, jar: CookieJar) -> Result<Response, AppError> {
    if let Ok(user) = resolve_session(&state, &jar).await {
        return Ok(Redirect::to(role_home(user.role)).into_response());
    }

    let mut context = base_context("Sign in", None, "/login");
    context.insert("demo_mode", &state.demo_mode);
    Ok(render(&state.templates, "login.html", &context)?.into_response())
}

pub async fn admin_overview_page(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<Html<String>, AppError> {
    let s = process_overview(&StatsSources::from_state(&state), chrono::Utc::now()).await?;
    let stats = vec![
        stat("Users", s.users.total),
        stat("Editors", s.users.editors),
        stat("Moderators", s.users.moderators),
        stat("Posts", s.posts.total),
        stat("Published", format!("{} ({}%)", s.posts.published, s.posts.published_percentage)),
        stat("Drafts", s.posts.draft),
        stat("New this week", s.posts.created_last_7_days),
        stat("Total views", s.posts.total_views),
        stat("Active jobs", s.jobs.active),
        stat("Organisations", s.organisations.total),
        stat("Categories", s.categories),
        stat("Media files", s.media.total),
    ];
    dashboard(&state, &user, "Admin overview", "/admin", stats, None)
}

pub async fn admin_users_page(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<Html<String>, AppError> {
    let users = process_list_users(state.user_repo.as_ref(), &UserListQuery::default()).await?;
    let rows = users
        .into_iter()
        .map(|u| {
            let endpoint = format!("/api/users/{}", u.id);
            let mut actions = Vec::new();
            if u.id != user.uid {
                let toggle = match u.status {
                    ActiveStatus::Active => ("Deactivate", "inactive"),
                    ActiveStatus::Inactive => ("Activate", "active"),
                };
                actions.push(Action {
                    label: toggle.0,
                    method: "PUT",
                    endpoint: endpoint.clone(),
                    body: Some(serde_json::json!({ "status": toggle.1 }).to_string()),
                    confirm: None,
                });
                actions.push(Action::delete(endpoint));
            }
            Row {
                href: None,
                cells: vec![
                    u.email,
                    u.display_name,
                    u.role.to_string(),
                    u.status.to_string(),
                    u.last_login_at.as_ref().map(date).unwrap_or_else(|| "never".into()),
                ],
                actions,
            }
        })
        .collect();

    let table = Table::new(
        "Users",
        vec!["Email", "Name", "Role", "Status", "Last login"],
        rows,
    );
    table_page(&state, &user, "Users", "/admin/users", Some("/admin/users/new"), table)
}

pub async fn admin_new_user_page(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<Html<String>, AppError> {
    let form = Form {
        endpoint: "/api/users",
        method: "POST",
        next: "/admin/users",
        submit: "Create user",
        fields: vec![
            Field::input("email", "Email", "email", true),
            Field::input("displayName", "Display name", "text", true),
            Field::select(
                "role",
                "Role",
                choices([
                    ("editor", "Editor"),
                    ("moderator", "Moderator"),
                    ("admin", "Admin"),
                ]),
            ),
            Field::input("password", "Initial password", "password", true),
        ],
    };
    form_page(&state, &user, "New user", "/admin/users", form)
}

pub async fn admin_editors_page(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<Html<String>, AppError> {
    let editors =
        process_list_editors(state.user_repo.as_ref(), state.post_repo.as_ref()).await?;
    let rows = editors
        .into_iter()
        .map(|e| Row {
            href: None,
            cells: vec![
                e.user.display_name,
                e.user.email,
                e.user.status.to_string(),
                e.post_count.to_string(),
                e.published_count.to_string(),
                e.total_views.to_string(),
            ],
            actions: Vec::new(),
        })
        .collect();

    let table = Table::new(
        "Editors",
        vec!["Name", "Email", "Status", "Posts", "Published", "Views"],
        rows,
    );
    table_page(&state, &user, "Editors", "/admin/editors", None, table)
}

pub async fn admin_organisations_page(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<Html<String>, AppError> {
    let organisations = process_list_organisations(
        state.organisation_repo.as_ref(),
        state.job_repo.as_ref(),
        &OrganisationListQuery::default(),
    )
    .await?;

    let rows = organisations
        .into_iter()
        .map(|o| {
            let endpoint = format!("/api/organisations/{}", o.organisation.id);
            Row {
                href: None,
                actions: vec![
                    active_toggle(format!("{endpoint}/status"), o.organisation.status),
                    Action::delete(endpoint),
                ],
                cells: vec![
                    o.organisation.name,
                    o.organisation.website.unwrap_or_default(),
                    o.organisation.status.to_string(),
                    o.job_count.to_string(),
                ],
            }
        })
        .collect();

    let table = Table::new(
        "Organisations",
        vec!["Name", "Website", "Status", "Jobs"],
        rows,
    );
    table_page(
        &state,
        &user,
        "Organisations",
        "/admin/organisations",
        Some("/admin/organisations/new"),
        table,
    )
}

pub async fn admin_new_organisation_page(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<Html<String>, AppError> {
    let form = Form {
        endpoint: "/api/organisations",
        method: "POST",
        next: "/admin/organisations",
        submit: "Create organisation",
        fields: vec![
            Field::input("name", "Name", "text", true),
            Field::input("website", "Website", "url", false),
            Field::input("description", "Description", "textarea", false),
        ],
    };
    form_page(&state, &user, "New organisation", "/admin/organisations", form)
}

async fn jobs_table(state: &AppState, with_delete: bool) -> Result<Table, AppError> {
    let jobs = process_list_jobs(state.job_repo.as_ref(), &JobListQuery::default()).await?;
    let organisations = process_list_organisations(
        state.organisation_repo.as_ref(),
        state.job_repo.as_ref(),
        &OrganisationListQuery::default(),
    )
    .await?;
    let names: HashMap<String, String> = organisations
        .into_iter()
        .map(|o| (o.organisation.id, o.organisation.name))
        .collect();

    let rows = jobs
        .into_iter()
        .map(|j| {
            let endpoint = format!("/api/jobs/{}", j.id);
            let mut actions = vec![active_toggle(format!("{endpoint}/status"), j.status)];
            if with_delete {
                actions.push(Action::delete(endpoint));
            }
            Row {
                href: None,
                cells: vec![
                    j.title,
                    names
                        .get(&j.organisation_id)
                        .cloned()
                        .unwrap_or(j.organisation_id),
                    j.location,
                    j.status.to_string(),
                    date(&j.created_at),
                ],
                actions,
            }
        })
        .collect();

    Ok(Table::new(
        "Jobs",
        vec!["Title", "Organisation", "Location", "Status", "Created"],
        rows,
    ))
}

pub async fn admin_jobs_page(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<Html<String>, AppError> {
    let table = jobs_table(&state, true).await?;
    table_page(&state, &user, "Jobs", "/admin/jobs", Some("/admin/jobs/new"), table)
}

pub async fn admin_new_job_page(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<Html<String>, AppError> {
    let organisations = process_list_organisations(
        state.organisation_repo.as_ref(),
        state.job_repo.as_ref(),
        &OrganisationListQuery {
            status: Some(ActiveStatus::Active.to_string()),
        },
    )
    .await?;
    let options = organisations
        .into_iter()
        .map(|o| Choice {
            value: o.organisation.id,
            label: o.organisation.name,
        })
        .collect();

    let form = Form {
        endpoint: "/api/jobs",
        method: "POST",
        next: "/admin/jobs",
        submit: "Create job",
        fields: vec![
            Field::input("title", "Title", "text", true),
            Field::select("organisationId", "Organisation", options),
            Field::input("location", "Location", "text", false),
            Field::input("employmentType", "Employment type", "text", false),
            Field::input("salary", "Salary", "text", false),
            Field::input("description", "Description", "textarea", true),
        ],
    };
    form_page(&state, &user, "New job", "/admin/jobs", form)
}

pub async fn admin_categories_page(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<Html<String>, AppError> {
    let categories =
        process_list_categories(state.category_repo.as_ref(), state.post_repo.as_ref()).await?;
    let rows = categories
        .into_iter()
        .map(|c| Row {
            href: None,
            actions: vec![Action::delete(format!("/api/categories/{}", c.category.id))],
            cells: vec![
                c.category.name,
                c.category.slug,
                c.category.description,
                c.post_count.to_string(),
            ],
        })
        .collect();

    let table = Table::new(
        "Categories",
        vec!["Name", "Slug", "Description", "Posts"],
        rows,
    );
    table_page(
        &state,
        &user,
        "Categories",
        "/admin/categories",
        Some("/admin/categories/new"),
        table,
    )
}

pub async fn admin_new_category_page(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<Html<String>, AppError> {
    let form = Form {
        endpoint: "/api/categories",
        method: "POST",
        next: "/admin/categories",
        submit: "Create category",
        fields: vec![
            Field::input("name", "Name", "text", true),
            Field::input("slug", "Slug (optional)", "text", false),
            Field::input("description", "Description", "textarea", false),
        ],
    };
    form_page(&state, &user, "New category", "/admin/categories", form)
}

pub async fn editor_overview_page(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<Html<String>, AppError> {
    let s = process_editor_stats(state.post_repo.as_ref(), &user.uid).await?;
    let stats = vec![
        stat("Posts", s.total_posts),
        stat("Published", s.published),
        stat("Drafts", s.draft),
        stat("Archived", s.archived),
        stat("Total views", s.total_views),
        stat("Average views", s.average_views),
    ];
    let rows = s
        .top_posts
        .into_iter()
        .map(|p| Row {
            href: Some(format!("/editor/posts/{}", p.id)),
            cells: vec![p.title, p.status.to_string(), p.views.to_string()],
            actions: Vec::new(),
        })
        .collect();
    let table = Table::new("Top posts", vec!["Title", "Status", "Views"], rows);

    dashboard(&state, &user, "Your overview", "/editor", stats, Some(table))
}

pub async fn editor_posts_page(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<Html<String>, AppError> {
    let posts =
        process_list_posts(state.post_repo.as_ref(), &user, &PostListQuery::default()).await?;
    let rows = posts
        .into_iter()
        .map(|p| {
            let endpoint = format!("/api/posts/{}", p.id);
            Row {
                href: Some(format!("/editor/posts/{}", p.id)),
                cells: vec![
                    p.title,
                    p.status.to_string(),
                    p.views.to_string(),
                    date(&p.created_at),
                ],
                actions: vec![Action::delete(endpoint)],
            }
        })
        .collect();

    let table = Table::new("Posts", vec!["Title", "Status", "Views", "Created"], rows);
    table_page(
        &state,
        &user,
        "Your posts",
        "/editor/posts",
        Some("/editor/posts/new"),
        table,
    )
}

pub async fn editor_new_post_page(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<Html<String>, AppError> {
    let categories =
        process_list_categories(state.category_repo.as_ref(), state.post_repo.as_ref()).await?;
    let category_choices = categories
        .into_iter()
        .map(|c| Choice {
            value: c.category.id,
            label: c.category.name,
        })
        .collect();

    let form = Form {
        endpoint: "/api/posts",
        method: "POST",
        next: "/editor/posts",
        submit: "Save post",
        fields: vec![
            Field::hidden("createdBy", user.uid.clone()),
            Field::input("title", "Title", "text", true),
            Field::input("slug", "Slug (optional)", "text", false),
            Field::input("excerpt", "Excerpt (optional)", "text", false),
            Field::input("content", "Content", "textarea", true),
            Field::checkboxes("categories", "Categories", category_choices),
            Field::select(
                "status",
                "Status",
                choices([("draft", "Draft"), ("published", "Published")]),
            ),
        ],
    };
    form_page(&state, &user, "New post", "/editor/posts", form)
}

pub async fn editor_post_preview_page(
    State(state): State<AppState>,
    user: SessionUser,
    Path(id): Path<String>,
) -> Result<Html<String>, AppError> {
    let post = process_get_post(state.post_repo.as_ref(), &id).await?;
    if post.created_by != user.uid {
        return Err(AppError::Forbidden(
            "Editors can only preview their own posts".into(),
        ));
    }

    let mut context = base_context(&post.title, Some(&user), "/editor/posts");
    context.insert("body", &render_content(&post.content));
    context.insert("post", &post);
    render(&state.templates, "post_preview.html", &context)
}

pub async fn editor_media_page(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<Html<String>, AppError> {
    let media = process_list_media(
        state.media_repo.as_ref(),
        &crate::api::media::MediaListQuery {
            uploaded_by: Some(user.uid.clone()),
        },
    )
    .await?;

    let rows = media
        .into_iter()
        .map(|m| {
            let endpoint = format!("/api/media/{}", m.id);
            let mut actions = Vec::new();
            if m.usage_count == 0 {
                actions.push(Action::delete(endpoint.clone()));
            }
            Row {
                href: Some(format!("{endpoint}/content")),
                cells: vec![
                    m.file_name,
                    m.content_type,
                    format!("{:.1} KiB", m.size as f64 / 1024.0),
                    m.usage_count.to_string(),
                ],
                actions,
            }
        })
        .collect();

    let mut context = base_context("Media", Some(&user), "/editor/media");
    context.insert(
        "table",
        &Table::new("Media", vec!["File", "Type", "Size", "In use"], rows),
    );
    render(&state.templates, "media.html", &context)
}

pub async fn moderator_overview_page(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<Html<String>, AppError> {
    let s = process_moderation_stats(
        state.post_repo.as_ref(),
        state.job_repo.as_ref(),
        state.organisation_repo.as_ref(),
    )
    .await?;
    let stats = vec![
        stat("Drafts awaiting review", s.pending_posts),
        stat("Published posts", s.published_posts),
        stat("Archived posts", s.archived_posts),
        stat("Active jobs", s.active_jobs),
        stat("Inactive jobs", s.inactive_jobs),
        stat("Inactive organisations", s.inactive_organisations),
    ];
    dashboard(&state, &user, "Moderation", "/moderator", stats, None)
}

pub async fn moderator_posts_page(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<Html<String>, AppError> {
    let posts =
        process_list_posts(state.post_repo.as_ref(), &user, &PostListQuery::default()).await?;
    let rows = posts
        .into_iter()
        .map(|p| {
            let endpoint = format!("/api/posts/{}/status", p.id);
            let actions = [PostStatus::Published, PostStatus::Draft, PostStatus::Archived]
                .into_iter()
                .filter(|s| *s != p.status)
                .map(|s| {
                    let label = match s {
                        PostStatus::Published => "Publish",
                        PostStatus::Draft => "Back to draft",
                        PostStatus::Archived => "Archive",
                    };
                    Action::set_status(label, endpoint.clone(), &s.to_string())
                })
                .collect();
            Row {
                href: None,
                cells: vec![
                    p.title,
                    p.created_by,
                    p.status.to_string(),
                    date(&p.created_at),
                ],
                actions,
            }
        })
        .collect();

    let table = Table::new("Posts", vec!["Title", "Author", "Status", "Created"], rows);
    table_page(&state, &user, "Post review", "/moderator/posts", None, table)
}

pub async fn moderator_jobs_page(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<Html<String>, AppError> {
    let table = jobs_table(&state, false).await?;
    table_page(&state, &user, "Job review", "/moderator/jobs", None, table)
}
