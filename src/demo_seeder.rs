use chrono::{Duration, Utc};

use crate::api::posts::EXCERPT_CHARS;
use crate::app::AppState;
use crate::auth::demo_auth::demo_accounts;
use crate::auth::models::Role;
use crate::db::models::{
    new_id, ActiveStatus, Category, Job, Organisation, Post, PostStatus, User,
};
use crate::error::AppError;
use crate::rendering::content::{plain_text_excerpt, render_content};

const DEMO_CATEGORIES: &[(&str, &str, &str)] = &[
    ("News", "news", "Announcements and updates"),
    ("Guides", "guides", "How-to articles"),
    ("Careers", "careers", "Hiring and workplace stories"),
];

const DEMO_POSTS: &[(&str, &str, &str, PostStatus, &[&str])] = &[
    (
        "Welcome to the dashboard",
        "welcome-to-the-dashboard",
        "# Welcome\n\nThis post was created by the **demo seeder**. Edit it from the editor area.",
        PostStatus::Published,
        &["news"],
    ),
    (
        "Writing a good job listing",
        "writing-a-good-job-listing",
        "Keep the title short.\n\n- State the location\n- State the employment type\n- Include a salary range",
        PostStatus::Published,
        &["guides", "careers"],
    ),
    (
        "Upcoming features",
        "upcoming-features",
        "A draft that has not been published yet.",
        PostStatus::Draft,
        &["news"],
    ),
];

const DEMO_ORGANISATIONS: &[(&str, &str, &str)] = &[
    ("Acme Corp", "Makers of everything", "https://acme.example"),
    ("Globex", "Energy and logistics", "https://globex.example"),
];

const DEMO_JOBS: &[(&str, usize, &str, &str)] = &[
    ("Backend Engineer", 0, "Remote", "full-time"),
    ("Content Writer", 0, "Berlin", "contract"),
    ("Logistics Coordinator", 1, "Rotterdam", "full-time"),
];

/// Populate an empty deployment with the demo accounts and a little sample
/// content. Records that already exist are left alone.
pub async fn seed_demo_data(state: &AppState) -> Result<(), AppError> {
    tracing::info!("Starting demo data seeding...");

    let mut editor_id = None;
    for account in demo_accounts() {
        if account.role == Role::Editor {
            editor_id = Some(account.uid.clone());
        }
        if state.user_repo.find_by_id(&account.uid).await?.is_some() {
            tracing::debug!(email = %account.email, "demo user already exists, skipping");
            continue;
        }
        state
            .user_repo
            .create_or_update(User {
                id: account.uid,
                email: account.email.clone(),
                display_name: account.display_name,
                role: account.role,
                status: ActiveStatus::Active,
                created_at: Utc::now(),
                last_login_at: None,
            })
            .await?;
        tracing::info!(email = %account.email, "seeded demo user");
    }

    let mut category_ids = Vec::new();
    for (name, slug, description) in DEMO_CATEGORIES {
        let category = match state.category_repo.find_by_slug(slug).await? {
            Some(existing) => existing,
            None => {
                let now = Utc::now();
                let category = Category {
                    id: new_id(),
                    name: name.to_string(),
                    slug: slug.to_string(),
                    description: description.to_string(),
                    created_at: now,
                    updated_at: now,
                };
                state.category_repo.create_or_update(category.clone()).await?;
                tracing::info!(slug = %slug, "seeded demo category");
                category
            }
        };
        category_ids.push((category.slug, category.id));
    }

    if let Some(author) = editor_id {
        let now = Utc::now();
        for (offset, (title, slug, markdown, status, categories)) in
            DEMO_POSTS.iter().enumerate()
        {
            if state.post_repo.find_by_slug(slug).await?.is_some() {
                tracing::debug!(slug = %slug, "demo post already exists, skipping");
                continue;
            }
            let created_at = now - Duration::days(offset as i64 * 3);
            let content = render_content(markdown);
            let post = Post {
                id: new_id(),
                title: title.to_string(),
                slug: slug.to_string(),
                excerpt: plain_text_excerpt(&content, EXCERPT_CHARS),
                content,
                status: *status,
                created_by: author.clone(),
                categories: category_ids
                    .iter()
                    .filter(|(s, _)| categories.contains(&s.as_str()))
                    .map(|(_, id)| id.clone())
                    .collect(),
                tags: vec!["demo".to_string()],
                featured_image: None,
                views: if *status == PostStatus::Published { 12 } else { 0 },
                created_at,
                updated_at: created_at,
                published_at: (*status == PostStatus::Published).then_some(created_at),
            };
            state.post_repo.create_or_update(post).await?;
            tracing::info!(slug = %slug, "seeded demo post");
        }
    }

    // Organisations have no natural key; only seed into an empty collection
    if !state.organisation_repo.list(None).await?.is_empty() {
        tracing::info!("Organisations already present, demo seeding finished.");
        return Ok(());
    }

    let now = Utc::now();
    let mut organisation_ids = Vec::new();
    for (name, description, website) in DEMO_ORGANISATIONS {
        let organisation = Organisation {
            id: new_id(),
            name: name.to_string(),
            description: description.to_string(),
            website: Some(website.to_string()),
            logo: None,
            status: ActiveStatus::Active,
            created_at: now,
            updated_at: now,
        };
        organisation_ids.push(organisation.id.clone());
        state.organisation_repo.create_or_update(organisation).await?;
    }

    for (title, organisation, location, employment_type) in DEMO_JOBS {
        let Some(organisation_id) = organisation_ids.get(*organisation) else {
            continue;
        };
        state
            .job_repo
            .create_or_update(Job {
                id: new_id(),
                title: title.to_string(),
                organisation_id: organisation_id.clone(),
                description: format!("{title} at a demo organisation."),
                location: location.to_string(),
                employment_type: employment_type.to_string(),
                salary: None,
                status: ActiveStatus::Active,
                applications: 0,
                created_by: None,
                created_at: now,
                updated_at: now,
            })
            .await?;
    }

    tracing::info!(
        organisations = organisation_ids.len(),
        jobs = DEMO_JOBS.len(),
        "Demo data seeding finished."
    );
    Ok(())
}
