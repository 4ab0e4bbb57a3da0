use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::api::validation::optional;
use crate::app::AppState;
use crate::auth::models::{Role, SessionUser};
use crate::db::category_repository::CategoryRepository;
use crate::db::job_repository::JobRepository;
use crate::db::media_repository::MediaRepository;
use crate::db::models::{ActiveStatus, JobFilter, PostFilter, PostStatus, UserFilter};
use crate::db::organisation_repository::OrganisationRepository;
use crate::db::post_repository::PostRepository;
use crate::db::user_repository::UserRepository;
use crate::error::AppError;

const TOP_POSTS: usize = 5;
const RECENT_DAYS: i64 = 7;

/// `part / total * 100`, rounded to one decimal; `0` when `total` is zero.
pub fn percentage(part: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round1(part as f64 / total as f64 * 100.0)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCounts {
    pub total: i64,
    pub admins: i64,
    pub editors: i64,
    pub moderators: i64,
    pub active: i64,
    pub inactive: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostCounts {
    pub total: i64,
    pub draft: i64,
    pub published: i64,
    pub archived: i64,
    pub total_views: i64,
    pub published_percentage: f64,
    pub created_last_7_days: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveCounts {
    pub total: i64,
    pub active: i64,
    pub inactive: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaCounts {
    pub total: i64,
    pub total_bytes: i64,
    pub in_use: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewStats {
    pub users: UserCounts,
    pub posts: PostCounts,
    pub jobs: ActiveCounts,
    pub organisations: ActiveCounts,
    pub categories: i64,
    pub media: MediaCounts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopPost {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub status: PostStatus,
    pub views: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorStats {
    pub editor_id: String,
    pub total_posts: i64,
    pub draft: i64,
    pub published: i64,
    pub archived: i64,
    pub total_views: i64,
    pub average_views: f64,
    pub published_percentage: f64,
    pub top_posts: Vec<TopPost>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationStats {
    /// Drafts waiting for a decision.
    pub pending_posts: i64,
    pub published_posts: i64,
    pub archived_posts: i64,
    pub active_jobs: i64,
    pub inactive_jobs: i64,
    pub inactive_organisations: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct EditorStatsQuery {
    pub editor: Option<String>,
}

/// Every repository the statistics read from.
pub struct StatsSources<'a> {
    pub users: &'a dyn UserRepository,
    pub posts: &'a dyn PostRepository,
    pub jobs: &'a dyn JobRepository,
    pub organisations: &'a dyn OrganisationRepository,
    pub categories: &'a dyn CategoryRepository,
    pub media: &'a dyn MediaRepository,
}

impl<'a> StatsSources<'a> {
    pub fn from_state(state: &'a AppState) -> Self {
        Self {
            users: state.user_repo.as_ref(),
            posts: state.post_repo.as_ref(),
            jobs: state.job_repo.as_ref(),
            organisations: state.organisation_repo.as_ref(),
            categories: state.category_repo.as_ref(),
            media: state.media_repo.as_ref(),
        }
    }
}

fn count_active<'s>(statuses: impl Iterator<Item = &'s ActiveStatus>) -> ActiveCounts {
    let mut counts = ActiveCounts::default();
    for status in statuses {
        counts.total += 1;
        match status {
            ActiveStatus::Active => counts.active += 1,
            ActiveStatus::Inactive => counts.inactive += 1,
        }
    }
    counts
}

pub async fn process_overview(
    sources: &StatsSources<'_>,
    now: DateTime<Utc>,
) -> Result<OverviewStats, AppError> {
    let mut stats = OverviewStats::default();

    for user in sources.users.list(&UserFilter::default()).await? {
        stats.users.total += 1;
        match user.role {
            Role::Admin => stats.users.admins += 1,
            Role::Editor => stats.users.editors += 1,
            Role::Moderator => stats.users.moderators += 1,
        }
        match user.status {
            ActiveStatus::Active => stats.users.active += 1,
            ActiveStatus::Inactive => stats.users.inactive += 1,
        }
    }

    let recent_cutoff = now - Duration::days(RECENT_DAYS);
    for post in sources.posts.list(&PostFilter::default()).await? {
        stats.posts.total += 1;
        match post.status {
            PostStatus::Draft => stats.posts.draft += 1,
            PostStatus::Published => stats.posts.published += 1,
            PostStatus::Archived => stats.posts.archived += 1,
        }
        stats.posts.total_views += post.views;
        if post.created_at >= recent_cutoff {
            stats.posts.created_last_7_days += 1;
        }
    }
    stats.posts.published_percentage = percentage(stats.posts.published, stats.posts.total);

    let jobs = sources.jobs.list(&JobFilter::default()).await?;
    stats.jobs = count_active(jobs.iter().map(|j| &j.status));

    let organisations = sources.organisations.list(None).await?;
    stats.organisations = count_active(organisations.iter().map(|o| &o.status));

    stats.categories = sources.categories.list().await?.len() as i64;

    for media in sources.media.list(None).await? {
        stats.media.total += 1;
        stats.media.total_bytes += media.size;
        if media.usage_count > 0 {
            stats.media.in_use += 1;
        }
    }

    Ok(stats)
}

pub async fn process_editor_stats(
    posts: &dyn PostRepository,
    editor_id: &str,
) -> Result<EditorStats, AppError> {
    let filter = PostFilter {
        created_by: Some(editor_id.to_string()),
        ..Default::default()
    };
    let mut own = posts.list(&filter).await?;

    let mut stats = EditorStats {
        editor_id: editor_id.to_string(),
        ..Default::default()
    };
    for post in &own {
        stats.total_posts += 1;
        match post.status {
            PostStatus::Draft => stats.draft += 1,
            PostStatus::Published => stats.published += 1,
            PostStatus::Archived => stats.archived += 1,
        }
        stats.total_views += post.views;
    }
    if stats.total_posts > 0 {
        stats.average_views = round1(stats.total_views as f64 / stats.total_posts as f64);
    }
    stats.published_percentage = percentage(stats.published, stats.total_posts);

    own.sort_by(|a, b| b.views.cmp(&a.views).then_with(|| a.title.cmp(&b.title)));
    stats.top_posts = own
        .into_iter()
        .take(TOP_POSTS)
        .map(|p| TopPost {
            id: p.id,
            title: p.title,
            slug: p.slug,
            status: p.status,
            views: p.views,
        })
        .collect();

    Ok(stats)
}

pub async fn process_moderation_stats(
    posts: &dyn PostRepository,
    jobs: &dyn JobRepository,
    organisations: &dyn OrganisationRepository,
) -> Result<ModerationStats, AppError> {
    let mut stats = ModerationStats::default();

    for post in posts.list(&PostFilter::default()).await? {
        match post.status {
            PostStatus::Draft => stats.pending_posts += 1,
            PostStatus::Published => stats.published_posts += 1,
            PostStatus::Archived => stats.archived_posts += 1,
        }
    }

    let job_counts = count_active(
        jobs.list(&JobFilter::default())
            .await?
            .iter()
            .map(|j| &j.status),
    );
    stats.active_jobs = job_counts.active;
    stats.inactive_jobs = job_counts.inactive;

    stats.inactive_organisations = organisations
        .list(Some(ActiveStatus::Inactive))
        .await?
        .len() as i64;

    Ok(stats)
}

/// Whose statistics an editor-stats request is about.
///
/// Editors always get their own; admins may name any editor.
pub fn editor_stats_target(user: &SessionUser, query: &EditorStatsQuery) -> Result<String, AppError> {
    user.require(&[Role::Admin, Role::Editor])?;
    match optional(query.editor.as_deref()) {
        Some(editor) if user.is(Role::Admin) => Ok(editor),
        _ => Ok(user.uid.clone()),
    }
}

/// Axum handler for `GET /api/stats/overview`.
pub async fn overview_handler(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<Json<OverviewStats>, AppError> {
    user.require(&[Role::Admin])?;
    let stats = process_overview(&StatsSources::from_state(&state), Utc::now()).await?;
    Ok(Json(stats))
}

/// Axum handler for `GET /api/stats/editor`.
pub async fn editor_stats_handler(
    State(state): State<AppState>,
    user: SessionUser,
    Query(query): Query<EditorStatsQuery>,
) -> Result<Json<EditorStats>, AppError> {
    let editor_id = editor_stats_target(&user, &query)?;
    let stats = process_editor_stats(state.post_repo.as_ref(), &editor_id).await?;
    Ok(Json(stats))
}

/// Axum handler for `GET /api/stats/moderation`.
pub async fn moderation_stats_handler(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<Json<ModerationStats>, AppError> {
    user.require(&[Role::Admin, Role::Moderator])?;
    let stats = process_moderation_stats(
        state.post_repo.as_ref(),
        state.job_repo.as_ref(),
        state.organisation_repo.as_ref(),
    )
    .await?;
    Ok(Json(stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::db::models::{Job, Media, Organisation, Post, User};

    fn sources(store: &MemoryStore) -> StatsSources<'_> {
        StatsSources {
            users: store,
            posts: store,
            jobs: store,
            organisations: store,
            categories: store,
            media: store,
        }
    }

    fn post(id: &str, author: &str, status: PostStatus, views: i64, created_at: DateTime<Utc>) -> Post {
        Post {
            id: id.into(),
            title: id.into(),
            slug: id.into(),
            content: "c".into(),
            excerpt: String::new(),
            status,
            created_by: author.into(),
            categories: vec![],
            tags: vec![],
            featured_image: None,
            views,
            created_at,
            updated_at: created_at,
            published_at: None,
        }
    }

    fn job(id: &str, status: ActiveStatus) -> Job {
        Job {
            id: id.into(),
            title: "Dev".into(),
            organisation_id: "o1".into(),
            description: "d".into(),
            location: String::new(),
            employment_type: String::new(),
            salary: None,
            status,
            applications: 0,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn organisation(id: &str, status: ActiveStatus) -> Organisation {
        Organisation {
            id: id.into(),
            name: id.into(),
            description: String::new(),
            website: None,
            logo: None,
            status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_percentage() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(5, 0), 0.0);
        assert_eq!(percentage(1, 3), 33.3);
        assert_eq!(percentage(2, 3), 66.7);
        assert_eq!(percentage(3, 3), 100.0);
    }

    #[tokio::test]
    async fn test_empty_store() {
        let store = MemoryStore::new();
        let stats = process_overview(&sources(&store), Utc::now()).await.unwrap();
        assert_eq!(stats.posts.total, 0);
        assert_eq!(stats.posts.published_percentage, 0.0);

        let editor = process_editor_stats(&store, "nobody").await.unwrap();
        assert_eq!(editor.average_views, 0.0);
        assert!(editor.top_posts.is_empty());
    }

    #[tokio::test]
    async fn test_overview_counts() {
        let store = MemoryStore::new();
        let now = Utc::now();

        for (id, role, status) in [
            ("a", Role::Admin, ActiveStatus::Active),
            ("e", Role::Editor, ActiveStatus::Active),
            ("m", Role::Moderator, ActiveStatus::Inactive),
        ] {
            UserRepository::create_or_update(
                &store,
                User {
                    id: id.into(),
                    email: format!("{id}@example.com"),
                    display_name: id.into(),
                    role,
                    status,
                    created_at: now,
                    last_login_at: None,
                },
            )
            .await
            .unwrap();
        }

        for p in [
            post("p1", "e", PostStatus::Published, 10, now),
            post("p2", "e", PostStatus::Draft, 5, now - Duration::days(30)),
            post("p3", "e", PostStatus::Archived, 0, now - Duration::days(2)),
        ] {
            PostRepository::create_or_update(&store, p).await.unwrap();
        }
        JobRepository::create_or_update(&store, job("j1", ActiveStatus::Active)).await.unwrap();
        JobRepository::create_or_update(&store, job("j2", ActiveStatus::Inactive)).await.unwrap();
        OrganisationRepository::create_or_update(&store, organisation("o1", ActiveStatus::Active))
            .await
            .unwrap();
        MediaRepository::create_or_update(
            &store,
            Media {
                id: "m1".into(),
                file_name: "a.png".into(),
                content_type: "image/png".into(),
                size: 2048,
                storage_key: "media/m1_a.png".into(),
                uploaded_by: "e".into(),
                used_by: vec![],
                usage_count: 0,
                created_at: now,
            },
        )
        .await
        .unwrap();

        let stats = process_overview(&sources(&store), now).await.unwrap();
        assert_eq!(stats.users.total, 3);
        assert_eq!(stats.users.moderators, 1);
        assert_eq!(stats.users.inactive, 1);
        assert_eq!(stats.posts.total, 3);
        assert_eq!(stats.posts.total_views, 15);
        assert_eq!(stats.posts.published_percentage, 33.3);
        assert_eq!(stats.posts.created_last_7_days, 2);
        assert_eq!(stats.jobs.total, 2);
        assert_eq!(stats.jobs.inactive, 1);
        assert_eq!(stats.organisations.active, 1);
        assert_eq!(stats.media.total_bytes, 2048);
        assert_eq!(stats.media.in_use, 0);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["posts"]["createdLast7Days"], 2);
    }

    #[tokio::test]
    async fn test_editor_top_posts() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for (i, views) in [3, 50, 7, 0, 12, 9].into_iter().enumerate() {
            PostRepository::create_or_update(
                &store,
                post(&format!("p{i}"), "ed", PostStatus::Published, views, now),
            )
            .await
            .unwrap();
        }
        PostRepository::create_or_update(&store, post("other", "ann", PostStatus::Draft, 999, now))
            .await
            .unwrap();

        let stats = process_editor_stats(&store, "ed").await.unwrap();
        assert_eq!(stats.total_posts, 6);
        assert_eq!(stats.total_views, 81);
        assert_eq!(stats.average_views, 13.5);
        assert_eq!(stats.published_percentage, 100.0);

        let views: Vec<i64> = stats.top_posts.iter().map(|p| p.views).collect();
        assert_eq!(views, vec![50, 12, 9, 7, 3]);
    }

    #[tokio::test]
    async fn test_moderation_counts() {
        let store = MemoryStore::new();
        let now = Utc::now();
        PostRepository::create_or_update(&store, post("d1", "e", PostStatus::Draft, 0, now))
            .await
            .unwrap();
        PostRepository::create_or_update(&store, post("d2", "e", PostStatus::Draft, 0, now))
            .await
            .unwrap();
        JobRepository::create_or_update(&store, job("j1", ActiveStatus::Inactive)).await.unwrap();
        OrganisationRepository::create_or_update(&store, organisation("o1", ActiveStatus::Inactive))
            .await
            .unwrap();

        let stats = process_moderation_stats(&store, &store, &store).await.unwrap();
        assert_eq!(stats.pending_posts, 2);
        assert_eq!(stats.published_posts, 0);
        assert_eq!(stats.inactive_jobs, 1);
        assert_eq!(stats.inactive_organisations, 1);
    }

    #[test]
    fn test_editor_stats_target() {
        let admin = SessionUser {
            uid: "root".into(),
            email: "root@example.com".into(),
            display_name: "Root".into(),
            role: Role::Admin,
        };
        let editor = SessionUser {
            uid: "ed".into(),
            role: Role::Editor,
            ..admin.clone()
        };
        let moderator = SessionUser {
            role: Role::Moderator,
            ..admin.clone()
        };
        let asking_for_ann = EditorStatsQuery {
            editor: Some("ann".into()),
        };

        assert_eq!(editor_stats_target(&admin, &asking_for_ann).unwrap(), "ann");
        assert_eq!(editor_stats_target(&editor, &asking_for_ann).unwrap(), "ed");
        assert_eq!(
            editor_stats_target(&admin, &EditorStatsQuery::default()).unwrap(),
            "root"
        );
        assert!(matches!(
            editor_stats_target(&moderator, &EditorStatsQuery::default()),
            Err(AppError::Forbidden(_))
        ));
    }
}
