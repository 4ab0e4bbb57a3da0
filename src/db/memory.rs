use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::category_repository::CategoryRepository;
use crate::db::job_repository::JobRepository;
use crate::db::media_repository::MediaRepository;
use crate::db::models::{
    ActiveStatus, Category, Job, JobChanges, JobFilter, Media, MediaUsage, Organisation,
    OrganisationChanges, Post, PostChanges, PostFilter, User, UserChanges, UserFilter,
};
use crate::db::organisation_repository::OrganisationRepository;
use crate::db::post_repository::PostRepository;
use crate::db::user_repository::UserRepository;
use crate::error::AppError;

/// In-process document store implementing every repository trait.
///
/// Used when no MongoDB URI is configured, and by the test suites. Unique
/// constraints (user email, post and category slug) are enforced the same
/// way the MongoDB indexes enforce them.
#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<Vec<User>>,
    posts: Mutex<Vec<Post>>,
    jobs: Mutex<Vec<Job>>,
    organisations: Mutex<Vec<Organisation>>,
    categories: Mutex<Vec<Category>>,
    media: Mutex<Vec<Media>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Replace the record with the same id, or append it.
fn upsert<T>(items: &mut Vec<T>, item: T, id: impl Fn(&T) -> &str) {
    match items.iter_mut().find(|existing| id(existing) == id(&item)) {
        Some(existing) => *existing = item,
        None => items.push(item),
    }
}

fn remove<T>(items: &mut Vec<T>, target: &str, id: impl Fn(&T) -> &str) -> bool {
    let before = items.len();
    items.retain(|item| id(item) != target);
    items.len() != before
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create_or_update(&self, user: User) -> Result<(), AppError> {
        let mut users = lock(&self.users);
        if users.iter().any(|u| u.email == user.email && u.id != user.id) {
            return Err(AppError::BadRequest(
                "A user with this email already exists".into(),
            ));
        }
        upsert(&mut *users, user, |u| u.id.as_str());
        Ok(())
    }

    async fn update(&self, id: &str, changes: &UserChanges) -> Result<Option<User>, AppError> {
        Ok(lock(&self.users).iter_mut().find(|u| u.id == id).map(|user| {
            changes.apply(user);
            user.clone()
        }))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        Ok(lock(&self.users).iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(lock(&self.users).iter().find(|u| u.email == email).cloned())
    }

    async fn list(&self, filter: &UserFilter) -> Result<Vec<User>, AppError> {
        Ok(lock(&self.users)
            .iter()
            .filter(|u| filter.matches(u))
            .cloned()
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        Ok(remove(&mut *lock(&self.users), id, |u| u.id.as_str()))
    }

    async fn record_login(&self, id: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        if let Some(user) = lock(&self.users).iter_mut().find(|u| u.id == id) {
            user.last_login_at = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl PostRepository for MemoryStore {
    async fn create_or_update(&self, post: Post) -> Result<(), AppError> {
        let mut posts = lock(&self.posts);
        if posts.iter().any(|p| p.slug == post.slug && p.id != post.id) {
            return Err(AppError::BadRequest("Slug is already in use".into()));
        }
        upsert(&mut *posts, post, |p| p.id.as_str());
        Ok(())
    }

    async fn update(&self, id: &str, changes: &PostChanges) -> Result<Option<Post>, AppError> {
        let mut posts = lock(&self.posts);
        if let Some(slug) = &changes.slug {
            if posts.iter().any(|p| &p.slug == slug && p.id != id) {
                return Err(AppError::BadRequest("Slug is already in use".into()));
            }
        }
        Ok(posts.iter_mut().find(|p| p.id == id).map(|post| {
            changes.apply(post);
            post.clone()
        }))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Post>, AppError> {
        Ok(lock(&self.posts).iter().find(|p| p.id == id).cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Post>, AppError> {
        Ok(lock(&self.posts).iter().find(|p| p.slug == slug).cloned())
    }

    async fn list(&self, filter: &PostFilter) -> Result<Vec<Post>, AppError> {
        Ok(lock(&self.posts)
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        Ok(remove(&mut *lock(&self.posts), id, |p| p.id.as_str()))
    }

    async fn increment_views(&self, id: &str) -> Result<bool, AppError> {
        match lock(&self.posts).iter_mut().find(|p| p.id == id) {
            Some(post) => {
                post.views += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove_category(&self, category_id: &str) -> Result<u64, AppError> {
        let mut changed = 0;
        for post in lock(&self.posts).iter_mut() {
            let before = post.categories.len();
            post.categories.retain(|c| c != category_id);
            if post.categories.len() != before {
                changed += 1;
            }
        }
        Ok(changed)
    }
}

#[async_trait]
impl JobRepository for MemoryStore {
    async fn create_or_update(&self, job: Job) -> Result<(), AppError> {
        upsert(&mut *lock(&self.jobs), job, |j| j.id.as_str());
        Ok(())
    }

    async fn update(&self, id: &str, changes: &JobChanges) -> Result<Option<Job>, AppError> {
        Ok(lock(&self.jobs).iter_mut().find(|j| j.id == id).map(|job| {
            changes.apply(job);
            job.clone()
        }))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Job>, AppError> {
        Ok(lock(&self.jobs).iter().find(|j| j.id == id).cloned())
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, AppError> {
        Ok(lock(&self.jobs)
            .iter()
            .filter(|j| filter.matches(j))
            .cloned()
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        Ok(remove(&mut *lock(&self.jobs), id, |j| j.id.as_str()))
    }
}

#[async_trait]
impl OrganisationRepository for MemoryStore {
    async fn create_or_update(&self, organisation: Organisation) -> Result<(), AppError> {
        upsert(&mut *lock(&self.organisations), organisation, |o| o.id.as_str());
        Ok(())
    }

    async fn update(
        &self,
        id: &str,
        changes: &OrganisationChanges,
    ) -> Result<Option<Organisation>, AppError> {
        Ok(lock(&self.organisations)
            .iter_mut()
            .find(|o| o.id == id)
            .map(|organisation| {
                changes.apply(organisation);
                organisation.clone()
            }))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Organisation>, AppError> {
        Ok(lock(&self.organisations)
            .iter()
            .find(|o| o.id == id)
            .cloned())
    }

    async fn list(&self, status: Option<ActiveStatus>) -> Result<Vec<Organisation>, AppError> {
        Ok(lock(&self.organisations)
            .iter()
            .filter(|o| status.is_none_or(|s| o.status == s))
            .cloned()
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        Ok(remove(&mut *lock(&self.organisations), id, |o| o.id.as_str()))
    }
}

#[async_trait]
impl CategoryRepository for MemoryStore {
    async fn create_or_update(&self, category: Category) -> Result<(), AppError> {
        let mut categories = lock(&self.categories);
        if categories
            .iter()
            .any(|c| c.slug == category.slug && c.id != category.id)
        {
            return Err(AppError::BadRequest("Slug is already in use".into()));
        }
        upsert(&mut *categories, category, |c| c.id.as_str());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Category>, AppError> {
        Ok(lock(&self.categories).iter().find(|c| c.id == id).cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Category>, AppError> {
        Ok(lock(&self.categories)
            .iter()
            .find(|c| c.slug == slug)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Category>, AppError> {
        let mut categories = lock(&self.categories).clone();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        Ok(remove(&mut *lock(&self.categories), id, |c| c.id.as_str()))
    }
}

#[async_trait]
impl MediaRepository for MemoryStore {
    async fn create_or_update(&self, media: Media) -> Result<(), AppError> {
        upsert(&mut *lock(&self.media), media, |m| m.id.as_str());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Media>, AppError> {
        Ok(lock(&self.media).iter().find(|m| m.id == id).cloned())
    }

    async fn list(&self, uploaded_by: Option<&str>) -> Result<Vec<Media>, AppError> {
        Ok(lock(&self.media)
            .iter()
            .filter(|m| uploaded_by.is_none_or(|uid| m.uploaded_by == uid))
            .cloned()
            .collect())
    }

    async fn delete_unused(&self, id: &str) -> Result<bool, AppError> {
        let mut media = lock(&self.media);
        if media.iter().any(|m| m.id == id && m.usage_count > 0) {
            return Ok(false);
        }
        Ok(remove(&mut *media, id, |m| m.id.as_str()))
    }

    async fn add_usage(&self, id: &str, usage: &MediaUsage) -> Result<bool, AppError> {
        let mut media = lock(&self.media);
        let Some(item) = media.iter_mut().find(|m| m.id == id) else {
            return Ok(false);
        };
        if item.used_by.contains(usage) {
            return Ok(false);
        }
        item.used_by.push(usage.clone());
        item.usage_count += 1;
        Ok(true)
    }

    async fn remove_usage(&self, id: &str, usage: &MediaUsage) -> Result<bool, AppError> {
        let mut media = lock(&self.media);
        let Some(item) = media.iter_mut().find(|m| m.id == id) else {
            return Ok(false);
        };
        let before = item.used_by.len();
        item.used_by.retain(|u| u != usage);
        if item.used_by.len() == before {
            return Ok(false);
        }
        item.usage_count -= 1;
        Ok(true)
    }
}
