use async_trait::async_trait;
use mongodb::bson::{doc, Document};
use mongodb::options::ReplaceOptions;

use crate::db::models::{Post, PostChanges, PostFilter, PostStatus};
use crate::db::mongo::{and_all, collect, return_updated, set_changes, status_clause, write_error};
use crate::error::AppError;

/// Repository trait for posts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Create a new post or replace an existing one (matched by id).
    ///
    /// Fails with `BadRequest` when another post already holds the slug.
    async fn create_or_update(&self, post: Post) -> Result<(), AppError>;

    /// Set only the changed fields and return the post as stored afterwards,
    /// or `None` if it no longer exists.
    ///
    /// Fails with `BadRequest` when another post already holds the new slug.
    async fn update(&self, id: &str, changes: &PostChanges) -> Result<Option<Post>, AppError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Post>, AppError>;

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Post>, AppError>;

    async fn list(&self, filter: &PostFilter) -> Result<Vec<Post>, AppError>;

    /// Delete a post. Returns `false` if no such post existed.
    async fn delete(&self, id: &str) -> Result<bool, AppError>;

    /// Atomically add one view. Returns `false` if no such post existed.
    async fn increment_views(&self, id: &str) -> Result<bool, AppError>;

    /// Remove a category id from every post referencing it.
    /// Returns the number of posts changed.
    async fn remove_category(&self, category_id: &str) -> Result<u64, AppError>;
}

/// MongoDB implementation of the PostRepository.
pub struct MongoPostRepository {
    collection: mongodb::Collection<Post>,
}

impl MongoPostRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection("posts"),
        }
    }
}

fn post_filter_document(filter: &PostFilter) -> Document {
    let mut clauses = Vec::new();
    if let Some(status) = filter.status {
        clauses.push(status_clause(
            "status",
            status.to_string(),
            status == PostStatus::default(),
        ));
    }
    if let Some(author) = &filter.created_by {
        clauses.push(doc! { "createdBy": author });
    }
    if let Some(category) = &filter.category {
        // Matches when the array contains the id
        clauses.push(doc! { "categories": category });
    }
    and_all(clauses)
}

#[async_trait]
impl PostRepository for MongoPostRepository {
    async fn create_or_update(&self, post: Post) -> Result<(), AppError> {
        let options = ReplaceOptions::builder().upsert(true).build();

        self.collection
            .replace_one(doc! { "id": &post.id }, &post)
            .with_options(options)
            .await
            .map_err(|e| write_error(e, "Slug is already in use"))?;

        Ok(())
    }

    async fn update(&self, id: &str, changes: &PostChanges) -> Result<Option<Post>, AppError> {
        self.collection
            .find_one_and_update(doc! { "id": id }, set_changes(changes)?)
            .with_options(return_updated())
            .await
            .map_err(|e| write_error(e, "Slug is already in use"))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Post>, AppError> {
        Ok(self.collection.find_one(doc! { "id": id }).await?)
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Post>, AppError> {
        Ok(self.collection.find_one(doc! { "slug": slug }).await?)
    }

    async fn list(&self, filter: &PostFilter) -> Result<Vec<Post>, AppError> {
        let cursor = self.collection.find(post_filter_document(filter)).await?;
        collect(cursor).await
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let result = self.collection.delete_one(doc! { "id": id }).await?;
        Ok(result.deleted_count > 0)
    }

    async fn increment_views(&self, id: &str) -> Result<bool, AppError> {
        let result = self
            .collection
            .update_one(doc! { "id": id }, doc! { "$inc": { "views": 1_i64 } })
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn remove_category(&self, category_id: &str) -> Result<u64, AppError> {
        let result = self
            .collection
            .update_many(
                doc! { "categories": category_id },
                doc! { "$pull": { "categories": category_id } },
            )
            .await?;
        Ok(result.modified_count)
    }
}
