use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::options::{FindOptions, ReplaceOptions};

use crate::db::models::Category;
use crate::db::mongo::{collect, write_error};
use crate::error::AppError;

/// Repository trait for post categories.
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Create a new category or replace an existing one (matched by id).
    ///
    /// Fails with `BadRequest` when another category already holds the slug.
    async fn create_or_update(&self, category: Category) -> Result<(), AppError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Category>, AppError>;

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Category>, AppError>;

    /// List all categories, sorted by name.
    async fn list(&self) -> Result<Vec<Category>, AppError>;

    async fn delete(&self, id: &str) -> Result<bool, AppError>;
}

/// MongoDB implementation of the CategoryRepository.
pub struct MongoCategoryRepository {
    collection: mongodb::Collection<Category>,
}

impl MongoCategoryRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection("categories"),
        }
    }
}

#[async_trait]
impl CategoryRepository for MongoCategoryRepository {
    async fn create_or_update(&self, category: Category) -> Result<(), AppError> {
        let options = ReplaceOptions::builder().upsert(true).build();

        self.collection
            .replace_one(doc! { "id": &category.id }, &category)
            .with_options(options)
            .await
            .map_err(|e| write_error(e, "Slug is already in use"))?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Category>, AppError> {
        Ok(self.collection.find_one(doc! { "id": id }).await?)
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Category>, AppError> {
        Ok(self.collection.find_one(doc! { "slug": slug }).await?)
    }

    async fn list(&self) -> Result<Vec<Category>, AppError> {
        let options = FindOptions::builder().sort(doc! { "name": 1 }).build();

        let cursor = self
            .collection
            .find(doc! {})
            .with_options(options)
            .await?;
        collect(cursor).await
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let result = self.collection.delete_one(doc! { "id": id }).await?;
        Ok(result.deleted_count > 0)
    }
}
