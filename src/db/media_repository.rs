use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::options::ReplaceOptions;

use crate::db::models::{Media, MediaUsage};
use crate::db::mongo::collect;
use crate::error::AppError;

/// Repository trait for media metadata.
#[async_trait]
pub trait MediaRepository: Send + Sync {
    async fn create_or_update(&self, media: Media) -> Result<(), AppError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Media>, AppError>;

    /// List media, optionally only what one user uploaded.
    async fn list(&self, uploaded_by: Option<&str>) -> Result<Vec<Media>, AppError>;

    /// Delete the record only while nothing uses it, checked in the same
    /// write. Returns `false` if the media is missing or in use.
    async fn delete_unused(&self, id: &str) -> Result<bool, AppError>;

    /// Append a usage tuple and bump `usage_count` in one atomic update.
    ///
    /// Returns `false` when the tuple was already recorded (or the media is
    /// missing); the counter is only bumped when the tuple is new.
    async fn add_usage(&self, id: &str, usage: &MediaUsage) -> Result<bool, AppError>;

    /// Remove a usage tuple and decrement `usage_count` in one atomic update.
    ///
    /// Returns `false` when the tuple was not recorded.
    async fn remove_usage(&self, id: &str, usage: &MediaUsage) -> Result<bool, AppError>;
}

/// MongoDB implementation of the MediaRepository.
pub struct MongoMediaRepository {
    collection: mongodb::Collection<Media>,
}

impl MongoMediaRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection("media"),
        }
    }
}

#[async_trait]
impl MediaRepository for MongoMediaRepository {
    async fn create_or_update(&self, media: Media) -> Result<(), AppError> {
        let options = ReplaceOptions::builder().upsert(true).build();
        self.collection
            .replace_one(doc! { "id": &media.id }, &media)
            .with_options(options)
            .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Media>, AppError> {
        Ok(self.collection.find_one(doc! { "id": id }).await?)
    }

    async fn list(&self, uploaded_by: Option<&str>) -> Result<Vec<Media>, AppError> {
        let filter = match uploaded_by {
            Some(uid) => doc! { "uploadedBy": uid },
            None => doc! {},
        };
        let cursor = self.collection.find(filter).await?;
        collect(cursor).await
    }

    async fn delete_unused(&self, id: &str) -> Result<bool, AppError> {
        let result = self
            .collection
            .delete_one(doc! {
                "id": id,
                // A missing counter reads as zero
                "usageCount": { "$not": { "$gt": 0_i64 } }
            })
            .await?;
        Ok(result.deleted_count > 0)
    }

    async fn add_usage(&self, id: &str, usage: &MediaUsage) -> Result<bool, AppError> {
        let result = self
            .collection
            .update_one(
                doc! {
                    "id": id,
                    "usedBy": {
                        "$not": { "$elemMatch": { "kind": &usage.kind, "id": &usage.id } }
                    }
                },
                doc! {
                    "$push": { "usedBy": { "kind": &usage.kind, "id": &usage.id } },
                    "$inc": { "usageCount": 1_i64 }
                },
            )
            .await?;
        Ok(result.modified_count > 0)
    }

    async fn remove_usage(&self, id: &str, usage: &MediaUsage) -> Result<bool, AppError> {
        let result = self
            .collection
            .update_one(
                doc! {
                    "id": id,
                    "usedBy": { "$elemMatch": { "kind": &usage.kind, "id": &usage.id } }
                },
                doc! {
                    "$pull": { "usedBy": { "kind": &usage.kind, "id": &usage.id } },
                    "$inc": { "usageCount": -1_i64 }
                },
            )
            .await?;
        Ok(result.modified_count > 0)
    }
}
