use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::options::ReplaceOptions;

use crate::db::models::{ActiveStatus, Organisation, OrganisationChanges};
use crate::db::mongo::{collect, return_updated, set_changes, status_clause};
use crate::error::AppError;

/// Repository trait for organisations.
#[async_trait]
pub trait OrganisationRepository: Send + Sync {
    async fn create_or_update(&self, organisation: Organisation) -> Result<(), AppError>;

    /// Set only the changed fields and return the record as stored afterwards.
    async fn update(
        &self,
        id: &str,
        changes: &OrganisationChanges,
    ) -> Result<Option<Organisation>, AppError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Organisation>, AppError>;

    async fn list(&self, status: Option<ActiveStatus>) -> Result<Vec<Organisation>, AppError>;

    async fn delete(&self, id: &str) -> Result<bool, AppError>;
}

/// MongoDB implementation of the OrganisationRepository.
pub struct MongoOrganisationRepository {
    collection: mongodb::Collection<Organisation>,
}

impl MongoOrganisationRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection("organisations"),
        }
    }
}

#[async_trait]
impl OrganisationRepository for MongoOrganisationRepository {
    async fn create_or_update(&self, organisation: Organisation) -> Result<(), AppError> {
        let options = ReplaceOptions::builder().upsert(true).build();
        self.collection
            .replace_one(doc! { "id": &organisation.id }, &organisation)
            .with_options(options)
            .await?;
        Ok(())
    }

    async fn update(
        &self,
        id: &str,
        changes: &OrganisationChanges,
    ) -> Result<Option<Organisation>, AppError> {
        Ok(self
            .collection
            .find_one_and_update(doc! { "id": id }, set_changes(changes)?)
            .with_options(return_updated())
            .await?)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Organisation>, AppError> {
        Ok(self.collection.find_one(doc! { "id": id }).await?)
    }

    async fn list(&self, status: Option<ActiveStatus>) -> Result<Vec<Organisation>, AppError> {
        let filter = match status {
            Some(status) => status_clause(
                "status",
                status.to_string(),
                status == ActiveStatus::default(),
            ),
            None => doc! {},
        };

        let cursor = self.collection.find(filter).await?;
        collect(cursor).await
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let result = self.collection.delete_one(doc! { "id": id }).await?;
        Ok(result.deleted_count > 0)
    }
}
